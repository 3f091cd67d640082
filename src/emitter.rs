//! Registry snapshots and the delta emitter.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::error::Result;
use crate::events::{EventChannel, MetricEvent, MetricUpdate, MetricValue, Value};
use crate::fields::key_to_multi_field;
use crate::registry::Registry;
use crate::stage::StageTiming;

/// A counter's value at snapshot time: a scalar, or one value per allowed
/// field value.
enum CounterValue {
    Scalar(u64),
    PerField(AHashMap<String, u64>),
}

/// One field key's worth of distribution state at snapshot time.
///
/// `buckets` is `None` while the key has no samples, which keeps unused
/// field combinations cheap and doubles as the first-emit shortcut: with no
/// previous buckets the delta is the current array itself.
struct DistributionKeySnapshot {
    total: u64,
    buckets: Option<Vec<u64>>,
}

/// A point-in-time copy of every metric value and finished stage.
struct Snapshot {
    counters: AHashMap<String, CounterValue>,
    distributions: AHashMap<String, AHashMap<String, DistributionKeySnapshot>>,
    stages: Vec<StageTiming>,
}

impl Snapshot {
    /// Captures the registry's current state.
    ///
    /// The stage lock is held just long enough to copy the finished list
    /// (append-only, so the copy stays valid); metric values are then read
    /// with atomic loads, or the counter's read lock, under the map lock.
    fn capture(registry: &Registry) -> Self {
        let stages = registry.stages.read().finished.clone();
        let set = registry.metrics.read();

        let mut counters = AHashMap::with_capacity(set.counters.len());
        for (name, entry) in &set.counters {
            let value = match entry.metadata.fields.as_slice() {
                [] => CounterValue::Scalar(entry.source.value(&[])),
                [field] => {
                    let mut per_field = AHashMap::with_capacity(field.allowed_values().len());
                    for value in field.allowed_values() {
                        per_field.insert(value.clone(), entry.source.value(&[value.as_str()]));
                    }
                    CounterValue::PerField(per_field)
                }
                fields => unreachable!("counter registered with {} fields", fields.len()),
            };
            counters.insert(name.clone(), value);
        }

        let mut distributions = AHashMap::with_capacity(set.distributions.len());
        for (name, entry) in &set.distributions {
            let mut keys = AHashMap::with_capacity(entry.metric.samples.len());
            for (field_key, cells) in &entry.metric.samples {
                let buckets: Vec<u64> = cells
                    .iter()
                    .map(|cell| cell.load(Ordering::Relaxed))
                    .collect();
                let total: u64 = buckets.iter().sum();
                let snapshot = if total == 0 {
                    DistributionKeySnapshot {
                        total: 0,
                        buckets: None,
                    }
                } else {
                    DistributionKeySnapshot {
                        total,
                        buckets: Some(buckets),
                    }
                };
                keys.insert(field_key.clone(), snapshot);
            }
            distributions.insert(name.clone(), keys);
        }

        Self {
            counters,
            distributions,
            stages,
        }
    }
}

/// Emits delta updates for a registry over an owned channel.
///
/// The previous snapshot lives behind a mutex that also serializes
/// emissions, so a later update's snapshot is taken strictly after an
/// earlier one and the delta stream never reorders or overlaps. Use one
/// emitter per consumer stream; no registry lock is held while emitting an
/// update.
pub struct Emitter<C> {
    registry: Arc<Registry>,
    channel: C,
    last: Mutex<Option<Snapshot>>,
}

impl<C: EventChannel> Emitter<C> {
    pub fn new(registry: Arc<Registry>, channel: C) -> Self {
        Self {
            registry,
            channel,
            last: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Freezes the registry and sends the registration message over this
    /// emitter's channel.
    pub fn initialize(&self) -> Result<()> {
        self.registry.initialize(&self.channel)
    }

    /// Freezes the registry and sends an empty registration, telling the
    /// consumer that no metrics will follow.
    pub fn disable(&self) -> Result<()> {
        self.registry.disable(&self.channel)
    }

    /// Takes a fresh snapshot, diffs it against the previous one and sends
    /// a [`MetricUpdate`] when anything changed.
    ///
    /// The first call reports current state: scalar counters as-is,
    /// field-sharded counters only where non-zero, distributions only for
    /// keys with samples. Later calls report changes only. A channel
    /// failure is logged and not propagated; the snapshot still replaces
    /// the previous one.
    pub fn emit_update(&self) {
        let mut last = self.last.lock();
        let snapshot = Snapshot::capture(&self.registry);
        let mut update = MetricUpdate::default();

        for (name, value) in &snapshot.counters {
            let previous = last.as_ref().and_then(|s| s.counters.get(name));
            match value {
                CounterValue::Scalar(current) => {
                    if let Some(CounterValue::Scalar(before)) = previous {
                        if before == current {
                            continue;
                        }
                    }
                    update.metrics.push(MetricValue {
                        name: name.clone(),
                        field_values: Vec::new(),
                        value: Value::Uint64(*current),
                    });
                }
                CounterValue::PerField(per_field) => {
                    let before = match previous {
                        Some(CounterValue::PerField(before)) => Some(before),
                        _ => None,
                    };
                    for (field_value, current) in per_field {
                        // First emit reports only incremented values;
                        // later emits report changes.
                        match before {
                            None if *current == 0 => continue,
                            Some(before) if before.get(field_value) == Some(current) => continue,
                            _ => {}
                        }
                        update.metrics.push(MetricValue {
                            name: name.clone(),
                            field_values: vec![field_value.clone()],
                            value: Value::Uint64(*current),
                        });
                    }
                }
            }
        }

        for (name, keys) in &snapshot.distributions {
            let previous_keys = last.as_ref().and_then(|s| s.distributions.get(name));
            for (field_key, current) in keys {
                if current.total == 0 {
                    continue;
                }
                let previous = previous_keys.and_then(|keys| keys.get(field_key));
                if let Some(before) = previous {
                    if before.total == current.total {
                        continue;
                    }
                }
                let Some(current_buckets) = &current.buckets else {
                    continue;
                };
                let new_samples = match previous.and_then(|p| p.buckets.as_ref()) {
                    Some(before) => current_buckets
                        .iter()
                        .zip(before)
                        .map(|(current, before)| current - before)
                        .collect(),
                    // No previous samples for this key, so the delta is
                    // the full bucket array.
                    None => current_buckets.clone(),
                };
                update.metrics.push(MetricValue {
                    name: name.clone(),
                    field_values: key_to_multi_field(field_key),
                    value: Value::Distribution { new_samples },
                });
            }
        }

        let reported_stages = last.as_ref().map_or(0, |s| s.stages.len());
        update
            .stage_timing
            .extend_from_slice(&snapshot.stages[reported_stages..]);

        *last = Some(snapshot);
        if update.metrics.is_empty() && update.stage_timing.is_empty() {
            return;
        }

        if tracing::enabled!(tracing::Level::DEBUG) {
            let mut names: Vec<&str> = update.metrics.iter().map(|m| m.name.as_str()).collect();
            names.sort_unstable();
            tracing::debug!(
                message = "emitting metric update",
                metrics = ?names,
                stages = update.stage_timing.len(),
            );
        }
        if let Err(error) = self.channel.emit(MetricEvent::Update(update)) {
            tracing::warn!(message = "unable to emit metric update", error = %error);
        }
    }
}
