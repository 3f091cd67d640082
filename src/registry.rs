//! The process-wide two-phase metric registry.

use std::sync::{Arc, LazyLock};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::bucketer::Bucketer;
use crate::error::{Error, Result};
use crate::events::{EventChannel, MetricEvent, MetricRegistration};
use crate::fields::Field;
use crate::metrics::counter::Uint64Metric;
use crate::metrics::distribution::DistributionMetric;
use crate::metrics::timer::TimerMetric;
use crate::metrics::{MetricKind, MetricMetadata, Units};
use crate::stage::{InitStage, StageTiming};
use crate::time::{self, WallTime};

/// The default process-wide registry.
pub static DEFAULT_REGISTRY: LazyLock<Arc<Registry>> = LazyLock::new(|| Arc::new(Registry::new()));

/// How a snapshot reads a counter's value: an owned metric, or a
/// caller-provided read function.
pub(crate) enum CounterSource {
    Metric(Arc<Uint64Metric>),
    Custom(Box<dyn Fn(&[&str]) -> u64 + Send + Sync>),
}

impl CounterSource {
    pub(crate) fn value(&self, field_values: &[&str]) -> u64 {
        match self {
            CounterSource::Metric(metric) => metric.value(field_values),
            CounterSource::Custom(read) => read(field_values),
        }
    }
}

pub(crate) struct CounterEntry {
    pub(crate) metadata: MetricMetadata,
    pub(crate) source: CounterSource,
}

pub(crate) struct DistributionEntry {
    pub(crate) metadata: MetricMetadata,
    pub(crate) metric: Arc<DistributionMetric>,
}

/// Registered metrics plus the one-way initialization flag. The maps are
/// never mutated again once `initialized` is set.
#[derive(Default)]
pub(crate) struct MetricSet {
    pub(crate) counters: AHashMap<String, CounterEntry>,
    pub(crate) distributions: AHashMap<String, DistributionEntry>,
    pub(crate) initialized: bool,
}

/// Init-stage progress. `finished` is append-only and entries are never
/// mutated after being pushed, so a copy taken under the lock stays valid
/// outside it.
#[derive(Default)]
pub(crate) struct StageState {
    pub(crate) finished: Vec<StageTiming>,
    pub(crate) current: Option<(InitStage, WallTime)>,
}

impl StageState {
    fn end_current(&mut self, when: WallTime) {
        if let Some((stage, started)) = self.current.take() {
            self.finished.push(StageTiming {
                stage,
                started,
                ended: when,
            });
        }
    }
}

/// A two-phase metric registry.
///
/// Metrics are registered while the process starts up; the set is then
/// frozen by [`Registry::initialize`] or [`Registry::disable`] and only
/// values change from there on. Registration hands out handles, so the
/// registry itself is never on a hot path.
pub struct Registry {
    pub(crate) metrics: RwLock<MetricSet>,
    pub(crate) stages: RwLock<StageState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        // Touch the monotonic clock so the first timer start doesn't pay
        // its initialization.
        time::cheap_now_nanos();
        Self {
            metrics: RwLock::new(MetricSet::default()),
            stages: RwLock::new(StageState::default()),
        }
    }

    fn check_field_values(fields: &[Field]) -> Result<()> {
        for field in fields {
            for value in field.allowed_values() {
                if value.contains(',') {
                    return Err(Error::FieldValueContainsIllegalChar(value.clone()));
                }
            }
        }
        Ok(())
    }

    fn counter_metadata(
        name: &str,
        cumulative: bool,
        sync: bool,
        units: Units,
        description: &str,
        fields: &[Field],
    ) -> MetricMetadata {
        MetricMetadata {
            name: name.to_string(),
            description: description.to_string(),
            cumulative,
            sync,
            kind: MetricKind::Uint64,
            units,
            fields: fields.iter().cloned().collect(),
            distribution_bucket_lower_bounds: Vec::new(),
        }
    }

    fn insert_counter(&self, metadata: MetricMetadata, source: CounterSource) -> Result<()> {
        let mut set = self.metrics.write();
        if set.initialized {
            return Err(Error::InitializationDone);
        }
        if set.counters.contains_key(&metadata.name)
            || set.distributions.contains_key(&metadata.name)
        {
            return Err(Error::NameInUse(metadata.name));
        }
        set.counters
            .insert(metadata.name.clone(), CounterEntry { metadata, source });
        Ok(())
    }

    /// Registers a cumulative counter and returns its handle.
    ///
    /// `name` must be globally unique across all metric kinds. Counters
    /// support zero fields or one.
    pub fn register_counter(
        &self,
        name: &str,
        sync: bool,
        units: Units,
        description: &str,
        fields: &[Field],
    ) -> Result<Arc<Uint64Metric>> {
        if fields.len() > 1 {
            return Err(Error::TooManyFields(fields.len()));
        }
        Self::check_field_values(fields)?;
        let metric = Arc::new(Uint64Metric::new(fields));
        self.insert_counter(
            Self::counter_metadata(name, true, sync, units, description, fields),
            CounterSource::Metric(Arc::clone(&metric)),
        )?;
        Ok(metric)
    }

    /// Registers a counter whose value is supplied by `read` at snapshot
    /// time, with exactly one value per field.
    ///
    /// `read` is called with the registry's internal locks held and must
    /// not call back into the registry.
    pub fn register_custom_counter<F>(
        &self,
        name: &str,
        cumulative: bool,
        sync: bool,
        units: Units,
        description: &str,
        read: F,
        fields: &[Field],
    ) -> Result<()>
    where
        F: Fn(&[&str]) -> u64 + Send + Sync + 'static,
    {
        if fields.len() > 1 {
            return Err(Error::TooManyFields(fields.len()));
        }
        Self::check_field_values(fields)?;
        self.insert_counter(
            Self::counter_metadata(name, cumulative, sync, units, description, fields),
            CounterSource::Custom(Box::new(read)),
        )
    }

    /// Registers a distribution over the given bucketing scheme and returns
    /// its handle. The sample array for every possible field key is
    /// allocated here, up front.
    pub fn register_distribution(
        &self,
        name: &str,
        sync: bool,
        bucketer: Bucketer,
        units: Units,
        description: &str,
        fields: &[Field],
    ) -> Result<Arc<DistributionMetric>> {
        let lower_bounds = bucketer.lower_bounds().to_vec();
        let metric = Arc::new(DistributionMetric::new(bucketer, fields)?);
        let metadata = MetricMetadata {
            name: name.to_string(),
            description: description.to_string(),
            cumulative: false,
            sync,
            kind: MetricKind::Distribution,
            units,
            fields: fields.iter().cloned().collect(),
            distribution_bucket_lower_bounds: lower_bounds,
        };
        let mut set = self.metrics.write();
        if set.initialized {
            return Err(Error::InitializationDone);
        }
        if set.counters.contains_key(name) || set.distributions.contains_key(name) {
            return Err(Error::NameInUse(name.to_string()));
        }
        set.distributions.insert(
            name.to_string(),
            DistributionEntry {
                metadata,
                metric: Arc::clone(&metric),
            },
        );
        Ok(metric)
    }

    /// Registers a latency timer: a non-cumulative, nanosecond-unit
    /// distribution with start/finish conveniences. `nano_bucketer` is
    /// expected to hold durations in nanoseconds; [`crate::duration_bucketer`]
    /// may be helpful here.
    pub fn register_timer(
        &self,
        name: &str,
        nano_bucketer: Bucketer,
        description: &str,
        fields: &[Field],
    ) -> Result<TimerMetric> {
        let distribution = self.register_distribution(
            name,
            false,
            nano_bucketer,
            Units::Nanoseconds,
            description,
            fields,
        )?;
        Ok(TimerMetric::new(distribution))
    }

    /// Freezes the registry and announces every registered metric plus the
    /// ordered list of known init stages over `channel`.
    ///
    /// One-way: a second call fails with [`Error::DoubleInitialize`]. If
    /// the channel rejects the message the registry is left unfrozen so
    /// the caller may retry.
    pub fn initialize(&self, channel: &dyn EventChannel) -> Result<()> {
        let mut set = self.metrics.write();
        if set.initialized {
            return Err(Error::DoubleInitialize);
        }
        let mut registration = MetricRegistration::default();
        registration
            .metrics
            .reserve(set.counters.len() + set.distributions.len());
        for entry in set.counters.values() {
            registration.metrics.push(entry.metadata.clone());
        }
        for entry in set.distributions.values() {
            registration.metrics.push(entry.metadata.clone());
        }
        registration.stages = InitStage::ALL
            .iter()
            .map(|stage| stage.as_str().to_string())
            .collect();
        channel
            .emit(MetricEvent::Registration(registration))
            .map_err(|e| Error::EmitFailed(e.to_string()))?;
        set.initialized = true;
        Ok(())
    }

    /// Freezes the registry and sends an empty registration, telling the
    /// consumer that no metrics will follow.
    pub fn disable(&self, channel: &dyn EventChannel) -> Result<()> {
        let mut set = self.metrics.write();
        if set.initialized {
            return Err(Error::DoubleInitialize);
        }
        channel
            .emit(MetricEvent::Registration(MetricRegistration::default()))
            .map_err(|e| Error::EmitFailed(e.to_string()))?;
        set.initialized = true;
        Ok(())
    }

    /// Marks `stage` as started, implicitly ending any stage still in
    /// progress at the same instant. The returned finisher ends the stage
    /// when invoked, unless a later `start_stage` already rolled it over.
    ///
    /// May be called before the registry is initialized; early stages are
    /// expected to predate metric registration completing.
    pub fn start_stage(&self, stage: InitStage) -> StageFinisher<'_> {
        let now = time::wall_now();
        let mut stages = self.stages.write();
        stages.end_current(now);
        stages.current = Some((stage, now));
        StageFinisher {
            registry: self,
            stage,
        }
    }
}

/// Ends the stage a [`Registry::start_stage`] call began.
///
/// Idempotent: if another stage has been started since, the original stage
/// already ended at that point and `finish` does nothing.
pub struct StageFinisher<'a> {
    registry: &'a Registry,
    stage: InitStage,
}

impl StageFinisher<'_> {
    pub fn finish(self) {
        let now = time::wall_now();
        let mut stages = self.registry.stages.write();
        // A later start_stage may have ended this stage already; only end
        // it if it is still the current one.
        if stages.current.map(|(stage, _)| stage) == Some(self.stage) {
            stages.end_current(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::bucketer::ExponentialBucketer;
    use crate::events::ChannelError;

    #[derive(Default, Clone)]
    struct TestChannel {
        events: Arc<Mutex<Vec<MetricEvent>>>,
    }

    impl TestChannel {
        fn events(&self) -> Vec<MetricEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventChannel for TestChannel {
        fn emit(&self, event: MetricEvent) -> std::result::Result<(), ChannelError> {
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    struct RejectingChannel;

    impl EventChannel for RejectingChannel {
        fn emit(&self, _event: MetricEvent) -> std::result::Result<(), ChannelError> {
            Err("consumer went away".into())
        }
    }

    fn test_bucketer() -> Bucketer {
        Bucketer::Exponential(ExponentialBucketer::new(3, 10, 0.0, 2.0))
    }

    #[test]
    fn duplicate_names_rejected_across_kinds() {
        let registry = Registry::new();
        registry
            .register_counter("/a", false, Units::None, "a", &[])
            .unwrap();
        assert!(matches!(
            registry.register_counter("/a", false, Units::None, "again", &[]),
            Err(Error::NameInUse(name)) if name == "/a"
        ));
        assert!(matches!(
            registry.register_distribution(
                "/a",
                false,
                test_bucketer(),
                Units::None,
                "again",
                &[]
            ),
            Err(Error::NameInUse(_))
        ));
        registry
            .register_distribution("/d", false, test_bucketer(), Units::None, "d", &[])
            .unwrap();
        assert!(matches!(
            registry.register_counter("/d", false, Units::None, "collides", &[]),
            Err(Error::NameInUse(_))
        ));
    }

    #[test]
    fn counters_reject_multiple_fields() {
        let registry = Registry::new();
        let fields = [
            Field::new("color", &["red"]),
            Field::new("size", &["small"]),
        ];
        assert!(matches!(
            registry.register_counter("/c", false, Units::None, "c", &fields),
            Err(Error::TooManyFields(2))
        ));
    }

    #[test]
    fn comma_field_values_rejected() {
        let registry = Registry::new();
        assert!(matches!(
            registry.register_counter(
                "/c",
                false,
                Units::None,
                "c",
                &[Field::new("color", &["red,ish"])]
            ),
            Err(Error::FieldValueContainsIllegalChar(_))
        ));
        assert!(matches!(
            registry.register_distribution(
                "/d",
                false,
                test_bucketer(),
                Units::None,
                "d",
                &[Field::new("color", &["red,ish"])]
            ),
            Err(Error::FieldValueContainsIllegalChar(_))
        ));
    }

    #[test]
    fn registration_freezes_on_initialize() {
        let registry = Registry::new();
        let channel = TestChannel::default();
        registry
            .register_counter("/c", false, Units::None, "c", &[])
            .unwrap();
        registry.initialize(&channel).unwrap();
        assert!(matches!(
            registry.register_counter("/late", false, Units::None, "late", &[]),
            Err(Error::InitializationDone)
        ));
        assert!(matches!(
            registry.initialize(&channel),
            Err(Error::DoubleInitialize)
        ));
        assert!(matches!(
            registry.disable(&channel),
            Err(Error::DoubleInitialize)
        ));
    }

    #[test]
    fn initialize_announces_metadata_and_stages() {
        let registry = Registry::new();
        let channel = TestChannel::default();
        registry
            .register_counter(
                "/c",
                true,
                Units::None,
                "a counter",
                &[Field::new("color", &["red", "blue"])],
            )
            .unwrap();
        registry
            .register_distribution(
                "/d",
                false,
                test_bucketer(),
                Units::Nanoseconds,
                "a distribution",
                &[],
            )
            .unwrap();
        registry.initialize(&channel).unwrap();

        let events = channel.events();
        assert_eq!(events.len(), 1);
        let MetricEvent::Registration(registration) = &events[0] else {
            panic!("expected a registration event");
        };
        assert_eq!(registration.metrics.len(), 2);
        assert_eq!(
            registration.stages,
            vec![
                "restore_config",
                "exec_config",
                "restore",
                "create_process",
                "task_start",
            ]
        );
        let counter = registration
            .metrics
            .iter()
            .find(|m| m.name == "/c")
            .unwrap();
        assert_eq!(counter.kind, MetricKind::Uint64);
        assert!(counter.cumulative);
        assert!(counter.sync);
        assert_eq!(counter.fields.len(), 1);
        assert_eq!(counter.fields[0].allowed_values(), ["red", "blue"]);
        let distribution = registration
            .metrics
            .iter()
            .find(|m| m.name == "/d")
            .unwrap();
        assert_eq!(distribution.kind, MetricKind::Distribution);
        assert_eq!(distribution.units, Units::Nanoseconds);
        assert_eq!(
            distribution.distribution_bucket_lower_bounds,
            vec![0, 10, 20, 30]
        );
    }

    #[test]
    fn disable_announces_empty_registration() {
        let registry = Registry::new();
        let channel = TestChannel::default();
        registry
            .register_counter("/c", false, Units::None, "c", &[])
            .unwrap();
        registry.disable(&channel).unwrap();
        assert_eq!(
            channel.events(),
            vec![MetricEvent::Registration(MetricRegistration::default())]
        );
        assert!(matches!(
            registry.register_counter("/late", false, Units::None, "late", &[]),
            Err(Error::InitializationDone)
        ));
    }

    #[test]
    fn failed_initialize_leaves_registry_unfrozen() {
        let registry = Registry::new();
        registry
            .register_counter("/c", false, Units::None, "c", &[])
            .unwrap();
        assert!(matches!(
            registry.initialize(&RejectingChannel),
            Err(Error::EmitFailed(_))
        ));
        // Not frozen: registration and a retry both still work.
        registry
            .register_counter("/c2", false, Units::None, "c2", &[])
            .unwrap();
        registry.initialize(&TestChannel::default()).unwrap();
    }

    #[test]
    fn custom_counter_reads_through_source() {
        let registry = Registry::new();
        let reads = Arc::new(AtomicU64::new(7));
        let source = Arc::clone(&reads);
        registry
            .register_custom_counter(
                "/custom",
                true,
                false,
                Units::None,
                "custom",
                move |_fields| source.load(Ordering::Relaxed),
                &[],
            )
            .unwrap();
        let set = registry.metrics.read();
        assert_eq!(set.counters["/custom"].source.value(&[]), 7);
        reads.store(11, Ordering::Relaxed);
        assert_eq!(set.counters["/custom"].source.value(&[]), 11);
    }

    #[test]
    fn timer_registers_nanosecond_distribution() {
        let registry = Registry::new();
        let timer = registry
            .register_timer("/t", test_bucketer(), "timing", &[])
            .unwrap();
        {
            let set = registry.metrics.read();
            let metadata = &set.distributions["/t"].metadata;
            assert_eq!(metadata.units, Units::Nanoseconds);
            assert_eq!(metadata.kind, MetricKind::Distribution);
            assert!(!metadata.cumulative);
            assert!(!metadata.sync);
        }
        timer.start(&[]).finish(&[]);
    }

    #[test]
    fn stage_rollover_shares_the_timestamp() {
        let registry = Registry::new();
        let first = registry.start_stage(InitStage::RestoreConfig);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = registry.start_stage(InitStage::Restore);
        // The first stage was ended by the second start; its finisher is a
        // no-op now.
        first.finish();
        std::thread::sleep(std::time::Duration::from_millis(2));
        second.finish();

        let stages = registry.stages.read();
        assert!(stages.current.is_none());
        assert_eq!(stages.finished.len(), 2);
        assert_eq!(stages.finished[0].stage, InitStage::RestoreConfig);
        assert_eq!(stages.finished[1].stage, InitStage::Restore);
        assert_eq!(stages.finished[0].ended, stages.finished[1].started);
        assert!(stages.finished[1].ended > stages.finished[1].started);
    }

    #[test]
    fn finisher_is_idempotent_per_stage() {
        let registry = Registry::new();
        let finisher = registry.start_stage(InitStage::ExecConfig);
        finisher.finish();
        assert_eq!(registry.stages.read().finished.len(), 1);
        // Starting and finishing another stage still works.
        registry.start_stage(InitStage::CreateProcess).finish();
        let stages = registry.stages.read();
        assert_eq!(stages.finished.len(), 2);
        assert_eq!(stages.finished[1].stage, InitStage::CreateProcess);
    }

    #[test]
    fn default_registry_is_shared() {
        let first = Arc::clone(&DEFAULT_REGISTRY);
        let second = Arc::clone(&DEFAULT_REGISTRY);
        assert!(Arc::ptr_eq(&first, &second));
    }
}
