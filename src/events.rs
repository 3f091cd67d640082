//! Messages sent to the external consumer and the channel they travel on.

use crate::metrics::MetricMetadata;
use crate::stage::StageTiming;

/// Transport error produced by an [`EventChannel`] implementation.
pub type ChannelError = Box<dyn std::error::Error + Send + Sync>;

/// A sink accepting metric events, implemented by the host over whatever
/// transport reaches the consumer.
///
/// Implementations must not call back into the registry the events came
/// from; registration and snapshot locks may be held across `emit`.
pub trait EventChannel: Send + Sync {
    fn emit(&self, event: MetricEvent) -> std::result::Result<(), ChannelError>;
}

/// The messages a consumer can receive.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricEvent {
    /// One-shot schema announcement, sent by initialize/disable.
    Registration(MetricRegistration),
    /// Delta update, sent when values changed or stages finished.
    Update(MetricUpdate),
}

/// Metadata for every registered metric plus the ordered list of known
/// init stages. An empty registration means metric collection is disabled
/// and no updates will follow.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricRegistration {
    pub metrics: Vec<MetricMetadata>,
    pub stages: Vec<String>,
}

/// Changed metric values and newly finished stages since the previous
/// update.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricUpdate {
    pub metrics: Vec<MetricValue>,
    pub stage_timing: Vec<StageTiming>,
}

/// A single changed value.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricValue {
    pub name: String,
    /// One value per field dimension; empty for fieldless metrics.
    pub field_values: Vec<String>,
    pub value: Value,
}

/// The payload of a [`MetricValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Current value of a counter.
    Uint64(u64),
    /// Per-bucket sample counts added since the previous update, underflow
    /// bucket first and overflow bucket last.
    Distribution { new_samples: Vec<u64> },
}
