//! Metric kinds and the metadata shared by registration and emission.

use smallvec::SmallVec;

use crate::fields::Field;

pub(crate) mod counter;
pub(crate) mod distribution;
pub(crate) mod timer;

/// What a metric measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Unsigned 64-bit counter, cumulative or custom-read.
    Uint64,
    /// Bucketed distribution of samples.
    Distribution,
}

/// Units attached to a metric's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    #[default]
    None,
    Nanoseconds,
}

/// Immutable description of a registered metric, fixed at registration and
/// announced to the consumer in the registration message.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricMetadata {
    /// Globally unique name, conventionally starting with `/`.
    pub name: String,
    pub description: String,
    /// Whether the emitted value is a running total since process start.
    pub cumulative: bool,
    /// Synchronous emission semantics at the consumer; opaque here and
    /// propagated as-is.
    pub sync: bool,
    pub kind: MetricKind,
    pub units: Units,
    /// Ordered field dimensions.
    pub fields: SmallVec<[Field; 2]>,
    /// For distributions, the lower bounds of the finite buckets plus the
    /// overflow bucket. Empty for counters.
    pub distribution_bucket_lower_bounds: Vec<i64>,
}
