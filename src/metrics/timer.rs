use std::sync::Arc;

use crate::metrics::distribution::DistributionMetric;
use crate::time;

/// Wraps a nanosecond-unit distribution with start/finish latency
/// measurement, a popular specialization of distributions.
#[derive(Clone)]
pub struct TimerMetric {
    distribution: Arc<DistributionMetric>,
}

impl TimerMetric {
    pub(crate) fn new(distribution: Arc<DistributionMetric>) -> Self {
        Self { distribution }
    }

    #[cfg(test)]
    pub(crate) fn distribution(&self) -> &DistributionMetric {
        &self.distribution
    }

    /// Starts a timed operation.
    ///
    /// `partial_fields` may be a prefix of the metric's fields; the rest is
    /// supplied to [`TimedOperation::finish`] once the operation's path is
    /// known. The prefix is held by reference, nothing is allocated.
    #[inline]
    pub fn start<'a>(&'a self, partial_fields: &'a [&'a str]) -> TimedOperation<'a> {
        TimedOperation {
            metric: self,
            partial_fields,
            started_ns: time::cheap_now_nanos(),
        }
    }
}

/// Tracks the time elapsed between an operation starting and finishing.
#[must_use = "a timed operation records nothing until finish is called"]
pub struct TimedOperation<'a> {
    metric: &'a TimerMetric,
    partial_fields: &'a [&'a str],
    started_ns: i64,
}

impl TimedOperation<'_> {
    /// Records the elapsed time under the concatenation of the start-time
    /// prefix and `extra_fields`.
    ///
    /// Panics if the combined field count does not match the metric's.
    pub fn finish(self, extra_fields: &[&str]) {
        let ended = time::cheap_now_nanos();
        let key = self
            .metric
            .distribution
            .fields_to_key
            .lookup_concat(self.partial_fields, extra_fields);
        self.metric
            .distribution
            .add_sample_by_key(ended - self.started_ns, key);
    }
}
