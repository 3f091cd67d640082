//! Sample bucketing schemes for distributions.

use std::time::Duration;

/// Minimum and maximum finite buckets for exponential bucketers.
const EXPONENTIAL_MIN_BUCKETS: usize = 1;
const EXPONENTIAL_MAX_BUCKETS: usize = 100;

/// Buckets samples with the first bucket starting at 0 with `width` width,
/// and each subsequent bucket wider by a scaled exponentially-growing
/// series.
///
/// Lower bounds are precomputed at construction so the index function is a
/// plain binary search over an array.
#[derive(Debug, Clone)]
pub struct ExponentialBucketer {
    num_finite_buckets: usize,
    /// Precomputed lower bounds. The underflow bucket has no lower bound
    /// and is not included: `lower_bounds[0]` is the lower bound of the
    /// first finite bucket (and the upper bound of the underflow bucket),
    /// `lower_bounds[num_finite_buckets]` the lower bound of the overflow
    /// bucket.
    lower_bounds: Vec<i64>,
    /// Largest sample value representable in a finite bucket.
    max_sample: i64,
}

impl ExponentialBucketer {
    /// Builds the bucketer and precomputes all lower bounds.
    ///
    /// Bucket sizes are floored, so `width` and `growth` must be large
    /// enough that the second bucket is actually wider than the first after
    /// flooring (unless fixed-width buckets are what's desired).
    ///
    /// Panics if `num_finite_buckets` is outside `[1, 100]`.
    pub fn new(num_finite_buckets: usize, width: u64, scale: f64, growth: f64) -> Self {
        assert!(
            (EXPONENTIAL_MIN_BUCKETS..=EXPONENTIAL_MAX_BUCKETS).contains(&num_finite_buckets),
            "number of finite buckets must be in [{EXPONENTIAL_MIN_BUCKETS}, {EXPONENTIAL_MAX_BUCKETS}], got {num_finite_buckets}"
        );
        let mut lower_bounds = vec![0i64; num_finite_buckets + 1];
        for (i, bound) in lower_bounds.iter_mut().enumerate().skip(1) {
            *bound = (width as f64 * i as f64 + scale * growth.powf((i - 1) as f64)) as i64;
        }
        let max_sample = lower_bounds[num_finite_buckets] - 1;
        Self {
            num_finite_buckets,
            lower_bounds,
            max_sample,
        }
    }

    pub fn num_finite_buckets(&self) -> usize {
        self.num_finite_buckets
    }

    /// Inclusive lower bound of the given bucket, for indices in
    /// `[0, num_finite_buckets]`. The upper bound of a bucket is the lower
    /// bound of the next one; the overflow bucket has none.
    pub fn lower_bound(&self, bucket_index: usize) -> i64 {
        self.lower_bounds[bucket_index]
    }

    pub(crate) fn lower_bounds(&self) -> &[i64] {
        &self.lower_bounds
    }

    /// Index of the bucket `sample` falls into: -1 for the underflow
    /// bucket, `num_finite_buckets` for the overflow bucket, otherwise the
    /// finite bucket index such that
    /// `lower_bound(i) <= sample < lower_bound(i + 1)`.
    ///
    /// Allocation-free and non-recursive; suitable for the sample path.
    #[inline]
    pub fn bucket_index(&self, sample: i64) -> isize {
        if sample < 0 {
            return -1;
        }
        if sample == 0 {
            return 0;
        }
        if sample > self.max_sample {
            return self.num_finite_buckets as isize;
        }
        // For the few dozen buckets this scheme allows, a binary search
        // beats computing a logarithm.
        let mut low = 0;
        let mut high = self.num_finite_buckets;
        loop {
            let pivot = (high + low) >> 1;
            if sample < self.lower_bounds[pivot] {
                high = pivot;
                continue;
            }
            if sample >= self.lower_bounds[pivot + 1] {
                low = pivot;
                continue;
            }
            return pivot as isize;
        }
    }
}

/// The bucketing schemes a distribution can use.
///
/// The sample path matches on the variant and calls the concrete
/// bucket-index function directly, keeping it free of dynamic dispatch.
/// Adding a scheme means adding a variant and its match arms.
#[derive(Debug, Clone)]
pub enum Bucketer {
    Exponential(ExponentialBucketer),
}

impl Bucketer {
    #[inline]
    pub fn bucket_index(&self, sample: i64) -> isize {
        match self {
            Bucketer::Exponential(bucketer) => bucketer.bucket_index(sample),
        }
    }

    pub fn num_finite_buckets(&self) -> usize {
        match self {
            Bucketer::Exponential(bucketer) => bucketer.num_finite_buckets(),
        }
    }

    pub(crate) fn lower_bounds(&self) -> &[i64] {
        match self {
            Bucketer::Exponential(bucketer) => bucketer.lower_bounds(),
        }
    }
}

impl From<ExponentialBucketer> for Bucketer {
    fn from(bucketer: ExponentialBucketer) -> Self {
        Bucketer::Exponential(bucketer)
    }
}

/// Minimum number of buckets for [`duration_bucketer`].
const DURATION_MIN_BUCKETS: usize = 3;

/// Returns a bucketer well-suited for measuring durations in nanoseconds.
///
/// `min_duration` and `max_duration` are conservative estimates of the
/// minimum and maximum durations expected to be accurately measured: the
/// finite buckets span roughly that range, with bucket widths growing
/// exponentially towards the maximum.
///
/// Panics if `num_finite_buckets` is below 3.
pub fn duration_bucketer(
    num_finite_buckets: usize,
    min_duration: Duration,
    max_duration: Duration,
) -> Bucketer {
    assert!(
        num_finite_buckets >= DURATION_MIN_BUCKETS,
        "duration bucketer must have at least {DURATION_MIN_BUCKETS} buckets, got {num_finite_buckets}"
    );
    let min_ns = min_duration.as_nanos() as i64;
    let exponent_covers_ns = (max_duration.as_nanos() as i64
        - (num_finite_buckets - DURATION_MIN_BUCKETS) as i64 * min_ns)
        as f64
        / min_ns as f64;
    let exponent =
        exponent_covers_ns.ln() / ((num_finite_buckets - DURATION_MIN_BUCKETS) as f64).ln();
    let min_ns = (min_ns as f64 / exponent) as i64;
    Bucketer::Exponential(ExponentialBucketer::new(
        num_finite_buckets,
        min_ns as u64,
        min_ns as f64,
        exponent,
    ))
}
