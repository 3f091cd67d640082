use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;

use crate::bucketer::Bucketer;
use crate::error::Result;
use crate::fields::{Field, FieldMapper};

/// A distribution of sample values over finite buckets, sharded by any
/// number of fields.
///
/// The bucket array for every possible field key is pre-sized at
/// registration, so recording a sample is a key lookup plus one atomic add:
/// no locks, no allocation. Concurrent samples commute; totals are the sum
/// of independently updated cells.
pub struct DistributionMetric {
    /// The bucketing scheme, held as a tagged variant so the sample path
    /// dispatches statically.
    bucketer: Bucketer,
    /// Converts field tuples to the key used in `samples`.
    pub(crate) fields_to_key: FieldMapper,
    /// Bucket counters per field key. Index 0 is the underflow bucket,
    /// index `num_finite_buckets + 1` the overflow bucket; the i-th cell in
    /// between counts samples in the bucketer's (i-1)-th finite bucket.
    pub(crate) samples: AHashMap<String, Vec<AtomicU64>>,
}

impl DistributionMetric {
    pub(crate) fn new(bucketer: Bucketer, fields: &[Field]) -> Result<Self> {
        let fields_to_key = FieldMapper::new(fields)?;
        let num_buckets = bucketer.num_finite_buckets() + 2;
        let keys = fields_to_key.enumerate();
        let mut samples = AHashMap::with_capacity(keys.len());
        for key in keys {
            let mut buckets = Vec::new();
            buckets.resize_with(num_buckets, || AtomicU64::new(0));
            samples.insert(key.to_string(), buckets);
        }
        Ok(Self {
            bucketer,
            fields_to_key,
            samples,
        })
    }

    /// Adds a sample to the distribution.
    ///
    /// Panics on a field count mismatch or a disallowed value.
    #[inline]
    pub fn add_sample(&self, sample: i64, field_values: &[&str]) {
        self.add_sample_by_key(sample, self.fields_to_key.lookup(field_values));
    }

    /// Like [`DistributionMetric::add_sample`] with the field key already
    /// resolved.
    #[inline]
    pub(crate) fn add_sample_by_key(&self, sample: i64, key: &str) {
        let bucket = self.bucketer.bucket_index(sample);
        // bucket is in [-1, num_finite_buckets]; storage shifts the
        // underflow bucket to index 0.
        self.samples[key][(bucket + 1) as usize].fetch_add(1, Ordering::Relaxed);
    }
}
