use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::fields::Field;

/// A cumulative unsigned 64-bit counter, optionally sharded by one field.
///
/// The fieldless form is a bare atomic and never locks. The one-field form
/// keeps one counter per allowed value behind a reader/writer lock, so
/// value reads don't block each other. More than one field is rejected at
/// registration; metrics that need more dimensions should be distributions
/// or several counters.
///
/// Values are not saved across restore and reset to zero.
pub struct Uint64Metric {
    /// Value of the fieldless form.
    value: AtomicU64,
    /// Per-value counters of the one-field form.
    fields: Option<RwLock<AHashMap<String, u64>>>,
}

impl Uint64Metric {
    pub(crate) fn new(fields: &[Field]) -> Self {
        let fields = match fields {
            [] => None,
            [field] => {
                let mut values = AHashMap::with_capacity(field.allowed_values().len());
                for value in field.allowed_values() {
                    values.insert(value.clone(), 0);
                }
                Some(RwLock::new(values))
            }
            _ => unreachable!("counters support at most one field"),
        };
        Self {
            value: AtomicU64::new(0),
            fields,
        }
    }

    fn num_fields(&self) -> usize {
        self.fields.is_some() as usize
    }

    /// Current value for the given field values.
    ///
    /// Panics on a field count mismatch or a disallowed value; both
    /// indicate a wiring bug at the call site.
    pub fn value(&self, field_values: &[&str]) -> u64 {
        self.check_field_count(field_values);
        match &self.fields {
            None => self.value.load(Ordering::Relaxed),
            Some(fields) => {
                let fields = fields.read();
                let value = field_values[0];
                *fields
                    .get(value)
                    .unwrap_or_else(|| panic!("metric does not allow field value {value:?}"))
            }
        }
    }

    /// Increments the counter by 1.
    pub fn increment(&self, field_values: &[&str]) {
        self.increment_by(1, field_values);
    }

    /// Increments the counter by `v`.
    ///
    /// Panics on a field count mismatch or a disallowed value.
    pub fn increment_by(&self, v: u64, field_values: &[&str]) {
        self.check_field_count(field_values);
        match &self.fields {
            None => {
                self.value.fetch_add(v, Ordering::Relaxed);
            }
            Some(fields) => {
                let mut fields = fields.write();
                let value = field_values[0];
                match fields.get_mut(value) {
                    Some(cell) => *cell = cell.wrapping_add(v),
                    None => panic!("metric does not allow field value {value:?}"),
                }
            }
        }
    }

    #[inline]
    fn check_field_count(&self, field_values: &[&str]) {
        let expected = self.num_fields();
        assert!(
            field_values.len() == expected,
            "number of field values {} does not match the metric's field count {}",
            field_values.len(),
            expected
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn fieldless_increments_sum() {
        let metric = Uint64Metric::new(&[]);
        metric.increment(&[]);
        metric.increment_by(4, &[]);
        assert_eq!(metric.value(&[]), 5);
    }

    #[test]
    fn fieldless_concurrent_increments_sum() {
        let metric = Arc::new(Uint64Metric::new(&[]));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let metric = Arc::clone(&metric);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        metric.increment_by(3, &[]);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metric.value(&[]), 4 * 1_000 * 3);
    }

    #[test]
    fn field_values_are_independent() {
        let metric = Uint64Metric::new(&[Field::new("color", &["red", "blue"])]);
        metric.increment(&["red"]);
        metric.increment_by(2, &["blue"]);
        metric.increment(&["red"]);
        assert_eq!(metric.value(&["red"]), 2);
        assert_eq!(metric.value(&["blue"]), 2);
    }

    #[test]
    #[should_panic(expected = "does not allow field value")]
    fn unknown_field_value_panics() {
        let metric = Uint64Metric::new(&[Field::new("color", &["red", "blue"])]);
        metric.increment(&["green"]);
    }

    #[test]
    #[should_panic(expected = "number of field values")]
    fn wrong_field_count_panics() {
        let metric = Uint64Metric::new(&[]);
        metric.increment(&["red"]);
    }

    #[test]
    #[should_panic(expected = "number of field values")]
    fn missing_field_value_panics() {
        let metric = Uint64Metric::new(&[Field::new("color", &["red", "blue"])]);
        metric.value(&[]);
    }
}
