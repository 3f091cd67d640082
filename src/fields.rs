//! Field dimensions and the field-tuple key mapper.

use ahash::AHashMap;

use crate::error::{Error, Result};

/// A named label dimension on a metric, constrained to a fixed set of
/// allowed string values. Allowed values are fixed at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    name: String,
    allowed_values: Vec<String>,
}

impl Field {
    pub fn new(name: &str, allowed_values: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            allowed_values: allowed_values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn allowed_values(&self) -> &[String] {
        &self.allowed_values
    }
}

/// Joins field values into the canonical comma-separated key. Commas are
/// the reserved delimiter and are rejected in values.
pub(crate) fn multi_field_to_key(values: &[&str]) -> Result<String> {
    if values.is_empty() {
        return Ok(String::new());
    }
    for value in values {
        if value.contains(',') {
            return Err(Error::FieldValueContainsIllegalChar((*value).to_string()));
        }
    }
    Ok(values.join(","))
}

/// The reverse of [`multi_field_to_key`].
pub(crate) fn key_to_multi_field(key: &str) -> Vec<String> {
    if key.is_empty() {
        return Vec::new();
    }
    key.split(',').map(str::to_string).collect()
}

/// Maps a tuple of field values to its precomputed concatenated key.
///
/// The tree has one level per field and one leaf per possible value
/// combination, each leaf holding the full comma-joined key. Building it is
/// memory-hungry (O(product of allowed values)) but lookups run without
/// allocating and with bounded stack use, which is what the sample path
/// needs. Construction recurses, lookup never does.
#[derive(Debug)]
pub(crate) enum FieldMapper {
    /// Terminal level; `key` is the concatenation of the values along the
    /// path from the root.
    Leaf { key: String },
    /// One level per remaining field, children keyed by allowed value.
    Node { children: AHashMap<String, FieldMapper> },
}

impl FieldMapper {
    /// Eagerly builds the full allowed-value tree for the given fields.
    pub(crate) fn new(fields: &[Field]) -> Result<FieldMapper> {
        let mut values = Vec::with_capacity(fields.len());
        Self::build(&mut values, fields)
    }

    fn build<'a>(values: &mut Vec<&'a str>, remaining: &'a [Field]) -> Result<FieldMapper> {
        let Some((current, rest)) = remaining.split_first() else {
            return Ok(FieldMapper::Leaf {
                key: multi_field_to_key(values)?,
            });
        };
        let mut children = AHashMap::with_capacity(current.allowed_values.len());
        for value in &current.allowed_values {
            values.push(value);
            let child = Self::build(values, rest)?;
            values.pop();
            children.insert(value.clone(), child);
        }
        Ok(FieldMapper::Node { children })
    }

    /// Looks up the key for exactly one value per field.
    ///
    /// Panics on a depth mismatch or a value outside the allowed set; both
    /// indicate a wiring bug at the call site. Allocates nothing.
    #[inline]
    pub(crate) fn lookup(&self, values: &[&str]) -> &str {
        self.lookup_concat(values, &[])
    }

    /// Like [`FieldMapper::lookup`] over the concatenation of two value
    /// slices, without materializing the concatenation.
    pub(crate) fn lookup_concat(&self, first: &[&str], second: &[&str]) -> &str {
        let mut node = self;
        for value in first.iter().chain(second) {
            let FieldMapper::Node { children } = node else {
                panic!("invalid field lookup depth");
            };
            node = children
                .get(*value)
                .unwrap_or_else(|| panic!("disallowed field value {value:?}"));
        }
        match node {
            FieldMapper::Leaf { key } => key,
            FieldMapper::Node { .. } => panic!("invalid field lookup depth"),
        }
    }

    /// Iterates all leaf keys. Registration-time only; used to pre-size
    /// distribution sample arrays.
    pub(crate) fn enumerate(&self) -> Vec<&str> {
        let mut keys = Vec::new();
        self.visit(&mut keys);
        keys
    }

    fn visit<'a>(&'a self, keys: &mut Vec<&'a str>) {
        match self {
            FieldMapper::Leaf { key } => keys.push(key),
            FieldMapper::Node { children } => {
                for child in children.values() {
                    child.visit(keys);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn color_and_size() -> Vec<Field> {
        vec![
            Field::new("color", &["red", "green", "blue"]),
            Field::new("size", &["small", "large"]),
        ]
    }

    #[test]
    fn key_round_trip() {
        let values = ["red", "small"];
        let key = multi_field_to_key(&values).unwrap();
        assert_eq!(key, "red,small");
        assert_eq!(key_to_multi_field(&key), vec!["red", "small"]);
    }

    #[test]
    fn empty_key_round_trip() {
        let key = multi_field_to_key(&[]).unwrap();
        assert_eq!(key, "");
        assert!(key_to_multi_field(&key).is_empty());
    }

    #[test]
    fn comma_in_value_rejected() {
        let err = multi_field_to_key(&["red,green"]).unwrap_err();
        assert!(matches!(err, Error::FieldValueContainsIllegalChar(v) if v == "red,green"));
    }

    #[test]
    fn mapper_rejects_comma_values() {
        let fields = [Field::new("color", &["red", "has,comma"])];
        assert!(matches!(
            FieldMapper::new(&fields),
            Err(Error::FieldValueContainsIllegalChar(_))
        ));
    }

    #[test]
    fn enumerates_all_combinations() {
        let mapper = FieldMapper::new(&color_and_size()).unwrap();
        let mut keys = mapper.enumerate();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "blue,large",
                "blue,small",
                "green,large",
                "green,small",
                "red,large",
                "red,small",
            ]
        );
    }

    #[test]
    fn lookup_matches_joined_key() {
        let mapper = FieldMapper::new(&color_and_size()).unwrap();
        for color in ["red", "green", "blue"] {
            for size in ["small", "large"] {
                let expected = multi_field_to_key(&[color, size]).unwrap();
                assert_eq!(mapper.lookup(&[color, size]), expected);
            }
        }
    }

    #[test]
    fn lookup_concat_matches_lookup() {
        let mapper = FieldMapper::new(&color_and_size()).unwrap();
        assert_eq!(
            mapper.lookup_concat(&["green"], &["large"]),
            mapper.lookup(&["green", "large"])
        );
        assert_eq!(
            mapper.lookup_concat(&[], &["blue", "small"]),
            "blue,small"
        );
        assert_eq!(
            mapper.lookup_concat(&["red", "small"], &[]),
            "red,small"
        );
    }

    #[test]
    fn zero_field_mapper_has_empty_key() {
        let mapper = FieldMapper::new(&[]).unwrap();
        assert_eq!(mapper.lookup(&[]), "");
        assert_eq!(mapper.enumerate(), vec![""]);
    }

    #[test]
    #[should_panic(expected = "invalid field lookup depth")]
    fn lookup_with_too_few_values_panics() {
        let mapper = FieldMapper::new(&color_and_size()).unwrap();
        mapper.lookup(&["red"]);
    }

    #[test]
    #[should_panic(expected = "invalid field lookup depth")]
    fn lookup_with_too_many_values_panics() {
        let mapper = FieldMapper::new(&color_and_size()).unwrap();
        mapper.lookup(&["red", "small", "extra"]);
    }

    #[test]
    #[should_panic(expected = "disallowed field value")]
    fn lookup_with_unknown_value_panics() {
        let mapper = FieldMapper::new(&color_and_size()).unwrap();
        mapper.lookup(&["purple", "small"]);
    }
}
