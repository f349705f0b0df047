//! Flat metadata record produced by the extractors

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::coerce::FieldOutcome;

/// Prefix for fields whose value could not be coerced to the requested type
pub const NONPARSED_PREFIX: &str = "nonparsed_";

/// Flat `key -> scalar` map. Keys are kept sorted so serialized records diff
/// cleanly between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord(BTreeMap<String, Value>);

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Store a coerced field, or its raw value under `nonparsed_<key>`
    pub fn apply_field(&mut self, key: &str, outcome: FieldOutcome) {
        match outcome {
            FieldOutcome::Parsed(value) => {
                self.0.insert(key.to_string(), value);
            }
            FieldOutcome::Nonparsed(raw) => {
                self.0
                    .insert(format!("{}{}", NONPARSED_PREFIX, key), Value::String(raw));
            }
        }
    }

    /// Overlay `other` on top of `self`; `other` wins on key collision
    pub fn merge(&mut self, other: MetadataRecord) {
        self.0.extend(other.0);
    }

    pub fn has_nonparsed(&self) -> bool {
        self.0.keys().any(|k| k.starts_with(NONPARSED_PREFIX))
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.0.clone().into_iter().collect::<Map<_, _>>())
    }
}

impl FromIterator<(String, Value)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
