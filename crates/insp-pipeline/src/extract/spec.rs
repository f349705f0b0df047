//! Extraction rule document
//!
//! The document is versioned and owned by the configuration store; the
//! pipeline only reads it. Shape (JSON):
//!
//! ```json
//! {
//!   "parserVersion": "3.1.0",
//!   "folderTreeExtractionSpec": { "1": { "name": "site" }, "2": { "name": "year", "parseAs": "integer" } },
//!   "fileNameExtractionSpec": { "txt": { "1": { "name": "system" }, "2": { "name": "serial" } } },
//!   "fileContentExtractionSpec": [
//!     { "propertyKey": "operator", "pattern": { "patternId": "keyColonValue", "searchKey": "Operator" } }
//!   ],
//!   "knownExceptions": { "substituteValues": [ { "key": "site", "oldValue": "North Plant", "newValue": "NP" } ] }
//! }
//! ```
//!
//! Positions are 1-based. A position whose `name` is empty is a placeholder:
//! it counts towards the expected segment count but produces no field.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::SpecError;

/// Position (1-based) to label
pub type LabelMap = BTreeMap<u32, FieldLabel>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSpec {
    pub parser_version: String,
    #[serde(default)]
    pub folder_tree_extraction_spec: LabelMap,
    /// Keyed by lowercase file suffix
    #[serde(default)]
    pub file_name_extraction_spec: BTreeMap<String, LabelMap>,
    #[serde(default)]
    pub file_content_extraction_spec: Vec<ContentRule>,
    #[serde(default)]
    pub known_exceptions: KnownExceptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldLabel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub parse_as: ParseAs,
}

impl FieldLabel {
    pub fn new(name: impl Into<String>, parse_as: ParseAs) -> Self {
        Self {
            name: name.into(),
            parse_as,
        }
    }

    /// `None` for placeholder positions
    pub fn label(&self) -> Option<&str> {
        let name = self.name.trim();
        (!name.is_empty()).then_some(name)
    }
}

/// Target type of a coerced value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseAs {
    #[default]
    #[serde(alias = "string")]
    None,
    Integer,
    Float,
    Date,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRule {
    pub property_key: String,
    pub pattern: ContentPattern,
    #[serde(default)]
    pub parse_as: ParseAs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPattern {
    pub pattern_id: PatternId,
    pub search_key: String,
}

/// Predefined value-capture patterns for report bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PatternId {
    /// `<searchKey>: <value until end of line>`
    KeyColonValue,
    /// `<searchKey> = <value until end of line>`
    KeyEqualsValue,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnownExceptions {
    #[serde(default)]
    pub substitute_values: Vec<Substitution>,
}

/// Replace `old_value` by `new_value` for field `key` before coercion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substitution {
    pub key: String,
    pub old_value: String,
    pub new_value: String,
}

impl ExtractionSpec {
    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self, SpecError> {
        let spec: Self = serde_json::from_str(json).map_err(|e| SpecError::Parse(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), SpecError> {
        if self.parser_version.trim().is_empty() {
            return Err(SpecError::MissingParserVersion);
        }

        validate_positions("folderTreeExtractionSpec", &self.folder_tree_extraction_spec)?;

        for (suffix, labels) in &self.file_name_extraction_spec {
            if suffix.is_empty() || suffix.to_lowercase() != *suffix {
                return Err(SpecError::InvalidSuffix(suffix.clone()));
            }
            validate_positions(&format!("fileNameExtractionSpec.{}", suffix), labels)?;
        }

        let mut seen = HashSet::new();
        for (index, rule) in self.file_content_extraction_spec.iter().enumerate() {
            if rule.property_key.trim().is_empty() {
                return Err(SpecError::EmptyContentRule {
                    index,
                    field: "propertyKey",
                });
            }
            if rule.pattern.search_key.trim().is_empty() {
                return Err(SpecError::EmptyContentRule {
                    index,
                    field: "searchKey",
                });
            }
            if !seen.insert(rule.property_key.as_str()) {
                return Err(SpecError::DuplicatePropertyKey(rule.property_key.clone()));
            }
        }

        Ok(())
    }

    pub fn file_name_labels(&self, suffix: &str) -> Option<&LabelMap> {
        self.file_name_extraction_spec.get(suffix)
    }

    pub fn substitutions(&self) -> SubstitutionTable {
        SubstitutionTable::new(&self.known_exceptions.substitute_values)
    }
}

fn validate_positions(section: &str, labels: &LabelMap) -> Result<(), SpecError> {
    let len = labels.len();
    for position in labels.keys() {
        if *position == 0 || *position as usize > len {
            return Err(SpecError::PositionOutOfRange {
                section: section.to_string(),
                position: *position,
                len,
            });
        }
    }
    Ok(())
}

/// Lookup table for `(key, oldValue) -> newValue`
#[derive(Debug, Clone, Default)]
pub struct SubstitutionTable {
    entries: HashMap<(String, String), String>,
}

impl SubstitutionTable {
    pub fn new(substitutions: &[Substitution]) -> Self {
        let entries = substitutions
            .iter()
            .map(|s| ((s.key.clone(), s.old_value.clone()), s.new_value.clone()))
            .collect();
        Self { entries }
    }

    /// Substituted value, or `raw` when no entry matches
    pub fn apply<'a>(&'a self, key: &str, raw: &'a str) -> &'a str {
        self.entries
            .get(&(key.to_string(), raw.to_string()))
            .map(String::as_str)
            .unwrap_or(raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
