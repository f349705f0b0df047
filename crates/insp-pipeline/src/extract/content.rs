//! Free-text report body extraction

use regex::Regex;
use tracing::{debug, warn};

use super::coerce::Coercer;
use super::record::MetadataRecord;
use super::spec::{ContentRule, PatternId};

impl PatternId {
    /// Regex capturing the value that follows `search_key` up to end of line
    pub fn build(self, search_key: &str) -> Result<Regex, regex::Error> {
        let key = regex::escape(search_key.trim());
        let separator = match self {
            PatternId::KeyColonValue => ":",
            PatternId::KeyEqualsValue => "=",
        };
        Regex::new(&format!(
            r"(?m)(?:^|[^\w]){}[ \t]*{}[ \t]*([^\r\n]*)",
            key, separator
        ))
    }
}

/// Compiled content rules, built once per batch
#[derive(Debug, Clone)]
pub struct ContentExtractor {
    rules: Vec<(ContentRule, Option<Regex>)>,
}

impl ContentExtractor {
    pub fn new(rules: &[ContentRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| {
                let regex = match rule.pattern.pattern_id.build(&rule.pattern.search_key) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        warn!(
                            property_key = %rule.property_key,
                            error = %e,
                            "Content rule could not be compiled; it will never match"
                        );
                        None
                    }
                };
                (rule.clone(), regex)
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run every rule over `text`; rules without a match contribute nothing
    pub fn extract(&self, text: &str, coercer: &Coercer) -> MetadataRecord {
        let mut record = MetadataRecord::new();

        for (rule, regex) in &self.rules {
            let Some(regex) = regex else {
                continue;
            };
            let Some(value) = regex
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
            else {
                debug!(property_key = %rule.property_key, "No match for content rule");
                continue;
            };

            record.apply_field(
                &rule.property_key,
                coercer.field(&rule.property_key, value, rule.parse_as),
            );
        }

        record
    }
}
