//! File-name extraction
//!
//! `<system>_<serial>_<...>.<suffix>`: the base name is split on `_` and each
//! segment is mapped to the label configured for its position under the
//! file's suffix. A trailing `EMPTY` segment marks a report without body data.

use std::collections::BTreeMap;

use super::coerce::Coercer;
use super::key_data::KeyData;
use super::path::map_segments;
use super::record::MetadataRecord;
use super::spec::LabelMap;
use crate::error::ExtractionError;

pub const EMPTY_SENTINEL: &str = "EMPTY";

pub const IS_EMPTY_KEY: &str = "isEmpty";

pub fn extract(
    key_data: &KeyData,
    specs: &BTreeMap<String, LabelMap>,
    coercer: &Coercer,
) -> Result<MetadataRecord, ExtractionError> {
    let dots = key_data.file_name.matches('.').count();
    if dots != 1 {
        return Err(ExtractionError::FileNameDots {
            file_name: key_data.file_name.clone(),
            dots,
        });
    }

    let labels = specs
        .get(&key_data.file_suffix)
        .ok_or_else(|| ExtractionError::UnknownSuffix(key_data.file_suffix.clone()))?;

    let mut segments: Vec<&str> = key_data.file_base_name.split('_').collect();
    let is_empty = segments.last() == Some(&EMPTY_SENTINEL);
    if is_empty {
        segments.pop();
    }

    if segments.len() != labels.len() {
        return Err(ExtractionError::SegmentCount {
            expected: labels.len(),
            actual: segments.len(),
        });
    }

    let mut record = map_segments(&segments, labels, coercer);
    if is_empty {
        record.insert(IS_EMPTY_KEY, true);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::spec::{FieldLabel, ParseAs};
    use serde_json::json;

    fn specs() -> BTreeMap<String, LabelMap> {
        let txt: LabelMap = [
            (1, FieldLabel::new("system", ParseAs::None)),
            (2, FieldLabel::new("serial", ParseAs::Integer)),
        ]
        .into_iter()
        .collect();
        [("txt".to_string(), txt)].into_iter().collect()
    }

    #[test]
    fn test_extract_segments() {
        let kd = KeyData::resolve("a/b/CMM_42.txt");
        let record = extract(&kd, &specs(), &Coercer::utc()).unwrap();
        assert_eq!(record.get("system"), Some(&json!("CMM")));
        assert_eq!(record.get("serial"), Some(&json!(42)));
        assert!(!record.contains_key(IS_EMPTY_KEY));
    }

    #[test]
    fn test_empty_sentinel() {
        let kd = KeyData::resolve("a/b/CMM_42_EMPTY.txt");
        let record = extract(&kd, &specs(), &Coercer::utc()).unwrap();
        assert_eq!(record.get(IS_EMPTY_KEY), Some(&json!(true)));
        assert_eq!(record.get("serial"), Some(&json!(42)));
    }

    #[test]
    fn test_sentinel_must_be_exact() {
        let kd = KeyData::resolve("a/b/CMM_42_empty.txt");
        assert_eq!(
            extract(&kd, &specs(), &Coercer::utc()),
            Err(ExtractionError::SegmentCount { expected: 2, actual: 3 })
        );
    }

    #[test]
    fn test_segment_count_mismatch() {
        let kd = KeyData::resolve("a/b/CMM.txt");
        assert_eq!(
            extract(&kd, &specs(), &Coercer::utc()),
            Err(ExtractionError::SegmentCount { expected: 2, actual: 1 })
        );
    }

    #[test]
    fn test_unknown_suffix() {
        let kd = KeyData::resolve("a/b/CMM_42.pdf");
        assert_eq!(
            extract(&kd, &specs(), &Coercer::utc()),
            Err(ExtractionError::UnknownSuffix("pdf".to_string()))
        );
    }

    #[test]
    fn test_requires_single_dot() {
        let kd = KeyData::resolve("a/b/CMM_42.v2.txt");
        assert_eq!(
            extract(&kd, &specs(), &Coercer::utc()),
            Err(ExtractionError::FileNameDots {
                file_name: "CMM_42.v2.txt".to_string(),
                dots: 2
            })
        );
    }
}
