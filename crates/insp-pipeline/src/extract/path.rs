//! Folder-tree extraction

use super::coerce::Coercer;
use super::key_data::KeyData;
use super::record::MetadataRecord;
use super::spec::LabelMap;
use crate::error::ExtractionError;

/// Spreadsheet-style reports are filed under a fixed folder depth
pub const WIDE_SUFFIXES: &[&str] = &["xls", "xlsx", "xlsm", "ods"];

pub const WIDE_FOLDER_DEPTH: usize = 5;

/// Expected number of folder segments for a file with `suffix`
pub fn expected_depth(suffix: &str, labels: &LabelMap) -> usize {
    if WIDE_SUFFIXES.contains(&suffix) {
        WIDE_FOLDER_DEPTH
    } else {
        labels.len()
    }
}

/// Map folder segments to labelled, coerced fields
pub fn extract(
    key_data: &KeyData,
    labels: &LabelMap,
    coercer: &Coercer,
) -> Result<MetadataRecord, ExtractionError> {
    let folders = key_data.folders();
    let expected = expected_depth(&key_data.file_suffix, labels);

    if folders.len() != expected {
        return Err(ExtractionError::PathDepth {
            expected,
            actual: folders.len(),
        });
    }

    Ok(map_segments(folders, labels, coercer))
}

/// Shared by the path and filename phases: position `i + 1` gets the label
/// configured for it, unlabeled positions are skipped.
pub(crate) fn map_segments<S: AsRef<str>>(
    segments: &[S],
    labels: &LabelMap,
    coercer: &Coercer,
) -> MetadataRecord {
    let mut record = MetadataRecord::new();

    for (index, segment) in segments.iter().enumerate() {
        let Some(label) = labels.get(&(index as u32 + 1)) else {
            continue;
        };
        let Some(name) = label.label() else {
            continue;
        };
        record.apply_field(name, coercer.field(name, segment.as_ref(), label.parse_as));
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::spec::{FieldLabel, ParseAs, Substitution, SubstitutionTable};
    use chrono::{Offset, Utc};
    use serde_json::json;

    fn labels(entries: &[(u32, &str, ParseAs)]) -> LabelMap {
        entries
            .iter()
            .map(|(pos, name, parse_as)| (*pos, FieldLabel::new(*name, *parse_as)))
            .collect()
    }

    #[test]
    fn test_extract_labels_and_placeholders() {
        let kd = KeyData::resolve("north/2023/lineA/7/report.txt");
        let labels = labels(&[
            (1, "site", ParseAs::None),
            (2, "year", ParseAs::Integer),
            (3, "", ParseAs::None),
            (4, "station", ParseAs::Integer),
        ]);

        let record = extract(&kd, &labels, &Coercer::utc()).unwrap();
        assert_eq!(record.get("site"), Some(&json!("north")));
        assert_eq!(record.get("year"), Some(&json!(2023)));
        assert_eq!(record.get("station"), Some(&json!(7)));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_depth_mismatch_is_structural_error() {
        let kd = KeyData::resolve("north/2023/report.txt");
        let labels = labels(&[(1, "site", ParseAs::None), (2, "year", ParseAs::None), (3, "x", ParseAs::None)]);

        assert_eq!(
            extract(&kd, &labels, &Coercer::utc()),
            Err(ExtractionError::PathDepth { expected: 3, actual: 2 })
        );
    }

    #[test]
    fn test_wide_suffix_uses_fixed_depth() {
        let labels = labels(&[(1, "site", ParseAs::None), (2, "year", ParseAs::Integer)]);

        let kd = KeyData::resolve("a/2021/c/d/e/sheet.xlsx");
        let record = extract(&kd, &labels, &Coercer::utc()).unwrap();
        assert_eq!(record.get("site"), Some(&json!("a")));
        assert_eq!(record.get("year"), Some(&json!(2021)));

        let kd = KeyData::resolve("a/2021/sheet.xlsx");
        assert_eq!(
            extract(&kd, &labels, &Coercer::utc()),
            Err(ExtractionError::PathDepth { expected: 5, actual: 2 })
        );
    }

    #[test]
    fn test_substitution_keyed_by_label_name() {
        let coercer = Coercer::new(
            Utc.fix(),
            SubstitutionTable::new(&[Substitution {
                key: "site".to_string(),
                old_value: "North Plant".to_string(),
                new_value: "NP".to_string(),
            }]),
        );
        let kd = KeyData::resolve("North Plant/x/report.txt");
        let labels = labels(&[(1, "site", ParseAs::None), (2, "", ParseAs::None)]);

        let record = extract(&kd, &labels, &coercer).unwrap();
        assert_eq!(record.get("site"), Some(&json!("NP")));
    }

    #[test]
    fn test_failed_coercion_keeps_raw_value() {
        let kd = KeyData::resolve("north/twenty/report.txt");
        let labels = labels(&[(1, "site", ParseAs::None), (2, "year", ParseAs::Integer)]);

        let record = extract(&kd, &labels, &Coercer::utc()).unwrap();
        assert_eq!(record.get("nonparsed_year"), Some(&json!("twenty")));
        assert!(record.has_nonparsed());
    }
}
