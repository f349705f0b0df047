//! Per-file composition of the extractors, the tee and the chopper

use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::chop::{ChopOutcome, Chopper};
use crate::error::{ExtractionError, PipelineError, PipelineResult};
use crate::extract::coerce::to_iso;
use crate::extract::{filename, path, Coercer, ContentExtractor, ExtractionSpec, KeyData, MetadataRecord};
use crate::stream::{hash_view, text_view, ByteReader, Tee, DEFAULT_VIEW_CAPACITY};

pub const PARSER_VERSION_KEY: &str = "parserVersion";
pub const PARSED_AT_KEY: &str = "parsedAt";
pub const METADATA_CHANGED_AT_KEY: &str = "metadataChangedAt";

/// Which suffixes get content extraction and which get chopped
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub text_suffixes: HashSet<String>,
    pub tabular_suffixes: HashSet<String>,
    pub view_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            text_suffixes: HashSet::from(["txt".to_string()]),
            tabular_suffixes: HashSet::from(["csv".to_string()]),
            view_capacity: DEFAULT_VIEW_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseOutcome {
    pub metadata: MetadataRecord,
    /// SHA-256 hex of the raw object bytes
    pub hash: String,
    /// A structural extraction error occurred or a field is `nonparsed_*`
    pub errors: bool,
    pub report_id: Option<i64>,
    #[serde(skip)]
    pub chop: ChopOutcome,
}

pub struct FileProcessor {
    spec: Arc<ExtractionSpec>,
    coercer: Arc<Coercer>,
    content: ContentExtractor,
    chopper: Chopper,
    config: ProcessorConfig,
}

impl FileProcessor {
    pub fn new(
        spec: Arc<ExtractionSpec>,
        coercer: Arc<Coercer>,
        chopper: Chopper,
        config: ProcessorConfig,
    ) -> Self {
        let content = ContentExtractor::new(&spec.file_content_extraction_spec);
        Self {
            spec,
            coercer,
            content,
            chopper,
            config,
        }
    }

    /// Process one object. Structural extraction errors are absorbed into
    /// `errors`; stream failures and unknown system codes are returned.
    #[instrument(skip(self, key_data, body), fields(key = %key_data.key))]
    pub async fn process(
        &self,
        bucket: &str,
        key_data: &KeyData,
        body: ByteReader,
    ) -> PipelineResult<ParseOutcome> {
        let mut structural_error = false;

        let path_record = self.phase(
            "path",
            key_data,
            path::extract(key_data, &self.spec.folder_tree_extraction_spec, &self.coercer),
            &mut structural_error,
        );
        let filename_record = self.phase(
            "filename",
            key_data,
            filename::extract(key_data, &self.spec.file_name_extraction_spec, &self.coercer),
            &mut structural_error,
        );

        let (hash, content_record, chop) = self.stream_phase(bucket, key_data, body).await?;

        let mut metadata = path_record;
        metadata.merge(content_record);
        metadata.merge(filename_record);
        metadata.merge(self.generated());

        let errors = structural_error || metadata.has_nonparsed();
        debug!(fields = metadata.len(), errors, "File processed");

        Ok(ParseOutcome {
            metadata,
            hash,
            errors,
            report_id: chop.report_id(),
            chop,
        })
    }

    fn phase(
        &self,
        phase: &'static str,
        key_data: &KeyData,
        result: Result<MetadataRecord, ExtractionError>,
        structural_error: &mut bool,
    ) -> MetadataRecord {
        result.unwrap_or_else(|e| {
            warn!(
                key = %key_data.key,
                phase,
                error_kind = e.kind(),
                error = %e,
                "Extraction phase failed"
            );
            *structural_error = true;
            MetadataRecord::new()
        })
    }

    /// Hash, content and chop over one read of the body; any failure fails all
    async fn stream_phase(
        &self,
        bucket: &str,
        key_data: &KeyData,
        body: ByteReader,
    ) -> PipelineResult<(String, MetadataRecord, ChopOutcome)> {
        let suffix = key_data.file_suffix.as_str();
        let capacity = self.config.view_capacity;

        let mut tee = Tee::new(body);
        let hash_source = tee.view(capacity);
        let content_source = (self.config.text_suffixes.contains(suffix) && !self.content.is_empty())
            .then(|| tee.view(capacity));
        let chop_source = self
            .config
            .tabular_suffixes
            .contains(suffix)
            .then(|| tee.view(capacity));

        let pump = async { tee.pump().await.map_err(PipelineError::from) };
        let hash = async { hash_view(hash_source).await.map_err(PipelineError::from) };
        let content = async {
            let record: PipelineResult<MetadataRecord> = match content_source {
                Some(view) => text_view(view)
                    .await
                    .map(|text| self.content.extract(&text, &self.coercer))
                    .map_err(PipelineError::from),
                None => Ok(MetadataRecord::new()),
            };
            record
        };
        let chop = async {
            match chop_source {
                Some(view) => self.chopper.chop(bucket, key_data, view).await,
                None => Ok(ChopOutcome::Skipped),
            }
        };

        let (bytes, hash, content, chop) = tokio::try_join!(pump, hash, content, chop)?;
        debug!(bytes, %hash, "Stream phase complete");

        Ok((hash, content, chop))
    }

    fn generated(&self) -> MetadataRecord {
        let now = to_iso(&Utc::now());
        let mut record = MetadataRecord::new();
        record.insert(PARSER_VERSION_KEY, self.spec.parser_version.clone());
        record.insert(PARSED_AT_KEY, now.clone());
        record.insert(METADATA_CHANGED_AT_KEY, now);
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chop::ChopConfig;
    use crate::storage::MemoryStore;
    use crate::tracking::MemoryTrackingStore;
    use chrono::Offset;
    use insp_common::checksum::sha256_hex;
    use serde_json::json;

    const SPEC: &str = r#"{
        "parserVersion": "2.0.0",
        "folderTreeExtractionSpec": {
            "1": { "name": "site" },
            "2": { "name": "serial" }
        },
        "fileNameExtractionSpec": {
            "txt": { "1": { "name": "system" }, "2": { "name": "serial", "parseAs": "integer" } },
            "csv": { "1": { "name": "system" }, "2": { "name": "serial", "parseAs": "integer" } }
        },
        "fileContentExtractionSpec": [
            { "propertyKey": "system", "pattern": { "patternId": "keyColonValue", "searchKey": "System" } },
            { "propertyKey": "operator", "pattern": { "patternId": "keyColonValue", "searchKey": "Operator" } }
        ]
    }"#;

    fn processor() -> FileProcessor {
        let spec = Arc::new(ExtractionSpec::from_json(SPEC).unwrap());
        let coercer = Arc::new(Coercer::new(Utc.fix(), spec.substitutions()));
        let chopper = Chopper::new(
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryTrackingStore::new()),
            coercer.clone(),
            ChopConfig::default(),
        );
        FileProcessor::new(spec, coercer, chopper, ProcessorConfig::default())
    }

    fn body(text: &str) -> ByteReader {
        Box::new(std::io::Cursor::new(text.as_bytes().to_vec()))
    }

    #[tokio::test]
    async fn test_precedence_path_content_filename() {
        let text = "System: FROM_CONTENT\nOperator: Ana\n";
        let kd = KeyData::resolve("north/999/CMM_42.txt");

        let outcome = processor().process("bkt", &kd, body(text)).await.unwrap();
        let md = &outcome.metadata;

        assert_eq!(md.get("site"), Some(&json!("north")));
        // filename beats path and content
        assert_eq!(md.get("serial"), Some(&json!(42)));
        assert_eq!(md.get("system"), Some(&json!("CMM")));
        assert_eq!(md.get("operator"), Some(&json!("Ana")));
        assert_eq!(md.get(PARSER_VERSION_KEY), Some(&json!("2.0.0")));
        assert!(md.contains_key(PARSED_AT_KEY));
        assert_eq!(outcome.hash, sha256_hex(text.as_bytes()));
        assert!(!outcome.errors);
        assert_eq!(outcome.chop, ChopOutcome::Skipped);
    }

    #[tokio::test]
    async fn test_structural_error_sets_errors_but_keeps_other_phases() {
        let kd = KeyData::resolve("north/999/CMM.txt");
        let outcome = processor().process("bkt", &kd, body("Operator: Ana")).await.unwrap();

        assert!(outcome.errors);
        assert_eq!(outcome.metadata.get("site"), Some(&json!("north")));
        assert_eq!(outcome.metadata.get("operator"), Some(&json!("Ana")));
    }

    #[tokio::test]
    async fn test_nonparsed_field_sets_errors() {
        let kd = KeyData::resolve("north/999/CMM_forty.txt");
        let outcome = processor().process("bkt", &kd, body("")).await.unwrap();

        assert!(outcome.errors);
        assert_eq!(outcome.metadata.get("nonparsed_serial"), Some(&json!("forty")));
    }

    #[tokio::test]
    async fn test_csv_is_chopped_not_content_extracted() {
        let kd = KeyData::resolve("north/999/CMM_7.csv");
        let outcome = processor()
            .process("bkt", &kd, body("Operator,Value\nAna,1\n"))
            .await
            .unwrap();

        assert!(!outcome.metadata.contains_key("operator"));
        assert_eq!(outcome.report_id, Some(1));
        assert!(matches!(outcome.chop, ChopOutcome::Chopped { chunks: 1, .. }));
    }

    struct BrokenReader;

    impl tokio::io::AsyncRead for BrokenReader {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _: &mut std::task::Context<'_>,
            _: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset",
            )))
        }
    }

    #[tokio::test]
    async fn test_stream_failure_is_fatal_for_file() {
        let kd = KeyData::resolve("north/999/CMM_42.txt");
        let result = processor().process("bkt", &kd, Box::new(BrokenReader)).await;
        assert!(matches!(result, Err(PipelineError::Stream(_))));
    }
}
