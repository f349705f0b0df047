//! Batch fan-out
//!
//! Every event in a batch is processed on its own; a failing file is logged
//! and reported in its [`FileResult`] while its siblings run to completion.

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::error::{PipelineError, PipelineResult};
use crate::event::FileEvent;
use crate::extract::KeyData;
use crate::orchestrator::{FileProcessor, ParseOutcome};
use crate::sink::{MetadataSink, UpsertOptions, UpsertResult};
use crate::storage::ObjectStore;

pub const DEFAULT_BATCH_CONCURRENCY: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Succeeded,
    /// Parsed, but with structural errors or `nonparsed_*` fields
    Incomplete,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedFile {
    pub outcome: ParseOutcome,
    pub upsert: UpsertResult,
}

#[derive(Debug)]
pub struct FileResult {
    /// Decoded key, or the raw key when decoding failed
    pub key: String,
    pub result: PipelineResult<ProcessedFile>,
}

impl FileResult {
    pub fn status(&self) -> FileStatus {
        match &self.result {
            Ok(processed) if processed.outcome.errors => FileStatus::Incomplete,
            Ok(_) => FileStatus::Succeeded,
            Err(_) => FileStatus::Failed,
        }
    }
}

/// Per-file results in event order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub results: Vec<FileResult>,
}

impl BatchReport {
    fn count(&self, status: FileStatus) -> usize {
        self.results.iter().filter(|r| r.status() == status).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(FileStatus::Succeeded)
    }

    pub fn incomplete(&self) -> usize {
        self.count(FileStatus::Incomplete)
    }

    pub fn failed(&self) -> usize {
        self.count(FileStatus::Failed)
    }
}

pub struct BatchRunner {
    store: Arc<dyn ObjectStore>,
    sink: Arc<dyn MetadataSink>,
    processor: Arc<FileProcessor>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        sink: Arc<dyn MetadataSink>,
        processor: Arc<FileProcessor>,
        concurrency: usize,
    ) -> Self {
        Self {
            store,
            sink,
            processor,
            concurrency: concurrency.max(1),
        }
    }

    /// Process all events, at most `concurrency` at a time, and wait for
    /// every one of them regardless of individual failures
    #[instrument(skip(self, events), fields(files = events.len(), batch_id))]
    pub async fn run(&self, events: Vec<FileEvent>) -> BatchReport {
        let start = Instant::now();
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());
        info!(
            "Processing {} files (concurrency={})",
            events.len(),
            self.concurrency
        );

        let mut indexed: Vec<(usize, FileResult)> = stream::iter(events.into_iter().enumerate())
            .map(|(index, event)| {
                let batch_id = batch_id.as_str();
                async move { (index, self.run_one(event, batch_id).await) }
            })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);

        let report = BatchReport {
            results: indexed.into_iter().map(|(_, result)| result).collect(),
        };

        info!(
            succeeded = report.succeeded(),
            incomplete = report.incomplete(),
            failed = report.failed(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch complete"
        );

        report
    }

    async fn run_one(&self, event: FileEvent, batch_id: &str) -> FileResult {
        let key = match event.decoded_key() {
            Ok(key) => key,
            Err(e) => {
                error!(key = %event.object_key, error = %e, "File failed");
                return FileResult {
                    key: event.object_key.clone(),
                    result: Err(e),
                };
            }
        };

        let result = self.process_file(&event, &key, batch_id).await;
        match &result {
            Ok(processed) if processed.outcome.errors => {
                warn!(key = %key, upsert = ?processed.upsert, "File parsed with errors");
            }
            Ok(processed) => {
                info!(key = %key, upsert = ?processed.upsert, "File parsed");
            }
            Err(e) => {
                error!(key = %key, error = %e, "File failed");
            }
        }

        FileResult { key, result }
    }

    async fn process_file(
        &self,
        event: &FileEvent,
        key: &str,
        batch_id: &str,
    ) -> PipelineResult<ProcessedFile> {
        let key_data = KeyData::resolve(key);

        let body = self
            .store
            .open(&event.bucket_name, key)
            .await
            .map_err(PipelineError::Storage)?;

        let outcome = self
            .processor
            .process(&event.bucket_name, &key_data, body)
            .await?;

        let options = UpsertOptions {
            skip_hash_check: event.custom_metadata.skip_hash_check,
            // Events without their own invocation id are attributed to this batch
            invocation_id: Some(
                event
                    .custom_metadata
                    .invocation_id
                    .clone()
                    .unwrap_or_else(|| batch_id.to_string()),
            ),
            custom_tags: event.custom_tags.clone(),
            errors: outcome.errors,
            report_id: outcome.report_id,
        };

        let upsert = self
            .sink
            .upsert(&outcome.metadata, &outcome.hash, key, &options)
            .await
            .map_err(PipelineError::Sink)?;

        Ok(ProcessedFile { outcome, upsert })
    }
}
