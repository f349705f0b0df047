//! Splitting of large delimited exports into header-preserving chunks
//!
//! [`Chopper::chop`] owns the whole lifecycle of one file's tracking row:
//!
//! 1. the file name's system code is checked against the allow-list
//!    (failure propagates; no row is created)
//! 2. a `CHOPPING` row is created and its id becomes the report id
//! 3. raw byte lines are read from the tee view and fed to a [`ChopSession`];
//!    every full chunk is uploaded before the next line is read, so a slow
//!    upload stalls the tee and through it the source read
//! 4. the row moves to `PARSING` with the chunk count, or to `ERROR` with the
//!    failure message, in which case [`ChopOutcome::Failed`] is returned
//!    instead of an error

pub mod session;

use anyhow::{Context, Result};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, instrument, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::extract::{Coercer, KeyData};
use crate::storage::{ObjectStore, CONTENT_TYPE_CSV};
use crate::stream::TeeView;
use crate::tracking::TrackingStore;

pub use session::{chunk_key, ChopSession, ChopState, Chunk};

/// Body lines per chunk
pub const DEFAULT_CHUNK_LINES: usize = 50_000;

#[derive(Debug, Clone)]
pub struct ChopConfig {
    pub chunk_lines: usize,
    /// Recognized system codes; empty accepts every code
    pub system_codes: HashSet<String>,
    /// Bucket for chunk objects; `None` writes next to the source object
    pub target_bucket: Option<String>,
}

impl Default for ChopConfig {
    fn default() -> Self {
        Self {
            chunk_lines: DEFAULT_CHUNK_LINES,
            system_codes: HashSet::new(),
            target_bucket: None,
        }
    }
}

impl ChopConfig {
    pub fn check_system_code(&self, key_data: &KeyData) -> PipelineResult<()> {
        let code = key_data
            .file_base_name
            .split('_')
            .next()
            .unwrap_or_default();

        if self.system_codes.is_empty() || self.system_codes.contains(code) {
            Ok(())
        } else {
            Err(PipelineError::UnknownSystemCode(code.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChopOutcome {
    Chopped {
        report_id: i64,
        chunks: u32,
        running_date: Option<DateTime<Utc>>,
    },
    /// Chopping failed and was recorded on the tracking row (if one exists)
    Failed {
        report_id: Option<i64>,
        reason: String,
    },
    /// File is not tabular
    Skipped,
}

impl ChopOutcome {
    pub fn report_id(&self) -> Option<i64> {
        match self {
            ChopOutcome::Chopped { report_id, .. } => Some(*report_id),
            ChopOutcome::Failed { report_id, .. } => *report_id,
            ChopOutcome::Skipped => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ChopOutcome::Failed { .. })
    }
}

pub struct Chopper {
    store: Arc<dyn ObjectStore>,
    tracking: Arc<dyn TrackingStore>,
    coercer: Arc<Coercer>,
    config: ChopConfig,
}

impl Chopper {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        tracking: Arc<dyn TrackingStore>,
        coercer: Arc<Coercer>,
        config: ChopConfig,
    ) -> Self {
        Self {
            store,
            tracking,
            coercer,
            config,
        }
    }

    #[instrument(skip(self, key_data, view), fields(key = %key_data.key))]
    pub async fn chop(
        &self,
        bucket: &str,
        key_data: &KeyData,
        view: TeeView,
    ) -> PipelineResult<ChopOutcome> {
        self.config.check_system_code(key_data)?;

        let report_id = match self.tracking.create(&key_data.key).await {
            Ok(id) => id,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to create tracking row");
                return Ok(ChopOutcome::Failed {
                    report_id: None,
                    reason: format!("{:#}", e),
                });
            }
        };

        let target_bucket = self.config.target_bucket.as_deref().unwrap_or(bucket);

        match self.run(report_id, target_bucket, key_data, view).await {
            Ok((chunks, running_date)) => {
                let marked = self
                    .tracking
                    .mark_parsing(report_id, chunks as i32, running_date)
                    .await;
                match marked {
                    Ok(()) => {
                        info!(report_id, chunks, "Chopping finished");
                        Ok(ChopOutcome::Chopped {
                            report_id,
                            chunks,
                            running_date,
                        })
                    }
                    Err(e) => Ok(self.fail(report_id, e).await),
                }
            }
            Err(e) => Ok(self.fail(report_id, e).await),
        }
    }

    async fn fail(&self, report_id: i64, err: anyhow::Error) -> ChopOutcome {
        let reason = format!("{:#}", err);
        error!(report_id, error = %reason, "Chopping failed");

        if let Err(e) = self.tracking.mark_error(report_id, &reason).await {
            warn!(report_id, error = %format!("{:#}", e), "Failed to record chopping error");
        }

        ChopOutcome::Failed {
            report_id: Some(report_id),
            reason,
        }
    }

    async fn run(
        &self,
        report_id: i64,
        target_bucket: &str,
        key_data: &KeyData,
        view: TeeView,
    ) -> Result<(u32, Option<DateTime<Utc>>)> {
        let mut session = ChopSession::new(report_id, self.config.chunk_lines);
        let mut lines = BufReader::new(view.into_reader()).split(b'\n');

        while let Some(mut line) = lines.next_segment().await.context("Failed to read line")? {
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if let Some(chunk) = session.push_line(line, &self.coercer) {
                self.upload(target_bucket, key_data, report_id, chunk).await?;
            }
        }

        if session.state() == ChopState::ReadingHeader {
            anyhow::bail!("File has no header line");
        }
        if let Some(chunk) = session.finish() {
            self.upload(target_bucket, key_data, report_id, chunk).await?;
        }

        if let Some(raw) = session.running_date_raw() {
            if session.running_date().is_none() {
                warn!(report_id, running_date = raw, "Running date could not be parsed");
            }
        }

        Ok((session.chunks_emitted(), session.running_date()))
    }

    async fn upload(
        &self,
        bucket: &str,
        key_data: &KeyData,
        report_id: i64,
        chunk: Chunk,
    ) -> Result<()> {
        let key = chunk_key(&key_data.folder_prefix(), report_id, chunk.index, &key_data.file_name);
        debug!(report_id, index = chunk.index, lines = chunk.lines, %key, "Uploading chunk");

        self.store
            .put(bucket, &key, Bytes::from(chunk.body), CONTENT_TYPE_CSV)
            .await
            .with_context(|| format!("Failed to upload chunk {}", chunk.index))
    }
}
