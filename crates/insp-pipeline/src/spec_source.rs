//! Where the extraction rule document comes from

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::extract::ExtractionSpec;
use crate::storage::ObjectStore;

#[async_trait]
pub trait SpecSource: Send + Sync {
    /// Fetch, parse and validate the current document
    async fn load(&self) -> Result<ExtractionSpec>;
}

/// Document stored as a JSON object in the configuration bucket
pub struct S3SpecSource {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
}

impl S3SpecSource {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
        }
    }
}

#[async_trait]
impl SpecSource for S3SpecSource {
    async fn load(&self) -> Result<ExtractionSpec> {
        let bytes = self
            .store
            .get_bytes(&self.bucket, &self.key)
            .await
            .context("Failed to fetch extraction spec")?;
        let json = std::str::from_utf8(&bytes).context("Extraction spec is not valid UTF-8")?;
        let spec = ExtractionSpec::from_json(json)
            .with_context(|| format!("Invalid extraction spec at s3://{}/{}", self.bucket, self.key))?;

        info!(parser_version = %spec.parser_version, "Extraction spec loaded from S3");
        Ok(spec)
    }
}

/// Local JSON file, for development
pub struct FileSpecSource {
    path: PathBuf,
}

impl FileSpecSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SpecSource for FileSpecSource {
    async fn load(&self) -> Result<ExtractionSpec> {
        let json = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read extraction spec {}", self.path.display()))?;
        let spec = ExtractionSpec::from_json(&json)
            .with_context(|| format!("Invalid extraction spec {}", self.path.display()))?;

        info!(parser_version = %spec.parser_version, path = %self.path.display(), "Extraction spec loaded");
        Ok(spec)
    }
}
