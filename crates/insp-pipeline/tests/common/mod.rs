//! Shared harness for pipeline integration tests
//!
//! Wires a [`BatchRunner`] to in-memory storage, tracking and metadata doubles
//! and loads the extraction spec from `tests/fixtures`.

#![allow(dead_code)]

use chrono::FixedOffset;
use insp_pipeline::{
    batch::BatchRunner,
    chop::{ChopConfig, Chopper},
    event::FileEvent,
    extract::{Coercer, ExtractionSpec},
    orchestrator::{FileProcessor, ProcessorConfig},
    sink::MemorySink,
    spec_source::{FileSpecSource, SpecSource},
    storage::MemoryStore,
    tracking::MemoryTrackingStore,
};
use std::path::PathBuf;
use std::sync::Arc;

pub const INBOX: &str = "inbox";
pub const CHUNKS: &str = "chunks";

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub async fn load_spec() -> ExtractionSpec {
    FileSpecSource::new(fixture_path("extraction_spec.json"))
        .load()
        .await
        .expect("fixture spec must load")
}

pub struct TestEnvironment {
    pub store: Arc<MemoryStore>,
    pub tracking: Arc<MemoryTrackingStore>,
    pub sink: Arc<MemorySink>,
    pub runner: BatchRunner,
}

impl TestEnvironment {
    pub async fn start() -> Self {
        Self::with_chunk_lines(50_000).await
    }

    pub async fn with_chunk_lines(chunk_lines: usize) -> Self {
        let spec = Arc::new(load_spec().await);
        let store = Arc::new(MemoryStore::new());
        let tracking = Arc::new(MemoryTrackingStore::new());
        let sink = Arc::new(MemorySink::new());

        let offset = FixedOffset::east_opt(3600).expect("valid offset");
        let coercer = Arc::new(Coercer::new(offset, spec.substitutions()));
        let chopper = Chopper::new(
            store.clone(),
            tracking.clone(),
            coercer.clone(),
            ChopConfig {
                chunk_lines,
                system_codes: ["CMM", "XRF"].iter().map(|c| c.to_string()).collect(),
                target_bucket: Some(CHUNKS.to_string()),
            },
        );
        let processor = Arc::new(FileProcessor::new(
            spec,
            coercer,
            chopper,
            ProcessorConfig::default(),
        ));
        let runner = BatchRunner::new(store.clone(), sink.clone(), processor, 4);

        Self {
            store,
            tracking,
            sink,
            runner,
        }
    }

    /// Store `body` under `key` and return the matching (URL-encoded) event
    pub async fn upload(&self, key: &str, body: impl Into<Vec<u8>>) -> FileEvent {
        self.store.insert(INBOX, key, body.into()).await;
        FileEvent::new(INBOX, urlencoding::encode(key).replace("%2F", "/"))
    }
}
