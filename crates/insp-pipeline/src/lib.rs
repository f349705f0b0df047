//! Inspection export ingestion pipeline
//!
//! Turns inspection-device export files dropped into object storage into a
//! flat metadata record per file and, for large delimited exports, a set of
//! header-preserving chunk objects for downstream bulk loading.
//!
//! # Overview
//!
//! - **Extraction** ([`extract`]): folder segments, file-name segments and
//!   report body are mapped to fields by a versioned [`ExtractionSpec`]
//! - **Streaming** ([`stream`]): one read of the object body feeds the
//!   hasher, the content extractor and the chopper concurrently
//! - **Chopping** ([`chop`]): line-bounded chunking with a tracking row per
//!   file (`CHOPPING -> PARSING | ERROR`)
//! - **Orchestration** ([`orchestrator`], [`batch`]): per-file failure
//!   isolation and settle-all batch fan-out
//!
//! Merge precedence on key collision, later wins:
//! path -> content -> filename -> generated fields.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use insp_pipeline::{
//!     batch::BatchRunner,
//!     chop::{ChopConfig, Chopper},
//!     event::FileEvent,
//!     extract::{Coercer, ExtractionSpec},
//!     orchestrator::{FileProcessor, ProcessorConfig},
//!     sink::MemorySink,
//!     storage::MemoryStore,
//!     tracking::MemoryTrackingStore,
//! };
//!
//! # async fn run() -> anyhow::Result<()> {
//! let spec = Arc::new(ExtractionSpec::from_json(r#"{ "parserVersion": "1" }"#)?);
//! let coercer = Arc::new(Coercer::utc());
//! let store = Arc::new(MemoryStore::new());
//! let chopper = Chopper::new(store.clone(), Arc::new(MemoryTrackingStore::new()), coercer.clone(), ChopConfig::default());
//! let processor = Arc::new(FileProcessor::new(spec, coercer, chopper, ProcessorConfig::default()));
//!
//! let runner = BatchRunner::new(store, Arc::new(MemorySink::new()), processor, 8);
//! let report = runner.run(vec![FileEvent::new("inbox", "site/CMM_1.txt")]).await;
//! println!("{} failed", report.failed());
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod chop;
pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod extract;
pub mod orchestrator;
pub mod sink;
pub mod spec_source;
pub mod storage;
pub mod stream;
pub mod tracking;

pub use error::{PipelineError, PipelineResult};
pub use extract::{ExtractionSpec, KeyData, MetadataRecord};
