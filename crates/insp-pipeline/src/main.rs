//! Inspection pipeline - batch entry point

use anyhow::{Context, Result};
use clap::Parser;
use insp_common::logging::{init_logging, LogConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::info;

use insp_pipeline::{
    batch::BatchRunner,
    chop::{ChopConfig, Chopper},
    config::{PipelineConfig, SpecLocation},
    db,
    event::EventBatch,
    extract::Coercer,
    orchestrator::{FileProcessor, ProcessorConfig},
    sink::PgMetadataSink,
    spec_source::{FileSpecSource, S3SpecSource, SpecSource},
    storage::{ObjectStore, S3Store, StorageConfig},
    stream::DEFAULT_VIEW_CAPACITY,
    tracking::PgTrackingStore,
};

/// Process one batch of object-storage file events
#[derive(Parser, Debug)]
#[command(name = "insp-pipeline", version, about)]
struct Cli {
    /// JSON file with the events (array or `{"events": [...]}`); stdin if omitted
    #[arg(long, env = "INSP_EVENTS")]
    events: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // LOG_* variables override individual fields of the built config
    let log_config = LogConfig::builder()
        .log_file_prefix("insp-pipeline")
        .filter_directives("insp_pipeline=info,sqlx=warn,aws_smithy_runtime=warn,aws_config=warn")
        .build()
        .with_env_overrides()?;

    init_logging(&log_config)?;

    info!("Starting inspection pipeline");

    let config = PipelineConfig::load()?;
    let source_offset = config.source_offset()?;

    let pool = Arc::new(db::create_pool(&config.database).await?);
    db::run_migrations(&pool).await?;

    let store: Arc<dyn ObjectStore> = Arc::new(S3Store::new(&StorageConfig::from_env()?).await?);

    let spec_source: Box<dyn SpecSource> = match &config.spec {
        SpecLocation::S3 { bucket, key } => {
            Box::new(S3SpecSource::new(store.clone(), bucket.clone(), key.clone()))
        }
        SpecLocation::File(path) => Box::new(FileSpecSource::new(path.clone())),
    };
    let spec = Arc::new(spec_source.load().await?);

    let events = read_events(cli.events.as_ref()).await?;
    info!(files = events.len(), parser_version = %spec.parser_version, "Batch received");

    let coercer = Arc::new(Coercer::new(source_offset, spec.substitutions()));
    let chopper = Chopper::new(
        store.clone(),
        Arc::new(PgTrackingStore::new(pool.clone())),
        coercer.clone(),
        ChopConfig {
            chunk_lines: config.chop.chunk_lines,
            system_codes: config.chop.system_codes.clone(),
            target_bucket: config.chop.target_bucket.clone(),
        },
    );
    let processor = Arc::new(FileProcessor::new(
        spec,
        coercer,
        chopper,
        ProcessorConfig {
            text_suffixes: config.suffixes.text.clone(),
            tabular_suffixes: config.suffixes.tabular.clone(),
            view_capacity: DEFAULT_VIEW_CAPACITY,
        },
    ));

    let runner = BatchRunner::new(
        store,
        Arc::new(PgMetadataSink::new(pool.clone())),
        processor,
        config.batch_concurrency,
    );
    let report = runner.run(events).await;

    info!(
        succeeded = report.succeeded(),
        incomplete = report.incomplete(),
        failed = report.failed(),
        "Inspection pipeline finished"
    );

    Ok(())
}

async fn read_events(path: Option<&PathBuf>) -> Result<Vec<insp_pipeline::event::FileEvent>> {
    let json = match path {
        Some(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read events from {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .context("Failed to read events from stdin")?;
            buffer
        }
    };

    Ok(EventBatch::from_json(&json)
        .context("Failed to parse event batch")?
        .into_events())
}
