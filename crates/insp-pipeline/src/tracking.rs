//! Report tracking rows
//!
//! One row per chopped file. The chopper owns the row for its report id and
//! moves it `CHOPPING -> PARSING` on success or `CHOPPING -> ERROR` on failure.
//! Downstream bulk loaders pick up rows in `PARSING`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Maximum stored length of a tracking error message, in characters
pub const MAX_ERROR_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    Chopping,
    Parsing,
    Error,
}

impl TrackingStatus {
    pub fn as_str(&self) -> &str {
        match self {
            TrackingStatus::Chopping => "CHOPPING",
            TrackingStatus::Parsing => "PARSING",
            TrackingStatus::Error => "ERROR",
        }
    }
}

impl std::str::FromStr for TrackingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "CHOPPING" => Ok(TrackingStatus::Chopping),
            "PARSING" => Ok(TrackingStatus::Parsing),
            "ERROR" => Ok(TrackingStatus::Error),
            _ => Err(anyhow::anyhow!("Unknown tracking status: {}", s)),
        }
    }
}

/// Truncate on a character boundary
pub fn truncate_error(message: &str) -> String {
    message.chars().take(MAX_ERROR_CHARS).collect()
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Insert a row in `CHOPPING` and return its report id
    async fn create(&self, object_key: &str) -> Result<i64>;

    async fn mark_parsing(
        &self,
        report_id: i64,
        chunks_to_process: i32,
        running_date: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Message is truncated to [`MAX_ERROR_CHARS`]
    async fn mark_error(&self, report_id: i64, message: &str) -> Result<()>;
}

/// `report_tracking` table
#[derive(Clone)]
pub struct PgTrackingStore {
    pool: Arc<PgPool>,
}

impl PgTrackingStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackingStore for PgTrackingStore {
    async fn create(&self, object_key: &str) -> Result<i64> {
        let report_id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO report_tracking (object_key, status)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(object_key)
        .bind(TrackingStatus::Chopping.as_str())
        .fetch_one(&*self.pool)
        .await
        .context("Failed to create tracking row")?;

        debug!(report_id, object_key, "Tracking row created");
        Ok(report_id)
    }

    async fn mark_parsing(
        &self,
        report_id: i64,
        chunks_to_process: i32,
        running_date: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE report_tracking
            SET status = $1, chunks_to_process = $2, running_date = $3, updated_at = NOW()
            WHERE id = $4
            "#,
        )
        .bind(TrackingStatus::Parsing.as_str())
        .bind(chunks_to_process)
        .bind(running_date)
        .bind(report_id)
        .execute(&*self.pool)
        .await
        .context("Failed to mark tracking row as parsing")?;

        Ok(())
    }

    async fn mark_error(&self, report_id: i64, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE report_tracking
            SET status = $1, error = $2, updated_at = NOW()
            WHERE id = $3
            "#,
        )
        .bind(TrackingStatus::Error.as_str())
        .bind(truncate_error(message))
        .bind(report_id)
        .execute(&*self.pool)
        .await
        .context("Failed to mark tracking row as error")?;

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingRow {
    pub id: i64,
    pub object_key: String,
    pub status: TrackingStatus,
    pub error: Option<String>,
    pub chunks_to_process: Option<i32>,
    pub running_date: Option<DateTime<Utc>>,
}

/// In-memory tracking table; ids start at 1
#[derive(Debug, Default)]
pub struct MemoryTrackingStore {
    rows: Mutex<Vec<TrackingRow>>,
}

impl MemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<TrackingRow> {
        self.rows.lock().await.clone()
    }

    pub async fn row(&self, report_id: i64) -> Option<TrackingRow> {
        self.rows.lock().await.iter().find(|r| r.id == report_id).cloned()
    }

    async fn update(&self, report_id: i64, apply: impl FnOnce(&mut TrackingRow)) -> Result<()> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|r| r.id == report_id)
            .with_context(|| format!("No tracking row with id {}", report_id))?;
        apply(row);
        Ok(())
    }
}

#[async_trait]
impl TrackingStore for MemoryTrackingStore {
    async fn create(&self, object_key: &str) -> Result<i64> {
        let mut rows = self.rows.lock().await;
        let id = rows.len() as i64 + 1;
        rows.push(TrackingRow {
            id,
            object_key: object_key.to_string(),
            status: TrackingStatus::Chopping,
            error: None,
            chunks_to_process: None,
            running_date: None,
        });
        Ok(id)
    }

    async fn mark_parsing(
        &self,
        report_id: i64,
        chunks_to_process: i32,
        running_date: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.update(report_id, |row| {
            row.status = TrackingStatus::Parsing;
            row.chunks_to_process = Some(chunks_to_process);
            row.running_date = running_date;
        })
        .await
    }

    async fn mark_error(&self, report_id: i64, message: &str) -> Result<()> {
        let message = truncate_error(message);
        self.update(report_id, |row| {
            row.status = TrackingStatus::Error;
            row.error = Some(message);
        })
        .await
    }
}
