//! Metadata persistence

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::extract::MetadataRecord;

/// Per-file write options, derived from the inbound event and the outcome
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpsertOptions {
    /// Write even when the stored content hash is identical
    pub skip_hash_check: bool,
    pub invocation_id: Option<String>,
    pub custom_tags: HashMap<String, String>,
    pub errors: bool,
    pub report_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertResult {
    Inserted,
    Updated,
    /// Stored hash matched; nothing written
    Unchanged,
}

#[async_trait]
pub trait MetadataSink: Send + Sync {
    async fn upsert(
        &self,
        record: &MetadataRecord,
        hash: &str,
        key: &str,
        options: &UpsertOptions,
    ) -> Result<UpsertResult>;
}

/// `inspection_metadata` table, one row per object key
#[derive(Clone)]
pub struct PgMetadataSink {
    pool: Arc<PgPool>,
}

impl PgMetadataSink {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataSink for PgMetadataSink {
    async fn upsert(
        &self,
        record: &MetadataRecord,
        hash: &str,
        key: &str,
        options: &UpsertOptions,
    ) -> Result<UpsertResult> {
        // xmax = 0 only for freshly inserted tuples
        let inserted: Option<bool> = sqlx::query_scalar(
            r#"
            INSERT INTO inspection_metadata (
                object_key, content_hash, metadata, errors,
                report_id, invocation_id, tags, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (object_key) DO UPDATE SET
                content_hash = EXCLUDED.content_hash,
                metadata = EXCLUDED.metadata,
                errors = EXCLUDED.errors,
                report_id = EXCLUDED.report_id,
                invocation_id = EXCLUDED.invocation_id,
                tags = EXCLUDED.tags,
                updated_at = NOW()
            WHERE $8 OR inspection_metadata.content_hash IS DISTINCT FROM EXCLUDED.content_hash
            RETURNING (xmax = 0)
            "#,
        )
        .bind(key)
        .bind(hash)
        .bind(Json(record))
        .bind(options.errors)
        .bind(options.report_id)
        .bind(options.invocation_id.as_deref())
        .bind(Json(&options.custom_tags))
        .bind(options.skip_hash_check)
        .fetch_optional(&*self.pool)
        .await
        .with_context(|| format!("Failed to upsert metadata for {}", key))?;

        let result = match inserted {
            Some(true) => UpsertResult::Inserted,
            Some(false) => UpsertResult::Updated,
            None => UpsertResult::Unchanged,
        };
        debug!(key, ?result, "Metadata upserted");
        Ok(result)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetadata {
    pub record: MetadataRecord,
    pub hash: String,
    pub options: UpsertOptions,
}

/// In-memory sink with the same hash-check semantics as [`PgMetadataSink`]
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<BTreeMap<String, StoredMetadata>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<StoredMetadata> {
        self.rows.lock().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }
}

#[async_trait]
impl MetadataSink for MemorySink {
    async fn upsert(
        &self,
        record: &MetadataRecord,
        hash: &str,
        key: &str,
        options: &UpsertOptions,
    ) -> Result<UpsertResult> {
        let mut rows = self.rows.lock().await;
        let result = match rows.get(key) {
            None => UpsertResult::Inserted,
            Some(existing) if !options.skip_hash_check && existing.hash == hash => {
                return Ok(UpsertResult::Unchanged);
            }
            Some(_) => UpsertResult::Updated,
        };

        rows.insert(
            key.to_string(),
            StoredMetadata {
                record: record.clone(),
                hash: hash.to_string(),
                options: options.clone(),
            },
        );
        Ok(result)
    }
}
