//! Inbound file-change notifications

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    pub bucket_name: String,
    /// URL-encoded, as delivered by the storage notification
    pub object_key: String,
    #[serde(default)]
    pub object_size: Option<u64>,
    #[serde(default)]
    pub custom_tags: HashMap<String, String>,
    #[serde(default)]
    pub custom_metadata: CustomMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomMetadata {
    #[serde(rename = "skip-hash-check", default, deserialize_with = "flag")]
    pub skip_hash_check: bool,
    #[serde(rename = "invocation-id", default)]
    pub invocation_id: Option<String>,
}

/// Object metadata values arrive as strings; accept `true`/`"true"`
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
    })
}

impl FileEvent {
    pub fn new(bucket_name: impl Into<String>, object_key: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            object_key: object_key.into(),
            object_size: None,
            custom_tags: HashMap::new(),
            custom_metadata: CustomMetadata::default(),
        }
    }

    /// Object key with `+` read as space and percent-escapes decoded
    pub fn decoded_key(&self) -> PipelineResult<String> {
        let plus_decoded = self.object_key.replace('+', " ");
        urlencoding::decode(&plus_decoded)
            .map(|key| key.into_owned())
            .map_err(|e| PipelineError::InvalidKey(format!("{}: {}", self.object_key, e)))
    }
}

/// One invocation's worth of events: a bare array or `{ "events": [...] }`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EventBatch {
    List(Vec<FileEvent>),
    Wrapped { events: Vec<FileEvent> },
}

impl EventBatch {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn into_events(self) -> Vec<FileEvent> {
        match self {
            EventBatch::List(events) | EventBatch::Wrapped { events } => events,
        }
    }
}
