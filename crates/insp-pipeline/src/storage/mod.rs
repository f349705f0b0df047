//! Object storage access
//!
//! Pipeline code talks to [`ObjectStore`]; [`S3Store`] is the production
//! implementation and [`MemoryStore`] backs tests and local runs.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    Client,
};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Cursor;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::stream::ByteReader;

pub mod config;

pub use config::StorageConfig;

pub const CONTENT_TYPE_CSV: &str = "text/csv";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open the object body as a byte stream
    async fn open(&self, bucket: &str, key: &str) -> Result<ByteReader>;

    /// Read a (small) object fully into memory
    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Bytes>;

    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<()>;
}

#[derive(Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        debug!(
            region = %config.region,
            endpoint = ?config.endpoint,
            static_credentials = config.has_static_credentials(),
            "Initializing storage"
        );

        let mut s3_config_builder = match (&config.access_key, &config.secret_key) {
            (Some(access_key), Some(secret_key)) => {
                let credentials =
                    Credentials::new(access_key, secret_key, None, None, "insp-storage");
                aws_sdk_s3::Config::builder()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials)
            }
            _ => {
                let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        s3_config_builder = s3_config_builder
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, endpoint = ?config.endpoint, "Storage client initialized");

        Ok(Self { client })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    #[instrument(skip(self))]
    async fn open(&self, bucket: &str, key: &str) -> Result<ByteReader> {
        debug!("Opening stream from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to get stream from S3: s3://{}/{}", bucket, key))?;

        Ok(Box::new(Box::pin(response.body.into_async_read())))
    }

    #[instrument(skip(self))]
    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Bytes> {
        debug!("Downloading from s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to download from S3: s3://{}/{}", bucket, key))?;

        let data = response
            .body
            .collect()
            .await
            .context("Failed to read S3 response body")?
            .into_bytes();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);

        Ok(data)
    }

    #[instrument(skip(self, body), fields(size = body.len()))]
    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await
            .with_context(|| format!("Failed to upload to S3: s3://{}/{}", bucket, key))?;

        info!("Successfully uploaded to s3://{}/{}", bucket, key);

        Ok(())
    }
}

/// In-process object store keyed by `(bucket, key)`
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub body: Bytes,
    pub content_type: String,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, bucket: &str, key: &str, body: impl Into<Bytes>) {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: "application/octet-stream".to_string(),
            },
        );
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .read()
            .await
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Keys in `bucket` starting with `prefix`, in lexical order
    pub async fn keys(&self, bucket: &str, prefix: &str) -> Vec<String> {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(prefix))
            .map(|(_, k)| k.clone())
            .collect()
    }

    async fn body(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.get(bucket, key)
            .await
            .map(|object| object.body)
            .ok_or_else(|| anyhow!("No such object: s3://{}/{}", bucket, key))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn open(&self, bucket: &str, key: &str) -> Result<ByteReader> {
        Ok(Box::new(Cursor::new(self.body(bucket, key).await?)))
    }

    async fn get_bytes(&self, bucket: &str, key: &str) -> Result<Bytes> {
        self.body(bucket, key).await
    }

    async fn put(&self, bucket: &str, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        self.objects.write().await.insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }
}
