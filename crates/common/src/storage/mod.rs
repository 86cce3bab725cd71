//! Object storage boundary for listing photos and agent avatars
//!
//! Provides:
//! - `BlobStore` trait (upload, remove, public URL)
//! - `HttpBlobStore` for a storage REST endpoint
//! - `MemoryBlobStore` for tests and local runs
//! - Upload validation and object path generation

use crate::config::StorageConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;
use uuid::Uuid;

/// Trait for blob storage backends
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `bucket/path`, returning the object's public URL
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()>;

    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Reject anything that is not an image or exceeds `max_bytes`
pub fn validate_image(content_type: &str, size: usize, max_bytes: usize) -> Result<()> {
    if !content_type.starts_with("image/") {
        return Err(AppError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        });
    }
    if size > max_bytes {
        return Err(AppError::PayloadTooLarge {
            size,
            limit: max_bytes,
        });
    }
    Ok(())
}

fn random_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(11)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Short, plain alphanumeric
fn is_safe_extension(ext: &str) -> bool {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9]{1,10}$").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(ext))
}

/// Object extension: the file's own if it is plain alphanumeric, else the
/// image subtype (`svg+xml` becomes `svg`)
fn extension(file_name: &str, content_type: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext)
        .filter(|ext| is_safe_extension(ext))
        .or_else(|| {
            content_type
                .strip_prefix("image/")
                .and_then(|subtype| subtype.split(['+', ';']).next())
                .filter(|ext| is_safe_extension(ext))
        })
        .unwrap_or("bin")
        .to_ascii_lowercase()
}

/// `uploads/{millis}-{random}.{ext}`
pub fn listing_image_path(file_name: &str, content_type: &str, now_millis: i64) -> String {
    format!(
        "uploads/{}-{}.{}",
        now_millis,
        random_token(),
        extension(file_name, content_type)
    )
}

/// `{agent_id}/{random}.{ext}`
pub fn avatar_path(agent_id: Uuid, file_name: &str, content_type: &str) -> String {
    format!(
        "{}/{}.{}",
        agent_id,
        random_token(),
        extension(file_name, content_type)
    )
}

/// Append a `?t=` query so clients refetch replaced objects
pub fn with_cache_buster(url: &str, now_millis: i64) -> String {
    format!("{}?t={}", url, now_millis)
}

/// Object path of a listing image from its public URL. Only URLs under the
/// bucket's `uploads/` prefix resolve.
pub fn listing_image_path_from_url(url: &str, bucket: &str) -> Option<String> {
    let base = url.split('?').next()?;
    let (_, file_name) = base.rsplit_once(&format!("/{}/uploads/", bucket))?;
    if file_name.is_empty() || file_name.contains('/') {
        return None;
    }
    Some(format!("uploads/{}", file_name))
}

/// Validates and stores listing photos and avatars
#[derive(Clone)]
pub struct MediaService {
    store: Arc<dyn BlobStore>,
    config: StorageConfig,
}

impl MediaService {
    pub fn new(store: Arc<dyn BlobStore>, config: StorageConfig) -> Self {
        Self { store, config }
    }

    pub async fn upload_listing_image(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        validate_image(content_type, bytes.len(), self.config.max_upload_bytes)?;

        let now = chrono::Utc::now().timestamp_millis();
        let path = listing_image_path(file_name, content_type, now);
        let url = self
            .store
            .upload(&self.config.listing_bucket, &path, bytes, content_type)
            .await?;

        tracing::info!(path = %path, "Listing image uploaded");
        Ok(with_cache_buster(&url, now))
    }

    pub async fn delete_listing_image(&self, url: &str) -> Result<()> {
        let path = listing_image_path_from_url(url, &self.config.listing_bucket)
            .ok_or_else(|| AppError::validation("url", "not a listing image URL"))?;
        self.store.remove(&self.config.listing_bucket, &[path]).await
    }

    pub async fn upload_avatar(
        &self,
        agent_id: Uuid,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        validate_image(content_type, bytes.len(), self.config.max_upload_bytes)?;

        let path = avatar_path(agent_id, file_name, content_type);
        let url = self
            .store
            .upload(&self.config.avatar_bucket, &path, bytes, content_type)
            .await?;

        tracing::info!(agent_id = %agent_id, path = %path, "Avatar uploaded");
        Ok(with_cache_buster(&url, chrono::Utc::now().timestamp_millis()))
    }
}

/// Storage REST client
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
    service_key: Option<String>,
}

#[derive(Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

impl HttpBlobStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            service_key: config.service_key.clone(),
        })
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.service_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let url = format!("{}/object/{}/{}", self.base_url, bucket, path);

        let response = self
            .authorized(self.client.post(&url))
            .header("Content-Type", content_type)
            .header("Cache-Control", "max-age=3600")
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                message: format!("Storage upload failed {}: {}", status, body),
            });
        }

        Ok(self.public_url(bucket, path))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let url = format!("{}/object/{}", self.base_url, bucket);

        let response = self
            .authorized(self.client.delete(&url))
            .json(&RemoveRequest { prefixes: paths })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream {
                message: format!("Storage remove failed {}: {}", status, body),
            });
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/object/public/{}/{}", self.base_url, bucket, path)
    }
}

/// Blob store kept in process memory
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    objects: Arc<Mutex<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, bucket: &str, path: &str) -> bool {
        self.objects
            .lock()
            .map(|o| o.contains_key(&(bucket.to_string(), path.to_string())))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String> {
        let mut objects = self.objects.lock().map_err(|_| AppError::Internal {
            message: "blob store lock poisoned".to_string(),
        })?;
        objects.insert((bucket.to_string(), path.to_string()), bytes);
        Ok(self.public_url(bucket, path))
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let mut objects = self.objects.lock().map_err(|_| AppError::Internal {
            message: "blob store lock poisoned".to_string(),
        })?;
        for path in paths {
            objects.remove(&(bucket.to_string(), path.clone()));
        }
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{}/{}", bucket, path)
    }
}
