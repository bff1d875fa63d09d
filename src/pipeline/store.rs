//! Durable store client: persist converted bytes and mint public URLs.
//!
//! [`SupabaseStore`] speaks the Supabase Storage REST API: one authenticated
//! `POST /storage/v1/object/{bucket}/{key}` per artifact, with the public URL
//! derived locally from the key (no second round trip). Uploads never
//! overwrite (`x-upsert: false`) and every call gets a fresh key, so a retried
//! conversion creates a new object rather than clobbering an old one.

use crate::config::RelayConfig;
use crate::error::ConvertError;
use crate::job::StoredArtifact;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Stores artifacts and resolves their public URLs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` under `key`. The returned artifact is only produced
    /// once the store has confirmed the write.
    async fn upload(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredArtifact, ConvertError>;

    /// Public URL of `key`, derived without a network call.
    fn public_url(&self, key: &str) -> String;
}

/// Supabase Storage implementation of [`ArtifactStore`].
#[derive(Clone)]
pub struct SupabaseStore {
    http: Client,
    base_url: String,
    bucket: String,
    service_key: String,
    public_base: String,
}

impl std::fmt::Debug for SupabaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStore")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseStore {
    pub fn new(config: &RelayConfig) -> Result<Self, ConvertError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout_secs))
            .user_agent(concat!("convert-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: config.store_url.trim_end_matches('/').to_string(),
            bucket: config.bucket.clone(),
            service_key: config.store_key.clone(),
            public_base: config.public_url_base(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl ArtifactStore for SupabaseStore {
    async fn upload(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredArtifact, ConvertError> {
        let size = bytes.len();
        debug!("Uploading {} bytes to {}/{}", size, self.bucket, key);

        let response = self
            .http
            .post(self.object_url(key))
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .send()
            .await
            .map_err(|e| ConvertError::StorageUnavailable {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = storage_error_detail(response.text().await.unwrap_or_default());
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    ConvertError::StoragePermissionDenied {
                        key: key.to_string(),
                        detail,
                    }
                }
                _ => ConvertError::StorageRejected {
                    key: key.to_string(),
                    status: status.as_u16(),
                    detail,
                },
            });
        }

        let artifact = StoredArtifact {
            key: key.to_string(),
            public_url: self.public_url(key),
            content_type: content_type.to_string(),
        };
        info!("Stored {} bytes as {}", size, artifact.public_url);
        Ok(artifact)
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }
}

/// Pull the `message`/`error` field out of a Supabase error body.
fn storage_error_detail(body: String) -> String {
    #[derive(serde::Deserialize)]
    struct StorageErrorBody {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<String>,
    }

    serde_json::from_str::<StorageErrorBody>(&body)
        .ok()
        .and_then(|b| b.message.or(b.error))
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "no details".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        })
}

static LAST_STAMP: AtomicU64 = AtomicU64::new(0);

/// A millisecond timestamp that strictly increases within this process,
/// even when two calls land in the same millisecond.
pub fn monotonic_stamp() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let mut last = LAST_STAMP.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_STAMP.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Object key for a new artifact: `converted-{stamp}.{extension}`.
pub fn generate_key(extension: &str) -> String {
    format!("converted-{}.{}", monotonic_stamp(), extension)
}
