//! Artifact fetcher: download the converted bytes from the result location.
//!
//! No retries here: a failed download surfaces through the orchestrator's
//! single failure path. The transport timeout bounds the whole transfer.

use crate::config::RelayConfig;
use crate::error::ConvertError;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Retrieves a finished conversion's output.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn download(&self, url: &Url) -> Result<Bytes, ConvertError>;
}

/// reqwest-backed [`ArtifactFetcher`].
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    http: Client,
    timeout_secs: u64,
}

impl HttpFetcher {
    pub fn new(config: &RelayConfig) -> Result<Self, ConvertError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .user_agent(concat!("convert-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            timeout_secs: config.download_timeout_secs,
        })
    }

    fn failed(&self, url: &Url, e: reqwest::Error) -> ConvertError {
        if e.is_timeout() {
            ConvertError::DownloadTimeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
        } else {
            ConvertError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
                transient: e.is_connect(),
            }
        }
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn download(&self, url: &Url) -> Result<Bytes, ConvertError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConvertError::DownloadFailed {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
                transient: false,
            });
        }

        debug!("Downloading converted file from {}", url);
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConvertError::DownloadFailed {
                url: url.to_string(),
                reason: format!("HTTP {status}"),
                transient: crate::error::is_transient_status(status.as_u16()),
            });
        }

        let bytes = response.bytes().await.map_err(|e| self.failed(url, e))?;
        info!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> HttpFetcher {
        let config = RelayConfig::builder()
            .api_key("k")
            .store_url("https://store.example")
            .store_key("s")
            .build()
            .unwrap();
        HttpFetcher::new(&config).unwrap()
    }

    #[test]
    fn rejects_non_http_schemes() {
        let url = Url::parse("file:///etc/passwd").unwrap();
        let err = tokio_test::block_on(fetcher().download(&url)).unwrap_err();
        assert!(err.to_string().contains("unsupported scheme"), "got: {err}");
        assert!(!err.is_transient());
    }
}
