//! Configuration for the conversion relay.
//!
//! Everything the pipeline needs (remote service credentials, storage
//! location, polling policy, transport timeouts) lives in one
//! [`RelayConfig`], built once at process start through
//! [`RelayConfigBuilder`] and handed by reference to the client constructors.
//! Nothing reads the environment after that point; the CLI is the only place
//! environment variables are mapped onto the builder.

use crate::error::ConvertError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::time::Duration;

/// Default Convertio-compatible API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.convertio.co";

/// Default storage bucket for converted files.
pub const DEFAULT_BUCKET: &str = "converted-files";

/// Upper bound for `max_wait_secs` and the poll interval: one day.
pub const MAX_WAIT_LIMIT_SECS: u64 = 24 * 60 * 60;

/// Default decoded upload limit: 50 MiB.
pub const DEFAULT_MAX_FILE_BYTES: usize = 50 * 1024 * 1024;

/// Configuration for a relay instance.
///
/// Built via [`RelayConfig::builder()`].
///
/// # Example
/// ```rust
/// use convert_relay::RelayConfig;
///
/// let config = RelayConfig::builder()
///     .api_key("convertio-key")
///     .store_url("https://project.supabase.co")
///     .store_key("service-role-key")
///     .poll_interval_ms(1_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.bucket, "converted-files");
/// ```
#[derive(Clone)]
pub struct RelayConfig {
    /// API key for the remote conversion service.
    pub api_key: String,

    /// Root URL of the remote conversion service. Default: Convertio.
    pub api_base_url: String,

    /// Root URL of the durable store (Supabase project URL).
    pub store_url: String,

    /// Service key used to authenticate uploads.
    pub store_key: String,

    /// Bucket converted files are written to. Default: `converted-files`.
    pub bucket: String,

    /// Delay between status polls in milliseconds. Default: 2000.
    ///
    /// Matches the cadence the remote service documents for status checks;
    /// shorter intervals mostly burn request quota.
    pub poll_interval_ms: u64,

    /// Upper bound on the total time spent polling, in seconds. Default: 300.
    ///
    /// Most documents convert in well under a minute; large videos can take
    /// several. Past five minutes a caller is better served by the
    /// "taking too long" error than by a held connection.
    pub max_wait_secs: u64,

    /// Per-call timeout for submit, poll and result-link requests, in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Timeout for downloading the converted file, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Timeout for the storage upload, in seconds. Default: 120.
    pub upload_timeout_secs: u64,

    /// Retries for transient failures on poll and result-link calls. Default: 2.
    ///
    /// Submit is never retried: a lost response could otherwise start a
    /// second paid conversion for the same request.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Maximum decoded file size accepted for conversion. Default: 50 MiB.
    pub max_file_bytes: usize,

    /// How long finished jobs stay queryable through the job registry, in seconds. Default: 3600.
    pub job_retention_secs: u64,

    /// Progress events for [`crate::convert::Converter::convert`].
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            store_url: String::new(),
            store_key: String::new(),
            bucket: DEFAULT_BUCKET.to_string(),
            poll_interval_ms: 2_000,
            max_wait_secs: 300,
            request_timeout_secs: 30,
            download_timeout_secs: 120,
            upload_timeout_secs: 120,
            max_retries: 2,
            retry_backoff_ms: 500,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            job_retention_secs: 3_600,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelayConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base_url", &self.api_base_url)
            .field("store_url", &self.store_url)
            .field("store_key", &redact(&self.store_key))
            .field("bucket", &self.bucket)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("max_wait_secs", &self.max_wait_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("max_file_bytes", &self.max_file_bytes)
            .field("job_retention_secs", &self.job_retention_secs)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl RelayConfig {
    /// Create a new builder for `RelayConfig`.
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder {
            config: Self::default(),
        }
    }

    /// The polling policy derived from this config.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.poll_interval_ms),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }

    /// The retry policy for idempotent remote calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }

    /// Public URL prefix objects in the configured bucket resolve under.
    pub fn public_url_base(&self) -> String {
        format!(
            "{}/storage/v1/object/public/{}",
            self.store_url.trim_end_matches('/'),
            self.bucket
        )
    }
}

/// Bounds for the job poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two consecutive polls.
    pub interval: Duration,
    /// Total polling budget; exceeding it is a timeout.
    pub max_wait: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        RelayConfig::default().poll_policy()
    }
}

/// Bounded exponential backoff for transient remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (1-based): `backoff * 2^(attempt-1)`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// Builder for [`RelayConfig`].
#[derive(Debug)]
pub struct RelayConfigBuilder {
    config: RelayConfig,
}

impl RelayConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.config.store_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn store_key(mut self, key: impl Into<String>) -> Self {
        self.config.store_key = key.into();
        self
    }

    pub fn bucket(mut self, bucket: impl Into<String>) -> Self {
        self.config.bucket = bucket.into();
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    pub fn max_wait_secs(mut self, secs: u64) -> Self {
        self.config.max_wait_secs = secs;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn upload_timeout_secs(mut self, secs: u64) -> Self {
        self.config.upload_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(10);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_file_bytes(mut self, bytes: usize) -> Self {
        self.config.max_file_bytes = bytes;
        self
    }

    pub fn job_retention_secs(mut self, secs: u64) -> Self {
        self.config.job_retention_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RelayConfig, ConvertError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Conversion service API key is required (CONVERTIO_API_KEY)".into(),
            ));
        }
        for (name, url) in [("API base URL", &c.api_base_url), ("store URL", &c.store_url)] {
            if reqwest::Url::parse(url).is_err() {
                return Err(ConvertError::InvalidConfig(format!(
                    "{name} must be an absolute http(s) URL, got '{url}'"
                )));
            }
        }
        if c.store_key.trim().is_empty() {
            return Err(ConvertError::InvalidConfig(
                "Storage service key is required (SUPABASE_SERVICE_KEY)".into(),
            ));
        }
        if c.bucket.is_empty() || c.bucket.contains('/') {
            return Err(ConvertError::InvalidConfig(format!(
                "Bucket name must be non-empty and contain no '/', got '{}'",
                c.bucket
            )));
        }
        if c.max_wait_secs == 0 {
            return Err(ConvertError::InvalidConfig(
                "Maximum wait must be at least 1 second".into(),
            ));
        }
        if c.max_wait_secs > MAX_WAIT_LIMIT_SECS {
            return Err(ConvertError::InvalidConfig(format!(
                "Maximum wait must be at most {MAX_WAIT_LIMIT_SECS} seconds, got {}",
                c.max_wait_secs
            )));
        }
        if c.poll_interval_ms / 1_000 > MAX_WAIT_LIMIT_SECS {
            return Err(ConvertError::InvalidConfig(format!(
                "Poll interval must be at most {MAX_WAIT_LIMIT_SECS} seconds, got {}ms",
                c.poll_interval_ms
            )));
        }
        if c.max_file_bytes == 0 {
            return Err(ConvertError::InvalidConfig(
                "Maximum file size must be positive".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RelayConfigBuilder {
        RelayConfig::builder()
            .api_key("k")
            .store_url("https://store.example")
            .store_key("s")
    }

    #[test]
    fn defaults() {
        let c = valid().build().unwrap();
        assert_eq!(c.poll_interval_ms, 2_000);
        assert_eq!(c.max_wait_secs, 300);
        assert_eq!(c.max_file_bytes, 50 * 1024 * 1024);
        assert_eq!(c.api_base_url, "https://api.convertio.co");
        assert_eq!(
            c.poll_policy(),
            PollPolicy {
                interval: Duration::from_secs(2),
                max_wait: Duration::from_secs(300),
            }
        );
    }

    #[test]
    fn missing_credentials_rejected() {
        assert!(RelayConfig::builder().build().is_err());
        let no_store_key = RelayConfig::builder()
            .api_key("k")
            .store_url("https://store.example")
            .build();
        assert!(no_store_key.is_err());
    }

    #[test]
    fn bad_urls_rejected() {
        let err = valid().store_url("not a url").build().unwrap_err();
        assert!(err.to_string().contains("store URL"), "got: {err}");
    }

    #[test]
    fn trailing_slashes_trimmed() {
        let c = valid()
            .store_url("https://store.example/")
            .api_base_url("https://api.example//")
            .build()
            .unwrap();
        assert_eq!(c.api_base_url, "https://api.example");
        assert_eq!(
            c.public_url_base(),
            "https://store.example/storage/v1/object/public/converted-files"
        );
    }

    #[test]
    fn debug_redacts_secrets() {
        let c = valid().api_key("super-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn retry_delay_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff: Duration::from_millis(500),
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1_000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2_000));
        assert_eq!(RetryPolicy::none().delay_for(1), Duration::ZERO);
    }

    #[test]
    fn polling_bounds_rejected() {
        let err = valid().max_wait_secs(u64::MAX).build().unwrap_err();
        assert!(matches!(err, ConvertError::InvalidConfig(_)));
        assert!(err.to_string().contains("Maximum wait"), "got: {err}");

        let err = valid().poll_interval_ms(u64::MAX).build().unwrap_err();
        assert!(err.to_string().contains("Poll interval"), "got: {err}");

        let c = valid().max_wait_secs(MAX_WAIT_LIMIT_SECS).build().unwrap();
        assert_eq!(c.poll_policy().max_wait, Duration::from_secs(MAX_WAIT_LIMIT_SECS));
    }

    #[test]
    fn poll_interval_clamped() {
        let c = valid().poll_interval_ms(0).build().unwrap();
        assert_eq!(c.poll_interval_ms, 10);
    }
}
