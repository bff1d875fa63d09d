//! Remote conversion client: submit, poll status, fetch the result link.
//!
//! [`ConversionService`] is the seam the orchestrator and poller talk to;
//! [`ConvertioClient`] is the HTTP implementation against a
//! Convertio-compatible API. The client holds no job state between calls:
//! the remote service is the source of truth.
//!
//! ## Retry Strategy
//!
//! Status polls and result-link lookups are idempotent GETs, so transient
//! failures (timeouts, refused connections, HTTP 429/5xx) are retried with
//! exponential backoff (`retry_backoff_ms * 2^attempt`). Submit is a paid,
//! non-idempotent POST and is never retried.

use crate::config::{RelayConfig, RetryPolicy};
use crate::error::{is_transient_status, ConvertError, RemoteStep};
use crate::job::{JobStatus, StatusReport};
use crate::pipeline::encode;
use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// The three calls the pipeline makes against the remote conversion service.
#[async_trait]
pub trait ConversionService: Send + Sync {
    /// Submit `file` for conversion to `target_format`; returns the job id.
    async fn submit(
        &self,
        file: &[u8],
        file_name: Option<&str>,
        target_format: &str,
    ) -> Result<String, ConvertError>;

    /// Current status of `job_id`. A remote `error` status is a valid answer.
    async fn poll_status(&self, job_id: &str) -> Result<StatusReport, ConvertError>;

    /// Download location of a finished job's output.
    async fn fetch_result_url(&self, job_id: &str) -> Result<Url, ConvertError>;
}

/// HTTP client for a Convertio-compatible conversion API.
#[derive(Clone, Debug)]
pub struct ConvertioClient {
    inner: Arc<ConvertioInner>,
}

struct ConvertioInner {
    http: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ConvertioInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvertioInner")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ConvertioClient {
    /// Create a client from the relay configuration.
    ///
    /// Every request inherits `request_timeout_secs` from the transport.
    pub fn new(config: &RelayConfig) -> Result<Self, ConvertError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(concat!("convert-relay/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConvertError::Internal(format!("HTTP client: {e}")))?;

        debug!(
            "Conversion client for {} (timeout {}s, {} retries)",
            config.api_base_url, config.request_timeout_secs, config.max_retries
        );

        Ok(Self {
            inner: Arc::new(ConvertioInner {
                http,
                base_url: config.api_base_url.trim_end_matches('/').to_string(),
                api_key: config.api_key.clone(),
                retry: config.retry_policy(),
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.inner.base_url, path)
    }

    async fn get_json(&self, step: RemoteStep, path: &str) -> Result<ApiEnvelope, ConvertError> {
        let response = self
            .inner
            .http
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ConvertError::remote_request(step, &e))?;
        read_envelope(step, response).await
    }
}

#[async_trait]
impl ConversionService for ConvertioClient {
    async fn submit(
        &self,
        file: &[u8],
        file_name: Option<&str>,
        target_format: &str,
    ) -> Result<String, ConvertError> {
        let body = SubmitBody {
            apikey: &self.inner.api_key,
            input: "base64",
            file: encode::encode_payload(file),
            filename: file_name.unwrap_or("input"),
            outputformat: target_format,
        };

        let response = self
            .inner
            .http
            .post(self.url("/convert"))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConvertError::remote_request(RemoteStep::Submit, &e))?;

        let envelope = read_envelope(RemoteStep::Submit, response).await?;
        let id = envelope
            .job_id()
            .ok_or_else(|| ConvertError::MalformedResponse {
                step: RemoteStep::Submit,
                detail: "response carries no job identifier".into(),
            })?;

        info!("Submitted {} bytes for conversion to {}: job {}", file.len(), target_format, id);
        Ok(id)
    }

    async fn poll_status(&self, job_id: &str) -> Result<StatusReport, ConvertError> {
        let path = format!("/convert/{job_id}/status");
        let envelope = retry_transient(self.inner.retry, "status poll", || {
            self.get_json(RemoteStep::Poll, &path)
        })
        .await?;

        let report = envelope.status_report()?;
        debug!("Job {}: status {}", job_id, report.status);
        Ok(report)
    }

    async fn fetch_result_url(&self, job_id: &str) -> Result<Url, ConvertError> {
        let path = format!("/convert/{job_id}/dl");
        let envelope = retry_transient(self.inner.retry, "result link", || {
            self.get_json(RemoteStep::ResultLink, &path)
        })
        .await?;

        let raw = envelope.result_url().ok_or_else(|| ConvertError::MalformedResponse {
            step: RemoteStep::ResultLink,
            detail: "response carries no download URL".into(),
        })?;
        parse_location(RemoteStep::ResultLink, &raw)
    }
}

/// Run `op`, retrying transient failures per `policy`.
///
/// Non-transient errors and the final transient error are returned as-is.
pub async fn retry_transient<T, F, Fut>(
    policy: RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, ConvertError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ConvertError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                attempt += 1;
                let backoff = policy.delay_for(attempt);
                warn!(
                    "{}: retry {}/{} after {}ms: {}",
                    what,
                    attempt,
                    policy.max_retries,
                    backoff.as_millis(),
                    e
                );
                sleep(backoff).await;
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SubmitBody<'a> {
    apikey: &'a str,
    input: &'static str,
    file: String,
    filename: &'a str,
    outputformat: &'a str,
}

/// Response body of every endpoint. The service nests payloads under
/// `data`; older deployments return them at the top level, so both are read.
#[derive(Debug, Default, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ApiData>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiData {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    step: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    output: Option<ApiOutput>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiOutput {
    #[serde(default)]
    url: Option<String>,
}

impl ApiEnvelope {
    fn job_id(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|d| d.id.clone())
            .or_else(|| self.id.clone())
            .filter(|id| !id.trim().is_empty())
    }

    fn status_report(&self) -> Result<StatusReport, ConvertError> {
        let data = self.data.as_ref();
        // The top-level `status` may be the API call outcome ("ok"), which
        // `JobStatus::parse` rejects, so it is consulted last.
        let status = [
            data.and_then(|d| d.step.as_deref()),
            data.and_then(|d| d.status.as_deref()),
            self.status.as_deref(),
        ]
        .into_iter()
        .flatten()
        .find_map(JobStatus::parse)
        .ok_or_else(|| ConvertError::MalformedResponse {
            step: RemoteStep::Poll,
            detail: "response carries no recognisable job status".into(),
        })?;

        let mut report = StatusReport::new(status);
        if status == JobStatus::Finished {
            if let Some(raw) = data.and_then(|d| d.output.as_ref()).and_then(|o| o.url.as_deref()) {
                report = report.with_result_location(parse_location(RemoteStep::Poll, raw)?);
            }
        }
        if status == JobStatus::Error {
            let reason = data
                .and_then(|d| d.error.clone())
                .or_else(|| self.error.clone())
                .unwrap_or_else(|| "remote service reported an error".into());
            report = report.with_error(reason);
        }
        Ok(report)
    }

    fn result_url(&self) -> Option<String> {
        self.data
            .as_ref()
            .and_then(|d| d.url.clone().or_else(|| d.output.as_ref().and_then(|o| o.url.clone())))
            .or_else(|| self.url.clone())
    }
}

async fn read_envelope(step: RemoteStep, response: Response) -> Result<ApiEnvelope, ConvertError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ConvertError::remote_request(step, &e))?;

    if !status.is_success() {
        let detail = serde_json::from_str::<ApiEnvelope>(&body)
            .ok()
            .and_then(|env| env.error)
            .unwrap_or_else(|| truncate(&body, 200));
        if is_transient_status(status.as_u16()) {
            debug!("{} answered HTTP {} (transient)", step, status);
        }
        return Err(ConvertError::RemoteStatus {
            step,
            status: status.as_u16(),
            detail,
        });
    }

    serde_json::from_str(&body).map_err(|e| ConvertError::MalformedResponse {
        step,
        detail: e.to_string(),
    })
}

fn parse_location(step: RemoteStep, raw: &str) -> Result<Url, ConvertError> {
    Url::parse(raw).map_err(|e| ConvertError::MalformedResponse {
        step,
        detail: format!("invalid download URL '{raw}': {e}"),
    })
}

fn truncate(s: &str, max: usize) -> String {
    let s = s.trim();
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{cut}…")
}
