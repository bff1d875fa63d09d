//! Data model: requests, remote jobs and stored artifacts.

use crate::error::ConvertError;
use crate::pipeline::encode;
use bytes::Bytes;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// A validated-on-use request to convert `file` into `target_format`.
///
/// Immutable once built: the pipeline only ever reads it.
#[derive(Clone)]
pub struct ConversionRequest {
    file: Bytes,
    target_format: String,
    file_name: Option<String>,
}

impl ConversionRequest {
    /// Build a request from raw bytes.
    pub fn new(file: impl Into<Bytes>, target_format: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            target_format: target_format.into(),
            file_name: None,
        }
    }

    /// Attach the original file name; the remote service uses its extension
    /// to detect the input type.
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.file_name = (!name.trim().is_empty()).then_some(name);
        self
    }

    /// Build a request from the wire shape: a base64 string (or data URI).
    pub fn from_base64(payload: &str, target_format: impl Into<String>) -> Result<Self, ConvertError> {
        let file = encode::decode_payload(payload)?;
        Ok(Self::new(file, target_format))
    }

    /// Build a request by reading a local file.
    pub async fn from_path(
        path: impl AsRef<Path>,
        target_format: impl Into<String>,
    ) -> Result<Self, ConvertError> {
        let path = path.as_ref();
        let file = tokio::fs::read(path).await.map_err(|e| {
            ConvertError::InvalidPayload {
                reason: format!("cannot read '{}': {e}", path.display()),
            }
        })?;
        let request = Self::new(file, target_format);
        Ok(match path.file_name() {
            Some(name) => request.with_file_name(name.to_string_lossy()),
            None => request,
        })
    }

    pub fn file(&self) -> &Bytes {
        &self.file
    }

    pub fn target_format(&self) -> &str {
        &self.target_format
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

impl fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("file", &format_args!("<{} bytes>", self.file.len()))
            .field("target_format", &self.target_format)
            .field("file_name", &self.file_name)
            .finish()
    }
}

/// Status of a job as reported by the remote conversion service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Finished,
    Error,
}

impl JobStatus {
    /// `finished` and `error` end the job's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Error)
    }

    /// Parse a remote status word, accepting the service's step vocabulary
    /// (`wait`, `convert`, `finish`, `failed`) as synonyms.
    pub fn parse(word: &str) -> Option<Self> {
        match word.trim().to_ascii_lowercase().as_str() {
            "queued" | "wait" | "waiting" => Some(JobStatus::Queued),
            "processing" | "convert" | "converting" | "upload" => Some(JobStatus::Processing),
            "finished" | "finish" | "done" => Some(JobStatus::Finished),
            "error" | "failed" | "failure" => Some(JobStatus::Error),
            _ => None,
        }
    }

    fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Processing => 1,
            JobStatus::Finished | JobStatus::Error => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Finished => "finished",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer to a status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub status: JobStatus,
    /// Download location, when the service includes it in the status answer.
    pub result_location: Option<Url>,
    /// Failure description for `error` jobs.
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: JobStatus) -> Self {
        Self {
            status,
            result_location: None,
            error: None,
        }
    }

    pub fn with_result_location(mut self, url: Url) -> Self {
        self.result_location = Some(url);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A remote conversion job as tracked during one request.
///
/// Only [`ConversionJob::observe`] changes it, and only forward:
/// `queued → processing → {finished | error}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    id: String,
    status: JobStatus,
    result_location: Option<Url>,
}

impl ConversionJob {
    /// A freshly submitted job.
    pub fn submitted(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            result_location: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn result_location(&self) -> Option<&Url> {
        self.result_location.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fold a poll answer into the job. Returns `true` if the status advanced.
    ///
    /// Terminal jobs never change. A report that would move the status
    /// backwards (`processing` → `queued`) is ignored.
    pub fn observe(&mut self, report: &StatusReport) -> bool {
        if self.is_terminal() || report.status.rank() < self.status.rank() {
            return false;
        }
        let advanced = report.status != self.status;
        self.status = report.status;
        if report.result_location.is_some() {
            self.result_location = report.result_location.clone();
        }
        advanced
    }
}

/// A converted file at rest in the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredArtifact {
    /// Object key inside the bucket, e.g. `converted-1718000000000.png`.
    pub key: String,
    /// Permanent, unauthenticated URL of the object.
    pub public_url: String,
    /// Content type the object was stored with.
    pub content_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serde_lowercase() {
        let s: JobStatus = serde_json::from_str("\"processing\"").unwrap();
        assert_eq!(s, JobStatus::Processing);
        assert_eq!(serde_json::to_string(&JobStatus::Finished).unwrap(), "\"finished\"");
    }

    #[test]
    fn status_parse_synonyms() {
        assert_eq!(JobStatus::parse("wait"), Some(JobStatus::Queued));
        assert_eq!(JobStatus::parse("convert"), Some(JobStatus::Processing));
        assert_eq!(JobStatus::parse("FINISH"), Some(JobStatus::Finished));
        assert_eq!(JobStatus::parse("error"), Some(JobStatus::Error));
        assert_eq!(JobStatus::parse("teleporting"), None);
    }

    #[test]
    fn job_status_is_monotonic() {
        let mut job = ConversionJob::submitted("j1");
        assert!(job.observe(&StatusReport::new(JobStatus::Processing)));
        assert!(!job.observe(&StatusReport::new(JobStatus::Queued)));
        assert_eq!(job.status(), JobStatus::Processing);

        let url = Url::parse("https://cdn.example/out.png").unwrap();
        assert!(job.observe(&StatusReport::new(JobStatus::Finished).with_result_location(url.clone())));
        assert_eq!(job.result_location(), Some(&url));

        // Nothing leaves a terminal state.
        assert!(!job.observe(&StatusReport::new(JobStatus::Error)));
        assert_eq!(job.status(), JobStatus::Finished);
    }

    #[test]
    fn repeated_status_is_not_an_advance() {
        let mut job = ConversionJob::submitted("j2");
        assert!(!job.observe(&StatusReport::new(JobStatus::Queued)));
        assert_eq!(job.status(), JobStatus::Queued);
    }

    #[test]
    fn request_debug_hides_payload() {
        let req = ConversionRequest::new(vec![1u8, 2, 3], "png");
        let dbg = format!("{req:?}");
        assert!(dbg.contains("<3 bytes>"));
        assert!(dbg.contains("png"));
    }

    #[test]
    fn request_from_base64() {
        let req = ConversionRequest::from_base64("aGVsbG8=", "txt").unwrap();
        assert_eq!(req.file().as_ref(), b"hello");
        assert_eq!(req.target_format(), "txt");
        assert!(ConversionRequest::from_base64("***", "txt").is_err());
    }

    #[tokio::test]
    async fn request_from_path_reads_file() {
        use std::io::Write;
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"%PDF-1.7").unwrap();
        let req = ConversionRequest::from_path(tmp.path(), "png").await.unwrap();
        assert_eq!(req.file().as_ref(), b"%PDF-1.7");
        assert!(req.file_name().is_some());

        let missing = ConversionRequest::from_path("/definitely/not/here.pdf", "png").await;
        assert!(missing.is_err());
    }
}
