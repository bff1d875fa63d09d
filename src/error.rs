//! Error types for the convert-relay library.
//!
//! Every failure in the pipeline is a [`ConvertError`]. Each variant carries
//! the context an operator needs (job id, storage key, URL, HTTP status) and
//! maps onto exactly one [`ErrorKind`], the coarse classification that
//! survives into logs and the `errorKind` field of the HTTP failure envelope.
//!
//! The conversion either yields a public URL or an error. There is no
//! "converted but not stored" state, so unlike page-oriented converters there
//! is no separate non-fatal error type.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The step of the remote conversion protocol a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStep {
    Submit,
    Poll,
    ResultLink,
}

impl fmt::Display for RemoteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteStep::Submit => "submit",
            RemoteStep::Poll => "status poll",
            RemoteStep::ResultLink => "result link",
        })
    }
}

/// All errors returned by the convert-relay library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// The requested target format is not in the format registry.
    #[error("Unsupported target format '{format}'. Supported types are: {supported}")]
    UnsupportedFormat { format: String, supported: String },

    /// The `file` field is not valid base64 (or a base64 data URI).
    #[error("File payload is not valid base64: {reason}")]
    InvalidPayload { reason: String },

    /// The decoded file has no content.
    #[error("File is empty")]
    EmptyFile,

    /// The decoded file exceeds the configured size limit.
    #[error("File is too large ({size} bytes). Maximum file size is {max} bytes.")]
    FileTooLarge { size: usize, max: usize },

    // ── Remote conversion service errors ──────────────────────────────────
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("Conversion service {step} request failed: {reason}")]
    RemoteRequest {
        step: RemoteStep,
        reason: String,
        transient: bool,
    },

    /// The conversion service answered with a non-success status.
    #[error("Conversion service {step} returned HTTP {status}: {detail}")]
    RemoteStatus {
        step: RemoteStep,
        status: u16,
        detail: String,
    },

    /// The conversion service answered 2xx but the body is unusable.
    #[error("Conversion service {step} returned a malformed response: {detail}")]
    MalformedResponse { step: RemoteStep, detail: String },

    /// The conversion service reported the job itself as failed.
    #[error("Conversion job {job_id} failed: {reason}")]
    ConversionFailed { job_id: String, reason: String },

    /// Polling exceeded the maximum wait without a terminal status.
    #[error("Conversion is taking too long: job {job_id} did not finish within {waited_secs}s")]
    Timeout { job_id: String, waited_secs: u64 },

    // ── Artifact download errors ──────────────────────────────────────────
    /// Downloading the converted file failed.
    #[error("Failed to download converted file from '{url}': {reason}")]
    DownloadFailed {
        url: String,
        reason: String,
        transient: bool,
    },

    /// Downloading the converted file exceeded the transport timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Durable storage errors ────────────────────────────────────────────
    /// The store refused the write because of missing permissions.
    #[error("Storage denied upload of '{key}': {detail}")]
    StoragePermissionDenied { key: String, detail: String },

    /// The store rejected the write for any other reason.
    #[error("Storage rejected upload of '{key}' (HTTP {status}): {detail}")]
    StorageRejected {
        key: String,
        status: u16,
        detail: String,
    },

    /// The store could not be reached.
    #[error("Storage unavailable while uploading '{key}': {reason}")]
    StorageUnavailable { key: String, reason: String },

    // ── Lifecycle errors ──────────────────────────────────────────────────
    /// The caller went away or the job was cancelled before it completed.
    #[error("Conversion cancelled{}", job_suffix(.job_id))]
    Cancelled { job_id: Option<String> },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ConvertError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    RemoteService,
    ConversionFailed,
    Timeout,
    Storage,
    Cancelled,
    Config,
    Internal,
}

impl ErrorKind {
    /// The wire name used in logs and the `errorKind` response field.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::RemoteService => "remote_service",
            ErrorKind::ConversionFailed => "conversion_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Storage => "storage",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Config => "config",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConvertError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConvertError::UnsupportedFormat { .. }
            | ConvertError::InvalidPayload { .. }
            | ConvertError::EmptyFile
            | ConvertError::FileTooLarge { .. } => ErrorKind::Validation,
            ConvertError::RemoteRequest { .. }
            | ConvertError::RemoteStatus { .. }
            | ConvertError::MalformedResponse { .. }
            | ConvertError::DownloadFailed { .. }
            | ConvertError::DownloadTimeout { .. } => ErrorKind::RemoteService,
            ConvertError::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            ConvertError::Timeout { .. } => ErrorKind::Timeout,
            ConvertError::StoragePermissionDenied { .. }
            | ConvertError::StorageRejected { .. }
            | ConvertError::StorageUnavailable { .. } => ErrorKind::Storage,
            ConvertError::Cancelled { .. } => ErrorKind::Cancelled,
            ConvertError::InvalidConfig(_) => ErrorKind::Config,
            ConvertError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the same call might succeed.
    ///
    /// True for transport failures (timeouts, refused connections) and for
    /// HTTP 429 / 5xx answers. Application-level rejections (4xx, malformed
    /// bodies, failed jobs) are never transient.
    pub fn is_transient(&self) -> bool {
        match self {
            ConvertError::RemoteRequest { transient, .. }
            | ConvertError::DownloadFailed { transient, .. } => *transient,
            ConvertError::RemoteStatus { status, .. } => is_transient_status(*status),
            ConvertError::DownloadTimeout { .. } | ConvertError::StorageUnavailable { .. } => true,
            _ => false,
        }
    }

    /// Build a [`ConvertError::RemoteRequest`] from a reqwest transport error.
    pub(crate) fn remote_request(step: RemoteStep, err: &reqwest::Error) -> Self {
        ConvertError::RemoteRequest {
            step,
            reason: err.to_string(),
            transient: err.is_timeout() || err.is_connect(),
        }
    }
}

fn job_suffix(job_id: &Option<String>) -> String {
    job_id
        .as_deref()
        .map(|id| format!(" (job {id})"))
        .unwrap_or_default()
}

/// HTTP 408, 429 and every 5xx are worth another attempt.
pub(crate) fn is_transient_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display_lists_supported() {
        let e = ConvertError::UnsupportedFormat {
            format: "bmp".into(),
            supported: "PDF, PNG Image".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("'bmp'"), "got: {msg}");
        assert!(msg.contains("PNG Image"), "got: {msg}");
        assert_eq!(e.kind(), ErrorKind::Validation);
    }

    #[test]
    fn timeout_message_is_user_actionable() {
        let e = ConvertError::Timeout {
            job_id: "abc".into(),
            waited_secs: 300,
        };
        assert!(e.to_string().starts_with("Conversion is taking too long"));
        assert_eq!(e.kind(), ErrorKind::Timeout);
    }

    #[test]
    fn cancelled_display_with_and_without_job() {
        let with = ConvertError::Cancelled {
            job_id: Some("j1".into()),
        };
        assert_eq!(with.to_string(), "Conversion cancelled (job j1)");
        let without = ConvertError::Cancelled { job_id: None };
        assert_eq!(without.to_string(), "Conversion cancelled");
    }

    #[test]
    fn storage_variants_share_kind() {
        let denied = ConvertError::StoragePermissionDenied {
            key: "converted-1.png".into(),
            detail: "new row violates row-level security policy".into(),
        };
        assert_eq!(denied.kind(), ErrorKind::Storage);
        assert!(denied.to_string().contains("converted-1.png"));
        assert!(!denied.is_transient());
    }

    #[test]
    fn transient_classification() {
        let server_error = ConvertError::RemoteStatus {
            step: RemoteStep::Poll,
            status: 503,
            detail: "busy".into(),
        };
        assert!(server_error.is_transient());

        let rejected = ConvertError::RemoteStatus {
            step: RemoteStep::Submit,
            status: 401,
            detail: "bad key".into(),
        };
        assert!(!rejected.is_transient());
        assert_eq!(rejected.kind(), ErrorKind::RemoteService);

        let failed = ConvertError::ConversionFailed {
            job_id: "x".into(),
            reason: "unsupported input".into(),
        };
        assert!(!failed.is_transient());
    }

    #[test]
    fn error_kind_serialises_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RemoteService).unwrap();
        assert_eq!(json, "\"remote_service\"");
        assert_eq!(ErrorKind::ConversionFailed.to_string(), "conversion_failed");
    }
}
