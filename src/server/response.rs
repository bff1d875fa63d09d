//! Response envelopes.
//!
//! Successful conversions answer `{message, fileUrl}`. Every failure, from a
//! malformed body to a storage rejection, answers
//! `{message, error, errorKind}` with a fixed top-level message per status.

use crate::error::{ConvertError, ErrorKind};
use crate::jobs::JobState;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// `200` body of `POST /convert`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionSuccess {
    pub message: String,
    pub file_url: String,
}

impl ConversionSuccess {
    pub fn new(file_url: impl Into<String>) -> Self {
        Self {
            message: "Conversion successful".to_string(),
            file_url: file_url.into(),
        }
    }
}

/// `202` body of `POST /jobs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub status: JobState,
}

/// Failure envelope plus the status it is sent with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(skip, default = "internal_status")]
    status: StatusCode,
    pub message: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

fn internal_status() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

impl Failure {
    /// Any failed conversion: always `500 Conversion failed`.
    pub fn conversion(error: &ConvertError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Conversion failed".to_string(),
            error: error.to_string(),
            error_kind: Some(error.kind()),
        }
    }

    /// A body that could not be read as a conversion request.
    pub fn bad_body(rejection: &JsonRejection) -> Self {
        let error = match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                "Request must have Content-Type: application/json".to_string()
            }
            JsonRejection::JsonDataError(e) => format!("Invalid request body: {}", e.body_text()),
            JsonRejection::JsonSyntaxError(e) => format!("Malformed JSON: {}", e.body_text()),
            other => other.body_text(),
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Conversion failed".to_string(),
            error,
            error_kind: Some(ErrorKind::Validation),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            message: "Method not allowed".to_string(),
            error: "Only POST requests are supported".to_string(),
            error_kind: None,
        }
    }

    pub fn job_not_found(job_id: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: "Job not found".to_string(),
            error: format!("No job with id '{job_id}' is registered"),
            error_kind: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ConvertError> for Failure {
    fn from(error: ConvertError) -> Self {
        Self::conversion(&error)
    }
}

impl From<JsonRejection> for Failure {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_body(&rejection)
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
