//! Request handlers. Each one is a thin adapter over [`Converter`] or
//! [`JobRegistry`](crate::jobs::JobRegistry).
//!
//! [`Converter`]: crate::convert::Converter

use super::response::{ConversionSuccess, Failure, JobAccepted};
use super::AppState;
use crate::error::ConvertError;
use crate::formats::{self, SupportedFormat};
use crate::job::ConversionRequest;
use crate::jobs::JobSnapshot;
use crate::output::ConversionOutput;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Body of `POST /convert` and `POST /jobs`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertBody {
    /// Base64 file content, optionally as a `data:` URI.
    pub file: String,
    pub target_format: String,
    #[serde(default)]
    pub file_name: Option<String>,
}

impl ConvertBody {
    fn into_request(self) -> Result<ConversionRequest, ConvertError> {
        let request = ConversionRequest::from_base64(&self.file, self.target_format)?;
        Ok(match self.file_name {
            Some(name) => request.with_file_name(name),
            None => request,
        })
    }
}

/// `POST /convert`: run one conversion and answer with the public URL.
///
/// The conversion stops when the client disconnects (the handler future is
/// dropped) or when the server shuts down.
pub async fn convert(
    State(state): State<AppState>,
    body: Result<Json<ConvertBody>, JsonRejection>,
) -> Result<Json<ConversionSuccess>, Failure> {
    let Json(body) = body.map_err(|rejection| {
        warn!("POST /convert: unreadable body: {}", rejection.body_text());
        Failure::from(rejection)
    })?;

    match run_conversion(&state, body).await {
        Ok(output) => Ok(Json(ConversionSuccess::new(output.artifact.public_url))),
        Err(e) => {
            warn!("POST /convert failed [{}]: {}", e.kind(), e);
            Err(Failure::conversion(&e))
        }
    }
}

async fn run_conversion(
    state: &AppState,
    body: ConvertBody,
) -> Result<ConversionOutput, ConvertError> {
    let request = body.into_request()?;
    let cancel = state.shutdown.child_token();
    state.converter.convert_with_cancel(&request, &cancel).await
}

/// `POST /jobs`: submit and return a handle without waiting.
pub async fn submit_job(
    State(state): State<AppState>,
    body: Result<Json<ConvertBody>, JsonRejection>,
) -> Result<(StatusCode, Json<JobAccepted>), Failure> {
    let Json(body) = body?;
    let request = body.into_request()?;
    let snapshot = state.jobs.submit(request).await.inspect_err(|e| {
        warn!("POST /jobs failed [{}]: {}", e.kind(), e);
    })?;
    info!("Job {}: accepted", snapshot.job_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: snapshot.job_id,
            status: snapshot.state,
        }),
    ))
}

/// `GET /jobs/{id}`
pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, Failure> {
    state
        .jobs
        .status(&job_id)
        .map(Json)
        .ok_or_else(|| Failure::job_not_found(&job_id))
}

/// `GET /jobs/{id}/events`: server-sent snapshots until the job is terminal.
pub async fn job_events(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, Failure> {
    let snapshots = state
        .jobs
        .watch(&job_id)
        .ok_or_else(|| Failure::job_not_found(&job_id))?;
    let events = snapshots.map(|snapshot| {
        Event::default()
            .event(snapshot.state.as_str())
            .json_data(&snapshot)
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `DELETE /jobs/{id}`
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, Failure> {
    state
        .jobs
        .cancel(&job_id)
        .map(Json)
        .ok_or_else(|| Failure::job_not_found(&job_id))
}

/// `GET /formats`
pub async fn list_formats() -> Json<&'static [SupportedFormat]> {
    Json(formats::list_formats())
}

#[derive(Serialize)]
pub struct Health {
    status: &'static str,
}

/// `GET /health`
pub async fn health() -> Json<Health> {
    Json(Health { status: "ok" })
}

/// Any other method on a POST-only route.
pub async fn method_not_allowed() -> Failure {
    Failure::method_not_allowed()
}
