//! HTTP surface (axum).
//!
//! | Route | Method | Answer |
//! |-------|--------|--------|
//! | `/convert` | POST | `200 {message, fileUrl}` or `500 {message, error, errorKind}` |
//! | `/jobs` | POST | `202 {jobId, status}` |
//! | `/jobs/{id}` | GET / DELETE | job snapshot, `404` when unknown |
//! | `/jobs/{id}/events` | GET | server-sent snapshots until terminal |
//! | `/formats` | GET | the format registry |
//! | `/health` | GET | `{status: "ok"}` |
//!
//! Other methods on `/convert` and `/jobs` answer the `405` envelope.

pub mod handler;
pub mod response;

use crate::convert::Converter;
use crate::jobs::JobRegistry;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Room for the JSON wrapper, the `data:` prefix and the other fields.
const ENVELOPE_SLACK: usize = 64 * 1024;

/// Largest request body that can carry a file of `max_file_bytes` as base64.
///
/// Anything larger is refused before buffering; anything smaller reaches
/// validation, which reports an oversized file as `FileTooLarge`.
pub fn body_limit(max_file_bytes: usize) -> usize {
    max_file_bytes
        .div_ceil(3)
        .saturating_mul(4)
        .saturating_add(ENVELOPE_SLACK)
}

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub converter: Converter,
    pub jobs: JobRegistry,
    /// Fires on server shutdown; in-flight conversions derive child tokens.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(converter: Converter) -> Self {
        let jobs = JobRegistry::new(converter.clone());
        Self {
            converter,
            jobs,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let limit = body_limit(state.converter.config().max_file_bytes);
    Router::new()
        .route(
            "/convert",
            post(handler::convert).fallback(handler::method_not_allowed),
        )
        .route(
            "/jobs",
            post(handler::submit_job).fallback(handler::method_not_allowed),
        )
        .route(
            "/jobs/{id}",
            get(handler::job_status).delete(handler::cancel_job),
        )
        .route("/jobs/{id}/events", get(handler::job_events))
        .route("/formats", get(handler::list_formats))
        .route("/health", get(handler::health))
        .layer(DefaultBodyLimit::max(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until `state.shutdown` fires, then cancel every background job.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let jobs = state.jobs.clone();
    if let Ok(addr) = listener.local_addr() {
        info!("Listening on http://{}", addr);
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    jobs.shutdown();
    info!("Server stopped");
    Ok(())
}
