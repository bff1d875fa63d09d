//! Decoupled job API: submit now, ask later.
//!
//! [`JobRegistry::submit`] validates and submits synchronously, so a bad
//! request or a rejected submit still fails the call, then moves the rest of
//! the pipeline onto a spawned task and returns a [`JobSnapshot`] keyed by the
//! remote job id. Callers poll [`JobRegistry::status`] or follow
//! [`JobRegistry::watch`], which yields every state change and ends after the
//! terminal one.
//!
//! Each job owns a child of the registry's cancellation token:
//! [`JobRegistry::cancel`] stops one job's local work, [`JobRegistry::shutdown`]
//! stops all of them. The remote job is never cancelled; it expires on the
//! service side.
//!
//! Jobs live in memory only. Terminal entries older than the retention window
//! are dropped whenever a new job is inserted.

use crate::convert::Converter;
use crate::error::{ConvertError, ErrorKind};
use crate::job::{ConversionRequest, JobStatus};
use crate::progress::{ConversionProgressCallback, NoopProgressCallback};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Where a registered job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Submitted,
    Queued,
    Processing,
    Downloading,
    Storing,
    Finished,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Submitted => "submitted",
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Downloading => "downloading",
            JobState::Storing => "storing",
            JobState::Finished => "finished",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Finished | JobState::Failed | JobState::Cancelled)
    }
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: String,
    pub target_format: String,
    pub state: JobState,
    /// Public URL, once `finished`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Failure description, once `failed` or `cancelled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl JobSnapshot {
    fn submitted(job_id: &str, target_format: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            target_format: target_format.to_string(),
            state: JobState::Submitted,
            file_url: None,
            error: None,
            error_kind: None,
        }
    }

    fn fail(&mut self, error: &ConvertError) {
        self.state = match error {
            ConvertError::Cancelled { .. } => JobState::Cancelled,
            _ => JobState::Failed,
        };
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
    }
}

struct Entry {
    snapshot: Arc<watch::Sender<JobSnapshot>>,
    cancel: CancellationToken,
    created: Instant,
}

struct RegistryInner {
    converter: Converter,
    jobs: Mutex<HashMap<String, Entry>>,
    root: CancellationToken,
    retention: Duration,
}

/// In-memory registry of background conversions.
///
/// Cheap to clone; clones share the same jobs.
#[derive(Clone)]
pub struct JobRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.jobs().len())
            .field("retention", &self.inner.retention)
            .finish()
    }
}

impl JobRegistry {
    /// Create a registry whose retention window comes from the converter's config.
    pub fn new(converter: Converter) -> Self {
        let retention = Duration::from_secs(converter.config().job_retention_secs);
        Self {
            inner: Arc::new(RegistryInner {
                converter,
                jobs: Mutex::new(HashMap::new()),
                root: CancellationToken::new(),
                retention,
            }),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Validate and submit `request`, then finish it in the background.
    ///
    /// # Errors
    /// Validation and submit failures are returned directly; nothing is
    /// registered for them.
    pub async fn submit(&self, request: ConversionRequest) -> Result<JobSnapshot, ConvertError> {
        if self.inner.root.is_cancelled() {
            return Err(ConvertError::Cancelled { job_id: None });
        }
        let converter = &self.inner.converter;
        let format = converter.validate(&request)?;
        let job_id = converter.submit(&request, &NoopProgressCallback).await?;

        let snapshot = JobSnapshot::submitted(&job_id, format.value);
        let (tx, _rx) = watch::channel(snapshot.clone());
        let tx = Arc::new(tx);
        let cancel = self.inner.root.child_token();

        {
            let mut jobs = self.jobs();
            let retention = self.inner.retention;
            let before = jobs.len();
            jobs.retain(|_, e| {
                !(e.snapshot.borrow().state.is_terminal() && e.created.elapsed() > retention)
            });
            if jobs.len() < before {
                debug!("Pruned {} expired jobs", before - jobs.len());
            }
            jobs.insert(
                job_id.clone(),
                Entry {
                    snapshot: Arc::clone(&tx),
                    cancel: cancel.clone(),
                    created: Instant::now(),
                },
            );
        }

        let converter = converter.clone();
        let input_bytes = request.file().len();
        tokio::spawn(async move {
            let publisher = SnapshotPublisher {
                tx: Arc::clone(&tx),
            };
            match converter.complete(&job_id, format, &cancel, &publisher).await {
                Ok(output) => {
                    info!(
                        "Job {}: stored {} bytes (from {} input bytes) at {}",
                        job_id,
                        output.stats.output_bytes,
                        input_bytes,
                        output.public_url()
                    );
                    publisher.update(|s| {
                        s.state = JobState::Finished;
                        s.file_url = Some(output.artifact.public_url.clone());
                    });
                }
                Err(e) => publisher.update(|s| s.fail(&e)),
            }
        });

        Ok(snapshot)
    }

    /// Latest snapshot of `job_id`, if it is (still) registered.
    pub fn status(&self, job_id: &str) -> Option<JobSnapshot> {
        self.jobs()
            .get(job_id)
            .map(|e| e.snapshot.borrow().clone())
    }

    /// Follow `job_id`: the current snapshot first, then every change, ending
    /// after the first terminal snapshot.
    pub fn watch(&self, job_id: &str) -> Option<impl Stream<Item = JobSnapshot> + Send + 'static> {
        let rx = self.jobs().get(job_id)?.snapshot.subscribe();
        Some(stream::unfold((Some(rx), true), |(rx, first)| async move {
            let Some(mut rx) = rx else {
                return None;
            };
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let snapshot = rx.borrow_and_update().clone();
            let rest = (!snapshot.state.is_terminal()).then_some(rx);
            Some((snapshot, (rest, false)))
        }))
    }

    /// Stop local work on `job_id`. Returns the resulting snapshot; a job that
    /// already reached a terminal state keeps it.
    pub fn cancel(&self, job_id: &str) -> Option<JobSnapshot> {
        let jobs = self.jobs();
        let entry = jobs.get(job_id)?;
        entry.snapshot.send_modify(|s| {
            if !s.state.is_terminal() {
                s.fail(&ConvertError::Cancelled {
                    job_id: Some(job_id.to_string()),
                });
            }
        });
        entry.cancel.cancel();
        info!("Job {}: cancelled", job_id);
        let snapshot = entry.snapshot.borrow().clone();
        Some(snapshot)
    }

    /// Cancel every running job and refuse new submissions.
    pub fn shutdown(&self) {
        info!("Job registry shutting down");
        self.inner.root.cancel();
    }
}

/// Maps pipeline progress events onto the job's snapshot.
struct SnapshotPublisher {
    tx: Arc<watch::Sender<JobSnapshot>>,
}

impl SnapshotPublisher {
    /// Apply `f` unless the job is already terminal.
    fn update(&self, f: impl FnOnce(&mut JobSnapshot)) {
        self.tx.send_if_modified(|s| {
            if s.state.is_terminal() {
                return false;
            }
            f(s);
            true
        });
    }

    fn advance(&self, state: JobState) {
        self.tx.send_if_modified(|s| {
            if s.state.is_terminal() || s.state == state {
                return false;
            }
            s.state = state;
            true
        });
    }
}

impl ConversionProgressCallback for SnapshotPublisher {
    fn on_status(&self, _job_id: &str, status: JobStatus) {
        match status {
            JobStatus::Queued => self.advance(JobState::Queued),
            JobStatus::Processing => self.advance(JobState::Processing),
            // The terminal remote states resolve through the pipeline result.
            JobStatus::Finished | JobStatus::Error => {}
        }
    }

    fn on_result_ready(&self, _job_id: &str) {
        self.advance(JobState::Downloading);
    }

    fn on_downloaded(&self, _job_id: &str, _bytes: usize) {
        self.advance(JobState::Storing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobState::Finished.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
        assert!(!JobState::Storing.is_terminal());
        assert!(!JobState::Submitted.is_terminal());
    }

    #[test]
    fn failure_classification() {
        let mut s = JobSnapshot::submitted("j", "png");
        s.fail(&ConvertError::Cancelled { job_id: None });
        assert_eq!(s.state, JobState::Cancelled);
        assert_eq!(s.error_kind, Some(ErrorKind::Cancelled));

        let mut s = JobSnapshot::submitted("j", "png");
        s.fail(&ConvertError::Timeout {
            job_id: "j".into(),
            waited_secs: 300,
        });
        assert_eq!(s.state, JobState::Failed);
        assert_eq!(s.error_kind, Some(ErrorKind::Timeout));
    }

    #[test]
    fn publisher_never_leaves_terminal_state() {
        let (tx, rx) = watch::channel(JobSnapshot::submitted("j", "png"));
        let publisher = SnapshotPublisher { tx: Arc::new(tx) };
        publisher.on_status("j", JobStatus::Processing);
        assert_eq!(rx.borrow().state, JobState::Processing);
        publisher.update(|s| s.state = JobState::Finished);
        publisher.on_result_ready("j");
        assert_eq!(rx.borrow().state, JobState::Finished);
    }

    #[test]
    fn snapshot_serialises_camel_case() {
        let mut s = JobSnapshot::submitted("abc", "png");
        s.state = JobState::Finished;
        s.file_url = Some("https://store/converted-1.png".into());
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["jobId"], "abc");
        assert_eq!(json["targetFormat"], "png");
        assert_eq!(json["state"], "finished");
        assert_eq!(json["fileUrl"], "https://store/converted-1.png");
        assert!(json.get("error").is_none());
    }
}
