//! Progress-callback trait for conversion lifecycle events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::RelayConfigBuilder::progress_callback`] to receive events
//! as a conversion moves through submit, polling, download and upload.
//!
//! The CLI uses it to drive a terminal spinner; the job registry uses it to
//! publish status snapshots to watchers. The library itself never knows how
//! the events are consumed.
//!
//! # Example
//!
//! ```rust
//! use convert_relay::{ConversionProgressCallback, JobStatus};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct PollCounter {
//!     polls: AtomicUsize,
//! }
//!
//! impl ConversionProgressCallback for PollCounter {
//!     fn on_status(&self, _job_id: &str, _status: JobStatus) {
//!         self.polls.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let cb: Arc<dyn ConversionProgressCallback> = Arc::new(PollCounter {
//!     polls: AtomicUsize::new(0),
//! });
//! cb.on_status("job-1", JobStatus::Queued);
//! ```

use crate::job::JobStatus;
use std::sync::Arc;

/// Called by the orchestrator as a conversion progresses.
///
/// Implementations must be `Send + Sync`: the job registry runs pipelines on
/// spawned tasks. All methods default to no-ops so callers only override what
/// they care about.
pub trait ConversionProgressCallback: Send + Sync {
    /// The remote service accepted the file and allocated `job_id`.
    fn on_submitted(&self, job_id: &str, target_format: &str) {
        let _ = (job_id, target_format);
    }

    /// A status poll returned `status`.
    fn on_status(&self, job_id: &str, status: JobStatus) {
        let _ = (job_id, status);
    }

    /// The job finished and the result location is known; download starts.
    fn on_result_ready(&self, job_id: &str) {
        let _ = job_id;
    }

    /// The converted bytes were downloaded; upload starts.
    fn on_downloaded(&self, job_id: &str, bytes: usize) {
        let _ = (job_id, bytes);
    }

    /// The artifact is stored and publicly reachable at `public_url`.
    fn on_stored(&self, job_id: &str, public_url: &str) {
        let _ = (job_id, public_url);
    }

    /// The conversion failed at some step. `job_id` is `None` when the
    /// failure happened before the remote service allocated one.
    fn on_failed(&self, job_id: Option<&str>, error: String) {
        let _ = (job_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::RelayConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct TrackingCallback {
        statuses: Mutex<Vec<JobStatus>>,
        downloaded: AtomicUsize,
        stored: Mutex<Option<String>>,
        failures: AtomicUsize,
    }

    impl ConversionProgressCallback for TrackingCallback {
        fn on_status(&self, _job_id: &str, status: JobStatus) {
            self.statuses.lock().unwrap().push(status);
        }

        fn on_downloaded(&self, _job_id: &str, bytes: usize) {
            self.downloaded.store(bytes, Ordering::SeqCst);
        }

        fn on_stored(&self, _job_id: &str, public_url: &str) {
            *self.stored.lock().unwrap() = Some(public_url.to_string());
        }

        fn on_failed(&self, _job_id: Option<&str>, _error: String) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_submitted("j", "png");
        cb.on_status("j", JobStatus::Processing);
        cb.on_result_ready("j");
        cb.on_downloaded("j", 10);
        cb.on_stored("j", "https://store/x.png");
        cb.on_failed(None, "boom".into());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_status("j", JobStatus::Queued);
        tracker.on_status("j", JobStatus::Processing);
        tracker.on_status("j", JobStatus::Finished);
        tracker.on_downloaded("j", 42);
        tracker.on_stored("j", "https://store/converted-1.png");

        assert_eq!(
            *tracker.statuses.lock().unwrap(),
            vec![JobStatus::Queued, JobStatus::Processing, JobStatus::Finished]
        );
        assert_eq!(tracker.downloaded.load(Ordering::SeqCst), 42);
        assert_eq!(
            tracker.stored.lock().unwrap().as_deref(),
            Some("https://store/converted-1.png")
        );
        assert_eq!(tracker.failures.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn arc_dyn_callback_moves_into_spawned_task() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        tokio::spawn(async move {
            cb.on_failed(Some("j"), "timeout".to_string());
        })
        .await
        .expect("spawn must succeed");
    }
}
