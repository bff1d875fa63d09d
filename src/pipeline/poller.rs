//! Job poller: wait for a remote job to reach a terminal status.
//!
//! The loop polls immediately, then once per `interval`, until the job is
//! `finished` or `error`, the `max_wait` deadline passes, or the caller
//! cancels. `queued` and `processing` are the same "keep waiting" condition.
//!
//! Both the status request and the inter-poll delay race the deadline and
//! the cancellation token, so a stuck request cannot outlive `max_wait` and a
//! disconnected caller stops the loop at the next suspension point.

use crate::config::PollPolicy;
use crate::error::ConvertError;
use crate::job::{ConversionJob, JobStatus};
use crate::pipeline::remote::ConversionService;
use crate::progress::ConversionProgressCallback;
use reqwest::Url;
use std::time::Duration;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Stand-in deadline for a `max_wait` too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// A job that reached `finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Where the converted bytes can be downloaded.
    pub result_location: Url,
    /// Number of status polls issued.
    pub polls: u32,
}

/// Poll `job_id` until it finishes.
///
/// # Errors
/// - [`ConvertError::ConversionFailed`] as soon as the service reports `error`
/// - [`ConvertError::Timeout`] once `policy.max_wait` has elapsed
/// - [`ConvertError::Cancelled`] when `cancel` fires
/// - any remote-service error from the status or result-link calls
pub async fn await_completion(
    service: &dyn ConversionService,
    job_id: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
    progress: &dyn ConversionProgressCallback,
) -> Result<Completion, ConvertError> {
    let started = Instant::now();
    // Out-of-range budgets saturate instead of overflowing the clock.
    let deadline = started
        .checked_add(policy.max_wait)
        .unwrap_or_else(|| started + FAR_FUTURE);
    let mut job = ConversionJob::submitted(job_id);
    let mut polls = 0u32;

    let timed_out = || ConvertError::Timeout {
        job_id: job_id.to_string(),
        waited_secs: started.elapsed().as_secs(),
    };
    let cancelled = || ConvertError::Cancelled {
        job_id: Some(job_id.to_string()),
    };

    loop {
        polls += 1;
        let report = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            polled = timeout_at(deadline, service.poll_status(job_id)) => match polled {
                Ok(report) => report?,
                Err(_) => {
                    warn!("Job {}: status poll still pending at the deadline", job_id);
                    return Err(timed_out());
                }
            },
        };

        if job.observe(&report) || polls == 1 {
            progress.on_status(job_id, job.status());
        }

        match job.status() {
            JobStatus::Error => {
                let reason = report
                    .error
                    .unwrap_or_else(|| "remote service reported an error".into());
                warn!("Job {}: conversion failed after {} polls: {}", job_id, polls, reason);
                return Err(ConvertError::ConversionFailed {
                    job_id: job_id.to_string(),
                    reason,
                });
            }
            JobStatus::Finished => {
                info!(
                    "Job {}: finished after {} polls in {}ms",
                    job_id,
                    polls,
                    started.elapsed().as_millis()
                );
                let result_location = match job.result_location() {
                    Some(url) => url.clone(),
                    None => tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(cancelled()),
                        url = service.fetch_result_url(job_id) => url?,
                    },
                };
                return Ok(Completion {
                    result_location,
                    polls,
                });
            }
            JobStatus::Queued | JobStatus::Processing => {}
        }

        let next_poll = Instant::now().checked_add(policy.interval).unwrap_or(deadline);
        if next_poll >= deadline {
            // The next poll would land past the budget: wait out the
            // remainder and give up without polling again.
            debug!("Job {}: poll budget exhausted, waiting for deadline", job_id);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = sleep_until(deadline) => return Err(timed_out()),
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(cancelled()),
            _ = sleep_until(next_poll) => {}
        }
    }
}
