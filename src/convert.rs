//! The orchestrator: one conversion, start to finish.
//!
//! [`Converter`] runs the fixed chain
//! validate → submit → await completion → download → upload → public URL.
//! Any failure aborts the chain; nothing already done is compensated (the
//! remote job is left to expire on its own, no partial object is written
//! because the upload is the last step).
//!
//! Every transport binding goes through the same code: the HTTP handler and
//! the CLI call [`Converter::convert`] / [`Converter::convert_with_cancel`],
//! while [`crate::jobs::JobRegistry`] calls [`Converter::submit`] and
//! [`Converter::complete`] separately to return a handle right after submit.

use crate::config::RelayConfig;
use crate::error::ConvertError;
use crate::formats::{self, SupportedFormat};
use crate::job::ConversionRequest;
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::fetch::{ArtifactFetcher, HttpFetcher};
use crate::pipeline::poller;
use crate::pipeline::remote::{ConversionService, ConvertioClient};
use crate::pipeline::store::{self, ArtifactStore, SupabaseStore};
use crate::progress::{ConversionProgressCallback, NoopProgressCallback};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives conversions through the remote service and into the store.
///
/// Cheap to clone; all clones share the same HTTP clients.
#[derive(Clone)]
pub struct Converter {
    config: Arc<RelayConfig>,
    service: Arc<dyn ConversionService>,
    fetcher: Arc<dyn ArtifactFetcher>,
    store: Arc<dyn ArtifactStore>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Build a converter backed by the HTTP implementations of every stage.
    pub fn new(config: RelayConfig) -> Result<Self, ConvertError> {
        let service = ConvertioClient::new(&config)?;
        let fetcher = HttpFetcher::new(&config)?;
        let store = SupabaseStore::new(&config)?;
        Ok(Self::with_parts(
            config,
            Arc::new(service),
            Arc::new(fetcher),
            Arc::new(store),
        ))
    }

    /// Build a converter from explicit stage implementations.
    pub fn with_parts(
        config: RelayConfig,
        service: Arc<dyn ConversionService>,
        fetcher: Arc<dyn ArtifactFetcher>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            service,
            fetcher,
            store,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Check a request without touching the network.
    ///
    /// # Errors
    /// [`ConvertError::UnsupportedFormat`], [`ConvertError::EmptyFile`] or
    /// [`ConvertError::FileTooLarge`].
    pub fn validate(
        &self,
        request: &ConversionRequest,
    ) -> Result<&'static SupportedFormat, ConvertError> {
        let format = formats::validate_target_format(request.target_format())?;
        let size = request.file().len();
        if size == 0 {
            return Err(ConvertError::EmptyFile);
        }
        if size > self.config.max_file_bytes {
            return Err(ConvertError::FileTooLarge {
                size,
                max: self.config.max_file_bytes,
            });
        }
        Ok(format)
    }

    /// Validate `request` and hand it to the remote service.
    ///
    /// Returns the remote job id. Nothing is retried: a lost submit response
    /// must not start a second conversion.
    pub async fn submit(
        &self,
        request: &ConversionRequest,
        progress: &dyn ConversionProgressCallback,
    ) -> Result<String, ConvertError> {
        let result = self.submit_inner(request).await;
        match &result {
            Ok(job_id) => progress.on_submitted(job_id, request.target_format()),
            Err(e) => progress.on_failed(None, e.to_string()),
        }
        result
    }

    async fn submit_inner(&self, request: &ConversionRequest) -> Result<String, ConvertError> {
        let format = self.validate(request)?;
        debug!(
            "Submitting {} bytes ({}) for conversion to {}",
            request.file().len(),
            request.file_name().unwrap_or("unnamed"),
            format.value
        );
        self.service
            .submit(request.file(), request.file_name(), format.value)
            .await
    }

    /// Wait for `job_id`, then download its output and store it.
    ///
    /// `input_bytes` and `submit_duration_ms` in the returned stats are left
    /// at zero; [`Converter::convert_with_cancel`] fills them in.
    pub async fn complete(
        &self,
        job_id: &str,
        format: &'static SupportedFormat,
        cancel: &CancellationToken,
        progress: &dyn ConversionProgressCallback,
    ) -> Result<ConversionOutput, ConvertError> {
        let result = self.complete_inner(job_id, format, cancel, progress).await;
        if let Err(ref e) = result {
            warn!("Job {}: {} ({})", job_id, e, e.kind());
            progress.on_failed(Some(job_id), e.to_string());
        }
        result
    }

    async fn complete_inner(
        &self,
        job_id: &str,
        format: &'static SupportedFormat,
        cancel: &CancellationToken,
        progress: &dyn ConversionProgressCallback,
    ) -> Result<ConversionOutput, ConvertError> {
        let mut stats = ConversionStats::default();

        // ── Step 1: Wait for a terminal status ───────────────────────────
        let wait_start = Instant::now();
        let completion = poller::await_completion(
            self.service.as_ref(),
            job_id,
            self.config.poll_policy(),
            cancel,
            progress,
        )
        .await?;
        stats.polls = completion.polls;
        stats.wait_duration_ms = wait_start.elapsed().as_millis() as u64;
        progress.on_result_ready(job_id);

        // ── Step 2: Download the converted bytes ─────────────────────────
        let download_start = Instant::now();
        let bytes = cancellable(
            cancel,
            job_id,
            self.fetcher.download(&completion.result_location),
        )
        .await?;
        stats.output_bytes = bytes.len();
        stats.download_duration_ms = download_start.elapsed().as_millis() as u64;
        progress.on_downloaded(job_id, bytes.len());

        // ── Step 3: Store under a fresh key ──────────────────────────────
        let upload_start = Instant::now();
        let key = store::generate_key(format.extension());
        let artifact = cancellable(
            cancel,
            job_id,
            self.store.upload(bytes, &key, format.content_type()),
        )
        .await?;
        stats.upload_duration_ms = upload_start.elapsed().as_millis() as u64;
        progress.on_stored(job_id, &artifact.public_url);

        Ok(ConversionOutput {
            job_id: job_id.to_string(),
            artifact,
            stats,
        })
    }

    /// Run one conversion to completion.
    ///
    /// Progress events go to the callback configured on [`RelayConfig`], if
    /// any. Dropping the returned future abandons the conversion at its next
    /// suspension point.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
    ) -> Result<ConversionOutput, ConvertError> {
        self.convert_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`Converter::convert`], but stops with
    /// [`ConvertError::Cancelled`] as soon as `cancel` fires.
    pub async fn convert_with_cancel(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
    ) -> Result<ConversionOutput, ConvertError> {
        let noop = NoopProgressCallback;
        let progress: &dyn ConversionProgressCallback = match self.config.progress_callback {
            Some(ref cb) => cb.as_ref(),
            None => &noop,
        };
        self.run(request, cancel, progress).await
    }

    /// The whole chain with an explicit progress sink.
    pub async fn run(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
        progress: &dyn ConversionProgressCallback,
    ) -> Result<ConversionOutput, ConvertError> {
        let total_start = Instant::now();
        info!(
            "Starting conversion: {} bytes to {}",
            request.file().len(),
            request.target_format()
        );

        let format = self.validate(request).inspect_err(|e| {
            progress.on_failed(None, e.to_string());
        })?;

        let submit_start = Instant::now();
        let job_id = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let e = ConvertError::Cancelled { job_id: None };
                progress.on_failed(None, e.to_string());
                return Err(e);
            }
            submitted = self.submit(request, progress) => submitted?,
        };
        let submit_duration_ms = submit_start.elapsed().as_millis() as u64;
        info!("Job {}: submitted for conversion to {}", job_id, format.value);

        let mut output = self.complete(&job_id, format, cancel, progress).await?;
        output.stats.input_bytes = request.file().len();
        output.stats.submit_duration_ms = submit_duration_ms;
        output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "Conversion complete: job {} → {} ({} bytes, {} polls, {}ms total)",
            job_id,
            output.public_url(),
            output.stats.output_bytes,
            output.stats.polls,
            output.stats.total_duration_ms
        );
        Ok(output)
    }
}

/// Race `fut` against `cancel`.
async fn cancellable<T>(
    cancel: &CancellationToken,
    job_id: &str,
    fut: impl Future<Output = Result<T, ConvertError>>,
) -> Result<T, ConvertError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ConvertError::Cancelled {
            job_id: Some(job_id.to_string()),
        }),
        result = fut => result,
    }
}
