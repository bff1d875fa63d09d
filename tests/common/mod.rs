//! Scripted stand-ins for the three network seams.
//!
//! Each mock counts its calls so tests can assert what did (and did not)
//! reach the network. Timing uses `tokio::time::Instant`, which follows the
//! paused clock of `#[tokio::test(start_paused = true)]`.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use convert_relay::{
    ArtifactFetcher, ArtifactStore, ConversionService, ConvertError, Converter, JobStatus,
    RelayConfig, StatusReport, StoredArtifact,
};
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

// ── Conversion service ──────────────────────────────────────────────────────

/// Answers polls from a fixed status script; the last entry repeats forever.
pub struct MockService {
    script: Vec<JobStatus>,
    pub submits: AtomicUsize,
    pub polls: AtomicUsize,
    pub result_lookups: AtomicUsize,
    pub poll_instants: Mutex<Vec<Instant>>,
    submit_error: Mutex<Option<ConvertError>>,
}

impl MockService {
    pub fn new(script: &[JobStatus]) -> Arc<Self> {
        assert!(!script.is_empty(), "status script must not be empty");
        Arc::new(Self {
            script: script.to_vec(),
            submits: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            result_lookups: AtomicUsize::new(0),
            poll_instants: Mutex::new(Vec::new()),
            submit_error: Mutex::new(None),
        })
    }

    /// Finishes on the first poll.
    pub fn finishing() -> Arc<Self> {
        Self::new(&[JobStatus::Finished])
    }

    /// Never leaves `processing`.
    pub fn stuck() -> Arc<Self> {
        Self::new(&[JobStatus::Processing])
    }

    /// Make the next submit fail with `error`.
    pub fn fail_submit(&self, error: ConvertError) {
        *self.submit_error.lock().unwrap() = Some(error);
    }

    pub fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn poll_instants(&self) -> Vec<Instant> {
        self.poll_instants.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversionService for MockService {
    async fn submit(
        &self,
        _file: &[u8],
        _file_name: Option<&str>,
        _target_format: &str,
    ) -> Result<String, ConvertError> {
        if let Some(e) = self.submit_error.lock().unwrap().take() {
            return Err(e);
        }
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("job-{n}"))
    }

    async fn poll_status(&self, _job_id: &str) -> Result<StatusReport, ConvertError> {
        let i = self.polls.fetch_add(1, Ordering::SeqCst);
        self.poll_instants.lock().unwrap().push(Instant::now());
        let status = self.script[i.min(self.script.len() - 1)];
        Ok(match status {
            JobStatus::Error => StatusReport::new(status).with_error("unsupported input file"),
            _ => StatusReport::new(status),
        })
    }

    async fn fetch_result_url(&self, job_id: &str) -> Result<Url, ConvertError> {
        self.result_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(Url::parse(&format!("https://convertio.example/dl/{job_id}")).unwrap())
    }
}

// ── Fetcher ─────────────────────────────────────────────────────────────────

pub struct MockFetcher {
    body: Bytes,
    pub downloads: AtomicUsize,
}

impl MockFetcher {
    pub fn returning(body: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            body: Bytes::from_static(body),
            downloads: AtomicUsize::new(0),
        })
    }

    pub fn downloads(&self) -> usize {
        self.downloads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn download(&self, _url: &Url) -> Result<Bytes, ConvertError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.clone())
    }
}

// ── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub key: String,
    pub content_type: String,
    pub size: usize,
}

/// In-memory store. Public URLs are `https://store/{key}` unless a fixed URL
/// is set.
pub struct MockStore {
    fixed_url: Option<String>,
    deny: bool,
    pub uploads: Mutex<Vec<Upload>>,
}

impl MockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fixed_url: None,
            deny: false,
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn with_fixed_url(url: &str) -> Arc<Self> {
        Arc::new(Self {
            fixed_url: Some(url.to_string()),
            deny: false,
            uploads: Mutex::new(Vec::new()),
        })
    }

    /// Every upload fails with a permission error.
    pub fn denying() -> Arc<Self> {
        Arc::new(Self {
            fixed_url: None,
            deny: true,
            uploads: Mutex::new(Vec::new()),
        })
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for MockStore {
    async fn upload(
        &self,
        bytes: Bytes,
        key: &str,
        content_type: &str,
    ) -> Result<StoredArtifact, ConvertError> {
        if self.deny {
            return Err(ConvertError::StoragePermissionDenied {
                key: key.to_string(),
                detail: "new row violates row-level security policy".into(),
            });
        }
        self.uploads.lock().unwrap().push(Upload {
            key: key.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len(),
        });
        Ok(StoredArtifact {
            key: key.to_string(),
            public_url: self.public_url(key),
            content_type: content_type.to_string(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        self.fixed_url
            .clone()
            .unwrap_or_else(|| format!("https://store/{key}"))
    }
}

// ── Wiring ──────────────────────────────────────────────────────────────────

/// Config with a 2 s poll interval and the given polling budget.
pub fn config(max_wait_secs: u64) -> RelayConfig {
    RelayConfig::builder()
        .api_key("test-key")
        .store_url("https://store.example")
        .store_key("service-key")
        .poll_interval_ms(2_000)
        .max_wait_secs(max_wait_secs)
        .build()
        .unwrap()
}

pub fn converter(
    config: RelayConfig,
    service: &Arc<MockService>,
    fetcher: &Arc<MockFetcher>,
    store: &Arc<MockStore>,
) -> Converter {
    Converter::with_parts(config, service.clone(), fetcher.clone(), store.clone())
}

/// Ten bytes that look like the start of a PDF.
pub const TINY_PDF: &[u8] = b"%PDF-1.7\n%";
