//! # convert-relay
//!
//! Convert files through a remote conversion service and publish the result
//! to durable storage under a permanent public URL.
//!
//! The caller hands over a file and a target format; the relay submits the
//! file to a Convertio-compatible API, waits for the remote job, downloads
//! the converted bytes, uploads them to a Supabase-compatible bucket and
//! answers with the object's public URL. Either the whole chain succeeds or
//! the caller gets a single classified error; nothing partial is reported.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file + targetFormat
//!  │
//!  ├─ 1. Validate  format registry, size limits (no network)
//!  ├─ 2. Submit    POST to the conversion service → job id
//!  ├─ 3. Poll      every poll_interval until finished | error | max_wait
//!  ├─ 4. Download  GET the result location
//!  ├─ 5. Upload    POST into the bucket under converted-{stamp}.{ext}
//!  └─ 6. Output    public URL + per-stage stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use convert_relay::{ConversionRequest, Converter, RelayConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::builder()
//!         .api_key(std::env::var("CONVERTIO_API_KEY")?)
//!         .store_url(std::env::var("SUPABASE_URL")?)
//!         .store_key(std::env::var("SUPABASE_SERVICE_KEY")?)
//!         .build()?;
//!     let converter = Converter::new(config)?;
//!
//!     let request = ConversionRequest::from_path("report.docx", "pdf").await?;
//!     let output = converter.convert(&request).await?;
//!     println!("{}", output.public_url());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | axum router: `POST /convert` and the `/jobs` API |
//! | `cli`    | on      | Enables the `convert-relay` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Library-only users can opt out of both:
//! ```toml
//! convert-relay = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod formats;
pub mod job;
pub mod jobs;
pub mod output;
pub mod pipeline;
pub mod progress;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PollPolicy, RelayConfig, RelayConfigBuilder, RetryPolicy};
pub use convert::Converter;
pub use error::{ConvertError, ErrorKind, RemoteStep};
pub use formats::{find_format, list_formats, SupportedFormat};
pub use job::{ConversionJob, ConversionRequest, JobStatus, StatusReport, StoredArtifact};
pub use jobs::{JobRegistry, JobSnapshot, JobState};
pub use output::{ConversionOutput, ConversionStats};
pub use pipeline::fetch::{ArtifactFetcher, HttpFetcher};
pub use pipeline::remote::{ConversionService, ConvertioClient};
pub use pipeline::store::{ArtifactStore, SupabaseStore};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
