//! Pipeline stages for relaying a file through the conversion service.
//!
//! Each submodule implements exactly one step. The network-facing stages sit
//! behind a trait ([`remote::ConversionService`], [`fetch::ArtifactFetcher`],
//! [`store::ArtifactStore`]) so the orchestrator can be driven by mocks in
//! tests and the HTTP backends can be swapped without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! encode ──▶ remote ──▶ poller ──▶ fetch ──▶ store
//! (base64)   (submit)   (status)   (GET dl)  (upload + public URL)
//! ```
//!
//! 1. [`encode`]: decode the base64 / data-URI request payload and encode
//!    the submit body
//! 2. [`remote`]: submit the job, poll its status, look up the result link;
//!    idempotent calls retry with backoff
//! 3. [`poller`]: bounded wait for a terminal status with a deadline and a
//!    cancellation token
//! 4. [`fetch`]: download the converted bytes once; never retried
//! 5. [`store`]: write the bytes under a fresh key and derive the public URL

pub mod encode;
pub mod fetch;
pub mod poller;
pub mod remote;
pub mod store;
