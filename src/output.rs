//! Result types returned by a successful conversion.

use crate::job::StoredArtifact;
use serde::{Deserialize, Serialize};

/// Everything known about a finished conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionOutput {
    /// Identifier the remote service allocated for the job.
    pub job_id: String,
    /// Where the converted file now lives.
    pub artifact: StoredArtifact,
    /// Timing and size figures for this run.
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// The permanent public URL of the converted file.
    pub fn public_url(&self) -> &str {
        &self.artifact.public_url
    }
}

/// Per-stage figures for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStats {
    /// Size of the submitted file in bytes.
    pub input_bytes: usize,
    /// Size of the converted file in bytes.
    pub output_bytes: usize,
    /// Number of status polls issued.
    pub polls: u32,
    /// Time spent submitting.
    pub submit_duration_ms: u64,
    /// Time spent waiting for the remote job.
    pub wait_duration_ms: u64,
    /// Time spent downloading the result.
    pub download_duration_ms: u64,
    /// Time spent uploading to the store.
    pub upload_duration_ms: u64,
    /// Wall-clock time of the whole conversion.
    pub total_duration_ms: u64,
}
