//! Artifact metadata document.

use serde::{Deserialize, Serialize};

/// Elapsed time of one completed stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Stage name.
    pub stage: String,
    /// Elapsed milliseconds.
    pub duration_ms: u64,
}

/// Lineage metadata recorded alongside every published dataset.
///
/// Field order is fixed and serde-driven, so the serialized document has
/// deterministic key ordering. `run_id` and `generated_at` are run-variant
/// by design and are excluded from the row hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    /// Identifier of the run that produced the artifact.
    pub run_id: String,
    /// Pipeline name.
    pub pipeline: String,
    /// Fingerprint of the resolved configuration.
    pub config_fingerprint: String,
    /// The upstream registry's release/version token.
    pub source_version: String,
    /// Schema the dataset conforms to.
    pub schema_id: String,
    /// Version of that schema.
    pub schema_version: String,
    /// False when fail-open validation let a violating batch through.
    pub schema_valid: bool,
    /// Rows in the published dataset.
    pub row_count: usize,
    /// Digest algorithm used for both hashes.
    pub hash_algorithm: String,
    /// Dataset digest over full canonical rows.
    pub hash_row: String,
    /// Dataset digest over business-key columns only.
    pub hash_business_key: String,
    /// Per-stage elapsed times, in execution order.
    pub stage_durations: Vec<StageTiming>,
    /// Wall-clock timestamp of generation, UTC.
    pub generated_at: String,
}

impl ArtifactMetadata {
    /// Canonical JSON bytes, newline-terminated.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
