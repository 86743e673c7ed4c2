//! The deterministic artifact writer.
//!
//! A validated batch becomes a reproducible artifact set in fixed steps:
//! stable sort by business key, canonical value rendering, dual hashing,
//! serialization, atomic publication, then the quality sidecar and lineage
//! metadata. Identical input under identical configuration reproduces
//! identical bytes at every output path.

mod atomic;
mod canonical;
mod hashing;
mod metadata;
mod quality;
mod sort;
#[allow(clippy::module_inception)]
mod writer;

pub use atomic::publish_atomic;
pub use canonical::{canonical_value, format_float, normalize_string, TIMESTAMP_FORMAT};
pub use hashing::{dataset_digest, hash_hex, row_digest};
pub use metadata::{ArtifactMetadata, StageTiming};
pub use quality::{ColumnQuality, Correlation, QualityReport};
pub use sort::sort_batch;
pub use writer::{ArtifactWriter, Destination, RunLineage, WriteResult};
