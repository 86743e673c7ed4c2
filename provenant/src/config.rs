//! Resolved run configuration.
//!
//! The core consumes configuration as an already-validated, immutable value.
//! Resolving it from files, environment or CLI flags is the embedder's
//! concern. The whole object is serializable so a run can record a
//! fingerprint of the exact settings it executed under.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Top-level configuration for one pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Name of the pipeline, used in artifact paths and correlation fields.
    pub pipeline_name: String,
    /// The upstream registry's release/version token. Scopes cache keys and
    /// is recorded in artifact metadata.
    pub source_version: String,
    /// Root directory artifacts are published under.
    pub destination: PathBuf,
    /// Per-endpoint overrides; endpoints not listed use `endpoint_defaults`.
    #[serde(default)]
    pub endpoints: BTreeMap<String, EndpointConfig>,
    /// Settings applied to endpoints without an explicit entry.
    #[serde(default)]
    pub endpoint_defaults: EndpointConfig,
    /// Response cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Schema selection and drift pinning.
    pub schema: SchemaConfig,
    /// Validation gate policy.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Deterministic writer settings.
    pub writer: WriterConfig,
    /// Retention of prior releases' artifacts; `None` disables pruning.
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
    /// Wall-clock budget for the cleanup stage, in seconds.
    #[serde(default = "default_cleanup_timeout")]
    pub cleanup_timeout_secs: f64,
}

fn default_cleanup_timeout() -> f64 {
    30.0
}

impl CoreConfig {
    /// Computes the configuration fingerprint: the SHA-256 of the canonical
    /// JSON rendering of the resolved settings.
    ///
    /// Identical resolved configuration yields an identical fingerprint, so
    /// the fingerprint recorded in artifact metadata is reproducible.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Returns the effective settings for a logical endpoint.
    #[must_use]
    pub fn endpoint(&self, name: &str) -> &EndpointConfig {
        self.endpoints.get(name).unwrap_or(&self.endpoint_defaults)
    }
}

/// Rate-limit, retry, circuit-breaker and batch settings for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Token-bucket rate limit.
    pub rate: RateLimitConfig,
    /// Retry/backoff policy for transient failures.
    pub retry: RetryConfig,
    /// Circuit-breaker thresholds.
    pub breaker: BreakerConfig,
    /// Batch request shape.
    pub batch: BatchConfig,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            rate: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            breaker: BreakerConfig::default(),
            batch: BatchConfig::default(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Token-bucket parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tokens the bucket holds.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_per_sec: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_per_sec: 3.0,
        }
    }
}

/// Retry/backoff parameters for transient remote failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the initial one.
    pub max_attempts: u32,
    /// Base delay between retries in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds.
    pub max_delay_ms: u64,
    /// Jitter applied to computed delays.
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: Jitter::Equal,
        }
    }
}

/// Jitter applied to backoff delays to avoid thundering-herd retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Jitter {
    /// No jitter; delays are exact. Useful in tests.
    None,
    /// Random from 0 to the computed delay.
    Full,
    /// Half fixed, half random.
    #[default]
    Equal,
}

/// Circuit-breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// Seconds the circuit stays open before admitting a trial call.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

/// Shape of identifier-batch requests for an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Query parameter carrying the joined identifier list.
    pub id_param: String,
    /// Field inside each response item that names the identifier it answers.
    pub id_field: String,
    /// Separator used to join identifiers into `id_param`.
    pub id_separator: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            id_param: "ids".to_string(),
            id_field: "id".to_string(),
            id_separator: ",".to_string(),
        }
    }
}

/// Response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether caching is enabled at all.
    pub enabled: bool,
    /// Entry time-to-live in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 6 * 60 * 60,
        }
    }
}

/// Schema selection for the validation gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Identifier of the schema the batch must conform to.
    pub schema_id: String,
    /// The schema version this pipeline last ran against. A major-version
    /// increment relative to this is rejected before any data is processed.
    #[serde(default)]
    pub last_known_version: Option<String>,
}

/// Validation gate policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Abort on error-severity issues, or record them and proceed.
    pub mode: ValidationMode,
    /// Under fail-open, whether the full batch or only the valid subset
    /// continues to the writer.
    pub fail_open_output: FailOpenOutput,
}

/// Fail-fast aborts the run on error-severity issues; fail-open records them
/// and lets the batch proceed with `schema_valid: false` in metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationMode {
    /// Any error-severity issue aborts the run.
    #[default]
    FailFast,
    /// Issues are recorded and surfaced; the batch proceeds.
    FailOpen,
}

/// What fail-open validation forwards to the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailOpenOutput {
    /// Only records that passed every check continue.
    #[default]
    ValidSubset,
    /// The whole batch continues, violations included.
    FullBatch,
}

/// Deterministic writer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Columns that uniquely identify a record within the dataset.
    pub business_key: Vec<String>,
    /// Sort columns, ascending; empty means sort by the business key.
    #[serde(default)]
    pub sort_by: Vec<String>,
    /// Fixed decimal places for canonical float rendering.
    pub float_precision: usize,
    /// The one sentinel rendered for null values across the whole file.
    pub null_sentinel: String,
    /// Where nulls sort relative to non-null values.
    pub null_order: NullOrder,
    /// Digest algorithm for row and business-key hashes.
    pub hash_algorithm: HashAlgorithm,
    /// Provenance columns excluded from the row hash.
    pub hash_exclude: Vec<String>,
    /// Whether the quality sidecar includes pairwise numeric correlations.
    pub correlations: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            business_key: Vec::new(),
            sort_by: Vec::new(),
            float_precision: 6,
            null_sentinel: String::new(),
            null_order: NullOrder::Last,
            hash_algorithm: HashAlgorithm::Sha256,
            hash_exclude: vec!["run_id".to_string(), "generated_at".to_string()],
            correlations: false,
        }
    }
}

impl WriterConfig {
    /// Returns the effective sort columns.
    #[must_use]
    pub fn effective_sort_by(&self) -> &[String] {
        if self.sort_by.is_empty() {
            &self.business_key
        } else {
            &self.sort_by
        }
    }
}

/// Null position in the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullOrder {
    /// Nulls sort before all values.
    First,
    /// Nulls sort after all values.
    #[default]
    Last,
}

/// Digest algorithm choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// SHA-512.
    Sha512,
}

/// Retention of prior releases' artifact directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Newest release directories to keep, current run included.
    pub keep_releases: usize,
    /// Remove release directories older than this many days, regardless of
    /// count. `None` means age does not expire artifacts.
    #[serde(default)]
    pub max_age_days: Option<u32>,
}
