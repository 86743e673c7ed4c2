//! Error types for the provenant acquisition core.
//!
//! Every failure the core can surface is classified here once, at the point
//! where it is created. Remote failures carry a retriable/non-retriable
//! classification on the error value itself so that retry decisions are never
//! re-derived further up the stack.

use crate::schema::ValidationIssue;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// The main error type for acquisition runs.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration is unresolvable or structurally invalid.
    ///
    /// Fatal before any stage runs.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A remote call failed after exhausting its retry budget, or failed
    /// with a non-retriable classification.
    #[error("{0}")]
    Remote(#[from] RemoteError),

    /// Schema validation produced error-severity issues under fail-fast mode.
    #[error("{0}")]
    Validation(#[from] ValidationFailure),

    /// An artifact write failed. Always fatal; atomic publication guarantees
    /// no partial artifact is visible.
    #[error("{0}")]
    Write(#[from] WriteError),

    /// The run was cancelled cooperatively.
    #[error("run cancelled: {reason}")]
    Cancelled {
        /// The reason supplied at cancellation time.
        reason: String,
    },

    /// A stage failed; wraps the underlying error with the stage name.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        /// The stage that failed.
        stage: String,
        /// The underlying error.
        #[source]
        source: Box<CoreError>,
    },

    /// IO error outside the writer's atomic publication path.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Wraps an error with the stage it occurred in.
    #[must_use]
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// Returns true if this error (or the error it wraps) is a cancellation.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled { .. } => true,
            Self::Stage { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

/// Configuration errors, raised before any stage runs.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A setting is structurally invalid.
    #[error("invalid configuration: {field}: {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it is invalid.
        reason: String,
    },

    /// No schema is registered under the configured identifier.
    #[error("unknown schema: {schema_id}")]
    UnknownSchema {
        /// The unresolved schema identifier.
        schema_id: String,
    },

    /// The declared schema version differs from the last-known version by a
    /// breaking (major) increment.
    #[error(
        "schema '{schema_id}' drifted by a major version: last known {last_known}, declared {declared}"
    )]
    SchemaDrift {
        /// The schema identifier.
        schema_id: String,
        /// The version the pipeline was last run against.
        last_known: String,
        /// The version the schema now declares.
        declared: String,
    },
}

/// A remote call failure with its classification attached.
#[derive(Debug, Clone, Error)]
#[error("remote call to '{endpoint}' failed after {attempts} attempt(s): {kind}")]
pub struct RemoteError {
    /// The logical endpoint name.
    pub endpoint: String,
    /// The failure classification.
    pub kind: RemoteErrorKind,
    /// How many attempts were made before surfacing.
    pub attempts: u32,
}

impl RemoteError {
    /// Creates a new remote error.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, kind: RemoteErrorKind, attempts: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            kind,
            attempts,
        }
    }

    /// Returns true if repeating the call could succeed.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        self.kind.is_retriable()
    }
}

/// Classification of a remote failure, decided once at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteErrorKind {
    /// The request timed out (connect or read).
    #[error("timeout")]
    Timeout,

    /// The server answered with a non-success status code.
    #[error("status {code}")]
    Status {
        /// The HTTP status code.
        code: u16,
        /// Server-specified wait from a `Retry-After` header, if present.
        retry_after: Option<Duration>,
    },

    /// The request never produced a response (DNS, connect, TLS).
    #[error("transport: {0}")]
    Transport(String),

    /// The circuit for this endpoint is open; no network attempt was made.
    #[error("circuit open")]
    CircuitOpen,

    /// A batch response did not contain an entry for this identifier.
    #[error("missing from batch response")]
    MissingFromBatch,
}

impl RemoteErrorKind {
    /// Returns true if repeating the call could succeed.
    ///
    /// Timeouts, 5xx and 429 are transient. Other 4xx cannot succeed by
    /// repetition and spend no retry budget. An open circuit fails fast.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { code, .. } => *code >= 500 || *code == 429,
            Self::CircuitOpen | Self::MissingFromBatch => false,
        }
    }

    /// Returns the server-specified wait, if this failure carried one.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Status { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns true if this failure should count toward the circuit breaker.
    ///
    /// Only server-side faults count: a 4xx (including 429) says the service
    /// is up and answering.
    #[must_use]
    pub fn counts_toward_circuit(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { code, .. } => *code >= 500,
            Self::CircuitOpen | Self::MissingFromBatch => false,
        }
    }
}

/// Raised when validation produces error-severity issues under fail-fast.
#[derive(Debug, Clone, Error)]
#[error("schema '{schema_id}' validation failed with {error_count} error-severity issue(s)")]
pub struct ValidationFailure {
    /// The schema the batch was validated against.
    pub schema_id: String,
    /// Count of error-severity issues.
    pub error_count: usize,
    /// All issues from the pass, errors and warnings, for diagnostics.
    pub issues: Vec<ValidationIssue>,
}

impl ValidationFailure {
    /// Creates a validation failure from a full issue set.
    #[must_use]
    pub fn new(schema_id: impl Into<String>, issues: Vec<ValidationIssue>) -> Self {
        let error_count = issues.iter().filter(|i| i.is_error()).count();
        Self {
            schema_id: schema_id.into(),
            error_count,
            issues,
        }
    }
}

/// Artifact write failures.
#[derive(Debug, Error)]
pub enum WriteError {
    /// Filesystem failure while staging or publishing an artifact.
    #[error("write failed for {path}: {source}")]
    Io {
        /// The artifact path being produced.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The batch does not carry a column the writer configuration requires.
    #[error("column '{column}' required by writer configuration is not in the batch")]
    MissingColumn {
        /// The absent column.
        column: String,
    },

    /// Serializing the metadata or quality sidecar failed.
    #[error("artifact serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_classification() {
        assert!(RemoteErrorKind::Timeout.is_retriable());
        assert!(RemoteErrorKind::Transport("connection reset".into()).is_retriable());
        assert!(RemoteErrorKind::Status { code: 500, retry_after: None }.is_retriable());
        assert!(RemoteErrorKind::Status { code: 503, retry_after: None }.is_retriable());
        assert!(RemoteErrorKind::Status { code: 429, retry_after: None }.is_retriable());

        assert!(!RemoteErrorKind::Status { code: 400, retry_after: None }.is_retriable());
        assert!(!RemoteErrorKind::Status { code: 404, retry_after: None }.is_retriable());
        assert!(!RemoteErrorKind::CircuitOpen.is_retriable());
        assert!(!RemoteErrorKind::MissingFromBatch.is_retriable());
    }

    #[test]
    fn circuit_accounting_excludes_client_errors() {
        assert!(RemoteErrorKind::Timeout.counts_toward_circuit());
        assert!(RemoteErrorKind::Status { code: 502, retry_after: None }.counts_toward_circuit());
        assert!(!RemoteErrorKind::Status { code: 429, retry_after: None }.counts_toward_circuit());
        assert!(!RemoteErrorKind::Status { code: 404, retry_after: None }.counts_toward_circuit());
    }

    #[test]
    fn stage_wrapping_preserves_cancellation() {
        let err = CoreError::Cancelled { reason: "operator abort".into() }.in_stage("extract");
        assert!(err.is_cancellation());
        assert!(err.to_string().contains("extract"));

        let err = CoreError::Remote(RemoteError::new("uniprot", RemoteErrorKind::Timeout, 3))
            .in_stage("extract");
        assert!(!err.is_cancellation());
    }

    #[test]
    fn retry_after_surfaces_from_status() {
        let kind = RemoteErrorKind::Status {
            code: 429,
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(kind.retry_after(), Some(Duration::from_secs(7)));
        assert_eq!(RemoteErrorKind::Timeout.retry_after(), None);
    }
}
