//! # Provenant
//!
//! A resilient multi-source data-acquisition core: pull structured records
//! from independent remote registries, validate them against a declared
//! schema, and publish byte-for-byte reproducible artifacts with integrity
//! hashes and lineage metadata.
//!
//! The crate provides the orchestration surface every pipeline reuses:
//!
//! - **Stage orchestration**: a fixed extract, transform, validate, write,
//!   cleanup lifecycle with per-stage timing and guaranteed cleanup
//! - **Resilient remote calls**: token-bucket rate limiting, classified
//!   retries with backoff, circuit breaking, TTL caching and adaptive
//!   batch splitting
//! - **Deterministic artifacts**: stable sorting, canonical value
//!   rendering, dual hashing and atomic publication
//! - **Schema validation**: strict column ordering, type coercion and
//!   fail-fast or fail-open policies
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use provenant::prelude::*;
//!
//! let orchestrator = Orchestrator::new(config, registry)
//!     .with_event_sink(sink);
//! let result = orchestrator.run(&extractor, &transformer, cancel).await?;
//! println!("published {} rows", result.artifacts.row_count);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod batch;
pub mod cancellation;
pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod schema;
pub mod writer;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::batch::{ColumnType, Record, RecordBatch, Value};
    pub use crate::cancellation::{CancellationToken, CleanupRegistry};
    pub use crate::client::{
        BatchOutcome, ClientSettings, PageStrategy, RemoteClient, Transport,
    };
    pub use crate::config::{
        CoreConfig, FailOpenOutput, HashAlgorithm, NullOrder, ValidationMode, WriterConfig,
    };
    pub use crate::context::RunContext;
    pub use crate::errors::{CoreError, RemoteError, RemoteErrorKind, Result};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{Extract, Orchestrator, PipelineRun, RunResult, RunStatus, Transform};
    pub use crate::schema::{ColumnSpec, Schema, SchemaRegistry, SemVer, ValidationIssue};
    pub use crate::writer::{ArtifactWriter, Destination, RunLineage, WriteResult};
}
