//! Caller-supplied stage contracts.
//!
//! The orchestrator is generic over the extractor's intermediate payload
//! type until the validation gate, where data is constrained to the
//! canonical batch type.

use crate::batch::RecordBatch;
use crate::context::RunContext;
use crate::errors::Result;
use async_trait::async_trait;

/// Pulls raw data from remote registries.
///
/// Implementations typically drive a shared [`crate::client::RemoteClient`]
/// from a bounded worker pool and may register connection disposal through
/// [`RunContext::register_cleanup`]. The output is opaque to the core.
#[async_trait]
pub trait Extract: Send + Sync {
    /// The pipeline-specific intermediate payload.
    type Output: Send;

    /// Runs the extraction.
    async fn extract(&self, ctx: &RunContext) -> Result<Self::Output>;
}

/// Turns the extractor's payload into a canonical record batch.
#[async_trait]
pub trait Transform: Send + Sync {
    /// The intermediate payload this transformer accepts.
    type Input: Send;

    /// Runs the transformation.
    async fn transform(&self, ctx: &RunContext, input: Self::Input) -> Result<RecordBatch>;
}
