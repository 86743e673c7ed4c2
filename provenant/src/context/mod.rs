//! Run-scoped context threaded through every sub-component call.
//!
//! Correlation fields (run id, pipeline, current stage) travel on an explicit
//! context object rather than ambient thread-local state, so the core stays
//! safely concurrent and independent runs never bleed into each other.

use crate::cancellation::{CancellationToken, CleanupRegistry};
use crate::errors::Result;
use crate::events::EventSink;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

/// Context bound at orchestrator entry and passed to every stage, remote
/// call and writer invocation of one run.
pub struct RunContext {
    run_id: Uuid,
    pipeline: String,
    config_fingerprint: String,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
    stage: RwLock<String>,
    cleanup: CleanupRegistry,
}

impl RunContext {
    /// Creates a context for a new run with a generated run identifier.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        config_fingerprint: impl Into<String>,
        sink: Arc<dyn EventSink>,
        cancel: Arc<CancellationToken>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline: pipeline.into(),
            config_fingerprint: config_fingerprint.into(),
            sink,
            cancel,
            stage: RwLock::new("init".to_string()),
            cleanup: CleanupRegistry::new(),
        }
    }

    /// The unique identifier of this run.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// The pipeline name.
    #[must_use]
    pub fn pipeline(&self) -> &str {
        &self.pipeline
    }

    /// The fingerprint of the resolved configuration this run executes under.
    #[must_use]
    pub fn config_fingerprint(&self) -> &str {
        &self.config_fingerprint
    }

    /// The stage currently executing, for correlation.
    #[must_use]
    pub fn current_stage(&self) -> String {
        self.stage.read().clone()
    }

    /// Records the stage now executing. Called by the orchestrator only.
    pub fn set_stage(&self, stage: &str) {
        *self.stage.write() = stage.to_string();
    }

    /// The run's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns a `Cancelled` error if cancellation has been requested.
    pub fn ensure_active(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(self.cancel.as_error())
        } else {
            Ok(())
        }
    }

    /// Registers a resource disposal callback to run during cleanup.
    pub fn register_cleanup<F>(&self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cleanup.register(name, callback);
    }

    /// The cleanup registry, drained by the orchestrator's cleanup stage.
    #[must_use]
    pub fn cleanup(&self) -> &CleanupRegistry {
        &self.cleanup
    }

    /// Emits an event with run correlation fields attached, without blocking.
    pub fn try_emit(&self, event_type: &str, data: serde_json::Value) {
        self.sink.try_emit(event_type, Some(self.correlate(data)));
    }

    /// Emits an event with run correlation fields attached.
    pub async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.sink.emit(event_type, Some(self.correlate(data))).await;
    }

    fn correlate(&self, data: serde_json::Value) -> serde_json::Value {
        let mut map = match data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("detail".to_string(), other);
                map
            }
        };
        map.insert(
            "run_id".to_string(),
            serde_json::json!(self.run_id.to_string()),
        );
        map.insert("pipeline".to_string(), serde_json::json!(self.pipeline));
        map.insert("stage".to_string(), serde_json::json!(self.current_stage()));
        serde_json::Value::Object(map)
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("run_id", &self.run_id)
            .field("pipeline", &self.pipeline)
            .field("stage", &self.current_stage())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
