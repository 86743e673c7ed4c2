//! Run state and results.

use crate::schema::ValidationIssue;
use crate::writer::{StageTiming, WriteResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed stages of one run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    /// Caller-supplied extraction.
    Extract,
    /// Caller-supplied transformation.
    Transform,
    /// Schema validation gate.
    Validate,
    /// Deterministic artifact write.
    Write,
    /// Registered-resource disposal; always runs.
    Cleanup,
}

impl StageName {
    /// Lowercase stage name used in events and timings.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extract => "extract",
            Self::Transform => "transform",
            Self::Validate => "validate",
            Self::Write => "write",
            Self::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Stages are still executing.
    Running,
    /// All stages completed and artifacts were published.
    Succeeded,
    /// A stage failed; no artifacts were published by this run.
    Failed,
}

/// Identity and accounting for one execution.
///
/// Created at orchestrator entry and mutated only by the orchestrator;
/// immutable once the status leaves `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique identifier of this run.
    pub run_id: Uuid,
    /// Pipeline name.
    pub pipeline_name: String,
    /// Fingerprint of the resolved configuration.
    pub config_fingerprint: String,
    stage_durations: Vec<(String, u64)>,
    status: RunStatus,
}

impl PipelineRun {
    /// Creates a running record.
    #[must_use]
    pub fn new(
        run_id: Uuid,
        pipeline_name: impl Into<String>,
        config_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            run_id,
            pipeline_name: pipeline_name.into(),
            config_fingerprint: config_fingerprint.into(),
            stage_durations: Vec::new(),
            status: RunStatus::Running,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Completed stage durations in execution order.
    #[must_use]
    pub fn stage_durations(&self) -> &[(String, u64)] {
        &self.stage_durations
    }

    /// Stage durations as metadata timings.
    #[must_use]
    pub fn stage_timings(&self) -> Vec<StageTiming> {
        self.stage_durations
            .iter()
            .map(|(stage, duration_ms)| StageTiming {
                stage: stage.clone(),
                duration_ms: *duration_ms,
            })
            .collect()
    }

    /// Records a completed (or failed) stage's elapsed time.
    pub(crate) fn record_stage(&mut self, stage: &str, duration_ms: u64) {
        if self.status == RunStatus::Running {
            self.stage_durations.push((stage.to_string(), duration_ms));
        }
    }

    /// Seals the run. Further mutation is ignored.
    pub(crate) fn finish(&mut self, status: RunStatus) {
        if self.status == RunStatus::Running {
            self.status = status;
        }
    }
}

/// Everything a successful run hands back to the caller.
#[derive(Debug)]
pub struct RunResult {
    /// The sealed run record.
    pub run: PipelineRun,
    /// Published artifacts.
    pub artifacts: WriteResult,
    /// Validation issues surfaced by the gate (fail-open warnings included).
    pub issues: Vec<ValidationIssue>,
}
