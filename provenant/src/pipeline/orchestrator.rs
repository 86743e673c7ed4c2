//! The stage orchestrator.
//!
//! One run executes the fixed stage sequence extract, transform, validate,
//! write, cleanup. Stages never overlap for a run; every stage transition is
//! timed and emitted as an event before the run proceeds, and the cleanup
//! stage runs whether the others succeeded or not.

use super::retention::prune_releases;
use super::run::{PipelineRun, RunResult, RunStatus, StageName};
use super::traits::{Extract, Transform};
use crate::batch::RecordBatch;
use crate::cancellation::CancellationToken;
use crate::config::CoreConfig;
use crate::context::RunContext;
use crate::errors::{ConfigError, CoreError, Result};
use crate::events::{EventSink, NoOpEventSink};
use crate::schema::{check_version_drift, validate, GateOutcome, Schema, SchemaRegistry};
use crate::schema::ValidationIssue;
use crate::writer::{ArtifactWriter, Destination, RunLineage, WriteResult, TIMESTAMP_FORMAT};
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Composes the validation gate and writer around caller-supplied extraction
/// and transformation, enforcing stage order and failure semantics.
pub struct Orchestrator {
    config: CoreConfig,
    registry: SchemaRegistry,
    sink: Arc<dyn EventSink>,
}

impl Orchestrator {
    /// Creates an orchestrator over a resolved configuration and schema
    /// registry. Events are discarded until a sink is attached.
    #[must_use]
    pub fn new(config: CoreConfig, registry: SchemaRegistry) -> Self {
        Self {
            config,
            registry,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Attaches an event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// The resolved configuration this orchestrator runs under.
    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Directory the current release's artifacts are published into.
    #[must_use]
    pub fn release_dir(&self) -> PathBuf {
        self.config.destination.join(format!(
            "{}-{}",
            self.config.pipeline_name, self.config.source_version
        ))
    }

    /// Executes one run.
    ///
    /// Configuration problems, including schema major-version drift, reject
    /// the run before any stage executes. Any stage failure is fatal to the
    /// run and propagates to the caller after cleanup; cleanup trouble is
    /// logged but never masks the original failure.
    pub async fn run<E, T>(
        &self,
        extractor: &E,
        transformer: &T,
        cancel: Arc<CancellationToken>,
    ) -> Result<RunResult>
    where
        E: Extract,
        T: Transform<Input = E::Output>,
    {
        let schema = self
            .registry
            .get(&self.config.schema.schema_id)
            .ok_or_else(|| {
                CoreError::Config(ConfigError::UnknownSchema {
                    schema_id: self.config.schema.schema_id.clone(),
                })
            })?;
        if let Some(last_known) = &self.config.schema.last_known_version {
            check_version_drift(schema, last_known)?;
        }

        let fingerprint = self.config.fingerprint();
        let ctx = RunContext::new(
            &self.config.pipeline_name,
            &fingerprint,
            self.sink.clone(),
            cancel,
        );
        let mut run = PipelineRun::new(ctx.run_id(), &self.config.pipeline_name, &fingerprint);
        info!(
            run_id = %ctx.run_id(),
            pipeline = %self.config.pipeline_name,
            source_version = %self.config.source_version,
            "pipeline run started"
        );

        let release_dir = self.release_dir();
        let outcome = self
            .execute(&ctx, &mut run, schema, &release_dir, extractor, transformer)
            .await;

        self.cleanup_stage(&ctx, &mut run).await;

        match outcome {
            Ok((artifacts, issues)) => {
                run.finish(RunStatus::Succeeded);
                info!(
                    run_id = %ctx.run_id(),
                    pipeline = %self.config.pipeline_name,
                    rows = artifacts.row_count,
                    "pipeline run succeeded"
                );
                self.apply_retention(&ctx, &release_dir);
                Ok(RunResult {
                    run,
                    artifacts,
                    issues,
                })
            }
            Err(err) => {
                run.finish(RunStatus::Failed);
                error!(
                    run_id = %ctx.run_id(),
                    pipeline = %self.config.pipeline_name,
                    stage = %ctx.current_stage(),
                    error = %err,
                    "pipeline run failed"
                );
                Err(err)
            }
        }
    }

    async fn execute<E, T>(
        &self,
        ctx: &RunContext,
        run: &mut PipelineRun,
        schema: &Schema,
        release_dir: &Path,
        extractor: &E,
        transformer: &T,
    ) -> Result<(WriteResult, Vec<ValidationIssue>)>
    where
        E: Extract,
        T: Transform<Input = E::Output>,
    {
        let payload = self
            .timed(ctx, run, StageName::Extract, extractor.extract(ctx), |_| {
                None
            })
            .await?;

        let batch = self
            .timed(
                ctx,
                run,
                StageName::Transform,
                transformer.transform(ctx, payload),
                |b: &RecordBatch| Some(b.len()),
            )
            .await?;

        let mode = self.config.validation.mode;
        let fail_open_output = self.config.validation.fail_open_output;
        let gate = self
            .timed(
                ctx,
                run,
                StageName::Validate,
                async { validate(&batch, schema, mode, fail_open_output) },
                |g: &GateOutcome| Some(g.batch.len()),
            )
            .await?;

        let destination = Destination::in_dir(release_dir, &self.config.pipeline_name);
        let lineage = RunLineage {
            run_id: ctx.run_id().to_string(),
            pipeline: self.config.pipeline_name.clone(),
            config_fingerprint: ctx.config_fingerprint().to_string(),
            source_version: self.config.source_version.clone(),
            schema_valid: gate.schema_valid,
            stage_durations: run.stage_timings(),
            generated_at: Utc::now().format(TIMESTAMP_FORMAT).to_string(),
        };
        let GateOutcome { batch: validated, issues, .. } = gate;

        let writer = ArtifactWriter::new(self.config.writer.clone());
        let artifacts = self
            .timed(
                ctx,
                run,
                StageName::Write,
                async { writer.write(&validated, &destination, &lineage) },
                |w: &WriteResult| Some(w.row_count),
            )
            .await?;

        Ok((artifacts, issues))
    }

    /// Runs one stage: binds the correlation field, emits the transition
    /// events, records the elapsed time even on failure, and wraps errors
    /// with the stage name.
    async fn timed<T, R>(
        &self,
        ctx: &RunContext,
        run: &mut PipelineRun,
        stage: StageName,
        fut: impl Future<Output = Result<T>>,
        rows_of: R,
    ) -> Result<T>
    where
        R: Fn(&T) -> Option<usize>,
    {
        ctx.set_stage(stage.as_str());
        ctx.try_emit(&format!("{stage}_started"), serde_json::json!({}));
        let start = Instant::now();

        let result = match ctx.ensure_active() {
            Ok(()) => fut.await,
            Err(err) => Err(err),
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        run.record_stage(stage.as_str(), duration_ms);

        match &result {
            Ok(value) => ctx.try_emit(
                &format!("{stage}_completed"),
                serde_json::json!({
                    "duration_ms": duration_ms,
                    "row_count": rows_of(value),
                }),
            ),
            Err(err) => ctx.try_emit(
                &format!("{stage}_failed"),
                serde_json::json!({
                    "duration_ms": duration_ms,
                    "error": err.to_string(),
                }),
            ),
        }

        result.map_err(|err| err.in_stage(stage.as_str()))
    }

    async fn cleanup_stage(&self, ctx: &RunContext, run: &mut PipelineRun) {
        let stage = StageName::Cleanup;
        ctx.set_stage(stage.as_str());
        ctx.try_emit(&format!("{stage}_started"), serde_json::json!({}));
        let start = Instant::now();

        let failures = ctx.cleanup().run_all(self.config.cleanup_timeout_secs).await;

        let duration_ms = start.elapsed().as_millis() as u64;
        run.record_stage(stage.as_str(), duration_ms);

        if failures.is_empty() {
            ctx.try_emit(
                &format!("{stage}_completed"),
                serde_json::json!({ "duration_ms": duration_ms }),
            );
        } else {
            warn!(
                run_id = %ctx.run_id(),
                failures = failures.len(),
                "cleanup finished with failures"
            );
            ctx.try_emit(
                &format!("{stage}_failed"),
                serde_json::json!({
                    "duration_ms": duration_ms,
                    "failures": failures.len(),
                }),
            );
        }
    }

    fn apply_retention(&self, ctx: &RunContext, release_dir: &Path) {
        let Some(retention) = &self.config.retention else {
            return;
        };
        match prune_releases(
            &self.config.destination,
            &self.config.pipeline_name,
            release_dir,
            retention,
        ) {
            Ok(removed) if !removed.is_empty() => {
                ctx.try_emit(
                    "retention_pruned",
                    serde_json::json!({ "removed": removed.len() }),
                );
            }
            Ok(_) => {}
            Err(err) => {
                warn!(
                    run_id = %ctx.run_id(),
                    error = %err,
                    "retention pruning failed"
                );
            }
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("pipeline", &self.config.pipeline_name)
            .finish()
    }
}
