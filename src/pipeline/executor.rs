//! Pipeline executor running a stage plan end to end

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use super::checkpoint::{Checkpoint, PipelineStatus, StageOutput};
use super::config::PipelineRunConfig;
use super::error::{PipelineError, PipelineResult};
use super::plan::{StageNode, StagePlan};
use super::state::PipelineState;
use crate::cancel::CancellationToken;
use crate::progress::format_duration_ms;
use crate::stages::{ProcessingBackend, StageId, StageRunner, ToppBackend};
use crate::storage::{ArtifactStore, RunId};

/// Pipeline executor that runs all stages of one configuration
pub struct PipelineExecutor {
    config: PipelineRunConfig,
    store: ArtifactStore,
    backend: Box<dyn ProcessingBackend>,
    cancel: CancellationToken,
    checkpoint: Option<Checkpoint>,
}

impl PipelineExecutor {
    /// Create an executor driving the OpenMS command line tools
    pub fn new(config: PipelineRunConfig) -> Self {
        let backend = ToppBackend::new(config.tools.clone());
        Self::with_backend(config, Box::new(backend))
    }

    /// Create an executor with a custom processing backend
    pub fn with_backend(config: PipelineRunConfig, backend: Box<dyn ProcessingBackend>) -> Self {
        let store = ArtifactStore::new(&config.results_dir);
        Self {
            config,
            store,
            backend,
            cancel: CancellationToken::new(),
            checkpoint: None,
        }
    }

    /// Share an externally owned cancellation token
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that cancels this executor's run
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Record of the last run, once one has started
    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.checkpoint.as_ref()
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Load the run record from a results directory
    pub fn status(results_dir: &Path) -> PipelineResult<Checkpoint> {
        Checkpoint::load(&ArtifactStore::checkpoint_path_for(results_dir))
    }

    /// Run the pipeline.
    ///
    /// Configuration problems are reported before the results directory is
    /// touched. Afterwards the directory is reset and stages run in plan
    /// order; the first failing stage ends the run.
    pub fn run(&mut self) -> PipelineResult<PipelineReport> {
        self.config.validate().map_err(PipelineError::ConfigError)?;
        let runs: Vec<RunId> = self
            .config
            .selected_runs()
            .map_err(PipelineError::ConfigError)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        let plan = StagePlan::build(&self.config, &self.store)?;
        plan.validate()?;
        let order = plan.order()?;

        let run_id = Uuid::new_v4().to_string();
        let mut checkpoint = Checkpoint::new(&run_id, Self::hash_config(&self.config)?);
        if let Some(name) = &self.config.name {
            checkpoint = checkpoint.with_name(name);
        }

        let _span = info_span!(
            "pipeline_run",
            run_id = %run_id,
            workflow = %self.config.workflow,
            runs = runs.len()
        )
        .entered();

        info!(
            stages = ?order.iter().filter(|n| !n.is_skipped()).map(|n| n.id().name()).collect::<Vec<_>>(),
            results = %self.store.root().display(),
            "Starting pipeline"
        );

        self.store.reset()?;
        let pool = self.build_pool()?;
        let start = Instant::now();

        let result = self.run_stages(&order, &runs, &pool, &mut checkpoint);
        let duration_ms = start.elapsed().as_millis() as u64;
        self.checkpoint = Some(checkpoint.clone());
        result?;

        info!(
            run_id = %checkpoint.run_id,
            duration_ms,
            stages_completed = checkpoint.completed_stages.len(),
            "Pipeline completed"
        );
        Ok(PipelineReport::from_checkpoint(
            &checkpoint,
            duration_ms,
            self.store.root(),
        ))
    }

    fn run_stages(
        &self,
        order: &[&StageNode],
        runs: &[RunId],
        pool: &ThreadPool,
        checkpoint: &mut Checkpoint,
    ) -> PipelineResult<()> {
        let checkpoint_path = self.store.checkpoint_path();
        checkpoint.save(&checkpoint_path)?;

        let runner = StageRunner::new(self.backend.as_ref(), &self.store, runs, pool, &self.cancel)
            .with_progress(self.config.progress);

        for node in order {
            let stage = node.id();

            if let Some(reason) = &node.skip_reason {
                debug!(stage = stage.name(), reason = %reason, "Skipping stage");
                if self.config.verbose {
                    eprintln!("Skipping stage {}: {}", stage.name(), reason);
                }
                checkpoint.skip_stage(stage, reason);
                checkpoint.save(&checkpoint_path)?;
                continue;
            }

            checkpoint.start_stage(stage);
            if self.cancel.is_cancelled() {
                return self.cancelled(stage, checkpoint, &checkpoint_path);
            }
            checkpoint.save(&checkpoint_path)?;

            let _stage_span = info_span!("pipeline_stage", stage = stage.name()).entered();
            info!(description = stage.description(), "Starting stage");
            if self.config.verbose {
                eprintln!("Running stage {}...", stage.name());
            }

            let started = Instant::now();
            match runner.execute(&node.invocation) {
                Ok(outcome) => {
                    let duration_ms = started.elapsed().as_millis() as u64;
                    let output = outcome.metadata.into_iter().fold(
                        StageOutput::success()
                            .with_files(outcome.files)
                            .with_duration(duration_ms),
                        |output, (key, value)| output.with_metadata(key, value),
                    );
                    info!(stage = stage.name(), duration_ms, "Stage completed");
                    checkpoint.complete_stage(stage, output);
                    checkpoint.save(&checkpoint_path)?;
                }
                Err(e) if e.is_cancelled() => {
                    return self.cancelled(stage, checkpoint, &checkpoint_path);
                }
                Err(e) => {
                    let error_msg = e.to_string();
                    error!(stage = stage.name(), error = %error_msg, "Stage failed");
                    checkpoint.fail(&error_msg);
                    checkpoint.save(&checkpoint_path)?;
                    return Err(e.into());
                }
            }
        }

        checkpoint.complete();
        checkpoint.save(&checkpoint_path)?;
        Ok(())
    }

    fn cancelled(
        &self,
        stage: StageId,
        checkpoint: &mut Checkpoint,
        path: &Path,
    ) -> PipelineResult<()> {
        warn!(stage = stage.name(), "Pipeline cancelled");
        checkpoint.cancel();
        checkpoint.save(path)?;
        Err(PipelineError::Cancelled { stage: Some(stage) })
    }

    fn build_pool(&self) -> PipelineResult<ThreadPool> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(|idx| format!("umetaflow-worker-{idx}"));
        if let Some(threads) = self.config.threads {
            builder = builder.num_threads(threads);
        }
        builder
            .build()
            .map_err(|e| PipelineError::WorkerPool(e.to_string()))
    }

    /// Hash the config for change detection
    fn hash_config(config: &PipelineRunConfig) -> PipelineResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(config)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Report from a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub run_id: String,
    pub status: PipelineStatus,
    pub state: PipelineState,
    /// Completed stages in execution order
    pub stages_completed: Vec<StageId>,
    /// Skipped stage names with their reasons
    pub stages_skipped: Vec<(String, String)>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    pub results_dir: PathBuf,
    pub outputs: HashMap<String, StageOutput>,
}

impl PipelineReport {
    fn from_checkpoint(checkpoint: &Checkpoint, duration_ms: u64, results_dir: &Path) -> Self {
        Self {
            run_id: checkpoint.run_id.clone(),
            status: checkpoint.status,
            state: checkpoint.state,
            stages_completed: checkpoint.completed_stages.clone(),
            stages_skipped: checkpoint.skipped_stages(),
            duration_ms,
            results_dir: results_dir.to_path_buf(),
            outputs: checkpoint.stage_outputs.clone(),
        }
    }

    /// Check if pipeline was successful
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    /// Get formatted duration
    pub fn duration_formatted(&self) -> String {
        format_duration_ms(self.duration_ms)
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        eprintln!("Pipeline {} - {}", self.run_id, self.status);
        eprintln!("Duration: {}", self.duration_formatted());
        eprintln!("Results: {}", self.results_dir.display());
        eprintln!("Stages completed: {}", self.stages_completed.len());

        for stage in &self.stages_completed {
            if let Some(output) = self.outputs.get(stage.name()) {
                eprintln!(
                    "  - {}: ok ({})",
                    stage.name(),
                    format_duration_ms(output.duration_ms)
                );
            }
        }
        for (stage, reason) in &self.stages_skipped {
            eprintln!("  - {}: skipped ({})", stage, reason);
        }
    }
}
