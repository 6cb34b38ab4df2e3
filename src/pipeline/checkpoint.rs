//! Run record of a pipeline execution
//!
//! The checkpoint is rewritten after every stage transition, so a crashed
//! or cancelled run leaves a record of what finished and where it stopped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};
use super::state::PipelineState;
use crate::stages::StageId;

/// Pipeline checkpoint state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique pipeline run ID
    pub run_id: String,
    /// Pipeline name
    pub name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: PipelineStatus,
    /// Last phase reached
    pub state: PipelineState,
    /// Completed stages, in execution order
    pub completed_stages: Vec<StageId>,
    /// Current stage (if running)
    pub current_stage: Option<StageId>,
    /// Stage that failed or was interrupted
    pub failed_stage: Option<StageId>,
    /// Stage outputs keyed by stage name
    pub stage_outputs: HashMap<String, StageOutput>,
    /// Error message if failed
    pub error: Option<String>,
    /// Configuration hash
    pub config_hash: String,
}

impl Checkpoint {
    /// Create a new checkpoint for a pipeline run
    pub fn new(run_id: impl Into<String>, config_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            name: None,
            started_at: now,
            updated_at: now,
            status: PipelineStatus::Running,
            state: PipelineState::Idle,
            completed_stages: Vec::new(),
            current_stage: None,
            failed_stage: None,
            stage_outputs: HashMap::new(),
            error: None,
            config_hash: config_hash.into(),
        }
    }

    /// Set pipeline name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark a stage as started
    pub fn start_stage(&mut self, stage: StageId) {
        self.current_stage = Some(stage);
        self.updated_at = Utc::now();
    }

    /// Mark a stage as completed
    pub fn complete_stage(&mut self, stage: StageId, output: StageOutput) {
        self.completed_stages.push(stage);
        self.stage_outputs.insert(stage.name().to_string(), output);
        if let Some(next) = PipelineState::after(stage) {
            self.state = self.state.advance(next);
        }
        self.current_stage = None;
        self.updated_at = Utc::now();
    }

    /// Mark a stage as skipped
    pub fn skip_stage(&mut self, stage: StageId, reason: impl Into<String>) {
        self.stage_outputs
            .insert(stage.name().to_string(), StageOutput::skipped(reason));
        if let Some(next) = PipelineState::after_skip(stage) {
            self.state = self.state.advance(next);
        }
        self.current_stage = None;
        self.updated_at = Utc::now();
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = PipelineStatus::Completed;
        self.state = self.state.advance(PipelineState::Complete);
        self.current_stage = None;
        self.updated_at = Utc::now();
    }

    /// Mark pipeline as failed
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = PipelineStatus::Failed;
        self.state = self.state.advance(PipelineState::Failed);
        self.failed_stage = self.current_stage.take();
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Mark pipeline as cancelled
    pub fn cancel(&mut self) {
        self.status = PipelineStatus::Cancelled;
        self.state = self.state.advance(PipelineState::Cancelled);
        self.failed_stage = self.current_stage.take();
        self.updated_at = Utc::now();
    }

    /// Check if a stage has been completed
    pub fn is_stage_completed(&self, stage: StageId) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Get output from a completed or skipped stage
    pub fn get_stage_output(&self, stage: StageId) -> Option<&StageOutput> {
        self.stage_outputs.get(stage.name())
    }

    /// Names of skipped stages with their reasons
    pub fn skipped_stages(&self) -> Vec<(String, String)> {
        let mut skipped: Vec<_> = self
            .stage_outputs
            .iter()
            .filter(|(_, output)| output.skipped)
            .map(|(name, output)| {
                (name.clone(), output.skip_reason.clone().unwrap_or_default())
            })
            .collect();
        skipped.sort();
        skipped
    }

    /// Calculate duration so far
    pub fn duration(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }

    /// Save checkpoint to file
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load checkpoint from file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json)
            .map_err(|e| PipelineError::CheckpointError(format!("{}: {}", path.display(), e)))
    }
}

/// Pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Output from a pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutput {
    pub success: bool,
    pub skipped: bool,
    pub skip_reason: Option<String>,
    /// Files written by the stage
    pub files: Vec<PathBuf>,
    /// Stage-specific metadata, e.g. feature counts
    pub metadata: HashMap<String, serde_json::Value>,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl StageOutput {
    /// Create a successful stage output
    pub fn success() -> Self {
        Self {
            success: true,
            skipped: false,
            skip_reason: None,
            files: Vec::new(),
            metadata: HashMap::new(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// Create a skipped stage output
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: true,
            skip_reason: Some(reason.into()),
            ..Self::success()
        }
    }

    /// Add multiple output files
    pub fn with_files(mut self, paths: Vec<PathBuf>) -> Self {
        self.files.extend(paths);
        self
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Set duration
    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }
}
