//! Error types for pipeline operations
//!
//! Errors chain to their stage-level cause for debugging and provide
//! user-friendly messages for CLI output.

use std::path::PathBuf;

use thiserror::Error;

use crate::stages::{StageExecutionError, StageId};
use crate::storage::StorageError;

/// Errors that can occur during a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or invalid parameter, detected before any stage runs
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A stage failed; fatal for the run
    #[error(transparent)]
    Stage(#[from] StageExecutionError),

    /// Working tree could not be reset or written
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Cooperative cancellation observed
    #[error("Pipeline cancelled{}", .stage.map(|s| format!(" during stage '{s}'")).unwrap_or_default())]
    Cancelled { stage: Option<StageId> },

    /// Worker pool could not be created
    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    /// Checkpoint error
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML configuration error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML configuration error
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigError(message.into())
    }

    /// Get the stage name if this error belongs to a stage
    pub fn stage_name(&self) -> Option<&'static str> {
        match self {
            PipelineError::Stage(e) => Some(e.stage.name()),
            PipelineError::Cancelled { stage } => stage.map(|s| s.name()),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, PipelineError::Cancelled { .. })
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfigError(msg) => {
                format!(
                    "Configuration error: {msg}\n\nHint: Check your pipeline configuration file or run `umetaflow validate`."
                )
            }
            PipelineError::Stage(e) => format!(
                "{}\n\nPartial results are kept; the run is not marked complete.",
                e.user_message()
            ),
            PipelineError::Storage(e) => e.user_message(),
            PipelineError::FileNotFound(path) => {
                format!(
                    "File not found: {}\n\nHint: Check that the file exists and the path is correct.",
                    path.display()
                )
            }
            PipelineError::CheckpointError(msg) => {
                format!(
                    "Checkpoint error: {msg}\n\nHint: The results directory may belong to an older version; run the pipeline again."
                )
            }
            PipelineError::YamlError(_) | PipelineError::TomlError(_) => {
                format!("{self}\n\nHint: Compare your file with the output of `umetaflow init-config`.")
            }
            PipelineError::Cancelled { .. } => format!("{self}."),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::StageFailure;

    #[test]
    fn test_error_display() {
        let err = PipelineError::config("No runs selected");
        assert!(err.to_string().contains("No runs selected"));
        assert!(err.stage_name().is_none());
    }

    #[test]
    fn test_stage_name() {
        let err: PipelineError = StageExecutionError::new(
            StageId::Link,
            StageFailure::MissingKeys(vec!["mz_unit".to_string()]),
        )
        .into();
        assert_eq!(err.stage_name(), Some("link"));
        assert!(err.to_string().contains("'link'"));

        let err = PipelineError::Cancelled {
            stage: Some(StageId::Detect),
        };
        assert_eq!(err.stage_name(), Some("detect"));
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_user_message() {
        let err = PipelineError::config("charge_min (3) is greater than charge_max (1)");
        let msg = err.user_message();
        assert!(msg.contains("charge_min"));
        assert!(msg.contains("Hint:"));

        let err = PipelineError::FileNotFound(PathBuf::from("/data/config.yaml"));
        let msg = err.user_message();
        assert!(msg.contains("/data/config.yaml"));
        assert!(msg.contains("Hint:"));
    }
}
