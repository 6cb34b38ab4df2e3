//! Error types for stage execution

use std::path::PathBuf;

use thiserror::Error;

use super::StageId;
use crate::formats::FormatError;
use crate::storage::{RunId, StorageError};

/// Errors reported by a processing backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Tool executable could not be started
    #[error("Cannot start {tool}: {source}")]
    ToolNotFound {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// Tool ran and reported failure
    #[error("{tool} exited with {}: {stderr}", .exit_code.map(|c| format!("code {c}")).unwrap_or_else(|| "a signal".to_string()))]
    ToolFailed {
        tool: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// Tool exceeded the configured timeout and was killed
    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    /// Parameter present but unusable
    #[error("Invalid parameter '{key}': {message}")]
    InvalidParam { key: String, message: String },

    /// Expected output not written by the tool
    #[error("Expected output not found: {0}")]
    MissingOutput(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

impl BackendError {
    pub fn invalid_param(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Why a stage failed
#[derive(Error, Debug)]
pub enum StageFailure {
    #[error("expects {min}..={max} input artifact(s), got {actual}")]
    Arity {
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("missing required parameter(s): {}", .0.join(", "))]
    MissingKeys(Vec<String>),

    #[error("expected {expected} output artifact(s), got {actual}")]
    Outputs { expected: String, actual: usize },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("worker pool error: {0}")]
    WorkerPool(String),

    #[error("cancelled")]
    Cancelled,
}

/// A stage could not complete; fatal for the pipeline run
#[derive(Error, Debug)]
#[error("Stage '{stage}' failed{}: {cause}", .run.as_ref().map(|r| format!(" for run '{r}'")).unwrap_or_default())]
pub struct StageExecutionError {
    pub stage: StageId,
    /// Run being processed when the failure happened, for per-run stages
    pub run: Option<RunId>,
    #[source]
    pub cause: StageFailure,
}

impl StageExecutionError {
    pub fn new(stage: StageId, cause: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            run: None,
            cause: cause.into(),
        }
    }

    pub fn for_run(stage: StageId, run: RunId, cause: impl Into<StageFailure>) -> Self {
        Self {
            stage,
            run: Some(run),
            cause: cause.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, StageFailure::Cancelled)
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        let hint = match &self.cause {
            StageFailure::Backend(BackendError::ToolNotFound { .. }) => {
                "Hint: Make sure the OpenMS tools are installed and on PATH, or set tools.bin_dir."
            }
            StageFailure::Backend(BackendError::Timeout { .. }) => {
                "Hint: Increase tools.timeout_secs or remove it."
            }
            StageFailure::Backend(BackendError::InvalidParam { .. })
            | StageFailure::MissingKeys(_) => "Hint: Check the stage parameters in your configuration file.",
            StageFailure::Format(_) => {
                "Hint: An intermediate file is malformed; check the tool output of the previous stage."
            }
            _ => "",
        };
        if hint.is_empty() {
            self.to_string()
        } else {
            format!("{}\n\n{}", self, hint)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_error_names_stage_and_run() {
        let err = StageExecutionError::for_run(
            StageId::Detect,
            RunId::new("Sample_A"),
            BackendError::ToolFailed {
                tool: "FeatureFinderMetabo".to_string(),
                exit_code: Some(6),
                stderr: "unexpected end of file".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("'detect'"));
        assert!(msg.contains("Sample_A"));
        assert!(msg.contains("code 6"));
        assert!(msg.contains("unexpected end of file"));
    }

    #[test]
    fn test_user_message_hint() {
        let err = StageExecutionError::new(
            StageId::Link,
            StageFailure::MissingKeys(vec!["link:rt_tol".to_string()]),
        );
        let msg = err.user_message();
        assert!(msg.contains("link:rt_tol"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_cancelled() {
        let err = StageExecutionError::new(StageId::Detect, StageFailure::Cancelled);
        assert!(err.is_cancelled());
    }
}
