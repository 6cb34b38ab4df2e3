//! CLI error type

use std::path::PathBuf;

use thiserror::Error;
use umetaflow::PipelineError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to write {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl CliError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CliError::Pipeline(e) => e.user_message(),
            CliError::InvalidArgument(_) => {
                format!("{self}\n\nHint: Run `umetaflow --help` for usage.")
            }
            CliError::FileWriteError(..) => self.to_string(),
        }
    }
}
