//! Metabolomics pipeline orchestration
//!
//! This module turns a [`PipelineRunConfig`] into a stage plan and runs it:
//! - Staging of the selected mzML runs into a fresh results tree
//! - Feature detection, map alignment and run alignment
//! - Adduct grouping and MS2 mapping (optional decharging)
//! - Feature linking into a consensus map
//! - Re-quantification of features with missing values (optional)
//! - SIRIUS and GNPS exports (optional)
//! - Feature matrix, sample metadata and MS1 annotation tables
//!
//! The targeted workflow extracts library compounds from every run and
//! writes per-run and summary quantification tables instead.
//!
//! # Example
//!
//! ```rust,ignore
//! use umetaflow::pipeline::{PipelineExecutor, PipelineRunConfig, discover_runs};
//!
//! let config = PipelineRunConfig::new()
//!     .with_runs(discover_runs("/data/mzML".as_ref(), "*.mzML")?)
//!     .with_results_dir("/data/results")
//!     .with_requantification(true);
//!
//! let mut executor = PipelineExecutor::new(config);
//! let report = executor.run()?;
//!
//! println!("Pipeline completed in {}", report.duration_formatted());
//! ```
//!
//! # Run record
//!
//! `pipeline.checkpoint.json` in the results directory is rewritten after
//! every stage. It holds the reached [`PipelineState`], completed and
//! skipped stages with their outputs, and the failing stage if any.

mod checkpoint;
mod config;
mod error;
mod executor;
mod plan;
mod state;

pub use checkpoint::{Checkpoint, PipelineStatus, StageOutput};
pub use config::{
    AdductConfig, AlignmentConfig, AnnotationConfig, DetectionConfig, ExportConfig,
    LinkingConfig, NEGATIVE_ADDUCTS, POSITIVE_ADDUCTS, PipelineRunConfig, RequantConfig,
    TargetedConfig, Workflow, discover_runs, validate_adduct,
};
pub use error::{PipelineError, PipelineResult};
pub use executor::{PipelineExecutor, PipelineReport};
pub use plan::{StageNode, StagePlan};
pub use state::PipelineState;

/// Run a pipeline with the given configuration
///
/// This is a convenience function running the OpenMS backend.
pub fn run_pipeline(config: PipelineRunConfig) -> PipelineResult<PipelineReport> {
    let mut executor = PipelineExecutor::new(config);
    executor.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_pipeline_rejects_empty_selection() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = PipelineRunConfig::new().with_results_dir(temp.path().join("results"));

        let err = run_pipeline(config).unwrap_err();
        assert!(err.to_string().contains("No runs selected"));
        assert!(!temp.path().join("results").exists());
    }
}
