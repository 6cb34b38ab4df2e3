//! UmetaFlow - LC-MS metabolomics pipeline orchestration on top of OpenMS
//!
//! Provides:
//! - Pipeline configuration, stage planning and execution with a run record
//! - Typed artifacts in a per-run results tree
//! - OpenMS command line tool backend (pluggable for tests)
//! - featureXML / consensusXML reading and writing
//! - Consensus splitting, merging and target library generation
//! - Feature matrices, targeted quantification tables and MS1 annotation

pub mod cancel;
pub mod consensus;
pub mod formats;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod stages;
pub mod storage;
pub mod tables;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use pipeline::{
    Checkpoint, PipelineError, PipelineExecutor, PipelineReport, PipelineResult,
    PipelineRunConfig, PipelineState, PipelineStatus, Workflow, run_pipeline,
};
pub use stages::{ProcessingBackend, StageId, ToolsConfig, ToppBackend};
pub use storage::{ArtifactKind, ArtifactRef, ArtifactStore, RunId, StorageError};

// Re-export document model
pub use model::{ConsensusFeature, ConsensusMap, Feature, FeatureMap};
