//! Stage execution
//!
//! Provides:
//! - stage identities and the contract each kind declares
//! - typed stage parameters
//! - the processing backend trait and its OpenMS implementation
//! - the runner executing one stage invocation

mod backend;
mod error;
mod kind;
mod params;
mod runner;
mod topp;

pub use backend::ProcessingBackend;
pub use error::{BackendError, BackendResult, StageExecutionError, StageFailure};
pub use kind::{StageId, StageKind, StageSpec};
pub use params::{ParamValue, StageConfig};
pub use runner::{
    LIBRARY_KEY, MS1_BOUNDARY_KEY, MS1_LIBRARY_KEY, MS1_MZ_WINDOW_KEY, MS1_RT_WINDOW_KEY,
    SOURCES_KEY, StageInvocation, StageOutcome, StageRunner, TIME_UNIT_KEY,
};
pub use topp::{ToolsConfig, ToppBackend};
