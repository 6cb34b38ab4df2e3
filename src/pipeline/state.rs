//! Pipeline run states

use serde::{Deserialize, Serialize};

use crate::stages::StageId;

/// Where a pipeline run currently is.
///
/// `Failed` and `Cancelled` are absorbing and reachable from every
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Staged,
    Detected,
    Aligned,
    Decharged,
    DechargeSkipped,
    IdMapped,
    Linked,
    Requantified,
    Exported,
    Assembled,
    Complete,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// State reached when `stage` completes, if the stage closes a phase
    pub fn after(stage: StageId) -> Option<Self> {
        match stage {
            StageId::Stage => Some(Self::Staged),
            StageId::Detect => Some(Self::Detected),
            StageId::AlignRuns => Some(Self::Aligned),
            StageId::Decharge => Some(Self::Decharged),
            StageId::MapIds => Some(Self::IdMapped),
            StageId::Link => Some(Self::Linked),
            StageId::RequantLink | StageId::TargetedExtract => Some(Self::Requantified),
            StageId::ExportSirius | StageId::ExportGnps => Some(Self::Exported),
            StageId::AssembleTables | StageId::TargetedTables => Some(Self::Assembled),
            _ => None,
        }
    }

    /// State reached when `stage` is skipped
    pub fn after_skip(stage: StageId) -> Option<Self> {
        match stage {
            StageId::Decharge => Some(Self::DechargeSkipped),
            _ => None,
        }
    }

    /// Move to `next`; terminal states never change
    pub fn advance(self, next: Self) -> Self {
        if self.is_terminal() { self } else { next }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Staged => "staged",
            Self::Detected => "detected",
            Self::Aligned => "aligned",
            Self::Decharged => "decharged",
            Self::DechargeSkipped => "decharge_skipped",
            Self::IdMapped => "id_mapped",
            Self::Linked => "linked",
            Self::Requantified => "requantified",
            Self::Exported => "exported",
            Self::Assembled => "assembled",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
