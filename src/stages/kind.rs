//! Stage identities and the contract each stage kind declares

use serde::{Deserialize, Serialize};

use crate::storage::ArtifactKind;

/// A node of the stage plan.
///
/// Several ids share one [`StageKind`]: the re-quantification branch repeats
/// decharging, ID mapping and linking on the merged feature maps, and those
/// repeats must stay distinguishable in the checkpoint and in error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Stage,
    Detect,
    AlignMaps,
    AlignRuns,
    Decharge,
    MapIds,
    Link,
    SplitConsensus,
    FilterComplete,
    BuildTargets,
    Requantify,
    MergeMaps,
    RequantDecharge,
    RequantMapIds,
    RequantLink,
    ExportSirius,
    ExportGnps,
    AssembleTables,
    ExportMetadata,
    AnnotateMs1,
    TargetedExtract,
    TargetedTables,
}

impl StageId {
    /// Get stage name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stage => "stage",
            Self::Detect => "detect",
            Self::AlignMaps => "align-maps",
            Self::AlignRuns => "align-runs",
            Self::Decharge => "decharge",
            Self::MapIds => "map-ids",
            Self::Link => "link",
            Self::SplitConsensus => "split-consensus",
            Self::FilterComplete => "filter-complete",
            Self::BuildTargets => "build-targets",
            Self::Requantify => "requantify",
            Self::MergeMaps => "merge-maps",
            Self::RequantDecharge => "requant-decharge",
            Self::RequantMapIds => "requant-map-ids",
            Self::RequantLink => "requant-link",
            Self::ExportSirius => "export-sirius",
            Self::ExportGnps => "export-gnps",
            Self::AssembleTables => "assemble-tables",
            Self::ExportMetadata => "export-metadata",
            Self::AnnotateMs1 => "annotate-ms1",
            Self::TargetedExtract => "targeted-extract",
            Self::TargetedTables => "targeted-tables",
        }
    }

    /// Get stage description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Stage => "Copy selected runs into the working tree",
            Self::Detect => "Detect features",
            Self::AlignMaps => "Align feature maps",
            Self::AlignRuns => "Align mzML files",
            Self::Decharge => "Determine adducts",
            Self::MapIds => "Map MS2 data to features",
            Self::Link => "Link features",
            Self::SplitConsensus => "Split consensus features by missing values",
            Self::FilterComplete => "Collect features of complete consensus features",
            Self::BuildTargets => "Build target library from missing values",
            Self::Requantify => "Re-quantify features with missing values",
            Self::MergeMaps => "Merge complete and re-quantified features",
            Self::RequantDecharge => "Determine adducts of re-quantified features",
            Self::RequantMapIds => "Map MS2 data to re-quantified features",
            Self::RequantLink => "Link re-quantified features",
            Self::ExportSirius => "Export files for SIRIUS",
            Self::ExportGnps => "Export files for GNPS",
            Self::AssembleTables => "Assemble feature matrices",
            Self::ExportMetadata => "Write sample metadata table",
            Self::AnnotateMs1 => "Save features annotated on MS1 level",
            Self::TargetedExtract => "Extract library compounds",
            Self::TargetedTables => "Write targeted quantification tables",
        }
    }

    /// The operation this node runs
    pub fn kind(&self) -> StageKind {
        match self {
            Self::Stage => StageKind::CopyIn,
            Self::Detect => StageKind::Detect,
            Self::AlignMaps => StageKind::AlignMaps,
            Self::AlignRuns => StageKind::ApplyTransformations,
            Self::Decharge | Self::RequantDecharge => StageKind::Decharge,
            Self::MapIds | Self::RequantMapIds => StageKind::MapIdentifications,
            Self::Link | Self::RequantLink => StageKind::Link,
            Self::SplitConsensus => StageKind::Split,
            Self::FilterComplete => StageKind::FilterToConsensus,
            Self::BuildTargets => StageKind::BuildTargets,
            Self::Requantify | Self::TargetedExtract => StageKind::Requantify,
            Self::MergeMaps => StageKind::Merge,
            Self::ExportSirius => StageKind::ExportSirius,
            Self::ExportGnps => StageKind::ExportGnps,
            Self::AssembleTables => StageKind::AssembleTables,
            Self::ExportMetadata => StageKind::ExportMetadata,
            Self::AnnotateMs1 => StageKind::AnnotateMs1,
            Self::TargetedTables => StageKind::TargetedTables,
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STAGE_IDS
            .iter()
            .copied()
            .find(|id| id.name() == s.to_lowercase())
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

const ALL_STAGE_IDS: [StageId; 22] = [
    StageId::Stage,
    StageId::Detect,
    StageId::AlignMaps,
    StageId::AlignRuns,
    StageId::Decharge,
    StageId::MapIds,
    StageId::Link,
    StageId::SplitConsensus,
    StageId::FilterComplete,
    StageId::BuildTargets,
    StageId::Requantify,
    StageId::MergeMaps,
    StageId::RequantDecharge,
    StageId::RequantMapIds,
    StageId::RequantLink,
    StageId::ExportSirius,
    StageId::ExportGnps,
    StageId::AssembleTables,
    StageId::ExportMetadata,
    StageId::AnnotateMs1,
    StageId::TargetedExtract,
    StageId::TargetedTables,
];

/// The operation behind a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    CopyIn,
    Detect,
    AlignMaps,
    ApplyTransformations,
    Decharge,
    MapIdentifications,
    Link,
    Split,
    FilterToConsensus,
    BuildTargets,
    Requantify,
    Merge,
    ExportSirius,
    ExportGnps,
    AssembleTables,
    ExportMetadata,
    AnnotateMs1,
    TargetedTables,
}

/// Declared contract of a stage kind
#[derive(Debug, Clone, Copy)]
pub struct StageSpec {
    /// Minimum number of input artifacts
    pub min_inputs: usize,
    /// Maximum number of input artifacts
    pub max_inputs: usize,
    /// Config keys that must be present
    pub required_keys: &'static [&'static str],
    /// Artifact kinds this stage may write
    pub produces: &'static [ArtifactKind],
    /// Whether the work fans out over runs
    pub per_run: bool,
}

impl StageKind {
    /// Get the declared contract
    pub fn spec(&self) -> StageSpec {
        use ArtifactKind as A;
        match self {
            Self::CopyIn => StageSpec {
                min_inputs: 0,
                max_inputs: 0,
                required_keys: &["sources"],
                produces: &[A::RawRuns, A::TargetLibrary],
                per_run: true,
            },
            Self::Detect => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &["mass_error_ppm", "noise_threshold_int", "remove_single_traces"],
                produces: &[A::FeatureMaps],
                per_run: true,
            },
            Self::AlignMaps => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &[
                    "pairfinder:distance_MZ:max_difference",
                    "pairfinder:distance_MZ:unit",
                    "pairfinder:distance_RT:max_difference",
                ],
                produces: &[A::AlignedFeatureMaps, A::Transformations],
                per_run: false,
            },
            Self::ApplyTransformations => StageSpec {
                min_inputs: 2,
                max_inputs: 2,
                required_keys: &[],
                produces: &[A::AlignedRuns],
                per_run: true,
            },
            Self::Decharge => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &[
                    "potential_adducts",
                    "charge_min",
                    "charge_max",
                    "negative_mode",
                    "retention_max_diff",
                    "retention_max_diff_local",
                ],
                produces: &[A::DechargedMaps, A::RequantDechargedMaps],
                per_run: true,
            },
            Self::MapIdentifications => StageSpec {
                min_inputs: 2,
                max_inputs: 2,
                required_keys: &[],
                produces: &[A::IdMappedMaps, A::RequantIdMappedMaps],
                per_run: true,
            },
            Self::Link => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &["link:mz_tol", "link:rt_tol", "mz_unit"],
                produces: &[A::Consensus, A::RequantifiedConsensus],
                per_run: false,
            },
            Self::Split => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &[],
                produces: &[A::CompleteConsensus, A::MissingConsensus],
                per_run: false,
            },
            Self::FilterToConsensus => StageSpec {
                min_inputs: 2,
                max_inputs: 2,
                required_keys: &[],
                produces: &[A::CompleteFeatureMaps],
                per_run: false,
            },
            Self::BuildTargets => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &["negative_mode"],
                produces: &[A::TargetLibrary],
                per_run: false,
            },
            Self::Requantify => StageSpec {
                min_inputs: 2,
                max_inputs: 2,
                required_keys: &[
                    "detect:peak_width",
                    "extract:mz_window",
                    "extract:n_isotopes",
                    "extract:rt_window",
                ],
                produces: &[A::RequantifiedMaps],
                per_run: true,
            },
            Self::Merge => StageSpec {
                min_inputs: 2,
                max_inputs: 2,
                required_keys: &[],
                produces: &[A::MergedMaps],
                per_run: false,
            },
            Self::ExportSirius => StageSpec {
                min_inputs: 2,
                max_inputs: 2,
                required_keys: &[],
                produces: &[A::SiriusExport],
                per_run: false,
            },
            Self::ExportGnps => StageSpec {
                min_inputs: 2,
                max_inputs: 2,
                required_keys: &[],
                produces: &[A::GnpsExport],
                per_run: false,
            },
            Self::AssembleTables => StageSpec {
                min_inputs: 1,
                max_inputs: 3,
                required_keys: &[],
                produces: &[A::FeatureMatrix, A::RequantifiedFeatureMatrix],
                per_run: false,
            },
            Self::ExportMetadata => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &[],
                produces: &[A::MetadataTable],
                per_run: false,
            },
            Self::AnnotateMs1 => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &[],
                produces: &[A::Ms1Annotations],
                per_run: false,
            },
            Self::TargetedTables => StageSpec {
                min_inputs: 1,
                max_inputs: 1,
                required_keys: &[],
                produces: &[
                    A::RunTables,
                    A::AucTables,
                    A::AucCombinedTables,
                    A::Summary,
                    A::SummaryCombined,
                ],
                per_run: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_id_parse() {
        assert_eq!("detect".parse::<StageId>().unwrap(), StageId::Detect);
        assert_eq!("Requant-Link".parse::<StageId>().unwrap(), StageId::RequantLink);
        assert!("peak-picking".parse::<StageId>().is_err());
    }

    #[test]
    fn test_repeated_stages_share_kind() {
        assert_eq!(StageId::Decharge.kind(), StageId::RequantDecharge.kind());
        assert_eq!(StageId::Link.kind(), StageId::RequantLink.kind());
        assert_eq!(StageId::TargetedExtract.kind(), StageKind::Requantify);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = ALL_STAGE_IDS.iter().map(|id| id.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ALL_STAGE_IDS.len());
    }
}
