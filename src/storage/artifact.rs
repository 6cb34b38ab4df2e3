//! Typed artifact references
//!
//! Every intermediate result is addressed by an [`ArtifactRef`]: its kind,
//! where it lives and which stage produced it. Stages never infer what a
//! directory holds from its name.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::stages::StageId;

/// Identity of one raw run: the file name without its `.mzML` extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Derive the identity from a run path
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let stem = match name.rfind('.') {
            Some(idx) if name[idx + 1..].eq_ignore_ascii_case("mzml") => &name[..idx],
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        };
        if stem.is_empty() {
            None
        } else {
            Some(Self(stem.to_string()))
        }
    }

    /// Create from an already known identity
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the run as referenced by downstream tools
    pub fn mzml_name(&self) -> String {
        format!("{}.mzML", self.0)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an artifact kind is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One file per run inside a directory
    PerRun {
        dir: &'static str,
        extension: &'static str,
    },
    /// A single file
    File(&'static str),
    /// A single directory managed by the producing tool
    Directory(&'static str),
}

/// Top-level area of the working tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    /// `<results>/interim`
    Interim,
    /// `<results>`
    Results,
}

/// Logical type of an intermediate or final result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    RawRuns,
    FeatureMaps,
    AlignedFeatureMaps,
    Transformations,
    AlignedRuns,
    DechargedMaps,
    IdMappedMaps,
    Consensus,
    CompleteConsensus,
    MissingConsensus,
    CompleteFeatureMaps,
    TargetLibrary,
    RequantifiedMaps,
    MergedMaps,
    RequantDechargedMaps,
    RequantIdMappedMaps,
    RequantifiedConsensus,
    SiriusExport,
    GnpsExport,
    FeatureMatrix,
    RequantifiedFeatureMatrix,
    MetadataTable,
    Ms1Annotations,
    RunTables,
    AucTables,
    AucCombinedTables,
    Summary,
    SummaryCombined,
}

impl ArtifactKind {
    pub fn layout(&self) -> Layout {
        use Layout::*;
        match self {
            Self::RawRuns => PerRun { dir: "mzML_original", extension: "mzML" },
            Self::FeatureMaps => PerRun { dir: "FFM", extension: "featureXML" },
            Self::AlignedFeatureMaps => PerRun { dir: "FFM_aligned", extension: "featureXML" },
            Self::Transformations => PerRun { dir: "Trafo", extension: "trafoXML" },
            Self::AlignedRuns => PerRun { dir: "mzML_aligned", extension: "mzML" },
            Self::DechargedMaps => PerRun { dir: "FeatureMaps_decharged", extension: "featureXML" },
            Self::IdMappedMaps => PerRun { dir: "FeatureMaps_ID_mapped", extension: "featureXML" },
            Self::Consensus => File("FeatureMatrix.consensusXML"),
            Self::CompleteConsensus => File("FFM_complete.consensusXML"),
            Self::MissingConsensus => File("FFM_missing.consensusXML"),
            Self::CompleteFeatureMaps => PerRun { dir: "FFM_complete", extension: "featureXML" },
            Self::TargetLibrary => File("FFMID_library.tsv"),
            Self::RequantifiedMaps => PerRun { dir: "FFMID", extension: "featureXML" },
            Self::MergedMaps => PerRun { dir: "FeatureMaps_merged", extension: "featureXML" },
            Self::RequantDechargedMaps => PerRun {
                dir: "FeatureMaps_requant_decharged",
                extension: "featureXML",
            },
            Self::RequantIdMappedMaps => PerRun {
                dir: "FeatureMaps_requant_ID_mapped",
                extension: "featureXML",
            },
            Self::RequantifiedConsensus => File("FeatureMatrixRequantified.consensusXML"),
            Self::SiriusExport => Directory("SIRIUS"),
            Self::GnpsExport => Directory("GNPS"),
            Self::FeatureMatrix => File("FeatureMatrix.tsv"),
            Self::RequantifiedFeatureMatrix => File("FeatureMatrixRequantified.tsv"),
            Self::MetadataTable => File("MetaData.tsv"),
            Self::Ms1Annotations => Directory("MS1-annotations"),
            Self::RunTables => PerRun { dir: "runs", extension: "tsv" },
            Self::AucTables => PerRun { dir: "runs_AUC", extension: "tsv" },
            Self::AucCombinedTables => PerRun { dir: "runs_AUC_combined", extension: "tsv" },
            Self::Summary => File("summary.tsv"),
            Self::SummaryCombined => File("summary_combined.tsv"),
        }
    }

    pub fn area(&self) -> Area {
        match self {
            Self::SiriusExport
            | Self::GnpsExport
            | Self::FeatureMatrix
            | Self::RequantifiedFeatureMatrix
            | Self::MetadataTable
            | Self::Ms1Annotations
            | Self::RunTables
            | Self::AucTables
            | Self::AucCombinedTables
            | Self::Summary
            | Self::SummaryCombined => Area::Results,
            _ => Area::Interim,
        }
    }

    pub fn is_per_run(&self) -> bool {
        matches!(self.layout(), Layout::PerRun { .. })
    }
}

/// A concrete artifact of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: ArtifactKind,
    /// Directory for per-run kinds, file or directory otherwise
    pub path: PathBuf,
    pub producer: StageId,
}

impl ArtifactRef {
    /// Path of one run's file inside a per-run artifact
    pub fn run_path(&self, run: &RunId) -> PathBuf {
        match self.kind.layout() {
            Layout::PerRun { extension, .. } => {
                self.path.join(format!("{}.{}", run.as_str(), extension))
            }
            _ => self.path.clone(),
        }
    }

    /// Per-run paths in run order
    pub fn run_paths(&self, runs: &[RunId]) -> Vec<PathBuf> {
        runs.iter().map(|run| self.run_path(run)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_from_path() {
        let id = RunId::from_path(Path::new("/data/Sample_01.mzML")).unwrap();
        assert_eq!(id.as_str(), "Sample_01");
        assert_eq!(id.mzml_name(), "Sample_01.mzML");

        let id = RunId::from_path(Path::new("blank.2.mzml")).unwrap();
        assert_eq!(id.as_str(), "blank.2");

        assert!(RunId::from_path(Path::new("/")).is_none());
    }

    #[test]
    fn test_layout_directories_are_distinct() {
        let kinds = [
            ArtifactKind::FeatureMaps,
            ArtifactKind::AlignedFeatureMaps,
            ArtifactKind::DechargedMaps,
            ArtifactKind::IdMappedMaps,
            ArtifactKind::CompleteFeatureMaps,
            ArtifactKind::RequantifiedMaps,
            ArtifactKind::MergedMaps,
            ArtifactKind::RequantDechargedMaps,
            ArtifactKind::RequantIdMappedMaps,
            ArtifactKind::RunTables,
            ArtifactKind::AucTables,
            ArtifactKind::AucCombinedTables,
        ];
        let mut dirs: Vec<_> = kinds
            .iter()
            .map(|k| match k.layout() {
                Layout::PerRun { dir, .. } => dir,
                _ => panic!("expected per-run layout"),
            })
            .collect();
        dirs.sort();
        dirs.dedup();
        assert_eq!(dirs.len(), kinds.len());
    }

    #[test]
    fn test_run_path() {
        let artifact = ArtifactRef {
            kind: ArtifactKind::FeatureMaps,
            path: PathBuf::from("/tmp/interim/FFM"),
            producer: StageId::Detect,
        };
        let run = RunId::new("a");
        assert_eq!(
            artifact.run_path(&run),
            PathBuf::from("/tmp/interim/FFM/a.featureXML")
        );
    }
}
