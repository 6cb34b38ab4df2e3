//! Consensus-level operations of the re-quantification branch
//!
//! - [`split`]: partition a consensus map by full-row presence
//! - [`filter_to_consensus`]: per-run features referenced by complete rows
//! - [`targets_from_missing`]: target library for rows with missing values
//! - [`merge_feature_maps`]: complete plus newly quantified features per run
//! - [`link_maps`]: nearest-neighbour linking of feature maps

mod link;
mod merge;
mod split;
mod targets;

pub use link::{LinkParams, MzUnit, link_feature_maps, link_maps};
pub use merge::merge_feature_maps;
pub use split::{filter_to_consensus, split};
pub use targets::{PROTON_MASS, targets_from_missing};

/// Value of the `feature_origin` meta value for features from linked rows
pub const ORIGIN_LINKED: &str = "linked";
/// Value of the `feature_origin` meta value for re-quantified features
pub const ORIGIN_REQUANTIFIED: &str = "requantified";
/// Provenance of a consensus row mixing both origins
pub const ORIGIN_MIXED: &str = "mixed";
