//! Splitting a consensus map into complete and missing-value rows

use std::collections::HashSet;

use super::ORIGIN_LINKED;
use crate::model::{ConsensusMap, FeatureMap};
use crate::storage::RunId;

/// Partition rows into (complete, missing).
///
/// A row is complete when every map of the map list contributes a feature.
/// Both halves keep the map list and row order of the input.
pub fn split(consensus: &ConsensusMap) -> (ConsensusMap, ConsensusMap) {
    let mut complete = consensus.empty_like();
    let mut missing = consensus.empty_like();

    for feature in &consensus.features {
        if feature.is_complete(&consensus.maps) {
            complete.features.push(feature.clone());
        } else {
            missing.features.push(feature.clone());
        }
    }

    (complete, missing)
}

/// Keep, per run, exactly the features referenced by the complete rows.
///
/// Runs are matched to the map list by name, falling back to position when
/// the map list does not carry run names. Kept features are tagged with
/// `feature_origin=linked`.
pub fn filter_to_consensus(
    complete: &ConsensusMap,
    runs: &[(RunId, FeatureMap)],
) -> Vec<FeatureMap> {
    runs.iter()
        .enumerate()
        .map(|(position, (run, map))| {
            let index = complete
                .maps
                .iter()
                .find(|m| m.run_name() == run.as_str())
                .or_else(|| complete.maps.get(position))
                .map(|m| m.index);

            let referenced: HashSet<u64> = match index {
                Some(index) => complete
                    .features
                    .iter()
                    .flat_map(|f| f.elements.iter())
                    .filter(|e| e.map == index)
                    .map(|e| e.id)
                    .collect(),
                None => HashSet::new(),
            };

            let mut filtered = FeatureMap {
                meta: map.meta.clone(),
                features: Vec::new(),
            };
            for feature in map.features.iter().filter(|f| referenced.contains(&f.id)) {
                let mut feature = feature.clone();
                feature.set_origin(ORIGIN_LINKED);
                filtered.features.push(feature);
            }
            filtered
        })
        .collect()
}
