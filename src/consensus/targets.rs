//! Target library from consensus rows with missing values

use crate::formats::tsv::TargetCompound;
use crate::model::ConsensusMap;

/// Mass of a proton in Da
pub const PROTON_MASS: f64 = 1.007_276_466_88;

/// One library row per consensus row.
///
/// Rows are named `cf_<id>` so re-quantified features can be traced back.
/// The neutral mass assumes protonated (or deprotonated in negative mode)
/// ions; uncharged rows are treated as singly charged.
pub fn targets_from_missing(missing: &ConsensusMap, negative_mode: bool) -> Vec<TargetCompound> {
    missing
        .features
        .iter()
        .map(|feature| {
            let z = feature.charge.unsigned_abs().max(1) as f64;
            let (mass, charge) = if negative_mode {
                (feature.mz * z + PROTON_MASS * z, -(z as i32))
            } else {
                (feature.mz * z - PROTON_MASS * z, z as i32)
            };
            TargetCompound {
                name: format!("cf_{}", feature.id),
                sum_formula: String::new(),
                mass,
                charge,
                retention_times: vec![feature.rt],
                retention_time_range: 0.0,
                iso_distribution: vec![0.0],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConsensusFeature, MetaValues};

    fn missing(mz: f64, charge: i32) -> ConsensusMap {
        ConsensusMap {
            meta: MetaValues::new(),
            maps: Vec::new(),
            features: vec![ConsensusFeature {
                id: 42,
                rt: 120.0,
                mz,
                intensity: 1.0,
                charge,
                quality: 0.0,
                elements: Vec::new(),
                meta: MetaValues::new(),
            }],
        }
    }

    #[test]
    fn test_positive_mode_mass() {
        let targets = targets_from_missing(&missing(181.070_665, 1), false);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "cf_42");
        assert_eq!(targets[0].charge, 1);
        assert_eq!(targets[0].retention_times, vec![120.0]);
        assert!((targets[0].mass - 180.063_388).abs() < 1e-5);
    }

    #[test]
    fn test_negative_mode_and_uncharged() {
        let targets = targets_from_missing(&missing(179.056_113, 0), true);
        assert_eq!(targets[0].charge, -1);
        assert!((targets[0].mass - 180.063_389).abs() < 1e-5);
    }

    #[test]
    fn test_doubly_charged() {
        let targets = targets_from_missing(&missing(91.038_970, 2), false);
        assert_eq!(targets[0].charge, 2);
        assert!((targets[0].mass - 180.063_388).abs() < 1e-5);
    }
}
