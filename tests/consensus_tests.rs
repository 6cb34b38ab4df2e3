//! Consensus-level operations of the re-quantification branch

use proptest::prelude::*;
use umetaflow::consensus::{LinkParams, MzUnit, link_maps, split};
use umetaflow::model::{
    ConsensusFeature, ConsensusMap, Feature, FeatureHandle, FeatureMap, MapDescription, MetaValues,
};

fn consensus_with(presence: &[Vec<bool>], maps: usize) -> ConsensusMap {
    ConsensusMap {
        meta: MetaValues::new(),
        maps: (0..maps)
            .map(|i| MapDescription::new(i as u32, format!("run{i}.featureXML")))
            .collect(),
        features: presence
            .iter()
            .enumerate()
            .map(|(row, present)| ConsensusFeature {
                id: row as u64,
                rt: row as f64,
                mz: 100.0 + row as f64,
                intensity: 1.0,
                charge: 1,
                quality: 0.0,
                elements: present
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| **p)
                    .map(|(map, _)| FeatureHandle {
                        map: map as u32,
                        id: row as u64 * 10 + map as u64,
                        rt: row as f64,
                        mz: 100.0 + row as f64,
                        intensity: 1.0,
                        charge: 1,
                    })
                    .collect(),
                meta: MetaValues::new(),
            })
            .collect(),
    }
}

mod split_tests {
    use super::*;

    proptest! {
        #[test]
        fn test_split_partitions_rows(
            presence in prop::collection::vec(prop::collection::vec(any::<bool>(), 3), 0..20)
        ) {
            let consensus = consensus_with(&presence, 3);
            let (complete, missing) = split(&consensus);

            prop_assert_eq!(complete.len() + missing.len(), consensus.len());
            prop_assert_eq!(&complete.maps, &consensus.maps);
            prop_assert_eq!(&missing.maps, &consensus.maps);
            prop_assert!(complete.features.iter().all(|f| f.is_complete(&consensus.maps)));
            prop_assert!(missing.features.iter().all(|f| !f.is_complete(&consensus.maps)));

            // Relative order survives in both halves
            let ids = |m: &ConsensusMap| m.features.iter().map(|f| f.id).collect::<Vec<_>>();
            prop_assert!(ids(&complete).windows(2).all(|w| w[0] < w[1]));
            prop_assert!(ids(&missing).windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn test_split_empty_row_is_missing() {
        let consensus = consensus_with(&[vec![false, false], vec![true, true]], 2);
        let (complete, missing) = split(&consensus);
        assert_eq!(complete.features[0].id, 1);
        assert_eq!(missing.features[0].id, 0);
    }
}

mod link_tests {
    use super::*;

    fn params() -> LinkParams {
        LinkParams {
            mz_tol: 10.0,
            rt_tol: 30.0,
            mz_unit: MzUnit::Ppm,
        }
    }

    fn map(features: &[(f64, f64, f64)]) -> FeatureMap {
        FeatureMap::new(
            features
                .iter()
                .enumerate()
                .map(|(i, &(rt, mz, intensity))| Feature::new(i as u64 + 1, rt, mz, intensity))
                .collect(),
        )
    }

    #[test]
    fn test_link_within_tolerance() {
        // 5 ppm apart at m/z 200
        let maps = vec![
            ("a.featureXML".to_string(), map(&[(100.0, 200.0, 5000.0)])),
            ("b.featureXML".to_string(), map(&[(110.0, 200.001, 3000.0)])),
        ];
        let consensus = link_maps(&maps, &params());
        assert_eq!(consensus.len(), 1);
        assert!(consensus.features[0].is_complete(&consensus.maps));
        assert_eq!(consensus.features[0].intensity_in(1), Some(3000.0));
    }

    #[test]
    fn test_link_outside_tolerance() {
        // 20 ppm apart at m/z 200
        let maps = vec![
            ("a.featureXML".to_string(), map(&[(100.0, 200.0, 5000.0)])),
            ("b.featureXML".to_string(), map(&[(100.0, 200.004, 3000.0)])),
        ];
        let consensus = link_maps(&maps, &params());
        assert_eq!(consensus.len(), 2);
        assert!(consensus.features.iter().all(|f| f.elements.len() == 1));
    }

    #[test]
    fn test_link_rt_tolerance() {
        let maps = vec![
            ("a.featureXML".to_string(), map(&[(100.0, 200.0, 5000.0)])),
            ("b.featureXML".to_string(), map(&[(140.0, 200.0, 3000.0)])),
        ];
        assert_eq!(link_maps(&maps, &params()).len(), 2);
    }

    #[test]
    fn test_link_takes_closest_candidate() {
        let maps = vec![
            ("a.featureXML".to_string(), map(&[(100.0, 200.0, 5000.0)])),
            (
                "b.featureXML".to_string(),
                map(&[(120.0, 200.0, 3000.0), (102.0, 200.0, 1000.0)]),
            ),
        ];
        let consensus = link_maps(&maps, &params());
        let linked = consensus
            .features
            .iter()
            .find(|f| f.elements.len() == 2)
            .unwrap();
        assert_eq!(linked.intensity_in(1), Some(1000.0));
        assert_eq!(consensus.len(), 2);
    }

    #[test]
    fn test_map_list_keeps_run_names() {
        let maps = vec![
            ("out/a.featureXML".to_string(), map(&[])),
            ("out/b.featureXML".to_string(), map(&[])),
        ];
        let consensus = link_maps(&maps, &params());
        let names: Vec<String> = consensus.maps.iter().map(|m| m.run_name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(consensus.is_empty());
    }
}
