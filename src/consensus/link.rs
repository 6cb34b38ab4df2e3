//! Nearest-neighbour feature linking
//!
//! Seeds are visited from the most intense feature down. Every other map
//! contributes at most its closest unassigned feature within both the m/z
//! and the retention time tolerance, measured from the seed. Distances are
//! normalized by the tolerances so m/z and RT weigh equally.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::formats::{read_feature_map, write_consensus_map};
use crate::model::{
    BEST_ION, ConsensusFeature, ConsensusMap, DECHARGE_ADDUCTS, FeatureHandle, FeatureMap,
    MapDescription, MetaValue, MetaValues, derive_unique_id,
};
use crate::stages::{BackendError, BackendResult, StageConfig};

/// Unit of the m/z tolerance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MzUnit {
    Ppm,
    Da,
}

impl std::str::FromStr for MzUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ppm" => Ok(MzUnit::Ppm),
            "da" => Ok(MzUnit::Da),
            _ => Err(format!("Unknown m/z unit: {}", s)),
        }
    }
}

/// Linking tolerances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkParams {
    pub mz_tol: f64,
    pub rt_tol: f64,
    pub mz_unit: MzUnit,
}

impl LinkParams {
    /// Read `link:mz_tol`, `link:rt_tol` and `mz_unit`
    pub fn from_config(config: &StageConfig) -> BackendResult<Self> {
        let number = |key: &str| {
            config
                .get_f64(key)
                .ok_or_else(|| BackendError::invalid_param(key, "expected a number"))
        };
        let unit = config
            .get_str("mz_unit")
            .ok_or_else(|| BackendError::invalid_param("mz_unit", "expected ppm or Da"))?;
        Ok(Self {
            mz_tol: number("link:mz_tol")?,
            rt_tol: number("link:rt_tol")?,
            mz_unit: unit
                .parse()
                .map_err(|e: String| BackendError::invalid_param("mz_unit", e))?,
        })
    }

    fn mz_window(&self, mz: f64) -> f64 {
        match self.mz_unit {
            MzUnit::Ppm => self.mz_tol * mz * 1e-6,
            MzUnit::Da => self.mz_tol,
        }
    }
}

/// Link feature map files into a consensus file
pub fn link_feature_maps(
    maps: &[PathBuf],
    output: &Path,
    params: &LinkParams,
) -> BackendResult<()> {
    let mut loaded = Vec::with_capacity(maps.len());
    for path in maps {
        loaded.push((path.display().to_string(), read_feature_map(path)?));
    }
    let consensus = link_maps(&loaded, params);
    write_consensus_map(output, &consensus)?;
    Ok(())
}

/// Link in-memory feature maps, each given with the file name it came from
pub fn link_maps(maps: &[(String, FeatureMap)], params: &LinkParams) -> ConsensusMap {
    let mut consensus = ConsensusMap {
        meta: MetaValues::new(),
        maps: maps
            .iter()
            .enumerate()
            .map(|(i, (name, map))| {
                let mut description = MapDescription::new(i as u32, name.clone());
                description.size = map.len();
                description.unique_id = derive_unique_id(&[name.as_bytes()]);
                description
            })
            .collect(),
        features: Vec::new(),
    };

    let mut assigned: Vec<Vec<bool>> = maps.iter().map(|(_, m)| vec![false; m.len()]).collect();

    let mut seeds: Vec<(usize, usize)> = maps
        .iter()
        .enumerate()
        .flat_map(|(m, (_, map))| (0..map.len()).map(move |i| (m, i)))
        .collect();
    seeds.sort_by(|&(ma, ia), &(mb, ib)| {
        let a = maps[ma].1.features[ia].intensity;
        let b = maps[mb].1.features[ib].intensity;
        b.total_cmp(&a).then(ma.cmp(&mb)).then(ia.cmp(&ib))
    });

    for (seed_map, seed_idx) in seeds {
        if assigned[seed_map][seed_idx] {
            continue;
        }
        assigned[seed_map][seed_idx] = true;
        let seed = &maps[seed_map].1.features[seed_idx];
        let mz_window = params.mz_window(seed.mz);

        let mut group = vec![(seed_map, seed_idx)];
        for (other_map, (_, map)) in maps.iter().enumerate() {
            if other_map == seed_map {
                continue;
            }
            let mut best: Option<(f64, usize)> = None;
            for (i, candidate) in map.features.iter().enumerate() {
                if assigned[other_map][i] {
                    continue;
                }
                if seed.charge != 0 && candidate.charge != 0 && seed.charge != candidate.charge {
                    continue;
                }
                let dmz = (candidate.mz - seed.mz).abs();
                let drt = (candidate.rt - seed.rt).abs();
                if dmz > mz_window || drt > params.rt_tol {
                    continue;
                }
                let distance = normalized(dmz, mz_window) + normalized(drt, params.rt_tol);
                if best.is_none_or(|(d, _)| distance < d) {
                    best = Some((distance, i));
                }
            }
            if let Some((_, i)) = best {
                assigned[other_map][i] = true;
                group.push((other_map, i));
            }
        }

        group.sort();
        consensus
            .features
            .push(build_feature(maps, &group, consensus.maps.len()));
    }

    consensus.features.sort_by(|a, b| {
        a.rt.total_cmp(&b.rt)
            .then(a.mz.total_cmp(&b.mz))
            .then(a.id.cmp(&b.id))
    });
    consensus
}

fn normalized(delta: f64, window: f64) -> f64 {
    if window > 0.0 { delta / window } else { 0.0 }
}

fn build_feature(
    maps: &[(String, FeatureMap)],
    group: &[(usize, usize)],
    map_count: usize,
) -> ConsensusFeature {
    let n = group.len() as f64;
    let mut elements = Vec::with_capacity(group.len());
    let mut id_parts: Vec<Vec<u8>> = Vec::with_capacity(group.len());
    let mut adducts: BTreeMap<String, usize> = BTreeMap::new();
    let (mut rt, mut mz, mut intensity) = (0.0, 0.0, 0.0);
    let mut charge = 0;

    for &(m, i) in group {
        let feature = &maps[m].1.features[i];
        rt += feature.rt;
        mz += feature.mz;
        intensity += feature.intensity;
        if charge == 0 {
            charge = feature.charge;
        }
        if let Some(adduct) = feature.meta_text(DECHARGE_ADDUCTS) {
            *adducts.entry(adduct.to_string()).or_default() += 1;
        }
        id_parts.push([(m as u64).to_le_bytes(), feature.id.to_le_bytes()].concat());
        elements.push(FeatureHandle {
            map: m as u32,
            id: feature.id,
            rt: feature.rt,
            mz: feature.mz,
            intensity: feature.intensity,
            charge: feature.charge,
        });
    }

    let mut meta = MetaValues::new();
    let mut best: Option<(&String, usize)> = None;
    for (adduct, count) in &adducts {
        if best.is_none_or(|(_, c)| *count > c) {
            best = Some((adduct, *count));
        }
    }
    if let Some((adduct, _)) = best {
        meta.insert(BEST_ION.to_string(), MetaValue::Text(adduct.clone()));
    }

    let parts: Vec<&[u8]> = id_parts.iter().map(Vec::as_slice).collect();
    ConsensusFeature {
        id: derive_unique_id(&parts),
        rt: rt / n,
        mz: mz / n,
        intensity: intensity / n,
        charge,
        quality: if map_count > 0 {
            n / map_count as f64
        } else {
            0.0
        },
        elements,
        meta,
    }
}
