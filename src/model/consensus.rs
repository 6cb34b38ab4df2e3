//! Consensus maps: features linked across runs

use serde::{Deserialize, Serialize};

use super::{BEST_ION, MetaValue, MetaValues};

/// One input map of a consensus map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDescription {
    /// Index referenced by [`FeatureHandle::map`]
    pub index: u32,
    /// File the map was read from
    pub filename: String,
    pub label: String,
    pub size: usize,
    pub unique_id: u64,
    pub meta: MetaValues,
}

impl MapDescription {
    pub fn new(index: u32, filename: impl Into<String>) -> Self {
        Self {
            index,
            filename: filename.into(),
            label: String::new(),
            size: 0,
            unique_id: 0,
            meta: MetaValues::new(),
        }
    }

    /// File name without directory and extension, i.e. the run identity
    pub fn run_name(&self) -> String {
        let name = self
            .filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename);
        match name.rfind('.') {
            Some(idx) if idx > 0 => name[..idx].to_string(),
            _ => name.to_string(),
        }
    }
}

/// Reference from a consensus feature to a feature of one input map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureHandle {
    pub map: u32,
    pub id: u64,
    pub rt: f64,
    pub mz: f64,
    pub intensity: f64,
    pub charge: i32,
}

/// A group of features from different runs believed to be the same analyte
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusFeature {
    pub id: u64,
    pub rt: f64,
    pub mz: f64,
    pub intensity: f64,
    pub charge: i32,
    pub quality: f64,
    pub elements: Vec<FeatureHandle>,
    pub meta: MetaValues,
}

impl ConsensusFeature {
    /// Whether every listed map contributes a feature
    pub fn is_complete(&self, maps: &[MapDescription]) -> bool {
        maps.iter()
            .all(|m| self.elements.iter().any(|e| e.map == m.index))
    }

    /// Intensity contributed by one map, if present
    pub fn intensity_in(&self, map: u32) -> Option<f64> {
        let mut found = None;
        for element in self.elements.iter().filter(|e| e.map == map) {
            *found.get_or_insert(0.0) += element.intensity;
        }
        found
    }

    pub fn best_ion(&self) -> Option<&str> {
        self.meta.get(BEST_ION).and_then(MetaValue::as_text)
    }
}

/// Linked features of all runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusMap {
    pub meta: MetaValues,
    pub maps: Vec<MapDescription>,
    pub features: Vec<ConsensusFeature>,
}

impl ConsensusMap {
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Same map list and meta values, no features
    pub fn empty_like(&self) -> Self {
        Self {
            meta: self.meta.clone(),
            maps: self.maps.clone(),
            features: Vec::new(),
        }
    }
}
