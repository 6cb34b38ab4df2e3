//! Features and feature maps

use serde::{Deserialize, Serialize};

use super::{FEATURE_ORIGIN, LABEL, MetaValue, MetaValues};

/// Mass trace outline of a feature as (RT, m/z) points
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvexHull {
    pub points: Vec<(f64, f64)>,
}

/// A detected LC-MS feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: u64,
    /// Retention time in seconds
    pub rt: f64,
    pub mz: f64,
    pub intensity: f64,
    pub charge: i32,
    pub quality: f64,
    pub convex_hulls: Vec<ConvexHull>,
    pub meta: MetaValues,
}

impl Feature {
    pub fn new(id: u64, rt: f64, mz: f64, intensity: f64) -> Self {
        Self {
            id,
            rt,
            mz,
            intensity,
            charge: 0,
            quality: 0.0,
            convex_hulls: Vec::new(),
            meta: MetaValues::new(),
        }
    }

    pub fn with_charge(mut self, charge: i32) -> Self {
        self.charge = charge;
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: MetaValue) -> Self {
        self.meta.insert(key.into(), value);
        self
    }

    /// Text meta value by key
    pub fn meta_text(&self, key: &str) -> Option<&str> {
        self.meta.get(key).and_then(MetaValue::as_text)
    }

    /// Compound name assigned by targeted extraction
    pub fn label(&self) -> Option<&str> {
        self.meta_text(LABEL)
    }

    pub fn origin(&self) -> Option<&str> {
        self.meta_text(FEATURE_ORIGIN)
    }

    pub fn set_origin(&mut self, origin: &str) {
        self.meta
            .insert(FEATURE_ORIGIN.to_string(), MetaValue::from(origin));
    }
}

/// All features detected in one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureMap {
    pub meta: MetaValues,
    pub features: Vec<Feature>,
}

impl FeatureMap {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            meta: MetaValues::new(),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Find a feature by its unique id
    pub fn get(&self, id: u64) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == id)
    }
}
