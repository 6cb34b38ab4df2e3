//! In-memory model of the feature and consensus documents the pipeline inspects
//!
//! Only the parts the orchestrator needs are kept: positions, intensities,
//! charges, convex hulls and user meta values. Anything else in a document
//! (data processing records, identifications, subordinate features) is
//! dropped on read.

mod consensus;
mod feature;

pub use consensus::{ConsensusFeature, ConsensusMap, FeatureHandle, MapDescription};
pub use feature::{ConvexHull, Feature, FeatureMap};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Meta value key for the origin of a feature in the re-quantification branch
pub const FEATURE_ORIGIN: &str = "feature_origin";
/// Meta value key written by adduct decharging on features
pub const DECHARGE_ADDUCTS: &str = "dc_charge_adducts";
/// Meta value key carrying the most common adduct of a consensus feature
pub const BEST_ION: &str = "best ion";
/// Meta value key carrying the compound name of a targeted feature
pub const LABEL: &str = "label";

/// A typed user meta value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    Text(String),
    Int(i64),
    Float(f64),
    /// Any other declared type, kept verbatim
    Raw { kind: String, value: String },
}

impl MetaValue {
    /// Parse a value from its declared type and textual form
    pub fn parse(kind: &str, value: &str) -> Self {
        match kind {
            "string" => MetaValue::Text(value.to_string()),
            "int" => value
                .parse()
                .map(MetaValue::Int)
                .unwrap_or_else(|_| MetaValue::Raw {
                    kind: kind.to_string(),
                    value: value.to_string(),
                }),
            "float" => value
                .parse()
                .map(MetaValue::Float)
                .unwrap_or_else(|_| MetaValue::Raw {
                    kind: kind.to_string(),
                    value: value.to_string(),
                }),
            _ => MetaValue::Raw {
                kind: kind.to_string(),
                value: value.to_string(),
            },
        }
    }

    /// Declared type name
    pub fn kind(&self) -> &str {
        match self {
            MetaValue::Text(_) => "string",
            MetaValue::Int(_) => "int",
            MetaValue::Float(_) => "float",
            MetaValue::Raw { kind, .. } => kind,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaValue::Text(s) => f.write_str(s),
            MetaValue::Int(i) => write!(f, "{}", i),
            MetaValue::Float(x) => write!(f, "{}", x),
            MetaValue::Raw { value, .. } => f.write_str(value),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

/// Ordered meta value container
pub type MetaValues = BTreeMap<String, MetaValue>;

/// Deterministic 64 bit id derived from arbitrary parts
pub fn derive_unique_id(parts: &[&[u8]]) -> u64 {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
