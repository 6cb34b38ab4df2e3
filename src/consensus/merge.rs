//! Merging complete and re-quantified features of one run

use std::collections::HashSet;

use super::{ORIGIN_LINKED, ORIGIN_REQUANTIFIED};
use crate::model::{FeatureMap, derive_unique_id};

/// Complete features followed by re-quantified ones.
///
/// Either side may be absent; the other side is then kept alone. Features
/// keep their origin tag: complete ones are `linked` unless already tagged,
/// re-quantified ones are always `requantified`. Colliding ids on the
/// re-quantified side are replaced by fresh derived ids.
pub fn merge_feature_maps(
    complete: Option<FeatureMap>,
    requantified: Option<FeatureMap>,
) -> FeatureMap {
    let mut merged = FeatureMap::default();
    let mut ids = HashSet::new();

    if let Some(complete) = complete {
        merged.meta = complete.meta;
        for mut feature in complete.features {
            if feature.origin().is_none() {
                feature.set_origin(ORIGIN_LINKED);
            }
            ids.insert(feature.id);
            merged.features.push(feature);
        }
    }

    if let Some(requantified) = requantified {
        if merged.meta.is_empty() {
            merged.meta = requantified.meta;
        }
        for mut feature in requantified.features {
            let mut salt = 0u32;
            while ids.contains(&feature.id) {
                salt += 1;
                feature.id = derive_unique_id(&[
                    ORIGIN_REQUANTIFIED.as_bytes(),
                    &feature.id.to_le_bytes(),
                    &salt.to_le_bytes(),
                ]);
            }
            feature.set_origin(ORIGIN_REQUANTIFIED);
            ids.insert(feature.id);
            merged.features.push(feature);
        }
    }

    merged
}
