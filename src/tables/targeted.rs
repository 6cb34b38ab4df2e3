//! Tables of the targeted workflow

use serde::{Deserialize, Serialize};

use super::{METABOLITE_COLUMN, QuantificationTable};
use crate::formats::fmt_f64;
use crate::formats::tsv::TsvTable;
use crate::model::{Feature, FeatureMap};

/// Unit of retention times in per-run tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[default]
    Seconds,
    Minutes,
}

impl TimeUnit {
    fn convert(&self, seconds: f64) -> f64 {
        match self {
            Self::Seconds => seconds,
            Self::Minutes => seconds / 60.0,
        }
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "seconds" | "s" => Ok(Self::Seconds),
            "minutes" | "min" => Ok(Self::Minutes),
            _ => Err(format!("Unknown time unit: {}", s)),
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Seconds => write!(f, "seconds"),
            Self::Minutes => write!(f, "minutes"),
        }
    }
}

fn metabolite(feature: &Feature) -> String {
    feature
        .label()
        .map(str::to_string)
        .unwrap_or_else(|| format!("f_{}", feature.id))
}

/// One row per extracted feature
pub fn run_table(map: &FeatureMap, unit: TimeUnit) -> TsvTable {
    let mut table = TsvTable::new(
        [METABOLITE_COLUMN, "RT", "mz", "intensity", "charge", "quality"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
    );
    for feature in &map.features {
        table.rows.push(vec![
            metabolite(feature),
            fmt_f64(unit.convert(feature.rt)),
            fmt_f64(feature.mz),
            fmt_f64(feature.intensity),
            feature.charge.to_string(),
            fmt_f64(feature.quality),
        ]);
    }
    table
}

/// Summed intensity per metabolite of one run
pub fn auc_table(run: &str, map: &FeatureMap) -> QuantificationTable {
    let mut table = QuantificationTable::new(vec![run.to_string()]);
    for feature in &map.features {
        table.add(&metabolite(feature), 0, feature.intensity);
    }
    table
}

/// Side-by-side union of per-run tables; absent metabolites count as 0
pub fn summary_table(tables: &[QuantificationTable]) -> QuantificationTable {
    let runs: Vec<String> = tables.iter().flat_map(|t| t.runs.iter().cloned()).collect();
    let mut summary = QuantificationTable::new(runs);
    let mut offset = 0;
    for table in tables {
        for row in &table.rows {
            for (column, value) in row.intensities.iter().enumerate() {
                summary.add(&row.metabolite, offset + column, *value);
            }
        }
        offset += table.runs.len();
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LABEL, MetaValue};

    fn labelled(id: u64, label: &str, intensity: f64) -> Feature {
        Feature::new(id, 120.0, 100.0, intensity).with_meta(LABEL, MetaValue::from(label))
    }

    fn map() -> FeatureMap {
        FeatureMap::new(vec![
            labelled(1, "Glucose#[M+H]+", 10.0),
            labelled(2, "Glucose#[M+H]+", 5.0),
            labelled(3, "Glucose#[M+Na]+", 2.0),
            Feature::new(4, 60.0, 50.0, 1.0),
        ])
    }

    #[test]
    fn test_run_table_minutes() {
        let table = run_table(&map(), TimeUnit::Minutes);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[0][1], "2");
        assert_eq!(table.rows[3][0], "f_4");
    }

    #[test]
    fn test_auc_and_combined() {
        let auc = auc_table("A", &map());
        assert_eq!(auc.get("Glucose#[M+H]+", "A"), Some(15.0));
        let combined = auc.combined();
        assert_eq!(combined.get("Glucose", "A"), Some(17.0));
    }

    #[test]
    fn test_summary_unions_runs() {
        let a = auc_table("A", &map());
        let b = auc_table(
            "B",
            &FeatureMap::new(vec![labelled(9, "Alanine", 3.0)]),
        );
        let summary = summary_table(&[a, b]);
        assert_eq!(summary.runs, vec!["A", "B"]);
        assert_eq!(summary.get("Glucose#[M+H]+", "B"), Some(0.0));
        assert_eq!(summary.get("Alanine", "B"), Some(3.0));
        assert_eq!(summary.get("Alanine", "A"), Some(0.0));
    }

    #[test]
    fn test_time_unit_parse() {
        assert_eq!("Minutes".parse::<TimeUnit>().unwrap(), TimeUnit::Minutes);
        assert!("hours".parse::<TimeUnit>().is_err());
    }
}
