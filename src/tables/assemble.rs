//! Consensus map to feature matrix

use std::collections::BTreeSet;
use std::path::Path;

use crate::consensus::ORIGIN_MIXED;
use crate::formats::tsv::TsvTable;
use crate::formats::{FormatError, FormatResult, fmt_f64};
use crate::model::{ConsensusMap, FeatureMap};
use crate::storage::RunId;

const ID: &str = "id";
const MZ: &str = "mz";
const RT: &str = "RT";
const CHARGE: &str = "charge";
const QUALITY: &str = "quality";
const ADDUCT: &str = "adduct";
const PROVENANCE: &str = "provenance";
pub(crate) const MS1_ANNOTATION: &str = "MS1 annotation";

/// Headers of the optional matrix columns; runs must not use these names
pub const RESERVED_RUN_NAMES: [&str; 2] = [PROVENANCE, MS1_ANNOTATION];

/// One consensus feature as a table row
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixRow {
    pub id: u64,
    pub mz: f64,
    pub rt: f64,
    pub charge: i32,
    pub quality: f64,
    /// Best ion when adducts were determined
    pub adduct: Option<String>,
    /// `linked`, `requantified` or `mixed`
    pub provenance: Option<String>,
    pub annotation: Option<String>,
    /// One value per run column, 0 when the run has no feature
    pub intensities: Vec<f64>,
}

/// Consensus features by run intensities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    pub runs: Vec<String>,
    pub rows: Vec<MatrixRow>,
    pub with_provenance: bool,
    pub with_annotation: bool,
}

/// Flatten a consensus map.
///
/// Map indices are resolved to run columns by run name, falling back to
/// position. When the feature maps behind the consensus are given, each row
/// also gets the provenance of its elements.
pub fn feature_matrix(
    consensus: &ConsensusMap,
    runs: &[RunId],
    origins: Option<&[(RunId, FeatureMap)]>,
) -> FeatureMatrix {
    let column_of = |map: u32| -> Option<usize> {
        let position = consensus.maps.iter().position(|m| m.index == map)?;
        let name = consensus.maps[position].run_name();
        runs.iter()
            .position(|r| r.as_str() == name)
            .or_else(|| (position < runs.len()).then_some(position))
    };

    let rows = consensus
        .features
        .iter()
        .map(|feature| {
            let mut intensities = vec![0.0; runs.len()];
            let mut row_origins = BTreeSet::new();
            for element in &feature.elements {
                let Some(column) = column_of(element.map) else {
                    continue;
                };
                intensities[column] += element.intensity;
                if let Some(maps) = origins {
                    let origin = maps
                        .iter()
                        .find(|(run, _)| *run == runs[column])
                        .and_then(|(_, map)| map.get(element.id))
                        .and_then(|f| f.origin());
                    if let Some(origin) = origin {
                        row_origins.insert(origin.to_string());
                    }
                }
            }

            let provenance = match row_origins.len() {
                0 => None,
                1 => row_origins.into_iter().next(),
                _ => Some(ORIGIN_MIXED.to_string()),
            };

            MatrixRow {
                id: feature.id,
                mz: feature.mz,
                rt: feature.rt,
                charge: feature.charge,
                quality: feature.quality,
                adduct: feature.best_ion().map(str::to_string),
                provenance,
                annotation: None,
                intensities,
            }
        })
        .collect();

    FeatureMatrix {
        runs: runs.iter().map(|r| r.to_string()).collect(),
        rows,
        with_provenance: origins.is_some(),
        with_annotation: false,
    }
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Count of zero cells across all run columns
    pub fn missing_values(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| r.intensities.iter())
            .filter(|v| **v == 0.0)
            .count()
    }

    pub fn to_tsv(&self) -> TsvTable {
        let mut headers: Vec<String> = [ID, MZ, RT, CHARGE, QUALITY, ADDUCT]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if self.with_provenance {
            headers.push(PROVENANCE.to_string());
        }
        if self.with_annotation {
            headers.push(MS1_ANNOTATION.to_string());
        }
        headers.extend(self.runs.iter().cloned());

        let mut table = TsvTable::new(headers);
        for row in &self.rows {
            let mut cells = vec![
                format!("f_{}", row.id),
                fmt_f64(row.mz),
                fmt_f64(row.rt),
                row.charge.to_string(),
                fmt_f64(row.quality),
                row.adduct.clone().unwrap_or_default(),
            ];
            if self.with_provenance {
                cells.push(row.provenance.clone().unwrap_or_default());
            }
            if self.with_annotation {
                cells.push(row.annotation.clone().unwrap_or_default());
            }
            cells.extend(row.intensities.iter().map(|v| fmt_f64(*v)));
            table.rows.push(cells);
        }
        table
    }

    /// Parse a matrix written by [`Self::to_tsv`]
    ///
    /// The optional columns are recognized only in their slot right after
    /// `adduct`; every column behind them is a run.
    pub fn from_tsv(table: &TsvTable) -> FormatResult<Self> {
        let id = table.require_column(ID)?;
        let mz = table.require_column(MZ)?;
        let rt = table.require_column(RT)?;
        let charge = table.require_column(CHARGE)?;
        let quality = table.require_column(QUALITY)?;
        let adduct = table.require_column(ADDUCT)?;
        let last_fixed = [id, mz, rt, charge, quality, adduct]
            .into_iter()
            .max()
            .unwrap_or(adduct);

        let slot = |position: usize, name: &str| {
            table
                .headers
                .get(position)
                .is_some_and(|h| h.trim().eq_ignore_ascii_case(name))
                .then_some(position)
        };
        let mut next = last_fixed + 1;
        let provenance = slot(next, PROVENANCE);
        next += usize::from(provenance.is_some());
        let annotation = slot(next, MS1_ANNOTATION);
        next += usize::from(annotation.is_some());
        let run_columns: Vec<usize> = (next..table.headers.len()).collect();

        let optional = |row: &[String], column: Option<usize>| {
            column
                .map(|c| table.cell(row, c))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let mut rows = Vec::with_capacity(table.rows.len());
        for row in &table.rows {
            let id_cell = table.cell(row, id);
            rows.push(MatrixRow {
                id: id_cell
                    .trim_start_matches("f_")
                    .parse()
                    .map_err(|_| invalid_number(id_cell))?,
                mz: number(table.cell(row, mz))?,
                rt: number(table.cell(row, rt))?,
                charge: table
                    .cell(row, charge)
                    .parse()
                    .map_err(|_| invalid_number(table.cell(row, charge)))?,
                quality: number(table.cell(row, quality))?,
                adduct: optional(row, Some(adduct)),
                provenance: optional(row, provenance),
                annotation: optional(row, annotation),
                intensities: run_columns
                    .iter()
                    .map(|&c| number(table.cell(row, c)))
                    .collect::<FormatResult<_>>()?,
            });
        }

        Ok(Self {
            runs: run_columns
                .iter()
                .map(|&c| table.headers[c].clone())
                .collect(),
            rows,
            with_provenance: provenance.is_some(),
            with_annotation: annotation.is_some(),
        })
    }

    pub fn write(&self, path: &Path) -> FormatResult<()> {
        self.to_tsv().write(path)
    }

    pub fn read(path: &Path) -> FormatResult<Self> {
        Self::from_tsv(&TsvTable::read(path)?).map_err(|e| e.in_file(path))
    }
}

fn number(cell: &str) -> FormatResult<f64> {
    if cell.is_empty() {
        return Ok(0.0);
    }
    cell.parse().map_err(|_| invalid_number(cell))
}

fn invalid_number(cell: &str) -> FormatError {
    FormatError::invalid("table", format!("'{cell}' is not a number"))
}

/// Sample metadata for network analysis tools
pub fn metadata_table(runs: &[RunId]) -> TsvTable {
    let mut table = TsvTable::new(vec![
        "filename".to_string(),
        "ATTRIBUTE_Sample_Type".to_string(),
    ]);
    for run in runs {
        table
            .rows
            .push(vec![run.mzml_name(), "Sample".to_string()]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{ORIGIN_LINKED, ORIGIN_REQUANTIFIED};
    use crate::model::{
        BEST_ION, ConsensusFeature, Feature, FeatureHandle, MapDescription, MetaValue, MetaValues,
    };

    fn handle(map: u32, id: u64, intensity: f64) -> FeatureHandle {
        FeatureHandle {
            map,
            id,
            rt: 10.0,
            mz: 100.0,
            intensity,
            charge: 1,
        }
    }

    fn consensus() -> ConsensusMap {
        let mut meta = MetaValues::new();
        meta.insert(BEST_ION.to_string(), MetaValue::from("[M+H]+"));
        ConsensusMap {
            meta: MetaValues::new(),
            // Map list order differs from run order on purpose
            maps: vec![
                MapDescription::new(0, "/tmp/interim/FFM/B.featureXML"),
                MapDescription::new(1, "/tmp/interim/FFM/A.featureXML"),
            ],
            features: vec![
                ConsensusFeature {
                    id: 1,
                    rt: 10.0,
                    mz: 100.0,
                    intensity: 5.0,
                    charge: 1,
                    quality: 1.0,
                    elements: vec![handle(0, 11, 4.0), handle(1, 21, 6.0)],
                    meta,
                },
                ConsensusFeature {
                    id: 2,
                    rt: 20.0,
                    mz: 200.0,
                    intensity: 3.0,
                    charge: 1,
                    quality: 0.5,
                    elements: vec![handle(1, 22, 3.0)],
                    meta: MetaValues::new(),
                },
            ],
        }
    }

    fn runs() -> Vec<RunId> {
        vec![RunId::new("A"), RunId::new("B")]
    }

    #[test]
    fn test_columns_follow_run_names() {
        let matrix = feature_matrix(&consensus(), &runs(), None);
        assert_eq!(matrix.runs, vec!["A", "B"]);
        assert_eq!(matrix.rows[0].intensities, vec![6.0, 4.0]);
        assert_eq!(matrix.rows[1].intensities, vec![3.0, 0.0]);
        assert_eq!(matrix.rows[0].adduct.as_deref(), Some("[M+H]+"));
        assert_eq!(matrix.missing_values(), 1);
        assert!(!matrix.to_tsv().headers.contains(&PROVENANCE.to_string()));
    }

    #[test]
    fn test_provenance_from_feature_origins() {
        let mut linked = Feature::new(21, 10.0, 100.0, 6.0);
        linked.set_origin(ORIGIN_LINKED);
        let mut requant = Feature::new(22, 20.0, 200.0, 3.0);
        requant.set_origin(ORIGIN_REQUANTIFIED);
        let mut other = Feature::new(11, 10.0, 100.0, 4.0);
        other.set_origin(ORIGIN_REQUANTIFIED);

        let maps = vec![
            (RunId::new("A"), FeatureMap::new(vec![linked, requant])),
            (RunId::new("B"), FeatureMap::new(vec![other])),
        ];
        let matrix = feature_matrix(&consensus(), &runs(), Some(&maps));
        assert_eq!(matrix.rows[0].provenance.as_deref(), Some(ORIGIN_MIXED));
        assert_eq!(matrix.rows[1].provenance.as_deref(), Some(ORIGIN_REQUANTIFIED));
    }

    #[test]
    fn test_tsv_round_trip() {
        let mut matrix = feature_matrix(&consensus(), &runs(), None);
        matrix.with_annotation = true;
        matrix.rows[1].annotation = Some("Alanine".to_string());

        let table = matrix.to_tsv();
        assert_eq!(table.rows[0][0], "f_1");
        let parsed = FeatureMatrix::from_tsv(&table).unwrap();
        assert_eq!(parsed, matrix);
    }

    #[test]
    fn test_optional_columns_read_by_position() {
        let mut matrix = feature_matrix(&consensus(), &runs(), None);
        matrix.runs = vec!["provenance".to_string(), "B".to_string()];
        matrix.with_provenance = true;
        matrix.with_annotation = true;
        matrix.rows[0].provenance = Some(ORIGIN_MIXED.to_string());
        matrix.rows[1].annotation = Some("Alanine".to_string());

        let parsed = FeatureMatrix::from_tsv(&matrix.to_tsv()).unwrap();
        assert_eq!(parsed.runs, vec!["provenance", "B"]);
        assert_eq!(parsed.rows[0].intensities, vec![6.0, 4.0]);
        assert_eq!(parsed, matrix);

        // Without the optional block a trailing run keeps its column
        let mut matrix = feature_matrix(&consensus(), &runs(), None);
        matrix.runs = vec!["A".to_string(), "adduct".to_string()];
        let parsed = FeatureMatrix::from_tsv(&matrix.to_tsv()).unwrap();
        assert_eq!(parsed.runs, vec!["A", "adduct"]);
        assert!(!parsed.with_provenance);
    }

    #[test]
    fn test_metadata_table() {
        let table = metadata_table(&runs());
        assert_eq!(table.headers, vec!["filename", "ATTRIBUTE_Sample_Type"]);
        assert_eq!(table.rows[1], vec!["B.mzML", "Sample"]);
    }
}
