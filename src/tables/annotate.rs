//! MS1 annotation by m/z and retention time
//!
//! A feature is annotated with the library compound closest to it within a
//! ppm window around the compound m/z and a symmetric retention time window
//! (half the configured width on each side of the apex). Both constraints
//! must hold.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{FeatureMatrix, QuantificationTable};
use crate::formats::tsv::TsvTable;
use crate::formats::{FormatError, FormatResult};

/// A known compound of the annotation library
#[derive(Debug, Clone, PartialEq)]
pub struct Ms1Compound {
    pub name: String,
    pub mz: f64,
    /// Retention time in seconds
    pub rt: f64,
}

/// Read an annotation library with the columns `name`, `mz` and `RT`
pub fn read_ms1_library(path: &Path) -> FormatResult<Vec<Ms1Compound>> {
    let table = TsvTable::read(path)?;
    parse_library(&table).map_err(|e| e.in_file(path))
}

fn parse_library(table: &TsvTable) -> FormatResult<Vec<Ms1Compound>> {
    let name = table.require_column("name")?;
    let mz = table.require_column("mz")?;
    let rt = table.require_column("RT")?;

    table
        .rows
        .iter()
        .map(|row| {
            let number = |column: usize, what: &str| {
                table.cell(row, column).parse::<f64>().map_err(|_| {
                    FormatError::invalid(
                        "library",
                        format!("invalid {what} '{}'", table.cell(row, column)),
                    )
                })
            };
            Ok(Ms1Compound {
                name: table.cell(row, name).to_string(),
                mz: number(mz, "m/z")?,
                rt: number(rt, "retention time")?,
            })
        })
        .collect()
}

/// Whether a deviation exactly at the window edge still matches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowBoundary {
    #[default]
    Inclusive,
    Exclusive,
}

impl std::str::FromStr for WindowBoundary {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inclusive" => Ok(Self::Inclusive),
            "exclusive" => Ok(Self::Exclusive),
            _ => Err(format!("Unknown window boundary: {}", s)),
        }
    }
}

impl std::fmt::Display for WindowBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inclusive => write!(f, "inclusive"),
            Self::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Matching windows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnnotationParams {
    pub mz_window_ppm: f64,
    /// Full window width; half of it applies on each side
    pub rt_window_sec: f64,
    pub boundary: WindowBoundary,
}

impl AnnotationParams {
    fn within(&self, delta: f64, limit: f64) -> bool {
        match self.boundary {
            WindowBoundary::Inclusive => delta <= limit,
            WindowBoundary::Exclusive => delta < limit,
        }
    }
}

/// Outcome of annotating a matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub matched: usize,
    /// Features without a library match; never an error
    pub unmatched: usize,
}

/// Closest compound matching both windows.
///
/// Distance is the sum of both deviations relative to their window; equal
/// distances go to the compound listed first.
pub fn best_match<'a>(
    mz: f64,
    rt: f64,
    library: &'a [Ms1Compound],
    params: &AnnotationParams,
) -> Option<&'a Ms1Compound> {
    let half_rt = params.rt_window_sec / 2.0;
    let mut best: Option<(f64, &Ms1Compound)> = None;

    for compound in library {
        if compound.mz <= 0.0 {
            continue;
        }
        let ppm = (mz - compound.mz).abs() / compound.mz * 1e6;
        let drt = (rt - compound.rt).abs();
        if !params.within(ppm, params.mz_window_ppm) || !params.within(drt, half_rt) {
            continue;
        }
        let distance = relative(ppm, params.mz_window_ppm) + relative(drt, half_rt);
        if best.is_none_or(|(d, _)| distance < d) {
            best = Some((distance, compound));
        }
    }
    best.map(|(_, compound)| compound)
}

fn relative(delta: f64, window: f64) -> f64 {
    if window > 0.0 { delta / window } else { 0.0 }
}

/// Fill the annotation column of every row
pub fn annotate_matrix(
    matrix: &mut FeatureMatrix,
    library: &[Ms1Compound],
    params: &AnnotationParams,
) -> AnnotationSummary {
    let mut summary = AnnotationSummary::default();
    matrix.with_annotation = true;
    for row in matrix.rows.iter_mut() {
        row.annotation = best_match(row.mz, row.rt, library, params).map(|c| c.name.clone());
        match &row.annotation {
            Some(name) => {
                debug!(feature = row.id, compound = %name, "Annotated feature");
                summary.matched += 1;
            }
            None => summary.unmatched += 1,
        }
    }
    summary
}

/// Intensities of annotated rows, summed per compound name
pub fn annotated_table(matrix: &FeatureMatrix) -> QuantificationTable {
    let mut table = QuantificationTable::new(matrix.runs.clone());
    for row in &matrix.rows {
        if let Some(name) = &row.annotation {
            for (run, value) in row.intensities.iter().enumerate() {
                table.add(name, run, *value);
            }
        }
    }
    table
}
