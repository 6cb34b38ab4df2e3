//! Flat result tables
//!
//! Consensus maps become feature matrices (one row per consensus feature),
//! and quantification tables (one row per metabolite, one column per run).
//! Metabolite names may carry an adduct after `#`; combined tables pool all
//! adducts of one base name.

mod annotate;
mod assemble;
mod targeted;

pub use annotate::{
    AnnotationParams, AnnotationSummary, Ms1Compound, WindowBoundary, annotate_matrix,
    annotated_table, best_match, read_ms1_library,
};
pub use assemble::{
    FeatureMatrix, MatrixRow, RESERVED_RUN_NAMES, feature_matrix, metadata_table,
};
pub use targeted::{TimeUnit, auc_table, run_table, summary_table};

use std::collections::HashMap;
use std::path::Path;

use crate::formats::tsv::TsvTable;
use crate::formats::{FormatError, FormatResult, fmt_f64};

/// Name of the row identity column of quantification tables
pub const METABOLITE_COLUMN: &str = "metabolite";

/// Compound name without its adduct suffix
pub fn base_name(name: &str) -> &str {
    match name.find('#') {
        Some(idx) => &name[..idx],
        None => name,
    }
}

/// One metabolite with one intensity per run
#[derive(Debug, Clone, PartialEq)]
pub struct QuantRow {
    pub metabolite: String,
    pub intensities: Vec<f64>,
}

/// Metabolite by run intensity table
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantificationTable {
    pub runs: Vec<String>,
    pub rows: Vec<QuantRow>,
    index: HashMap<String, usize>,
}

impl QuantificationTable {
    pub fn new(runs: Vec<String>) -> Self {
        Self {
            runs,
            rows: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Add `value` to a metabolite's intensity in one run column.
    ///
    /// Rows are created on first use and keep first-use order.
    pub fn add(&mut self, metabolite: &str, run: usize, value: f64) {
        let width = self.runs.len();
        let row = match self.index.get(metabolite) {
            Some(&row) => row,
            None => {
                self.rows.push(QuantRow {
                    metabolite: metabolite.to_string(),
                    intensities: vec![0.0; width],
                });
                self.index
                    .insert(metabolite.to_string(), self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        if let Some(cell) = self.rows[row].intensities.get_mut(run) {
            *cell += value;
        }
    }

    /// Intensity of a metabolite in the named run
    pub fn get(&self, metabolite: &str, run: &str) -> Option<f64> {
        let column = self.runs.iter().position(|r| r == run)?;
        let row = self.index.get(metabolite)?;
        self.rows[*row].intensities.get(column).copied()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pool every `base#adduct` row into its base name
    pub fn combined(&self) -> Self {
        let mut combined = Self::new(self.runs.clone());
        for row in &self.rows {
            let base = base_name(&row.metabolite);
            for (run, value) in row.intensities.iter().enumerate() {
                combined.add(base, run, *value);
            }
        }
        combined
    }

    pub fn to_tsv(&self) -> TsvTable {
        let mut headers = vec![METABOLITE_COLUMN.to_string()];
        headers.extend(self.runs.iter().cloned());
        let mut table = TsvTable::new(headers);
        for row in &self.rows {
            let mut cells = vec![row.metabolite.clone()];
            cells.extend(row.intensities.iter().map(|v| fmt_f64(*v)));
            table.rows.push(cells);
        }
        table
    }

    /// Parse a table written by [`Self::to_tsv`]
    pub fn from_tsv(table: &TsvTable) -> FormatResult<Self> {
        let name_column = table.require_column(METABOLITE_COLUMN)?;
        let run_columns: Vec<usize> = (0..table.headers.len())
            .filter(|&c| c != name_column)
            .collect();
        let mut quant = Self::new(
            run_columns
                .iter()
                .map(|&c| table.headers[c].clone())
                .collect(),
        );
        for row in &table.rows {
            let name = table.cell(row, name_column).to_string();
            for (run, &column) in run_columns.iter().enumerate() {
                let cell = table.cell(row, column);
                let value = if cell.is_empty() {
                    0.0
                } else {
                    cell.parse::<f64>().map_err(|_| {
                        FormatError::invalid("table", format!("'{cell}' is not a number"))
                    })?
                };
                quant.add(&name, run, value);
            }
        }
        Ok(quant)
    }

    pub fn write(&self, path: &Path) -> FormatResult<()> {
        self.to_tsv().write(path)
    }

    pub fn read(path: &Path) -> FormatResult<Self> {
        Self::from_tsv(&TsvTable::read(path)?).map_err(|e| e.in_file(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> QuantificationTable {
        let mut t = QuantificationTable::new(vec!["A".to_string(), "B".to_string()]);
        t.add("Glucose#[M+H]+", 0, 100.0);
        t.add("Glucose#[M+Na]+", 0, 50.0);
        t.add("Glucose#[M+Na]+", 1, 20.0);
        t.add("Alanine", 1, 7.0);
        t
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("Glucose#[M+H]+"), "Glucose");
        assert_eq!(base_name("Alanine"), "Alanine");
        assert_eq!(base_name("#x"), "");
    }

    #[test]
    fn test_add_accumulates_and_keeps_order() {
        let mut t = table();
        t.add("Glucose#[M+H]+", 0, 1.0);
        assert_eq!(t.len(), 3);
        assert_eq!(t.rows[0].metabolite, "Glucose#[M+H]+");
        assert_eq!(t.get("Glucose#[M+H]+", "A"), Some(101.0));
        assert_eq!(t.get("Alanine", "A"), Some(0.0));
        assert_eq!(t.get("Alanine", "C"), None);
    }

    #[test]
    fn test_combined_sums_adducts() {
        let combined = table().combined();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.get("Glucose", "A"), Some(150.0));
        assert_eq!(combined.get("Glucose", "B"), Some(20.0));
        assert_eq!(combined.get("Alanine", "B"), Some(7.0));
    }

    #[test]
    fn test_tsv_round_trip() {
        let t = table();
        let parsed = QuantificationTable::from_tsv(&t.to_tsv()).unwrap();
        assert_eq!(parsed.runs, t.runs);
        assert_eq!(parsed.rows, t.rows);
    }
}
