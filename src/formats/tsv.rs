//! Tab-separated tables
//!
//! Result tables are written with a header row. Libraries are read by
//! column name, so extra columns and column order do not matter.

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use super::{FormatError, FormatResult};

/// A header row plus string cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TsvTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Index of a column, compared case-insensitively
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    }

    /// Index of a column that must exist
    pub fn require_column(&self, name: &str) -> FormatResult<usize> {
        self.column(name)
            .ok_or_else(|| FormatError::invalid("table", format!("missing column '{name}'")))
    }

    /// Cell of a row, empty when the row is short
    pub fn cell<'a>(&self, row: &'a [String], column: usize) -> &'a str {
        row.get(column).map(|s| s.trim()).unwrap_or("")
    }

    pub fn read(path: &Path) -> FormatResult<Self> {
        let file = File::open(path).map_err(|e| FormatError::from(e).in_file(path))?;
        Self::from_reader(BufReader::new(file)).map_err(|e| e.in_file(path))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> FormatResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .has_headers(true)
            .from_reader(reader);

        let headers = csv_reader
            .headers()?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();

        let mut table = Self::new(headers);
        for record in csv_reader.records() {
            let record = record?;
            if record.iter().all(|cell| cell.trim().is_empty()) {
                continue;
            }
            table.rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    pub fn write(&self, path: &Path) -> FormatResult<()> {
        let file = File::create(path).map_err(|e| FormatError::from(e).in_file(path))?;
        self.to_writer(file).map_err(|e| e.in_file(path))
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> FormatResult<()> {
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_writer(writer);
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// One compound of a targeted extraction library
#[derive(Debug, Clone, PartialEq)]
pub struct TargetCompound {
    /// Name, optionally `base#adduct`
    pub name: String,
    pub sum_formula: String,
    /// Neutral monoisotopic mass
    pub mass: f64,
    pub charge: i32,
    /// Expected retention times in seconds
    pub retention_times: Vec<f64>,
    /// Tolerated retention time deviation, 0 for the extraction default
    pub retention_time_range: f64,
    pub iso_distribution: Vec<f64>,
}

const LIBRARY_COLUMNS: [&str; 7] = [
    "CompoundName",
    "SumFormula",
    "Mass",
    "Charge",
    "RetentionTime",
    "RetentionTimeRange",
    "IsoDistribution",
];

/// Read a targeted extraction library
pub fn read_target_library(path: &Path) -> FormatResult<Vec<TargetCompound>> {
    let table = TsvTable::read(path)?;
    parse_target_library(&table).map_err(|e| e.in_file(path))
}

fn parse_target_library(table: &TsvTable) -> FormatResult<Vec<TargetCompound>> {
    let name = table.require_column("CompoundName")?;
    let retention = table.require_column("RetentionTime")?;
    let formula = table.column("SumFormula");
    let mass = table.column("Mass");
    let charge = table.column("Charge");
    let range = table.column("RetentionTimeRange");
    let iso = table.column("IsoDistribution");

    let mut compounds = Vec::with_capacity(table.rows.len());
    for (line, row) in table.rows.iter().enumerate() {
        let compound_name = table.cell(row, name);
        if compound_name.is_empty() {
            return Err(FormatError::invalid(
                "library",
                format!("row {} has no CompoundName", line + 2),
            ));
        }
        let number = |column: Option<usize>| -> FormatResult<f64> {
            match column.map(|c| table.cell(row, c)) {
                None | Some("") => Ok(0.0),
                Some(value) => value.parse().map_err(|_| {
                    FormatError::invalid(
                        "library",
                        format!("row {}: malformed number '{}'", line + 2, value),
                    )
                }),
            }
        };
        let list = |column: Option<usize>| -> FormatResult<Vec<f64>> {
            match column.map(|c| table.cell(row, c)) {
                None | Some("") => Ok(Vec::new()),
                Some(value) => value
                    .split(',')
                    .map(|v| v.trim().parse::<f64>())
                    .collect::<Result<_, _>>()
                    .map_err(|_| {
                        FormatError::invalid(
                            "library",
                            format!("row {}: malformed list '{}'", line + 2, value),
                        )
                    }),
            }
        };

        compounds.push(TargetCompound {
            name: compound_name.to_string(),
            sum_formula: formula.map(|c| table.cell(row, c)).unwrap_or("").to_string(),
            mass: number(mass)?,
            charge: number(charge)? as i32,
            retention_times: list(Some(retention))?,
            retention_time_range: number(range)?,
            iso_distribution: list(iso)?,
        });
    }
    Ok(compounds)
}

/// Write a targeted extraction library
pub fn write_target_library(path: &Path, compounds: &[TargetCompound]) -> FormatResult<()> {
    let mut table = TsvTable::new(LIBRARY_COLUMNS.iter().map(|c| c.to_string()).collect());
    for compound in compounds {
        table.rows.push(vec![
            compound.name.clone(),
            compound.sum_formula.clone(),
            compound.mass.to_string(),
            compound.charge.to_string(),
            join(&compound.retention_times),
            compound.retention_time_range.to_string(),
            join(&compound.iso_distribution),
        ]);
    }
    table.write(path)
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
