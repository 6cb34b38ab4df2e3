//! Pipeline configuration types
//!
//! One [`PipelineRunConfig`] is built per execution, from a file, from
//! command line flags, or both. It is validated once, before the working
//! tree is touched, and every stage receives its parameters from it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};
use crate::stages::{
    LIBRARY_KEY, MS1_BOUNDARY_KEY, MS1_LIBRARY_KEY, MS1_MZ_WINDOW_KEY, MS1_RT_WINDOW_KEY,
    ParamValue, SOURCES_KEY, StageConfig, StageId, TIME_UNIT_KEY, ToolsConfig,
};
use crate::formats::tsv::read_target_library;
use crate::storage::RunId;
use crate::tables::{RESERVED_RUN_NAMES, TimeUnit, WindowBoundary, read_ms1_library};

/// `formula:charge:probability`, e.g. `H:+:0.9` or `H-2O-1:0:0.4`
static ADDUCT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9\-]*:(\++|-+|0):(\d+(\.\d*)?|\.\d+)$").unwrap());

/// Default adducts in positive ion mode
pub const POSITIVE_ADDUCTS: [&str; 4] = ["H:+:0.9", "Na:+:0.1", "H-2O-1:0:0.4", "H-4O-2:0:0.1"];

/// Default adducts in negative ion mode
pub const NEGATIVE_ADDUCTS: [&str; 1] = ["H:-:1.0"];

/// Which workflow a run executes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    #[default]
    Untargeted,
    Targeted,
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Untargeted => write!(f, "untargeted"),
            Self::Targeted => write!(f, "targeted"),
        }
    }
}

impl std::str::FromStr for Workflow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "untargeted" => Ok(Self::Untargeted),
            "targeted" => Ok(Self::Targeted),
            _ => Err(format!("Unknown workflow: {}", s)),
        }
    }
}

/// Feature detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub mass_error_ppm: f64,
    pub noise_threshold_int: f64,
    pub remove_single_traces: bool,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            mass_error_ppm: 10.0,
            noise_threshold_int: 1000.0,
            remove_single_traces: true,
        }
    }
}

/// Map alignment parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub mz_max_difference: f64,
    /// `ppm` or `Da`
    pub mz_unit: String,
    pub rt_max_difference: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            mz_max_difference: 10.0,
            mz_unit: "ppm".to_string(),
            rt_max_difference: 100.0,
        }
    }
}

/// Adduct detection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdductConfig {
    pub enabled: bool,
    /// Polarity defaults apply when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub potential_adducts: Option<Vec<String>>,
    pub charge_min: i64,
    pub charge_max: i64,
    pub max_neutrals: i64,
    pub negative_mode: bool,
}

impl Default for AdductConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            potential_adducts: None,
            charge_min: 1,
            charge_max: 3,
            max_neutrals: 2,
            negative_mode: false,
        }
    }
}

impl AdductConfig {
    /// Adducts handed to decharging: the configured list, or the defaults of the ion mode
    pub fn adducts(&self) -> Vec<String> {
        match &self.potential_adducts {
            Some(adducts) => adducts.clone(),
            None => {
                let defaults: &[&str] = if self.negative_mode {
                    &NEGATIVE_ADDUCTS
                } else {
                    &POSITIVE_ADDUCTS
                };
                defaults.iter().map(|s| s.to_string()).collect()
            }
        }
    }
}

/// Feature linking parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    pub mz_tol: f64,
    pub rt_tol: f64,
    /// `ppm` or `Da`
    pub mz_unit: String,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            mz_tol: 10.0,
            rt_tol: 30.0,
            mz_unit: "ppm".to_string(),
        }
    }
}

/// Re-quantification of missing values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequantConfig {
    pub enabled: bool,
    pub mz_window: f64,
    pub peak_width: f64,
    pub rt_window: f64,
    pub n_isotopes: i64,
}

impl Default for RequantConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mz_window: 10.0,
            peak_width: 60.0,
            rt_window: 60.0,
            n_isotopes: 2,
        }
    }
}

/// MS1 annotation by m/z and retention time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub enabled: bool,
    /// Table with the columns `name`, `mz` and `RT` (seconds)
    pub library: Option<PathBuf>,
    pub mz_window_ppm: f64,
    /// Full window width around the apex
    pub rt_window_sec: f64,
    pub boundary: WindowBoundary,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            library: None,
            mz_window_ppm: 10.0,
            rt_window_sec: 60.0,
            boundary: WindowBoundary::Inclusive,
        }
    }
}

/// Optional exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub sirius: bool,
    pub gnps: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            sirius: true,
            gnps: false,
        }
    }
}

/// Targeted workflow settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetedConfig {
    /// Compound library for targeted extraction
    pub library: Option<PathBuf>,
    pub time_unit: TimeUnit,
}

/// Main pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineRunConfig {
    /// Name of the pipeline run
    pub name: Option<String>,
    pub workflow: Workflow,
    /// Raw runs (mzML files)
    pub runs: Vec<PathBuf>,
    /// Results root; wiped at the start of every run
    pub results_dir: PathBuf,
    /// Worker threads for per-run fan-out; all cores when unset
    pub threads: Option<usize>,
    /// Verbose output
    pub verbose: bool,
    /// Draw progress bars
    pub progress: bool,
    pub detection: DetectionConfig,
    pub alignment: AlignmentConfig,
    pub adducts: AdductConfig,
    pub linking: LinkingConfig,
    pub requantification: RequantConfig,
    pub annotation: AnnotationConfig,
    pub exports: ExportConfig,
    pub targeted: TargetedConfig,
    pub tools: ToolsConfig,
}

impl Default for PipelineRunConfig {
    fn default() -> Self {
        Self {
            name: None,
            workflow: Workflow::Untargeted,
            runs: Vec::new(),
            results_dir: PathBuf::from("results"),
            threads: None,
            verbose: false,
            progress: false,
            detection: DetectionConfig::default(),
            alignment: AlignmentConfig::default(),
            adducts: AdductConfig::default(),
            linking: LinkingConfig::default(),
            requantification: RequantConfig::default(),
            annotation: AnnotationConfig::default(),
            exports: ExportConfig::default(),
            targeted: TargetedConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl PipelineRunConfig {
    /// Create a new pipeline config
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a YAML (`.yaml`, `.yml`) or TOML (`.toml`) file
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension.as_deref() {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&text)?),
            Some("toml") => Ok(toml::from_str(&text)?),
            _ => Err(PipelineError::config(format!(
                "Unsupported configuration format: {} (expected .yaml, .yml or .toml)",
                path.display()
            ))),
        }
    }

    /// Render as YAML, e.g. for a starter file
    pub fn to_yaml(&self) -> PipelineResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Set the run name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the workflow
    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = workflow;
        self
    }

    /// Set the raw runs
    pub fn with_runs(mut self, runs: Vec<PathBuf>) -> Self {
        self.runs = runs;
        self
    }

    /// Set the results directory
    pub fn with_results_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_dir = path.into();
        self
    }

    /// Set the worker thread count
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Enable adduct detection
    pub fn with_adducts(mut self, enabled: bool) -> Self {
        self.adducts.enabled = enabled;
        self
    }

    /// Enable re-quantification of missing values
    pub fn with_requantification(mut self, enabled: bool) -> Self {
        self.requantification.enabled = enabled;
        self
    }

    /// Enable MS1 annotation against a library
    pub fn with_ms1_annotation(mut self, library: impl Into<PathBuf>) -> Self {
        self.annotation.enabled = true;
        self.annotation.library = Some(library.into());
        self
    }

    /// Toggle the SIRIUS export, on by default
    pub fn with_sirius_export(mut self, enabled: bool) -> Self {
        self.exports.sirius = enabled;
        self
    }

    /// Enable GNPS export
    pub fn with_gnps_export(mut self, enabled: bool) -> Self {
        self.exports.gnps = enabled;
        self
    }

    /// Set the targeted extraction library
    pub fn with_target_library(mut self, library: impl Into<PathBuf>) -> Self {
        self.targeted.library = Some(library.into());
        self
    }

    /// Set the tool backend settings
    pub fn with_tools(mut self, tools: ToolsConfig) -> Self {
        self.tools = tools;
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Draw progress bars
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Selected runs with their identities, in identity order
    pub fn selected_runs(&self) -> Result<Vec<(RunId, PathBuf)>, String> {
        let mut runs = Vec::with_capacity(self.runs.len());
        for path in &self.runs {
            let id = RunId::from_path(path)
                .ok_or_else(|| format!("Cannot derive a run name from '{}'", path.display()))?;
            runs.push((id, path.clone()));
        }
        runs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(runs)
    }

    /// Validate the configuration, returning the first problem found
    pub fn validate(&self) -> Result<(), String> {
        if self.runs.is_empty() {
            return Err("No runs selected".to_string());
        }

        let runs = self.selected_runs()?;
        let mut seen = HashSet::new();
        for (id, path) in &runs {
            if !seen.insert(id) {
                return Err(format!(
                    "Run '{}' is selected more than once ({})",
                    id,
                    path.display()
                ));
            }
            if RESERVED_RUN_NAMES
                .iter()
                .any(|name| id.as_str().eq_ignore_ascii_case(name))
            {
                return Err(format!(
                    "Run name '{}' clashes with a feature matrix column ({})",
                    id,
                    path.display()
                ));
            }
        }

        if self.threads == Some(0) {
            return Err("threads must be at least 1".to_string());
        }

        match self.workflow {
            Workflow::Untargeted => self.validate_untargeted(),
            Workflow::Targeted => {
                let Some(library) = &self.targeted.library else {
                    return Err("The targeted workflow needs a compound library".to_string());
                };
                check_library("Compound library", library, read_target_library)?;
                self.validate_requantification()
            }
        }
    }

    fn validate_untargeted(&self) -> Result<(), String> {
        positive("detection.mass_error_ppm", self.detection.mass_error_ppm)?;
        if self.detection.noise_threshold_int < 0.0 {
            return Err("detection.noise_threshold_int must not be negative".to_string());
        }
        positive("alignment.mz_max_difference", self.alignment.mz_max_difference)?;
        positive("alignment.rt_max_difference", self.alignment.rt_max_difference)?;
        mz_unit("alignment.mz_unit", &self.alignment.mz_unit)?;
        positive("linking.mz_tol", self.linking.mz_tol)?;
        positive("linking.rt_tol", self.linking.rt_tol)?;
        mz_unit("linking.mz_unit", &self.linking.mz_unit)?;

        if self.adducts.enabled {
            let adducts = self.adducts.adducts();
            if adducts.is_empty() {
                return Err("Adduct detection is enabled but no adducts are given".to_string());
            }
            for adduct in &adducts {
                validate_adduct(adduct)?;
            }
            if self.adducts.charge_min < 1 {
                return Err(format!(
                    "adducts.charge_min must be at least 1, got {}",
                    self.adducts.charge_min
                ));
            }
            if self.adducts.charge_min > self.adducts.charge_max {
                return Err(format!(
                    "adducts.charge_min ({}) is greater than adducts.charge_max ({})",
                    self.adducts.charge_min, self.adducts.charge_max
                ));
            }
        }

        if self.requantification.enabled {
            self.validate_requantification()?;
        }

        if self.annotation.enabled {
            let Some(library) = &self.annotation.library else {
                return Err("MS1 annotation is enabled but no annotation library is given".to_string());
            };
            check_library("MS1 annotation library", library, read_ms1_library)?;
            positive("annotation.mz_window_ppm", self.annotation.mz_window_ppm)?;
            positive("annotation.rt_window_sec", self.annotation.rt_window_sec)?;
        }
        Ok(())
    }

    fn validate_requantification(&self) -> Result<(), String> {
        positive("requantification.mz_window", self.requantification.mz_window)?;
        positive("requantification.peak_width", self.requantification.peak_width)?;
        positive("requantification.rt_window", self.requantification.rt_window)?;
        if self.requantification.n_isotopes < 1 {
            return Err("requantification.n_isotopes must be at least 1".to_string());
        }
        Ok(())
    }

    /// Parameters of one stage, resolved from this configuration
    pub fn stage_config(&self, stage: StageId) -> StageConfig {
        match stage {
            StageId::Stage => {
                let sources: Vec<String> = self
                    .runs
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                let config = StageConfig::new().with(SOURCES_KEY, sources);
                match (self.workflow, &self.targeted.library) {
                    (Workflow::Targeted, Some(library)) => {
                        config.with(LIBRARY_KEY, library.display().to_string())
                    }
                    _ => config,
                }
            }
            StageId::Detect => StageConfig::new()
                .with("mass_error_ppm", self.detection.mass_error_ppm)
                .with("noise_threshold_int", self.detection.noise_threshold_int)
                .with("remove_single_traces", self.detection.remove_single_traces),
            StageId::AlignMaps => StageConfig::new()
                .with("max_num_peaks_considered", -1)
                .with("superimposer:mz_pair_max_distance", 0.05)
                .with(
                    "pairfinder:distance_MZ:max_difference",
                    self.alignment.mz_max_difference,
                )
                .with("pairfinder:distance_MZ:unit", self.alignment.mz_unit.as_str())
                .with(
                    "pairfinder:distance_RT:max_difference",
                    self.alignment.rt_max_difference,
                ),
            StageId::Decharge => self.decharge_config(3.0),
            StageId::RequantDecharge => self.decharge_config(4.0),
            StageId::Link | StageId::RequantLink => StageConfig::new()
                .with("link:mz_tol", self.linking.mz_tol)
                .with("link:rt_tol", self.linking.rt_tol)
                .with("mz_unit", self.linking.mz_unit.as_str()),
            StageId::BuildTargets => {
                StageConfig::new().with("negative_mode", self.adducts.negative_mode)
            }
            StageId::Requantify | StageId::TargetedExtract => StageConfig::new()
                .with("detect:peak_width", self.requantification.peak_width)
                .with("extract:mz_window", self.requantification.mz_window)
                .with("extract:n_isotopes", self.requantification.n_isotopes)
                .with("extract:rt_window", self.requantification.rt_window),
            StageId::AssembleTables => match (self.annotation.enabled, &self.annotation.library) {
                (true, Some(library)) => StageConfig::new()
                    .with(MS1_LIBRARY_KEY, library.display().to_string())
                    .with(MS1_MZ_WINDOW_KEY, self.annotation.mz_window_ppm)
                    .with(MS1_RT_WINDOW_KEY, self.annotation.rt_window_sec)
                    .with(MS1_BOUNDARY_KEY, self.annotation.boundary.to_string()),
                _ => StageConfig::new(),
            },
            StageId::TargetedTables => {
                StageConfig::new().with(TIME_UNIT_KEY, self.targeted.time_unit.to_string())
            }
            _ => StageConfig::new(),
        }
    }

    fn decharge_config(&self, retention_max_diff: f64) -> StageConfig {
        StageConfig::new()
            .with(
                "potential_adducts",
                ParamValue::List(self.adducts.adducts()),
            )
            .with("charge_min", self.adducts.charge_min)
            .with("charge_max", self.adducts.charge_max)
            .with("max_neutrals", self.adducts.max_neutrals)
            .with("negative_mode", self.adducts.negative_mode)
            .with("retention_max_diff", retention_max_diff)
            .with("retention_max_diff_local", retention_max_diff)
    }
}

/// A library must exist and parse before any stage runs
fn check_library<T, E: std::fmt::Display>(
    what: &str,
    path: &Path,
    read: impl Fn(&Path) -> Result<Vec<T>, E>,
) -> Result<(), String> {
    if !path.is_file() {
        return Err(format!("{what} not found: {}", path.display()));
    }
    read(path)
        .map(|_| ())
        .map_err(|e| format!("{what} '{}' cannot be read: {e}", path.display()))
}

fn positive(name: &str, value: f64) -> Result<(), String> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(format!("{name} must be positive, got {value}"))
    }
}

fn mz_unit(name: &str, value: &str) -> Result<(), String> {
    match value.to_lowercase().as_str() {
        "ppm" | "da" => Ok(()),
        _ => Err(format!("{name} must be 'ppm' or 'Da', got '{value}'")),
    }
}

/// Check one `formula:charge:probability` adduct specification
pub fn validate_adduct(adduct: &str) -> Result<(), String> {
    if !ADDUCT_PATTERN.is_match(adduct) {
        return Err(format!(
            "Invalid adduct '{adduct}' (expected formula:charge:probability, e.g. H:+:0.9)"
        ));
    }
    let probability = adduct
        .rsplit(':')
        .next()
        .and_then(|p| p.parse::<f64>().ok())
        .unwrap_or(0.0);
    if probability <= 0.0 || probability > 1.0 {
        return Err(format!(
            "Invalid adduct '{adduct}': probability must be in (0, 1]"
        ));
    }
    Ok(())
}

/// Collect `*.mzML` files (or another glob pattern) from a directory
pub fn discover_runs(dir: &Path, pattern: &str) -> PipelineResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PipelineError::FileNotFound(dir.to_path_buf()));
    }
    let full = dir.join(pattern);
    let full = full
        .to_str()
        .ok_or_else(|| PipelineError::config(format!("Non UTF-8 path: {}", dir.display())))?;
    let mut runs: Vec<PathBuf> = glob::glob(full)
        .map_err(|e| PipelineError::config(format!("Invalid pattern '{pattern}': {e}")))?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    runs.sort();
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> PipelineRunConfig {
        PipelineRunConfig::new().with_runs(vec![
            PathBuf::from("/data/B.mzML"),
            PathBuf::from("/data/A.mzML"),
        ])
    }

    #[test]
    fn test_defaults_validate() {
        assert!(config().validate().is_ok());
        assert_eq!(
            PipelineRunConfig::new().validate(),
            Err("No runs selected".to_string())
        );
    }

    #[test]
    fn test_selected_runs_sorted() {
        let runs = config().selected_runs().unwrap();
        assert_eq!(runs[0].0.as_str(), "A");
        assert_eq!(runs[1].0.as_str(), "B");
    }

    #[test]
    fn test_duplicate_runs_rejected() {
        let config = PipelineRunConfig::new().with_runs(vec![
            PathBuf::from("/data/one/A.mzML"),
            PathBuf::from("/data/two/A.mzML"),
        ]);
        assert!(config.validate().unwrap_err().contains("more than once"));
    }

    #[test]
    fn test_run_names_clashing_with_columns() {
        for name in ["provenance", "MS1 annotation", "Provenance"] {
            let config = PipelineRunConfig::new()
                .with_runs(vec![PathBuf::from(format!("/data/{name}.mzML"))]);
            assert!(config.validate().unwrap_err().contains("clashes"), "{name}");
        }
    }

    #[test]
    fn test_branch_requirements() {
        let mut c = config();
        c.annotation.enabled = true;
        assert!(c.validate().unwrap_err().contains("annotation library"));

        let c = config().with_workflow(Workflow::Targeted);
        assert!(c.validate().unwrap_err().contains("compound library"));

        let mut c = config();
        c.adducts.charge_min = 3;
        c.adducts.charge_max = 1;
        assert!(c.validate().unwrap_err().contains("charge_min"));

        let mut c = config();
        c.linking.rt_tol = 0.0;
        assert!(c.validate().unwrap_err().contains("linking.rt_tol"));

        // Disabled adduct detection ignores adduct settings
        let mut c = config().with_adducts(false);
        c.adducts.potential_adducts = Some(vec!["nonsense".to_string()]);
        assert!(c.validate().is_ok());

        let mut c = config();
        c.adducts.potential_adducts = Some(Vec::new());
        assert!(c.validate().unwrap_err().contains("no adducts"));
    }

    #[test]
    fn test_libraries_checked_before_running() {
        let dir = TempDir::new().unwrap();

        let missing = dir.path().join("missing.tsv");
        let c = config().with_ms1_annotation(&missing);
        assert!(c.validate().unwrap_err().contains("not found"));
        let c = config()
            .with_workflow(Workflow::Targeted)
            .with_target_library(&missing);
        assert!(c.validate().unwrap_err().contains("not found"));

        let malformed = dir.path().join("malformed.tsv");
        std::fs::write(&malformed, "compound\tmass\nAlanine\t89.05\n").unwrap();
        let c = config().with_ms1_annotation(&malformed);
        assert!(c.validate().unwrap_err().contains("cannot be read"));
        let c = config()
            .with_workflow(Workflow::Targeted)
            .with_target_library(&malformed);
        assert!(c.validate().unwrap_err().contains("cannot be read"));

        let ms1 = dir.path().join("ms1.tsv");
        std::fs::write(&ms1, "name\tmz\tRT\nAlanine\t90.05\t60\n").unwrap();
        assert!(config().with_ms1_annotation(&ms1).validate().is_ok());
    }

    #[test]
    fn test_polarity_default_adducts() {
        let mut c = config();
        assert_eq!(c.adducts.adducts(), POSITIVE_ADDUCTS.to_vec());
        c.adducts.negative_mode = true;
        assert_eq!(c.adducts.adducts(), vec!["H:-:1.0".to_string()]);
        assert!(c.validate().is_ok());
        assert_eq!(
            c.stage_config(StageId::Decharge).get_list("potential_adducts"),
            Some(&["H:-:1.0".to_string()][..])
        );

        // An explicit list wins over the ion mode
        c.adducts.potential_adducts = Some(vec!["Cl:-:0.5".to_string()]);
        assert_eq!(c.adducts.adducts(), vec!["Cl:-:0.5".to_string()]);
    }

    #[test]
    fn test_sirius_export_on_by_default() {
        let c = config();
        assert!(c.exports.sirius);
        assert!(!c.exports.gnps);
        assert!(!c.annotation.enabled);
    }

    #[test]
    fn test_validate_adduct() {
        for adduct in ["H:+:0.9", "Na:+:0.1", "H-2O-1:0:0.4", "H-1:-:1", "Ca:++:.5"] {
            assert!(validate_adduct(adduct).is_ok(), "{adduct}");
        }
        for adduct in ["H+:0.9", "h:+:0.9", "H:+:1.5", "H:+:0", "H:x:0.5"] {
            assert!(validate_adduct(adduct).is_err(), "{adduct}");
        }
    }

    #[test]
    fn test_stage_configs() {
        let c = config();
        assert_eq!(
            c.stage_config(StageId::Decharge).get_f64("retention_max_diff"),
            Some(3.0)
        );
        assert_eq!(
            c.stage_config(StageId::RequantDecharge)
                .get_f64("retention_max_diff_local"),
            Some(4.0)
        );
        assert_eq!(
            c.stage_config(StageId::Link).get_str("mz_unit"),
            Some("ppm")
        );
        assert!(c.stage_config(StageId::AssembleTables).is_empty());

        let c = config().with_ms1_annotation("/lib/standards.tsv");
        let assemble = c.stage_config(StageId::AssembleTables);
        assert_eq!(assemble.get_str(MS1_LIBRARY_KEY), Some("/lib/standards.tsv"));
        assert_eq!(assemble.get_str(MS1_BOUNDARY_KEY), Some("inclusive"));
    }

    #[test]
    fn test_yaml_and_toml_files() {
        let dir = TempDir::new().unwrap();

        let yaml = dir.path().join("run.yaml");
        std::fs::write(
            &yaml,
            "runs: [/data/A.mzML]\nrequantification:\n  enabled: true\nlinking:\n  rt_tol: 20\n",
        )
        .unwrap();
        let c = PipelineRunConfig::from_file(&yaml).unwrap();
        assert!(c.requantification.enabled);
        assert_eq!(c.linking.rt_tol, 20.0);
        assert_eq!(c.linking.mz_tol, 10.0);

        let library = dir.path().join("targets.tsv");
        std::fs::write(
            &library,
            "CompoundName\tSumFormula\tMass\tCharge\tRetentionTime\tRetentionTimeRange\tIsoDistribution\n\
             Alanine\tC3H7NO2\t89.047678\t1\t1.0\t0\t0\n",
        )
        .unwrap();
        let toml_path = dir.path().join("run.toml");
        std::fs::write(
            &toml_path,
            format!(
                "workflow = \"targeted\"\nruns = [\"/data/A.mzML\"]\n\n[targeted]\nlibrary = {:?}\ntime_unit = \"minutes\"\n",
                library.display().to_string()
            ),
        )
        .unwrap();
        let c = PipelineRunConfig::from_file(&toml_path).unwrap();
        assert_eq!(c.workflow, Workflow::Targeted);
        assert_eq!(c.targeted.time_unit, TimeUnit::Minutes);
        assert!(c.validate().is_ok());

        let other = dir.path().join("run.json");
        std::fs::write(&other, "{}").unwrap();
        assert!(matches!(
            PipelineRunConfig::from_file(&other),
            Err(PipelineError::ConfigError(_))
        ));
    }

    #[test]
    fn test_yaml_round_trip() {
        let c = config().with_requantification(true).with_threads(2);
        let parsed: PipelineRunConfig = serde_yaml::from_str(&c.to_yaml().unwrap()).unwrap();
        assert_eq!(parsed, c);
    }

    #[test]
    fn test_discover_runs() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.mzML"), "").unwrap();
        std::fs::write(dir.path().join("a.mzML"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        let runs = discover_runs(dir.path(), "*.mzML").unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs[0].ends_with("a.mzML"));
    }
}
