//! Pipeline tests against an in-process processing backend

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;
use umetaflow::consensus::PROTON_MASS;
use umetaflow::formats::tsv::read_target_library;
use umetaflow::formats::{read_feature_map, write_feature_map};
use umetaflow::model::{DECHARGE_ADDUCTS, LABEL, MetaValue, derive_unique_id};
use umetaflow::pipeline::{
    Checkpoint, PipelineError, PipelineExecutor, PipelineRunConfig, PipelineState,
    PipelineStatus, Workflow,
};
use umetaflow::stages::{BackendError, BackendResult, ProcessingBackend, StageConfig};
use umetaflow::tables::{FeatureMatrix, QuantificationTable};
use umetaflow::{CancellationToken, Feature, FeatureMap, StageId};

/// Input paths handed to the backend, per operation
type Inputs = Arc<Mutex<Vec<(&'static str, PathBuf)>>>;

/// Backend reading fake runs made of `mz rt intensity` lines
#[derive(Default)]
struct FakeBackend {
    fail_on: Option<&'static str>,
    cancel_on_detect: Option<CancellationToken>,
    calls: Mutex<Vec<String>>,
    inputs: Inputs,
}

impl FakeBackend {
    fn failing(operation: &'static str) -> Self {
        Self {
            fail_on: Some(operation),
            ..Self::default()
        }
    }

    /// Backend plus a handle on the inputs it receives
    fn recording() -> (Self, Inputs) {
        let backend = Self::default();
        let inputs = Arc::clone(&backend.inputs);
        (backend, inputs)
    }

    fn record(&self, operation: &'static str, path: &Path) {
        self.inputs
            .lock()
            .unwrap()
            .push((operation, path.to_path_buf()));
    }

    fn enter(&self, operation: &str) -> BackendResult<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.fail_on == Some(operation) {
            return Err(BackendError::ToolFailed {
                tool: operation.to_string(),
                exit_code: Some(1),
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

fn copy(from: &Path, to: &Path) -> BackendResult<()> {
    std::fs::copy(from, to)?;
    Ok(())
}

impl ProcessingBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    fn detect_features(&self, run: &Path, output: &Path, _config: &StageConfig) -> BackendResult<()> {
        self.enter("detect")?;
        if let Some(token) = &self.cancel_on_detect {
            token.cancel();
        }
        let text = std::fs::read_to_string(run)?;
        let features = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                let values: Vec<f64> = line
                    .split_whitespace()
                    .map(|v| v.parse().unwrap())
                    .collect();
                Feature::new(i as u64 + 1, values[1], values[0], values[2])
            })
            .collect();
        write_feature_map(output, &FeatureMap::new(features))?;
        Ok(())
    }

    fn align_maps(
        &self,
        maps: &[PathBuf],
        aligned: &[PathBuf],
        transformations: &[PathBuf],
        _config: &StageConfig,
    ) -> BackendResult<()> {
        self.enter("align")?;
        for ((map, out), trafo) in maps.iter().zip(aligned).zip(transformations) {
            copy(map, out)?;
            std::fs::write(trafo, "identity")?;
        }
        Ok(())
    }

    fn apply_transformation(
        &self,
        run: &Path,
        transformation: &Path,
        output: &Path,
    ) -> BackendResult<()> {
        self.enter("transform")?;
        self.record("transform", transformation);
        if std::fs::read_to_string(transformation)? != "identity" {
            return Err(BackendError::ToolFailed {
                tool: "transform".to_string(),
                exit_code: Some(1),
                stderr: format!("not a transformation: {}", transformation.display()),
            });
        }
        copy(run, output)
    }

    fn decharge(&self, map: &Path, output: &Path, _config: &StageConfig) -> BackendResult<()> {
        self.enter("decharge")?;
        let mut features = read_feature_map(map)?;
        for feature in &mut features.features {
            feature
                .meta
                .insert(DECHARGE_ADDUCTS.to_string(), MetaValue::from("[M+H]+"));
        }
        write_feature_map(output, &features)?;
        Ok(())
    }

    fn map_identifications(&self, _run: &Path, map: &Path, output: &Path) -> BackendResult<()> {
        self.enter("map-ids")?;
        self.record("map-ids", map);
        copy(map, output)
    }

    fn requantify(
        &self,
        _run: &Path,
        library: &Path,
        output: &Path,
        _config: &StageConfig,
    ) -> BackendResult<()> {
        self.enter("requantify")?;
        let features = read_target_library(library)?
            .into_iter()
            .map(|compound| {
                let z = compound.charge.unsigned_abs().max(1) as f64;
                let mz = (compound.mass + PROTON_MASS * z) / z;
                let rt = compound.retention_times.first().copied().unwrap_or(0.0);
                Feature::new(derive_unique_id(&[compound.name.as_bytes()]), rt, mz, 1000.0)
                    .with_charge(compound.charge)
                    .with_meta(LABEL, MetaValue::from(compound.name.as_str()))
            })
            .collect();
        write_feature_map(output, &FeatureMap::new(features))?;
        Ok(())
    }

    fn export_sirius(
        &self,
        runs: &[PathBuf],
        maps: &[PathBuf],
        output_dir: &Path,
    ) -> BackendResult<()> {
        self.enter("sirius")?;
        for map in maps {
            self.record("sirius", map);
        }
        for run in runs {
            let stem = run.file_stem().unwrap().to_string_lossy();
            std::fs::write(output_dir.join(format!("{stem}.ms")), "")?;
        }
        Ok(())
    }

    fn export_gnps(
        &self,
        consensus: &Path,
        _runs: &[PathBuf],
        output_dir: &Path,
    ) -> BackendResult<()> {
        self.enter("gnps")?;
        self.record("gnps", consensus);
        std::fs::write(output_dir.join("MS2.mgf"), "")?;
        Ok(())
    }
}

/// Write fake runs; each run is a list of (mz, rt, intensity)
fn write_runs(dir: &Path, runs: &[(&str, &[(f64, f64, f64)])]) -> Vec<PathBuf> {
    let input = dir.join("input");
    std::fs::create_dir_all(&input).unwrap();
    runs.iter()
        .map(|(name, peaks)| {
            let path = input.join(format!("{name}.mzML"));
            let text: String = peaks
                .iter()
                .map(|(mz, rt, intensity)| format!("{mz} {rt} {intensity}\n"))
                .collect();
            std::fs::write(&path, text).unwrap();
            path
        })
        .collect()
}

const FULL: &[(f64, f64, f64)] = &[(200.1, 100.0, 5.0e5), (350.2, 240.0, 2.0e5)];
const PARTIAL: &[(f64, f64, f64)] = &[(200.1, 101.0, 4.0e5)];

fn config(dir: &TempDir, runs: Vec<PathBuf>) -> PipelineRunConfig {
    PipelineRunConfig::new()
        .with_runs(runs)
        .with_results_dir(dir.path().join("results"))
        .with_threads(2)
}

/// Sorted input paths one operation received
fn inputs_of(inputs: &Inputs, operation: &str) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = inputs
        .lock()
        .unwrap()
        .iter()
        .filter(|(op, _)| *op == operation)
        .map(|(_, path)| path.clone())
        .collect();
    paths.sort();
    paths
}

fn parent_name(path: &Path) -> &str {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap()
}

fn run(config: PipelineRunConfig, backend: FakeBackend) -> (PipelineExecutor, Result<(), PipelineError>) {
    let mut executor = PipelineExecutor::with_backend(config, Box::new(backend));
    let result = executor.run().map(|_| ());
    (executor, result)
}

mod untargeted_tests {
    use super::*;

    #[test]
    fn test_basic_run_writes_tables() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL), ("c", FULL)]);
        let (executor, result) = run(config(&dir, runs), FakeBackend::default());
        result.unwrap();

        let results = dir.path().join("results");
        let matrix = FeatureMatrix::read(&results.join("FeatureMatrix.tsv")).unwrap();
        assert_eq!(matrix.runs, vec!["a", "b", "c"]);
        assert_eq!(matrix.len(), 2);
        assert_eq!(matrix.missing_values(), 0);
        assert!(matrix.rows.iter().all(|r| r.adduct.as_deref() == Some("[M+H]+")));
        assert!(results.join("MetaData.tsv").exists());
        assert!(results.join("SIRIUS/a.ms").exists());
        assert!(!results.join("GNPS").exists());
        assert!(!results.join("FeatureMatrixRequantified.tsv").exists());
        assert!(results.join("interim/mzML_original/a.mzML").exists());

        let checkpoint = executor.checkpoint().unwrap();
        assert_eq!(checkpoint.status, PipelineStatus::Completed);
        assert_eq!(checkpoint.state, PipelineState::Complete);

        let saved = Checkpoint::load(&results.join("pipeline.checkpoint.json")).unwrap();
        assert_eq!(saved.completed_stages, checkpoint.completed_stages);
    }

    #[test]
    fn test_run_count_does_not_change_outcome() {
        for count in [1usize, 2, 5] {
            let dir = TempDir::new().unwrap();
            let names: Vec<String> = (0..count).map(|i| format!("run_{i}")).collect();
            let specs: Vec<(&str, &[(f64, f64, f64)])> =
                names.iter().map(|n| (n.as_str(), FULL)).collect();
            let runs = write_runs(dir.path(), &specs);

            let (executor, result) = run(config(&dir, runs), FakeBackend::default());
            result.unwrap();

            let matrix =
                FeatureMatrix::read(&dir.path().join("results/FeatureMatrix.tsv")).unwrap();
            assert_eq!(matrix.runs.len(), count);
            assert_eq!(matrix.len(), 2);
            assert_eq!(
                executor.checkpoint().unwrap().status,
                PipelineStatus::Completed
            );
        }
    }

    #[test]
    fn test_empty_selection_is_config_error() {
        let dir = TempDir::new().unwrap();
        let backend = FakeBackend::default();
        let (executor, result) = run(config(&dir, Vec::new()), backend);

        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
        assert!(!dir.path().join("results").exists());
        assert!(executor.checkpoint().is_none());
    }

    #[test]
    fn test_decharge_toggle_changes_id_mapping_input() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL)]);

        let (executor, result) = run(config(&dir, runs.clone()), FakeBackend::default());
        result.unwrap();
        let input = executor.checkpoint().unwrap().stage_outputs["map-ids"].metadata["input"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(input.ends_with("FeatureMaps_decharged"));

        let (executor, result) = run(
            config(&dir, runs).with_adducts(false),
            FakeBackend::default(),
        );
        result.unwrap();
        let checkpoint = executor.checkpoint().unwrap();
        let input = checkpoint.stage_outputs["map-ids"].metadata["input"]
            .as_str()
            .unwrap();
        assert!(input.ends_with("FFM_aligned"));
        assert!(checkpoint.stage_outputs["decharge"].skipped);
        assert!(!checkpoint.is_stage_completed(StageId::Decharge));
    }

    #[test]
    fn test_requantification_keeps_both_tables() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL), ("c", PARTIAL)]);
        let (_, result) = run(
            config(&dir, runs).with_requantification(true),
            FakeBackend::default(),
        );
        result.unwrap();

        let results = dir.path().join("results");
        let first = FeatureMatrix::read(&results.join("FeatureMatrix.tsv")).unwrap();
        assert_eq!(first.missing_values(), 1);

        let requantified =
            FeatureMatrix::read(&results.join("FeatureMatrixRequantified.tsv")).unwrap();
        assert_eq!(requantified.runs, vec!["a", "b", "c"]);
        assert_eq!(requantified.missing_values(), 0);
        assert!(requantified.with_provenance);
        assert!(requantified.rows.iter().all(|r| r.provenance.is_some()));

        assert!(results.join("interim/FFM_complete.consensusXML").exists());
        assert!(results.join("interim/FFMID_library.tsv").exists());
    }

    #[test]
    fn test_ms1_annotation() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL)]);
        let library = dir.path().join("ms1_library.tsv");
        std::fs::write(&library, "name\tmz\tRT\nAlanine\t200.1\t110\n").unwrap();

        let (_, result) = run(
            config(&dir, runs).with_ms1_annotation(&library),
            FakeBackend::default(),
        );
        result.unwrap();

        let results = dir.path().join("results");
        let matrix = FeatureMatrix::read(&results.join("FeatureMatrix.tsv")).unwrap();
        let names: Vec<Option<&str>> = matrix
            .rows
            .iter()
            .map(|r| r.annotation.as_deref())
            .collect();
        assert!(names.contains(&Some("Alanine")));
        assert!(names.contains(&None));

        let annotated =
            QuantificationTable::read(&results.join("MS1-annotations/annotated.tsv")).unwrap();
        assert!(annotated.get("Alanine", "a").is_some());
        assert!(results.join("MS1-annotations/annotated_combined.tsv").exists());
    }

    #[test]
    fn test_exports() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL)]);
        let (_, result) = run(
            config(&dir, runs).with_sirius_export(true).with_gnps_export(true),
            FakeBackend::default(),
        );
        result.unwrap();

        let results = dir.path().join("results");
        assert!(results.join("SIRIUS/a.ms").exists());
        assert!(results.join("GNPS/MS2.mgf").exists());
    }
}

mod wiring_tests {
    use super::*;

    #[test]
    fn test_align_runs_reads_map_transformations() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL)]);
        let (backend, inputs) = FakeBackend::recording();
        let (_, result) = run(config(&dir, runs), backend);
        result.unwrap();

        let trafo = dir.path().join("results/interim/Trafo");
        assert_eq!(
            inputs_of(&inputs, "transform"),
            vec![trafo.join("a.trafoXML"), trafo.join("b.trafoXML")]
        );
    }

    #[test]
    fn test_requant_without_adducts_maps_merged_features() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", PARTIAL)]);
        let (backend, inputs) = FakeBackend::recording();
        let (executor, result) = run(
            config(&dir, runs)
                .with_requantification(true)
                .with_adducts(false),
            backend,
        );
        result.unwrap();

        let mapped: Vec<String> = inputs_of(&inputs, "map-ids")
            .iter()
            .map(|p| parent_name(p).to_string())
            .collect();
        assert_eq!(
            mapped,
            vec!["FFM_aligned", "FFM_aligned", "FeatureMaps_merged", "FeatureMaps_merged"]
        );

        let checkpoint = executor.checkpoint().unwrap();
        assert!(checkpoint.stage_outputs["requant-decharge"].skipped);
        let input = checkpoint.stage_outputs["requant-map-ids"].metadata["input"]
            .as_str()
            .unwrap();
        assert!(input.ends_with("FeatureMaps_merged"));
        assert!(dir
            .path()
            .join("results/FeatureMatrixRequantified.tsv")
            .exists());
    }

    #[test]
    fn test_exports_read_requantified_results() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", PARTIAL)]);
        let (backend, inputs) = FakeBackend::recording();
        let (_, result) = run(
            config(&dir, runs)
                .with_requantification(true)
                .with_gnps_export(true),
            backend,
        );
        result.unwrap();

        let maps = inputs_of(&inputs, "sirius");
        assert_eq!(maps.len(), 2);
        assert!(maps
            .iter()
            .all(|p| parent_name(p) == "FeatureMaps_requant_ID_mapped"));

        let consensus = inputs_of(&inputs, "gnps");
        assert_eq!(
            consensus,
            vec![dir
                .path()
                .join("results/interim/FeatureMatrixRequantified.consensusXML")]
        );
    }

    #[test]
    fn test_exports_read_first_pass_results_without_requant() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL)]);
        let (backend, inputs) = FakeBackend::recording();
        let (_, result) = run(config(&dir, runs).with_gnps_export(true), backend);
        result.unwrap();

        assert!(inputs_of(&inputs, "sirius")
            .iter()
            .all(|p| parent_name(p) == "FeatureMaps_ID_mapped"));
        assert_eq!(
            inputs_of(&inputs, "gnps"),
            vec![dir.path().join("results/interim/FeatureMatrix.consensusXML")]
        );
    }
}

mod failure_tests {
    use super::*;

    #[test]
    fn test_stage_failure_names_the_stage() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL)]);
        let (executor, result) = run(config(&dir, runs), FakeBackend::failing("decharge"));

        let err = result.unwrap_err();
        assert_eq!(err.stage_name(), Some("decharge"));
        assert!(err.to_string().contains("simulated failure"));

        let checkpoint = executor.checkpoint().unwrap();
        assert_eq!(checkpoint.status, PipelineStatus::Failed);
        assert_eq!(checkpoint.failed_stage, Some(StageId::Decharge));
        assert!(checkpoint.is_stage_completed(StageId::AlignRuns));
        assert!(!checkpoint.is_stage_completed(StageId::Link));
        assert!(!dir.path().join("results/FeatureMatrix.tsv").exists());
    }

    #[test]
    fn test_cancellation_stops_the_run() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", FULL), ("c", FULL)]);
        let token = CancellationToken::new();
        let backend = FakeBackend {
            cancel_on_detect: Some(token.clone()),
            ..FakeBackend::default()
        };

        let mut executor =
            PipelineExecutor::with_backend(config(&dir, runs).with_threads(1), Box::new(backend))
                .with_cancellation(token);
        let err = executor.run().unwrap_err();

        assert!(err.is_cancelled());
        let checkpoint = executor.checkpoint().unwrap();
        assert_eq!(checkpoint.status, PipelineStatus::Cancelled);
        assert!(!checkpoint.is_stage_completed(StageId::Link));
        assert!(!dir.path().join("results/FeatureMatrix.tsv").exists());
    }

    #[test]
    fn test_missing_library_leaves_results_untouched() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL)]);
        let previous = dir.path().join("results/FeatureMatrix.tsv");
        std::fs::create_dir_all(previous.parent().unwrap()).unwrap();
        std::fs::write(&previous, "previous run").unwrap();

        let (executor, result) = run(
            config(&dir, runs.clone()).with_ms1_annotation(dir.path().join("missing.tsv")),
            FakeBackend::default(),
        );
        let err = result.unwrap_err();
        assert!(matches!(err, PipelineError::ConfigError(_)));
        assert!(err.to_string().contains("missing.tsv"));
        assert!(executor.checkpoint().is_none());
        assert_eq!(std::fs::read_to_string(&previous).unwrap(), "previous run");

        let unreadable = dir.path().join("library.tsv");
        std::fs::write(&unreadable, "CompoundName\tMass\nAlanine\t89.05\n").unwrap();
        let (_, result) = run(
            config(&dir, runs)
                .with_workflow(Workflow::Targeted)
                .with_target_library(&unreadable),
            FakeBackend::default(),
        );
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
        assert_eq!(std::fs::read_to_string(&previous).unwrap(), "previous run");
    }

    #[test]
    fn test_results_directory_is_reset() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL)]);
        let stale = dir.path().join("results/interim/FFM/old.featureXML");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "stale").unwrap();

        let (_, result) = run(config(&dir, runs), FakeBackend::default());
        result.unwrap();
        assert!(!stale.exists());
    }
}

mod targeted_tests {
    use super::*;

    const LIBRARY: &str = "CompoundName\tSumFormula\tMass\tCharge\tRetentionTime\tRetentionTimeRange\tIsoDistribution\n\
        Glucose#[M+H]+\tC6H12O6\t180.063388\t1\t120\t0\t0\n\
        Glucose#[M+Na]+\tC6H12O6\t180.063388\t1\t120\t0\t0\n\
        Alanine\tC3H7NO2\t89.047678\t1\t60\t0\t0\n";

    #[test]
    fn test_targeted_tables() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("b", PARTIAL)]);
        let library = dir.path().join("library.tsv");
        std::fs::write(&library, LIBRARY).unwrap();

        let config = config(&dir, runs)
            .with_workflow(Workflow::Targeted)
            .with_target_library(&library);
        let (executor, result) = run(config, FakeBackend::default());
        result.unwrap();

        let results = dir.path().join("results");
        assert!(results.join("runs/a.tsv").exists());
        assert!(results.join("runs_AUC/b.tsv").exists());
        assert!(results.join("runs_AUC_combined/b.tsv").exists());
        assert!(results.join("interim/FFMID_library.tsv").exists());

        let summary = QuantificationTable::read(&results.join("summary.tsv")).unwrap();
        assert_eq!(summary.runs, vec!["a", "b"]);
        assert_eq!(summary.len(), 3);

        let combined = QuantificationTable::read(&results.join("summary_combined.tsv")).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.get("Glucose", "a"), Some(2000.0));

        let checkpoint = executor.checkpoint().unwrap();
        assert!(checkpoint.is_stage_completed(StageId::TargetedTables));
        assert!(!checkpoint.is_stage_completed(StageId::Detect));
    }

    #[test]
    fn test_suffixed_run_names_keep_their_own_tables() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL), ("a_AUC", PARTIAL)]);
        let library = dir.path().join("library.tsv");
        std::fs::write(&library, LIBRARY).unwrap();

        let config = config(&dir, runs)
            .with_workflow(Workflow::Targeted)
            .with_target_library(&library);
        let (_, result) = run(config, FakeBackend::default());
        result.unwrap();

        let results = dir.path().join("results");
        let auc = QuantificationTable::read(&results.join("runs_AUC/a.tsv")).unwrap();
        assert_eq!(auc.runs, vec!["a"]);
        let auc = QuantificationTable::read(&results.join("runs_AUC/a_AUC.tsv")).unwrap();
        assert_eq!(auc.runs, vec!["a_AUC"]);
        let combined =
            QuantificationTable::read(&results.join("runs_AUC_combined/a.tsv")).unwrap();
        assert_eq!(combined.runs, vec!["a"]);
        assert!(results.join("runs/a.tsv").exists());
        assert!(results.join("runs/a_AUC.tsv").exists());

        let summary = QuantificationTable::read(&results.join("summary.tsv")).unwrap();
        assert_eq!(summary.runs, vec!["a", "a_AUC"]);
    }

    #[test]
    fn test_targeted_requires_library() {
        let dir = TempDir::new().unwrap();
        let runs = write_runs(dir.path(), &[("a", FULL)]);
        let (_, result) = run(
            config(&dir, runs).with_workflow(Workflow::Targeted),
            FakeBackend::default(),
        );
        assert!(matches!(result, Err(PipelineError::ConfigError(_))));
    }
}
