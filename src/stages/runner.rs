//! Uniform execution of one stage
//!
//! A [`StageInvocation`] names the stage, its typed input and output
//! artifacts and its parameters. The runner checks the declared contract,
//! creates output locations, then dispatches either to the processing
//! backend or to the in-process consensus and table operations. Per-run
//! work fans out over the pipeline's thread pool and the runner waits for
//! every task before returning.

use std::collections::HashMap;
use std::path::PathBuf;

use rayon::ThreadPool;
use rayon::prelude::*;
use serde_json::json;
use tracing::{debug, debug_span, info, warn};

use super::{ProcessingBackend, StageConfig, StageExecutionError, StageFailure, StageId, StageKind};
use crate::cancel::CancellationToken;
use crate::consensus::{filter_to_consensus, merge_feature_maps, split, targets_from_missing};
use crate::formats::tsv::write_target_library;
use crate::formats::{read_consensus_map, read_feature_map, write_consensus_map, write_feature_map};
use crate::model::FeatureMap;
use crate::progress::RunProgress;
use crate::storage::{ArtifactKind, ArtifactRef, ArtifactStore, RunId, StorageError};
use crate::tables::{
    AnnotationParams, FeatureMatrix, QuantificationTable, TimeUnit, WindowBoundary,
    annotate_matrix, annotated_table, auc_table, feature_matrix, metadata_table,
    read_ms1_library, run_table, summary_table,
};

/// Config key holding the raw run paths to stage
pub const SOURCES_KEY: &str = "sources";
/// Config key holding a user library to stage
pub const LIBRARY_KEY: &str = "library";
/// Annotation library of the table assembly
pub const MS1_LIBRARY_KEY: &str = "ms1:library";
pub const MS1_MZ_WINDOW_KEY: &str = "ms1:mz_window_ppm";
pub const MS1_RT_WINDOW_KEY: &str = "ms1:rt_window_sec";
pub const MS1_BOUNDARY_KEY: &str = "ms1:boundary";
/// Retention time unit of targeted run tables
pub const TIME_UNIT_KEY: &str = "time_unit";

const ANNOTATED_FILE: &str = "annotated.tsv";
const ANNOTATED_COMBINED_FILE: &str = "annotated_combined.tsv";

/// One stage with its resolved artifacts and parameters
#[derive(Debug, Clone, PartialEq)]
pub struct StageInvocation {
    pub id: StageId,
    pub inputs: Vec<ArtifactRef>,
    pub outputs: Vec<ArtifactRef>,
    pub config: StageConfig,
}

impl StageInvocation {
    pub fn new(id: StageId) -> Self {
        Self {
            id,
            inputs: Vec::new(),
            outputs: Vec::new(),
            config: StageConfig::new(),
        }
    }

    pub fn with_input(mut self, artifact: ArtifactRef) -> Self {
        self.inputs.push(artifact);
        self
    }

    pub fn with_output(mut self, artifact: ArtifactRef) -> Self {
        self.outputs.push(artifact);
        self
    }

    pub fn with_config(mut self, config: StageConfig) -> Self {
        self.config = config;
        self
    }

    /// Check input arity, required keys and output kinds
    pub fn check_contract(&self) -> Result<(), StageFailure> {
        let spec = self.id.kind().spec();
        if self.inputs.len() < spec.min_inputs || self.inputs.len() > spec.max_inputs {
            return Err(StageFailure::Arity {
                min: spec.min_inputs,
                max: spec.max_inputs,
                actual: self.inputs.len(),
            });
        }

        let missing = self.config.missing_keys(spec.required_keys);
        if !missing.is_empty() {
            return Err(StageFailure::MissingKeys(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }

        if self.outputs.is_empty()
            || self
                .outputs
                .iter()
                .any(|o| !spec.produces.contains(&o.kind))
        {
            return Err(StageFailure::Outputs {
                expected: spec
                    .produces
                    .iter()
                    .map(|k| format!("{:?}", k))
                    .collect::<Vec<_>>()
                    .join(" | "),
                actual: self.outputs.len(),
            });
        }
        Ok(())
    }

    fn input(&self, position: usize) -> Result<&ArtifactRef, StageFailure> {
        let spec = self.id.kind().spec();
        self.inputs.get(position).ok_or(StageFailure::Arity {
            min: spec.min_inputs,
            max: spec.max_inputs,
            actual: self.inputs.len(),
        })
    }

    fn input_of(&self, kind: ArtifactKind) -> Option<&ArtifactRef> {
        self.inputs.iter().find(|a| a.kind == kind)
    }

    fn output_of(&self, kind: ArtifactKind) -> Result<&ArtifactRef, StageFailure> {
        self.outputs
            .iter()
            .find(|a| a.kind == kind)
            .ok_or_else(|| StageFailure::Outputs {
                expected: format!("{:?}", kind),
                actual: self.outputs.len(),
            })
    }

    fn first_output(&self) -> Result<&ArtifactRef, StageFailure> {
        self.outputs.first().ok_or_else(|| StageFailure::Outputs {
            expected: "1".to_string(),
            actual: 0,
        })
    }
}

/// What a finished stage wrote
#[derive(Debug, Clone, Default)]
pub struct StageOutcome {
    pub files: Vec<PathBuf>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StageOutcome {
    fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// Executes stage invocations for one pipeline run
pub struct StageRunner<'a> {
    backend: &'a dyn ProcessingBackend,
    store: &'a ArtifactStore,
    runs: &'a [RunId],
    pool: &'a ThreadPool,
    cancel: &'a CancellationToken,
    show_progress: bool,
}

type StageResult<T> = Result<T, StageExecutionError>;

impl<'a> StageRunner<'a> {
    pub fn new(
        backend: &'a dyn ProcessingBackend,
        store: &'a ArtifactStore,
        runs: &'a [RunId],
        pool: &'a ThreadPool,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            backend,
            store,
            runs,
            pool,
            cancel,
            show_progress: false,
        }
    }

    /// Draw progress bars for per-run fan-out
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Run one stage to completion
    pub fn execute(&self, invocation: &StageInvocation) -> StageResult<StageOutcome> {
        let stage = invocation.id;
        let fail = |cause: StageFailure| StageExecutionError::new(stage, cause);

        if self.cancel.is_cancelled() {
            return Err(fail(StageFailure::Cancelled));
        }
        invocation.check_contract().map_err(fail)?;
        for output in &invocation.outputs {
            self.store.prepare(output).map_err(|e| fail(e.into()))?;
        }

        debug!(
            stage = %stage,
            backend = self.backend.name(),
            inputs = invocation.inputs.len(),
            "Dispatching stage"
        );

        let mut outcome = match stage.kind() {
            StageKind::CopyIn => self.copy_in(invocation)?,
            StageKind::Detect => self.detect(invocation)?,
            StageKind::AlignMaps => self.align_maps(invocation).map_err(fail)?,
            StageKind::ApplyTransformations => self.apply_transformations(invocation)?,
            StageKind::Decharge => self.decharge(invocation)?,
            StageKind::MapIdentifications => self.map_identifications(invocation)?,
            StageKind::Link => self.link(invocation).map_err(fail)?,
            StageKind::Split => self.split(invocation).map_err(fail)?,
            StageKind::FilterToConsensus => self.filter_complete(invocation)?,
            StageKind::BuildTargets => self.build_targets(invocation).map_err(fail)?,
            StageKind::Requantify => self.requantify(invocation)?,
            StageKind::Merge => self.merge(invocation)?,
            StageKind::ExportSirius => self.export_sirius(invocation).map_err(fail)?,
            StageKind::ExportGnps => self.export_gnps(invocation).map_err(fail)?,
            StageKind::AssembleTables => self.assemble_tables(invocation).map_err(fail)?,
            StageKind::ExportMetadata => self.export_metadata(invocation).map_err(fail)?,
            StageKind::AnnotateMs1 => self.annotate_ms1(invocation).map_err(fail)?,
            StageKind::TargetedTables => self.targeted_tables(invocation)?,
        };

        if outcome.files.is_empty() {
            outcome.files = self.written_files(invocation);
        }
        Ok(outcome)
    }

    fn written_files(&self, invocation: &StageInvocation) -> Vec<PathBuf> {
        invocation
            .outputs
            .iter()
            .flat_map(|o| {
                if o.kind.is_per_run() {
                    o.run_paths(self.runs)
                } else {
                    vec![o.path.clone()]
                }
            })
            .collect()
    }

    /// Run `task` for every run on the pool.
    ///
    /// Cancellation is checked before each task starts; running tasks
    /// finish. The reported failure is the first one in run order,
    /// preferring real failures over cancellation.
    fn for_each_run<T, F>(&self, stage: StageId, task: F) -> StageResult<Vec<T>>
    where
        T: Send,
        F: Fn(&RunId) -> Result<T, StageFailure> + Sync + Send,
    {
        let progress = RunProgress::new(stage.name(), self.runs.len() as u64, self.show_progress);

        let results: Vec<Result<T, StageFailure>> = self.pool.install(|| {
            self.runs
                .par_iter()
                .map(|run| {
                    if self.cancel.is_cancelled() {
                        return Err(StageFailure::Cancelled);
                    }
                    let _span = debug_span!("run_task", stage = %stage, run = %run).entered();
                    let result = task(run);
                    match &result {
                        Ok(_) => progress.inc(run.as_str()),
                        Err(e) => progress.error(&format!("{}: {}", run, e)),
                    }
                    result
                })
                .collect()
        });

        let mut values = Vec::with_capacity(results.len());
        let mut cancelled_at = None;
        let mut failure = None;
        for (run, result) in self.runs.iter().zip(results) {
            match result {
                Ok(value) => values.push(value),
                Err(StageFailure::Cancelled) => {
                    cancelled_at.get_or_insert_with(|| run.clone());
                }
                Err(cause) => {
                    failure = Some(StageExecutionError::for_run(stage, run.clone(), cause));
                    break;
                }
            }
        }

        if let Some(err) = failure {
            progress.finish_error(&err.to_string());
            return Err(err);
        }
        if let Some(run) = cancelled_at {
            progress.finish_error("cancelled");
            return Err(StageExecutionError::for_run(stage, run, StageFailure::Cancelled));
        }
        progress.finish_success();
        Ok(values)
    }

    fn copy_in(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        let sources: Vec<PathBuf> = inv
            .config
            .get_list(SOURCES_KEY)
            .unwrap_or_default()
            .iter()
            .map(PathBuf::from)
            .collect();

        let raw = inv.output_of(ArtifactKind::RawRuns).map_err(fail)?;
        self.for_each_run(inv.id, |run| {
            let source = sources
                .iter()
                .find(|s| RunId::from_path(s).as_ref() == Some(run))
                .ok_or_else(|| StorageError::FileNotFound(PathBuf::from(run.mzml_name())))?;
            debug!(run = %run, source = %source.display(), "Staging run");
            self.store.copy_in(source, run)?;
            Ok(())
        })?;

        let mut outcome = StageOutcome::default();
        if let Ok(library) = inv.output_of(ArtifactKind::TargetLibrary) {
            let source = inv.config.get_str(LIBRARY_KEY).ok_or_else(|| {
                fail(StageFailure::MissingKeys(vec![LIBRARY_KEY.to_string()]))
            })?;
            let staged = self
                .store
                .copy_file_in(source.as_ref(), library.kind)
                .map_err(|e| fail(e.into()))?;
            outcome.files.push(staged);
        }
        outcome.files.extend(raw.run_paths(self.runs));
        Ok(outcome.with_metadata("runs", json!(self.runs.len())))
    }

    fn detect(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let (input, output) = self.single_pair(inv)?;
        self.for_each_run(inv.id, |run| {
            self.backend
                .detect_features(&input.run_path(run), &output.run_path(run), &inv.config)?;
            Ok(())
        })?;
        Ok(StageOutcome::default())
    }

    fn align_maps(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let maps = inv.input(0)?;
        let aligned = inv.output_of(ArtifactKind::AlignedFeatureMaps)?;
        let transformations = inv.output_of(ArtifactKind::Transformations)?;
        self.check_cancelled()?;
        self.backend.align_maps(
            &maps.run_paths(self.runs),
            &aligned.run_paths(self.runs),
            &transformations.run_paths(self.runs),
            &inv.config,
        )?;
        Ok(StageOutcome::default())
    }

    fn apply_transformations(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        let runs = inv.input(0).map_err(fail)?;
        let transformations = inv.input(1).map_err(fail)?;
        let output = inv.first_output().map_err(fail)?;
        self.for_each_run(inv.id, |run| {
            self.backend.apply_transformation(
                &runs.run_path(run),
                &transformations.run_path(run),
                &output.run_path(run),
            )?;
            Ok(())
        })?;
        Ok(StageOutcome::default())
    }

    fn decharge(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let (input, output) = self.single_pair(inv)?;
        self.for_each_run(inv.id, |run| {
            self.backend
                .decharge(&input.run_path(run), &output.run_path(run), &inv.config)?;
            Ok(())
        })?;
        Ok(StageOutcome::default().with_metadata("input", json!(input.path)))
    }

    fn map_identifications(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        let runs = inv.input(0).map_err(fail)?;
        let maps = inv.input(1).map_err(fail)?;
        let output = inv.first_output().map_err(fail)?;
        self.for_each_run(inv.id, |run| {
            self.backend.map_identifications(
                &runs.run_path(run),
                &maps.run_path(run),
                &output.run_path(run),
            )?;
            Ok(())
        })?;
        Ok(StageOutcome::default().with_metadata("input", json!(maps.path)))
    }

    fn link(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let maps = inv.input(0)?;
        let output = inv.first_output()?;
        self.check_cancelled()?;
        self.backend
            .link_features(&maps.run_paths(self.runs), &output.path, &inv.config)?;
        let consensus = read_consensus_map(&output.path)?;
        info!(stage = %inv.id, consensus_features = consensus.len(), "Linked features");
        Ok(StageOutcome::default().with_metadata("consensus_features", json!(consensus.len())))
    }

    fn split(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let consensus = read_consensus_map(&inv.input(0)?.path)?;
        let (complete, missing) = split(&consensus);
        write_consensus_map(&inv.output_of(ArtifactKind::CompleteConsensus)?.path, &complete)?;
        write_consensus_map(&inv.output_of(ArtifactKind::MissingConsensus)?.path, &missing)?;
        info!(
            complete = complete.len(),
            missing = missing.len(),
            "Split consensus features"
        );
        Ok(StageOutcome::default()
            .with_metadata("complete", json!(complete.len()))
            .with_metadata("missing", json!(missing.len())))
    }

    fn filter_complete(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        let complete = read_consensus_map(&inv.input(0).map_err(fail)?.path)
            .map_err(|e| fail(e.into()))?;
        let maps = inv.input(1).map_err(fail)?;
        let output = inv.first_output().map_err(fail)?;

        let loaded: Vec<(RunId, FeatureMap)> = self.for_each_run(inv.id, |run| {
            Ok((run.clone(), read_feature_map(&maps.run_path(run))?))
        })?;
        let filtered = filter_to_consensus(&complete, &loaded);
        for ((run, _), map) in loaded.iter().zip(&filtered) {
            write_feature_map(&output.run_path(run), map).map_err(|e| {
                StageExecutionError::for_run(inv.id, run.clone(), StageFailure::from(e))
            })?;
        }
        let kept: usize = filtered.iter().map(FeatureMap::len).sum();
        Ok(StageOutcome::default().with_metadata("features", json!(kept)))
    }

    fn build_targets(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let missing = read_consensus_map(&inv.input(0)?.path)?;
        let negative_mode = inv.config.get_bool("negative_mode").unwrap_or(false);
        let targets = targets_from_missing(&missing, negative_mode);
        write_target_library(&inv.first_output()?.path, &targets)?;
        Ok(StageOutcome::default().with_metadata("targets", json!(targets.len())))
    }

    fn requantify(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        let runs = inv.input(0).map_err(fail)?;
        let library = inv.input(1).map_err(fail)?;
        let output = inv.first_output().map_err(fail)?;
        self.for_each_run(inv.id, |run| {
            self.backend.requantify(
                &runs.run_path(run),
                &library.path,
                &output.run_path(run),
                &inv.config,
            )?;
            Ok(())
        })?;
        Ok(StageOutcome::default())
    }

    fn merge(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        let complete = inv.input(0).map_err(fail)?;
        let requantified = inv.input(1).map_err(fail)?;
        let output = inv.first_output().map_err(fail)?;

        let sizes = self.for_each_run(inv.id, |run| {
            let read = |artifact: &ArtifactRef| -> Result<Option<FeatureMap>, StageFailure> {
                let path = artifact.run_path(run);
                if path.exists() {
                    Ok(Some(read_feature_map(&path)?))
                } else {
                    warn!(run = %run, path = %path.display(), "No feature map, merging the other side only");
                    Ok(None)
                }
            };
            let merged = merge_feature_maps(read(complete)?, read(requantified)?);
            write_feature_map(&output.run_path(run), &merged)?;
            Ok(merged.len())
        })?;
        Ok(StageOutcome::default().with_metadata("features", json!(sizes.iter().sum::<usize>())))
    }

    fn export_sirius(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let runs = inv.input(0)?;
        let maps = inv.input(1)?;
        let output = inv.first_output()?;
        self.check_cancelled()?;
        self.backend.export_sirius(
            &runs.run_paths(self.runs),
            &maps.run_paths(self.runs),
            &output.path,
        )?;
        Ok(StageOutcome::default().with_metadata("maps", json!(maps.path)))
    }

    fn export_gnps(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let consensus = inv.input(0)?;
        let runs = inv.input(1)?;
        let output = inv.first_output()?;
        self.check_cancelled()?;
        self.backend
            .export_gnps(&consensus.path, &runs.run_paths(self.runs), &output.path)?;
        Ok(StageOutcome::default().with_metadata("consensus", json!(consensus.path)))
    }

    fn assemble_tables(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let consensus = inv
            .input_of(ArtifactKind::Consensus)
            .ok_or_else(|| StageFailure::MissingKeys(vec!["consensus input".to_string()]))?;
        let mut first = feature_matrix(&read_consensus_map(&consensus.path)?, self.runs, None);
        let mut outcome = StageOutcome::default()
            .with_metadata("missing_values", json!(first.missing_values()));

        let mut requantified = match inv.input_of(ArtifactKind::RequantifiedConsensus) {
            Some(artifact) => {
                let origins = match inv.input_of(ArtifactKind::RequantIdMappedMaps) {
                    Some(maps) => Some(
                        self.runs
                            .iter()
                            .map(|run| -> Result<(RunId, FeatureMap), StageFailure> {
                                Ok((run.clone(), read_feature_map(&maps.run_path(run))?))
                            })
                            .collect::<Result<Vec<_>, _>>()?,
                    ),
                    None => None,
                };
                let matrix = feature_matrix(
                    &read_consensus_map(&artifact.path)?,
                    self.runs,
                    origins.as_deref(),
                );
                outcome = outcome.with_metadata(
                    "missing_values_requantified",
                    json!(matrix.missing_values()),
                );
                Some(matrix)
            }
            None => None,
        };

        if let Some(library_path) = inv.config.get_str(MS1_LIBRARY_KEY) {
            let params = annotation_params(&inv.config)?;
            let library = read_ms1_library(library_path.as_ref())?;
            let target = requantified.as_mut().unwrap_or(&mut first);
            let summary = annotate_matrix(target, &library, &params);
            if summary.unmatched > 0 {
                info!(
                    matched = summary.matched,
                    unmatched = summary.unmatched,
                    "Features without MS1 annotation"
                );
            }
            outcome = outcome
                .with_metadata("annotated", json!(summary.matched))
                .with_metadata("unannotated", json!(summary.unmatched));
        }

        first.write(&inv.output_of(ArtifactKind::FeatureMatrix)?.path)?;
        if let Some(matrix) = requantified {
            matrix.write(&inv.output_of(ArtifactKind::RequantifiedFeatureMatrix)?.path)?;
        }
        Ok(outcome)
    }

    fn export_metadata(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        metadata_table(self.runs).write(&inv.first_output()?.path)?;
        Ok(StageOutcome::default())
    }

    fn annotate_ms1(&self, inv: &StageInvocation) -> Result<StageOutcome, StageFailure> {
        let matrix = FeatureMatrix::read(&inv.input(0)?.path)?;
        let output = inv.first_output()?;

        let annotated = annotated_table(&matrix);
        let annotated_path = output.path.join(ANNOTATED_FILE);
        let combined_path = output.path.join(ANNOTATED_COMBINED_FILE);
        annotated.write(&annotated_path)?;
        annotated.combined().write(&combined_path)?;

        Ok(StageOutcome {
            files: vec![annotated_path, combined_path],
            metadata: HashMap::new(),
        }
        .with_metadata("compounds", json!(annotated.len())))
    }

    fn targeted_tables(&self, inv: &StageInvocation) -> StageResult<StageOutcome> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        let maps = inv.input(0).map_err(fail)?;
        let tables = inv.output_of(ArtifactKind::RunTables).map_err(fail)?;
        let auc_tables = inv.output_of(ArtifactKind::AucTables).map_err(fail)?;
        let combined_tables = inv.output_of(ArtifactKind::AucCombinedTables).map_err(fail)?;
        let unit = match inv.config.get_str(TIME_UNIT_KEY) {
            Some(text) => text.parse::<TimeUnit>().map_err(|e| {
                fail(super::BackendError::invalid_param(TIME_UNIT_KEY, e).into())
            })?,
            None => TimeUnit::default(),
        };

        let aucs: Vec<QuantificationTable> = self.for_each_run(inv.id, |run| {
            let map = read_feature_map(&maps.run_path(run))?;
            run_table(&map, unit).write(&tables.run_path(run))?;
            let auc = auc_table(run.as_str(), &map);
            auc.write(&auc_tables.run_path(run))?;
            auc.combined().write(&combined_tables.run_path(run))?;
            Ok(auc)
        })?;

        let summary = summary_table(&aucs);
        summary
            .write(&inv.output_of(ArtifactKind::Summary).map_err(fail)?.path)
            .map_err(|e| fail(e.into()))?;
        summary
            .combined()
            .write(&inv.output_of(ArtifactKind::SummaryCombined).map_err(fail)?.path)
            .map_err(|e| fail(e.into()))?;
        Ok(StageOutcome::default().with_metadata("metabolites", json!(summary.len())))
    }

    fn single_pair<'i>(
        &self,
        inv: &'i StageInvocation,
    ) -> StageResult<(&'i ArtifactRef, &'i ArtifactRef)> {
        let fail = |cause: StageFailure| StageExecutionError::new(inv.id, cause);
        Ok((inv.input(0).map_err(fail)?, inv.first_output().map_err(fail)?))
    }

    fn check_cancelled(&self) -> Result<(), StageFailure> {
        if self.cancel.is_cancelled() {
            Err(StageFailure::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Annotation windows from a table assembly config
fn annotation_params(config: &StageConfig) -> Result<AnnotationParams, StageFailure> {
    use super::BackendError;

    let number = |key: &str| {
        config
            .get_f64(key)
            .ok_or_else(|| BackendError::invalid_param(key, "expected a number"))
    };
    let boundary = match config.get_str(MS1_BOUNDARY_KEY) {
        Some(text) => text
            .parse::<WindowBoundary>()
            .map_err(|e| BackendError::invalid_param(MS1_BOUNDARY_KEY, e))?,
        None => WindowBoundary::default(),
    };
    Ok(AnnotationParams {
        mz_window_ppm: number(MS1_MZ_WINDOW_KEY)?,
        rt_window_sec: number(MS1_RT_WINDOW_KEY)?,
        boundary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::ParamValue;

    fn store() -> (tempfile::TempDir, ArtifactStore) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("results"));
        store.reset().unwrap();
        (dir, store)
    }

    #[test]
    fn test_contract_arity() {
        let (_dir, store) = store();
        let inv = StageInvocation::new(StageId::Link)
            .with_output(store.artifact(ArtifactKind::Consensus, StageId::Link))
            .with_config(
                StageConfig::new()
                    .with("link:mz_tol", 10.0)
                    .with("link:rt_tol", 30.0)
                    .with("mz_unit", "ppm"),
            );
        assert!(matches!(
            inv.check_contract(),
            Err(StageFailure::Arity { actual: 0, .. })
        ));
    }

    #[test]
    fn test_contract_missing_keys() {
        let (_dir, store) = store();
        let inv = StageInvocation::new(StageId::Link)
            .with_input(store.artifact(ArtifactKind::IdMappedMaps, StageId::MapIds))
            .with_output(store.artifact(ArtifactKind::Consensus, StageId::Link))
            .with_config(StageConfig::new().with("mz_unit", "ppm"));
        match inv.check_contract() {
            Err(StageFailure::MissingKeys(keys)) => {
                assert_eq!(keys, vec!["link:mz_tol", "link:rt_tol"]);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_contract_rejects_foreign_output() {
        let (_dir, store) = store();
        let inv = StageInvocation::new(StageId::SplitConsensus)
            .with_input(store.artifact(ArtifactKind::Consensus, StageId::Link))
            .with_output(store.artifact(ArtifactKind::TargetLibrary, StageId::SplitConsensus));
        assert!(matches!(
            inv.check_contract(),
            Err(StageFailure::Outputs { .. })
        ));
    }

    #[test]
    fn test_annotation_params() {
        let config = StageConfig::new()
            .with(MS1_MZ_WINDOW_KEY, 10)
            .with(MS1_RT_WINDOW_KEY, 60.0)
            .with(MS1_BOUNDARY_KEY, ParamValue::from("exclusive"));
        let params = annotation_params(&config).unwrap();
        assert_eq!(params.mz_window_ppm, 10.0);
        assert_eq!(params.boundary, WindowBoundary::Exclusive);

        let bad = config.with(MS1_BOUNDARY_KEY, "sometimes");
        assert!(annotation_params(&bad).is_err());
    }
}
