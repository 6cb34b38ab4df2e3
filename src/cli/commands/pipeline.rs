//! CLI commands for pipeline runs

use std::path::{Path, PathBuf};

use umetaflow::pipeline::{
    Checkpoint, PipelineExecutor, PipelineRunConfig, Workflow, discover_runs,
};

use crate::error::CliError;
use crate::output::print_checkpoint;

/// Arguments for the `run` command
pub struct PipelineRunArgs {
    /// Explicit run files
    pub runs: Vec<PathBuf>,
    /// Configuration file
    pub config_file: Option<PathBuf>,
    /// Directory to collect runs from
    pub input_dir: Option<PathBuf>,
    /// Glob pattern for `input_dir`
    pub pattern: String,
    pub results_dir: Option<PathBuf>,
    pub workflow: Option<String>,
    pub requantify: bool,
    pub no_adducts: bool,
    pub no_sirius: bool,
    pub gnps: bool,
    pub ms1_library: Option<PathBuf>,
    pub library: Option<PathBuf>,
    pub threads: Option<usize>,
    pub openms_bin: Option<PathBuf>,
    pub progress: bool,
    pub verbose: bool,
}

/// Merge the configuration file with command line flags
pub fn build_config(args: &PipelineRunArgs) -> Result<PipelineRunConfig, CliError> {
    let mut config = match &args.config_file {
        Some(path) => PipelineRunConfig::from_file(path)?,
        None => PipelineRunConfig::new(),
    };

    let mut runs = args.runs.clone();
    if let Some(dir) = &args.input_dir {
        runs.extend(discover_runs(dir, &args.pattern)?);
    }
    if !runs.is_empty() {
        config = config.with_runs(runs);
    }

    if let Some(results) = &args.results_dir {
        config = config.with_results_dir(results);
    }
    if let Some(workflow) = &args.workflow {
        let workflow = workflow
            .parse::<Workflow>()
            .map_err(CliError::InvalidArgument)?;
        config = config.with_workflow(workflow);
    }
    if args.requantify {
        config = config.with_requantification(true);
    }
    if args.no_adducts {
        config = config.with_adducts(false);
    }
    if args.no_sirius {
        config = config.with_sirius_export(false);
    }
    if args.gnps {
        config = config.with_gnps_export(true);
    }
    if let Some(library) = &args.ms1_library {
        config = config.with_ms1_annotation(library);
    }
    if let Some(library) = &args.library {
        config = config.with_target_library(library);
    }
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    if let Some(bin_dir) = &args.openms_bin {
        let mut tools = config.tools.clone();
        tools.bin_dir = Some(bin_dir.clone());
        config = config.with_tools(tools);
    }
    if args.progress {
        config = config.with_progress(true);
    }
    if args.verbose {
        config = config.with_verbose(true);
    }
    Ok(config)
}

/// Handle the `run` command
pub fn handle_pipeline_run(args: &PipelineRunArgs) -> Result<(), CliError> {
    let config = build_config(args)?;
    let mut executor = PipelineExecutor::new(config);

    let report = match executor.run() {
        Ok(report) => report,
        Err(e) => {
            if let Some(checkpoint) = executor.checkpoint() {
                print_checkpoint(checkpoint);
            }
            return Err(e.into());
        }
    };

    report.print_summary();
    eprintln!();
    eprintln!("Pipeline completed successfully!");
    Ok(())
}

/// Handle the `status` command
pub fn handle_pipeline_status(results: &Path) -> Result<(), CliError> {
    let checkpoint_path = umetaflow::ArtifactStore::checkpoint_path_for(results);
    if !checkpoint_path.exists() {
        eprintln!("No pipeline record found in: {}", results.display());
        eprintln!("Run 'umetaflow run' to start a new pipeline.");
        return Ok(());
    }

    let checkpoint = Checkpoint::load(&checkpoint_path)?;
    print_checkpoint(&checkpoint);
    Ok(())
}
