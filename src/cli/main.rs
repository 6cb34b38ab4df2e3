//! # UmetaFlow
//!
//! Command line front end of the metabolomics pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Untargeted run over every mzML file of a directory
//! umetaflow run --input-dir data/ --results results/ --requantify --gnps
//!
//! # Targeted run with a compound library
//! umetaflow run --workflow targeted --library compounds.tsv data/*.mzML
//!
//! # Inspect the last run
//! umetaflow status --results results/
//! ```

mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::pipeline::{PipelineRunArgs, handle_pipeline_run, handle_pipeline_status};
use commands::validate::{handle_init_config, handle_validate};

/// UmetaFlow - LC-MS metabolomics on top of OpenMS
#[derive(Parser)]
#[command(name = "umetaflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbosity level (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline
    Run {
        /// mzML files to process
        #[arg(value_name = "RUNS")]
        runs: Vec<PathBuf>,

        /// Configuration file (YAML or TOML); flags override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory to collect runs from
        #[arg(short, long)]
        input_dir: Option<PathBuf>,

        /// Glob pattern for --input-dir
        #[arg(long, default_value = "*.mzML")]
        pattern: String,

        /// Results directory; wiped before the run
        #[arg(short, long)]
        results: Option<PathBuf>,

        /// untargeted or targeted
        #[arg(short, long)]
        workflow: Option<String>,

        /// Re-quantify features with missing values
        #[arg(long)]
        requantify: bool,

        /// Skip adduct detection
        #[arg(long)]
        no_adducts: bool,

        /// Skip the SIRIUS export
        #[arg(long)]
        no_sirius: bool,

        /// Write GNPS input files
        #[arg(long)]
        gnps: bool,

        /// Annotate features on MS1 level with this library
        #[arg(long)]
        ms1_library: Option<PathBuf>,

        /// Compound library of the targeted workflow
        #[arg(short, long)]
        library: Option<PathBuf>,

        /// Worker threads for per-run work
        #[arg(short = 'j', long)]
        threads: Option<usize>,

        /// Directory holding the OpenMS executables
        #[arg(long)]
        openms_bin: Option<PathBuf>,

        /// Draw progress bars
        #[arg(long)]
        progress: bool,
    },

    /// Show the run record of a results directory
    Status {
        /// Results directory
        #[arg(short, long, default_value = "results")]
        results: PathBuf,
    },

    /// Write a starter configuration file
    InitConfig {
        /// Output file (.yaml, .yml or .toml)
        #[arg(value_name = "OUTPUT", default_value = "umetaflow.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate a configuration file without running anything
    Validate {
        /// Configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Run {
            runs,
            config,
            input_dir,
            pattern,
            results,
            workflow,
            requantify,
            no_adducts,
            no_sirius,
            gnps,
            ms1_library,
            library,
            threads,
            openms_bin,
            progress,
        } => handle_pipeline_run(&PipelineRunArgs {
            runs,
            config_file: config,
            input_dir,
            pattern,
            results_dir: results,
            workflow,
            requantify,
            no_adducts,
            no_sirius,
            gnps,
            ms1_library,
            library,
            threads,
            openms_bin,
            progress,
            verbose: cli.verbose > 0,
        }),
        Commands::Status { results } => handle_pipeline_status(&results),
        Commands::InitConfig { output, force } => handle_init_config(&output, force),
        Commands::Validate { config } => handle_validate(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}
