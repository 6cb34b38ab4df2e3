//! Configuration file commands

use std::path::Path;

use umetaflow::PipelineError;
use umetaflow::pipeline::{PipelineRunConfig, StagePlan};
use umetaflow::storage::ArtifactStore;

use crate::error::CliError;

/// Handle the `validate` command.
///
/// Loads the file, validates it and builds the stage plan without touching
/// the results directory.
pub fn handle_validate(path: &Path) -> Result<(), CliError> {
    let config = PipelineRunConfig::from_file(path)?;
    config.validate().map_err(PipelineError::ConfigError)?;

    let store = ArtifactStore::new(&config.results_dir);
    let plan = StagePlan::build(&config, &store)?;
    plan.validate()?;

    println!("Validation successful");
    for node in plan.order()? {
        match &node.skip_reason {
            Some(reason) => println!("  - {} (skipped: {})", node.id(), reason),
            None => println!("  - {}", node.id()),
        }
    }
    Ok(())
}

/// Handle the `init-config` command
pub fn handle_init_config(output: &Path, force: bool) -> Result<(), CliError> {
    if output.exists() && !force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists (use --force to overwrite)",
            output.display()
        )));
    }

    let config = PipelineRunConfig::new();
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    let text = match extension.as_deref() {
        Some("toml") => toml::to_string_pretty(&config)
            .map_err(|e| CliError::FileWriteError(output.to_path_buf(), e.to_string()))?,
        _ => config.to_yaml()?,
    };
    std::fs::write(output, text)
        .map_err(|e| CliError::FileWriteError(output.to_path_buf(), e.to_string()))?;

    println!("Wrote {}", output.display());
    Ok(())
}
