//! Output formatting for CLI

use umetaflow::Checkpoint;
use umetaflow::progress::format_duration_ms;

/// Render a run record
pub fn format_checkpoint(checkpoint: &Checkpoint) -> String {
    let mut output = String::new();
    output.push_str("Pipeline Status\n");
    output.push_str("===============\n\n");
    if let Some(name) = &checkpoint.name {
        output.push_str(&format!("Name:     {}\n", name));
    }
    output.push_str(&format!("Run ID:   {}\n", checkpoint.run_id));
    output.push_str(&format!("Status:   {}\n", checkpoint.status));
    output.push_str(&format!("State:    {}\n", checkpoint.state));
    output.push_str(&format!(
        "Started:  {}\n",
        checkpoint.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "Updated:  {}\n",
        checkpoint.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    output.push_str("\nCompleted Stages:\n");
    for stage in &checkpoint.completed_stages {
        match checkpoint.get_stage_output(*stage) {
            Some(output_info) => output.push_str(&format!(
                "  - {}: completed ({}, {} file(s))\n",
                stage.name(),
                format_duration_ms(output_info.duration_ms),
                output_info.files.len()
            )),
            None => output.push_str(&format!("  - {}: completed\n", stage.name())),
        }
    }

    let skipped = checkpoint.skipped_stages();
    if !skipped.is_empty() {
        output.push_str("\nSkipped Stages:\n");
        for (stage, reason) in &skipped {
            output.push_str(&format!("  - {}: {}\n", stage, reason));
        }
    }

    if let Some(stage) = &checkpoint.current_stage {
        output.push_str(&format!("\nCurrent Stage: {}\n", stage.name()));
    }
    if let Some(stage) = &checkpoint.failed_stage {
        output.push_str(&format!("\nStopped at: {}\n", stage.name()));
    }
    if let Some(error) = &checkpoint.error {
        output.push_str(&format!("\nError: {}\n", error));
    }
    output
}

/// Print a run record to stderr
pub fn print_checkpoint(checkpoint: &Checkpoint) {
    eprint!("{}", format_checkpoint(checkpoint));
}
