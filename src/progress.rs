//! Progress reporting for long-running stages
//!
//! Per-run fan-out shows a bar with one tick per finished run. Bars are
//! hidden unless progress output was requested, so library callers and
//! tests stay quiet.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Progress over the runs of one stage
#[derive(Clone)]
pub struct RunProgress {
    bar: ProgressBar,
}

impl RunProgress {
    /// Create a bar for `total_runs` runs of the named stage
    pub fn new(stage: &str, total_runs: u64, visible: bool) -> Self {
        if !visible {
            return Self::hidden();
        }

        let bar = ProgressBar::new(total_runs);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {prefix:>16} {bar:40.cyan/blue} {pos:>3}/{len:3} runs {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░  "),
        );
        bar.set_prefix(stage.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// A reporter that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Mark one run as done
    pub fn inc(&self, run: &str) {
        self.bar.set_message(run.to_string());
        self.bar.inc(1);
    }

    /// Report a failed run
    pub fn error(&self, msg: &str) {
        self.bar.println(format!("  ✗ Error: {}", msg));
    }

    pub fn finish_success(&self) {
        self.bar.finish_and_clear();
    }

    pub fn finish_error(&self, msg: &str) {
        self.bar.abandon_with_message(format!("✗ {}", msg));
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// Format milliseconds as `1m 5s`, `12s` or `850ms`
pub fn format_duration_ms(ms: u64) -> String {
    let secs = ms / 1000;
    let mins = secs / 60;
    let remaining_secs = secs % 60;

    if mins > 0 {
        format!("{}m {}s", mins, remaining_secs)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration_ms(850), "850ms");
        assert_eq!(format_duration_ms(12_000), "12s");
        assert_eq!(format_duration_ms(65_000), "1m 5s");
    }

    #[test]
    fn test_hidden_progress_counts() {
        let progress = RunProgress::new("detect", 3, false);
        progress.inc("a");
        progress.inc("b");
        assert_eq!(progress.position(), 2);
        progress.finish_success();
    }
}
