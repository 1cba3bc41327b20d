//! Progress reporting for runs
//!
//! The orchestrator reports through `ProgressReporter` after each committed
//! batch. `BarReporter` draws an indicatif bar on the terminal and
//! `SilentReporter` discards everything.

use crate::orchestrator::{BatchProgress, RunReport};
use catsync_common::Checkpoint;
use indicatif::{ProgressBar, ProgressStyle};

/// Receives run progress
pub trait ProgressReporter: Send + Sync {
    /// Work is selected and batching is about to start
    fn run_started(&self, _batches: usize, _keys: usize) {}

    /// A batch was fetched, written, and its checkpoint committed
    fn batch_committed(&self, progress: &BatchProgress);

    /// The run reached `Done` or `Aborted`
    fn run_finished(&self, _report: &RunReport) {}
}

/// Reporter that ignores all progress
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {
    fn batch_committed(&self, _progress: &BatchProgress) {}
}

/// Terminal progress bar over batches
///
/// Shows a spinner while the table is read, then one tick per batch.
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new() -> Self {
        Self {
            bar: create_spinner("Reading catalog"),
        }
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarReporter {
    fn run_started(&self, batches: usize, keys: usize) {
        self.bar.disable_steady_tick();
        self.bar.set_length(batches as u64);
        self.bar.set_position(0);
        self.bar.set_style(bar_style());
        self.bar
            .set_message(format!("Enriching {} records", keys));
    }

    fn batch_committed(&self, progress: &BatchProgress) {
        self.bar.set_position((progress.index + 1) as u64);
        self.bar
            .set_message(Checkpoint::status_line(progress.checkpoint.as_ref()));
    }

    fn run_finished(&self, _report: &RunReport) {
        self.bar.finish_and_clear();
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} batches ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Create a spinner for indeterminate steps
pub fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bar_reporter_tracks_batches() {
        let reporter = BarReporter::new();
        reporter.run_started(3, 7);
        reporter.batch_committed(&BatchProgress {
            index: 1,
            total: 3,
            keys: 2,
            written: 2,
            skipped: 0,
            checkpoint: Some(Checkpoint::new("B2", 3)),
        });
        assert_eq!(reporter.bar.position(), 2);
        assert_eq!(reporter.bar.length(), Some(3));
        assert_eq!(reporter.bar.message(), "last update position: row 3 (B2)");
    }

    #[test]
    fn test_create_spinner() {
        let spinner = create_spinner("Reading table");
        assert_eq!(spinner.message(), "Reading table");
        spinner.finish_and_clear();
    }
}
