//! Run orchestration
//!
//! One run: take the lease, read the snapshot once, select the work list,
//! then for each batch fetch, write and commit the checkpoint, strictly in
//! sequence. The first error stops the run; the checkpoint keeps whatever
//! the last completed batch committed.
//!
//! ```text
//! Idle -> ReadingSnapshot -> Selecting -> ProcessingBatch(0..n) -> Done
//!   \__________________\_______________________\___________________-> Aborted
//! ```

use crate::api::EnrichmentApi;
use crate::batch::BatchClient;
use crate::checkpoint::CheckpointStore;
use crate::config::SyncConfig;
use crate::error::{ErrorKind, Result};
use crate::progress::ProgressReporter;
use crate::selector;
use crate::table::{TableReader, TableStore};
use crate::writer::Writer;
use catsync_common::Checkpoint;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

// ============================================================================
// Run State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "batch", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    ReadingSnapshot,
    Selecting,
    /// 0-based batch index
    ProcessingBatch(usize),
    Done,
    Aborted,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::ReadingSnapshot => write!(f, "reading snapshot"),
            RunState::Selecting => write!(f, "selecting"),
            RunState::ProcessingBatch(i) => write!(f, "processing batch {}", i + 1),
            RunState::Done => write!(f, "done"),
            RunState::Aborted => write!(f, "aborted"),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Done,
    Aborted {
        kind: ErrorKind,
        message: String,
        /// State the run was in when it failed
        failed_in: RunState,
    },
}

/// Progress after one committed batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchProgress {
    /// 0-based batch index
    pub index: usize,
    pub total: usize,
    /// Keys requested in this batch
    pub keys: usize,
    pub written: usize,
    pub skipped: usize,
    /// Checkpoint after this batch
    pub checkpoint: Option<Checkpoint>,
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub outcome: RunOutcome,
    pub keys_selected: usize,
    /// Leading keys of the work list taken from the resume window
    pub resume_window: usize,
    pub batches_total: usize,
    pub batches_completed: usize,
    pub rows_written: usize,
    /// Requested keys the API did not return
    pub keys_skipped: usize,
    /// Returned keys with no matching row
    pub keys_unmatched: usize,
    /// Rows left out of the snapshot because their key was empty
    pub rows_rejected: usize,
    /// Last committed checkpoint
    pub checkpoint: Option<Checkpoint>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    fn new(run_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            state: RunState::Idle,
            outcome: RunOutcome::Done,
            keys_selected: 0,
            resume_window: 0,
            batches_total: 0,
            batches_completed: 0,
            rows_written: 0,
            keys_skipped: 0,
            keys_unmatched: 0,
            rows_rejected: 0,
            checkpoint: None,
            started_at: now,
            finished_at: now,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done)
    }

    /// The status line, followed by the error message when the run aborted
    pub fn status_message(&self) -> String {
        let status = Checkpoint::status_line(self.checkpoint.as_ref());
        match &self.outcome {
            RunOutcome::Done => status,
            RunOutcome::Aborted { message, .. } => format!("{}\n{}", status, message),
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match &self.outcome {
            RunOutcome::Done => None,
            RunOutcome::Aborted { kind, .. } => Some(*kind),
        }
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Settings a run needs from the configuration
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub sheet: String,
    pub head_row: u32,
    pub key_column: String,
    pub max_records: usize,
    pub batch_size: usize,
}

impl From<&SyncConfig> for RunSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            sheet: config.table.sheet.clone(),
            head_row: config.table.head_row,
            key_column: config.table.key_column.clone(),
            max_records: config.run.max_records,
            batch_size: config.run.batch_size,
        }
    }
}

pub struct Orchestrator {
    settings: RunSettings,
    table: Arc<dyn TableStore>,
    api: Arc<dyn EnrichmentApi>,
    checkpoints: Arc<dyn CheckpointStore>,
}

impl Orchestrator {
    pub fn new(
        settings: RunSettings,
        table: Arc<dyn TableStore>,
        api: Arc<dyn EnrichmentApi>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            settings,
            table,
            api,
            checkpoints,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Execute one run
    ///
    /// Never fails: errors end the run in `Aborted` and are described in the
    /// returned report.
    pub async fn run(&self, reporter: &dyn ProgressReporter) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id);
        self.run_inner(run_id, reporter).instrument(span).await
    }

    async fn run_inner(&self, run_id: Uuid, reporter: &dyn ProgressReporter) -> RunReport {
        let mut report = RunReport::new(run_id);
        info!(
            sheet = %self.settings.sheet,
            max_records = self.settings.max_records,
            batch_size = self.settings.batch_size,
            "Run started"
        );

        let result = match self.checkpoints.acquire_lease(run_id).await {
            Ok(lease) => {
                let result = self.execute(&mut report, reporter).await;
                if let Err(e) = self.checkpoints.release_lease(&lease).await {
                    warn!(error = %e, "Failed to release lease");
                }
                result
            },
            Err(e) => {
                // Still report where the table stands
                report.checkpoint = self.checkpoints.get().await.ok().flatten();
                Err(e)
            },
        };

        report.finished_at = Utc::now();
        match result {
            Ok(()) => {
                report.state = RunState::Done;
                report.outcome = RunOutcome::Done;
                info!(
                    batches = report.batches_completed,
                    rows_written = report.rows_written,
                    keys_skipped = report.keys_skipped,
                    checkpoint = ?report.checkpoint,
                    "Run finished"
                );
            },
            Err(e) => {
                error!(
                    error = %e,
                    kind = %e.kind(),
                    state = %report.state,
                    checkpoint = ?report.checkpoint,
                    "Run aborted"
                );
                report.outcome = RunOutcome::Aborted {
                    kind: e.kind(),
                    message: e.to_string(),
                    failed_in: report.state,
                };
                report.state = RunState::Aborted;
            },
        }
        reporter.run_finished(&report);
        report
    }

    async fn execute(&self, report: &mut RunReport, reporter: &dyn ProgressReporter) -> Result<()> {
        report.checkpoint = self.checkpoints.get().await?;

        report.state = RunState::ReadingSnapshot;
        let snapshot = TableReader::new(
            self.table.as_ref(),
            &self.settings.sheet,
            self.settings.head_row,
            &self.settings.key_column,
        )
        .read()
        .await?;
        report.rows_rejected = snapshot.rejected_rows().len();

        report.state = RunState::Selecting;
        let work = selector::select(&snapshot, report.checkpoint.as_ref(), self.settings.max_records);
        report.keys_selected = work.len();
        report.resume_window = work.resume_len();
        if work.is_empty() {
            info!(records = snapshot.len(), "Nothing to process");
            return Ok(());
        }

        let batch_client = BatchClient::new(self.api.clone(), self.settings.batch_size);
        let writer = Writer::new(self.table.clone(), self.settings.sheet.as_str());
        let batches = batch_client.partition(&work);
        report.batches_total = batches.len();
        info!(
            keys = work.len(),
            resume_window = work.resume_len(),
            batches = batches.len(),
            "Work selected"
        );
        reporter.run_started(batches.len(), work.len());

        for batch in &batches {
            report.state = RunState::ProcessingBatch(batch.index);

            let fetched = batch_client.fetch(batch).await?;
            let outcome = writer.apply(&snapshot, &fetched.results).await?;
            if let Some(checkpoint) = outcome.last {
                self.checkpoints.set(&checkpoint).await?;
                report.checkpoint = Some(checkpoint);
            }

            report.batches_completed += 1;
            report.rows_written += outcome.rows_written;
            report.keys_skipped += fetched.skipped.len();
            report.keys_unmatched += outcome.unmatched.len();

            info!(
                batch = batch.index + 1,
                total = batches.len(),
                written = outcome.rows_written,
                skipped = fetched.skipped.len(),
                checkpoint = ?report.checkpoint,
                "Batch committed"
            );
            reporter.batch_committed(&BatchProgress {
                index: batch.index,
                total: batches.len(),
                keys: batch.keys.len(),
                written: outcome.rows_written,
                skipped: fetched.skipped.len(),
                checkpoint: report.checkpoint.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::batch::testing::ScriptedApi;
    use crate::checkpoint::{Lease, MemoryCheckpointStore};
    use crate::error::SyncError;
    use crate::progress::SilentReporter;
    use crate::table::MemoryTableStore;
    use catsync_common::CellValue;
    use std::sync::Mutex;

    fn settings(max_records: usize, batch_size: usize) -> RunSettings {
        RunSettings {
            sheet: "Research".into(),
            head_row: 1,
            key_column: "ASIN".into(),
            max_records,
            batch_size,
        }
    }

    fn table() -> Arc<MemoryTableStore> {
        Arc::new(MemoryTableStore::with_sheet(
            "Research",
            &[
                &["ASIN", "title", "buybox_price", "url"],
                &["A1"],
                &["B2"],
                &["C3"],
            ],
        ))
    }

    #[derive(Default)]
    struct RecordingReporter {
        batches: Mutex<Vec<BatchProgress>>,
        finished: Mutex<Option<RunState>>,
    }

    impl ProgressReporter for RecordingReporter {
        fn batch_committed(&self, progress: &BatchProgress) {
            self.batches.lock().unwrap().push(progress.clone());
        }

        fn run_finished(&self, report: &RunReport) {
            *self.finished.lock().unwrap() = Some(report.state);
        }
    }

    #[tokio::test]
    async fn test_partial_results_scenario() {
        let table = table();
        let api = Arc::new(ScriptedApi::new(vec![Ok(vec!["A1"]), Ok(vec!["C3"])]));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());
        let reporter = RecordingReporter::default();

        let orchestrator = Orchestrator::new(settings(3, 2), table.clone(), api.clone(), checkpoints.clone());
        let report = orchestrator.run(&reporter).await;

        assert!(report.is_success());
        assert_eq!(report.state, RunState::Done);
        assert_eq!(api.calls(), vec![vec!["A1", "B2"], vec!["C3"]]);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.keys_skipped, 1);
        assert_eq!(report.checkpoint, Some(Checkpoint::new("C3", 4)));
        assert_eq!(checkpoints.get().await.unwrap(), Some(Checkpoint::new("C3", 4)));
        assert_eq!(report.status_message(), "last update position: row 4 (C3)");

        assert_eq!(table.row("Research", 3), vec![CellValue::text("B2")]);
        assert_eq!(table.row("Research", 2)[1], CellValue::text("Title A1"));

        let batches = reporter.batches.lock().unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].checkpoint, Some(Checkpoint::new("A1", 2)));
        assert_eq!(batches[0].skipped, 1);
        assert_eq!(*reporter.finished.lock().unwrap(), Some(RunState::Done));
        assert!(checkpoints.current_lease().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rate_limit_on_second_batch_keeps_first_checkpoint() {
        let table = table();
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(vec!["A1", "B2"]),
            Err(SyncError::RateLimited),
        ]));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());

        let orchestrator = Orchestrator::new(settings(3, 2), table.clone(), api, checkpoints.clone());
        let report = orchestrator.run(&SilentReporter).await;

        assert!(!report.is_success());
        assert_eq!(report.state, RunState::Aborted);
        assert_eq!(report.error_kind(), Some(ErrorKind::RateLimited));
        assert!(matches!(
            report.outcome,
            RunOutcome::Aborted { failed_in: RunState::ProcessingBatch(1), .. }
        ));
        assert_eq!(report.batches_completed, 1);
        assert_eq!(checkpoints.get().await.unwrap(), Some(Checkpoint::new("B2", 3)));
        assert!(report
            .status_message()
            .starts_with("last update position: row 3 (B2)\n"));
        assert_eq!(table.row("Research", 4), vec![CellValue::text("C3")]);
        assert!(checkpoints.current_lease().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(vec!["C3", "A1", "B2"])]));
        let checkpoints = Arc::new(MemoryCheckpointStore::with_checkpoint(Checkpoint::new("B2", 3)));

        let orchestrator = Orchestrator::new(settings(3, 5), table(), api.clone(), checkpoints.clone());
        let report = orchestrator.run(&SilentReporter).await;

        assert!(report.is_success());
        assert_eq!(api.calls(), vec![vec!["C3", "A1", "B2"]]);
        assert_eq!(report.resume_window, 1);
        assert_eq!(report.checkpoint, Some(Checkpoint::new("B2", 3)));
    }

    #[tokio::test]
    async fn test_checkpoints_climb_within_window_and_full_pass() {
        let table = Arc::new(MemoryTableStore::with_sheet(
            "Research",
            &[&["ASIN"], &["K1"], &["K2"], &["K3"], &["K4"], &["K5"], &["K6"]],
        ));
        let api = Arc::new(ScriptedApi::new(vec![
            Ok(vec!["K3", "K4"]),
            Ok(vec!["K5", "K6"]),
            Ok(vec!["K1", "K2"]),
            Ok(vec!["K3", "K4"]),
        ]));
        let checkpoints = Arc::new(MemoryCheckpointStore::with_checkpoint(Checkpoint::new("K2", 3)));

        let orchestrator = Orchestrator::new(settings(8, 2), table, api, checkpoints.clone());
        let report = orchestrator.run(&SilentReporter).await;

        assert!(report.is_success());
        assert_eq!(report.resume_window, 4);
        let positions: Vec<u32> = checkpoints.history().iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![5, 7, 3, 5]);
        // Resume window, then the pass from the top of the table
        assert!(positions[..2].windows(2).all(|w| w[0] <= w[1]));
        assert!(positions[2..].windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_batch_without_writes_keeps_checkpoint() {
        let api = Arc::new(ScriptedApi::new(vec![Ok(vec![])]));
        let checkpoints = Arc::new(MemoryCheckpointStore::with_checkpoint(Checkpoint::new("A1", 2)));

        let orchestrator = Orchestrator::new(settings(2, 5), table(), api, checkpoints.clone());
        let report = orchestrator.run(&SilentReporter).await;

        assert!(report.is_success());
        assert_eq!(report.keys_skipped, 2);
        assert!(checkpoints.history().is_empty());
        assert_eq!(report.checkpoint, Some(Checkpoint::new("A1", 2)));
    }

    #[tokio::test]
    async fn test_store_read_failure_aborts_before_selection() {
        let table = table();
        table.fail_reads(true);
        let api = Arc::new(ScriptedApi::new(vec![]));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());

        let orchestrator = Orchestrator::new(settings(3, 2), table, api.clone(), checkpoints.clone());
        let report = orchestrator.run(&SilentReporter).await;

        assert_eq!(report.error_kind(), Some(ErrorKind::StoreRead));
        assert!(matches!(
            report.outcome,
            RunOutcome::Aborted { failed_in: RunState::ReadingSnapshot, .. }
        ));
        assert!(api.calls().is_empty());
        assert!(checkpoints.current_lease().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_failure_does_not_advance_checkpoint() {
        let table = table();
        table.fail_writes(true);
        let api = Arc::new(ScriptedApi::new(vec![Ok(vec!["A1"])]));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());

        let orchestrator = Orchestrator::new(settings(3, 2), table, api, checkpoints.clone());
        let report = orchestrator.run(&SilentReporter).await;

        assert_eq!(report.error_kind(), Some(ErrorKind::StoreWrite));
        assert_eq!(checkpoints.get().await.unwrap(), None);
        assert_eq!(report.status_message().lines().next(), Some("last update position: none"));
    }

    #[tokio::test]
    async fn test_held_lease_aborts_without_touching_anything() {
        let api = Arc::new(ScriptedApi::new(vec![]));
        let checkpoints = Arc::new(MemoryCheckpointStore::with_checkpoint(Checkpoint::new("A1", 2)));
        checkpoints.hold_lease(Lease::new(Uuid::new_v4()));

        let orchestrator = Orchestrator::new(settings(3, 2), table(), api.clone(), checkpoints.clone());
        let report = orchestrator.run(&SilentReporter).await;

        assert_eq!(report.error_kind(), Some(ErrorKind::LeaseHeld));
        assert_eq!(report.checkpoint, Some(Checkpoint::new("A1", 2)));
        assert!(api.calls().is_empty());
        assert!(checkpoints.current_lease().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_zero_limit_is_noop() {
        let api = Arc::new(ScriptedApi::new(vec![]));
        let checkpoints = Arc::new(MemoryCheckpointStore::new());

        let orchestrator = Orchestrator::new(settings(0, 2), table(), api.clone(), checkpoints);
        let report = orchestrator.run(&SilentReporter).await;

        assert!(report.is_success());
        assert_eq!(report.batches_total, 0);
        assert!(api.calls().is_empty());
    }
}
