//! `catsync run` command implementation
//!
//! Performs one enrichment run against the configured table.

use crate::api::ProductApiClient;
use crate::config::SyncConfig;
use crate::error::Result;
use crate::orchestrator::{Orchestrator, RunReport, RunSettings};
use crate::progress::BarReporter;
use crate::table::CsvTableStore;
use colored::Colorize;
use std::sync::Arc;

/// Run once and print the outcome
///
/// Setup problems (such as a missing API key) are returned as errors; a run
/// that started always yields a report, aborted or not.
pub async fn run(config: &SyncConfig) -> Result<RunReport> {
    config.require_api_key()?;

    let api = Arc::new(ProductApiClient::new(&config.api)?);
    let table = Arc::new(CsvTableStore::new(config.table.dir.clone()));
    let checkpoints = Arc::new(super::checkpoint_store(config));

    let orchestrator = Orchestrator::new(RunSettings::from(config), table, api, checkpoints);
    let report = orchestrator.run(&BarReporter::new()).await;

    print_report(&report);
    Ok(report)
}

fn print_report(report: &RunReport) {
    let message = report.status_message();
    let mut lines = message.lines();
    let status = lines.next().unwrap_or_default();

    if report.is_success() {
        println!("{} {}", "✓".green(), status);
    } else {
        println!("{} {}", "✗".red(), status);
        for line in lines {
            println!("  {}", line.red());
        }
    }

    println!(
        "  {} selected ({} resumed), {}/{} batch(es), {} row(s) written, {} key(s) skipped",
        report.keys_selected,
        report.resume_window,
        report.batches_completed,
        report.batches_total,
        report.rows_written,
        report.keys_skipped
    );
    if report.keys_unmatched > 0 || report.rows_rejected > 0 {
        println!(
            "  {} {} result(s) without a matching row, {} row(s) without a key",
            "!".yellow(),
            report.keys_unmatched,
            report.rows_rejected
        );
    }
}
