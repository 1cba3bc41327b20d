//! catsync - Main entry point

use catsync_cli::{Cli, Commands, ConfigCommand, SyncConfig};
use catsync_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Verbose mode logs debug to the console; otherwise warnings only
    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .output(LogOutput::Console)
        .log_file_prefix("catsync")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().with_env_overrides().unwrap_or(log_config);

    // The CLI works without logging; the guard flushes file logs when main returns
    let _guard = init_logging(&log_config).ok();

    match execute_command(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %e, kind = %e.kind(), "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        },
    }
}

/// Execute the CLI command; `Ok(false)` means the run aborted
async fn execute_command(cli: &Cli) -> catsync_cli::Result<bool> {
    let mut config = SyncConfig::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Run {
            max_records,
            batch_size,
        } => {
            if let Some(max) = max_records {
                config.run.max_records = *max;
            }
            if let Some(size) = batch_size {
                config.run.batch_size = *size;
            }
            config.validate()?;

            let report = catsync_cli::commands::run::run(&config).await?;
            Ok(report.is_success())
        },

        Commands::Status => catsync_cli::commands::status::run(&config).await.map(|_| true),

        Commands::Reset { force } => catsync_cli::commands::reset::run(&config, *force)
            .await
            .map(|_| true),

        Commands::Config { command } => match command {
            ConfigCommand::Show => catsync_cli::commands::config::show(&config).await.map(|_| true),
        },
    }
}
