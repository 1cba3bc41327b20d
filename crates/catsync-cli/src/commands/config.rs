//! `catsync config` command implementation
//!
//! Shows the effective configuration.

use crate::config::SyncConfig;
use crate::error::Result;
use colored::Colorize;

/// Show the effective configuration with secrets redacted
pub async fn show(config: &SyncConfig) -> Result<()> {
    println!("{}", "catsync configuration:".cyan().bold());
    println!();
    print!("{}", config.redacted().to_toml_string()?);
    println!();
    println!("{}", "Environment Variables:".cyan());
    println!("  CATSYNC_API_KEY          - API key");
    println!("  CATSYNC_API_URL          - API base URL");
    println!("  CATSYNC_MAX_RECORDS      - Records per run");
    println!("  CATSYNC_BATCH_SIZE       - Records per request");
    println!("  CATSYNC_TABLE_DIR        - Directory holding <sheet>.csv");
    println!("  CATSYNC_SHEET            - Sheet name");
    println!("  CATSYNC_CHECKPOINT_PATH  - Checkpoint file");

    Ok(())
}
