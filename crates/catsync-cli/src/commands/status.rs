//! `catsync status` command implementation
//!
//! Shows the committed checkpoint and the run lease.

use crate::checkpoint::CheckpointStore;
use crate::config::SyncConfig;
use crate::error::Result;
use catsync_common::Checkpoint;
use chrono::Utc;
use colored::Colorize;

/// Show checkpoint and lease state
pub async fn run(config: &SyncConfig) -> Result<()> {
    let store = super::checkpoint_store(config);

    let checkpoint = store.get().await?;
    println!("{}", "Checkpoint:".cyan().bold());
    println!("  {}", Checkpoint::status_line(checkpoint.as_ref()));
    println!("  File: {}", store.path().display());
    println!();

    println!("{}", "Run lease:".cyan().bold());
    match store.current_lease().await {
        Ok(Some(lease)) => {
            let state = if lease.is_expired(store.lease_ttl(), Utc::now()) {
                "expired".yellow()
            } else {
                "held".green()
            };
            println!("  {} by run {}", state, lease.run_id);
            println!("  Since: {}", lease.acquired_at.to_rfc3339());
        },
        Ok(None) => println!("  free"),
        Err(e) => println!("  {} {}", "unreadable:".red(), e),
    }

    Ok(())
}
