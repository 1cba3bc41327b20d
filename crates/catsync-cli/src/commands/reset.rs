//! `catsync reset` command implementation
//!
//! Clears the checkpoint so the next run starts from the top of the table.

use crate::checkpoint::CheckpointStore;
use crate::config::SyncConfig;
use crate::error::Result;
use chrono::Utc;
use colored::Colorize;
use tracing::warn;

/// Clear the checkpoint
///
/// Refuses while a live lease is held unless `force` is set, in which case
/// the lease is removed as well.
pub async fn run(config: &SyncConfig, force: bool) -> Result<()> {
    let store = super::checkpoint_store(config);

    let lease = match store.current_lease().await {
        Ok(lease) => lease,
        Err(_) if force => None,
        Err(e) => return Err(e),
    };
    if let Some(lease) = lease.filter(|l| !l.is_expired(store.lease_ttl(), Utc::now())) {
        if !force {
            return Err(lease.held_error());
        }
    }

    if force && store.break_lease()? {
        warn!(path = %store.lease_path().display(), "Lease removed by operator");
        println!("{} Removed run lease", "!".yellow());
    }

    store.clear().await?;
    println!("{} Checkpoint cleared; the next run starts from the first row", "✓".green());
    Ok(())
}
