//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod config;
pub mod reset;
pub mod run;
pub mod status;

use crate::checkpoint::FileCheckpointStore;
use crate::config::SyncConfig;
use std::time::Duration;

/// Checkpoint store described by the configuration
pub(crate) fn checkpoint_store(config: &SyncConfig) -> FileCheckpointStore {
    FileCheckpointStore::new(
        config.checkpoint.path.clone(),
        Duration::from_secs(config.checkpoint.lease_ttl_secs),
    )
}
