//! Work selection
//!
//! Decides which keys a run processes: first every record after the
//! checkpoint (the resume window), then the whole table from the top, cut
//! to the per-run limit.

use crate::table::Snapshot;
use catsync_common::Checkpoint;

/// Ordered keys for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkList {
    keys: Vec<String>,
    resume_len: usize,
}

impl WorkList {
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// How many leading keys come from the resume window
    pub fn resume_len(&self) -> usize {
        self.resume_len
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn into_keys(self) -> Vec<String> {
        self.keys
    }
}

/// Build the work list for a run
///
/// The resume window holds the records whose position is strictly greater
/// than the checkpoint position. When there is no checkpoint, or the
/// checkpointed position is past the end of the table, the window is empty
/// and the run starts from the top. Keys in the resume window may appear
/// again in the full pass if the limit allows it.
pub fn select(snapshot: &Snapshot, checkpoint: Option<&Checkpoint>, max_records: usize) -> WorkList {
    let resume = checkpoint
        .map(|cp| {
            snapshot
                .records()
                .iter()
                .filter(|record| record.position > cp.position)
                .map(|record| record.key.clone())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let resume_len = resume.len().min(max_records);
    let keys: Vec<String> = resume
        .into_iter()
        .chain(snapshot.records().iter().map(|record| record.key.clone()))
        .take(max_records)
        .collect();

    WorkList { keys, resume_len }
}
