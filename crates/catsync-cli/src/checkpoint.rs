//! Checkpoint persistence and the run lease
//!
//! The checkpoint is a single slot holding the key and row of the last
//! record whose write was committed. The lease keeps two runs from working
//! the same table at once; a lease older than its TTL is treated as left
//! behind by a crashed run and may be taken over.
//!
//! Lease files are published whole with a no-clobber rename, so a reader
//! never sees a half-written lease. Removing a lease that belongs to someone
//! else (takeover, release) happens only while holding the `.takeover` guard
//! file, which keeps two runs from replacing the same stale lease.

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use catsync_common::Checkpoint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Exclusive claim on the table by one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub run_id: Uuid,
    pub acquired_at: DateTime<Utc>,
}

impl Lease {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            acquired_at: Utc::now(),
        }
    }

    /// Whether the lease is older than `ttl` at `now`
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now - self.acquired_at > ttl,
            Err(_) => false,
        }
    }

    pub(crate) fn held_error(&self) -> SyncError {
        SyncError::LeaseHeld {
            holder: self.run_id.to_string(),
            since: self.acquired_at.to_rfc3339(),
        }
    }
}

/// Durable single-slot checkpoint plus run lease
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// The committed checkpoint, if any
    async fn get(&self) -> Result<Option<Checkpoint>>;

    /// Overwrite the slot
    async fn set(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Reset the slot to empty
    async fn clear(&self) -> Result<()>;

    /// Claim the lease for `run_id`, failing with `LeaseHeld` if a live lease exists
    async fn acquire_lease(&self, run_id: Uuid) -> Result<Lease>;

    /// Give the lease back; a lease taken over by another run is left alone
    async fn release_lease(&self, lease: &Lease) -> Result<()>;

    /// The lease currently on record, live or expired
    async fn current_lease(&self) -> Result<Option<Lease>>;

    /// TTL after which a lease may be taken over
    fn lease_ttl(&self) -> Duration;
}

// ============================================================================
// File store
// ============================================================================

/// Checkpoint slot in a JSON file, lease in a sibling `.lease` file
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    path: PathBuf,
    lease_path: PathBuf,
    guard_path: PathBuf,
    lease_ttl: Duration,
}

/// Held while a lease file is inspected and removed; the file goes away on drop
struct TakeoverGuard {
    path: PathBuf,
}

impl Drop for TakeoverGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Cannot remove takeover guard");
        }
    }
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>, lease_ttl: Duration) -> Self {
        let path = path.into();
        let mut lease_path = path.clone().into_os_string();
        lease_path.push(".lease");
        let mut guard_path = lease_path.clone();
        guard_path.push(".takeover");
        Self {
            path,
            lease_path: PathBuf::from(lease_path),
            guard_path: PathBuf::from(guard_path),
            lease_ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lease_path(&self) -> &Path {
        &self.lease_path
    }

    /// Remove the lease file, and any takeover guard, regardless of owner
    pub fn break_lease(&self) -> Result<bool> {
        remove_if_present(&self.guard_path)?;
        let removed = remove_if_present(&self.lease_path)?;
        if removed {
            debug!(path = %self.lease_path.display(), "Lease file removed");
        }
        Ok(removed)
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn write_slot(&self, checkpoint: Option<&Checkpoint>) -> Result<()> {
        let encoded = Checkpoint::encode_slot(checkpoint)
            .map_err(|e| SyncError::checkpoint(e.to_string()))?;
        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SyncError::checkpoint(format!("cannot create {}: {}", dir.display(), e)))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| SyncError::checkpoint(format!("cannot create temporary file: {}", e)))?;
        tmp.write_all(encoded.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SyncError::checkpoint(format!("cannot write checkpoint: {}", e)))?;
        tmp.persist(&self.path).map_err(|e| {
            SyncError::checkpoint(format!("cannot replace {}: {}", self.path.display(), e.error))
        })?;
        Ok(())
    }

    fn read_lease(&self) -> Result<Option<LeaseRead>> {
        read_lease_file(&self.lease_path)
    }

    /// Publish `lease` at `target` unless a file is already there
    fn create_exclusive(&self, target: &Path, lease: &Lease) -> Result<bool> {
        let dir = self.parent_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SyncError::checkpoint(format!("cannot create {}: {}", dir.display(), e)))?;

        let body = serde_json::to_vec(lease).map_err(|e| SyncError::checkpoint(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| SyncError::checkpoint(format!("cannot create temporary file: {}", e)))?;
        tmp.write_all(&body)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| SyncError::checkpoint(format!("cannot write lease: {}", e)))?;

        match tmp.persist_noclobber(target) {
            Ok(_) => Ok(true),
            Err(e) if e.error.kind() == IoErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(SyncError::checkpoint(format!(
                "cannot create {}: {}",
                target.display(),
                e.error
            ))),
        }
    }

    /// Claim the takeover guard for `run_id`
    ///
    /// Fails with `LeaseHeld` while another run holds a live guard. A guard
    /// older than the lease TTL, or unreadable, was left by a crashed run and
    /// is cleared.
    fn takeover_guard(&self, run_id: Uuid) -> Result<TakeoverGuard> {
        let owner = Lease::new(run_id);
        for _ in 0..4 {
            if self.create_exclusive(&self.guard_path, &owner)? {
                return Ok(TakeoverGuard {
                    path: self.guard_path.clone(),
                });
            }
            match read_lease_file(&self.guard_path)? {
                None => continue,
                Some(Ok(holder)) if !holder.is_expired(self.lease_ttl, Utc::now()) => {
                    return Err(holder.held_error());
                },
                Some(_) => {
                    warn!(path = %self.guard_path.display(), "Clearing abandoned takeover guard");
                    remove_if_present(&self.guard_path)?;
                },
            }
        }
        Err(SyncError::checkpoint(format!(
            "could not claim {}",
            self.guard_path.display()
        )))
    }
}

/// A lease file's content, or why it could not be parsed
type LeaseRead = std::result::Result<Lease, String>;

fn read_lease_file(path: &Path) -> Result<Option<LeaseRead>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(serde_json::from_str(&text).map_err(|e| e.to_string()))),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(SyncError::checkpoint(format!(
            "cannot read lease {}: {}",
            path.display(),
            e
        ))),
    }
}

fn remove_if_present(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::checkpoint(format!(
            "cannot remove {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self) -> Result<Option<Checkpoint>> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(Checkpoint::decode_slot(&text).map_err(|e| {
                SyncError::checkpoint(format!("{} is corrupt: {}", self.path.display(), e))
            })?),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::checkpoint(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn set(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.write_slot(Some(checkpoint))?;
        debug!(checkpoint = %checkpoint, "Checkpoint saved");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.write_slot(None)?;
        info!(path = %self.path.display(), "Checkpoint cleared");
        Ok(())
    }

    async fn acquire_lease(&self, run_id: Uuid) -> Result<Lease> {
        let lease = Lease::new(run_id);
        for _ in 0..3 {
            if self.create_exclusive(&self.lease_path, &lease)? {
                debug!(run_id = %run_id, "Lease acquired");
                return Ok(lease);
            }
            let observed = match self.read_lease()? {
                // Released between our attempt and the read
                None => continue,
                Some(Ok(existing)) if !existing.is_expired(self.lease_ttl, Utc::now()) => {
                    return Err(existing.held_error());
                },
                Some(observed) => observed,
            };

            let _guard = self.takeover_guard(run_id)?;
            // Someone else replaced it since we looked; start over
            if self.read_lease()?.as_ref() != Some(&observed) {
                continue;
            }
            match &observed {
                Ok(existing) => warn!(
                    holder = %existing.run_id,
                    since = %existing.acquired_at,
                    "Taking over expired lease"
                ),
                Err(reason) => warn!(reason = %reason, "Replacing unreadable lease file"),
            }
            remove_if_present(&self.lease_path)?;
            if self.create_exclusive(&self.lease_path, &lease)? {
                debug!(run_id = %run_id, "Lease acquired");
                return Ok(lease);
            }
        }
        Err(SyncError::checkpoint(format!(
            "could not acquire lease {}",
            self.lease_path.display()
        )))
    }

    async fn release_lease(&self, lease: &Lease) -> Result<()> {
        let _guard = match self.takeover_guard(lease.run_id) {
            Ok(guard) => guard,
            Err(SyncError::LeaseHeld { holder, .. }) => {
                warn!(run_id = %lease.run_id, taker = %holder, "Lease is being taken over; leaving it");
                return Ok(());
            },
            Err(e) => return Err(e),
        };
        match self.read_lease()? {
            Some(Ok(current)) if current.run_id == lease.run_id => {
                remove_if_present(&self.lease_path)?;
                debug!(run_id = %lease.run_id, "Lease released");
            },
            Some(_) => {
                warn!(run_id = %lease.run_id, "Lease was taken over by another run; leaving it");
            },
            None => {
                warn!(run_id = %lease.run_id, "Lease already gone at release");
            },
        }
        Ok(())
    }

    async fn current_lease(&self) -> Result<Option<Lease>> {
        match self.read_lease()? {
            Some(Ok(lease)) => Ok(Some(lease)),
            Some(Err(reason)) => Err(SyncError::checkpoint(format!(
                "lease {} is unreadable: {}",
                self.lease_path.display(),
                reason
            ))),
            None => Ok(None),
        }
    }

    fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store for tests and embedding
#[derive(Debug)]
pub struct MemoryCheckpointStore {
    slot: Mutex<Option<Checkpoint>>,
    lease: Mutex<Option<Lease>>,
    history: Mutex<Vec<Checkpoint>>,
    lease_ttl: Duration,
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
            lease: Mutex::new(None),
            history: Mutex::new(Vec::new()),
            lease_ttl: Duration::from_secs(crate::config::DEFAULT_LEASE_TTL_SECS),
        }
    }
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::new();
        if let Ok(mut slot) = store.slot.lock() {
            *slot = Some(checkpoint);
        }
        store
    }

    /// Pretend another run holds the lease
    pub fn hold_lease(&self, lease: Lease) {
        if let Ok(mut current) = self.lease.lock() {
            *current = Some(lease);
        }
    }

    /// Every checkpoint set so far, in order
    pub fn history(&self) -> Vec<Checkpoint> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

fn poisoned<T>(_: T) -> SyncError {
    SyncError::checkpoint("checkpoint lock poisoned")
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self) -> Result<Option<Checkpoint>> {
        Ok(self.slot.lock().map_err(poisoned)?.clone())
    }

    async fn set(&self, checkpoint: &Checkpoint) -> Result<()> {
        *self.slot.lock().map_err(poisoned)? = Some(checkpoint.clone());
        self.history.lock().map_err(poisoned)?.push(checkpoint.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        *self.slot.lock().map_err(poisoned)? = None;
        Ok(())
    }

    async fn acquire_lease(&self, run_id: Uuid) -> Result<Lease> {
        let mut current = self.lease.lock().map_err(poisoned)?;
        if let Some(existing) = current.as_ref() {
            if !existing.is_expired(self.lease_ttl, Utc::now()) {
                return Err(existing.held_error());
            }
            warn!(holder = %existing.run_id, "Taking over expired lease");
        }
        let lease = Lease::new(run_id);
        *current = Some(lease.clone());
        Ok(lease)
    }

    async fn release_lease(&self, lease: &Lease) -> Result<()> {
        let mut current = self.lease.lock().map_err(poisoned)?;
        if current.as_ref().is_some_and(|l| l.run_id == lease.run_id) {
            *current = None;
        }
        Ok(())
    }

    async fn current_lease(&self) -> Result<Option<Lease>> {
        Ok(self.lease.lock().map_err(poisoned)?.clone())
    }

    fn lease_ttl(&self) -> Duration {
        self.lease_ttl
    }
}
