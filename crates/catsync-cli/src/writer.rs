//! Write-back of enrichment results
//!
//! Each result is matched to its record by key and written as one full row,
//! `[key, <output fields>...]`, starting at the key column. All rows of a
//! batch go out in a single bulk update.

use crate::api::OUTPUT_FIELDS;
use crate::error::{Result, SyncError};
use crate::table::{RangeUpdate, Snapshot, TableStore, ValueInputOption};
use catsync_common::range::A1Range;
use catsync_common::{CellValue, Checkpoint, EnrichmentResult};
use std::sync::Arc;
use tracing::{debug, warn};

/// What a write produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteOutcome {
    /// Key and position of the last staged row, in batch order
    pub last: Option<Checkpoint>,
    pub rows_written: usize,
    /// Result keys with no matching record
    pub unmatched: Vec<String>,
}

pub struct Writer {
    store: Arc<dyn TableStore>,
    sheet: String,
    fields: Vec<String>,
}

impl Writer {
    /// Writer for the default output columns
    pub fn new(store: Arc<dyn TableStore>, sheet: impl Into<String>) -> Self {
        Self::with_fields(store, sheet, OUTPUT_FIELDS.iter().map(|f| f.to_string()).collect())
    }

    /// Writer placing the named result fields after the key column
    pub fn with_fields(store: Arc<dyn TableStore>, sheet: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            store,
            sheet: sheet.into(),
            fields,
        }
    }

    fn row_values(&self, result: &EnrichmentResult) -> Vec<CellValue> {
        std::iter::once(CellValue::text(result.key.clone()))
            .chain(self.fields.iter().map(|name| result.field(name)))
            .collect()
    }

    /// Stage and write every matched result of one batch
    ///
    /// Nothing is sent to the store when no result matched.
    pub async fn apply(&self, snapshot: &Snapshot, results: &[EnrichmentResult]) -> Result<WriteOutcome> {
        let mut outcome = WriteOutcome::default();
        let mut updates = Vec::with_capacity(results.len());
        let key_col = u32::try_from(snapshot.key_column())
            .map_err(|_| SyncError::store_write("key column is out of range"))?;

        for result in results {
            match snapshot.find(&result.key) {
                Some(record) => {
                    updates.push(RangeUpdate::row(
                        A1Range::row(self.sheet.as_str(), record.position).starting_at(key_col),
                        self.row_values(result),
                    ));
                    outcome.last = Some(Checkpoint::new(record.key.clone(), record.position));
                },
                None => {
                    warn!(key = %result.key, "Result has no matching row; dropped");
                    outcome.unmatched.push(result.key.clone());
                },
            }
        }

        if updates.is_empty() {
            debug!("Nothing staged; skipping write");
            return Ok(outcome);
        }

        self.store
            .batch_update(&updates, ValueInputOption::UserEntered)
            .await?;
        outcome.rows_written = updates.len();
        debug!(rows = outcome.rows_written, last = ?outcome.last, "Wrote rows");
        Ok(outcome)
    }
}
