//! Record snapshots
//!
//! A snapshot is the ordered list of catalog records read once at the start
//! of a run. Every record keeps its 1-based sheet row so later writes land on
//! the row the record came from.

use super::TableStore;
use crate::error::{Result, SyncError};
use catsync_common::range::A1Range;
use catsync_common::CellValue;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

/// One catalog row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: String,
    /// 1-based sheet row
    pub position: u32,
    /// Cell text by header name
    pub fields: BTreeMap<String, String>,
}

/// Ordered records plus a key index
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    header: Vec<String>,
    key_column: usize,
    records: Vec<Record>,
    index: HashMap<String, usize>,
    rejected_rows: Vec<u32>,
    duplicate_keys: usize,
}

impl Snapshot {
    /// Build a snapshot from the rows read starting at the header row
    ///
    /// `values[0]` is the header; `values[i]` sits at sheet row
    /// `head_row + i`. Rows with an empty key are left out and reported
    /// through [`Snapshot::rejected_rows`].
    pub fn from_rows(head_row: u32, key_column: &str, values: Vec<Vec<CellValue>>) -> Result<Self> {
        let mut rows = values.into_iter();
        let header: Vec<String> = match rows.next() {
            Some(header) => header.iter().map(|cell| cell.to_string().trim().to_string()).collect(),
            None => return Ok(Self::default()),
        };
        let key_idx = header
            .iter()
            .position(|name| name == key_column)
            .ok_or_else(|| {
                SyncError::store_read(format!("key column '{}' not found in header row {}", key_column, head_row))
            })?;

        let mut snapshot = Snapshot {
            header,
            key_column: key_idx,
            ..Self::default()
        };

        for (i, row) in rows.enumerate() {
            let position = u32::try_from(i)
                .ok()
                .and_then(|i| head_row.checked_add(1)?.checked_add(i))
                .ok_or_else(|| SyncError::store_read("table has more rows than can be addressed"))?;

            let key = row
                .get(key_idx)
                .map(|cell| cell.to_string().trim().to_string())
                .unwrap_or_default();
            if key.is_empty() {
                // Fully blank rows are not reported
                if row.iter().any(|cell| !cell.is_empty()) {
                    snapshot.rejected_rows.push(position);
                }
                continue;
            }

            let fields = snapshot
                .header
                .iter()
                .zip(row.iter().map(|cell| cell.to_string()).chain(std::iter::repeat(String::new())))
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| (name.clone(), value))
                .collect();

            if snapshot.index.contains_key(&key) {
                snapshot.duplicate_keys += 1;
                warn!(key = %key, position, "Duplicate key; writes go to its first row");
            } else {
                snapshot.index.insert(key.clone(), snapshot.records.len());
            }
            snapshot.records.push(Record { key, position, fields });
        }

        if !snapshot.rejected_rows.is_empty() {
            warn!(
                rows = ?snapshot.rejected_rows,
                "Skipped rows with an empty key"
            );
        }
        Ok(snapshot)
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    /// 0-based column holding the key
    pub fn key_column(&self) -> usize {
        self.key_column
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First record with the given key
    pub fn find(&self, key: &str) -> Option<&Record> {
        self.index.get(key).and_then(|&idx| self.records.get(idx))
    }

    /// Sheet rows left out because their key was empty
    pub fn rejected_rows(&self) -> &[u32] {
        &self.rejected_rows
    }

    pub fn duplicate_keys(&self) -> usize {
        self.duplicate_keys
    }
}

/// Reads a snapshot from a table store
pub struct TableReader<'a> {
    store: &'a dyn TableStore,
    sheet: &'a str,
    head_row: u32,
    key_column: &'a str,
}

impl<'a> TableReader<'a> {
    pub fn new(store: &'a dyn TableStore, sheet: &'a str, head_row: u32, key_column: &'a str) -> Self {
        Self {
            store,
            sheet,
            head_row,
            key_column,
        }
    }

    /// Read `<sheet>!A<head_row>:ZZ` and build the snapshot
    pub async fn read(&self) -> Result<Snapshot> {
        let range = A1Range::from_row(self.sheet, self.head_row);
        let values = self.store.read_range(&range).await?;
        let snapshot = Snapshot::from_rows(self.head_row, self.key_column, values)?;
        debug!(
            range = %range,
            records = snapshot.len(),
            rejected = snapshot.rejected_rows().len(),
            "Read snapshot"
        );
        Ok(snapshot)
    }
}
