//! In-memory table store
//!
//! Used by tests and dry runs. Supports failure injection for the read and
//! write paths and records every bulk update it receives.

use super::{apply_to_grid, read_grid, validate_updates, RangeUpdate, TableStore, ValueInputOption};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use catsync_common::range::A1Range;
use catsync_common::CellValue;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryTableStore {
    sheets: Mutex<HashMap<String, Vec<Vec<CellValue>>>>,
    updates: Mutex<Vec<Vec<RangeUpdate>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store with one sheet built from text rows (empty strings become empty cells)
    pub fn with_sheet(sheet: &str, rows: &[&[&str]]) -> Self {
        let store = Self::new();
        let grid = rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| {
                        if cell.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::text(*cell)
                        }
                    })
                    .collect()
            })
            .collect();
        store.put_sheet(sheet, grid);
        store
    }

    pub fn put_sheet(&self, sheet: &str, grid: Vec<Vec<CellValue>>) {
        if let Ok(mut sheets) = self.sheets.lock() {
            sheets.insert(sheet.to_string(), grid);
        }
    }

    /// Current contents of a sheet
    pub fn sheet(&self, sheet: &str) -> Option<Vec<Vec<CellValue>>> {
        self.sheets.lock().ok()?.get(sheet).cloned()
    }

    /// Current contents of a single 1-based row, or an empty row
    pub fn row(&self, sheet: &str, row: u32) -> Vec<CellValue> {
        self.sheet(sheet)
            .and_then(|grid| grid.get((row as usize).saturating_sub(1)).cloned())
            .unwrap_or_default()
    }

    /// Every successful `batch_update` call, in order
    pub fn update_log(&self) -> Vec<Vec<RangeUpdate>> {
        self.updates
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Make subsequent reads fail
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn read_range(&self, range: &A1Range) -> Result<Vec<Vec<CellValue>>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(SyncError::store_read("injected read failure"));
        }
        let sheets = self
            .sheets
            .lock()
            .map_err(|_| SyncError::store_read("table lock poisoned"))?;
        let grid = sheets
            .get(&range.sheet)
            .ok_or_else(|| SyncError::store_read(format!("sheet '{}' does not exist", range.sheet)))?;
        Ok(read_grid(grid, range))
    }

    async fn batch_update(&self, updates: &[RangeUpdate], input: ValueInputOption) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::store_write("injected write failure"));
        }
        let mut sheets = self
            .sheets
            .lock()
            .map_err(|_| SyncError::store_write("table lock poisoned"))?;
        validate_updates(updates, |sheet| sheets.contains_key(sheet))?;

        for update in updates {
            if let Some(grid) = sheets.get_mut(&update.range.sheet) {
                apply_to_grid(grid, update, input);
            }
        }

        if let Ok(mut log) = self.updates.lock() {
            log.push(updates.to_vec());
        }
        Ok(())
    }
}
