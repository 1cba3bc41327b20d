//! Range-addressed table store
//!
//! The catalog lives in a spreadsheet-like store: named sheets of cells,
//! read and written through A1 ranges. `TableStore` is the seam; the CSV
//! store backs real runs and the in-memory store backs tests.

pub mod csv_store;
pub mod memory;
pub mod snapshot;

pub use csv_store::CsvTableStore;
pub use memory::MemoryTableStore;
pub use snapshot::{Record, Snapshot, TableReader};

use crate::error::{Result, SyncError};
use async_trait::async_trait;
use catsync_common::range::A1Range;
use catsync_common::CellValue;

/// How written values are interpreted by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValueInputOption {
    /// Store values exactly as given
    Raw,
    /// Parse values as if a user had typed them
    #[default]
    UserEntered,
}

/// Values to place starting at the top-left cell of `range`
#[derive(Debug, Clone, PartialEq)]
pub struct RangeUpdate {
    pub range: A1Range,
    pub values: Vec<Vec<CellValue>>,
}

impl RangeUpdate {
    /// A single-row update
    pub fn row(range: A1Range, values: Vec<CellValue>) -> Self {
        Self {
            range,
            values: vec![values],
        }
    }
}

/// Tabular store primitives used by a run
#[async_trait]
pub trait TableStore: Send + Sync {
    /// Read the cells of `range`, row by row
    ///
    /// Trailing empty cells and trailing empty rows are not returned.
    async fn read_range(&self, range: &A1Range) -> Result<Vec<Vec<CellValue>>>;

    /// Apply all updates in one request; either all land or none do
    async fn batch_update(&self, updates: &[RangeUpdate], input: ValueInputOption) -> Result<()>;
}

/// Read `range` out of an in-memory grid (row 1 is `grid[0]`)
pub(crate) fn read_grid(grid: &[Vec<CellValue>], range: &A1Range) -> Vec<Vec<CellValue>> {
    let first = (range.start_row - 1) as usize;
    let last = range
        .end_row
        .map(|end| end as usize)
        .unwrap_or(grid.len())
        .min(grid.len());

    let mut rows: Vec<Vec<CellValue>> = grid
        .get(first..last)
        .unwrap_or_default()
        .iter()
        .map(|row| {
            let mut cells: Vec<CellValue> = row
                .iter()
                .skip(range.start_col as usize)
                .take(range.width())
                .cloned()
                .collect();
            while cells.last().is_some_and(CellValue::is_empty) {
                cells.pop();
            }
            cells
        })
        .collect();

    while rows.last().is_some_and(|row| row.is_empty()) {
        rows.pop();
    }
    rows
}

/// Check every update fits its range before anything is written
pub(crate) fn validate_updates(updates: &[RangeUpdate], sheet_exists: impl Fn(&str) -> bool) -> Result<()> {
    for update in updates {
        if !sheet_exists(&update.range.sheet) {
            return Err(SyncError::store_write(format!(
                "sheet '{}' does not exist",
                update.range.sheet
            )));
        }
        if let Some(end) = update.range.end_row {
            let height = (end - update.range.start_row + 1) as usize;
            if update.values.len() > height {
                return Err(SyncError::store_write(format!(
                    "{} rows do not fit {}",
                    update.values.len(),
                    update.range
                )));
            }
        }
        if let Some(row) = update.values.iter().find(|row| row.len() > update.range.width()) {
            return Err(SyncError::store_write(format!(
                "{} values do not fit {}",
                row.len(),
                update.range
            )));
        }
    }
    Ok(())
}

/// Write one (already validated) update into a grid, growing it as needed
pub(crate) fn apply_to_grid(grid: &mut Vec<Vec<CellValue>>, update: &RangeUpdate, input: ValueInputOption) {
    for (offset, values) in update.values.iter().enumerate() {
        let row_idx = (update.range.start_row - 1) as usize + offset;
        if grid.len() <= row_idx {
            grid.resize_with(row_idx + 1, Vec::new);
        }
        let row = &mut grid[row_idx];
        let start = update.range.start_col as usize;
        if row.len() < start + values.len() {
            row.resize(start + values.len(), CellValue::Empty);
        }
        for (col, value) in values.iter().enumerate() {
            row[start + col] = match input {
                ValueInputOption::Raw => value.clone(),
                ValueInputOption::UserEntered => value.clone().user_entered(),
            };
        }
    }
}
