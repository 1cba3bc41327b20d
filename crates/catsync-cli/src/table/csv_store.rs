//! CSV-backed table store
//!
//! Each sheet is a headerless CSV file `<dir>/<sheet>.csv`. Cells are read
//! back as text; a bulk update rewrites the touched files through a temporary
//! file so a failed write never leaves a half-written sheet behind.

use super::{apply_to_grid, read_grid, validate_updates, RangeUpdate, TableStore, ValueInputOption};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use catsync_common::range::A1Range;
use catsync_common::CellValue;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Table store over a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvTableStore {
    dir: PathBuf,
}

impl CsvTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `sheet`
    pub fn sheet_path(&self, sheet: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", sheet))
    }

    fn load_sheet(&self, sheet: &str) -> std::result::Result<Vec<Vec<CellValue>>, String> {
        let path = self.sheet_path(sheet);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&path)
            .map_err(|e| format!("cannot open sheet '{}' at {}: {}", sheet, path.display(), e))?;

        let mut grid = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| format!("malformed row in {}: {}", path.display(), e))?;
            grid.push(
                record
                    .iter()
                    .map(|field| {
                        if field.is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::text(field)
                        }
                    })
                    .collect(),
            );
        }
        Ok(grid)
    }

    fn save_sheet(&self, sheet: &str, grid: &[Vec<CellValue>]) -> std::result::Result<(), String> {
        let path = self.sheet_path(sheet);
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| format!("cannot create temporary file in {}: {}", self.dir.display(), e))?;

        {
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_writer(tmp.as_file());
            for row in grid {
                writer
                    .write_record(row.iter().map(|cell| cell.to_string()))
                    .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
            }
            writer
                .flush()
                .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;
        }

        tmp.persist(&path)
            .map_err(|e| format!("cannot replace {}: {}", path.display(), e.error))?;
        Ok(())
    }
}

#[async_trait]
impl TableStore for CsvTableStore {
    async fn read_range(&self, range: &A1Range) -> Result<Vec<Vec<CellValue>>> {
        let grid = self.load_sheet(&range.sheet).map_err(SyncError::StoreRead)?;
        let rows = read_grid(&grid, range);
        debug!(range = %range, rows = rows.len(), "Read range");
        Ok(rows)
    }

    async fn batch_update(&self, updates: &[RangeUpdate], input: ValueInputOption) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        validate_updates(updates, |sheet| self.sheet_path(sheet).is_file())?;

        // Stage every sheet in memory first so a bad file aborts before any write
        let mut sheets: BTreeMap<&str, Vec<Vec<CellValue>>> = BTreeMap::new();
        for update in updates {
            let sheet = update.range.sheet.as_str();
            if !sheets.contains_key(sheet) {
                let grid = self.load_sheet(sheet).map_err(SyncError::StoreWrite)?;
                sheets.insert(sheet, grid);
            }
            if let Some(grid) = sheets.get_mut(sheet) {
                apply_to_grid(grid, update, input);
            }
        }

        for (sheet, grid) in &sheets {
            self.save_sheet(sheet, grid).map_err(SyncError::StoreWrite)?;
        }
        debug!(updates = updates.len(), sheets = sheets.len(), "Applied batch update");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::fs;

    fn store_with(contents: &str) -> (tempfile::TempDir, CsvTableStore) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Research.csv"), contents).unwrap();
        let store = CsvTableStore::new(dir.path());
        (dir, store)
    }

    #[tokio::test]
    async fn test_read_range() {
        let (_dir, store) = store_with("ASIN,title\nA1,\nB2,Gadget\n");
        let rows = store
            .read_range(&A1Range::from_row("Research", 1))
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], vec![CellValue::text("ASIN"), CellValue::text("title")]);
        assert_eq!(rows[1], vec![CellValue::text("A1")]);
        assert_eq!(rows[2][1], CellValue::text("Gadget"));
    }

    #[tokio::test]
    async fn test_missing_sheet_is_read_error() {
        let (_dir, store) = store_with("ASIN\n");
        let err = store
            .read_range(&A1Range::from_row("Other", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreRead);
    }

    #[tokio::test]
    async fn test_batch_update_rewrites_rows() {
        let (dir, store) = store_with("ASIN,title,price\nA1,old,\nB2,,\n");
        let updates = vec![
            RangeUpdate::row(
                A1Range::row("Research", 3),
                vec!["B2".into(), "Gadget".into(), "980".into()],
            ),
            RangeUpdate::row(
                A1Range::row("Research", 5),
                vec!["E5".into(), "'0042".into()],
            ),
        ];
        store
            .batch_update(&updates, ValueInputOption::UserEntered)
            .await
            .unwrap();

        let written = fs::read_to_string(dir.path().join("Research.csv")).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[1], "A1,old,");
        assert_eq!(lines[2], "B2,Gadget,980");

        // The gap row must survive so row numbers stay stable
        let rows = store
            .read_range(&A1Range::from_row("Research", 1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows[3].is_empty());
        assert_eq!(rows[4], vec![CellValue::text("E5"), CellValue::text("0042")]);
    }

    #[tokio::test]
    async fn test_batch_update_to_unknown_sheet_writes_nothing() {
        let (dir, store) = store_with("ASIN\nA1\n");
        let updates = vec![
            RangeUpdate::row(A1Range::row("Research", 2), vec!["X".into()]),
            RangeUpdate::row(A1Range::row("Missing", 2), vec!["Y".into()]),
        ];
        let err = store
            .batch_update(&updates, ValueInputOption::UserEntered)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::StoreWrite);
        let untouched = fs::read_to_string(dir.path().join("Research.csv")).unwrap();
        assert_eq!(untouched, "ASIN\nA1\n");
    }
}
