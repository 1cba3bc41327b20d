//! A1-notation range addressing
//!
//! The tabular store is addressed the way spreadsheets are: `Sheet!A2:ZZ2`
//! for a single row, `Sheet!A1:ZZ` for everything from row 1 down.
//! Columns are 0-based internally and rows are 1-based.

use crate::error::{CommonError, Result};
use std::str::FromStr;

/// Last column written by row-level updates (`ZZ`)
pub const LAST_COLUMN: &str = "ZZ";

/// A rectangular (or open-ended) range on a named sheet
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct A1Range {
    pub sheet: String,
    pub start_col: u32,
    pub start_row: u32,
    pub end_col: u32,
    /// `None` means "to the last row of the sheet"
    pub end_row: Option<u32>,
}

impl A1Range {
    /// Full-width range covering exactly one row (`Sheet!A<row>:ZZ<row>`)
    pub fn row(sheet: impl Into<String>, row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start_col: 0,
            start_row: row,
            end_col: last_column_index(),
            end_row: Some(row),
        }
    }

    /// Full-width range from `row` to the end of the sheet (`Sheet!A<row>:ZZ`)
    pub fn from_row(sheet: impl Into<String>, row: u32) -> Self {
        Self {
            sheet: sheet.into(),
            start_col: 0,
            start_row: row,
            end_col: last_column_index(),
            end_row: None,
        }
    }

    /// Same range, starting at the 0-based column `col` (clamped to `end_col`)
    pub fn starting_at(mut self, col: u32) -> Self {
        self.start_col = col.min(self.end_col);
        self
    }

    /// Number of columns covered
    pub fn width(&self) -> usize {
        (self.end_col - self.start_col + 1) as usize
    }
}

impl std::fmt::Display for A1Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if needs_quoting(&self.sheet) {
            write!(f, "'{}'!", self.sheet.replace('\'', "''"))?;
        } else {
            write!(f, "{}!", self.sheet)?;
        }
        write!(
            f,
            "{}{}:{}",
            column_letters(self.start_col),
            self.start_row,
            column_letters(self.end_col)
        )?;
        if let Some(end) = self.end_row {
            write!(f, "{}", end)?;
        }
        Ok(())
    }
}

impl FromStr for A1Range {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        let (sheet, cells) = s
            .rsplit_once('!')
            .ok_or_else(|| CommonError::invalid_range(s, "missing sheet name"))?;
        let sheet = unquote_sheet(sheet);
        if sheet.is_empty() {
            return Err(CommonError::invalid_range(s, "empty sheet name"));
        }

        let (start, end) = match cells.split_once(':') {
            Some((start, end)) => (start, Some(end)),
            None => (cells, None),
        };

        let (start_col, start_row) = split_cell(start).ok_or_else(|| {
            CommonError::invalid_range(s, format!("invalid start cell '{}'", start))
        })?;
        let start_row =
            start_row.ok_or_else(|| CommonError::invalid_range(s, "start cell needs a row"))?;
        if start_row == 0 {
            return Err(CommonError::invalid_range(s, "rows start at 1"));
        }

        let (end_col, end_row) = match end {
            Some(end) => split_cell(end).ok_or_else(|| {
                CommonError::invalid_range(s, format!("invalid end cell '{}'", end))
            })?,
            None => (start_col, Some(start_row)),
        };

        if end_col < start_col || end_row.is_some_and(|end| end < start_row) {
            return Err(CommonError::invalid_range(s, "end precedes start"));
        }

        Ok(Self {
            sheet,
            start_col,
            start_row,
            end_col,
            end_row,
        })
    }
}

/// Convert column letters (`A`, `Z`, `AA`, `ZZ`) to a 0-based index
pub fn column_index(letters: &str) -> Result<u32> {
    if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(CommonError::InvalidColumn(letters.to_string()));
    }
    let mut index: u32 = 0;
    for c in letters.chars() {
        let digit = (c.to_ascii_uppercase() as u32) - ('A' as u32) + 1;
        index = index
            .checked_mul(26)
            .and_then(|i| i.checked_add(digit))
            .ok_or_else(|| CommonError::InvalidColumn(letters.to_string()))?;
    }
    Ok(index - 1)
}

/// Convert a 0-based column index to letters
pub fn column_letters(index: u32) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = ((n - 1) % 26) as u8;
        letters.push((b'A' + rem) as char);
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

fn last_column_index() -> u32 {
    // ZZ is a fixed, valid column
    column_index(LAST_COLUMN).unwrap_or(701)
}

fn split_cell(cell: &str) -> Option<(u32, Option<u32>)> {
    let split = cell
        .find(|c: char| c.is_ascii_digit())
        .unwrap_or(cell.len());
    let (letters, digits) = cell.split_at(split);
    let col = column_index(letters).ok()?;
    let row = if digits.is_empty() {
        None
    } else {
        Some(digits.parse().ok()?)
    };
    Some((col, row))
}

fn needs_quoting(sheet: &str) -> bool {
    sheet
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '!' | '\'' | ':'))
}

fn unquote_sheet(sheet: &str) -> String {
    match sheet
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        Some(inner) => inner.replace("''", "'"),
        None => sheet.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_column_conversion() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("z").unwrap(), 25);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert_eq!(column_index("ZZ").unwrap(), 701);
        assert!(column_index("A1").is_err());
        assert!(column_index("").is_err());

        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
        assert_eq!(column_letters(701), "ZZ");
    }

    #[test]
    fn test_parse_row_range() {
        let range: A1Range = "Research!A2:ZZ2".parse().unwrap();
        assert_eq!(range.sheet, "Research");
        assert_eq!(range.start_col, 0);
        assert_eq!(range.start_row, 2);
        assert_eq!(range.end_col, 701);
        assert_eq!(range.end_row, Some(2));
        assert_eq!(range.width(), 702);
        assert_eq!(range, A1Range::row("Research", 2));
    }

    #[test]
    fn test_row_starting_at_column() {
        let range = A1Range::row("Research", 5).starting_at(1);
        assert_eq!(range.to_string(), "Research!B5:ZZ5");
        assert_eq!(range.width(), 701);
        assert_eq!(A1Range::row("Research", 5).starting_at(900).start_col, 701);
    }

    #[test]
    fn test_parse_open_range() {
        let range: A1Range = "リサーチ!A1:ZZ".parse().unwrap();
        assert_eq!(range, A1Range::from_row("リサーチ", 1));
        assert_eq!(range.end_row, None);
    }

    #[test]
    fn test_parse_single_cell_and_quoted_sheet() {
        let range: A1Range = "'My Sheet'!B3".parse().unwrap();
        assert_eq!(range.sheet, "My Sheet");
        assert_eq!(range.start_col, 1);
        assert_eq!(range.end_col, 1);
        assert_eq!(range.end_row, Some(3));
    }

    #[test]
    fn test_parse_rejects_bad_ranges() {
        assert!("A1:B2".parse::<A1Range>().is_err());
        assert!("Sheet!1:2".parse::<A1Range>().is_err());
        assert!("Sheet!A0:B2".parse::<A1Range>().is_err());
        assert!("Sheet!C1:A2".parse::<A1Range>().is_err());
        assert!("Sheet!A5:B2".parse::<A1Range>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(A1Range::row("Research", 4).to_string(), "Research!A4:ZZ4");
        assert_eq!(A1Range::from_row("Research", 1).to_string(), "Research!A1:ZZ");
        assert_eq!(A1Range::row("My Sheet", 2).to_string(), "'My Sheet'!A2:ZZ2");
    }
}
