//! Common types used across catsync

use crate::error::{CommonError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Cell Values
// ============================================================================

/// A single cell of the tabular store.
///
/// Serialized untagged so a JSON row looks like `["B00X", "Title", 1280, null]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    Bool(bool),
    Number(f64),
    Text(String),
    #[default]
    Empty,
}

impl CellValue {
    /// Create a text cell
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Whether the cell carries no value (an empty string counts as empty)
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Interpret raw input the way a user typing into the cell would.
    ///
    /// A leading apostrophe forces text, `TRUE`/`FALSE` become booleans and
    /// finite numbers become numeric cells. Everything else stays text.
    pub fn from_user_input(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return CellValue::Empty;
        }
        if let Some(rest) = input.strip_prefix('\'') {
            return CellValue::Text(rest.to_string());
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return CellValue::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return CellValue::Bool(false);
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && !trimmed.starts_with('+') => CellValue::Number(n),
            _ => CellValue::Text(input.to_string()),
        }
    }

    /// Re-interpret this value as user-entered input.
    ///
    /// Only text cells change; typed cells are already what a user would get.
    pub fn user_entered(self) -> Self {
        match self {
            CellValue::Text(s) => CellValue::from_user_input(&s),
            other => other,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Bool(true) => write!(f, "TRUE"),
            CellValue::Bool(false) => write!(f, "FALSE"),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            },
            CellValue::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(CellValue::Empty)
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Marker of the last row that was fully processed and written.
///
/// `position` is the 1-based sheet row number of that row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub key: String,
    pub position: u32,
}

impl Checkpoint {
    pub fn new(key: impl Into<String>, position: u32) -> Self {
        Self {
            key: key.into(),
            position,
        }
    }

    /// Encode the checkpoint slot as a JSON object with at most one entry.
    ///
    /// `None` encodes as `{}`.
    pub fn encode_slot(checkpoint: Option<&Checkpoint>) -> Result<String> {
        let mut slot = BTreeMap::new();
        if let Some(cp) = checkpoint {
            slot.insert(cp.key.clone(), cp.position);
        }
        Ok(serde_json::to_string(&slot)?)
    }

    /// Decode a persisted slot.
    ///
    /// Blank text, `{}`, an empty key or a zero position all decode to
    /// `None`. More than one entry is rejected.
    pub fn decode_slot(text: &str) -> Result<Option<Checkpoint>> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        let slot: BTreeMap<String, u32> = serde_json::from_str(text)?;
        if slot.len() > 1 {
            return Err(CommonError::InvalidCheckpoint(format!(
                "expected at most one entry, found {}",
                slot.len()
            )));
        }
        Ok(slot
            .into_iter()
            .next()
            .filter(|(key, position)| !key.is_empty() && *position > 0)
            .map(|(key, position)| Checkpoint { key, position }))
    }

    /// Human-readable status line used in progress and error messages
    pub fn status_line(checkpoint: Option<&Checkpoint>) -> String {
        match checkpoint {
            Some(cp) => format!("last update position: {}", cp),
            None => "last update position: none".to_string(),
        }
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "row {} ({})", self.position, self.key)
    }
}

// ============================================================================
// Enrichment Results
// ============================================================================

/// External data returned for one catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    /// Record key the data belongs to
    pub key: String,

    /// Enriched output fields by name
    #[serde(default)]
    pub fields: BTreeMap<String, CellValue>,
}

impl EnrichmentResult {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field, builder style
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Look up a field, treating a missing field as an empty cell
    pub fn field(&self, name: &str) -> CellValue {
        self.fields.get(name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_input_parsing() {
        assert_eq!(CellValue::from_user_input(""), CellValue::Empty);
        assert_eq!(CellValue::from_user_input("1280"), CellValue::Number(1280.0));
        assert_eq!(CellValue::from_user_input("12.5"), CellValue::Number(12.5));
        assert_eq!(CellValue::from_user_input("TRUE"), CellValue::Bool(true));
        assert_eq!(CellValue::from_user_input("false"), CellValue::Bool(false));
        assert_eq!(CellValue::from_user_input("'0012"), CellValue::text("0012"));
        assert_eq!(CellValue::from_user_input("NaN"), CellValue::text("NaN"));
        assert_eq!(CellValue::from_user_input("B00ABC"), CellValue::text("B00ABC"));
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Number(1280.0).to_string(), "1280");
        assert_eq!(CellValue::Number(12.5).to_string(), "12.5");
        assert_eq!(CellValue::Bool(true).to_string(), "TRUE");
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn test_cell_json_shape() {
        let row = vec![
            CellValue::text("B00X"),
            CellValue::Number(1280.0),
            CellValue::Empty,
        ];
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"["B00X",1280.0,null]"#);
        let back: Vec<CellValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    #[test]
    fn test_checkpoint_slot_encoding() {
        let cp = Checkpoint::new("C3", 4);
        assert_eq!(Checkpoint::encode_slot(Some(&cp)).unwrap(), r#"{"C3":4}"#);
        assert_eq!(Checkpoint::encode_slot(None).unwrap(), "{}");
    }

    #[test]
    fn test_checkpoint_slot_decoding() {
        assert_eq!(
            Checkpoint::decode_slot(r#"{"B2":3}"#).unwrap(),
            Some(Checkpoint::new("B2", 3))
        );
        assert_eq!(Checkpoint::decode_slot("{}").unwrap(), None);
        assert_eq!(Checkpoint::decode_slot("").unwrap(), None);
        assert_eq!(Checkpoint::decode_slot(r#"{"":0}"#).unwrap(), None);
        assert!(Checkpoint::decode_slot(r#"{"A1":2,"B2":3}"#).is_err());
        assert!(Checkpoint::decode_slot("not json").is_err());
    }

    #[test]
    fn test_status_line() {
        let cp = Checkpoint::new("C3", 4);
        assert_eq!(
            Checkpoint::status_line(Some(&cp)),
            "last update position: row 4 (C3)"
        );
        assert_eq!(Checkpoint::status_line(None), "last update position: none");
    }

    #[test]
    fn test_enrichment_result_fields() {
        let result = EnrichmentResult::new("A1")
            .with_field("title", "Widget")
            .with_field("buybox_price", Some(1280_i64));
        assert_eq!(result.field("title"), CellValue::text("Widget"));
        assert_eq!(result.field("buybox_price"), CellValue::Number(1280.0));
        assert_eq!(result.field("missing"), CellValue::Empty);
    }
}
