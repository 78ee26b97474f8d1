/// Shared data structures for the comparison table
///
/// These types flow between the scanner, the report file and the
/// presentation layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Reserved column mapping every row to its identity
pub const UNIQUE_NAME: &str = "Unique Name";

/// One pipeline output location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSet {
    /// Display name (only present for sets declared as `name:dir:suffix`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Root directory of the set
    pub directory: PathBuf,
    /// Stem suffix distinguishing this set's files (may be empty)
    #[serde(default)]
    pub suffix: String,
}

impl ImageSet {
    pub fn new(directory: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            name: None,
            directory: directory.into(),
            suffix: suffix.into(),
        }
    }

    pub fn named(name: impl Into<String>, directory: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::new(directory, suffix)
        }
    }
}

/// A derived column computed from two image columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffPair {
    pub name: String,
    pub left_column: String,
    pub right_column: String,
}

impl DiffPair {
    /// Pair named `<left>-<right>`
    pub fn new(left: impl Into<String>, right: impl Into<String>) -> Self {
        let left_column = left.into();
        let right_column = right.into();
        Self {
            name: format!("{}-{}", left_column, right_column),
            left_column,
            right_column,
        }
    }
}

/// Cell content, typed once when it is written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl CellValue {
    /// Classify raw text: integer, else float, else text
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Ok(i) = trimmed.parse::<i64>() {
            return CellValue::Integer(i);
        }
        match trimmed.parse::<f64>() {
            Ok(f) if f.is_finite() => CellValue::Float(f),
            _ => CellValue::Text(text.to_string()),
        }
    }

    /// Re-type a text cell; numbers are returned as they are
    pub fn classified(self) -> Self {
        match self {
            CellValue::Text(text) => CellValue::parse(&text),
            other => other,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Blank cells are the only ones a report reconcile may fill
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Text(text) if text.is_empty())
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{:.5}", v),
            CellValue::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for CellValue {
    fn from(text: &str) -> Self {
        CellValue::Text(text.to_string())
    }
}

impl From<String> for CellValue {
    fn from(text: String) -> Self {
        CellValue::Text(text)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_order() {
        assert_eq!(CellValue::parse("42"), CellValue::Integer(42));
        assert_eq!(CellValue::parse("-3"), CellValue::Integer(-3));
        assert_eq!(CellValue::parse("2.5"), CellValue::Float(2.5));
        assert_eq!(CellValue::parse("1e3"), CellValue::Float(1000.0));
        assert_eq!(CellValue::parse("/a/b.png"), CellValue::Text("/a/b.png".into()));
        assert_eq!(CellValue::parse("nan"), CellValue::Text("nan".into()));
    }

    #[test]
    fn test_empty_cell() {
        assert!(CellValue::from("").is_empty());
        assert!(!CellValue::Integer(0).is_empty());
        assert!(!CellValue::from("0").is_empty());
    }

    #[test]
    fn test_diff_pair_name() {
        let pair = DiffPair::new("out_set0", "out_set1");
        assert_eq!(pair.name, "out_set0-out_set1");
    }

    #[test]
    fn test_image_set_serialization() {
        let set = ImageSet::new("/data/run", "_a");
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"{"directory":"/data/run","suffix":"_a"}"#);

        let named: ImageSet =
            serde_json::from_str(r#"{"name":"ref","directory":"/r","suffix":""}"#).unwrap();
        assert_eq!(named, ImageSet::named("ref", "/r", ""));
    }
}
