//! FILENAME: core/model/src/cell.rs
//! PURPOSE: Defines the value held by a single cube cell.
//! CONTEXT: Base cells store either a number or a string. Consolidated cells
//! are never stored; they are marked `Consolidated` until an aggregation
//! callback computes their value. Millions of these may be produced by a
//! single export, so the type stays a plain enum.

use serde::{Deserialize, Serialize};

/// The kind of value a stored row carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Numeric,
    String,
}

/// Represents the value of a cell addressed by a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    /// No value stored and nothing computed.
    Undefined,
    Numeric(f64),
    String(String),
    /// Placeholder for a value that has to be computed from descendants.
    Consolidated,
}

impl CellValue {
    /// Returns the numeric payload, if any.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Numeric(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// The storable kind of this value. `Undefined` and `Consolidated`
    /// cannot be stored and return `None`.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            CellValue::Numeric(_) => Some(ValueKind::Numeric),
            CellValue::String(_) => Some(ValueKind::String),
            CellValue::Undefined | CellValue::Consolidated => None,
        }
    }

    /// True for values an export with "skip empty" drops:
    /// undefined cells, numeric zero and the empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Undefined => true,
            CellValue::Numeric(n) => *n == 0.0,
            CellValue::String(s) => s.is_empty(),
            CellValue::Consolidated => false,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, CellValue::Undefined)
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Undefined
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Numeric(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_values() {
        assert!(CellValue::Undefined.is_empty());
        assert!(CellValue::Numeric(0.0).is_empty());
        assert!(CellValue::String(String::new()).is_empty());
        assert!(!CellValue::Numeric(-1.5).is_empty());
        assert!(!CellValue::from("x").is_empty());
        assert!(!CellValue::Consolidated.is_empty());
    }

    #[test]
    fn test_kind() {
        assert_eq!(CellValue::from(2.0).kind(), Some(ValueKind::Numeric));
        assert_eq!(CellValue::from("a").kind(), Some(ValueKind::String));
        assert_eq!(CellValue::Undefined.kind(), None);
        assert_eq!(CellValue::Consolidated.kind(), None);
    }
}
