//! FILENAME: core/cube-engine/src/cell_ref.rs
//! PURPOSE: Tagged reference to a stored row.
//! CONTEXT: A `CellRef` is the handle returned by storage lookups. Its variant
//! says whether the row lives in a numeric or a string page, and it borrows
//! that page, so a reference cannot outlive a grow or any other mutation of
//! the storage. The "no row" case is `Option::None` at the call sites.

use std::fmt;
use std::ptr;

use cube_model::{CellValue, ElementId, ValueKind};

use crate::page::{Page, RowValue};

/// A row inside a specific page.
pub struct RowRef<'a, V> {
    page: &'a Page<V>,
    row: usize,
}

impl<'a, V: RowValue> RowRef<'a, V> {
    pub(crate) fn new(page: &'a Page<V>, row: usize) -> Self {
        RowRef { page, row }
    }

    /// Physical row index inside the page.
    pub fn row(&self) -> usize {
        self.row
    }

    pub fn key(&self) -> &'a [ElementId] {
        self.page.key(self.row)
    }

    pub fn value(&self) -> &'a V {
        self.page.value(self.row)
    }

    fn same_row(&self, other: &Self) -> bool {
        ptr::eq(self.page, other.page) && self.row == other.row
    }
}

impl<V> Clone for RowRef<'_, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for RowRef<'_, V> {}

impl<V> fmt::Debug for RowRef<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowRef")
            .field("page", &(self.page as *const Page<V>))
            .field("row", &self.row)
            .finish()
    }
}

/// Discriminated handle to a stored numeric or string row.
#[derive(Debug, Clone, Copy)]
pub enum CellRef<'a> {
    Numeric(RowRef<'a, f64>),
    String(RowRef<'a, String>),
}

impl<'a> CellRef<'a> {
    pub fn kind(&self) -> ValueKind {
        match self {
            CellRef::Numeric(_) => ValueKind::Numeric,
            CellRef::String(_) => ValueKind::String,
        }
    }

    /// The full path key of the row.
    pub fn path(&self) -> &'a [ElementId] {
        match self {
            CellRef::Numeric(r) => r.key(),
            CellRef::String(r) => r.key(),
        }
    }

    /// Extracts an owned copy of the stored value.
    pub fn value(&self) -> CellValue {
        match self {
            CellRef::Numeric(r) => r.value().to_cell_value(),
            CellRef::String(r) => r.value().to_cell_value(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellRef::Numeric(r) => Some(*r.value()),
            CellRef::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            CellRef::Numeric(_) => None,
            CellRef::String(r) => Some(r.value().as_str()),
        }
    }
}

/// Two references are equal when they point at the same row of the same page.
impl PartialEq for CellRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CellRef::Numeric(a), CellRef::Numeric(b)) => a.same_row(b),
            (CellRef::String(a), CellRef::String(b)) => a.same_row(b),
            _ => false,
        }
    }
}

impl Eq for CellRef<'_> {}
