//! FILENAME: core/cube-engine/src/page.rs
//! PURPOSE: Growable block of fixed-width rows (value + path key).
//! CONTEXT: A page holds the rows of one value kind for one storage bucket.
//! Values live in one contiguous column and path keys in a second, flat
//! column (`width` identifiers per row), so a row is addressed by a single
//! index. Capacity is managed explicitly through a `CapacityPolicy`: pages
//! grow geometrically when full and only shrink when compaction asks them to.
//! Every capacity change reports its signed byte delta so owners can keep an
//! external counter exact.

use std::collections::TryReserveError;
use std::mem;

use cube_model::{CellValue, ElementId, ValueKind};

use crate::config::CapacityPolicy;

/// Signed change of a buffer footprint, in bytes.
pub type ByteDelta = isize;

/// A value type that can be stored in a page row.
pub trait RowValue: Clone {
    const KIND: ValueKind;

    fn to_cell_value(&self) -> CellValue;
}

impl RowValue for f64 {
    const KIND: ValueKind = ValueKind::Numeric;

    fn to_cell_value(&self) -> CellValue {
        CellValue::Numeric(*self)
    }
}

impl RowValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn to_cell_value(&self) -> CellValue {
        CellValue::String(self.clone())
    }
}

/// Page of numeric rows.
pub type NumericPage = Page<f64>;

/// Page of string rows.
pub type StringPage = Page<String>;

#[derive(Debug, Clone)]
pub struct Page<V> {
    /// Number of element identifiers per row key.
    width: usize,
    values: Vec<V>,
    /// Row keys, `width` identifiers per row, in row order.
    keys: Vec<ElementId>,
    policy: CapacityPolicy,
}

impl<V: RowValue> Page<V> {
    /// Creates an empty page. No memory is allocated until the first push.
    pub fn new(width: usize, policy: CapacityPolicy) -> Self {
        Page {
            width,
            values: Vec::new(),
            keys: Vec::new(),
            policy,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Row capacity currently allocated.
    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn kind(&self) -> ValueKind {
        V::KIND
    }

    /// Width of one row in bytes.
    pub fn row_size(&self) -> usize {
        Self::row_size_for(self.width)
    }

    /// Width in bytes of a row keyed by `width` identifiers.
    pub fn row_size_for(width: usize) -> usize {
        mem::size_of::<V>() + width * mem::size_of::<ElementId>()
    }

    /// Bytes held by the page buffers.
    pub fn byte_size(&self) -> usize {
        self.values.capacity() * mem::size_of::<V>()
            + self.keys.capacity() * mem::size_of::<ElementId>()
    }

    pub fn key(&self, row: usize) -> &[ElementId] {
        let start = row * self.width;
        &self.keys[start..start + self.width]
    }

    pub fn value(&self, row: usize) -> &V {
        &self.values[row]
    }

    /// Finds the row holding exactly `key`. Linear in the page length.
    pub fn find(&self, key: &[ElementId]) -> Option<usize> {
        if key.len() != self.width || self.width == 0 {
            return None;
        }
        self.keys.chunks_exact(self.width).position(|k| k == key)
    }

    /// Iterates rows in physical order.
    pub fn rows(&self) -> impl Iterator<Item = (&[ElementId], &V)> + '_ {
        self.keys
            .chunks_exact(self.width.max(1))
            .zip(self.values.iter())
    }

    /// Bytes the next `push` would add to the page.
    pub fn push_growth(&self) -> usize {
        let capacity = self.values.capacity();
        if self.values.len() < capacity {
            return 0;
        }
        let target = self.policy.grown_capacity(capacity, self.values.len() + 1);
        (target * self.row_size()).saturating_sub(self.byte_size())
    }

    /// Overwrites the value of an existing row in place.
    pub fn set(&mut self, row: usize, value: V) {
        self.values[row] = value;
    }

    /// Appends a row, growing the buffers first if the page is full.
    ///
    /// # Errors
    /// Returns the allocator error if growth fails; the page is unchanged.
    pub fn push(&mut self, key: &[ElementId], value: V) -> Result<ByteDelta, TryReserveError> {
        debug_assert_eq!(key.len(), self.width);
        let before = self.byte_size();

        if self.values.len() == self.values.capacity() {
            let target = self
                .policy
                .grown_capacity(self.values.capacity(), self.values.len() + 1);
            self.reserve_rows(target)?;
        }

        self.values.push(value);
        self.keys.extend_from_slice(key);
        Ok(self.byte_size() as ByteDelta - before as ByteDelta)
    }

    /// Removes a row by moving the last row into its slot.
    /// Capacity is kept; only `shrink` releases memory.
    pub fn swap_remove(&mut self, row: usize) -> V {
        let last = self.values.len() - 1;
        if row != last {
            let (dst, src) = (row * self.width, last * self.width);
            self.keys.copy_within(src..src + self.width, dst);
        }
        self.keys.truncate(last * self.width);
        self.values.swap_remove(row)
    }

    /// Shrinks the buffers according to the capacity policy.
    pub fn shrink(&mut self) -> ByteDelta {
        let before = self.byte_size();
        if let Some(target) = self.policy.shrink_target(self.len(), self.capacity()) {
            self.values.shrink_to(target);
            self.keys.shrink_to(target * self.width);
        }
        self.byte_size() as ByteDelta - before as ByteDelta
    }

    /// Drops every row and releases the buffers.
    pub fn clear(&mut self) -> ByteDelta {
        let before = self.byte_size();
        self.values = Vec::new();
        self.keys = Vec::new();
        -(before as ByteDelta)
    }

    fn reserve_rows(&mut self, target: usize) -> Result<(), TryReserveError> {
        let additional = target - self.values.len();
        let previous = self.values.capacity();
        self.values.try_reserve_exact(additional)?;
        if let Err(err) = self.keys.try_reserve_exact(additional * self.width) {
            self.values.shrink_to(previous);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(width: usize) -> NumericPage {
        Page::new(width, CapacityPolicy::default())
    }

    #[test]
    fn test_empty_page_allocates_nothing() {
        let p = page(3);
        assert_eq!(p.byte_size(), 0);
        assert_eq!(p.find(&[1, 2, 3]), None);
    }

    #[test]
    fn test_push_and_find() {
        let mut p = page(2);
        let delta = p.push(&[1, 2], 5.0).unwrap();
        assert_eq!(delta as usize, p.byte_size());
        assert_eq!(p.byte_size(), 8 * (8 + 2 * 4));
        p.push(&[1, 3], 6.0).unwrap();

        assert_eq!(p.find(&[1, 3]), Some(1));
        assert_eq!(*p.value(1), 6.0);
        assert_eq!(p.key(0), &[1, 2]);
        assert_eq!(p.find(&[3, 1]), None);
        assert_eq!(p.find(&[1]), None);
    }

    #[test]
    fn test_geometric_growth() {
        let mut p = page(1);
        let mut total: ByteDelta = 0;
        for i in 0..9 {
            total += p.push(&[i], i as f64).unwrap();
        }
        assert_eq!(p.capacity(), 16);
        assert_eq!(total as usize, p.byte_size());
    }

    #[test]
    fn test_push_growth_predicts_push() {
        let mut p = page(3);
        for i in 0..20 {
            let predicted = p.push_growth();
            let delta = p.push(&[i, i, i], 1.0).unwrap();
            assert_eq!(predicted as ByteDelta, delta);
        }
    }

    #[test]
    fn test_swap_remove_keeps_keys_aligned() {
        let mut p = page(2);
        p.push(&[1, 1], 1.0).unwrap();
        p.push(&[2, 2], 2.0).unwrap();
        p.push(&[3, 3], 3.0).unwrap();

        assert_eq!(p.swap_remove(0), 1.0);
        assert_eq!(p.len(), 2);
        assert_eq!(p.find(&[3, 3]), Some(0));
        assert_eq!(*p.value(0), 3.0);
        assert_eq!(p.find(&[2, 2]), Some(1));
        assert_eq!(p.find(&[1, 1]), None);
    }

    #[test]
    fn test_shrink_only_when_asked() {
        let mut p = page(1);
        for i in 0..16 {
            p.push(&[i], 0.0).unwrap();
        }
        for _ in 0..14 {
            p.swap_remove(0);
        }
        let before = p.byte_size();
        assert_eq!(p.capacity(), 16);

        let delta = p.shrink();
        assert!(delta < 0);
        assert_eq!(p.byte_size() as ByteDelta, before as ByteDelta + delta);
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut p: StringPage = Page::new(2, CapacityPolicy::default());
        p.push(&[1, 2], "x".to_string()).unwrap();
        let size = p.byte_size();
        assert_eq!(p.clear(), -(size as ByteDelta));
        assert_eq!(p.byte_size(), 0);
        assert!(p.is_empty());
    }

    #[test]
    fn test_string_rows_are_wider() {
        let numeric = page(2);
        let strings: StringPage = Page::new(2, CapacityPolicy::default());
        assert!(strings.row_size() > numeric.row_size());
        assert_eq!(strings.kind(), ValueKind::String);
    }
}
