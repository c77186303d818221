//! FILENAME: core/cube-engine/src/storage.rs
//! PURPOSE: Sparse cell storage, bucketed by the leading path identifiers.
//! CONTEXT: Rows are grouped into buckets keyed by the first two element
//! identifiers of their path (first identifier only for one-dimensional
//! cubes). Each bucket owns at most one numeric and one string page, created
//! lazily on first insert. A lookup therefore only scans the rows of one
//! bucket, never the whole cube.
//!
//! Storage keeps a running total of its page bytes. Every mutating call
//! also returns the signed byte delta it caused, which is how the
//! consolidation cache keeps the process-wide counter exact.

use log::debug;
use rustc_hash::FxHashMap;

use cube_model::{CellValue, ElementId, ValueKind};

use crate::cell_ref::{CellRef, RowRef};
use crate::config::CapacityPolicy;
use crate::error::CubeError;
use crate::page::{ByteDelta, NumericPage, Page, StringPage};

/// Bucket address: the first two identifiers of a path.
/// One-dimensional cubes use `(id, 0)`.
pub type BucketKey = (ElementId, ElementId);

// ============================================================================
// BUCKET
// ============================================================================

/// The pages of one bucket.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    numeric: Option<NumericPage>,
    strings: Option<StringPage>,
}

impl Bucket {
    pub fn numeric_page(&self) -> Option<&NumericPage> {
        self.numeric.as_ref()
    }

    pub fn string_page(&self) -> Option<&StringPage> {
        self.strings.as_ref()
    }

    /// Number of rows across both pages.
    pub fn len(&self) -> usize {
        self.numeric.as_ref().map_or(0, Page::len) + self.strings.as_ref().map_or(0, Page::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_size(&self) -> usize {
        self.numeric.as_ref().map_or(0, Page::byte_size)
            + self.strings.as_ref().map_or(0, Page::byte_size)
    }

    /// Finds the row stored under `path` in either page.
    pub fn find(&self, path: &[ElementId]) -> Option<CellRef<'_>> {
        if let Some(page) = &self.numeric {
            if let Some(row) = page.find(path) {
                return Some(CellRef::Numeric(RowRef::new(page, row)));
            }
        }
        if let Some(page) = &self.strings {
            if let Some(row) = page.find(path) {
                return Some(CellRef::String(RowRef::new(page, row)));
            }
        }
        None
    }

    /// All rows of the bucket, numeric rows first, in physical order.
    pub fn rows(&self) -> impl Iterator<Item = CellRef<'_>> + '_ {
        let numeric = self
            .numeric
            .iter()
            .flat_map(|page| (0..page.len()).map(move |row| CellRef::Numeric(RowRef::new(page, row))));
        let strings = self
            .strings
            .iter()
            .flat_map(|page| (0..page.len()).map(move |row| CellRef::String(RowRef::new(page, row))));
        numeric.chain(strings)
    }

    fn remove(&mut self, path: &[ElementId]) -> bool {
        if let Some(page) = &mut self.numeric {
            if let Some(row) = page.find(path) {
                page.swap_remove(row);
                return true;
            }
        }
        if let Some(page) = &mut self.strings {
            if let Some(row) = page.find(path) {
                page.swap_remove(row);
                return true;
            }
        }
        false
    }

    fn compact(&mut self) -> ByteDelta {
        let mut delta = 0;
        if let Some(page) = &mut self.numeric {
            if page.is_empty() {
                delta += page.clear();
                self.numeric = None;
            } else {
                delta += page.shrink();
            }
        }
        if let Some(page) = &mut self.strings {
            if page.is_empty() {
                delta += page.clear();
                self.strings = None;
            } else {
                delta += page.shrink();
            }
        }
        delta
    }
}

// ============================================================================
// STORAGE
// ============================================================================

#[derive(Debug, Clone)]
pub struct Storage {
    /// Path length (cube dimensionality).
    width: usize,
    buckets: FxHashMap<BucketKey, Bucket>,
    policy: CapacityPolicy,
    /// Rows across all buckets.
    cell_count: usize,
    /// Bytes across all page buffers.
    byte_size: usize,
}

impl Storage {
    pub fn new(width: usize, policy: CapacityPolicy) -> Self {
        debug_assert!(width > 0, "storage needs at least one dimension");
        Storage {
            width,
            buckets: FxHashMap::default(),
            policy,
            cell_count: 0,
            byte_size: 0,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn cell_count(&self) -> usize {
        self.cell_count
    }

    pub fn is_empty(&self) -> bool {
        self.cell_count == 0
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Bytes currently held by all pages.
    pub fn byte_size(&self) -> usize {
        self.byte_size
    }

    /// Bucket key a path belongs to.
    pub fn bucket_key(&self, path: &[ElementId]) -> BucketKey {
        let first = path.first().copied().unwrap_or(0);
        let second = if self.width > 1 { path.get(1).copied().unwrap_or(0) } else { 0 };
        (first, second)
    }

    /// Keys of all buckets, in no particular order.
    pub fn bucket_keys(&self) -> impl Iterator<Item = BucketKey> + '_ {
        self.buckets.keys().copied()
    }

    /// Direct accessor for bulk enumeration.
    pub fn lookup_bucket_page(&self, id1: ElementId, id2: ElementId) -> Option<&Bucket> {
        self.buckets.get(&(id1, id2))
    }

    /// Stores `value` under `path`, replacing any previous value.
    /// Storing `Undefined` removes the cell.
    ///
    /// # Errors
    /// Fails on a path of the wrong length, on `Consolidated` values and
    /// when page growth cannot allocate.
    pub fn put(&mut self, path: &[ElementId], value: CellValue) -> Result<ByteDelta, CubeError> {
        self.check_width(path)?;
        match value {
            CellValue::Undefined => Ok(self.remove(path)),
            CellValue::Consolidated => Err(CubeError::UnstorableValue),
            CellValue::Numeric(n) => self.put_numeric(path, n),
            CellValue::String(s) => self.put_string(path, s),
        }
    }

    /// Returns the row stored under `path`. Allocates nothing.
    pub fn lookup(&self, path: &[ElementId]) -> Option<CellRef<'_>> {
        if path.len() != self.width {
            return None;
        }
        self.buckets.get(&self.bucket_key(path))?.find(path)
    }

    /// Removes the row stored under `path`, if any. A bucket left without
    /// rows is dropped together with its pages.
    pub fn remove(&mut self, path: &[ElementId]) -> ByteDelta {
        if path.len() != self.width {
            return 0;
        }
        let key = self.bucket_key(path);
        let Some(bucket) = self.buckets.get_mut(&key) else {
            return 0;
        };
        if !bucket.remove(path) {
            return 0;
        }
        self.cell_count -= 1;

        if bucket.is_empty() {
            let freed = bucket.byte_size();
            self.buckets.remove(&key);
            self.apply(-(freed as ByteDelta))
        } else {
            0
        }
    }

    /// Drops every bucket.
    pub fn clear(&mut self) -> ByteDelta {
        let freed = self.byte_size;
        self.buckets.clear();
        self.cell_count = 0;
        self.apply(-(freed as ByteDelta))
    }

    /// Shrinks under-used pages and drops empty ones.
    pub fn compact(&mut self) -> ByteDelta {
        let mut delta = 0;
        for bucket in self.buckets.values_mut() {
            delta += bucket.compact();
        }
        self.buckets.retain(|_, bucket| bucket.numeric.is_some() || bucket.strings.is_some());
        self.apply(delta)
    }

    /// Bytes that storing a value of `kind` under `path` would add.
    /// Zero when the row already exists with that kind or the page has room.
    pub fn predicted_growth(&self, path: &[ElementId], kind: ValueKind) -> usize {
        let fresh_page = |row_size: usize| self.policy.grown_capacity(0, 1) * row_size;
        let Some(bucket) = self.buckets.get(&self.bucket_key(path)) else {
            return match kind {
                ValueKind::Numeric => fresh_page(NumericPage::row_size_for(self.width)),
                ValueKind::String => fresh_page(StringPage::row_size_for(self.width)),
            };
        };
        match kind {
            ValueKind::Numeric => match &bucket.numeric {
                Some(page) if page.find(path).is_some() => 0,
                Some(page) => page.push_growth(),
                None => fresh_page(NumericPage::row_size_for(self.width)),
            },
            ValueKind::String => match &bucket.strings {
                Some(page) if page.find(path).is_some() => 0,
                Some(page) => page.push_growth(),
                None => fresh_page(StringPage::row_size_for(self.width)),
            },
        }
    }

    /// All stored rows, in no particular order.
    pub fn rows(&self) -> impl Iterator<Item = CellRef<'_>> + '_ {
        self.buckets.values().flat_map(Bucket::rows)
    }

    /// Sum of page sizes, recomputed from the pages themselves.
    pub fn computed_byte_size(&self) -> usize {
        self.buckets.values().map(Bucket::byte_size).sum()
    }

    fn put_numeric(&mut self, path: &[ElementId], value: f64) -> Result<ByteDelta, CubeError> {
        let key = self.bucket_key(path);
        let width = self.width;
        let policy = self.policy;
        let bucket = self.buckets.entry(key).or_default();

        if let Some(page) = &mut bucket.numeric {
            if let Some(row) = page.find(path) {
                page.set(row, value);
                return Ok(0);
            }
        }
        let page = bucket.numeric.get_or_insert_with(|| {
            debug!("storage: numeric page for bucket {:?}", key);
            Page::new(width, policy)
        });
        let pushed = page.push(path, value);
        self.finish_insert(key, path, ValueKind::Numeric, pushed)
    }

    fn put_string(&mut self, path: &[ElementId], value: String) -> Result<ByteDelta, CubeError> {
        let key = self.bucket_key(path);
        let width = self.width;
        let policy = self.policy;
        let bucket = self.buckets.entry(key).or_default();

        if let Some(page) = &mut bucket.strings {
            if let Some(row) = page.find(path) {
                page.set(row, value);
                return Ok(0);
            }
        }
        let page = bucket.strings.get_or_insert_with(|| {
            debug!("storage: string page for bucket {:?}", key);
            Page::new(width, policy)
        });
        let pushed = page.push(path, value);
        self.finish_insert(key, path, ValueKind::String, pushed)
    }

    /// Removes a string row superseded by a numeric one.
    fn take_string_row(bucket: &mut Bucket, path: &[ElementId]) -> bool {
        match &mut bucket.strings {
            Some(page) => match page.find(path) {
                Some(row) => {
                    page.swap_remove(row);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Removes a numeric row superseded by a string one.
    fn take_numeric_row(bucket: &mut Bucket, path: &[ElementId]) -> bool {
        match &mut bucket.numeric {
            Some(page) => match page.find(path) {
                Some(row) => {
                    page.swap_remove(row);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Books the outcome of pushing `path` into its `kind` page. Only a
    /// successful push drops the row of the other kind, so a failed one
    /// leaves the previous value in place.
    fn finish_insert(
        &mut self,
        key: BucketKey,
        path: &[ElementId],
        kind: ValueKind,
        pushed: Result<ByteDelta, std::collections::TryReserveError>,
    ) -> Result<ByteDelta, CubeError> {
        match pushed {
            Ok(delta) => {
                let moved = match self.buckets.get_mut(&key) {
                    Some(bucket) => match kind {
                        ValueKind::String => Self::take_numeric_row(bucket, path),
                        _ => Self::take_string_row(bucket, path),
                    },
                    None => false,
                };
                if !moved {
                    self.cell_count += 1;
                }
                Ok(self.apply(delta))
            }
            Err(err) => {
                if let Some(bucket) = self.buckets.get_mut(&key) {
                    // A page created for this insert that stayed empty.
                    let unused = |len: usize, bytes: usize| len == 0 && bytes == 0;
                    match kind {
                        ValueKind::String => {
                            if bucket.strings.as_ref().is_some_and(|p| unused(p.len(), p.byte_size())) {
                                bucket.strings = None;
                            }
                        }
                        _ => {
                            if bucket.numeric.as_ref().is_some_and(|p| unused(p.len(), p.byte_size())) {
                                bucket.numeric = None;
                            }
                        }
                    }
                    if bucket.is_empty() && bucket.byte_size() == 0 {
                        self.buckets.remove(&key);
                    }
                }
                debug!("storage: allocation failed in bucket {:?}", key);
                Err(CubeError::Allocation(err))
            }
        }
    }

    fn apply(&mut self, delta: ByteDelta) -> ByteDelta {
        self.byte_size = (self.byte_size as ByteDelta + delta) as usize;
        delta
    }

    fn check_width(&self, path: &[ElementId]) -> Result<(), CubeError> {
        if path.len() != self.width {
            return Err(CubeError::PathLength {
                expected: self.width,
                actual: path.len(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(width: usize) -> Storage {
        Storage::new(width, CapacityPolicy::default())
    }

    #[test]
    fn test_put_lookup_roundtrip() {
        let mut s = storage(3);
        s.put(&[1, 2, 3], CellValue::Numeric(5.0)).unwrap();
        s.put(&[1, 2, 4], CellValue::from("hello")).unwrap();

        assert_eq!(s.lookup(&[1, 2, 3]).unwrap().value(), CellValue::Numeric(5.0));
        assert_eq!(s.lookup(&[1, 2, 4]).unwrap().value(), CellValue::from("hello"));
        assert!(s.lookup(&[1, 2, 5]).is_none());
        assert_eq!(s.bucket_count(), 1);
        assert_eq!(s.cell_count(), 2);
    }

    #[test]
    fn test_overwrite_in_place() {
        let mut s = storage(2);
        s.put(&[1, 1], CellValue::Numeric(1.0)).unwrap();
        let delta = s.put(&[1, 1], CellValue::Numeric(2.0)).unwrap();
        assert_eq!(delta, 0);
        assert_eq!(s.cell_count(), 1);
        assert_eq!(s.lookup(&[1, 1]).unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn test_kind_change_moves_row() {
        let mut s = storage(2);
        s.put(&[1, 1], CellValue::Numeric(1.0)).unwrap();
        s.put(&[1, 1], CellValue::from("text")).unwrap();
        assert_eq!(s.cell_count(), 1);
        let found = s.lookup(&[1, 1]).unwrap();
        assert_eq!(found.kind(), ValueKind::String);

        s.put(&[1, 1], CellValue::Numeric(3.0)).unwrap();
        assert_eq!(s.cell_count(), 1);
        assert_eq!(s.lookup(&[1, 1]).unwrap().as_number(), Some(3.0));
    }

    #[test]
    fn test_failed_kind_change_keeps_old_value() {
        let mut s = storage(2);
        s.put(&[1, 1], CellValue::Numeric(1.0)).unwrap();
        let bytes = s.byte_size();

        // Book a string push that could not allocate.
        let failure = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        let key = s.bucket_key(&[1, 1]);
        let result = s.finish_insert(key, &[1, 1], ValueKind::String, Err(failure));

        assert!(matches!(result, Err(CubeError::Allocation(_))));
        assert_eq!(s.cell_count(), 1);
        assert_eq!(s.byte_size(), bytes);
        assert_eq!(s.lookup(&[1, 1]).unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn test_failed_insert_drops_fresh_bucket() {
        let mut s = storage(2);
        let failure = Vec::<u8>::new().try_reserve(usize::MAX).unwrap_err();
        s.buckets.entry((4, 4)).or_default().numeric = Some(Page::new(2, CapacityPolicy::default()));
        let result = s.finish_insert((4, 4), &[4, 4], ValueKind::Numeric, Err(failure));

        assert!(result.is_err());
        assert_eq!(s.bucket_count(), 0);
        assert_eq!(s.cell_count(), 0);
    }

    #[test]
    fn test_rows_land_in_own_bucket() {
        let mut s = storage(3);
        s.put(&[1, 2, 3], CellValue::Numeric(1.0)).unwrap();
        s.put(&[2, 1, 3], CellValue::Numeric(2.0)).unwrap();
        s.put(&[1, 2, 9], CellValue::Numeric(3.0)).unwrap();

        assert_eq!(s.bucket_count(), 2);
        let bucket = s.lookup_bucket_page(1, 2).unwrap();
        assert_eq!(bucket.len(), 2);
        assert!(bucket.string_page().is_none());
        assert!(s.lookup_bucket_page(2, 1).unwrap().find(&[2, 1, 3]).is_some());
        assert!(s.lookup_bucket_page(3, 3).is_none());
    }

    #[test]
    fn test_one_dimensional_cube() {
        let mut s = storage(1);
        s.put(&[7], CellValue::Numeric(1.0)).unwrap();
        assert_eq!(s.bucket_key(&[7]), (7, 0));
        assert!(s.lookup_bucket_page(7, 0).is_some());
        assert_eq!(s.lookup(&[7]).unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn test_empty_lookup_allocates_nothing() {
        let s = storage(2);
        assert!(s.lookup(&[1, 2]).is_none());
        assert_eq!(s.bucket_count(), 0);
        assert_eq!(s.byte_size(), 0);
    }

    #[test]
    fn test_path_length_checked() {
        let mut s = storage(2);
        let err = s.put(&[1], CellValue::Numeric(1.0)).unwrap_err();
        assert!(matches!(err, CubeError::PathLength { expected: 2, actual: 1 }));
        assert!(s.lookup(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_consolidated_not_storable() {
        let mut s = storage(1);
        assert!(matches!(
            s.put(&[1], CellValue::Consolidated),
            Err(CubeError::UnstorableValue)
        ));
    }

    #[test]
    fn test_remove_drops_empty_bucket() {
        let mut s = storage(2);
        s.put(&[1, 1], CellValue::Numeric(1.0)).unwrap();
        s.put(&[2, 2], CellValue::Numeric(2.0)).unwrap();
        let before = s.byte_size();

        let delta = s.put(&[1, 1], CellValue::Undefined).unwrap();
        assert!(delta < 0);
        assert_eq!(s.byte_size() as ByteDelta, before as ByteDelta + delta);
        assert_eq!(s.bucket_count(), 1);
        assert_eq!(s.cell_count(), 1);
        assert_eq!(s.remove(&[9, 9]), 0);
    }

    #[test]
    fn test_byte_size_tracks_pages() {
        let mut s = storage(2);
        for i in 0..40 {
            s.put(&[i % 3, 0], CellValue::Numeric(i as f64)).unwrap();
            s.put(&[i % 3, i], CellValue::from(format!("v{}", i).as_str())).unwrap();
        }
        assert_eq!(s.byte_size(), s.computed_byte_size());

        for i in 0..35 {
            s.remove(&[i % 3, i]);
        }
        s.compact();
        assert_eq!(s.byte_size(), s.computed_byte_size());

        s.clear();
        assert_eq!(s.byte_size(), 0);
        assert_eq!(s.cell_count(), 0);
        assert_eq!(s.bucket_count(), 0);
    }

    #[test]
    fn test_predicted_growth_matches_put() {
        let mut s = storage(2);
        for i in 0..30 {
            let path = [i % 2, i];
            let (value, kind) = if i % 3 == 0 {
                (CellValue::from("s"), ValueKind::String)
            } else {
                (CellValue::Numeric(i as f64), ValueKind::Numeric)
            };
            let predicted = s.predicted_growth(&path, kind);
            let delta = s.put(&path, value).unwrap();
            assert_eq!(predicted as ByteDelta, delta);
        }
        assert_eq!(s.predicted_growth(&[0, 0], ValueKind::String), 0);
    }

    #[test]
    fn test_rows_enumerates_everything() {
        let mut s = storage(2);
        s.put(&[1, 1], CellValue::Numeric(1.0)).unwrap();
        s.put(&[1, 2], CellValue::from("a")).unwrap();
        s.put(&[3, 1], CellValue::Numeric(2.0)).unwrap();
        assert_eq!(s.rows().count(), 3);
    }
}
