//! FILENAME: core/cube-engine/src/looper.rs
//! Cube Looper - walks the cross product of a cube in canonical order.
//!
//! The looper takes a Storage (stored base cells), the dimension orders and a
//! LoopRequest, and hands up to `size` paths to a visitor, strictly after the
//! request's cursor.
//!
//! Algorithm:
//! 1. Capture every dimension's element order (optionally base-only / area-restricted)
//! 2. Resolve the start key: first path, or the path after the cursor
//! 3. Visit buckets in canonical (id1, id2) order, skipping buckets before the start
//! 4. Per bucket, order its numeric and string rows by full path order
//! 5. Walk the gap before each row: every path in emit-all mode, otherwise
//!    only consolidated paths (when an aggregator is supplied)
//! 6. Filter (skip-empty, numeric condition), emit, and stop when the budget is spent
//!
//! Gaps whose empties can never be emitted (trailing gap with skip-empty, or
//! any gap under a condition) jump from one consolidated path to the next
//! instead of stepping through every empty path.

use log::{trace, warn};

use cube_model::{format_path, CellValue, ElementId, ElementOrder};

use crate::cell_ref::CellRef;
use crate::definition::{Cursor, LoopOutcome, LoopRequest};
use crate::error::CubeError;
use crate::order::{Odometer, OrderKey, PathOrder};
use crate::storage::{BucketKey, Storage};

// ============================================================================
// AGGREGATION CALLBACK
// ============================================================================

/// Computes the value of a consolidated path.
pub trait Aggregator {
    fn compute_consolidated_value(&mut self, path: &[ElementId]) -> CellValue;
}

impl<F> Aggregator for F
where
    F: FnMut(&[ElementId]) -> CellValue,
{
    fn compute_consolidated_value(&mut self, path: &[ElementId]) -> CellValue {
        self(path)
    }
}

/// Whether a walk may go on after emitting.
enum Walk {
    Continue,
    Stop(Cursor),
}

// ============================================================================
// CUBE LOOPER
// ============================================================================

/// One paginated iteration over a cube.
pub struct CubeLooper<'a> {
    storage: &'a Storage,
    request: &'a LoopRequest,
    order: PathOrder,
    aggregator: Option<&'a mut dyn Aggregator>,

    /// Orders were restricted by `base_only` or `area`, so rows outside
    /// them are expected rather than stale.
    filtered: bool,

    emitted: usize,
    visited: usize,
}

impl<'a> CubeLooper<'a> {
    /// Captures the dimension orders for `request`.
    ///
    /// # Errors
    /// Fails when the number of dimensions does not match the storage, or
    /// the request's area has the wrong arity.
    pub fn new(
        storage: &'a Storage,
        dimensions: &[&dyn ElementOrder],
        request: &'a LoopRequest,
    ) -> Result<Self, CubeError> {
        if dimensions.len() != storage.width() {
            return Err(CubeError::DimensionMismatch {
                expected: storage.width(),
                actual: dimensions.len(),
            });
        }
        if let Some(area) = &request.area {
            if area.len() != dimensions.len() {
                return Err(CubeError::DimensionMismatch {
                    expected: dimensions.len(),
                    actual: area.len(),
                });
            }
        }

        let order = PathOrder::capture_filtered(
            dimensions,
            request.base_only,
            request.area.as_deref(),
        );
        Ok(CubeLooper {
            storage,
            request,
            order,
            aggregator: None,
            filtered: request.base_only || request.area.is_some(),
            emitted: 0,
            visited: 0,
        })
    }

    /// Routes consolidated paths through `aggregator`.
    pub fn with_aggregator(mut self, aggregator: &'a mut dyn Aggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// The orders captured at construction.
    pub fn order(&self) -> &PathOrder {
        &self.order
    }

    /// Runs the iteration, calling `visitor` once per emitted path.
    ///
    /// # Errors
    /// Fails when the start cursor has the wrong length or references an
    /// element missing from the captured orders.
    pub fn run<V>(mut self, mut visitor: V) -> Result<LoopOutcome, CubeError>
    where
        V: FnMut(&[ElementId], &CellValue),
    {
        let cursor = self.walk(&mut visitor)?;
        trace!(
            "looper: emitted {} of {} visited paths, cursor {:?}",
            self.emitted,
            self.visited,
            cursor
        );
        Ok(LoopOutcome {
            cursor,
            estimated_total: self.order.estimated_total(),
            emitted: self.emitted,
            visited: self.visited,
        })
    }

    fn walk<V>(&mut self, visitor: &mut V) -> Result<Cursor, CubeError>
    where
        V: FnMut(&[ElementId], &CellValue),
    {
        // Step 1: an empty dimension means an empty cross product
        if self.order.is_empty() {
            return Ok(Cursor::End);
        }
        if self.request.size == 0 {
            return Ok(self.request.start.clone());
        }

        // Step 2: resolve the start key
        let mut next: OrderKey = match &self.request.start {
            Cursor::Start => self.order.first_key(),
            Cursor::End => return Ok(Cursor::End),
            Cursor::After(path) => {
                let key = self.cursor_key(path)?;
                match self.order.next_key(&key) {
                    Some(key) => key,
                    None => return Ok(Cursor::End),
                }
            }
        };

        // Step 3: buckets in canonical order, starting at the bucket of `next`
        let start_prefix = (next[0], next.get(1).copied().unwrap_or(0));
        let buckets: Vec<BucketKey> = self
            .ordered_buckets()
            .into_iter()
            .filter(|(prefix, _)| *prefix >= start_prefix)
            .map(|(_, key)| key)
            .collect();

        let storage = self.storage;
        for bucket_key in buckets {
            let Some(bucket) = storage.lookup_bucket_page(bucket_key.0, bucket_key.1) else {
                continue;
            };

            // Step 4: merge numeric and string rows, sort by full path order
            let mut rows: Vec<(OrderKey, CellRef<'_>)> = bucket
                .rows()
                .filter_map(|row| self.row_key(row.path()).map(|key| (key, row)))
                .filter(|(key, _)| *key >= next)
                .collect();
            rows.sort_unstable_by(|a, b| a.0.cmp(&b.0));

            for (key, row) in rows {
                // Step 5: unstored paths between the current position and this row
                if let Walk::Stop(cursor) = self.walk_gap(&next, Some(key.as_slice()), visitor) {
                    return Ok(cursor);
                }

                // Step 6: the stored row itself
                self.visited += 1;
                let value = row.value();
                if self.accepts(&value) {
                    visitor(row.path(), &value);
                    self.emitted += 1;
                    if self.emitted >= self.request.size {
                        return Ok(Cursor::after(row.path()));
                    }
                }

                match self.order.next_key(&key) {
                    Some(following) => next = following,
                    None => return Ok(Cursor::End),
                }
            }
        }

        // Trailing unstored paths after the last stored row
        if let Walk::Stop(cursor) = self.walk_gap(&next, None, visitor) {
            return Ok(cursor);
        }
        Ok(Cursor::End)
    }

    /// Walks the unstored paths from `from` up to, not including, `until`.
    fn walk_gap<V>(&mut self, from: &[u32], until: Option<&[u32]>, visitor: &mut V) -> Walk
    where
        V: FnMut(&[ElementId], &CellValue),
    {
        let empties_wanted = self.request.emit_all
            && self.request.condition.is_none()
            && (until.is_some() || !self.request.skip_empty);
        if empties_wanted {
            return self.synthesize(from, until, visitor);
        }
        if self.aggregator.is_none() {
            return Walk::Continue;
        }
        self.consolidated_only(from, until, visitor)
    }

    /// Emits the consolidated paths in `from..until`, skipping base paths
    /// without visiting them.
    fn consolidated_only<V>(&mut self, from: &[u32], until: Option<&[u32]>, visitor: &mut V) -> Walk
    where
        V: FnMut(&[ElementId], &CellValue),
    {
        let mut key = match self.order.next_consolidated_key(from) {
            Some(key) => key,
            None => return Walk::Continue,
        };
        loop {
            if let Some(until) = until {
                if key.as_slice() >= until {
                    return Walk::Continue;
                }
            }

            let path = self.order.path_at(&key);
            self.visited += 1;
            let value = match &mut self.aggregator {
                Some(aggregator) => aggregator.compute_consolidated_value(&path),
                None => return Walk::Continue,
            };
            if self.accepts(&value) {
                visitor(path.as_slice(), &value);
                self.emitted += 1;
                if self.emitted >= self.request.size {
                    return Walk::Stop(Cursor::After(path));
                }
            }

            key = match self.order.next_key(&key) {
                Some(following) => match self.order.next_consolidated_key(&following) {
                    Some(found) => found,
                    None => return Walk::Continue,
                },
                None => return Walk::Continue,
            };
        }
    }

    /// Emits every path from `from` up to, not including, `until`.
    /// `until == None` walks to the end of the cross product.
    fn synthesize<V>(&mut self, from: &[u32], until: Option<&[u32]>, visitor: &mut V) -> Walk
    where
        V: FnMut(&[ElementId], &CellValue),
    {
        let mut odometer = Odometer::at(from, self.order.sizes());
        loop {
            if let Some(until) = until {
                if odometer.key() >= until {
                    return Walk::Continue;
                }
            }

            let key = odometer.key();
            let path = self.order.path_at(key);
            self.visited += 1;

            let computed = match &mut self.aggregator {
                Some(aggregator) if self.order.is_consolidated_at(key) => {
                    Some(aggregator.compute_consolidated_value(&path))
                }
                _ => None,
            };
            let (value, accepted) = match computed {
                Some(value) => {
                    let accepted = self.accepts(&value);
                    (value, accepted)
                }
                None => {
                    // Empty paths before a stored row are always emitted;
                    // trailing ones only when empties are not skipped.
                    let value = CellValue::Undefined;
                    let wanted = until.is_some() || !self.request.skip_empty;
                    let accepted = wanted && self.satisfies_condition(&value);
                    (value, accepted)
                }
            };

            if accepted {
                visitor(path.as_slice(), &value);
                self.emitted += 1;
                if self.emitted >= self.request.size {
                    return Walk::Stop(Cursor::After(path));
                }
            }

            if !odometer.advance() {
                return Walk::Stop(Cursor::End);
            }
        }
    }

    fn accepts(&self, value: &CellValue) -> bool {
        if self.request.skip_empty && value.is_empty() {
            return false;
        }
        self.satisfies_condition(value)
    }

    fn satisfies_condition(&self, value: &CellValue) -> bool {
        match &self.request.condition {
            Some(condition) => condition.matches(value),
            None => true,
        }
    }

    /// Buckets whose leading elements are in the captured orders, sorted by
    /// their canonical positions.
    fn ordered_buckets(&self) -> Vec<((u32, u32), BucketKey)> {
        let two_leading = self.order.dimension_count() > 1;
        let mut buckets: Vec<((u32, u32), BucketKey)> = self
            .storage
            .bucket_keys()
            .filter_map(|key| {
                let first = self.order.position(0, key.0)?;
                let second = if two_leading { self.order.position(1, key.1)? } else { 0 };
                Some(((first, second), key))
            })
            .collect();
        buckets.sort_unstable_by_key(|(prefix, _)| *prefix);
        buckets
    }

    /// Order key of a stored row; `None` (and skipped) if the row references
    /// an element missing from the captured orders.
    fn row_key(&self, path: &[ElementId]) -> Option<OrderKey> {
        let key = self.order.order_key(path);
        if key.is_none() && !self.filtered {
            warn!("looper: skipping row with stale element in path {}", format_path(path));
        }
        key
    }

    fn cursor_key(&self, path: &[ElementId]) -> Result<OrderKey, CubeError> {
        if path.len() != self.order.dimension_count() {
            return Err(CubeError::PathLength {
                expected: self.order.dimension_count(),
                actual: path.len(),
            });
        }
        for (d, &id) in path.iter().enumerate() {
            if self.order.position(d, id).is_none() {
                return Err(CubeError::UnknownElement {
                    dimension: format!("#{}", d),
                    element: id,
                });
            }
        }
        self.order.order_key(path).ok_or(CubeError::PathLength {
            expected: self.order.dimension_count(),
            actual: path.len(),
        })
    }
}

/// Runs one looper call over `storage`.
pub fn loop_cells<V>(
    storage: &Storage,
    dimensions: &[&dyn ElementOrder],
    request: &LoopRequest,
    aggregator: Option<&mut dyn Aggregator>,
    visitor: V,
) -> Result<LoopOutcome, CubeError>
where
    V: FnMut(&[ElementId], &CellValue),
{
    let looper = CubeLooper::new(storage, dimensions, request)?;
    let looper = match aggregator {
        Some(aggregator) => looper.with_aggregator(aggregator),
        None => looper,
    };
    looper.run(visitor)
}
