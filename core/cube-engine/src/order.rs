//! FILENAME: core/cube-engine/src/order.rs
//! PURPOSE: Canonical path ordering and the cross-product odometer.
//! CONTEXT: Paths are ordered left to right by each dimension's canonical
//! order index, never by raw identifier. `PathOrder` is a snapshot of every
//! dimension's order taken when a loop starts; it turns paths into order
//! keys (vectors of per-dimension positions) that compare lexicographically.
//! `Odometer` walks those keys in increasing order.

use std::cmp::Ordering;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use cube_model::{ElementId, ElementOrder, Path};

/// Per-dimension positions of a path in canonical order.
pub type OrderKey = SmallVec<[u32; 8]>;

// ============================================================================
// PATH ORDER
// ============================================================================

/// Element order of one dimension, captured at loop start.
#[derive(Debug, Clone, Default)]
struct AxisOrder {
    /// Elements in canonical order.
    elements: Vec<ElementId>,
    /// Consolidated flag per entry of `elements`.
    consolidated: Vec<bool>,
    /// Map from element id to its index in `elements`.
    positions: FxHashMap<ElementId, u32>,
    /// Entry `p` is the first consolidated index at or after `p`,
    /// `elements.len()` if there is none.
    next_consolidated: Vec<u32>,
}

impl AxisOrder {
    fn push(&mut self, id: ElementId, consolidated: bool) {
        self.positions.insert(id, self.elements.len() as u32);
        self.elements.push(id);
        self.consolidated.push(consolidated);
    }

    /// Builds the `next_consolidated` table once every element is pushed.
    fn finish(&mut self) {
        let len = self.elements.len() as u32;
        let mut next = vec![len; self.elements.len()];
        let mut following = len;
        for p in (0..self.elements.len()).rev() {
            if self.consolidated[p] {
                following = p as u32;
            }
            next[p] = following;
        }
        self.next_consolidated = next;
    }

    /// First consolidated index at or after `p`.
    fn consolidated_from(&self, p: u32) -> Option<u32> {
        self.next_consolidated
            .get(p as usize)
            .copied()
            .filter(|&q| (q as usize) < self.elements.len())
    }
}

/// Snapshot of all dimension orders of a cube.
#[derive(Debug, Clone)]
pub struct PathOrder {
    axes: Vec<AxisOrder>,
}

impl PathOrder {
    /// Captures the full element order of every dimension.
    pub fn capture(dimensions: &[&dyn ElementOrder]) -> Self {
        Self::capture_filtered(dimensions, false, None)
    }

    /// Captures element orders, optionally keeping only base elements and
    /// only the elements listed for a dimension in `area`.
    /// `area[d] == None` keeps every element of dimension `d`.
    pub fn capture_filtered(
        dimensions: &[&dyn ElementOrder],
        base_only: bool,
        area: Option<&[Option<Vec<ElementId>>]>,
    ) -> Self {
        let axes = dimensions
            .iter()
            .enumerate()
            .map(|(d, dim)| {
                let allowed: Option<FxHashSet<ElementId>> = area
                    .and_then(|a| a.get(d))
                    .and_then(|a| a.as_ref())
                    .map(|ids| ids.iter().copied().collect());
                let mut axis = AxisOrder::default();
                for id in dim.elements_in_order() {
                    let consolidated = dim.is_consolidated(id);
                    if base_only && consolidated {
                        continue;
                    }
                    if let Some(allowed) = &allowed {
                        if !allowed.contains(&id) {
                            continue;
                        }
                    }
                    axis.push(id, consolidated);
                }
                axis.finish();
                axis
            })
            .collect();
        PathOrder { axes }
    }

    pub fn dimension_count(&self) -> usize {
        self.axes.len()
    }

    /// Number of elements per dimension.
    pub fn sizes(&self) -> SmallVec<[u32; 8]> {
        self.axes.iter().map(|a| a.elements.len() as u32).collect()
    }

    /// True when any dimension has no elements, i.e. the cross product is empty.
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty() || self.axes.iter().any(|a| a.elements.is_empty())
    }

    /// Product of all dimension sizes, saturating at `u64::MAX`.
    pub fn estimated_total(&self) -> u64 {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes
            .iter()
            .fold(1u64, |acc, a| acc.saturating_mul(a.elements.len() as u64))
    }

    /// Position of `id` in dimension `dimension`.
    pub fn position(&self, dimension: usize, id: ElementId) -> Option<u32> {
        self.axes.get(dimension)?.positions.get(&id).copied()
    }

    /// Order key of a path. `None` if the path has the wrong length or
    /// references an element missing from the captured order.
    pub fn order_key(&self, path: &[ElementId]) -> Option<OrderKey> {
        if path.len() != self.axes.len() {
            return None;
        }
        path.iter()
            .zip(self.axes.iter())
            .map(|(id, axis)| axis.positions.get(id).copied())
            .collect()
    }

    /// Compares two paths in canonical order. `None` if either path cannot
    /// be placed in the captured order.
    pub fn compare(&self, a: &[ElementId], b: &[ElementId]) -> Option<Ordering> {
        Some(self.order_key(a)?.cmp(&self.order_key(b)?))
    }

    /// The path addressed by an order key.
    pub fn path_at(&self, key: &[u32]) -> Path {
        key.iter()
            .zip(self.axes.iter())
            .map(|(&p, axis)| axis.elements[p as usize])
            .collect()
    }

    /// True if any component of the key is a consolidated element.
    pub fn is_consolidated_at(&self, key: &[u32]) -> bool {
        key.iter()
            .zip(self.axes.iter())
            .any(|(&p, axis)| axis.consolidated[p as usize])
    }

    /// The smallest key at or after `from` with at least one consolidated
    /// component, `None` if no such key remains. Base-only stretches of
    /// the cross product are jumped over, not walked.
    pub fn next_consolidated_key(&self, from: &[u32]) -> Option<OrderKey> {
        if from.len() != self.axes.len() || self.is_empty() {
            return None;
        }
        if self.is_consolidated_at(from) {
            return Some(SmallVec::from_slice(from));
        }

        // Every component of `from` is base. Keep the longest possible
        // prefix and raise the component after it.
        for d in (0..from.len()).rev() {
            let axis = &self.axes[d];
            let tail = self.min_consolidated_tail(d + 1);
            let raised = from[d] + 1;
            let (position, rest) = if tail.is_some() && (raised as usize) < axis.elements.len() {
                if axis.consolidated[raised as usize] {
                    (raised, None)
                } else {
                    (raised, tail)
                }
            } else {
                match axis.consolidated_from(raised) {
                    Some(position) => (position, None),
                    None => continue,
                }
            };

            let mut key: OrderKey = SmallVec::from_slice(&from[..d]);
            key.push(position);
            match rest {
                Some(rest) => key.extend_from_slice(&rest),
                None => key.extend(std::iter::repeat(0).take(from.len() - d - 1)),
            }
            return Some(key);
        }
        None
    }

    /// Smallest suffix over dimensions `first..` containing a consolidated
    /// component.
    fn min_consolidated_tail(&self, first: usize) -> Option<OrderKey> {
        let axis = self.axes.get(first)?;
        let rest = self.axes.len() - first - 1;
        if axis.consolidated.first() == Some(&true) {
            return Some(SmallVec::from_elem(0, rest + 1));
        }
        if let Some(tail) = self.min_consolidated_tail(first + 1) {
            let mut key: OrderKey = SmallVec::from_elem(0, 1);
            key.extend_from_slice(&tail);
            return Some(key);
        }
        let position = axis.consolidated_from(0)?;
        let mut key: OrderKey = SmallVec::from_elem(position, 1);
        key.extend(std::iter::repeat(0).take(rest));
        Some(key)
    }

    /// The first key of the cross product.
    pub fn first_key(&self) -> OrderKey {
        SmallVec::from_elem(0, self.axes.len())
    }

    /// The key following `key`, or `None` past the last path.
    pub fn next_key(&self, key: &[u32]) -> Option<OrderKey> {
        let mut odometer = Odometer::at(key, self.sizes());
        if odometer.advance() {
            Some(odometer.into_key())
        } else {
            None
        }
    }
}

// ============================================================================
// ODOMETER
// ============================================================================

/// Per-dimension cursors into the captured element lists.
/// The rightmost dimension turns fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Odometer {
    key: OrderKey,
    limits: SmallVec<[u32; 8]>,
}

impl Odometer {
    /// An odometer positioned at the first key.
    pub fn new(limits: SmallVec<[u32; 8]>) -> Self {
        Odometer {
            key: SmallVec::from_elem(0, limits.len()),
            limits,
        }
    }

    pub fn at(key: &[u32], limits: SmallVec<[u32; 8]>) -> Self {
        debug_assert_eq!(key.len(), limits.len());
        Odometer {
            key: SmallVec::from_slice(key),
            limits,
        }
    }

    pub fn key(&self) -> &[u32] {
        &self.key
    }

    pub fn into_key(self) -> OrderKey {
        self.key
    }

    /// Moves to the next key. Returns false, leaving the key unchanged,
    /// when the current key is the last one.
    pub fn advance(&mut self) -> bool {
        for d in (0..self.key.len()).rev() {
            if self.key[d] + 1 < self.limits[d] {
                self.key[d] += 1;
                for lower in &mut self.key[d + 1..] {
                    *lower = 0;
                }
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_model::{Dimension, ElementKind};

    fn dims() -> (Dimension, Dimension) {
        // Identifiers deliberately not in canonical order.
        let a = Dimension::with_base_elements("A", &[30, 10, 20]).unwrap();
        let mut b = Dimension::new("B");
        b.add_element(5, ElementKind::Base).unwrap();
        b.add_element(1, ElementKind::Base).unwrap();
        b.add_element(9, ElementKind::Consolidated).unwrap();
        (a, b)
    }

    #[test]
    fn test_order_key_uses_canonical_positions() {
        let (a, b) = dims();
        let order = PathOrder::capture(&[&a, &b]);
        assert_eq!(order.order_key(&[10, 1]).unwrap().as_slice(), &[1, 1]);
        assert_eq!(order.compare(&[30, 9], &[10, 5]), Some(Ordering::Less));
        assert_eq!(order.compare(&[20, 5], &[20, 1]), Some(Ordering::Less));
        assert_eq!(order.order_key(&[11, 1]), None);
        assert_eq!(order.order_key(&[10]), None);
    }

    #[test]
    fn test_path_at_and_consolidated() {
        let (a, b) = dims();
        let order = PathOrder::capture(&[&a, &b]);
        assert_eq!(order.path_at(&[2, 0]).as_slice(), &[20, 5]);
        assert!(order.is_consolidated_at(&[0, 2]));
        assert!(!order.is_consolidated_at(&[0, 1]));
        assert_eq!(order.estimated_total(), 9);
    }

    #[test]
    fn test_filtered_capture() {
        let (a, b) = dims();
        let area = vec![Some(vec![20, 30]), None];
        let order = PathOrder::capture_filtered(&[&a, &b], true, Some(area.as_slice()));
        assert_eq!(order.sizes().as_slice(), &[2, 2]);
        // Area keeps canonical order, not the order of the listed ids.
        assert_eq!(order.path_at(&[0, 0]).as_slice(), &[30, 5]);
        assert_eq!(order.position(1, 9), None);
    }

    #[test]
    fn test_large_area_list() {
        let ids: Vec<ElementId> = (0..5000).collect();
        let dim = Dimension::with_base_elements("Wide", &ids).unwrap();
        // Every odd id, listed twice and in reverse.
        let mut listed: Vec<ElementId> = ids.iter().copied().filter(|id| id % 2 == 1).rev().collect();
        listed.extend(listed.clone());
        let area = vec![Some(listed)];
        let order = PathOrder::capture_filtered(&[&dim], false, Some(area.as_slice()));
        assert_eq!(order.sizes().as_slice(), &[2500]);
        assert_eq!(order.path_at(&[0]).as_slice(), &[1]);
        assert_eq!(order.position(0, 4999), Some(2499));
        assert_eq!(order.position(0, 4998), None);
    }

    #[test]
    fn test_empty_dimension() {
        let (a, _) = dims();
        let empty = Dimension::new("Empty");
        let order = PathOrder::capture(&[&a, &empty]);
        assert!(order.is_empty());
        assert_eq!(order.estimated_total(), 0);
    }

    #[test]
    fn test_odometer_walks_cross_product() {
        let mut odometer = Odometer::new(SmallVec::from_slice(&[2, 3]));
        let mut seen = vec![odometer.key().to_vec()];
        while odometer.advance() {
            seen.push(odometer.key().to_vec());
        }
        assert_eq!(
            seen,
            vec![vec![0, 0], vec![0, 1], vec![0, 2], vec![1, 0], vec![1, 1], vec![1, 2]]
        );
        assert_eq!(odometer.key(), &[1, 2]);
    }

    #[test]
    fn test_next_consolidated_key_matches_exhaustive_walk() {
        let mut a = Dimension::new("A");
        for (id, kind) in [(1, ElementKind::Base), (2, ElementKind::Consolidated), (3, ElementKind::Base)] {
            a.add_element(id, kind).unwrap();
        }
        let b = Dimension::with_base_elements("B", &[10, 11]).unwrap();
        let mut c = Dimension::with_base_elements("C", &[20, 21, 22]).unwrap();
        c.add_consolidated(23).unwrap();
        c.move_element(23, 1).unwrap();
        let order = PathOrder::capture(&[&a, &b, &c]);

        let mut odometer = Odometer::new(order.sizes());
        loop {
            let from = odometer.key().to_vec();
            let mut scan = Odometer::at(&from, order.sizes());
            let expected = loop {
                if order.is_consolidated_at(scan.key()) {
                    break Some(scan.key().to_vec());
                }
                if !scan.advance() {
                    break None;
                }
            };
            let found = order.next_consolidated_key(&from).map(|k| k.to_vec());
            assert_eq!(found, expected, "from {:?}", from);
            if !odometer.advance() {
                break;
            }
        }
    }

    #[test]
    fn test_next_consolidated_key_without_consolidated() {
        let (a, _) = dims();
        let order = PathOrder::capture(&[&a, &a]);
        assert_eq!(order.next_consolidated_key(&[0, 0]), None);

        let (a, b) = dims();
        let order = PathOrder::capture(&[&b, &a]);
        assert_eq!(order.next_consolidated_key(&[1, 2]).unwrap().as_slice(), &[2, 0]);
        assert_eq!(order.next_consolidated_key(&[2, 1]).unwrap().as_slice(), &[2, 1]);
    }

    #[test]
    fn test_next_key() {
        let (a, b) = dims();
        let order = PathOrder::capture(&[&a, &b]);
        assert_eq!(order.next_key(&[0, 2]).unwrap().as_slice(), &[1, 0]);
        assert_eq!(order.next_key(&[2, 2]), None);
        assert_eq!(order.first_key().as_slice(), &[0, 0]);
    }
}
