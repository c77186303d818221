//! FILENAME: core/model/src/dimension.rs
//! PURPOSE: The element-order contract the cube core consumes from dimensions.
//! CONTEXT: Dimension hierarchies live outside this core. The storage and the
//! looper only need to know, per dimension, which elements exist, in which
//! canonical order they appear, and whether an element is consolidated
//! (has children). `Dimension` is a small in-memory implementation used by
//! callers that do not bring their own hierarchy, and by the tests.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::path::ElementId;

/// Read access to a dimension's element order.
pub trait ElementOrder {
    /// Display name, used in error messages and logs.
    fn name(&self) -> &str;

    /// All elements in canonical order.
    fn elements_in_order(&self) -> Vec<ElementId>;

    /// Position of an element in canonical order, `None` if it does not exist.
    fn order_index(&self, id: ElementId) -> Option<usize>;

    fn contains(&self, id: ElementId) -> bool {
        self.order_index(id).is_some()
    }

    /// True if the element has children (its cells are computed, not stored).
    fn is_consolidated(&self, id: ElementId) -> bool;

    fn size(&self) -> usize {
        self.elements_in_order().len()
    }
}

/// Whether an element is a leaf or an aggregation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementKind {
    Base,
    Consolidated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Element {
    id: ElementId,
    kind: ElementKind,
}

/// An in-memory dimension: a named, ordered list of elements.
#[derive(Debug, Clone)]
pub struct Dimension {
    name: String,
    elements: Vec<Element>,
    /// Map from element id to its position in `elements`.
    positions: FxHashMap<ElementId, usize>,
}

impl Dimension {
    pub fn new(name: impl Into<String>) -> Self {
        Dimension {
            name: name.into(),
            elements: Vec::new(),
            positions: FxHashMap::default(),
        }
    }

    /// Creates a dimension of base elements in the given order.
    ///
    /// # Errors
    /// Fails on duplicate identifiers.
    pub fn with_base_elements(
        name: impl Into<String>,
        ids: &[ElementId],
    ) -> Result<Self, ModelError> {
        let mut dimension = Dimension::new(name);
        for &id in ids {
            dimension.add_element(id, ElementKind::Base)?;
        }
        Ok(dimension)
    }

    /// Appends an element at the end of the canonical order.
    pub fn add_element(&mut self, id: ElementId, kind: ElementKind) -> Result<(), ModelError> {
        if self.positions.contains_key(&id) {
            return Err(ModelError::DuplicateElement {
                dimension: self.name.clone(),
                element: id,
            });
        }
        self.positions.insert(id, self.elements.len());
        self.elements.push(Element { id, kind });
        Ok(())
    }

    pub fn add_base(&mut self, id: ElementId) -> Result<(), ModelError> {
        self.add_element(id, ElementKind::Base)
    }

    pub fn add_consolidated(&mut self, id: ElementId) -> Result<(), ModelError> {
        self.add_element(id, ElementKind::Consolidated)
    }

    /// Removes an element. Stored cells referencing it become stale; the
    /// looper skips them.
    pub fn remove_element(&mut self, id: ElementId) -> Result<(), ModelError> {
        let position = self.position_of(id)?;
        self.elements.remove(position);
        self.rebuild_positions();
        Ok(())
    }

    /// Moves an element to a new position in the canonical order.
    /// Positions past the end move the element to the end.
    pub fn move_element(&mut self, id: ElementId, new_position: usize) -> Result<(), ModelError> {
        let position = self.position_of(id)?;
        let element = self.elements.remove(position);
        let target = new_position.min(self.elements.len());
        self.elements.insert(target, element);
        self.rebuild_positions();
        Ok(())
    }

    pub fn kind(&self, id: ElementId) -> Option<ElementKind> {
        self.positions.get(&id).map(|&p| self.elements[p].kind)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    fn position_of(&self, id: ElementId) -> Result<usize, ModelError> {
        self.positions
            .get(&id)
            .copied()
            .ok_or_else(|| ModelError::ElementNotFound {
                dimension: self.name.clone(),
                element: id,
            })
    }

    fn rebuild_positions(&mut self) {
        self.positions.clear();
        for (i, element) in self.elements.iter().enumerate() {
            self.positions.insert(element.id, i);
        }
    }
}

impl ElementOrder for Dimension {
    fn name(&self) -> &str {
        &self.name
    }

    fn elements_in_order(&self) -> Vec<ElementId> {
        self.elements.iter().map(|e| e.id).collect()
    }

    fn order_index(&self, id: ElementId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    fn is_consolidated(&self, id: ElementId) -> bool {
        matches!(self.kind(id), Some(ElementKind::Consolidated))
    }

    fn size(&self) -> usize {
        self.elements.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_is_insertion_order_not_id() {
        let dim = Dimension::with_base_elements("Months", &[30, 10, 20]).unwrap();
        assert_eq!(dim.elements_in_order(), vec![30, 10, 20]);
        assert_eq!(dim.order_index(30), Some(0));
        assert_eq!(dim.order_index(20), Some(2));
        assert_eq!(dim.order_index(99), None);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut dim = Dimension::new("Region");
        dim.add_base(1).unwrap();
        assert_eq!(
            dim.add_base(1),
            Err(ModelError::DuplicateElement { dimension: "Region".to_string(), element: 1 })
        );
    }

    #[test]
    fn test_move_and_remove() {
        let mut dim = Dimension::with_base_elements("D", &[1, 2, 3]).unwrap();
        dim.move_element(3, 0).unwrap();
        assert_eq!(dim.elements_in_order(), vec![3, 1, 2]);
        dim.remove_element(1).unwrap();
        assert_eq!(dim.elements_in_order(), vec![3, 2]);
        assert_eq!(dim.order_index(2), Some(1));
        assert!(!dim.contains(1));
        assert!(dim.remove_element(1).is_err());
    }

    #[test]
    fn test_consolidated_flag() {
        let mut dim = Dimension::new("Products");
        dim.add_consolidated(100).unwrap();
        dim.add_base(1).unwrap();
        assert!(dim.is_consolidated(100));
        assert!(!dim.is_consolidated(1));
        assert!(!dim.is_consolidated(7));
    }
}
