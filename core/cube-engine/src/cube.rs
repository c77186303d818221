//! FILENAME: core/cube-engine/src/cube.rs
//! PURPOSE: The cube facade tying dimensions, base storage and cache together.
//! CONTEXT: Callers validate nothing themselves: `Cube` checks every path
//! against its dimensions before it reaches `Storage`, clears the attached
//! consolidation cache on every base write and runs the looper over its
//! own dimension orders.

use std::fmt;
use std::sync::Arc;

use log::debug;

use cube_model::{format_path, CellValue, ElementId, ElementOrder};

use crate::config::CapacityPolicy;
use crate::consolidation::{CacheManager, CachedAggregator, ConsolidationCache};
use crate::definition::{LoopOutcome, LoopRequest};
use crate::error::CubeError;
use crate::looper::{loop_cells, Aggregator};
use crate::storage::Storage;

/// Identifier of a cube, unique among the cubes sharing a `CacheManager`.
pub type CubeId = u32;

/// Dimension handle shared between cubes.
pub type SharedDimension = Arc<dyn ElementOrder + Send + Sync>;

pub struct Cube {
    id: CubeId,
    name: String,
    dimensions: Vec<SharedDimension>,
    storage: Storage,
    cache: Option<ConsolidationCache>,
}

impl Cube {
    /// Creates an empty cube over `dimensions`, in path order.
    ///
    /// # Errors
    /// A cube needs at least one dimension.
    pub fn new(
        id: CubeId,
        name: impl Into<String>,
        dimensions: Vec<SharedDimension>,
        policy: CapacityPolicy,
    ) -> Result<Self, CubeError> {
        if dimensions.is_empty() {
            return Err(CubeError::NoDimensions);
        }
        let storage = Storage::new(dimensions.len(), policy);
        Ok(Cube {
            id,
            name: name.into(),
            dimensions,
            storage,
            cache: None,
        })
    }

    pub fn id(&self) -> CubeId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension_count(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimensions(&self) -> &[SharedDimension] {
        &self.dimensions
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Number of stored base cells.
    pub fn cell_count(&self) -> usize {
        self.storage.cell_count()
    }

    // ========================================================================
    // BASE CELLS
    // ========================================================================

    /// Stores a base value. `Undefined` removes the cell.
    ///
    /// # Errors
    /// Fails on a wrong path length, an element missing from its dimension,
    /// a path through a consolidated element, a `Consolidated` value or a
    /// failed allocation.
    pub fn put(&mut self, path: &[ElementId], value: CellValue) -> Result<(), CubeError> {
        self.validate(path)?;
        let consolidated = self
            .dimensions
            .iter()
            .zip(path)
            .any(|(d, &id)| d.is_consolidated(id));
        if consolidated {
            return Err(CubeError::UnstorableValue);
        }
        self.storage.put(path, value)?;
        self.invalidate_cache();
        Ok(())
    }

    /// Value stored under `path`, `Undefined` when absent.
    pub fn lookup(&self, path: &[ElementId]) -> Result<CellValue, CubeError> {
        self.validate(path)?;
        Ok(self
            .storage
            .lookup(path)
            .map(|found| found.value())
            .unwrap_or_default())
    }

    /// Removes a base cell. Returns true if one was stored.
    pub fn remove(&mut self, path: &[ElementId]) -> Result<bool, CubeError> {
        self.validate(path)?;
        let before = self.storage.cell_count();
        self.storage.remove(path);
        let removed = self.storage.cell_count() < before;
        if removed {
            self.invalidate_cache();
        }
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.storage.clear();
        self.invalidate_cache();
        debug!("cube '{}': cleared", self.name);
    }

    /// Shrinks under-used pages of the base storage and the cache.
    pub fn compact(&mut self) {
        let freed = self.storage.compact();
        if let Some(cache) = &mut self.cache {
            cache.compact();
        }
        debug!("cube '{}': compacted ({} bytes)", self.name, freed);
    }

    // ========================================================================
    // CONSOLIDATION CACHE
    // ========================================================================

    /// Gives this cube a consolidation cache booked with `manager`.
    pub fn attach_cache(&mut self, manager: &Arc<CacheManager>) -> Result<(), CubeError> {
        if self.cache.is_none() {
            self.cache = Some(manager.register(self.id, self.dimensions.len())?);
        }
        Ok(())
    }

    /// Drops the cache; its bytes are released.
    pub fn detach_cache(&mut self) {
        self.cache = None;
    }

    pub fn cache(&self) -> Option<&ConsolidationCache> {
        self.cache.as_ref()
    }

    /// Consolidated values depend on many base cells, so any base write
    /// drops the whole cache.
    fn invalidate_cache(&mut self) {
        if let Some(cache) = &mut self.cache {
            if !cache.is_empty() {
                cache.clear();
            }
        }
    }

    // ========================================================================
    // ITERATION
    // ========================================================================

    /// Walks the cube for one page of `request`.
    ///
    /// # Errors
    /// See `CubeLooper::new` and `CubeLooper::run`.
    pub fn loop_cells<V>(
        &self,
        visitor: V,
        request: &LoopRequest,
        aggregator: Option<&mut dyn Aggregator>,
    ) -> Result<LoopOutcome, CubeError>
    where
        V: FnMut(&[ElementId], &CellValue),
    {
        let dimensions = self.dimension_orders();
        loop_cells(&self.storage, &dimensions, request, aggregator, visitor)
    }

    /// Like `loop_cells`, answering consolidated paths from the attached
    /// cache and filling it with what `aggregator` computes.
    pub fn loop_cells_cached<V, A>(
        &mut self,
        visitor: V,
        request: &LoopRequest,
        aggregator: A,
    ) -> Result<LoopOutcome, CubeError>
    where
        V: FnMut(&[ElementId], &CellValue),
        A: Aggregator,
    {
        let dimensions: Vec<&dyn ElementOrder> = self
            .dimensions
            .iter()
            .map(|d| d.as_ref() as &dyn ElementOrder)
            .collect();
        match &mut self.cache {
            Some(cache) => {
                let mut cached = CachedAggregator::new(cache, aggregator);
                let aggregator: &mut dyn Aggregator = &mut cached;
                loop_cells(&self.storage, &dimensions, request, Some(aggregator), visitor)
            }
            None => {
                let mut inner = aggregator;
                let aggregator: &mut dyn Aggregator = &mut inner;
                loop_cells(&self.storage, &dimensions, request, Some(aggregator), visitor)
            }
        }
    }

    fn dimension_orders(&self) -> Vec<&dyn ElementOrder> {
        self.dimensions
            .iter()
            .map(|d| d.as_ref() as &dyn ElementOrder)
            .collect()
    }

    fn validate(&self, path: &[ElementId]) -> Result<(), CubeError> {
        if path.len() != self.dimensions.len() {
            return Err(CubeError::PathLength {
                expected: self.dimensions.len(),
                actual: path.len(),
            });
        }
        for (dimension, &element) in self.dimensions.iter().zip(path) {
            if !dimension.contains(element) {
                return Err(CubeError::UnknownElement {
                    dimension: dimension.name().to_string(),
                    element,
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.dimensions.iter().map(|d| d.name()).collect();
        f.debug_struct("Cube")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("dimensions", &names)
            .field("cells", &self.storage.cell_count())
            .field("bytes", &self.storage.byte_size())
            .finish()
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} cells)", self.name, self.storage.cell_count())
    }
}

/// Renders a path with its dimension names, e.g. `Region=3, Product=17`.
pub fn describe_path(cube: &Cube, path: &[ElementId]) -> String {
    if path.len() != cube.dimension_count() {
        return format_path(path);
    }
    cube.dimensions
        .iter()
        .zip(path)
        .map(|(d, id)| format!("{}={}", d.name(), id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cube_model::Dimension;

    fn cube() -> Cube {
        let regions = Dimension::with_base_elements("Region", &[10, 11]).unwrap();
        let products = Dimension::with_base_elements("Product", &[20, 21, 22]).unwrap();
        Cube::new(
            1,
            "Sales",
            vec![Arc::new(regions), Arc::new(products)],
            CapacityPolicy::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_needs_dimensions() {
        let result = Cube::new(1, "Empty", Vec::new(), CapacityPolicy::default());
        assert!(matches!(result, Err(CubeError::NoDimensions)));
    }

    #[test]
    fn test_put_lookup_remove() {
        let mut cube = cube();
        cube.put(&[10, 21], CellValue::Numeric(3.5)).unwrap();
        assert_eq!(cube.lookup(&[10, 21]).unwrap(), CellValue::Numeric(3.5));
        assert_eq!(cube.lookup(&[11, 21]).unwrap(), CellValue::Undefined);
        assert_eq!(cube.cell_count(), 1);

        assert!(cube.remove(&[10, 21]).unwrap());
        assert!(!cube.remove(&[10, 21]).unwrap());
        assert_eq!(cube.cell_count(), 0);
    }

    #[test]
    fn test_paths_are_validated() {
        let mut cube = cube();
        assert!(matches!(
            cube.put(&[10], CellValue::Numeric(1.0)),
            Err(CubeError::PathLength { expected: 2, actual: 1 })
        ));
        match cube.lookup(&[10, 99]) {
            Err(CubeError::UnknownElement { dimension, element }) => {
                assert_eq!(dimension, "Product");
                assert_eq!(element, 99);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            cube.put(&[10, 20], CellValue::Consolidated),
            Err(CubeError::UnstorableValue)
        ));
    }

    #[test]
    fn test_consolidated_paths_are_not_stored() {
        let mut regions = Dimension::with_base_elements("Region", &[10]).unwrap();
        regions.add_consolidated(12).unwrap();
        let mut cube = Cube::new(2, "Plan", vec![Arc::new(regions)], CapacityPolicy::default())
            .unwrap();
        assert!(matches!(
            cube.put(&[12], CellValue::Numeric(1.0)),
            Err(CubeError::UnstorableValue)
        ));
        assert_eq!(cube.lookup(&[12]).unwrap(), CellValue::Undefined);
    }

    #[test]
    fn test_base_write_clears_cache() {
        let manager = Arc::new(CacheManager::default());
        let mut regions = Dimension::with_base_elements("Region", &[10, 11]).unwrap();
        regions.add_consolidated(12).unwrap();
        let products = Dimension::with_base_elements("Product", &[20]).unwrap();
        let mut cube = Cube::new(
            1,
            "Sales",
            vec![Arc::new(regions), Arc::new(products)],
            CapacityPolicy::default(),
        )
        .unwrap();
        cube.attach_cache(&manager).unwrap();
        cube.put(&[10, 20], CellValue::Numeric(1.0)).unwrap();

        let request = LoopRequest::new(10).emit_all(true);
        let mut seen = Vec::new();
        cube.loop_cells_cached(
            |path, value| seen.push((path.to_vec(), value.clone())),
            &request,
            |_: &[ElementId]| CellValue::Numeric(7.0),
        )
        .unwrap();
        assert_eq!(seen.last(), Some(&(vec![12, 20], CellValue::Numeric(7.0))));
        assert_eq!(cube.cache().map(|c| c.len()), Some(1));
        assert!(manager.used_bytes() > 0);

        cube.put(&[11, 20], CellValue::Numeric(2.0)).unwrap();
        assert_eq!(cube.cache().map(|c| c.len()), Some(0));
        assert_eq!(manager.used_bytes(), 0);

        assert_eq!(manager.registered_cubes(), vec![1]);
        cube.detach_cache();
        assert!(manager.registered_cubes().is_empty());
    }

    #[test]
    fn test_describe_path() {
        let cube = cube();
        assert_eq!(describe_path(&cube, &[11, 22]), "Region=11, Product=22");
        assert_eq!(describe_path(&cube, &[11]), "11");
        assert_eq!(cube.to_string(), "Sales (0 cells)");
    }
}
