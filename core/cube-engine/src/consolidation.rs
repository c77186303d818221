//! FILENAME: core/cube-engine/src/consolidation.rs
//! Consolidation Cache - bounded cache of computed aggregates.
//!
//! The cache is designed for:
//! - Lazy population: entries appear the first time a consolidated path is computed
//! - Bounded memory: every cube's cache counts against one process-wide ceiling
//! - Exact accounting: the shared counter always equals the sum of all cache pages
//! - Cheap invalidation: clearing one cube's cache is O(pages)
//!
//! Architecture:
//! - `CacheManager` owns the ceiling, the shared byte counter and the registry
//!   of cubes with a cache. It is shared through `Arc`.
//! - `ConsolidationCache` is one cube's cache. It stores entries in a
//!   `Storage`, exactly like base cells, and books every page byte delta
//!   with its manager.
//! - `CachedAggregator` puts a cache in front of any `Aggregator`.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use cube_model::{format_path, CellValue, ElementId};

use crate::config::{CacheConfig, CapacityPolicy, EngineConfig};
use crate::cube::CubeId;
use crate::error::CubeError;
use crate::looper::Aggregator;
use crate::page::ByteDelta;
use crate::storage::Storage;

// ============================================================================
// CACHE MANAGER
// ============================================================================

/// Counters describing cache use across all cubes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Puts refused because they would exceed the ceiling.
    pub rejected: u64,
    pub used_bytes: usize,
    pub maximum_bytes: usize,
    pub cubes: usize,
}

/// Owner of the process-wide cache ceiling and byte counter.
#[derive(Debug)]
pub struct CacheManager {
    maximum: AtomicUsize,
    used: AtomicUsize,
    /// Bytes booked per registered cube.
    footprints: Mutex<FxHashMap<CubeId, usize>>,
    policy: CapacityPolicy,
    hits: AtomicU64,
    misses: AtomicU64,
    rejected: AtomicU64,
}

impl CacheManager {
    pub fn new(config: CacheConfig, policy: CapacityPolicy) -> Self {
        CacheManager {
            maximum: AtomicUsize::new(config.maximum_size_bytes),
            used: AtomicUsize::new(0),
            footprints: Mutex::new(FxHashMap::default()),
            policy,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        CacheManager::new(config.cache, config.pages)
    }

    /// Sets the ceiling. Zero disables caching. Existing entries are kept
    /// even when usage is now above the ceiling; clearing is explicit.
    pub fn configure_maximum_size(&self, bytes: usize) {
        let previous = self.maximum.swap(bytes, Ordering::SeqCst);
        if previous != bytes {
            info!("consolidation cache: maximum size {} -> {} bytes", previous, bytes);
        }
    }

    pub fn maximum_size(&self) -> usize {
        self.maximum.load(Ordering::SeqCst)
    }

    pub fn is_cache_enabled(&self) -> bool {
        self.maximum_size() > 0
    }

    /// Bytes held by all cache pages of all cubes.
    pub fn used_bytes(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    /// Bytes booked for one cube, `None` if it has no cache.
    pub fn footprint(&self, cube_id: CubeId) -> Option<usize> {
        self.lock_footprints().get(&cube_id).copied()
    }

    /// Cubes that currently own a cache, in ascending id order.
    pub fn registered_cubes(&self) -> Vec<CubeId> {
        let mut cubes: Vec<CubeId> = self.lock_footprints().keys().copied().collect();
        cubes.sort_unstable();
        cubes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            used_bytes: self.used_bytes(),
            maximum_bytes: self.maximum_size(),
            cubes: self.lock_footprints().len(),
        }
    }

    /// Creates the cache of a cube with `width` dimensions.
    ///
    /// # Errors
    /// A cube can only own one cache at a time.
    pub fn register(
        self: &Arc<Self>,
        cube_id: CubeId,
        width: usize,
    ) -> Result<ConsolidationCache, CubeError> {
        if width == 0 {
            return Err(CubeError::NoDimensions);
        }
        {
            let mut footprints = self.lock_footprints();
            if footprints.contains_key(&cube_id) {
                return Err(CubeError::CacheRegistered(cube_id));
            }
            footprints.insert(cube_id, 0);
        }
        debug!("consolidation cache: registered cube {}", cube_id);
        Ok(ConsolidationCache {
            cube_id,
            manager: Arc::clone(self),
            storage: Storage::new(width, self.policy),
        })
    }

    /// True if `growth` more bytes stay within the ceiling.
    fn fits(&self, growth: usize) -> bool {
        self.used_bytes().saturating_add(growth) <= self.maximum_size()
    }

    /// Books a page byte delta for a cube. The registry lock is held while
    /// both the cube footprint and the shared counter move.
    fn book(&self, cube_id: CubeId, delta: ByteDelta) {
        if delta == 0 {
            return;
        }
        let mut footprints = self.lock_footprints();
        let footprint = footprints.entry(cube_id).or_insert(0);
        if delta > 0 {
            *footprint += delta as usize;
            self.used.fetch_add(delta as usize, Ordering::SeqCst);
        } else {
            let freed = delta.unsigned_abs();
            *footprint = footprint.saturating_sub(freed);
            self.used.fetch_sub(freed, Ordering::SeqCst);
        }
    }

    fn deregister(&self, cube_id: CubeId) {
        let mut footprints = self.lock_footprints();
        if let Some(left) = footprints.remove(&cube_id) {
            if left > 0 {
                warn!("consolidation cache: cube {} dropped with {} bytes booked", cube_id, left);
                self.used.fetch_sub(left, Ordering::SeqCst);
            }
        }
        debug!("consolidation cache: deregistered cube {}", cube_id);
    }

    fn lock_footprints(&self) -> MutexGuard<'_, FxHashMap<CubeId, usize>> {
        self.footprints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        CacheManager::new(CacheConfig::default(), CapacityPolicy::default())
    }
}

// ============================================================================
// CONSOLIDATION CACHE
// ============================================================================

/// Outcome of `ConsolidationCache::put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePut {
    Stored,
    /// The entry would push the shared counter over the ceiling.
    Rejected,
    /// Caching is disabled (ceiling is zero).
    Disabled,
}

/// Cache of computed consolidated values for one cube.
#[derive(Debug)]
pub struct ConsolidationCache {
    cube_id: CubeId,
    manager: Arc<CacheManager>,
    storage: Storage,
}

impl ConsolidationCache {
    pub fn cube_id(&self) -> CubeId {
        self.cube_id
    }

    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub fn is_enabled(&self) -> bool {
        self.manager.is_cache_enabled()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.storage.cell_count()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Bytes held by this cache's pages.
    pub fn byte_size(&self) -> usize {
        self.storage.byte_size()
    }

    /// Cached value for `path`; `None` is a miss. Disabled caches always miss
    /// without touching their pages.
    pub fn get(&self, path: &[ElementId]) -> Option<CellValue> {
        if !self.is_enabled() {
            return None;
        }
        match self.storage.lookup(path) {
            Some(found) => {
                self.manager.hits.fetch_add(1, Ordering::Relaxed);
                Some(found.value())
            }
            None => {
                self.manager.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Caches the computed value of `path`. Storing `Undefined` invalidates
    /// the entry.
    ///
    /// # Errors
    /// Fails on a wrong path length, on `Consolidated` and when page growth
    /// cannot allocate.
    pub fn put(&mut self, path: &[ElementId], value: CellValue) -> Result<CachePut, CubeError> {
        if !self.is_enabled() {
            return Ok(CachePut::Disabled);
        }
        let Some(kind) = value.kind() else {
            if value.is_undefined() {
                self.invalidate(path);
                return Ok(CachePut::Stored);
            }
            return Err(CubeError::UnstorableValue);
        };

        let growth = self.storage.predicted_growth(path, kind);
        if growth > 0 && !self.manager.fits(growth) {
            self.manager.rejected.fetch_add(1, Ordering::Relaxed);
            debug!(
                "consolidation cache: cube {} rejected {} ({} bytes over limit)",
                self.cube_id,
                format_path(path),
                growth
            );
            return Ok(CachePut::Rejected);
        }

        let delta = self.storage.put(path, value)?;
        self.manager.book(self.cube_id, delta);
        Ok(CachePut::Stored)
    }

    /// Drops the entry for `path`. Returns true if there was one.
    pub fn invalidate(&mut self, path: &[ElementId]) -> bool {
        let before = self.storage.cell_count();
        let delta = self.storage.remove(path);
        self.manager.book(self.cube_id, delta);
        self.storage.cell_count() < before
    }

    /// Drops every entry of this cube and releases its pages.
    pub fn clear(&mut self) {
        let delta = self.storage.clear();
        self.manager.book(self.cube_id, delta);
        debug!("consolidation cache: cleared cube {}", self.cube_id);
    }

    /// Shrinks under-used pages.
    pub fn compact(&mut self) {
        let delta = self.storage.compact();
        self.manager.book(self.cube_id, delta);
    }
}

impl Drop for ConsolidationCache {
    fn drop(&mut self) {
        let delta = self.storage.clear();
        self.manager.book(self.cube_id, delta);
        self.manager.deregister(self.cube_id);
    }
}

// ============================================================================
// CACHED AGGREGATOR
// ============================================================================

/// Answers consolidated paths from the cache, computing and caching misses.
pub struct CachedAggregator<'c, A> {
    cache: &'c mut ConsolidationCache,
    inner: A,
}

impl<'c, A: Aggregator> CachedAggregator<'c, A> {
    pub fn new(cache: &'c mut ConsolidationCache, inner: A) -> Self {
        CachedAggregator { cache, inner }
    }

    pub fn into_inner(self) -> A {
        self.inner
    }
}

impl<A: Aggregator> Aggregator for CachedAggregator<'_, A> {
    fn compute_consolidated_value(&mut self, path: &[ElementId]) -> CellValue {
        if !self.cache.is_enabled() {
            return self.inner.compute_consolidated_value(path);
        }
        if let Some(cached) = self.cache.get(path) {
            return cached;
        }

        let value = self.inner.compute_consolidated_value(path);
        if value.kind().is_some() {
            if let Err(err) = self.cache.put(path, value.clone()) {
                warn!(
                    "consolidation cache: could not cache {}: {}",
                    format_path(path),
                    err
                );
            }
        }
        value
    }
}
