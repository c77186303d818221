//! FILENAME: core/cube-engine/src/lib.rs
//! Sparse cube engine: base cell storage, consolidation cache and looper.
//!
//! This crate stores the base cells of multidimensional cubes and walks
//! their cross product in canonical order, page by page. It depends on
//! `cube-model` only for shared types (CellValue, Path, ElementOrder).
//!
//! Layers:
//! - `page` / `storage`: Bucketed, growable row pages (WHERE cells live)
//! - `cell_ref`: Borrowed, kind-tagged handles to stored rows
//! - `consolidation`: Bounded cache of computed aggregates, shared ceiling
//! - `order` / `looper`: Canonical ordering and paginated iteration
//! - `definition` / `condition`: Serializable loop requests and filters
//! - `cube`: The facade callers use
//!
//! PIPELINE: LoopRequest --> PathOrder capture --> ordered buckets -->
//! sorted rows (+ synthesized empties) --> filters --> visitor --> Cursor

pub mod cell_ref;
pub mod condition;
pub mod config;
pub mod consolidation;
pub mod cube;
pub mod definition;
pub mod error;
pub mod looper;
pub mod order;
pub mod page;
pub mod storage;

// Re-export commonly used types at the crate root
pub use cell_ref::{CellRef, RowRef};
pub use condition::{Clause, Comparison, NumericCondition};
pub use config::{CacheConfig, CapacityPolicy, EngineConfig, DEFAULT_MAXIMUM_CACHE_SIZE};
pub use consolidation::{CacheManager, CachePut, CacheStats, CachedAggregator, ConsolidationCache};
pub use cube::{describe_path, Cube, CubeId, SharedDimension};
pub use definition::{Cursor, LoopOutcome, LoopRequest, DEFAULT_LOOP_SIZE};
pub use error::{ConditionError, ConfigError, CubeError};
pub use looper::{loop_cells, Aggregator, CubeLooper};
pub use order::{Odometer, OrderKey, PathOrder};
pub use page::{ByteDelta, NumericPage, Page, RowValue, StringPage};
pub use storage::{Bucket, BucketKey, Storage};

pub use cube_model::{CellValue, Dimension, ElementId, ElementKind, ElementOrder, Path, ValueKind};
