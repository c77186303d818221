//! FILENAME: core/model/src/lib.rs
//! PURPOSE: Main library entry point for the shared cube model types.
//! CONTEXT: Re-exports the value, path and dimension types used by
//! `cube-engine` and by callers that feed it paths and dimensions.

pub mod cell;
pub mod dimension;
pub mod error;
pub mod path;

// Re-export commonly used types at the crate root
pub use cell::{CellValue, ValueKind};
pub use dimension::{Dimension, ElementKind, ElementOrder};
pub use error::ModelError;
pub use path::{format_path, parse_path, path_of, DimensionIndex, ElementId, Path};
