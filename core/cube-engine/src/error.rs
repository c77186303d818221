//! FILENAME: core/cube-engine/src/error.rs

use std::collections::TryReserveError;

use cube_model::{ElementId, ModelError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CubeError {
    #[error("Path has {actual} elements, cube has {expected} dimensions")]
    PathLength { expected: usize, actual: usize },

    #[error("Element {element} does not exist in dimension '{dimension}'")]
    UnknownElement { dimension: String, element: ElementId },

    #[error("Consolidated values are computed, they cannot be stored")]
    UnstorableValue,

    #[error("A cube needs at least one dimension")]
    NoDimensions,

    #[error("Area restricts {actual} dimensions, cube has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Cube {0} already has a consolidation cache")]
    CacheRegistered(u32),

    #[error("Page allocation failed: {0}")]
    Allocation(#[from] TryReserveError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    #[error("Empty condition")]
    Empty,

    #[error("Unknown comparison operator in {0:?}")]
    UnknownOperator(String),

    #[error("Invalid number in condition: {0:?}")]
    InvalidNumber(String),

    #[error("Unexpected token in condition: {0:?}")]
    UnexpectedToken(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid capacity policy: {0}")]
    InvalidPolicy(String),
}
