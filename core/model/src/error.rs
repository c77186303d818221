//! FILENAME: core/model/src/error.rs

use thiserror::Error;

use crate::path::ElementId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid path: {0:?}")]
    InvalidPath(String),

    #[error("Element {element} already exists in dimension '{dimension}'")]
    DuplicateElement { dimension: String, element: ElementId },

    #[error("Element {element} not found in dimension '{dimension}'")]
    ElementNotFound { dimension: String, element: ElementId },
}
