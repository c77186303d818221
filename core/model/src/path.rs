//! FILENAME: core/model/src/path.rs
//! PURPOSE: Element identifiers and cell paths.
//! CONTEXT: A path holds one element identifier per cube dimension and
//! uniquely addresses a cell. Identifiers are opaque: their magnitude says
//! nothing about their position in the dimension. This module also converts
//! between paths and the comma separated text form used in logs and by
//! export callers ("3,17,0").

use smallvec::SmallVec;

use crate::error::ModelError;

/// Opaque element identifier, unique within one dimension.
pub type ElementId = u32;

/// Index of a dimension within a cube (0-based).
pub type DimensionIndex = usize;

/// A cell address. Cubes rarely exceed eight dimensions, so paths stay
/// inline in the common case.
pub type Path = SmallVec<[ElementId; 8]>;

/// Builds a path from a slice of identifiers.
pub fn path_of(ids: &[ElementId]) -> Path {
    Path::from_slice(ids)
}

/// Converts a path to its text form.
/// [3, 17, 0] -> "3,17,0"
pub fn format_path(path: &[ElementId]) -> String {
    let mut result = String::with_capacity(path.len() * 4);
    for (i, id) in path.iter().enumerate() {
        if i > 0 {
            result.push(',');
        }
        result.push_str(&id.to_string());
    }
    result
}

/// Parses the text form of a path.
/// "3,17,0" -> [3, 17, 0]. Whitespace around identifiers is ignored.
///
/// # Errors
/// Returns `ModelError::InvalidPath` for empty input or non-numeric parts.
pub fn parse_path(text: &str) -> Result<Path, ModelError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ModelError::InvalidPath(text.to_string()));
    }

    let mut path = Path::new();
    for part in trimmed.split(',') {
        let id = part
            .trim()
            .parse::<ElementId>()
            .map_err(|_| ModelError::InvalidPath(text.to_string()))?;
        path.push(id);
    }
    Ok(path)
}
