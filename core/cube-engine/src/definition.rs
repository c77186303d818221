//! FILENAME: core/cube-engine/src/definition.rs
//! Loop Definition - The serializable description of one looper call.
//!
//! These structures are designed to be:
//! - Serializable (export callers persist and resend cursors between pages)
//! - Cheap to clone
//! - Independent of any captured dimension state

use serde::{Deserialize, Serialize};

use cube_model::{ElementId, Path};

use crate::condition::NumericCondition;

/// Default number of paths returned per looper call.
pub const DEFAULT_LOOP_SIZE: usize = 1000;

// ============================================================================
// CURSOR
// ============================================================================

/// Position of a paginated iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cursor {
    /// Before the first path.
    Start,
    /// Resume with the path following this one in canonical order.
    After(Path),
    /// The cross product is exhausted.
    End,
}

impl Cursor {
    pub fn after(path: &[ElementId]) -> Self {
        Cursor::After(Path::from_slice(path))
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Cursor::End)
    }

    pub fn path(&self) -> Option<&[ElementId]> {
        match self {
            Cursor::After(path) => Some(path.as_slice()),
            Cursor::Start | Cursor::End => None,
        }
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::Start
    }
}

// ============================================================================
// REQUEST
// ============================================================================

/// Everything a looper call needs besides the visitor and the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopRequest {
    /// Maximum number of paths handed to the visitor.
    pub size: usize,

    /// Where to resume.
    #[serde(default)]
    pub start: Cursor,

    /// Synthesize and emit empty paths between stored cells.
    #[serde(default)]
    pub emit_all: bool,

    /// Drop undefined, zero and empty-string values.
    #[serde(default)]
    pub skip_empty: bool,

    /// Only walk base (leaf) elements.
    #[serde(default)]
    pub base_only: bool,

    /// Only emit values satisfying this condition.
    #[serde(default)]
    pub condition: Option<NumericCondition>,

    /// Per-dimension element subsets. `None` for a dimension keeps all of it.
    #[serde(default)]
    pub area: Option<Vec<Option<Vec<ElementId>>>>,
}

impl LoopRequest {
    pub fn new(size: usize) -> Self {
        LoopRequest {
            size,
            start: Cursor::Start,
            emit_all: false,
            skip_empty: false,
            base_only: false,
            condition: None,
            area: None,
        }
    }

    pub fn starting_at(mut self, start: Cursor) -> Self {
        self.start = start;
        self
    }

    pub fn emit_all(mut self, emit_all: bool) -> Self {
        self.emit_all = emit_all;
        self
    }

    pub fn skip_empty(mut self, skip_empty: bool) -> Self {
        self.skip_empty = skip_empty;
        self
    }

    pub fn base_only(mut self, base_only: bool) -> Self {
        self.base_only = base_only;
        self
    }

    pub fn with_condition(mut self, condition: NumericCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn with_area(mut self, area: Vec<Option<Vec<ElementId>>>) -> Self {
        self.area = Some(area);
        self
    }
}

impl Default for LoopRequest {
    fn default() -> Self {
        LoopRequest::new(DEFAULT_LOOP_SIZE)
    }
}

// ============================================================================
// OUTCOME
// ============================================================================

/// Result of one looper call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopOutcome {
    /// Cursor to pass as `start` of the next call.
    pub cursor: Cursor,

    /// Product of all dimension sizes, for progress display.
    pub estimated_total: u64,

    /// Paths handed to the visitor.
    pub emitted: usize,

    /// Paths examined, including the ones rejected by filters.
    pub visited: usize,
}
