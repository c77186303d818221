//! FILENAME: core/cube-engine/src/config.rs
//! Engine configuration - the serializable tuning knobs.
//!
//! This module contains:
//! - `CapacityPolicy`: how pages grow and when an explicit compaction shrinks them
//! - `CacheConfig`: the process-wide consolidation cache ceiling
//! - `EngineConfig`: both of the above, loadable from JSON

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default byte ceiling shared by all consolidation caches (64 MiB).
pub const DEFAULT_MAXIMUM_CACHE_SIZE: usize = 64 * 1024 * 1024;

// ============================================================================
// PAGE CAPACITY
// ============================================================================

/// Growth and shrink policy for pages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacityPolicy {
    /// Row capacity allocated when a page is first written.
    pub initial_capacity: usize,

    /// Multiplier applied to the capacity when a full page grows.
    pub growth_factor: f64,

    /// `compact` shrinks a page to its row count when fewer than
    /// `shrink_threshold * capacity` rows are in use.
    pub shrink_threshold: f64,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        CapacityPolicy {
            initial_capacity: 8,
            growth_factor: 2.0,
            shrink_threshold: 0.5,
        }
    }
}

impl CapacityPolicy {
    /// Capacity to grow to when a page holding `capacity` rows needs room for
    /// `required` rows.
    pub fn grown_capacity(&self, capacity: usize, required: usize) -> usize {
        if capacity == 0 {
            return self.initial_capacity.max(required);
        }
        let grown = (capacity as f64 * self.growth_factor).ceil() as usize;
        grown.max(capacity + 1).max(required)
    }

    /// Capacity a page should shrink to during compaction, if any.
    pub fn shrink_target(&self, len: usize, capacity: usize) -> Option<usize> {
        if capacity == 0 || len == capacity {
            return None;
        }
        if (len as f64) < capacity as f64 * self.shrink_threshold {
            Some(len)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capacity == 0 {
            return Err(ConfigError::InvalidPolicy(
                "initial_capacity must be at least 1".to_string(),
            ));
        }
        if !(self.growth_factor > 1.0) {
            return Err(ConfigError::InvalidPolicy(format!(
                "growth_factor must be greater than 1, got {}",
                self.growth_factor
            )));
        }
        if !(self.shrink_threshold > 0.0 && self.shrink_threshold <= 1.0) {
            return Err(ConfigError::InvalidPolicy(format!(
                "shrink_threshold must be in (0, 1], got {}",
                self.shrink_threshold
            )));
        }
        Ok(())
    }
}

// ============================================================================
// CACHE / ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Byte ceiling shared by every cube's consolidation cache.
    /// Zero disables caching entirely.
    pub maximum_size_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            maximum_size_bytes: DEFAULT_MAXIMUM_CACHE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub pages: CapacityPolicy,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.pages.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
