//! # Tabulation configuration
//!
//! Parameters of the cache, stored as JSON:
//! ```json
//! {
//!   "max_n_leafs": 5000,
//!   "tolerance": 1e-4,
//!   "initial_radius": 1e-3,
//!   "max_growth": 0,
//!   "max_secondary_searches": 0,
//!   "check_interval": 1000,
//!   "max_depth_factor": 2.0,
//!   "eviction": { "kind": "LeastRetrieved", "keep_fraction": 0.7 }
//! }
//! ```
//! Every field is optional; missing fields take the defaults above.
use super::eviction::{Evict, EvictionPolicy};
use super::tab_error::TabulationError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TabulationConfig {
    /// capacity of the table (number of leaves)
    pub max_n_leafs: usize,
    /// absolute error tolerated when a region grows
    pub tolerance: f64,
    /// radius of the region of a fresh entry
    pub initial_radius: f64,
    /// maximal number of grow operations of one entry, 0 - unlimited
    pub max_growth: usize,
    /// leaves examined after a failed primary search, 0 - no secondary search
    pub max_secondary_searches: usize,
    /// number of queries between two maintenance passes, 0 - never
    pub check_interval: u64,
    /// the tree is balanced when depth > max_depth_factor * log2(number of leaves)
    pub max_depth_factor: f64,
    pub eviction: EvictionPolicy,
}

impl Default for TabulationConfig {
    fn default() -> Self {
        Self {
            max_n_leafs: 5000,
            tolerance: 1e-4,
            initial_radius: 1e-3,
            max_growth: 0,
            max_secondary_searches: 0,
            check_interval: 1000,
            max_depth_factor: 2.0,
            eviction: EvictionPolicy::default(),
        }
    }
}

impl TabulationConfig {
    /// Loads the configuration from a JSON file. A missing file gives the default
    /// configuration, a malformed one is an error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TabulationError> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(
                "tabulation config '{}' not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        info!("tabulation config loaded from '{}'", path.display());
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self, TabulationError> {
        let config: TabulationConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), TabulationError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), TabulationError> {
        let invalid =
            |msg: String| -> Result<(), TabulationError> { Err(TabulationError::InvalidConfig(msg)) };
        if self.max_n_leafs == 0 {
            return invalid("max_n_leafs must be positive".to_string());
        }
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return invalid(format!("tolerance must be positive, got {}", self.tolerance));
        }
        if !(self.initial_radius >= 0.0 && self.initial_radius.is_finite()) {
            return invalid(format!(
                "initial_radius must be non-negative, got {}",
                self.initial_radius
            ));
        }
        if !(self.max_depth_factor >= 1.0) {
            return invalid(format!(
                "max_depth_factor must be at least 1, got {}",
                self.max_depth_factor
            ));
        }
        self.eviction
            .validate()
            .map_err(TabulationError::InvalidConfig)
    }
}
