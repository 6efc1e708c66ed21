use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::pathing::{GraphSettings, DEFAULT_MAX_HEIGHT_DIFF, DEFAULT_SNAP_TOLERANCE, MAX_VISIBILITY_RANGE};

/// Pathing configuration, read once from a RON file. Missing fields take
/// their defaults, so a partial file only overrides what it names.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct PathingConfig {
    // Graph shape (changing these invalidates cached graphs)
    pub max_visibility_range: f32,
    pub max_height_diff: f32,

    // Search
    pub snap_tolerance: f32,

    // Graph cache
    pub use_graph_cache: bool,
    pub cache_dir: PathBuf,
}

impl Default for PathingConfig {
    fn default() -> Self {
        Self {
            max_visibility_range: MAX_VISIBILITY_RANGE,
            max_height_diff: DEFAULT_MAX_HEIGHT_DIFF,
            snap_tolerance: DEFAULT_SNAP_TOLERANCE,
            use_graph_cache: false,
            cache_dir: PathBuf::from("cache/pathing"),
        }
    }
}

impl PathingConfig {
    pub fn graph_settings(&self) -> GraphSettings {
        GraphSettings {
            max_visibility_range: self.max_visibility_range,
            max_height_diff: self.max_height_diff,
        }
    }

    pub fn from_ron_str(contents: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(contents)
    }

    /// Load from `path`, falling back to the defaults when the file is
    /// missing or malformed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_ron_str(&contents) {
                Ok(config) => {
                    info!("Loaded pathing config from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse pathing config {}: {}", path.display(), e);
                    error!("Using default PathingConfig");
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                error!("Using default PathingConfig");
                Self::default()
            }
        }
    }
}
