//! Host-supplied map geometry.
//!
//! The game client owns the raw pathing data; the pathing core only sees the
//! read-only snapshots defined here, fetched through [`MapDataSource`] when a
//! graph build starts.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

use super::math::GamePos;

/// Raw trapezoid as stored in a pathing plane: a top and bottom horizontal
/// edge with independent x extents.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PathingTrapezoid {
    pub xtl: f32,
    pub xtr: f32,
    pub yt: f32,
    pub xbl: f32,
    pub xbr: f32,
    pub yb: f32,
}

impl PathingTrapezoid {
    /// Axis-aligned rectangle spanning `x0..x1` × `y0..y1`.
    pub fn rect(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { xtl: x0, xtr: x1, yt: y1, xbl: x0, xbr: x1, yb: y0 }
    }
}

/// One walkable plane of the map. Its index in [`MapSpecificData::planes`]
/// becomes the layer of every trapezoid it holds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PathingPlane {
    #[serde(default)]
    pub height: f32,
    pub trapezoids: Vec<PathingTrapezoid>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeleportDirection {
    OneWay,
    BothWays,
}

/// Teleporter placed on the map: stepping on `enter` moves the player to
/// `exit` (and back, for two-way teleporters).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Teleport {
    pub enter: GamePos,
    pub exit: GamePos,
    pub direction: TeleportDirection,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapSpecificData {
    pub map_id: u32,
    pub planes: Vec<PathingPlane>,
    #[serde(default)]
    pub teleports: Vec<Teleport>,
}

impl MapSpecificData {
    pub fn trapezoid_count(&self) -> usize {
        self.planes.iter().map(|p| p.trapezoids.len()).sum()
    }

    pub fn from_ron_str(contents: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(contents)
    }

    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_ron_str(&contents)?)
    }
}

/// Supplies map geometry for a map id. Returns `None` when the map has no
/// pathing data (or it could not be read).
pub trait MapDataSource: Send + Sync {
    fn load(&self, map_id: u32) -> Option<MapSpecificData>;
}

/// Where the player currently stands, if the host knows.
pub trait PositionSource {
    fn player_position(&self) -> Option<GamePos>;
}

/// In-memory map store.
#[derive(Default)]
pub struct StaticMapSource {
    maps: FxHashMap<u32, MapSpecificData>,
}

impl StaticMapSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, data: MapSpecificData) {
        self.maps.insert(data.map_id, data);
    }

    pub fn with_map(mut self, data: MapSpecificData) -> Self {
        self.insert(data);
        self
    }
}

impl MapDataSource for StaticMapSource {
    fn load(&self, map_id: u32) -> Option<MapSpecificData> {
        self.maps.get(&map_id).cloned()
    }
}

/// Reads `<dir>/<map_id>.ron` on demand.
pub struct RonDirectorySource {
    dir: PathBuf,
}

impl RonDirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MapDataSource for RonDirectorySource {
    fn load(&self, map_id: u32) -> Option<MapSpecificData> {
        let path = self.dir.join(format!("{map_id}.ron"));
        if !path.exists() {
            warn!("No pathing data for map {} at {}", map_id, path.display());
            return None;
        }
        match MapSpecificData::load_ron(&path) {
            Ok(mut data) => {
                if data.map_id != map_id {
                    warn!("{} declares map {}, using {}", path.display(), data.map_id, map_id);
                    data.map_id = map_id;
                }
                Some(data)
            }
            Err(e) => {
                error!("Failed to load pathing data from {}: {}", path.display(), e);
                None
            }
        }
    }
}
