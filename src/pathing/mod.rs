mod math;
mod geometry;
mod map_data;
mod error;
mod milepath;
mod visibility;
mod teleports;
mod astar;
mod builder;
pub mod cache;


// ============================================================================
// PUBLIC API
// ============================================================================

pub use math::{closest_point_on_segment, segments_intersect, GamePos, Vec2, GEOM_EPSILON};
pub use geometry::{AdjacentSide, Aabb, SimplePt, DEFAULT_MAX_HEIGHT_DIFF, EDGE_TOLERANCE};
pub use map_data::{
    MapDataSource, MapSpecificData, PathingPlane, PathingTrapezoid, PositionSource, RonDirectorySource,
    StaticMapSource, Teleport, TeleportDirection,
};
pub use error::{BuildError, CacheError, Error};
pub use milepath::{
    BoxId, BoxLink, GraphSettings, GraphStatus, MilePath, Point, PointId, PointVisElement, Portal,
    TeleportPointType, MAX_VISIBILITY_RANGE,
};
pub use visibility::LosScratch;
pub use teleports::{TeleportJump, TeleportNode};
pub use astar::{AStar, Path, DEFAULT_SNAP_TOLERANCE};
pub use builder::{BuildOutcome, BuildProgress, CancelToken, MapPathing, MilePathWorker};
