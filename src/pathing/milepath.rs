use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::profiling::profile;
use super::error::BuildError;
use super::geometry::{AdjacentSide, Aabb, SimplePt, DEFAULT_MAX_HEIGHT_DIFF, EDGE_TOLERANCE};
use super::map_data::{MapSpecificData, Teleport};
use super::math::{segments_intersect, GamePos, Vec2, GEOM_EPSILON};
use super::teleports::{TeleportJump, TeleportNode};

/// Point pairs farther apart than this never get a visibility edge.
pub const MAX_VISIBILITY_RANGE: f32 = 5000.0;

pub type PointId = u32;
pub type BoxId = u32;

/// Parameters that shape the graph. Stored with the graph so a cached graph
/// built under different settings is never reused.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphSettings {
    pub max_visibility_range: f32,
    pub max_height_diff: f32,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_visibility_range: MAX_VISIBILITY_RANGE,
            max_height_diff: DEFAULT_MAX_HEIGHT_DIFF,
        }
    }
}

/// The line through which it is possible to cross from one trapezoid into
/// an adjacent one.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub start: Vec2,
    pub goal: Vec2,
    pub box1: BoxId,
    pub box2: BoxId,
}

impl Portal {
    pub fn intersect(&self, p1: Vec2, p2: Vec2) -> bool {
        segments_intersect(self.start, self.goal, p1, p2)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TeleportPointType {
    /// Walk onto it, never walk away from it.
    Enter,
    /// Arrive by teleport, walk away from it.
    Exit,
}

/// Vertex of the visibility graph. `id` is its index in `MilePath::points`
/// and `MilePath::vis_graph`, or above that range for ad hoc search points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub pos: Vec2,
    pub layer: u32,
    pub box_id: Option<BoxId>,
    /// Second box for points sampled on a portal.
    pub box2_id: Option<BoxId>,
    pub portal: Option<u32>,
    pub teleport: Option<TeleportPointType>,
}

impl Point {
    pub fn boxes(&self) -> impl Iterator<Item = BoxId> {
        self.box_id.into_iter().chain(self.box2_id)
    }

    pub fn shares_box(&self, other: &Point) -> bool {
        self.boxes().any(|b| other.boxes().any(|o| o == b))
    }

    pub fn accepts_incoming(&self) -> bool {
        self.teleport != Some(TeleportPointType::Exit)
    }

    pub fn allows_outgoing(&self) -> bool {
        self.teleport != Some(TeleportPointType::Enter)
    }
}

impl From<&Point> for GamePos {
    fn from(p: &Point) -> Self {
        GamePos::with_vec2(p.pos, p.layer)
    }
}

/// Directed visibility edge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PointVisElement {
    pub point_id: PointId,
    pub distance: f32,
    /// Layers this edge walks across, other than the layer it starts on. An
    /// edge is impassable while any of them is blocked.
    pub blocking_ids: SmallVec<[u32; 2]>,
}

/// Neighbor entry of the box adjacency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxLink {
    pub neighbor: BoxId,
    pub portal: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphStatus {
    #[default]
    Building,
    Ready,
}

/// Navigation graph for one map.
///
/// # Layout
///
/// Every collection is an arena indexed by id:
///
/// - `trapezoids[i]` and `aabbs[i]` describe the same cell (box id == trapezoid id)
/// - `aabb_graph[box]` lists adjacent boxes and the portal between them
/// - `points[p]` and `vis_graph[p]` share the point id space
///
/// The graph is built once (see [`MilePath::build_with`]) and never mutated
/// afterwards; searches layer their temporary points on top of it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MilePath {
    pub map_id: u32,
    pub settings: GraphSettings,
    pub status: GraphStatus,
    pub trapezoids: Vec<SimplePt>,
    pub aabbs: Vec<Aabb>,
    pub aabb_graph: Vec<SmallVec<[BoxLink; 4]>>,
    pub portals: Vec<Portal>,
    pub points: Vec<Point>,
    pub vis_graph: Vec<Vec<PointVisElement>>,
    pub teleports: Vec<Teleport>,
    pub teleport_jumps: Vec<TeleportJump>,
    pub teleport_graph: Vec<TeleportNode>,
    /// Row-major `jumps × jumps` lower bounds on the walking cost between
    /// leaving one jump and taking another.
    pub teleport_closure: Vec<f32>,
}

impl MilePath {
    pub fn new(map_id: u32, settings: GraphSettings) -> Self {
        Self {
            map_id,
            settings,
            ..Default::default()
        }
    }

    /// Run every build phase over `data`.
    ///
    /// `on_progress` receives the completed percentage after each phase and
    /// returns `false` to abandon the build. Phases are never interrupted
    /// midway.
    pub fn build_with(
        data: MapSpecificData,
        settings: GraphSettings,
        mut on_progress: impl FnMut(u8) -> bool,
    ) -> Result<MilePath, BuildError> {
        let map_id = data.map_id;
        let mut advance = |percent: u8| -> Result<(), BuildError> {
            if on_progress(percent) {
                Ok(())
            } else {
                info!("Graph build for map {} cancelled at {}%", map_id, percent);
                Err(BuildError::Cancelled(map_id))
            }
        };

        let build_start = Instant::now();
        info!("=== GRAPH BUILD START (map {}) ===", map_id);

        let mut mp = MilePath::new(map_id, settings);
        mp.load_map_specific_data(data);
        advance(5)?;
        mp.generate_aabbs();
        advance(10)?;
        mp.generate_aabb_graph();
        advance(25)?;
        mp.generate_points();
        advance(30)?;
        mp.generate_visibility_graph();
        advance(80)?;
        mp.generate_teleport_graph();
        advance(90)?;
        mp.insert_teleports_into_visibility_graph();
        advance(95)?;

        mp.status = GraphStatus::Ready;
        info!(
            "=== GRAPH BUILD COMPLETE (map {}) === {} trapezoids, {} portals, {} points, {} edges in {:?}",
            map_id,
            mp.trapezoids.len(),
            mp.portals.len(),
            mp.points.len(),
            mp.edge_count(),
            build_start.elapsed()
        );
        Ok(mp)
    }

    /// Synchronous build that never cancels.
    pub fn from_map_data(data: MapSpecificData, settings: GraphSettings) -> MilePath {
        let map_id = data.map_id;
        match Self::build_with(data, settings, |_| true) {
            Ok(mp) => mp,
            Err(e) => unreachable!("uncancellable build of map {map_id} failed: {e}"),
        }
    }

    pub fn ready(&self) -> bool {
        self.status == GraphStatus::Ready
    }

    pub fn edge_count(&self) -> usize {
        self.vis_graph.iter().map(Vec::len).sum()
    }

    pub fn layer_of_box(&self, box_id: BoxId) -> u32 {
        self.trapezoids[self.aabbs[box_id as usize].trapezoid as usize].layer
    }

    pub(crate) fn load_map_specific_data(&mut self, data: MapSpecificData) {
        self.map_id = data.map_id;
        self.trapezoids.clear();
        for (layer, plane) in data.planes.iter().enumerate() {
            for raw in &plane.trapezoids {
                let id = self.trapezoids.len() as u32;
                self.trapezoids.push(SimplePt::new(raw, id, layer as u32, plane.height));
            }
        }
        self.teleports = data.teleports;
        info!(
            "Loaded map {}: {} planes, {} trapezoids, {} teleports",
            self.map_id,
            data.planes.len(),
            self.trapezoids.len(),
            self.teleports.len()
        );
    }

    #[profile]
    pub(crate) fn generate_aabbs(&mut self) {
        self.aabbs = self
            .trapezoids
            .iter()
            .enumerate()
            .map(|(i, t)| Aabb::new(i as u32, t))
            .collect();
    }

    /// Connect touching trapezoids. Candidates come from a sweep over boxes
    /// sorted by their left edge, so only x-overlapping pairs are tested.
    #[profile]
    pub(crate) fn generate_aabb_graph(&mut self) {
        let start = Instant::now();
        self.aabb_graph = vec![SmallVec::new(); self.aabbs.len()];
        self.portals.clear();

        let padding = Vec2::new(EDGE_TOLERANCE, EDGE_TOLERANCE);
        let mut order: Vec<usize> = (0..self.aabbs.len()).collect();
        order.sort_by(|&i, &j| self.aabbs[i].min().x.total_cmp(&self.aabbs[j].min().x));

        for (k, &i) in order.iter().enumerate() {
            let reach = self.aabbs[i].max().x + EDGE_TOLERANCE;
            for &j in &order[k + 1..] {
                if self.aabbs[j].min().x > reach {
                    break;
                }
                if !self.aabbs[i].intersect_aabb(&self.aabbs[j], padding) {
                    continue;
                }
                let (t1, t2) = (self.aabbs[i].trapezoid as usize, self.aabbs[j].trapezoid as usize);
                let side = self.trapezoids[t1].touching_height(&self.trapezoids[t2], self.settings.max_height_diff);
                if side != AdjacentSide::None {
                    self.create_portal(i as BoxId, j as BoxId, side);
                }
            }
        }

        info!("Connected {} boxes through {} portals in {:?}", self.aabbs.len(), self.portals.len(), start.elapsed());
    }

    /// Add the crossing segment between two touching boxes. Returns `false`
    /// when the shared stretch is too short to walk through.
    pub(crate) fn create_portal(&mut self, box1: BoxId, box2: BoxId, side: AdjacentSide) -> bool {
        let t1 = &self.trapezoids[self.aabbs[box1 as usize].trapezoid as usize];
        let t2 = &self.trapezoids[self.aabbs[box2 as usize].trapezoid as usize];

        let horizontal = |y: f32, a0: f32, a1: f32, b0: f32, b1: f32| {
            let lo = a0.min(a1).max(b0.min(b1));
            let hi = a0.max(a1).min(b0.max(b1));
            (Vec2::new(lo, y), Vec2::new(hi, y))
        };

        let (start, goal) = match side {
            AdjacentSide::ATopBBottom => horizontal(t1.a.y, t1.a.x, t1.d.x, t2.b.x, t2.c.x),
            AdjacentSide::ABottomBTop => horizontal(t1.b.y, t1.b.x, t1.c.x, t2.a.x, t2.d.x),
            AdjacentSide::ALeftBRight => (t1.a, t1.b),
            AdjacentSide::ARightBLeft => (t1.d, t1.c),
            AdjacentSide::None => return false,
        };
        if start.distance(goal) <= GEOM_EPSILON {
            debug!("Skipping degenerate portal between boxes {} and {}", box1, box2);
            return false;
        }

        let portal = self.portals.len() as u32;
        self.portals.push(Portal { start, goal, box1, box2 });
        self.aabb_graph[box1 as usize].push(BoxLink { neighbor: box2, portal });
        self.aabb_graph[box2 as usize].push(BoxLink { neighbor: box1, portal });
        true
    }

    /// One graph point per portal endpoint. Shortest paths through the
    /// trapezoid mesh only ever bend at these corners.
    #[profile]
    pub(crate) fn generate_points(&mut self) {
        self.points.clear();
        for (portal_id, portal) in self.portals.iter().enumerate() {
            let layer = self.trapezoids[self.aabbs[portal.box1 as usize].trapezoid as usize].layer;
            let endpoints: SmallVec<[Vec2; 2]> = if portal.start.distance(portal.goal) <= GEOM_EPSILON {
                smallvec::smallvec![portal.start]
            } else {
                smallvec::smallvec![portal.start, portal.goal]
            };
            for pos in endpoints {
                let id = self.points.len() as PointId;
                self.points.push(Point {
                    id,
                    pos,
                    layer,
                    box_id: Some(portal.box1),
                    box2_id: Some(portal.box2),
                    portal: Some(portal_id as u32),
                    teleport: None,
                });
            }
        }
        info!("Generated {} graph points from {} portals", self.points.len(), self.portals.len());
    }

    /// Wrap a position into a graph point. The id is left at 0; the caller
    /// assigns it when inserting the point somewhere.
    pub fn create_point(&self, pos: GamePos) -> Point {
        let found = self.find_aabb(pos);
        Point {
            id: 0,
            pos: pos.vec2(),
            layer: found.map(|b| self.layer_of_box(b.id)).unwrap_or(pos.layer),
            box_id: found.map(|b| b.id),
            box2_id: None,
            portal: None,
            teleport: None,
        }
    }

    /// Box whose trapezoid contains `pos`, preferring `pos.layer` when
    /// planes overlap.
    pub fn find_aabb(&self, pos: GamePos) -> Option<&Aabb> {
        let p = pos.vec2();
        let mut fallback = None;
        for aabb in &self.aabbs {
            if !aabb.intersect_circle(p, GEOM_EPSILON) {
                continue;
            }
            let t = &self.trapezoids[aabb.trapezoid as usize];
            if !t.is_on_pathing_trapezoid(p) {
                continue;
            }
            if t.layer == pos.layer {
                return Some(aabb);
            }
            fallback.get_or_insert(aabb);
        }
        fallback
    }

    /// Trapezoid containing `p` on any layer.
    pub fn is_on_pathing_trapezoid(&self, p: Vec2) -> Option<&SimplePt> {
        self.aabbs
            .iter()
            .filter(|aabb| aabb.intersect_circle(p, GEOM_EPSILON))
            .map(|aabb| &self.trapezoids[aabb.trapezoid as usize])
            .find(|t| t.is_on_pathing_trapezoid(p))
    }

    /// Navigable position for `pos`, accepting a projection onto the mesh of
    /// at most `tolerance` world units.
    pub fn snap(&self, pos: GamePos, tolerance: f32) -> Option<GamePos> {
        let snapped = self.get_closest_point(pos);
        if snapped.distance(pos) > tolerance || self.find_aabb(snapped).is_none() {
            return None;
        }
        Some(snapped)
    }

    /// `pos` itself when it is navigable, otherwise the nearest point on the
    /// boundary of the nearest trapezoid. Returns `pos` unchanged only when
    /// the map has no trapezoids at all.
    pub fn get_closest_point(&self, pos: GamePos) -> GamePos {
        if self.find_aabb(pos).is_some() {
            return pos;
        }
        let p = pos.vec2();
        let mut best: Option<(f32, Vec2, u32)> = None;
        for t in &self.trapezoids {
            let candidate = t.closest_point(p);
            let dist = candidate.distance_squared(p);
            if best.map_or(true, |(d, _, _)| dist < d) {
                best = Some((dist, candidate, t.layer));
            }
        }
        match best {
            Some((_, v, layer)) => GamePos::with_vec2(v, layer),
            None => {
                warn!("get_closest_point on map {} without trapezoids", self.map_id);
                pos
            }
        }
    }
}
