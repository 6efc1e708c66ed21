use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::{debug, warn};

use crate::profile_log;
use super::error::Error;
use super::map_data::PositionSource;
use super::math::{closest_point_on_segment, GamePos, Vec2};
use super::milepath::{MilePath, Point, PointId, PointVisElement};
use super::visibility::LosScratch;

/// How far off the mesh a start or goal may lie and still be pulled onto it.
pub const DEFAULT_SNAP_TOLERANCE: f32 = 100.0;

const NO_POINT: PointId = PointId::MAX;

/// Search result: waypoints from start to goal and the total walking cost.
///
/// Built back to front with [`Path::insert_point`], then [`Path::finalize`]
/// puts it in start → goal order and locks it.
#[derive(Clone, Debug, Default)]
pub struct Path {
    points: Vec<Point>,
    cost: f32,
    finalized: bool,
}

impl Path {
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn waypoints(&self) -> impl Iterator<Item = GamePos> + '_ {
        self.points.iter().map(GamePos::from)
    }

    pub fn cost(&self) -> f32 {
        self.cost
    }

    pub fn ready(&self) -> bool {
        self.finalized
    }

    pub fn clear(&mut self) {
        self.finalized = false;
        self.cost = 0.0;
        self.points.clear();
    }

    pub fn insert_point(&mut self, point: Point) {
        if self.finalized {
            warn!("insert_point on a finalized path ignored");
            return;
        }
        self.points.push(point);
    }

    pub fn set_cost(&mut self, cost: f32) {
        self.cost = cost;
    }

    pub fn finalize(&mut self) {
        if !self.finalized {
            self.points.reverse();
        }
        self.finalized = true;
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
struct State {
    /// g + h
    cost: f32,
    g: f32,
    point: PointId,
}

impl Eq for State {}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost, ties broken towards the larger g (closer to goal).
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| self.g.total_cmp(&other.g))
            .then_with(|| self.point.cmp(&other.point))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* over a finished [`MilePath`].
///
/// Start and goal are added as temporary points to a per-search overlay of
/// the visibility graph; the `MilePath` itself is only ever read.
pub struct AStar<'a> {
    mp: &'a MilePath,
    pub path: Path,
    snap_tolerance: f32,
    blocked_layers: SmallVec<[u32; 4]>,

    // Overlay: ad hoc points take ids from `mp.points.len()` upwards.
    adhoc: Vec<Point>,
    adhoc_edges: Vec<Vec<PointVisElement>>,
    incoming: FxHashMap<PointId, SmallVec<[PointVisElement; 2]>>,
    scratch: LosScratch,
    jump_remaining: Vec<f32>,
}

impl<'a> AStar<'a> {
    pub fn new(mp: &'a MilePath) -> Self {
        Self {
            mp,
            path: Path::default(),
            snap_tolerance: DEFAULT_SNAP_TOLERANCE,
            blocked_layers: SmallVec::new(),
            adhoc: Vec::new(),
            adhoc_edges: Vec::new(),
            incoming: FxHashMap::default(),
            scratch: LosScratch::new(mp.aabbs.len()),
            jump_remaining: Vec::new(),
        }
    }

    pub fn with_snap_tolerance(mut self, tolerance: f32) -> Self {
        self.snap_tolerance = tolerance;
        self
    }

    /// Layers that may not be entered (closed gates and the like). Edges
    /// whose blocking ids mention one of them are skipped.
    pub fn set_blocked_layers(&mut self, layers: impl IntoIterator<Item = u32>) {
        self.blocked_layers = layers.into_iter().collect();
    }

    pub fn search(&mut self, start_pos: GamePos, goal_pos: GamePos) -> Result<&Path, Error> {
        if !self.mp.ready() {
            return Err(Error::InvalidMapContext);
        }
        if self.mp.trapezoids.is_empty() {
            return Err(Error::FailedToGetPathingMapBlock);
        }
        self.search_points(start_pos, goal_pos)
    }

    /// Search from wherever the host says the player stands.
    pub fn search_from_player(&mut self, player: &dyn PositionSource, goal_pos: GamePos) -> Result<&Path, Error> {
        let start_pos = player.player_position().ok_or(Error::FailedToFindStartBox)?;
        self.search(start_pos, goal_pos)
    }

    /// The search itself, without the readiness checks. Used while the graph
    /// is still being built.
    pub(crate) fn search_points(&mut self, start_pos: GamePos, goal_pos: GamePos) -> Result<&Path, Error> {
        self.path.clear();
        self.reset_overlay();

        let mut start = self.resolve(start_pos).ok_or(Error::FailedToFindStartBox)?;
        let mut goal = self.resolve(goal_pos).ok_or(Error::FailedToFindGoalBox)?;

        self.jump_remaining = self.mp.jump_remaining(goal.pos);

        // Trapezoids are convex, so a shared box means a straight walk. It is
        // optimal unless a chain of jumps could undercut it.
        let straight = start.pos.distance(goal.pos);
        if start.shares_box(&goal) && self.teleporter_heuristic(&start, &goal) >= straight {
            let base = self.mp.points.len() as PointId;
            start.id = base;
            goal.id = base + 1;
            self.path.insert_point(goal);
            self.path.insert_point(start);
            self.path.set_cost(straight);
            self.path.finalize();
            return Ok(&self.path);
        }

        self.insert_point_into_vis_graph(&mut start);
        self.insert_point_into_vis_graph(&mut goal);

        let total = self.mp.points.len() + self.adhoc.len();
        let mut g_score = vec![f32::INFINITY; total];
        let mut came_from = vec![NO_POINT; total];
        let mut open = BinaryHeap::new();

        g_score[start.id as usize] = 0.0;
        open.push(State {
            cost: self.teleporter_heuristic(&start, &goal),
            g: 0.0,
            point: start.id,
        });

        let mut iterations: usize = 0;
        while let Some(State { g, point: current, .. }) = open.pop() {
            if g > g_score[current as usize] {
                continue;
            }
            iterations += 1;
            profile_log!(iterations, "A* on map {}: {} expansions, {} open", self.mp.map_id, iterations, open.len());

            if current == goal.id {
                debug!("A* reached goal after {} expansions", iterations);
                let cost = g_score[current as usize];
                self.build_path(&start, &goal, &came_from)?;
                self.path.set_cost(cost);
                return Ok(&self.path);
            }

            let (base, extra) = self.edges(current);
            for edge in base.iter().chain(extra) {
                if self.is_blocked(edge) {
                    continue;
                }
                let tentative = g + edge.distance;
                let next = edge.point_id as usize;
                if tentative < g_score[next] {
                    g_score[next] = tentative;
                    came_from[next] = current;
                    let h = self.teleporter_heuristic(&self.point(edge.point_id), &goal);
                    open.push(State { cost: tentative + h, g: tentative, point: edge.point_id });
                }
            }
        }

        debug!("A* exhausted the open set after {} expansions", iterations);
        Err(Error::FailedToFinializePath)
    }

    /// Walk `came_from` back from the goal. Leaves the path finalized.
    pub fn build_path(&mut self, start: &Point, goal: &Point, came_from: &[PointId]) -> Result<(), Error> {
        self.path.clear();
        let mut current = goal.id;
        let mut steps = 0usize;
        loop {
            self.path.insert_point(self.point(current));
            if current == start.id {
                break;
            }
            steps += 1;
            if steps > came_from.len() {
                warn!("Path reconstruction on map {} exceeded {} steps", self.mp.map_id, came_from.len());
                return Err(Error::BuildPathLengthExceeded);
            }
            current = match came_from.get(current as usize) {
                Some(&prev) if prev != NO_POINT => prev,
                _ => return Err(Error::FailedToFinializePath),
            };
        }
        self.path.finalize();
        Ok(())
    }

    /// Add `point` to the overlay, connected to everything it can see.
    /// Assigns the point's id.
    pub fn insert_point_into_vis_graph(&mut self, point: &mut Point) {
        let mp = self.mp;
        point.id = (mp.points.len() + self.adhoc.len()) as PointId;

        let range_sq = mp.settings.max_visibility_range * mp.settings.max_visibility_range;
        let mut outgoing = Vec::new();
        let mut forward = SmallVec::new();
        let mut backward = SmallVec::new();
        let mut incoming: Vec<(PointId, PointVisElement)> = Vec::new();

        for q in mp.points.iter().chain(self.adhoc.iter()) {
            if point.pos.distance_squared(q.pos) > range_sq {
                continue;
            }
            let wants_out = point.allows_outgoing() && q.accepts_incoming();
            let wants_in = point.accepts_incoming() && q.allows_outgoing();
            if !wants_out && !wants_in {
                continue;
            }
            if !mp.line_of_sight_both_ways(point, q, &mut self.scratch, Some(&mut forward), Some(&mut backward)) {
                continue;
            }
            let distance = point.pos.distance(q.pos);
            if wants_out {
                outgoing.push(PointVisElement { point_id: q.id, distance, blocking_ids: forward.clone() });
            }
            if wants_in {
                incoming.push((q.id, PointVisElement { point_id: point.id, distance, blocking_ids: backward.clone() }));
            }
        }

        let base = mp.points.len() as PointId;
        for (from, edge) in incoming {
            if from >= base {
                self.adhoc_edges[(from - base) as usize].push(edge);
            } else {
                self.incoming.entry(from).or_default().push(edge);
            }
        }
        self.adhoc.push(*point);
        self.adhoc_edges.push(outgoing);
    }

    /// Admissible estimate of the remaining cost: the straight line, unless
    /// some chain of teleports could beat it. Needs `jump_remaining` to be
    /// prepared for `goal`.
    fn teleporter_heuristic(&self, start: &Point, goal: &Point) -> f32 {
        if self.jump_remaining.is_empty() {
            return start.pos.distance(goal.pos);
        }
        self.mp.teleport_lower_bound(start.pos, goal.pos, &self.jump_remaining)
    }

    /// Standalone heuristic value for a position pair.
    pub fn estimate_remaining(&self, from: GamePos, goal: GamePos) -> f32 {
        let remaining = self.mp.jump_remaining(goal.vec2());
        self.mp.teleport_lower_bound(from.vec2(), goal.vec2(), &remaining)
    }

    /// Closest point on the last found path to `pos`.
    pub fn get_closest_point(&self, pos: Vec2) -> Option<GamePos> {
        Self::closest_point_on_path(&self.path, pos)
    }

    pub fn closest_point_on_path(path: &Path, pos: Vec2) -> Option<GamePos> {
        let points = path.points();
        let first = points.first()?;
        if points.len() == 1 {
            return Some(GamePos::from(first));
        }
        points
            .windows(2)
            .map(|w| {
                let c = closest_point_on_segment(pos, w[0].pos, w[1].pos);
                let layer = if c.distance_squared(w[0].pos) <= c.distance_squared(w[1].pos) {
                    w[0].layer
                } else {
                    w[1].layer
                };
                (c.distance_squared(pos), GamePos::with_vec2(c, layer))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, p)| p)
    }

    fn resolve(&self, pos: GamePos) -> Option<Point> {
        let snapped = self.mp.snap(pos, self.snap_tolerance)?;
        let point = self.mp.create_point(snapped);
        point.box_id.map(|_| point)
    }

    fn reset_overlay(&mut self) {
        self.adhoc.clear();
        self.adhoc_edges.clear();
        self.incoming.clear();
        self.jump_remaining.clear();
    }

    fn point(&self, id: PointId) -> Point {
        let base = self.mp.points.len();
        if (id as usize) < base {
            self.mp.points[id as usize]
        } else {
            self.adhoc[id as usize - base]
        }
    }

    fn edges(&self, id: PointId) -> (&[PointVisElement], &[PointVisElement]) {
        let base = self.mp.points.len();
        if (id as usize) < base {
            let extra = self.incoming.get(&id).map(|e| e.as_slice()).unwrap_or(&[]);
            (self.mp.vis_graph[id as usize].as_slice(), extra)
        } else {
            (self.adhoc_edges[id as usize - base].as_slice(), &[][..])
        }
    }

    fn is_blocked(&self, edge: &PointVisElement) -> bool {
        !self.blocked_layers.is_empty() && edge.blocking_ids.iter().any(|id| self.blocked_layers.contains(id))
    }
}
