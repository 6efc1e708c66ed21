use fixedbitset::FixedBitSet;
use smallvec::SmallVec;
use std::time::Instant;
use tracing::info;

use crate::profile_log;
use crate::profiling::profile;
use super::math::Vec2;
use super::milepath::{BoxId, MilePath, Point, PointVisElement};

const NO_BOX: BoxId = BoxId::MAX;

/// Reusable buffers for [`MilePath::has_line_of_sight`]. Sized for one
/// graph; `reset` grows them when handed a bigger one.
#[derive(Default)]
pub struct LosScratch {
    pub open: Vec<BoxId>,
    pub visited: FixedBitSet,
    /// Box we came from when entering each visited box; seeds point to
    /// themselves.
    pub came_from: Vec<BoxId>,
    reached: Option<BoxId>,
}

impl LosScratch {
    pub fn new(box_count: usize) -> Self {
        Self {
            open: Vec::with_capacity(64),
            visited: FixedBitSet::with_capacity(box_count),
            came_from: vec![NO_BOX; box_count],
            reached: None,
        }
    }

    fn reset(&mut self, box_count: usize) {
        self.open.clear();
        self.visited.clear();
        self.visited.grow(box_count);
        if self.came_from.len() < box_count {
            self.came_from.resize(box_count, NO_BOX);
        }
        self.reached = None;
    }

    /// Boxes of the last successful corridor, from the goal back to the seed.
    fn corridor(&self) -> impl Iterator<Item = BoxId> + '_ {
        let mut current = self.reached;
        std::iter::from_fn(move || {
            let box_id = current?;
            let parent = self.came_from[box_id as usize];
            current = (parent != box_id).then_some(parent);
            Some(box_id)
        })
    }
}

impl MilePath {
    /// Whether the straight segment from `start` to `goal` can be walked.
    ///
    /// Floods the box graph from the start point's boxes, entering a
    /// neighbor only when the segment crosses the portal leading into it,
    /// and succeeds once one of the goal point's boxes is entered. Since
    /// every trapezoid is convex, the crossed boxes cover the whole segment.
    ///
    /// `blocking_ids`, when given, is cleared and receives the layers of the
    /// boxes the segment walks across, except `start`'s own layer.
    pub fn has_line_of_sight(
        &self,
        start: &Point,
        goal: &Point,
        scratch: &mut LosScratch,
        blocking_ids: Option<&mut SmallVec<[u32; 2]>>,
    ) -> bool {
        self.line_of_sight_both_ways(start, goal, scratch, blocking_ids, None)
    }

    /// [`MilePath::has_line_of_sight`] that also fills `backward` with the
    /// blocking ids of the reverse walk, from `goal` to `start`.
    pub(crate) fn line_of_sight_both_ways(
        &self,
        start: &Point,
        goal: &Point,
        scratch: &mut LosScratch,
        forward: Option<&mut SmallVec<[u32; 2]>>,
        backward: Option<&mut SmallVec<[u32; 2]>>,
    ) -> bool {
        let mut forward = forward;
        let mut backward = backward;
        if let Some(ids) = &mut forward {
            ids.clear();
        }
        if let Some(ids) = &mut backward {
            ids.clear();
        }

        if start.box_id.is_none() || goal.box_id.is_none() {
            return false;
        }
        // Trapezoids are convex, so a shared box is a clear walk.
        let shared = start.boxes().find(|b| goal.boxes().any(|g| g == *b));
        if shared.is_none() && !self.flood_corridor(start, goal, scratch) {
            return false;
        }
        if forward.is_none() && backward.is_none() {
            return true;
        }

        let mut layers: SmallVec<[u32; 4]> = SmallVec::new();
        match shared {
            Some(box_id) => layers.push(self.layer_of_box(box_id)),
            None => {
                for box_id in scratch.corridor() {
                    let layer = self.layer_of_box(box_id);
                    if !layers.contains(&layer) {
                        layers.push(layer);
                    }
                }
            }
        }
        layers.sort_unstable();

        if let Some(ids) = forward {
            ids.extend(layers.iter().copied().filter(|&l| l != start.layer));
        }
        if let Some(ids) = backward {
            ids.extend(layers.iter().copied().filter(|&l| l != goal.layer));
        }
        true
    }

    fn flood_corridor(&self, start: &Point, goal: &Point, scratch: &mut LosScratch) -> bool {
        scratch.reset(self.aabbs.len());
        let (a, b) = (start.pos, goal.pos);
        let padding = Vec2::ZERO;

        for seed in start.boxes() {
            if !scratch.visited.put(seed as usize) {
                scratch.came_from[seed as usize] = seed;
                scratch.open.push(seed);
            }
        }

        while let Some(current) = scratch.open.pop() {
            for link in &self.aabb_graph[current as usize] {
                let next = link.neighbor;
                if scratch.visited.contains(next as usize) {
                    continue;
                }
                if !self.aabbs[next as usize].intersect_segment(a, b, padding) {
                    continue;
                }
                if !self.portals[link.portal as usize].intersect(a, b) {
                    continue;
                }
                scratch.visited.insert(next as usize);
                scratch.came_from[next as usize] = current;
                if goal.boxes().any(|g| g == next) {
                    scratch.reached = Some(next);
                    return true;
                }
                scratch.open.push(next);
            }
        }
        false
    }

    /// Connect every pair of points within range that can see each other.
    #[profile(10)]
    pub(crate) fn generate_visibility_graph(&mut self) {
        let start = Instant::now();
        let range_sq = self.settings.max_visibility_range * self.settings.max_visibility_range;
        let mut vis_graph: Vec<Vec<PointVisElement>> = vec![Vec::new(); self.points.len()];
        let mut scratch = LosScratch::new(self.aabbs.len());
        let mut forward = SmallVec::new();
        let mut backward = SmallVec::new();
        let mut checks: u64 = 0;

        for (i, p) in self.points.iter().enumerate() {
            for q in &self.points[i + 1..] {
                if p.pos.distance_squared(q.pos) > range_sq {
                    continue;
                }
                checks += 1;
                profile_log!(checks, "visibility graph: {} line of sight checks", checks);
                if !self.line_of_sight_both_ways(p, q, &mut scratch, Some(&mut forward), Some(&mut backward)) {
                    continue;
                }
                let distance = p.pos.distance(q.pos);
                vis_graph[i].push(PointVisElement {
                    point_id: q.id,
                    distance,
                    blocking_ids: forward.clone(),
                });
                vis_graph[q.id as usize].push(PointVisElement {
                    point_id: p.id,
                    distance,
                    blocking_ids: backward.clone(),
                });
            }
        }

        self.vis_graph = vis_graph;
        info!(
            "Visibility graph: {} points, {} edges from {} line of sight checks in {:?}",
            self.points.len(),
            self.edge_count(),
            checks,
            start.elapsed()
        );
    }
}
