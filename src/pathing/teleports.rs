use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{info, warn};

use crate::profiling::profile;
use super::astar::{AStar, DEFAULT_SNAP_TOLERANCE};
use super::map_data::TeleportDirection;
use super::math::{GamePos, Vec2};
use super::milepath::{MilePath, PointId, PointVisElement, TeleportPointType};
use super::visibility::LosScratch;

/// One usable direction of a teleporter. Two-way teleporters yield two jumps.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeleportJump {
    /// Index into `MilePath::teleports`.
    pub teleport: u32,
    pub from: GamePos,
    pub to: GamePos,
}

/// Walking distance from where jump `tp1` drops the player to where jump
/// `tp2` picks them up, over the graph without teleports. Infinite when unreachable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TeleportNode {
    pub tp1: u32,
    pub tp2: u32,
    pub distance: f32,
}

/// All-pairs shortest chains over the teleport graph. Entry `[i * n + k]`
/// bounds the walking needed between leaving jump `i` and taking jump `k`,
/// with any number of jumps in between.
pub(crate) fn teleport_closure(jump_count: usize, graph: &[TeleportNode]) -> Vec<f32> {
    let n = jump_count;
    let mut dist = vec![f32::INFINITY; n * n];
    for i in 0..n {
        dist[i * n + i] = 0.0;
    }
    for node in graph {
        let slot = &mut dist[node.tp1 as usize * n + node.tp2 as usize];
        *slot = slot.min(node.distance);
    }
    for k in 0..n {
        for i in 0..n {
            let ik = dist[i * n + k];
            if ik == f32::INFINITY {
                continue;
            }
            for j in 0..n {
                let via = ik + dist[k * n + j];
                if via < dist[i * n + j] {
                    dist[i * n + j] = via;
                }
            }
        }
    }
    dist
}

impl MilePath {
    /// Measure the walk between every ordered pair of jumps. Must run before
    /// teleport points join the visibility graph so the distances are pure
    /// walking.
    #[profile(10)]
    pub(crate) fn generate_teleport_graph(&mut self) {
        let start = Instant::now();
        let mut jumps = Vec::new();
        for (i, tp) in self.teleports.iter().enumerate() {
            let forward = (tp.enter, tp.exit);
            let back = (tp.direction == TeleportDirection::BothWays).then_some((tp.exit, tp.enter));
            for (from, to) in std::iter::once(forward).chain(back) {
                let snapped_from = self.snap(from, DEFAULT_SNAP_TOLERANCE);
                let snapped_to = self.snap(to, DEFAULT_SNAP_TOLERANCE);
                let (Some(from), Some(to)) = (snapped_from, snapped_to) else {
                    warn!(
                        "Teleport {} on map {} is off the pathing mesh ({:?} -> {:?}), skipping",
                        i, self.map_id, from, to
                    );
                    continue;
                };
                jumps.push(TeleportJump { teleport: i as u32, from, to });
            }
        }

        // Searches here must not see any jump yet, so the table is only
        // published once every distance is known.
        let mut graph = Vec::with_capacity(jumps.len() * jumps.len().saturating_sub(1));
        {
            let mut astar = AStar::new(self);
            for (i, tp1) in jumps.iter().enumerate() {
                for (j, tp2) in jumps.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    let distance = match astar.search_points(tp1.to, tp2.from) {
                        Ok(path) => path.cost(),
                        Err(_) => f32::INFINITY,
                    };
                    graph.push(TeleportNode { tp1: i as u32, tp2: j as u32, distance });
                }
            }
        }

        self.teleport_jumps = jumps;
        self.teleport_closure = teleport_closure(self.teleport_jumps.len(), &graph);
        self.teleport_graph = graph;
        info!(
            "Teleport graph: {} jumps, {} connections in {:?}",
            self.teleport_jumps.len(),
            self.teleport_graph.iter().filter(|n| n.distance.is_finite()).count(),
            start.elapsed()
        );
    }

    /// Add an enter and an exit point per jump, joined by a free edge. Jump
    /// endpoints were snapped onto the mesh by `generate_teleport_graph`.
    #[profile]
    pub(crate) fn insert_teleports_into_visibility_graph(&mut self) {
        let mut scratch = LosScratch::new(self.aabbs.len());
        let jumps = self.teleport_jumps.clone();
        for jump in &jumps {
            let (enter, exit) = (jump.from, jump.to);
            let enter_id = self.insert_teleport_point_into_vis_graph(enter, TeleportPointType::Enter, &mut scratch);
            let exit_id = self.insert_teleport_point_into_vis_graph(exit, TeleportPointType::Exit, &mut scratch);
            self.vis_graph[enter_id as usize].push(PointVisElement {
                point_id: exit_id,
                distance: 0.0,
                blocking_ids: SmallVec::new(),
            });
        }
    }

    fn insert_teleport_point_into_vis_graph(
        &mut self,
        pos: GamePos,
        kind: TeleportPointType,
        scratch: &mut LosScratch,
    ) -> PointId {
        let mut point = self.create_point(pos);
        point.id = self.points.len() as PointId;
        point.teleport = Some(kind);

        let range_sq = self.settings.max_visibility_range * self.settings.max_visibility_range;
        let mut outgoing = Vec::new();
        let mut incoming = Vec::new();
        let mut forward = SmallVec::new();
        let mut backward = SmallVec::new();

        for q in &self.points {
            if point.pos.distance_squared(q.pos) > range_sq {
                continue;
            }
            let wants_out = point.allows_outgoing() && q.accepts_incoming();
            let wants_in = point.accepts_incoming() && q.allows_outgoing();
            if !wants_out && !wants_in {
                continue;
            }
            if !self.line_of_sight_both_ways(&point, q, scratch, Some(&mut forward), Some(&mut backward)) {
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

        self.points.push(point);
        self.vis_graph.push(outgoing);
        for (from, edge) in incoming {
            self.vis_graph[from as usize].push(edge);
        }
        point.id
    }

    /// Per-goal table for the teleport heuristic: the least remaining cost
    /// once jump `j` is taken, over any chain of further jumps.
    pub(crate) fn jump_remaining(&self, goal: Vec2) -> Vec<f32> {
        let n = self.teleport_jumps.len();
        (0..n)
            .map(|j| {
                (0..n)
                    .map(|k| self.teleport_closure[j * n + k] + self.teleport_jumps[k].to.vec2().distance(goal))
                    .fold(f32::INFINITY, f32::min)
            })
            .collect()
    }

    /// Lower bound on the cost from `from` to `goal`: the straight line, or
    /// walking to some jump and finishing from there, whichever is smaller.
    pub(crate) fn teleport_lower_bound(&self, from: Vec2, goal: Vec2, remaining: &[f32]) -> f32 {
        self.teleport_jumps
            .iter()
            .zip(remaining)
            .map(|(jump, rest)| from.distance(jump.from.vec2()) + rest)
            .fold(from.distance(goal), f32::min)
    }
}
