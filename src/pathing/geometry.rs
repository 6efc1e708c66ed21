use serde::{Deserialize, Serialize};

use super::map_data::PathingTrapezoid;
use super::math::{closest_point_on_segment, Vec2, GEOM_EPSILON};

/// Maximum gap between two edges that still counts as shared.
pub const EDGE_TOLERANCE: f32 = 1.0;

/// Largest altitude difference between two planes that still allows walking
/// from one onto the other (stairs, ramps).
pub const DEFAULT_MAX_HEIGHT_DIFF: f32 = 200.0;

/// Which edges two trapezoids share, seen from the first one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjacentSide {
    None,
    ABottomBTop,
    ATopBBottom,
    ALeftBRight,
    ARightBLeft,
}

impl AdjacentSide {
    /// The same relation seen from the other trapezoid.
    pub fn mirrored(self) -> Self {
        match self {
            AdjacentSide::None => AdjacentSide::None,
            AdjacentSide::ABottomBTop => AdjacentSide::ATopBBottom,
            AdjacentSide::ATopBBottom => AdjacentSide::ABottomBTop,
            AdjacentSide::ALeftBRight => AdjacentSide::ARightBLeft,
            AdjacentSide::ARightBLeft => AdjacentSide::ALeftBRight,
        }
    }
}

/// A pathing trapezoid with its corners resolved and its plane attached.
///
/// ```text
///  a----d
///   \    \
///    b____c
/// ```
///
/// `a–d` and `b–c` are the horizontal parallel edges, `a–b` and `d–c` the
/// slanted sides. Which of the two horizontal edges is numerically higher
/// depends on the source data, so nothing here assumes an orientation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimplePt {
    pub id: u32,
    pub layer: u32,
    /// Altitude of the plane, compared across layers by `touching_height`.
    pub height: f32,
    pub a: Vec2,
    pub b: Vec2,
    pub c: Vec2,
    pub d: Vec2,
}

fn ranges_overlap(a0: f32, a1: f32, b0: f32, b1: f32) -> bool {
    let lo = a0.min(a1).max(b0.min(b1));
    let hi = a0.max(a1).min(b0.max(b1));
    hi - lo > EDGE_TOLERANCE
}

fn close(p: Vec2, q: Vec2) -> bool {
    (p.x - q.x).abs() < EDGE_TOLERANCE && (p.y - q.y).abs() < EDGE_TOLERANCE
}

impl SimplePt {
    pub fn new(pt: &PathingTrapezoid, id: u32, layer: u32, height: f32) -> Self {
        Self {
            id,
            layer,
            height,
            a: Vec2::new(pt.xtl, pt.yt),
            b: Vec2::new(pt.xbl, pt.yb),
            c: Vec2::new(pt.xbr, pt.yb),
            d: Vec2::new(pt.xtr, pt.yt),
        }
    }

    /// Build directly from corners, mostly for tests and synthetic maps.
    pub fn from_corners(id: u32, layer: u32, a: Vec2, b: Vec2, c: Vec2, d: Vec2) -> Self {
        Self { id, layer, height: 0.0, a, b, c, d }
    }

    pub fn corners(&self) -> [Vec2; 4] {
        [self.a, self.b, self.c, self.d]
    }

    /// Geometric adjacency, ignoring layers.
    pub fn touching(&self, rhs: &SimplePt) -> AdjacentSide {
        if (self.a.y - rhs.b.y).abs() < EDGE_TOLERANCE
            && ranges_overlap(self.a.x, self.d.x, rhs.b.x, rhs.c.x)
        {
            return AdjacentSide::ATopBBottom;
        }
        if (self.b.y - rhs.a.y).abs() < EDGE_TOLERANCE
            && ranges_overlap(self.b.x, self.c.x, rhs.a.x, rhs.d.x)
        {
            return AdjacentSide::ABottomBTop;
        }
        if close(self.a, rhs.d) && close(self.b, rhs.c) {
            return AdjacentSide::ALeftBRight;
        }
        if close(self.d, rhs.a) && close(self.c, rhs.b) {
            return AdjacentSide::ARightBLeft;
        }
        AdjacentSide::None
    }

    /// Like [`SimplePt::touching`], but trapezoids on different planes only
    /// connect when their altitudes are within `max_height_diff`.
    pub fn touching_height(&self, rhs: &SimplePt, max_height_diff: f32) -> AdjacentSide {
        let side = self.touching(rhs);
        if side == AdjacentSide::None || self.layer == rhs.layer {
            return side;
        }
        if (self.height - rhs.height).abs() > max_height_diff {
            return AdjacentSide::None;
        }
        side
    }

    /// Inclusive containment test. Works for either winding and tolerates
    /// degenerate (zero-area) trapezoids.
    pub fn is_on_pathing_trapezoid(&self, p: Vec2) -> bool {
        let corners = self.corners();
        let lo = corners.iter().fold(corners[0], |acc, c| acc.min(*c));
        let hi = corners.iter().fold(corners[0], |acc, c| acc.max(*c));
        if p.x < lo.x - GEOM_EPSILON || p.x > hi.x + GEOM_EPSILON || p.y < lo.y - GEOM_EPSILON || p.y > hi.y + GEOM_EPSILON {
            return false;
        }

        let mut has_pos = false;
        let mut has_neg = false;
        for i in 0..4 {
            let e0 = corners[i];
            let e1 = corners[(i + 1) % 4];
            let edge = e1 - e0;
            let len = edge.length();
            if len == 0.0 {
                continue;
            }
            let side = edge.cross(p - e0) / len;
            if side > GEOM_EPSILON {
                has_pos = true;
            } else if side < -GEOM_EPSILON {
                has_neg = true;
            }
            if has_pos && has_neg {
                return false;
            }
        }
        true
    }

    /// Nearest point on or inside the trapezoid.
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        if self.is_on_pathing_trapezoid(p) {
            return p;
        }
        let corners = self.corners();
        let mut best = corners[0];
        let mut best_dist = f32::INFINITY;
        for i in 0..4 {
            let candidate = closest_point_on_segment(p, corners[i], corners[(i + 1) % 4]);
            let dist = candidate.distance_squared(p);
            if dist < best_dist {
                best_dist = dist;
                best = candidate;
            }
        }
        best
    }
}

/// Axis-aligned bounding box around one trapezoid.
///
/// Intersection tests follow <https://noonat.github.io/intersect/>.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub id: u32,
    pub pos: Vec2,
    pub half: Vec2,
    /// Index of the source trapezoid in `MilePath::trapezoids`.
    pub trapezoid: u32,
}

impl Aabb {
    pub fn new(id: u32, t: &SimplePt) -> Self {
        let corners = t.corners();
        let lo = corners.iter().fold(corners[0], |acc, c| acc.min(*c));
        let hi = corners.iter().fold(corners[0], |acc, c| acc.max(*c));
        Self {
            id,
            pos: (lo + hi) / 2.0,
            half: (hi - lo) / 2.0,
            trapezoid: t.id,
        }
    }

    pub fn min(&self) -> Vec2 {
        self.pos - self.half
    }

    pub fn max(&self) -> Vec2 {
        self.pos + self.half
    }

    /// Point in box.
    pub fn intersect_point(&self, p: Vec2) -> bool {
        let d = (p - self.pos).abs();
        d.x <= self.half.x && d.y <= self.half.y
    }

    /// Circle overlaps box.
    pub fn intersect_circle(&self, p: Vec2, radius: f32) -> bool {
        let nearest = p.max(self.min()).min(self.max());
        nearest.distance_squared(p) <= radius * radius
    }

    /// Segment `a → b` touches the box grown by `padding` (slab test).
    pub fn intersect_segment(&self, a: Vec2, b: Vec2, padding: Vec2) -> bool {
        let delta = b - a;
        let ext = self.half + padding;

        let slab = |origin: f32, center: f32, extent: f32, d: f32| -> Option<(f32, f32)> {
            if d.abs() < f32::EPSILON {
                if (origin - center).abs() > extent {
                    return None;
                }
                return Some((f32::NEG_INFINITY, f32::INFINITY));
            }
            let scale = 1.0 / d;
            let sign = scale.signum();
            let near = (center - sign * extent - origin) * scale;
            let far = (center + sign * extent - origin) * scale;
            Some((near, far))
        };

        let Some((near_x, far_x)) = slab(a.x, self.pos.x, ext.x, delta.x) else {
            return false;
        };
        let Some((near_y, far_y)) = slab(a.y, self.pos.y, ext.y, delta.y) else {
            return false;
        };
        if near_x > far_y || near_y > far_x {
            return false;
        }
        let near = near_x.max(near_y);
        let far = far_x.min(far_y);
        near <= 1.0 && far >= 0.0
    }

    /// Box overlaps box, with both grown by `padding`.
    pub fn intersect_aabb(&self, rhs: &Aabb, padding: Vec2) -> bool {
        let d = (rhs.pos - self.pos).abs();
        d.x <= self.half.x + rhs.half.x + padding.x && d.y <= self.half.y + rhs.half.y + padding.y
    }
}
