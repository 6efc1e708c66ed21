//! Planar vector math for the pathing graph.
//!
//! Game coordinates are plain `f32` world units; the third axis is not a
//! height but the pathing plane (`layer`) a position belongs to.

use serde::{Deserialize, Serialize};

/// Distance under which two positions, or a position and an edge, are
/// considered coincident by the geometric predicates.
pub const GEOM_EPSILON: f32 = 1e-3;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0.0 {
            Self::ZERO
        } else {
            self / len
        }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(self, other: Self) -> f32 {
        self.x * other.y - self.y * other.x
    }

    pub fn min(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y))
    }

    pub fn max(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y))
    }

    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs())
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self { x: self.x + rhs.x, y: self.y + rhs.y }
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self { x: self.x - rhs.x, y: self.y - rhs.y }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self::Output {
        Self { x: self.x * rhs, y: self.y * rhs }
    }
}

impl std::ops::Div<f32> for Vec2 {
    type Output = Self;
    fn div(self, rhs: f32) -> Self::Output {
        Self { x: self.x / rhs, y: self.y / rhs }
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self::Output {
        Self { x: -self.x, y: -self.y }
    }
}

/// A world position: planar coordinates plus the pathing plane it sits on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GamePos {
    pub x: f32,
    pub y: f32,
    pub layer: u32,
}

impl GamePos {
    pub const fn new(x: f32, y: f32, layer: u32) -> Self {
        Self { x, y, layer }
    }

    pub fn vec2(self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn distance(self, other: Self) -> f32 {
        self.vec2().distance(other.vec2())
    }

    pub fn with_vec2(v: Vec2, layer: u32) -> Self {
        Self::new(v.x, v.y, layer)
    }
}

impl From<Vec2> for GamePos {
    fn from(v: Vec2) -> Self {
        Self::with_vec2(v, 0)
    }
}

/// Closest point to `p` on the segment `a`–`b`.
pub fn closest_point_on_segment(p: Vec2, a: Vec2, b: Vec2) -> Vec2 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq == 0.0 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Signed distance of `p` from the infinite line through `a` and `b`.
/// Positive on the left of `a → b`. Falls back to the plain distance to `a`
/// when the line is degenerate.
fn signed_distance(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    let ab = b - a;
    let len = ab.length();
    if len == 0.0 {
        return p.distance(a);
    }
    ab.cross(p - a) / len
}

fn within_extent(a: Vec2, b: Vec2, p: Vec2) -> bool {
    closest_point_on_segment(p, a, b).distance_squared(p) <= GEOM_EPSILON * GEOM_EPSILON
}

/// Inclusive segment intersection: touching endpoints and collinear overlap
/// both count.
pub fn segments_intersect(p1: Vec2, p2: Vec2, q1: Vec2, q2: Vec2) -> bool {
    let d1 = signed_distance(q1, q2, p1);
    let d2 = signed_distance(q1, q2, p2);
    let d3 = signed_distance(p1, p2, q1);
    let d4 = signed_distance(p1, p2, q2);

    let straddles = |u: f32, v: f32| (u > GEOM_EPSILON && v < -GEOM_EPSILON) || (u < -GEOM_EPSILON && v > GEOM_EPSILON);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    (d1.abs() <= GEOM_EPSILON && within_extent(q1, q2, p1))
        || (d2.abs() <= GEOM_EPSILON && within_extent(q1, q2, p2))
        || (d3.abs() <= GEOM_EPSILON && within_extent(p1, p2, q1))
        || (d4.abs() <= GEOM_EPSILON && within_extent(p1, p2, q2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closest_point_clamps_to_segment() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert_eq!(closest_point_on_segment(Vec2::new(5.0, 3.0), a, b), Vec2::new(5.0, 0.0));
        assert_eq!(closest_point_on_segment(Vec2::new(-4.0, 1.0), a, b), a);
        assert_eq!(closest_point_on_segment(Vec2::new(14.0, -1.0), a, b), b);
    }

    #[test]
    fn test_segments_intersect_crossing_and_touching() {
        let o = Vec2::new(0.0, 0.0);
        assert!(segments_intersect(o, Vec2::new(10.0, 10.0), Vec2::new(0.0, 10.0), Vec2::new(10.0, 0.0)));
        // Touching at an endpoint counts.
        assert!(segments_intersect(o, Vec2::new(5.0, 5.0), Vec2::new(5.0, 5.0), Vec2::new(9.0, 0.0)));
        // Parallel, apart.
        assert!(!segments_intersect(o, Vec2::new(10.0, 0.0), Vec2::new(0.0, 1.0), Vec2::new(10.0, 1.0)));
        // Collinear but disjoint.
        assert!(!segments_intersect(o, Vec2::new(4.0, 0.0), Vec2::new(5.0, 0.0), Vec2::new(9.0, 0.0)));
        // Collinear overlap.
        assert!(segments_intersect(o, Vec2::new(6.0, 0.0), Vec2::new(5.0, 0.0), Vec2::new(9.0, 0.0)));
    }
}
