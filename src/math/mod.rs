//! Bounds Math
//!
//! Axis-aligned and oriented bounding boxes, plus the frustum-vs-OBB
//! separating-axis test used by culling.

pub mod frustum;

use glam::{Mat4, Vec3};

pub use frustum::{FrustumTest, sat_visibility_test};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// The inverted-infinite box; unioning anything into it yields that
    /// thing's bounds.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }

    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn from_points(points: &[Vec3]) -> Self {
        let mut aabb = Self::empty();
        for p in points {
            aabb.min = aabb.min.min(*p);
            aabb.max = aabb.max.max(*p);
        }
        aabb
    }

    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[must_use]
    pub fn half_extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    pub fn union_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn union(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// World-space bounds of this box under an affine transform, from the
    /// eight transformed corners.
    #[must_use]
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        let mut out = Aabb::empty();
        for corner in self.corners() {
            out.union_point(matrix.transform_point3(corner));
        }
        out
    }

    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let (mn, mx) = (self.min, self.max);
        [
            Vec3::new(mn.x, mn.y, mn.z),
            Vec3::new(mx.x, mn.y, mn.z),
            Vec3::new(mn.x, mx.y, mn.z),
            Vec3::new(mx.x, mx.y, mn.z),
            Vec3::new(mn.x, mn.y, mx.z),
            Vec3::new(mx.x, mn.y, mx.z),
            Vec3::new(mn.x, mx.y, mx.z),
            Vec3::new(mx.x, mx.y, mx.z),
        ]
    }

    #[must_use]
    pub fn contains_point(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

/// Oriented bounding box with an orthonormal basis. Built per cull query
/// from a world AABB expressed in the camera's frame.
#[derive(Debug, Clone, Copy)]
pub struct Obb {
    pub center: Vec3,
    pub half_extents: Vec3,
    pub axes: [Vec3; 3],
}
