//! Frustum-vs-OBB Separating-Axis Test
//!
//! The culling primitive: a world AABB is re-expressed as an OBB in the
//! camera's frame and tested against the view frustum over the classical
//! 26 candidate axes — the frustum's forward axis, its four side-plane
//! normals, the OBB's three axes, the right/up frustum edges crossed with
//! each OBB axis, and the four oblique frustum edges crossed with each OBB
//! axis. Any separating axis proves the box invisible.
//!
//! The test works in a +Z-forward camera frame; view-space points from the
//! right-handed −Z-forward convention are flipped on entry.

use glam::{Mat4, Vec3};

use crate::ecs::Camera;
use crate::math::{Aabb, Obb};

/// Frustum parameters for the separating-axis test: near/far distances and
/// the near-plane half-extents.
#[derive(Debug, Clone, Copy)]
pub struct FrustumTest {
    z_near: f32,
    z_far: f32,
    x_near: f32,
    y_near: f32,
}

impl FrustumTest {
    #[must_use]
    pub fn from_camera(camera: &Camera) -> Self {
        let tan_half_fov = (0.5 * camera.fov_y).tan();
        Self {
            z_near: camera.near,
            z_far: camera.far,
            x_near: camera.aspect * camera.near * tan_half_fov,
            y_near: camera.near * tan_half_fov,
        }
    }

    /// Tests an OBB already expressed in the +Z-forward camera frame.
    #[must_use]
    pub fn test_obb(&self, obb: &Obb) -> bool {
        // Frustum forward axis: the general projection reduces to a pure
        // depth-interval check.
        {
            let mut radius = 0.0;
            for i in 0..3 {
                radius += obb.axes[i].z.abs() * obb.half_extents[i];
            }
            let obb_min = obb.center.z - radius;
            let obb_max = obb.center.z + radius;
            if obb_min > self.z_far || obb_max < self.z_near {
                return false;
            }
        }

        // Side-plane normals
        let side_normals = [
            Vec3::new(self.z_near, 0.0, self.x_near),
            Vec3::new(-self.z_near, 0.0, self.x_near),
            Vec3::new(0.0, -self.z_near, self.y_near),
            Vec3::new(0.0, self.z_near, self.y_near),
        ];
        for axis in side_normals {
            if self.axis_separates(axis, obb) {
                return false;
            }
        }

        // OBB axes
        for axis in obb.axes {
            if self.axis_separates(axis, obb) {
                return false;
            }
        }

        // Frustum right edge (X) crossed with each OBB axis
        for a in obb.axes {
            if self.axis_separates(Vec3::new(0.0, -a.z, a.y), obb) {
                return false;
            }
        }

        // Frustum up edge (Y) crossed with each OBB axis
        for a in obb.axes {
            if self.axis_separates(Vec3::new(a.z, 0.0, -a.x), obb) {
                return false;
            }
        }

        // Oblique frustum edges crossed with each OBB axis
        let edges = [
            Vec3::new(-self.x_near, 0.0, self.z_near),
            Vec3::new(self.x_near, 0.0, self.z_near),
            Vec3::new(0.0, self.y_near, self.z_near),
            Vec3::new(0.0, -self.y_near, self.z_near),
        ];
        for a in obb.axes {
            for edge in edges {
                let axis = edge.cross(a);
                const EPSILON: f32 = 1e-4;
                if axis.x.abs() < EPSILON && axis.y.abs() < EPSILON && axis.z.abs() < EPSILON {
                    continue;
                }
                if self.axis_separates(axis, obb) {
                    return false;
                }
            }
        }

        true
    }

    /// Projects the OBB and the frustum onto `axis` and reports whether the
    /// intervals are disjoint. The frustum interval is the near-plane
    /// projection `z_near·mz ∓ p` with the outward-growing endpoint scaled
    /// by `z_far / z_near`.
    fn axis_separates(&self, axis: Vec3, obb: &Obb) -> bool {
        let mo_x = axis.x.abs();
        let mo_y = axis.y.abs();
        let mo_z = axis.z;
        let mo_c = axis.dot(obb.center);

        let mut obb_radius = 0.0;
        for i in 0..3 {
            obb_radius += axis.dot(obb.axes[i]).abs() * obb.half_extents[i];
        }
        let obb_min = mo_c - obb_radius;
        let obb_max = mo_c + obb_radius;

        let p = self.x_near * mo_x + self.y_near * mo_y;
        let mut tau0 = self.z_near * mo_z - p;
        let mut tau1 = self.z_near * mo_z + p;
        if tau0 < 0.0 {
            tau0 *= self.z_far / self.z_near;
        }
        if tau1 > 0.0 {
            tau1 *= self.z_far / self.z_near;
        }

        obb_min > tau1 || obb_max < tau0
    }
}

/// Builds the camera-frame OBB of a world AABB.
///
/// Four adjacent corners are transformed into view space and re-derive the
/// box's basis there; the −Z-forward view frame is flipped to the
/// +Z-forward frame the axis test expects.
#[must_use]
pub fn obb_in_camera_frame(view: &Mat4, aabb: &Aabb) -> Obb {
    let corners = [
        Vec3::new(aabb.min.x, aabb.min.y, aabb.min.z),
        Vec3::new(aabb.max.x, aabb.min.y, aabb.min.z),
        Vec3::new(aabb.min.x, aabb.max.y, aabb.min.z),
        Vec3::new(aabb.min.x, aabb.min.y, aabb.max.z),
    ];

    let flip = Vec3::new(1.0, 1.0, -1.0);
    let c0 = view.transform_point3(corners[0]) * flip;
    let c1 = view.transform_point3(corners[1]) * flip;
    let c2 = view.transform_point3(corners[2]) * flip;
    let c3 = view.transform_point3(corners[3]) * flip;

    let mut axes = [c1 - c0, c2 - c0, c3 - c0];
    let center = c0 + (axes[0] + axes[1] + axes[2]) * 0.5;
    let mut lengths = Vec3::new(axes[0].length(), axes[1].length(), axes[2].length());

    // Degenerate (flat) boxes keep a valid basis
    for i in 0..3 {
        if lengths[i] > 1e-12 {
            axes[i] /= lengths[i];
        } else {
            axes[i] = Vec3::ZERO;
            lengths[i] = 0.0;
        }
    }

    Obb {
        center,
        half_extents: lengths * 0.5,
        axes,
    }
}

/// The culling entry point: true when the world AABB intersects the
/// camera's frustum.
#[must_use]
pub fn sat_visibility_test(camera: &Camera, aabb: &Aabb) -> bool {
    if !aabb.is_finite() {
        return true;
    }
    let frustum = FrustumTest::from_camera(camera);
    let obb = obb_in_camera_frame(&camera.view, aabb);
    frustum.test_obb(&obb)
}
