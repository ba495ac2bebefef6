//! Shadow Projection Matrices
//!
//! Directional lights use parallel-split cascades: the view frustum is
//! partitioned by a log/uniform blend, each slice's world corners are
//! wrapped in a bounding sphere (so the ortho extent is rotation-stable),
//! and the resulting frustum is snapped to texel centers to stop edge
//! shimmer. Point lights get six 90° faces, spots a single perspective.

use glam::{Mat4, Vec3};

use crate::MAX_SHADOW_CASCADES;
use crate::ecs::Camera;

/// Cascade far distances (view space) under the practical split scheme.
///
/// `lambda` blends uniform (0.0) and logarithmic (1.0) partitioning; the
/// last split is pinned to `far`.
#[must_use]
pub fn compute_cascade_splits(
    cascade_count: u32,
    near: f32,
    far: f32,
    lambda: f32,
) -> [f32; MAX_SHADOW_CASCADES as usize] {
    let mut splits = [0.0f32; MAX_SHADOW_CASCADES as usize];
    let n = cascade_count.clamp(1, MAX_SHADOW_CASCADES) as usize;

    for (i, split) in splits.iter_mut().enumerate().take(n) {
        let p = (i + 1) as f32 / n as f32;
        let log_split = near * (far / near).powf(p);
        let uniform_split = near + (far - near) * p;
        *split = lambda * log_split + (1.0 - lambda) * uniform_split;
    }
    splits[n - 1] = far;
    splits
}

/// The eight world-space corners of a view-frustum slice.
#[must_use]
pub fn frustum_slice_corners_world(camera: &Camera, slice_near: f32, slice_far: f32) -> [Vec3; 8] {
    let tan_half_fov = (0.5 * camera.fov_y).tan();

    let h_near = tan_half_fov * slice_near;
    let w_near = h_near * camera.aspect;
    let h_far = tan_half_fov * slice_far;
    let w_far = h_far * camera.aspect;

    // View space, right-handed: forward is -Z
    let corners_view = [
        Vec3::new(-w_near, -h_near, -slice_near),
        Vec3::new(w_near, -h_near, -slice_near),
        Vec3::new(w_near, h_near, -slice_near),
        Vec3::new(-w_near, h_near, -slice_near),
        Vec3::new(-w_far, -h_far, -slice_far),
        Vec3::new(w_far, -h_far, -slice_far),
        Vec3::new(w_far, h_far, -slice_far),
        Vec3::new(-w_far, h_far, -slice_far),
    ];

    let inv_view = camera.view.inverse();
    let mut corners_world = [Vec3::ZERO; 8];
    for (world, view) in corners_world.iter_mut().zip(corners_view) {
        *world = inv_view.transform_point3(view);
    }
    corners_world
}

fn stable_up(direction: Vec3) -> Vec3 {
    if direction.y.abs() > 0.99 {
        Vec3::X
    } else {
        Vec3::Y
    }
}

/// Orthographic view-projection for one directional cascade.
///
/// The slice corners are wrapped in their bounding sphere; the ortho box
/// is the sphere's square, so the extent does not change as the camera
/// rotates. The sphere center is then snapped to the texel grid of the
/// cascade's shadow map.
#[must_use]
pub fn build_cascade_view_projection(
    light_direction: Vec3,
    frustum_corners: &[Vec3; 8],
    shadow_map_resolution: u32,
    caster_extension: f32,
) -> Mat4 {
    let direction = if light_direction.length_squared() > 1e-6 {
        light_direction.normalize()
    } else {
        -Vec3::Y
    };

    // Sphere fit
    let mut center = Vec3::ZERO;
    for c in frustum_corners {
        center += *c;
    }
    center /= 8.0;
    let mut radius = 0.0f32;
    for c in frustum_corners {
        radius = radius.max(center.distance(*c));
    }
    // Keep the radius texel-stable across slightly different slices
    radius = (radius * 16.0).ceil() / 16.0;

    // Texel snap: quantize the center in light space
    let up = stable_up(direction);
    let texels = shadow_map_resolution.max(1) as f32;
    let units_per_texel = (radius * 2.0) / texels;
    let snap_view = Mat4::look_at_rh(Vec3::ZERO, direction, up);
    let mut center_ls = snap_view.transform_point3(center);
    center_ls.x = (center_ls.x / units_per_texel).floor() * units_per_texel;
    center_ls.y = (center_ls.y / units_per_texel).floor() * units_per_texel;
    let center = snap_view.inverse().transform_point3(center_ls);

    let eye = center - direction * (radius + caster_extension);
    let light_view = Mat4::look_at_rh(eye, center, up);
    let near = 0.0;
    let far = caster_extension + 2.0 * radius;
    let projection = Mat4::orthographic_rh(-radius, radius, -radius, radius, near, far);

    projection * light_view
}

/// Perspective view-projection for a spot light.
#[must_use]
pub fn build_spot_view_projection(
    position: Vec3,
    direction: Vec3,
    outer_cone: f32,
    range: f32,
) -> Mat4 {
    let direction = if direction.length_squared() > 1e-6 {
        direction.normalize()
    } else {
        -Vec3::Y
    };
    let fov = (outer_cone * 2.0).clamp(0.1, std::f32::consts::PI - 0.01);
    let far = range.max(1.0);
    let view = Mat4::look_at_rh(position, position + direction, stable_up(direction));
    let projection = Mat4::perspective_rh(fov, 1.0, 0.1, far);
    projection * view
}

/// Six face view-projections for a point light, ±X/±Y/±Z order.
#[must_use]
pub fn point_light_face_matrices(position: Vec3, range: f32) -> [Mat4; 6] {
    const DIRECTIONS: [(Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y),
        (Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::Z),
        (Vec3::Z, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y),
    ];
    let far = range.max(1.0);
    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, 0.05, far);
    DIRECTIONS.map(|(forward, up)| {
        let view = Mat4::look_at_rh(position, position + forward, up);
        projection * view
    })
}
