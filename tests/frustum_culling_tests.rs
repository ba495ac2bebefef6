//! Frustum Culling Tests
//!
//! Tests for:
//! - The separating-axis frustum-vs-OBB test (visible, behind, beside)
//! - Degenerate and infinite bounds
//! - The grid scenario: a camera framing an exact 3×3 subgrid

use glam::Vec3;

use vesper::ecs::Camera;
use vesper::math::{Aabb, sat_visibility_test};

fn camera_looking_minus_z(position: Vec3, fov_y: f32) -> Camera {
    Camera::look_at(position, position + Vec3::NEG_Z, fov_y, 1.0, 0.1, 100.0)
}

// ============================================================================
// Basic visibility
// ============================================================================

#[test]
fn box_in_front_is_visible() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -11.0), Vec3::new(1.0, 1.0, -9.0));
    assert!(sat_visibility_test(&camera, &aabb));
}

#[test]
fn box_behind_camera_is_culled() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    let aabb = Aabb::new(Vec3::new(-1.0, -1.0, 9.0), Vec3::new(1.0, 1.0, 11.0));
    assert!(!sat_visibility_test(&camera, &aabb));
}

#[test]
fn box_beyond_far_plane_is_culled() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    let aabb = Aabb::new(Vec3::new(-1.0, -1.0, -250.0), Vec3::new(1.0, 1.0, -210.0));
    assert!(!sat_visibility_test(&camera, &aabb));
}

#[test]
fn box_far_to_the_side_is_culled() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    let aabb = Aabb::new(Vec3::new(49.0, -1.0, -11.0), Vec3::new(51.0, 1.0, -9.0));
    assert!(!sat_visibility_test(&camera, &aabb));
}

#[test]
fn box_straddling_side_plane_is_visible() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    // At depth 10 with 60° fov the half-width is ~5.77; straddle it
    let aabb = Aabb::new(Vec3::new(5.0, -1.0, -11.0), Vec3::new(7.0, 1.0, -9.0));
    assert!(sat_visibility_test(&camera, &aabb));
}

#[test]
fn large_box_surrounding_camera_is_visible() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    let aabb = Aabb::new(Vec3::splat(-50.0), Vec3::splat(50.0));
    assert!(sat_visibility_test(&camera, &aabb));
}

#[test]
fn rotated_camera_culls_correctly() {
    // Camera at origin looking +X: a box on -X must be culled
    let camera = Camera::look_at(Vec3::ZERO, Vec3::X, 60f32.to_radians(), 1.0, 0.1, 100.0);
    let front = Aabb::new(Vec3::new(9.0, -1.0, -1.0), Vec3::new(11.0, 1.0, 1.0));
    let behind = Aabb::new(Vec3::new(-11.0, -1.0, -1.0), Vec3::new(-9.0, 1.0, 1.0));
    assert!(sat_visibility_test(&camera, &front));
    assert!(!sat_visibility_test(&camera, &behind));
}

// ============================================================================
// Degenerate bounds
// ============================================================================

#[test]
fn infinite_bounds_are_treated_visible() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    let aabb = Aabb::empty();
    assert!(sat_visibility_test(&camera, &aabb));
}

#[test]
fn flat_box_in_front_is_visible() {
    let camera = camera_looking_minus_z(Vec3::ZERO, 60f32.to_radians());
    // Zero extent in y: a ground plane patch
    let aabb = Aabb::new(Vec3::new(-1.0, 0.0, -11.0), Vec3::new(1.0, 0.0, -9.0));
    assert!(sat_visibility_test(&camera, &aabb));
}

// ============================================================================
// Grid scenario: exactly 9 of 100 inside
// ============================================================================

#[test]
fn grid_camera_sees_exactly_nine() {
    // 10×10 grid on the XY plane, spacing 10, unit half-extents.
    // The camera frames centers within ±15 of (10, 10): columns and rows
    // at 0, 10, 20 — a 3×3 subgrid.
    let half_fov = 0.5f32.atan();
    let camera = Camera::look_at(
        Vec3::new(10.0, 10.0, 30.0),
        Vec3::new(10.0, 10.0, 0.0),
        2.0 * half_fov,
        1.0,
        0.1,
        100.0,
    );

    let mut visible = 0;
    let mut total = 0;
    for i in 0..10 {
        for j in 0..10 {
            let center = Vec3::new(i as f32 * 10.0, j as f32 * 10.0, 0.0);
            let aabb = Aabb::new(center - Vec3::ONE, center + Vec3::ONE);
            total += 1;
            if sat_visibility_test(&camera, &aabb) {
                visible += 1;
            }
        }
    }
    assert_eq!(total, 100);
    assert_eq!(visible, 9, "expected a 3x3 subgrid to survive culling");
}

// ============================================================================
// AABB helpers
// ============================================================================

#[test]
fn aabb_transform_keeps_containment() {
    let aabb = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));
    let matrix = glam::Mat4::from_rotation_y(0.7) * glam::Mat4::from_scale(Vec3::splat(2.0));
    let transformed = aabb.transformed(&matrix);
    for corner in aabb.corners() {
        assert!(transformed.contains_point(matrix.transform_point3(corner)));
    }
}

#[test]
fn aabb_from_points_bounds_all() {
    let points = [
        Vec3::new(1.0, 2.0, 3.0),
        Vec3::new(-4.0, 0.5, 2.0),
        Vec3::new(0.0, -7.0, 9.0),
    ];
    let aabb = Aabb::from_points(&points);
    for p in points {
        assert!(aabb.contains_point(p));
    }
    assert_eq!(aabb.min, Vec3::new(-4.0, -7.0, 2.0));
    assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 9.0));
}
