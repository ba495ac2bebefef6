//! Shadow Projection Tests
//!
//! Tests for:
//! - Practical-split cascade distances (uniform / logarithmic blend)
//! - Sphere-fit cascade matrices: validity, slice containment, stability
//! - Spot and point-light projections

use glam::{Vec3, Vec4Swizzles};

use vesper::ecs::Camera;
use vesper::shadows::{
    build_cascade_view_projection, build_spot_view_projection, compute_cascade_splits,
    frustum_slice_corners_world, point_light_face_matrices,
};

const EPSILON: f32 = 1e-3;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn test_camera() -> Camera {
    Camera::look_at(
        Vec3::new(0.0, 2.0, 10.0),
        Vec3::new(0.0, 2.0, 0.0),
        60f32.to_radians(),
        16.0 / 9.0,
        0.1,
        100.0,
    )
}

// ============================================================================
// Cascade splits
// ============================================================================

#[test]
fn splits_last_equals_far() {
    let splits = compute_cascade_splits(4, 0.1, 100.0, 0.5);
    assert!(approx(splits[3], 100.0), "last split {}", splits[3]);
}

#[test]
fn splits_monotonically_increase() {
    let splits = compute_cascade_splits(4, 0.1, 100.0, 0.5);
    for i in 1..4 {
        assert!(splits[i] > splits[i - 1], "splits {splits:?}");
    }
}

#[test]
fn splits_uniform_at_lambda_zero() {
    let splits = compute_cascade_splits(4, 1.0, 100.0, 0.0);
    let expected = [25.75, 50.5, 75.25, 100.0];
    for i in 0..4 {
        assert!(approx(splits[i], expected[i]), "split {i}: {}", splits[i]);
    }
}

#[test]
fn splits_logarithmic_at_lambda_one() {
    let splits = compute_cascade_splits(4, 1.0, 100.0, 1.0);
    // near * (far/near)^(i/n): 100^0.25 ≈ 3.162, 100^0.5 = 10, 100^0.75 ≈ 31.62
    assert!((splits[0] - 3.162).abs() < 0.01);
    assert!(approx(splits[1], 10.0));
    assert!((splits[2] - 31.623).abs() < 0.01);
    assert!(approx(splits[3], 100.0));
}

#[test]
fn splits_single_cascade_covers_range() {
    let splits = compute_cascade_splits(1, 0.1, 50.0, 0.5);
    assert!(approx(splits[0], 50.0));
}

#[test]
fn splits_clamp_excess_cascade_count() {
    let splits = compute_cascade_splits(10, 0.1, 100.0, 0.5);
    assert!(approx(splits[3], 100.0));
}

// ============================================================================
// Frustum slice corners
// ============================================================================

#[test]
fn slice_corners_sit_on_their_planes() {
    let camera = test_camera();
    let corners = frustum_slice_corners_world(&camera, 1.0, 20.0);

    // In this camera the view direction is -Z from z=10
    for corner in &corners[..4] {
        assert!(approx(corner.z, 9.0), "near corner z {}", corner.z);
    }
    for corner in &corners[4..] {
        assert!(approx(corner.z, -10.0), "far corner z {}", corner.z);
    }
}

#[test]
fn slice_corners_grow_with_distance() {
    let camera = test_camera();
    let corners = frustum_slice_corners_world(&camera, 1.0, 20.0);
    let near_width = (corners[1].x - corners[0].x).abs();
    let far_width = (corners[5].x - corners[4].x).abs();
    assert!(far_width > near_width * 10.0);
}

// ============================================================================
// Cascade view-projection
// ============================================================================

#[test]
fn cascade_matrix_is_finite_and_invertible() {
    let camera = test_camera();
    let corners = frustum_slice_corners_world(&camera, 0.1, 25.0);
    let vp = build_cascade_view_projection(Vec3::new(0.2, -1.0, 0.1), &corners, 2048, 100.0);
    for column in 0..4 {
        assert!(vp.col(column).is_finite());
    }
    assert!(vp.determinant().abs() > 1e-12);
}

#[test]
fn cascade_matrix_contains_slice_corners() {
    let camera = test_camera();
    let corners = frustum_slice_corners_world(&camera, 0.1, 25.0);
    let vp = build_cascade_view_projection(Vec3::new(0.0, -1.0, 0.0), &corners, 2048, 50.0);

    for corner in corners {
        let clip = vp * corner.extend(1.0);
        let ndc = clip.xyz() / clip.w;
        assert!(
            ndc.x.abs() <= 1.0 + 5e-3 && ndc.y.abs() <= 1.0 + 5e-3,
            "corner {corner:?} maps outside at {ndc:?}"
        );
        assert!(ndc.z >= -1e-3 && ndc.z <= 1.0 + 1e-3, "corner depth {}", ndc.z);
    }
}

#[test]
fn cascade_extent_is_rotation_stable() {
    // Sphere fit: rotating the camera in place must not change the ortho
    // footprint, only its position.
    let mut camera_a = test_camera();
    camera_a.target = Vec3::new(0.0, 2.0, 0.0);
    camera_a.refresh_view();
    let mut camera_b = test_camera();
    camera_b.target = Vec3::new(5.0, 2.0, 0.0);
    camera_b.refresh_view();

    let footprint = |camera: &Camera| -> f32 {
        let corners = frustum_slice_corners_world(camera, 0.1, 25.0);
        let vp = build_cascade_view_projection(Vec3::NEG_Y, &corners, 1024, 50.0);
        // The width of the ortho box is 2 / m00
        2.0 / vp.to_cols_array_2d()[0][0].abs()
    };

    let a = footprint(&camera_a);
    let b = footprint(&camera_b);
    assert!(
        (a - b).abs() / a < 0.02,
        "footprint changed under rotation: {a} vs {b}"
    );
}

// ============================================================================
// Spot & point projections
// ============================================================================

#[test]
fn spot_matrix_is_invertible() {
    let vp = build_spot_view_projection(
        Vec3::new(0.0, 5.0, 0.0),
        Vec3::NEG_Y,
        0.5,
        20.0,
    );
    assert!(vp.determinant().abs() > 1e-12);
}

#[test]
fn spot_matrix_centers_its_axis() {
    let position = Vec3::new(1.0, 5.0, -2.0);
    let direction = Vec3::NEG_Y;
    let vp = build_spot_view_projection(position, direction, 0.6, 30.0);
    let on_axis = position + direction * 10.0;
    let clip = vp * on_axis.extend(1.0);
    let ndc = clip.xyz() / clip.w;
    assert!(ndc.x.abs() < 1e-4 && ndc.y.abs() < 1e-4, "axis point {ndc:?}");
}

#[test]
fn point_faces_cover_all_directions() {
    let position = Vec3::new(0.0, 1.0, 0.0);
    let faces = point_light_face_matrices(position, 25.0);
    let probes = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];
    for (face, direction) in probes.iter().enumerate() {
        let point = position + *direction * 5.0;
        let clip = faces[face] * point.extend(1.0);
        let ndc = clip.xyz() / clip.w;
        assert!(
            clip.w > 0.0 && ndc.x.abs() < 1e-3 && ndc.y.abs() < 1e-3,
            "face {face} does not center {direction:?}: {ndc:?}"
        );
    }
}

#[test]
fn point_faces_are_distinct() {
    let faces = point_light_face_matrices(Vec3::ZERO, 10.0);
    for i in 0..6 {
        for j in i + 1..6 {
            assert_ne!(
                faces[i].to_cols_array(),
                faces[j].to_cols_array(),
                "faces {i} and {j} identical"
            );
        }
    }
}
