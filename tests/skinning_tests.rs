//! Skinning Layout Tests
//!
//! The dispatch itself is GPU work; these tests pin the CPU-side layout
//! contracts it depends on: joint-texture sizing and the stream offsets
//! the deform shader indexes with.

use glam::{Vec2, Vec3, Vec4};

use vesper::scene::{GeometryArrays, VertexStreamFlags, pack_mesh};
use vesper::skinning::{TEXELS_PER_JOINT, joint_texture_dimension};

// ============================================================================
// Joint texture sizing
// ============================================================================

#[test]
fn dimension_holds_all_joint_texels() {
    for joints in [1u32, 2, 7, 16, 63, 64, 100, 255, 256, 1000] {
        let side = joint_texture_dimension(joints);
        assert!(
            side * side >= joints * TEXELS_PER_JOINT,
            "{joints} joints need {} texels, {side}² too small",
            joints * TEXELS_PER_JOINT
        );
    }
}

#[test]
fn dimension_is_row_copyable() {
    // 16 bytes per RGBA32F texel: a multiple-of-16 side keeps rows at the
    // 256-byte copy alignment.
    for joints in [1u32, 5, 33, 129, 512] {
        let side = joint_texture_dimension(joints);
        assert_eq!(side % 16, 0, "side {side} for {joints} joints");
    }
}

#[test]
fn dimension_grows_monotonically() {
    let mut last = 0;
    for joints in 1..300u32 {
        let side = joint_texture_dimension(joints);
        assert!(side >= last);
        last = side;
    }
}

#[test]
fn zero_joints_still_yields_a_valid_texture() {
    assert!(joint_texture_dimension(0) >= 16);
}

// ============================================================================
// Source stream layout
// ============================================================================

fn skinned_mesh() -> vesper::ecs::Mesh {
    let mut mesh = vesper::ecs::Mesh::from_positions(
        vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::Z],
        vec![0, 1, 2, 0, 2, 3],
    );
    mesh.normals = vec![Vec3::Z; 4];
    mesh.uv_sets = vec![vec![Vec2::ZERO; 4]];
    mesh.joints = vec![
        Vec4::new(0.0, 1.0, 0.0, 0.0),
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.0, 1.0, 0.0, 0.0),
        Vec4::new(1.0, 2.0, 0.0, 0.0),
    ];
    mesh.weights = vec![
        Vec4::new(0.7, 0.3, 0.0, 0.0),
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        Vec4::new(0.5, 0.5, 0.0, 0.0),
        Vec4::new(0.6, 0.4, 0.0, 0.0),
    ];
    mesh
}

#[test]
fn skin_source_stream_offsets_are_stable() {
    let mut arrays = GeometryArrays::new();
    let packed = pack_mesh(&mut arrays, &skinned_mesh(), true).unwrap();
    let flags = packed.stream_flags;

    // Packing order: normal, uv0, joints, weights
    assert_eq!(flags.offset_of(VertexStreamFlags::NORMAL), Some(0));
    assert_eq!(flags.offset_of(VertexStreamFlags::UV0), Some(1));
    assert_eq!(flags.offset_of(VertexStreamFlags::JOINTS0), Some(2));
    assert_eq!(flags.offset_of(VertexStreamFlags::WEIGHTS0), Some(3));
}

#[test]
fn skin_source_joints_land_where_the_shader_reads() {
    let mut arrays = GeometryArrays::new();
    let mesh = skinned_mesh();
    let packed = pack_mesh(&mut arrays, &mesh, true).unwrap();

    let data_stride = packed.stream_flags.stride() as usize;
    let source_stride = 1 + data_stride;
    let joints_offset = 1 + packed
        .stream_flags
        .offset_of(VertexStreamFlags::JOINTS0)
        .unwrap() as usize;
    let weights_offset = 1 + packed
        .stream_flags
        .offset_of(VertexStreamFlags::WEIGHTS0)
        .unwrap() as usize;

    for vertex in 0..4usize {
        let base = vertex * source_stride;
        assert_eq!(arrays.skin_data[base].truncate(), mesh.positions[vertex]);
        assert_eq!(arrays.skin_data[base + joints_offset], mesh.joints[vertex]);
        assert_eq!(arrays.skin_data[base + weights_offset], mesh.weights[vertex]);
    }
}

// ============================================================================
// CPU reference of the two-joint blend
// ============================================================================

/// The blend the dispatch performs, in CPU form: idempotent for fixed
/// joint matrices.
fn blend_vertex(position: Vec3, joints: Vec4, weights: Vec4, matrices: &[glam::Mat4]) -> Vec3 {
    let mut indexed: Vec<(usize, f32)> = (0..4).map(|i| (i, weights[i])).collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    let (j0, w0) = indexed[0];
    let (j1, w1) = indexed[1];
    let total = (w0 + w1).max(1e-5);
    let m = matrices[joints[j0] as usize] * (w0 / total)
        + matrices[joints[j1] as usize] * (w1 / total);
    (m * position.extend(1.0)).truncate()
}

#[test]
fn blend_is_idempotent_for_fixed_matrices() {
    let matrices = vec![
        glam::Mat4::from_translation(Vec3::X),
        glam::Mat4::from_rotation_y(0.5),
        glam::Mat4::IDENTITY,
    ];
    let mesh = skinned_mesh();
    for vertex in 0..4usize {
        let a = blend_vertex(
            mesh.positions[vertex],
            mesh.joints[vertex],
            mesh.weights[vertex],
            &matrices,
        );
        let b = blend_vertex(
            mesh.positions[vertex],
            mesh.joints[vertex],
            mesh.weights[vertex],
            &matrices,
        );
        assert_eq!(a, b);
    }
}

#[test]
fn full_weight_follows_single_joint() {
    let matrices = vec![glam::Mat4::from_translation(Vec3::Y), glam::Mat4::IDENTITY];
    let moved = blend_vertex(
        Vec3::X,
        Vec4::new(0.0, 1.0, 0.0, 0.0),
        Vec4::new(1.0, 0.0, 0.0, 0.0),
        &matrices,
    );
    assert!((moved - (Vec3::X + Vec3::Y)).length() < 1e-6);
}
