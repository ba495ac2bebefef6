//! Geometry Packing Tests
//!
//! Tests for:
//! - Stream mask computation and vec4 strides
//! - Index rewriting against absolute vertex offsets
//! - Interleaved stream order and skin-source duplication
//! - Drawable classification from material properties

use glam::{Vec2, Vec3, Vec4};

use vesper::ecs::{BlendMode, Material, MaterialKind, Mesh};
use vesper::scene::{
    GeometryArrays, VertexStreamFlags, classify_material, pack_mesh, shadow_casting,
    stream_flags_of,
};
use vesper::scene::{DrawableFlags, ShadowKind};

fn triangle_mesh() -> Mesh {
    let mut mesh = Mesh::from_positions(
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ],
        vec![0, 1, 2],
    );
    mesh.normals = vec![Vec3::Z; 3];
    mesh.uv_sets = vec![vec![Vec2::ZERO, Vec2::X, Vec2::Y]];
    mesh
}

// ============================================================================
// Stream masks
// ============================================================================

#[test]
fn stream_mask_reflects_present_streams() {
    let mesh = triangle_mesh();
    let flags = stream_flags_of(&mesh, false);
    assert!(flags.contains(VertexStreamFlags::NORMAL));
    assert!(flags.contains(VertexStreamFlags::UV0));
    assert!(!flags.contains(VertexStreamFlags::TANGENT));
    assert_eq!(flags.stride(), 2);
}

#[test]
fn stream_offsets_follow_packing_order() {
    let mut mesh = triangle_mesh();
    mesh.tangents = vec![Vec4::X; 3];
    let flags = stream_flags_of(&mesh, false);
    assert_eq!(flags.offset_of(VertexStreamFlags::NORMAL), Some(0));
    assert_eq!(flags.offset_of(VertexStreamFlags::TANGENT), Some(1));
    assert_eq!(flags.offset_of(VertexStreamFlags::UV0), Some(2));
    assert_eq!(flags.offset_of(VertexStreamFlags::COLOR0), None);
}

#[test]
fn skin_streams_require_request() {
    let mut mesh = triangle_mesh();
    mesh.joints = vec![Vec4::ZERO; 3];
    mesh.weights = vec![Vec4::X; 3];
    assert!(!stream_flags_of(&mesh, false).contains(VertexStreamFlags::JOINTS0));
    let with = stream_flags_of(&mesh, true);
    assert!(with.contains(VertexStreamFlags::JOINTS0));
    assert!(with.contains(VertexStreamFlags::WEIGHTS0));
}

// ============================================================================
// Packing
// ============================================================================

#[test]
fn indices_rewrite_to_absolute_offsets() {
    let mut arrays = GeometryArrays::new();
    let first = pack_mesh(&mut arrays, &triangle_mesh(), false).unwrap();
    let second = pack_mesh(&mut arrays, &triangle_mesh(), false).unwrap();

    assert_eq!(first.vertex_offset, 0);
    assert_eq!(second.vertex_offset, 3);
    assert_eq!(&arrays.indices[..3], &[0, 1, 2]);
    assert_eq!(&arrays.indices[3..6], &[3, 4, 5]);
    assert_eq!(second.index_offset, 3);
    assert_eq!(arrays.positions.len(), 6);
}

#[test]
fn data_is_interleaved_per_vertex() {
    let mut arrays = GeometryArrays::new();
    let packed = pack_mesh(&mut arrays, &triangle_mesh(), false).unwrap();
    let stride = packed.stream_flags.stride() as usize;
    assert_eq!(stride, 2);
    assert_eq!(arrays.data.len(), 3 * stride);

    // Vertex 1: normal then uv
    let base = stride;
    assert_eq!(arrays.data[base].truncate(), Vec3::Z);
    let uv = arrays.data[base + 1];
    assert_eq!(Vec2::new(uv.x, uv.y), Vec2::X);
}

#[test]
fn skin_source_prepends_position() {
    let mut mesh = triangle_mesh();
    mesh.joints = vec![Vec4::new(1.0, 0.0, 0.0, 0.0); 3];
    mesh.weights = vec![Vec4::new(1.0, 0.0, 0.0, 0.0); 3];

    let mut arrays = GeometryArrays::new();
    let packed = pack_mesh(&mut arrays, &mesh, true).unwrap();
    let source_offset = packed.skin_source_offset.expect("skin source packed");
    assert_eq!(source_offset, 0);

    // Stride = position + (normal, uv, joints, weights)
    let data_stride = packed.stream_flags.stride() as usize;
    assert_eq!(data_stride, 4);
    let source_stride = 1 + data_stride;
    assert_eq!(arrays.skin_data.len(), 3 * source_stride);

    // Vertex 1 leads with its position
    assert_eq!(
        arrays.skin_data[source_stride].truncate(),
        Vec3::new(1.0, 0.0, 0.0)
    );
}

#[test]
fn live_buffers_also_carry_skin_mesh() {
    let mut mesh = triangle_mesh();
    mesh.joints = vec![Vec4::ZERO; 3];
    mesh.weights = vec![Vec4::X; 3];
    let mut arrays = GeometryArrays::new();
    let packed = pack_mesh(&mut arrays, &mesh, true).unwrap();
    // The rest pose occupies the live buffers until the dispatch rewrites it
    assert_eq!(arrays.positions.len(), 3);
    assert_eq!(arrays.data.len(), 3 * packed.stream_flags.stride() as usize);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn mesh_without_positions_is_rejected() {
    let mut arrays = GeometryArrays::new();
    let mesh = Mesh::default();
    assert!(pack_mesh(&mut arrays, &mesh, false).is_err());
}

#[test]
fn out_of_range_index_is_rejected() {
    let mut arrays = GeometryArrays::new();
    let mesh = Mesh::from_positions(vec![Vec3::ZERO, Vec3::X], vec![0, 1, 2]);
    assert!(pack_mesh(&mut arrays, &mesh, false).is_err());
}

#[test]
fn mismatched_stream_length_is_rejected() {
    let mut arrays = GeometryArrays::new();
    let mut mesh = triangle_mesh();
    mesh.normals.pop();
    assert!(pack_mesh(&mut arrays, &mesh, false).is_err());
}

#[test]
fn skinned_pack_without_streams_is_rejected() {
    let mut arrays = GeometryArrays::new();
    let mesh = triangle_mesh();
    assert!(pack_mesh(&mut arrays, &mesh, true).is_err());
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn opaque_pbr_classifies_deferred() {
    let material = Material::default();
    assert_eq!(classify_material(&material), DrawableFlags::DEFERRED);
}

#[test]
fn blended_and_unlit_classify_forward() {
    let blended = Material {
        blend_mode: BlendMode::Blend,
        ..Material::default()
    };
    let unlit = Material {
        kind: MaterialKind::Unlit,
        ..Material::default()
    };
    assert_eq!(classify_material(&blended), DrawableFlags::FORWARD);
    assert_eq!(classify_material(&unlit), DrawableFlags::FORWARD);
}

#[test]
fn shadow_eligibility_follows_blend_mode() {
    let opaque = Material::default();
    let masked = Material {
        blend_mode: BlendMode::AlphaMask,
        ..Material::default()
    };
    let blended = Material {
        blend_mode: BlendMode::Blend,
        ..Material::default()
    };
    let disabled = Material {
        cast_shadow: false,
        ..Material::default()
    };
    assert_eq!(shadow_casting(&opaque), Some(ShadowKind::Opaque));
    assert_eq!(shadow_casting(&masked), Some(ShadowKind::AlphaTested));
    assert_eq!(shadow_casting(&blended), None);
    assert_eq!(shadow_casting(&disabled), None);
}
