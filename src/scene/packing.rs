//! Geometry Packing
//!
//! Meshes pack into four scene-global CPU arrays, later uploaded as the
//! vertex, index, data-storage, and skin-storage buffers:
//!
//! - positions, tightly packed, absolute vertex offsets;
//! - indices, rewritten against the global vertex positions;
//! - secondary streams, one vec4 per stream per vertex, interleaved per
//!   vertex in the fixed order of [`VertexStreamFlags`];
//! - skinned meshes additionally write position + streams into the skin
//!   source buffer, which the skinning dispatch reads.

use glam::{Vec3, Vec4};

use crate::ecs::Mesh;
use crate::errors::{RenderError, Result};
use crate::scene::drawable::VertexStreamFlags;

/// The scene's CPU-side geometry staging arrays.
#[derive(Debug, Default)]
pub struct GeometryArrays {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub data: Vec<Vec4>,
    pub skin_data: Vec<Vec4>,
}

impl GeometryArrays {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.positions.clear();
        self.indices.clear();
        self.data.clear();
        self.skin_data.clear();
    }
}

/// Offsets of one packed primitive.
#[derive(Debug, Clone, Copy)]
pub struct PackedPrimitive {
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub index_offset: u32,
    pub index_count: u32,
    /// Element offset into the data buffer (vec4 units).
    pub data_offset: u32,
    pub stream_flags: VertexStreamFlags,
    /// Element offset into the skin-source buffer, for skinned meshes.
    pub skin_source_offset: Option<u32>,
}

/// Computes the stream mask a mesh provides, in packing order.
#[must_use]
pub fn stream_flags_of(mesh: &Mesh, with_skin: bool) -> VertexStreamFlags {
    let mut flags = VertexStreamFlags::empty();
    if !mesh.normals.is_empty() {
        flags |= VertexStreamFlags::NORMAL;
    }
    if !mesh.tangents.is_empty() {
        flags |= VertexStreamFlags::TANGENT;
    }
    for (i, uv) in mesh.uv_sets.iter().take(8).enumerate() {
        if !uv.is_empty() {
            flags |= VertexStreamFlags::from_bits_retain(VertexStreamFlags::UV0.bits() << i);
        }
    }
    for (i, colors) in mesh.color_sets.iter().take(2).enumerate() {
        if !colors.is_empty() {
            flags |= VertexStreamFlags::from_bits_retain(VertexStreamFlags::COLOR0.bits() << i);
        }
    }
    if with_skin && mesh.has_skin_streams() {
        flags |= VertexStreamFlags::JOINTS0 | VertexStreamFlags::WEIGHTS0;
    }
    flags
}

fn validate(mesh: &Mesh) -> Result<()> {
    let vertex_count = mesh.positions.len();
    if vertex_count == 0 {
        return Err(RenderError::InvalidInput(
            "mesh has no positions".to_owned(),
        ));
    }
    if mesh.indices.is_empty() {
        return Err(RenderError::InvalidInput("mesh has no indices".to_owned()));
    }
    if let Some(&max) = mesh.indices.iter().max() {
        if max as usize >= vertex_count {
            return Err(RenderError::InvalidInput(format!(
                "mesh index {max} out of range for {vertex_count} vertices"
            )));
        }
    }
    let stream_len_ok = |len: usize| len == 0 || len == vertex_count;
    if !stream_len_ok(mesh.normals.len())
        || !stream_len_ok(mesh.tangents.len())
        || !mesh.uv_sets.iter().all(|s| stream_len_ok(s.len()))
        || !mesh.color_sets.iter().all(|s| stream_len_ok(s.len()))
        || !stream_len_ok(mesh.joints.len())
        || !stream_len_ok(mesh.weights.len())
    {
        return Err(RenderError::InvalidInput(
            "mesh stream lengths disagree with vertex count".to_owned(),
        ));
    }
    Ok(())
}

/// One vertex's streams, in packing order.
fn write_vertex_streams(
    out: &mut Vec<Vec4>,
    mesh: &Mesh,
    flags: VertexStreamFlags,
    vertex: usize,
) {
    if flags.contains(VertexStreamFlags::NORMAL) {
        out.push(mesh.normals[vertex].extend(0.0));
    }
    if flags.contains(VertexStreamFlags::TANGENT) {
        out.push(mesh.tangents[vertex]);
    }
    for i in 0..8usize {
        let bit = VertexStreamFlags::from_bits_retain(VertexStreamFlags::UV0.bits() << i);
        if flags.contains(bit) {
            let uv = mesh.uv_sets[i][vertex];
            out.push(Vec4::new(uv.x, uv.y, 0.0, 0.0));
        }
    }
    for i in 0..2usize {
        let bit = VertexStreamFlags::from_bits_retain(VertexStreamFlags::COLOR0.bits() << i);
        if flags.contains(bit) {
            out.push(mesh.color_sets[i][vertex]);
        }
    }
    if flags.contains(VertexStreamFlags::JOINTS0) {
        out.push(mesh.joints[vertex]);
    }
    if flags.contains(VertexStreamFlags::WEIGHTS0) {
        out.push(mesh.weights[vertex]);
    }
}

/// Packs one mesh into the arrays.
///
/// For skinned meshes the skin-source buffer receives position plus all
/// streams per vertex; the live vertex/data buffers receive the same
/// content as the rest position, overwritten by the skinning dispatch
/// each frame.
pub fn pack_mesh(
    arrays: &mut GeometryArrays,
    mesh: &Mesh,
    with_skin: bool,
) -> Result<PackedPrimitive> {
    validate(mesh)?;
    if with_skin && !mesh.has_skin_streams() {
        return Err(RenderError::InvalidInput(
            "skinned drawable's mesh lacks joint/weight streams".to_owned(),
        ));
    }

    let flags = stream_flags_of(mesh, with_skin);
    let vertex_count = mesh.positions.len();
    let vertex_offset = arrays.positions.len() as u32;
    let index_offset = arrays.indices.len() as u32;
    let data_offset = arrays.data.len() as u32;

    // Indices, rewritten to absolute vertex positions
    arrays
        .indices
        .extend(mesh.indices.iter().map(|&i| i + vertex_offset));

    // Positions
    arrays.positions.extend_from_slice(&mesh.positions);

    // Secondary streams, interleaved per vertex
    for vertex in 0..vertex_count {
        write_vertex_streams(&mut arrays.data, mesh, flags, vertex);
    }

    // Skin source: position first, then the same streams
    let skin_source_offset = if with_skin {
        let offset = arrays.skin_data.len() as u32;
        for vertex in 0..vertex_count {
            arrays.skin_data.push(mesh.positions[vertex].extend(1.0));
            write_vertex_streams(&mut arrays.skin_data, mesh, flags, vertex);
        }
        Some(offset)
    } else {
        None
    };

    Ok(PackedPrimitive {
        vertex_offset,
        vertex_count: vertex_count as u32,
        index_offset,
        index_count: mesh.indices.len() as u32,
        data_offset,
        stream_flags: flags,
        skin_source_offset,
    })
}
