//! Drawable Registry
//!
//! One drawable per renderable mesh primitive. Staged entities are packed
//! into the scene's global buffers at finalize; the registry then holds
//! the packed offsets, the material/transform linkage, and the pipeline
//! variants for each pass the drawable participates in.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::FRAMES_IN_FLIGHT;
use crate::ecs::{BlendMode, Entity, Material, MaterialKind};
use crate::pipeline::RenderPipelineId;

bitflags! {
    /// Which lists a drawable renders in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DrawableFlags: u32 {
        const FORWARD = 1 << 0;
        const DEFERRED = 1 << 1;
        const PROBE = 1 << 2;
    }
}

bitflags! {
    /// Secondary vertex streams a packed drawable carries, in packing
    /// order. The storage stride is the popcount.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct VertexStreamFlags: u32 {
        const NORMAL = 1 << 0;
        const TANGENT = 1 << 1;
        const UV0 = 1 << 2;
        const UV1 = 1 << 3;
        const UV2 = 1 << 4;
        const UV3 = 1 << 5;
        const UV4 = 1 << 6;
        const UV5 = 1 << 7;
        const UV6 = 1 << 8;
        const UV7 = 1 << 9;
        const COLOR0 = 1 << 10;
        const COLOR1 = 1 << 11;
        const JOINTS0 = 1 << 12;
        const WEIGHTS0 = 1 << 13;
    }
}

impl VertexStreamFlags {
    /// Number of vec4 elements per vertex in the data buffer.
    #[must_use]
    pub fn stride(self) -> u32 {
        self.bits().count_ones()
    }

    /// Element offset of a stream within one vertex's slice, or `None`
    /// when the stream is absent.
    #[must_use]
    pub fn offset_of(self, stream: VertexStreamFlags) -> Option<u32> {
        if !self.contains(stream) {
            return None;
        }
        let below = self.bits() & (stream.bits() - 1);
        Some(below.count_ones())
    }
}

/// One frame slot's destination region for a skinned drawable. The
/// skinning dispatch writes here while the other slot's region is still
/// being read by the in-flight frame.
#[derive(Debug, Clone, Copy)]
pub struct SkinSlice {
    pub vertex_offset: u32,
    pub data_offset: u32,
}

/// A packed, renderable primitive.
#[derive(Debug, Clone)]
pub struct Drawable {
    pub entity: Entity,
    pub flags: DrawableFlags,

    // Offsets into the scene's global buffers
    pub data_offset: u32,
    pub vertex_offset: u32,
    pub vertex_count: u32,
    pub index_offset: u32,
    pub index_count: u32,

    pub material_index: u32,
    pub transform_index: u32,
    pub instance_index: u32,
    pub instance_count: u32,

    pub stream_flags: VertexStreamFlags,
    pub triangle_count: u32,

    /// Index into the scene's skin list.
    pub skin_index: Option<u32>,
    /// Per-frame destination slices for skinned drawables.
    pub skin_slices: Option<[SkinSlice; FRAMES_IN_FLIGHT]>,
    pub cast_shadow: bool,
    pub double_sided: bool,
    pub blend_mode: BlendMode,

    // Pipeline variants per pass, resolved at finalize
    pub shader: Option<RenderPipelineId>,
    pub env_shader: Option<RenderPipelineId>,
    pub shadow_shader: Option<RenderPipelineId>,
}

impl Drawable {
    /// Offsets for the frame slot: a skinned drawable reads its slot's
    /// dynamic slice, everything else its static region. The base-vertex
    /// delta rebases the shared index data onto the slice.
    #[must_use]
    pub fn frame_offsets(&self, slot: usize) -> (u32, u32, i32) {
        match &self.skin_slices {
            Some(slices) => {
                let slice = slices[slot];
                (
                    slice.data_offset,
                    slice.vertex_offset,
                    slice.vertex_offset as i32 - self.vertex_offset as i32,
                )
            }
            None => (self.data_offset, self.vertex_offset, 0),
        }
    }
}

/// An entity staged for packing, remembered until `finalize_scene`.
#[derive(Debug, Clone, Copy)]
pub struct StagedDrawable {
    pub entity: Entity,
    pub transparent: bool,
}

/// Flag classification from material properties: opaque PBR renders
/// deferred, everything else forward. Probe participation is a mesh tag
/// applied by the caller.
#[must_use]
pub fn classify_material(material: &Material) -> DrawableFlags {
    if material.kind == MaterialKind::Pbr && material.blend_mode == BlendMode::Opaque {
        DrawableFlags::DEFERRED
    } else {
        DrawableFlags::FORWARD
    }
}

/// Shadow eligibility from the same properties: blended surfaces never
/// cast; alpha-masked ones need the sampling shadow variant.
#[must_use]
pub fn shadow_casting(material: &Material) -> Option<ShadowKind> {
    if !material.cast_shadow || material.blend_mode == BlendMode::Blend {
        return None;
    }
    Some(match material.blend_mode {
        BlendMode::AlphaMask => ShadowKind::AlphaTested,
        _ => ShadowKind::Opaque,
    })
}

/// Which shadow pipeline family a caster uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowKind {
    Opaque,
    AlphaTested,
}

/// The scene's drawable lists.
#[derive(Default)]
pub struct DrawableSet {
    pub staged: Vec<StagedDrawable>,
    pub drawables: Vec<Drawable>,
    pub by_entity: FxHashMap<Entity, u32>,
    /// Indices of drawables participating in probe captures.
    pub probe_drawables: Vec<u32>,
    /// Shadow lists: indices into `drawables`, split by pipeline family.
    pub shadow_deferred: Vec<u32>,
    pub shadow_forward: Vec<u32>,
}

impl DrawableSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, entity: Entity, transparent: bool) {
        self.staged.push(StagedDrawable {
            entity,
            transparent,
        });
    }

    #[must_use]
    pub fn index_of(&self, entity: Entity) -> Option<u32> {
        self.by_entity.get(&entity).copied()
    }

    #[must_use]
    pub fn get(&self, index: u32) -> Option<&Drawable> {
        self.drawables.get(index as usize)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.drawables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drawables.is_empty()
    }
}
