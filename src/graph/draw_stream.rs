//! Draw Streams
//!
//! Every pass builds an immutable stream of draw commands first, then
//! replays it against a render pass. The two phases keep command-buffer
//! recording trivial (and open the door to building streams off-thread
//! without touching call sites).

use bytemuck::{Pod, Zeroable};

use crate::pipeline::{RenderPipelineId, VariantCache};

/// Per-draw dynamic record, bound at group 1 with a dynamic offset. The
/// `extra` lane carries pass-specific payload: the entity color for pick,
/// outline color and scale for outlines, the skybox cube slot.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct DrawDynamicData {
    pub data_offset: i32,
    pub vertex_offset: i32,
    pub material_index: u32,
    pub transform_index: u32,
    pub extra: [f32; 4],
}

/// Shadow-pass dynamic record: the caster's offsets plus the light's
/// shadow-data index; the instance buffer supplies the viewport index.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct ShadowDynamicData {
    pub data_offset: i32,
    pub vertex_offset: i32,
    pub material_index: u32,
    pub shadow_index: u32,
}

/// One recorded draw.
#[derive(Debug, Clone)]
pub struct DrawCall {
    pub pipeline: RenderPipelineId,
    /// Byte offset into the frame's dynamic buffer.
    pub dynamic_offset: u32,
    pub index_offset: u32,
    pub index_count: u32,
    /// Rebases shared index data onto a skinned drawable's frame slice.
    pub base_vertex: i32,
    pub instance_range: (u32, u32),
    /// Atlas viewport for shadow draws: x, y, w, h.
    pub viewport: Option<[f32; 4]>,
    pub stencil_reference: Option<u32>,
}

/// An immutable, ordered list of draws for one pass.
#[derive(Debug, Default)]
pub struct DrawStream {
    calls: Vec<DrawCall>,
}

impl DrawStream {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, call: DrawCall) {
        self.calls.push(call);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Replays the stream. The caller has already set the pass-wide state:
    /// vertex/index buffers and bind group 0. Pipeline switches are
    /// elided when consecutive calls share one.
    pub fn replay(
        &self,
        pass: &mut wgpu::RenderPass<'_>,
        variants: &VariantCache,
        dynamic_bind_group: &wgpu::BindGroup,
    ) -> u64 {
        let mut current_pipeline: Option<RenderPipelineId> = None;
        let mut draw_calls = 0u64;

        for call in &self.calls {
            if current_pipeline != Some(call.pipeline) {
                pass.set_pipeline(variants.render_pipeline(call.pipeline));
                current_pipeline = Some(call.pipeline);
            }
            if let Some([x, y, w, h]) = call.viewport {
                pass.set_viewport(x, y, w, h, 0.0, 1.0);
            }
            if let Some(reference) = call.stencil_reference {
                pass.set_stencil_reference(reference);
            }
            pass.set_bind_group(1, dynamic_bind_group, &[call.dynamic_offset]);
            pass.draw_indexed(
                call.index_offset..call.index_offset + call.index_count,
                call.base_vertex,
                call.instance_range.0..call.instance_range.1,
            );
            draw_calls += 1;
        }
        draw_calls
    }
}
