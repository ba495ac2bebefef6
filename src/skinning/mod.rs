//! GPU Skinning
//!
//! Each skinned drawable owns a [`SkinData`]: per-frame joint-matrix
//! textures, per-frame parameter blocks suballocated from the device
//! buddy pool, and bind groups over the scene's skin source and
//! destination buffers. Per frame, joint matrices are staged and blitted
//! into the frame's texture, then one compute dispatch per skin —
//! `vertex_count` workgroups of one invocation — reads the stream-packed
//! rest vertices from skin storage, blends the two highest weighted
//! joints, and writes the deformed position and streams into the frame's
//! dynamic slice of the live vertex and data buffers.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::FRAMES_IN_FLIGHT;
use crate::ecs::Entity;
use crate::errors::Result;
use crate::gpu::allocator::PoolSlice;
use crate::gpu::core::GpuCore;
use crate::scene::drawable::{SkinSlice, VertexStreamFlags};
use crate::scene::packing::PackedPrimitive;

/// Texels per joint in the joint-matrix texture: the joint matrix and its
/// normal matrix, four RGBA32F texels each.
pub const TEXELS_PER_JOINT: u32 = 8;

/// Side length of the square joint texture for `joint_count` joints,
/// rounded up to a multiple of 16 so one row is always copyable (256-byte
/// row alignment at 16 bytes per texel).
#[must_use]
pub fn joint_texture_dimension(joint_count: u32) -> u32 {
    let texels = joint_count.max(1) * TEXELS_PER_JOINT;
    let side = (texels as f64).sqrt().ceil() as u32;
    side.next_multiple_of(16)
}

/// Parameter block of one skin dispatch. One per frame in flight, since
/// the destination slice rotates with the frame.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct SkinningParams {
    /// Element offset of the skin's first vertex in the skin-source
    /// buffer.
    pub source_offset: u32,
    pub dest_vertex_offset: u32,
    pub dest_data_offset: u32,
    pub vertex_count: u32,

    /// vec4 elements per source vertex (position + data streams).
    pub source_stride: u32,
    /// vec4 elements per destination vertex in the data buffer.
    pub data_stride: u32,
    /// Element index of the joints stream within a source vertex.
    pub joints_offset: u32,
    pub weights_offset: u32,

    pub texture_dim: u32,
    /// Element index of the normal stream, `0xFFFF_FFFF` when absent.
    pub normal_offset: u32,
    /// Element index of the tangent stream, `0xFFFF_FFFF` when absent.
    pub tangent_offset: u32,
    pub _unused: u32,
}

/// Per-skin GPU state.
pub struct SkinData {
    pub entity: Entity,
    pub object: Entity,
    pub vertex_count: u32,
    pub joint_count: u32,
    pub texture_dim: u32,
    pub params: [SkinningParams; FRAMES_IN_FLIGHT],

    /// Buddy-pool slices holding each frame's parameter block.
    param_slices: Vec<PoolSlice>,
    joint_textures: Vec<wgpu::Texture>,
    joint_views: Vec<wgpu::TextureView>,
    bind_groups: Option<Vec<wgpu::BindGroup>>,
}

impl SkinData {
    /// Allocates the per-frame joint textures and parameter blocks. Bind
    /// groups are attached once the scene's buffers exist.
    pub fn new(
        core: &mut GpuCore,
        entity: Entity,
        object: Entity,
        packed: &PackedPrimitive,
        joint_count: u32,
        slices: &[SkinSlice; FRAMES_IN_FLIGHT],
    ) -> Result<Self> {
        if joint_count == 0 {
            return Err(crate::errors::RenderError::InvalidInput(
                "skin has zero joints".to_owned(),
            ));
        }
        let source_offset = packed.skin_source_offset.ok_or_else(|| {
            crate::errors::RenderError::InvalidInput(
                "skinned drawable was packed without skin streams".to_owned(),
            )
        })?;

        let data_stride = packed.stream_flags.stride();
        let joints_offset = packed
            .stream_flags
            .offset_of(VertexStreamFlags::JOINTS0)
            .ok_or_else(|| {
                crate::errors::RenderError::InvalidInput("skin mesh lacks joints".to_owned())
            })?;
        let weights_offset = packed
            .stream_flags
            .offset_of(VertexStreamFlags::WEIGHTS0)
            .ok_or_else(|| {
                crate::errors::RenderError::InvalidInput("skin mesh lacks weights".to_owned())
            })?;

        let texture_dim = joint_texture_dimension(joint_count);
        // +1 on stream offsets: the position leads each source vertex
        let params = std::array::from_fn(|slot| SkinningParams {
            source_offset,
            dest_vertex_offset: slices[slot].vertex_offset,
            dest_data_offset: slices[slot].data_offset,
            vertex_count: packed.vertex_count,
            source_stride: 1 + data_stride,
            data_stride,
            joints_offset: joints_offset + 1,
            weights_offset: weights_offset + 1,
            texture_dim,
            normal_offset: packed
                .stream_flags
                .offset_of(VertexStreamFlags::NORMAL)
                .map_or(u32::MAX, |o| o + 1),
            tangent_offset: packed
                .stream_flags
                .offset_of(VertexStreamFlags::TANGENT)
                .map_or(u32::MAX, |o| o + 1),
            _unused: 0,
        });

        let device = core.device.clone();
        let queue = core.queue.clone();
        let mut param_slices = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for slot_params in &params {
            let slice = core
                .allocators
                .local
                .allocate(&device, std::mem::size_of::<SkinningParams>() as u64)?;
            queue.write_buffer(
                core.allocators.local.buffer(slice.block),
                slice.offset,
                bytemuck::bytes_of(slot_params),
            );
            param_slices.push(slice);
        }

        let mut joint_textures = Vec::with_capacity(FRAMES_IN_FLIGHT);
        let mut joint_views = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for i in 0..FRAMES_IN_FLIGHT {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("joint matrices {i}")),
                size: wgpu::Extent3d {
                    width: texture_dim,
                    height: texture_dim,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            joint_views.push(texture.create_view(&wgpu::TextureViewDescriptor::default()));
            joint_textures.push(texture);
        }

        Ok(Self {
            entity,
            object,
            vertex_count: packed.vertex_count,
            joint_count,
            texture_dim,
            params,
            param_slices,
            joint_textures,
            joint_views,
            bind_groups: None,
        })
    }

    /// Builds the per-frame bind groups once the scene's skin-source,
    /// vertex, and data buffers exist. Re-run after those buffers are
    /// recreated.
    pub fn attach_buffers(
        &mut self,
        core: &GpuCore,
        skin_source: &wgpu::Buffer,
        vertex_buffer: &wgpu::Buffer,
        data_buffer: &wgpu::Buffer,
    ) {
        let groups = (0..FRAMES_IN_FLIGHT)
            .map(|slot| {
                let slice = self.param_slices[slot];
                core.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("skinning bind group"),
                    layout: &core.layouts.skinning,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: skin_source.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: vertex_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: data_buffer.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(&self.joint_views[slot]),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer: core.allocators.local.buffer(slice.block),
                                offset: slice.offset,
                                size: wgpu::BufferSize::new(
                                    std::mem::size_of::<SkinningParams>() as u64
                                ),
                            }),
                        },
                    ],
                })
            })
            .collect();
        self.bind_groups = Some(groups);
    }

    #[must_use]
    pub fn bind_group(&self, slot: usize) -> Option<&wgpu::BindGroup> {
        self.bind_groups.as_ref().map(|groups| &groups[slot])
    }

    /// Returns the parameter-block slices to the pool at scene teardown.
    pub fn release(&mut self, core: &mut GpuCore) {
        for slice in self.param_slices.drain(..) {
            core.allocators.local.free(slice);
        }
    }

    /// Stages the frame's joint matrices and records the blit into the
    /// frame's joint texture. Each joint contributes its matrix and
    /// normal matrix.
    pub fn upload_joints(
        &self,
        core: &mut GpuCore,
        encoder: &mut wgpu::CommandEncoder,
        slot: usize,
        joint_matrices: &[Mat4],
    ) -> Result<()> {
        let dim = self.texture_dim;
        let mut texels: Vec<[f32; 4]> = Vec::with_capacity((dim * dim) as usize * 4);
        for matrix in joint_matrices.iter().take(self.joint_count as usize) {
            let normal_matrix = matrix.inverse().transpose();
            for col in 0..4 {
                texels.push(matrix.col(col).to_array());
            }
            for col in 0..4 {
                texels.push(normal_matrix.col(col).to_array());
            }
        }
        // Pad to whole rows
        let rows = (texels.len() as u32).div_ceil(dim).max(1);
        texels.resize((rows * dim) as usize, [0.0; 4]);

        let bytes: &[u8] = bytemuck::cast_slice(&texels);
        // 256-aligned so the offset satisfies the buffer-to-texture rules
        let offset = core.staging.stage(&core.queue, slot, bytes, 256)?;

        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: core.staging.buffer(slot),
                layout: wgpu::TexelCopyBufferLayout {
                    offset,
                    bytes_per_row: Some(dim * 16),
                    rows_per_image: Some(rows),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture: &self.joint_textures[slot],
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: dim,
                height: rows,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}
