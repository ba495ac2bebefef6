//! Scene State & Lifecycle
//!
//! Staging, finalize-time packing, per-frame buffer writes, and the
//! per-frame global bind group that makes the whole scene visible to
//! every draw.

use glam::Mat4;
use rustc_hash::FxHashMap;

use bytemuck::{Pod, Zeroable};

use crate::ecs::{ComponentLibrary, Entity};
use crate::errors::{RenderError, Result};
use crate::gpu::core::{DYNAMIC_SLOT_SIZE, DynamicArena, GpuCore};
use crate::gpu::frame::DeferredResource;
use crate::gpu::texture::TextureId;
use crate::pipeline::{
    GraphicsState, PassKind, RenderPipelineId, ShaderDefines, ShaderTemplate, ShaderVariant,
    StencilMode, VariantCache, variant_cache::PipelineTargets,
    variant_cache::position_vertex_layout,
};
use crate::scene::bindless::BindlessTables;
use crate::scene::drawable::{
    Drawable, DrawableFlags, DrawableSet, ShadowKind, VertexStreamFlags, classify_material,
    shadow_casting,
};
use crate::scene::lights::{GpuLight, GpuLightShadowData};
use crate::scene::material_table::MaterialTable;
use crate::scene::packing::{GeometryArrays, pack_mesh};
use crate::scene::probes::ProbeData;
use crate::scene::view::{
    DEPTH_FORMAT, GBUFFER_ALBEDO_FORMAT, GBUFFER_AOMR_FORMAT, GBUFFER_EMISSIVE_FORMAT,
    GBUFFER_NORMAL_FORMAT, PICK_FORMAT, RAW_OUTPUT_FORMAT, View,
};
use crate::settings::RenderSettings;
use crate::shadows::atlas::ShadowAtlas;
use crate::skinning::SkinData;
use crate::{FRAMES_IN_FLIGHT, MAX_LIGHTS, MAX_VIEWS_PER_SCENE};

/// Per-draw instance record. The shadow pass emits one per cascade/face;
/// the vertex shader picks its viewport's matrix through `viewport_index`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuInstance {
    pub transform_index: u32,
    pub viewport_index: i32,
    pub _unused: [u32; 2],
}

/// Skybox state: the prefiltered cube and its bindless slot.
pub struct Skybox {
    pub texture: TextureId,
    pub cube_slot: u32,
    pub show: bool,
}

/// One frame slot's GPU buffers.
pub struct SceneFrameData {
    pub material_buffer: wgpu::Buffer,
    material_capacity: usize,
    pub transform_buffer: wgpu::Buffer,
    transform_capacity: usize,
    pub instance_buffer: wgpu::Buffer,
    instance_capacity: usize,
    pub light_buffer: wgpu::Buffer,
    pub shadow_buffer: wgpu::Buffer,
    shadow_capacity: usize,
    pub probe_buffer: wgpu::Buffer,
    probe_capacity: usize,
    pub dynamic_buffer: wgpu::Buffer,
    dynamic_capacity: usize,
    pub dynamic_bind_group: wgpu::BindGroup,
}

fn storage_buffer(device: &wgpu::Device, label: &str, size: u64) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: size.max(16),
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

impl SceneFrameData {
    fn new(core: &GpuCore, slot: usize) -> Self {
        let device = &core.device;
        let dynamic_capacity = 256;
        let dynamic_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("dynamic data {slot}")),
            size: DYNAMIC_SLOT_SIZE * dynamic_capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let dynamic_bind_group = Self::dynamic_bind_group(core, &dynamic_buffer);
        Self {
            material_buffer: storage_buffer(device, "materials", 64 * 1024),
            material_capacity: 64 * 1024 / std::mem::size_of::<crate::scene::GpuMaterial>(),
            transform_buffer: storage_buffer(device, "transforms", 64 * 1024),
            transform_capacity: 64 * 1024 / std::mem::size_of::<Mat4>(),
            instance_buffer: storage_buffer(device, "instances", 16 * 1024),
            instance_capacity: 16 * 1024 / std::mem::size_of::<GpuInstance>(),
            light_buffer: storage_buffer(
                device,
                "lights",
                (MAX_LIGHTS * std::mem::size_of::<GpuLight>()) as u64,
            ),
            shadow_buffer: storage_buffer(
                device,
                "light shadow data",
                (16 * std::mem::size_of::<GpuLightShadowData>()) as u64,
            ),
            shadow_capacity: 16,
            probe_buffer: storage_buffer(
                device,
                "probes",
                (8 * std::mem::size_of::<crate::scene::GpuProbeData>()) as u64,
            ),
            probe_capacity: 8,
            dynamic_buffer,
            dynamic_capacity,
            dynamic_bind_group,
        }
    }

    fn dynamic_bind_group(core: &GpuCore, buffer: &wgpu::Buffer) -> wgpu::BindGroup {
        core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("dynamic data bind group"),
            layout: &core.layouts.draw_data,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(DYNAMIC_SLOT_SIZE),
                }),
            }],
        })
    }
}

/// Pipeline ids shared scene-wide rather than per drawable.
#[derive(Default)]
pub struct ScenePipelines {
    pub lighting: Option<RenderPipelineId>,
    pub env_lighting: Option<RenderPipelineId>,
    pub probe_lighting: Option<RenderPipelineId>,
    pub skybox: Option<RenderPipelineId>,
    pub probe_skybox: Option<RenderPipelineId>,
    pub tonemap: Option<RenderPipelineId>,
    pub outline_mask: Option<RenderPipelineId>,
    pub outline_edge: Option<RenderPipelineId>,
    pub skinning: Option<crate::pipeline::ComputePipelineId>,
}

/// The renderer's unit of content.
pub struct Scene {
    pub components: ComponentLibrary,

    pub(crate) arrays: GeometryArrays,
    pub(crate) drawables: DrawableSet,
    pub(crate) materials: MaterialTable,
    pub(crate) bindless: BindlessTables,
    pub(crate) variants: VariantCache,
    pub(crate) pipelines: ScenePipelines,

    // Geometry buffers (rebuilt at finalize)
    pub(crate) vertex_buffer: Option<wgpu::Buffer>,
    pub(crate) index_buffer: Option<wgpu::Buffer>,
    pub(crate) data_buffer: Option<wgpu::Buffer>,
    pub(crate) skin_source_buffer: Option<wgpu::Buffer>,

    // Per-frame slots
    pub(crate) frames: Vec<SceneFrameData>,

    // CPU mirrors, rewritten each frame
    pub(crate) transforms_cpu: Vec<Mat4>,
    pub(crate) instances_cpu: Vec<GpuInstance>,
    pub(crate) lights_cpu: Vec<GpuLight>,
    pub(crate) light_entities: Vec<Entity>,
    pub(crate) shadow_cpu: Vec<GpuLightShadowData>,
    pub(crate) probes_cpu: Vec<crate::scene::GpuProbeData>,
    pub(crate) dynamic: DynamicArena,

    pub(crate) skins: Vec<SkinData>,
    pub(crate) skin_of_entity: FxHashMap<Entity, u32>,
    pub(crate) probes: Vec<ProbeData>,
    pub(crate) atlas: ShadowAtlas,
    pub(crate) views: Vec<View>,
    pub(crate) skybox: Option<Skybox>,
    pub(crate) selected: Vec<Entity>,

    next_transform_index: u32,
    pub(crate) pick_pipeline: Option<RenderPipelineId>,
    /// Zeroed globals for passes that only read per-light matrices.
    pub(crate) shadow_globals: wgpu::Buffer,
}

impl Scene {
    pub fn new(core: &GpuCore, settings: &RenderSettings) -> Self {
        let frames = (0..FRAMES_IN_FLIGHT)
            .map(|slot| SceneFrameData::new(core, slot))
            .collect();
        Self {
            components: ComponentLibrary::new(),
            arrays: GeometryArrays::new(),
            drawables: DrawableSet::new(),
            materials: MaterialTable::new(),
            bindless: BindlessTables::new(core.dummy_2d, core.dummy_cube),
            variants: VariantCache::new(),
            pipelines: ScenePipelines::default(),
            vertex_buffer: None,
            index_buffer: None,
            data_buffer: None,
            skin_source_buffer: None,
            frames,
            transforms_cpu: Vec::new(),
            instances_cpu: Vec::new(),
            lights_cpu: Vec::new(),
            light_entities: Vec::new(),
            shadow_cpu: Vec::new(),
            probes_cpu: Vec::new(),
            dynamic: DynamicArena::new(),
            skins: Vec::new(),
            skin_of_entity: FxHashMap::default(),
            probes: Vec::new(),
            atlas: ShadowAtlas::new(
                settings.shadow_atlas_resolution,
                core.limits.max_texture_dimension_2d,
            ),
            views: Vec::new(),
            skybox: None,
            selected: Vec::new(),
            next_transform_index: 0,
            pick_pipeline: None,
            shadow_globals: core.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("shadow globals"),
                size: std::mem::size_of::<crate::scene::GpuGlobals>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        }
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn create_view(&mut self, core: &GpuCore, size: (u32, u32)) -> Result<u32> {
        if self.views.len() >= MAX_VIEWS_PER_SCENE {
            return Err(RenderError::ResourceExhausted {
                context: "views per scene",
                requested: 1,
                available: 0,
            });
        }
        self.views.push(View::new(core, size));
        Ok(self.views.len() as u32 - 1)
    }

    #[must_use]
    pub fn view(&self, index: u32) -> Option<&View> {
        self.views.get(index as usize)
    }

    pub fn view_mut(&mut self, index: u32) -> Option<&mut View> {
        self.views.get_mut(index as usize)
    }

    // ========================================================================
    // Staging & finalize
    // ========================================================================

    /// Appends entities to the staged list; packed at the next finalize.
    pub fn stage_drawables(&mut self, opaque: &[Entity], transparent: &[Entity]) {
        for &entity in opaque {
            self.drawables.stage(entity, false);
        }
        for &entity in transparent {
            self.drawables.stage(entity, true);
        }
    }

    /// Resolves the mesh/material/transform entities behind a drawable
    /// entity: either an `Object` component pair, or the components
    /// directly on the entity.
    fn resolve_object(&self, entity: Entity) -> (Entity, Entity) {
        if let Some(object) = self.components.objects.get(entity) {
            (object.mesh, object.transform)
        } else {
            (entity, entity)
        }
    }

    /// Packs every staged drawable and rebuilds the geometry buffers.
    ///
    /// Invalid drawables (missing positions, zero-joint skins) are logged
    /// and skipped; they never abort the finalize.
    pub fn finalize(&mut self, core: &mut GpuCore, settings: &RenderSettings) -> Result<()> {
        let staged: Vec<_> = self.drawables.staged.drain(..).collect();
        let mut topology_changed = false;

        for staged_drawable in staged {
            let entity = staged_drawable.entity;
            if self.drawables.index_of(entity).is_some() {
                continue;
            }
            let (mesh_entity, _transform_entity) = self.resolve_object(entity);

            let Some(mesh) = self.components.meshes.get(mesh_entity) else {
                log::warn!("drawable {entity:?} has no mesh; skipped");
                continue;
            };
            let Some(material) = self.components.materials.get(mesh_entity).cloned() else {
                log::warn!("drawable {entity:?} has no material; skipped");
                continue;
            };

            let skin_component = self.components.skins.get(mesh_entity);
            let with_skin = skin_component.is_some();

            let packed = match pack_mesh(&mut self.arrays, mesh, with_skin) {
                Ok(packed) => packed,
                Err(err) => {
                    log::warn!("drawable {entity:?} failed to pack: {err}; skipped");
                    continue;
                }
            };

            // Per-frame dynamic slices: the rest pose is duplicated once
            // per extra frame in flight so the skinning dispatch never
            // writes a region an in-flight frame still reads.
            let skin_slices = with_skin.then(|| {
                let mut slices = [crate::scene::drawable::SkinSlice {
                    vertex_offset: packed.vertex_offset,
                    data_offset: packed.data_offset,
                }; FRAMES_IN_FLIGHT];
                let stride = packed.stream_flags.stride() as usize;
                let vertex_range = packed.vertex_offset as usize
                    ..packed.vertex_offset as usize + packed.vertex_count as usize;
                let data_range = packed.data_offset as usize
                    ..packed.data_offset as usize + packed.vertex_count as usize * stride;
                for slice in slices.iter_mut().skip(1) {
                    *slice = crate::scene::drawable::SkinSlice {
                        vertex_offset: self.arrays.positions.len() as u32,
                        data_offset: self.arrays.data.len() as u32,
                    };
                    self.arrays.positions.extend_from_within(vertex_range.clone());
                    self.arrays.data.extend_from_within(data_range.clone());
                }
                slices
            });

            // Skin record
            let skin_index = if let Some(skin) = skin_component {
                let joint_count = skin.joints.len() as u32;
                let slices = skin_slices.expect("skinned drawables have slices");
                match SkinData::new(core, mesh_entity, entity, &packed, joint_count, &slices) {
                    Ok(skin_data) => {
                        let index = self.skins.len() as u32;
                        self.skins.push(skin_data);
                        self.skin_of_entity.insert(entity, index);
                        Some(index)
                    }
                    Err(err) => {
                        log::warn!("drawable {entity:?} skin rejected: {err}");
                        None
                    }
                }
            } else {
                None
            };

            // Material record: texture slots resolve through the bindless
            // table, absent slots to the dummy.
            let bindless = &mut self.bindless;
            let registry = &core.registry;
            let material_index = self.materials.get_or_insert(mesh_entity, &material, |slot| {
                slot.and_then(|t| {
                    registry
                        .contains(t.texture)
                        .then(|| bindless.index_2d(t.texture).ok())
                        .flatten()
                })
                .unwrap_or(0)
            });

            let mut flags = classify_material(&material);
            if staged_drawable.transparent {
                flags = DrawableFlags::FORWARD;
            }
            if mesh.include_in_probes {
                flags |= DrawableFlags::PROBE;
            }

            let transform_index = self.next_transform_index;
            self.next_transform_index += 1;

            let drawable_index = self.drawables.drawables.len() as u32;
            let drawable = Drawable {
                entity,
                flags,
                data_offset: packed.data_offset,
                vertex_offset: packed.vertex_offset,
                vertex_count: packed.vertex_count,
                index_offset: packed.index_offset,
                index_count: packed.index_count,
                material_index,
                transform_index,
                instance_index: 0,
                instance_count: 1,
                stream_flags: packed.stream_flags,
                triangle_count: packed.index_count / 3,
                skin_index,
                skin_slices,
                cast_shadow: shadow_casting(&material).is_some(),
                double_sided: material.double_sided,
                blend_mode: material.blend_mode,
                shader: None,
                env_shader: None,
                shadow_shader: None,
            };

            if flags.contains(DrawableFlags::PROBE) {
                self.drawables.probe_drawables.push(drawable_index);
            }
            match shadow_casting(&material) {
                Some(ShadowKind::Opaque) => self.drawables.shadow_deferred.push(drawable_index),
                Some(ShadowKind::AlphaTested) => {
                    self.drawables.shadow_forward.push(drawable_index);
                }
                None => {}
            }

            self.drawables.by_entity.insert(entity, drawable_index);
            self.drawables.drawables.push(drawable);
            topology_changed = true;
        }

        if topology_changed {
            self.upload_geometry(core);
        }

        // New probe components get their GPU state on first finalize
        let probe_entities: Vec<(Entity, crate::ecs::EnvironmentProbe)> = self
            .components
            .probes
            .iter()
            .map(|(e, p)| (e, *p))
            .collect();
        for (entity, component) in probe_entities {
            if self.probes.iter().any(|p| p.entity == entity) {
                continue;
            }
            let position = self
                .components
                .transforms
                .get(entity)
                .map_or(glam::Vec3::ZERO, |t| t.world.w_axis.truncate());
            let probe = ProbeData::new(core, &mut self.bindless, entity, &component, position)?;
            self.probes.push(probe);
        }

        if topology_changed {
            // A topology change invalidates every captured face.
            for probe in &mut self.probes {
                probe.mark_all_faces_dirty();
            }
        }

        self.resolve_drawable_pipelines(core, settings);
        self.resolve_scene_pipelines(core, settings);
        self.materials.mark_dirty();
        self.transforms_cpu
            .resize(self.next_transform_index as usize, Mat4::IDENTITY);
        Ok(())
    }

    /// Uploads the packed arrays into fresh geometry buffers and
    /// re-attaches skin bind groups.
    fn upload_geometry(&mut self, core: &mut GpuCore) {
        let frame = core.frame_ring.frame_number();
        for old in [
            self.vertex_buffer.take(),
            self.index_buffer.take(),
            self.data_buffer.take(),
            self.skin_source_buffer.take(),
        ]
        .into_iter()
        .flatten()
        {
            core.frame_ring
                .deletion_queue
                .defer(frame, DeferredResource::Buffer(old));
        }

        let device = core.device.clone();
        let queue = core.queue.clone();
        let vertex_buffer = core.allocators.create_local_buffer(
            &device,
            &queue,
            "scene vertex buffer",
            wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE,
            bytemuck::cast_slice(&self.arrays.positions),
        );
        let index_buffer = core.allocators.create_local_buffer(
            &device,
            &queue,
            "scene index buffer",
            wgpu::BufferUsages::INDEX,
            bytemuck::cast_slice(&self.arrays.indices),
        );
        let data_buffer = core.allocators.create_local_buffer(
            &device,
            &queue,
            "scene data buffer",
            wgpu::BufferUsages::STORAGE,
            bytemuck::cast_slice(&self.arrays.data),
        );
        let skin_source_buffer = core.allocators.create_local_buffer(
            &device,
            &queue,
            "scene skin source buffer",
            wgpu::BufferUsages::STORAGE,
            bytemuck::cast_slice(&self.arrays.skin_data),
        );

        for skin in &mut self.skins {
            skin.attach_buffers(core, &skin_source_buffer, &vertex_buffer, &data_buffer);
        }

        self.vertex_buffer = Some(vertex_buffer);
        self.index_buffer = Some(index_buffer);
        self.data_buffer = Some(data_buffer);
        self.skin_source_buffer = Some(skin_source_buffer);
    }

    // ========================================================================
    // Pipeline variant resolution
    // ========================================================================

    fn drawable_defines(&self, drawable: &Drawable, settings: &RenderSettings) -> ShaderDefines {
        let mut defines = ShaderDefines::new();
        defines.set("MAX_LIGHTS", MAX_LIGHTS as i64);
        defines.set(
            "MAX_BINDLESS_TEXTURES",
            i64::from(crate::MAX_BINDLESS_TEXTURES),
        );
        defines.set(
            "MAX_BINDLESS_CUBE_TEXTURES",
            i64::from(crate::MAX_BINDLESS_CUBE_TEXTURES),
        );
        defines.set("DATA_STRIDE", i64::from(drawable.stream_flags.stride()));

        let flags = drawable.stream_flags;
        if flags.contains(VertexStreamFlags::NORMAL) {
            defines.flag("HAS_NORMAL");
            defines.set(
                "NORMAL_OFFSET",
                i64::from(flags.offset_of(VertexStreamFlags::NORMAL).unwrap_or(0)),
            );
        }
        if flags.contains(VertexStreamFlags::TANGENT) {
            defines.flag("HAS_TANGENT");
            defines.set(
                "TANGENT_OFFSET",
                i64::from(flags.offset_of(VertexStreamFlags::TANGENT).unwrap_or(0)),
            );
        }
        if flags.contains(VertexStreamFlags::UV0) {
            defines.flag("HAS_UV0");
            defines.set(
                "UV0_OFFSET",
                i64::from(flags.offset_of(VertexStreamFlags::UV0).unwrap_or(0)),
            );
        }
        if flags.contains(VertexStreamFlags::COLOR0) {
            defines.flag("HAS_COLOR0");
            defines.set(
                "COLOR0_OFFSET",
                i64::from(flags.offset_of(VertexStreamFlags::COLOR0).unwrap_or(0)),
            );
        }
        if drawable.blend_mode == crate::ecs::BlendMode::AlphaMask {
            defines.flag("ALPHA_MASK");
        }
        if settings.punctual_lighting {
            defines.flag("USE_PUNCTUAL");
        }
        if settings.image_based_lighting {
            defines.flag("USE_IBL");
            if !self.probes.is_empty() {
                defines.flag("USE_PROBES");
            }
        }
        defines.flag("USE_SHADOWS");
        defines
    }

    /// Compiles (or finds) the per-drawable pipeline variants for the
    /// main, probe, and shadow passes.
    fn resolve_drawable_pipelines(&mut self, core: &GpuCore, settings: &RenderSettings) {
        let gbuffer_formats = [
            GBUFFER_ALBEDO_FORMAT,
            GBUFFER_NORMAL_FORMAT,
            GBUFFER_AOMR_FORMAT,
            GBUFFER_EMISSIVE_FORMAT,
        ];
        let layouts = [&core.layouts.global, &core.layouts.draw_data];
        let vertex_layouts = [position_vertex_layout()];

        for i in 0..self.drawables.drawables.len() {
            let drawable = self.drawables.drawables[i].clone();
            let defines = self.drawable_defines(&drawable, settings);
            let cull = if drawable.double_sided {
                None
            } else {
                Some(wgpu::Face::Back)
            };

            let shader = if drawable.flags.contains(DrawableFlags::DEFERRED) {
                let variant = ShaderVariant {
                    template: ShaderTemplate::Deferred,
                    state: GraphicsState {
                        cull_mode: cull,
                        ..GraphicsState::opaque(PassKind::Deferred)
                    },
                    defines: defines.clone(),
                };
                self.variants.get_or_create_render(
                    &core.device,
                    &core.shaders,
                    &variant,
                    &PipelineTargets {
                        color_formats: &gbuffer_formats,
                        depth_format: Some(DEPTH_FORMAT),
                        ..PipelineTargets::default()
                    },
                    &layouts,
                    &vertex_layouts,
                )
            } else {
                let transparent = drawable.blend_mode == crate::ecs::BlendMode::Blend;
                let variant = ShaderVariant {
                    template: ShaderTemplate::Forward,
                    state: GraphicsState {
                        cull_mode: cull,
                        blend: drawable.blend_mode,
                        depth_write: !transparent,
                        ..GraphicsState::opaque(PassKind::Forward)
                    },
                    defines: defines.clone(),
                };
                self.variants.get_or_create_render(
                    &core.device,
                    &core.shaders,
                    &variant,
                    &PipelineTargets {
                        color_formats: &[RAW_OUTPUT_FORMAT],
                        depth_format: Some(DEPTH_FORMAT),
                        ..PipelineTargets::default()
                    },
                    &layouts,
                    &vertex_layouts,
                )
            };

            // Probe captures run the same graph as a view: opaque PROBE
            // drawables through the face's G-buffer, forward ones into
            // the face's raw output with their blend state.
            let env_shader = if drawable.flags.contains(DrawableFlags::PROBE) {
                let deferred = drawable.flags.contains(DrawableFlags::DEFERRED);
                let variant = if deferred {
                    ShaderVariant {
                        template: ShaderTemplate::Deferred,
                        state: GraphicsState {
                            cull_mode: cull,
                            ..GraphicsState::opaque(PassKind::Probe)
                        },
                        defines: defines.clone(),
                    }
                } else {
                    let transparent = drawable.blend_mode == crate::ecs::BlendMode::Blend;
                    ShaderVariant {
                        template: ShaderTemplate::Forward,
                        state: GraphicsState {
                            cull_mode: cull,
                            blend: drawable.blend_mode,
                            depth_write: !transparent,
                            ..GraphicsState::opaque(PassKind::Probe)
                        },
                        defines: defines.clone(),
                    }
                };
                let targets = if deferred {
                    PipelineTargets {
                        color_formats: &gbuffer_formats,
                        depth_format: Some(DEPTH_FORMAT),
                        ..PipelineTargets::default()
                    }
                } else {
                    PipelineTargets {
                        color_formats: &[RAW_OUTPUT_FORMAT],
                        depth_format: Some(DEPTH_FORMAT),
                        ..PipelineTargets::default()
                    }
                };
                Some(self.variants.get_or_create_render(
                    &core.device,
                    &core.shaders,
                    &variant,
                    &targets,
                    &layouts,
                    &vertex_layouts,
                ))
            } else {
                None
            };

            let shadow_shader = if drawable.cast_shadow {
                let alpha = drawable.blend_mode == crate::ecs::BlendMode::AlphaMask;
                let mut shadow_defines = defines.clone();
                if alpha {
                    shadow_defines.flag("ALPHA_MASK");
                }
                let variant = ShaderVariant {
                    template: ShaderTemplate::Shadow,
                    state: GraphicsState {
                        cull_mode: cull,
                        ..GraphicsState::opaque(PassKind::Shadow)
                    },
                    defines: shadow_defines,
                };
                Some(self.variants.get_or_create_render(
                    &core.device,
                    &core.shaders,
                    &variant,
                    &PipelineTargets {
                        color_formats: &[],
                        depth_format: Some(crate::shadows::atlas::SHADOW_ATLAS_FORMAT),
                        depth_bias: wgpu::DepthBiasState {
                            constant: settings.shadow_constant_depth_bias,
                            slope_scale: settings.shadow_slope_depth_bias,
                            clamp: 0.0,
                        },
                        ..PipelineTargets::default()
                    },
                    &layouts,
                    &vertex_layouts,
                ))
            } else {
                None
            };

            let drawable = &mut self.drawables.drawables[i];
            drawable.shader = Some(shader);
            drawable.env_shader = env_shader;
            drawable.shadow_shader = shadow_shader;
        }
    }

    /// Compiles the pass pipelines shared scene-wide: deferred lighting
    /// (with and without probe IBL), skybox, tonemap, pick, outlines, and
    /// the skinning compute shader.
    fn resolve_scene_pipelines(&mut self, core: &GpuCore, settings: &RenderSettings) {
        let mut base_defines = ShaderDefines::new();
        base_defines.set("MAX_LIGHTS", MAX_LIGHTS as i64);
        base_defines.set(
            "MAX_BINDLESS_TEXTURES",
            i64::from(crate::MAX_BINDLESS_TEXTURES),
        );
        base_defines.set(
            "MAX_BINDLESS_CUBE_TEXTURES",
            i64::from(crate::MAX_BINDLESS_CUBE_TEXTURES),
        );
        if settings.punctual_lighting {
            base_defines.flag("USE_PUNCTUAL");
        }
        if settings.image_based_lighting {
            base_defines.flag("USE_IBL");
        }
        base_defines.flag("USE_SHADOWS");

        let geometry_layouts = [&core.layouts.global, &core.layouts.draw_data];
        let lighting_layouts = [&core.layouts.global, &core.layouts.lighting_inputs];
        let vertex_layouts = [position_vertex_layout()];

        let fullscreen_state = GraphicsState {
            depth_write: false,
            depth_compare: wgpu::CompareFunction::Always,
            cull_mode: None,
            ..GraphicsState::opaque(PassKind::Post)
        };

        let lighting_variant = ShaderVariant {
            template: ShaderTemplate::Lighting,
            state: fullscreen_state,
            defines: base_defines.clone(),
        };
        let lighting = self.variants.get_or_create_render(
            &core.device,
            &core.shaders,
            &lighting_variant,
            &PipelineTargets {
                color_formats: &[RAW_OUTPUT_FORMAT],
                ..PipelineTargets::default()
            },
            &lighting_layouts,
            &[],
        );
        self.pipelines.lighting = Some(lighting);
        self.pipelines.probe_lighting = Some(lighting);

        let mut env_defines = base_defines.clone();
        env_defines.flag("USE_PROBES");
        let env_variant = ShaderVariant {
            template: ShaderTemplate::Lighting,
            state: fullscreen_state,
            defines: env_defines,
        };
        self.pipelines.env_lighting = Some(self.variants.get_or_create_render(
            &core.device,
            &core.shaders,
            &env_variant,
            &PipelineTargets {
                color_formats: &[RAW_OUTPUT_FORMAT],
                ..PipelineTargets::default()
            },
            &lighting_layouts,
            &[],
        ));

        let skybox_variant = ShaderVariant {
            template: ShaderTemplate::Skybox,
            state: GraphicsState {
                depth_write: false,
                depth_compare: wgpu::CompareFunction::LessEqual,
                cull_mode: None,
                ..GraphicsState::opaque(PassKind::Forward)
            },
            defines: base_defines.clone(),
        };
        let skybox = self.variants.get_or_create_render(
            &core.device,
            &core.shaders,
            &skybox_variant,
            &PipelineTargets {
                color_formats: &[RAW_OUTPUT_FORMAT],
                depth_format: Some(DEPTH_FORMAT),
                ..PipelineTargets::default()
            },
            &geometry_layouts,
            &[],
        );
        self.pipelines.skybox = Some(skybox);
        self.pipelines.probe_skybox = Some(skybox);

        let tonemap_variant = ShaderVariant {
            template: ShaderTemplate::Tonemap,
            state: fullscreen_state,
            defines: ShaderDefines::new(),
        };
        self.pipelines.tonemap = Some(self.variants.get_or_create_render(
            &core.device,
            &core.shaders,
            &tonemap_variant,
            &PipelineTargets {
                color_formats: &[crate::scene::view::FINAL_FORMAT],
                ..PipelineTargets::default()
            },
            &[&core.layouts.tonemap_input],
            &[],
        ));

        let pick_variant = ShaderVariant {
            template: ShaderTemplate::Pick,
            state: GraphicsState::opaque(PassKind::Pick),
            defines: base_defines.clone(),
        };
        self.pick_pipeline = Some(self.variants.get_or_create_render(
            &core.device,
            &core.shaders,
            &pick_variant,
            &PipelineTargets {
                color_formats: &[PICK_FORMAT],
                depth_format: Some(DEPTH_FORMAT),
                ..PipelineTargets::default()
            },
            &geometry_layouts,
            &vertex_layouts,
        ));

        // Outline: a stencil-only mask draw, then the scaled edge draw
        // that passes only outside the mask.
        let mut mask_defines = base_defines.clone();
        mask_defines.flag("MASK");
        let mask_variant = ShaderVariant {
            template: ShaderTemplate::Outline,
            state: GraphicsState {
                depth_write: false,
                stencil: StencilMode::AlwaysReplace,
                color_writes: false,
                cull_mode: None,
                ..GraphicsState::opaque(PassKind::Forward)
            },
            defines: mask_defines,
        };
        self.pipelines.outline_mask = Some(self.variants.get_or_create_render(
            &core.device,
            &core.shaders,
            &mask_variant,
            &PipelineTargets {
                color_formats: &[RAW_OUTPUT_FORMAT],
                depth_format: Some(DEPTH_FORMAT),
                ..PipelineTargets::default()
            },
            &geometry_layouts,
            &vertex_layouts,
        ));

        let mut edge_defines = base_defines.clone();
        edge_defines.flag("EDGE");
        let edge_variant = ShaderVariant {
            template: ShaderTemplate::Outline,
            state: GraphicsState {
                depth_write: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: StencilMode::TestGreaterEqual,
                cull_mode: None,
                ..GraphicsState::opaque(PassKind::Forward)
            },
            defines: edge_defines,
        };
        self.pipelines.outline_edge = Some(self.variants.get_or_create_render(
            &core.device,
            &core.shaders,
            &edge_variant,
            &PipelineTargets {
                color_formats: &[RAW_OUTPUT_FORMAT],
                depth_format: Some(DEPTH_FORMAT),
                ..PipelineTargets::default()
            },
            &geometry_layouts,
            &vertex_layouts,
        ));

        if self.pipelines.skinning.is_none() && !self.skins.is_empty() {
            match self.variants.get_or_create_compute(
                &core.device,
                &core.shaders,
                ShaderTemplate::Skinning,
                &ShaderDefines::new(),
                &[&core.layouts.skinning],
            ) {
                Ok(id) => self.pipelines.skinning = Some(id),
                Err(err) => log::error!("skinning shader failed to compile: {err}"),
            }
        }
    }

    // ========================================================================
    // Materials
    // ========================================================================

    /// Re-mirrors the given entities' material components and marks the
    /// table for re-upload.
    pub fn update_materials(&mut self, core: &GpuCore, entities: &[Entity]) {
        for &entity in entities {
            let Some(material) = self.components.materials.get(entity).cloned() else {
                continue;
            };
            let bindless = &mut self.bindless;
            let registry = &core.registry;
            self.materials.update(entity, &material, |slot| {
                slot.and_then(|t| {
                    registry
                        .contains(t.texture)
                        .then(|| bindless.index_2d(t.texture).ok())
                        .flatten()
                })
                .unwrap_or(0)
            });
        }
    }

    /// Replaces the outline selection set.
    pub fn select_entities(&mut self, entities: &[Entity]) {
        self.selected = entities.to_vec();
    }

    // ========================================================================
    // Per-frame writes
    // ========================================================================

    /// Rewrites the frame slot's transform array from the component
    /// snapshot and uploads lights, probes, and (when dirty) materials.
    pub fn write_frame_data(&mut self, core: &mut GpuCore, slot: usize) -> Result<()> {
        // Transforms, one per drawable, indexed by transform_index
        for drawable in &self.drawables.drawables {
            let (_, transform_entity) = if let Some(object) =
                self.components.objects.get(drawable.entity)
            {
                (object.mesh, object.transform)
            } else {
                (drawable.entity, drawable.entity)
            };
            let world = self.components.world_matrix(transform_entity);
            self.transforms_cpu[drawable.transform_index as usize] = world;
        }

        // Lights
        self.lights_cpu.clear();
        self.light_entities.clear();
        for (entity, light) in self.components.lights.iter() {
            if self.lights_cpu.len() >= MAX_LIGHTS {
                log::warn!("more than {MAX_LIGHTS} lights; extras ignored this frame");
                break;
            }
            self.lights_cpu.push(GpuLight::from_component(light));
            self.light_entities.push(entity);
        }

        // Probe records
        self.probes_cpu.clear();
        for probe in &self.probes {
            self.probes_cpu.push(probe.gpu_record());
        }

        self.ensure_frame_capacity(core, slot);

        let frame = &self.frames[slot];
        let queue = &core.queue;
        if !self.transforms_cpu.is_empty() {
            queue.write_buffer(
                &frame.transform_buffer,
                0,
                bytemuck::cast_slice(&self.transforms_cpu),
            );
        }
        if !self.probes_cpu.is_empty() {
            queue.write_buffer(&frame.probe_buffer, 0, bytemuck::cast_slice(&self.probes_cpu));
        }
        if self.materials.is_dirty() && !self.materials.is_empty() {
            queue.write_buffer(
                &frame.material_buffer,
                0,
                bytemuck::cast_slice(self.materials.records()),
            );
        }
        Ok(())
    }

    /// Uploads the frame's lights, shadow records, and instance array.
    /// Runs after shadow preparation so the light records carry their
    /// final shadow indices.
    pub fn write_shadow_frame_data(&mut self, core: &mut GpuCore, slot: usize) {
        self.ensure_frame_capacity(core, slot);
        let frame = &self.frames[slot];
        if !self.lights_cpu.is_empty() {
            core.queue.write_buffer(
                &frame.light_buffer,
                0,
                bytemuck::cast_slice(&self.lights_cpu),
            );
        }
        if !self.shadow_cpu.is_empty() {
            core.queue.write_buffer(
                &frame.shadow_buffer,
                0,
                bytemuck::cast_slice(&self.shadow_cpu),
            );
        }
        if !self.instances_cpu.is_empty() {
            core.queue.write_buffer(
                &frame.instance_buffer,
                0,
                bytemuck::cast_slice(&self.instances_cpu),
            );
        }
    }

    /// Uploads the frame's dynamic-data arena.
    pub fn write_dynamic_data(&mut self, core: &mut GpuCore, slot: usize) {
        self.ensure_frame_capacity(core, slot);
        let frame = &self.frames[slot];
        if self.dynamic.slot_count() > 0 {
            core.queue
                .write_buffer(&frame.dynamic_buffer, 0, self.dynamic.bytes());
        }
    }

    /// Pre-grows the frame's dynamic buffer for the draws about to be
    /// recorded. Growth must happen before any pass captures the frame's
    /// bind groups; a mid-frame growth would leave recorded draws reading
    /// the retired buffer.
    pub(crate) fn ensure_dynamic_capacity(&mut self, core: &mut GpuCore, slot: usize, slots: usize) {
        let frame = &mut self.frames[slot];
        if slots <= frame.dynamic_capacity {
            return;
        }
        let new_capacity = slots.next_power_of_two();
        let new_buffer = core.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("dynamic data"),
            size: DYNAMIC_SLOT_SIZE * new_capacity as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let old = std::mem::replace(&mut frame.dynamic_buffer, new_buffer);
        core.frame_ring
            .deletion_queue
            .defer(core.frame_ring.frame_number(), DeferredResource::Buffer(old));
        frame.dynamic_bind_group = SceneFrameData::dynamic_bind_group(core, &frame.dynamic_buffer);
        frame.dynamic_capacity = new_capacity;
    }

    /// Upper bound on dynamic slots the frame's passes can record.
    #[must_use]
    pub(crate) fn dynamic_slot_estimate(&self) -> usize {
        let drawables = self.drawables.drawables.len();
        let casters = self.drawables.shadow_deferred.len() + self.drawables.shadow_forward.len();
        let shadow_draws = self.atlas.rects.len() * casters;
        let per_view = drawables * 2 + self.selected.len() * 2 + 2;
        let probe_draws = self.probes.len() * 6 * (self.drawables.probe_drawables.len() + 1);
        shadow_draws + MAX_VIEWS_PER_SCENE * per_view + probe_draws + 16
    }

    /// Grows any frame buffer whose CPU mirror outgrew it, re-deriving the
    /// dependent bind groups.
    pub(crate) fn ensure_frame_capacity(&mut self, core: &mut GpuCore, slot: usize) {
        fn grow(
            device: &wgpu::Device,
            deletions: &mut crate::gpu::frame::DeletionQueue,
            frame_number: u64,
            buffer: &mut wgpu::Buffer,
            capacity: &mut usize,
            needed: usize,
            element: usize,
            label: &str,
        ) {
            if needed <= *capacity {
                return;
            }
            let new_capacity = needed.next_power_of_two();
            let new_buffer = storage_buffer(device, label, (new_capacity * element) as u64);
            let old = std::mem::replace(buffer, new_buffer);
            deletions.defer(frame_number, DeferredResource::Buffer(old));
            *capacity = new_capacity;
        }

        let device = core.device.clone();
        let frame_number = core.frame_ring.frame_number();
        let deletions = &mut core.frame_ring.deletion_queue;
        let frame = &mut self.frames[slot];

        grow(
            &device,
            deletions,
            frame_number,
            &mut frame.material_buffer,
            &mut frame.material_capacity,
            self.materials.len(),
            std::mem::size_of::<crate::scene::GpuMaterial>(),
            "materials",
        );
        grow(
            &device,
            deletions,
            frame_number,
            &mut frame.transform_buffer,
            &mut frame.transform_capacity,
            self.transforms_cpu.len(),
            std::mem::size_of::<Mat4>(),
            "transforms",
        );
        grow(
            &device,
            deletions,
            frame_number,
            &mut frame.instance_buffer,
            &mut frame.instance_capacity,
            self.instances_cpu.len(),
            std::mem::size_of::<GpuInstance>(),
            "instances",
        );
        grow(
            &device,
            deletions,
            frame_number,
            &mut frame.shadow_buffer,
            &mut frame.shadow_capacity,
            self.shadow_cpu.len(),
            std::mem::size_of::<GpuLightShadowData>(),
            "light shadow data",
        );
        grow(
            &device,
            deletions,
            frame_number,
            &mut frame.probe_buffer,
            &mut frame.probe_capacity,
            self.probes_cpu.len(),
            std::mem::size_of::<crate::scene::GpuProbeData>(),
            "probes",
        );

        // Dynamic buffer is uniform, not storage
        let needed_slots = self.dynamic.slot_count();
        if needed_slots > frame.dynamic_capacity {
            let new_capacity = needed_slots.next_power_of_two();
            let new_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("dynamic data"),
                size: DYNAMIC_SLOT_SIZE * new_capacity as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let old = std::mem::replace(&mut frame.dynamic_buffer, new_buffer);
            deletions.defer(frame_number, DeferredResource::Buffer(old));
            frame.dynamic_bind_group = SceneFrameData::dynamic_bind_group(core, &frame.dynamic_buffer);
            frame.dynamic_capacity = new_capacity;
        }
    }

    // ========================================================================
    // Global bind group
    // ========================================================================

    /// Builds the frame's global bind group against a globals buffer (a
    /// view's, or a probe face's). Bindless array entries beyond the live
    /// count are padded with the dummy texture.
    pub fn build_global_bind_group(
        &self,
        core: &GpuCore,
        slot: usize,
        globals: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        let dummy_2d = &core
            .registry
            .get(core.dummy_2d)
            .expect("dummy registered")
            .view;
        let dummy_cube = &core
            .registry
            .get(core.dummy_cube)
            .expect("dummy registered")
            .view;

        let mut views_2d: Vec<&wgpu::TextureView> =
            Vec::with_capacity(crate::MAX_BINDLESS_TEXTURES as usize);
        for id in self.bindless.slots_2d() {
            views_2d.push(core.registry.get(*id).map_or(dummy_2d, |t| &t.view));
        }
        views_2d.resize(crate::MAX_BINDLESS_TEXTURES as usize, dummy_2d);

        let mut views_cube: Vec<&wgpu::TextureView> =
            Vec::with_capacity(crate::MAX_BINDLESS_CUBE_TEXTURES as usize);
        for id in self.bindless.slots_cube() {
            views_cube.push(core.registry.get(*id).map_or(dummy_cube, |t| &t.view));
        }
        views_cube.resize(crate::MAX_BINDLESS_CUBE_TEXTURES as usize, dummy_cube);

        let atlas_view = self
            .atlas
            .sampled_view
            .as_ref()
            .unwrap_or(&core.dummy_depth_view);

        let frame = &self.frames[slot];
        let empty = core.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("empty storage"),
            size: 16,
            usage: wgpu::BufferUsages::STORAGE,
            mapped_at_creation: false,
        });
        let data_buffer = self.data_buffer.as_ref().unwrap_or(&empty);

        core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("global bind group"),
            layout: &core.layouts.global,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: globals.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: frame.material_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: frame.transform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: frame.instance_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: frame.light_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: frame.shadow_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: frame.probe_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: data_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureViewArray(&views_2d),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::TextureViewArray(&views_cube),
                },
                wgpu::BindGroupEntry {
                    binding: 10,
                    resource: wgpu::BindingResource::Sampler(&core.samplers.default),
                },
                wgpu::BindGroupEntry {
                    binding: 11,
                    resource: wgpu::BindingResource::Sampler(&core.samplers.shadow),
                },
                wgpu::BindGroupEntry {
                    binding: 12,
                    resource: wgpu::BindingResource::Sampler(&core.samplers.env),
                },
                wgpu::BindGroupEntry {
                    binding: 13,
                    resource: wgpu::BindingResource::TextureView(atlas_view),
                },
            ],
        })
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Releases the scene's GPU state. The caller flushes the device
    /// first.
    pub fn release(&mut self, core: &mut GpuCore) {
        self.variants.clear();
        self.bindless.clear();
        self.vertex_buffer = None;
        self.index_buffer = None;
        self.data_buffer = None;
        self.skin_source_buffer = None;
        self.atlas.release();
        for probe in &self.probes {
            core.registry.remove(probe.lambertian);
            core.registry.remove(probe.ggx);
            core.registry.remove(probe.brdf_lut);
        }
        self.probes.clear();
        for skin in &mut self.skins {
            skin.release(core);
        }
        self.skins.clear();
        self.views.clear();
    }
}
