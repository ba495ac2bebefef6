//! Environment Probes
//!
//! A probe captures the scene around a point into a cubemap and
//! prefilters it for IBL: a lambertian irradiance cube, a GGX specular
//! chain with one roughness per mip, and the split-sum BRDF LUT. Faces
//! render through the same G-buffer + lighting graph as a view,
//! restricted to PROBE drawables, and are time-sliced by the probe's
//! update interval.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::ecs::{Entity, EnvironmentProbe, ProbeFlags};
use crate::gpu::core::GpuCore;
use crate::gpu::texture::{GpuTexture, TextureId, create_cube_texture};
use crate::scene::view::{
    GBUFFER_ALBEDO_FORMAT, GBUFFER_AOMR_FORMAT, GBUFFER_EMISSIVE_FORMAT, GBUFFER_NORMAL_FORMAT,
    RAW_OUTPUT_FORMAT,
};

/// GGX mip chain length for a cube of `size`: the final prefilter
/// dispatch covers a 16×16 mip.
#[must_use]
pub fn ggx_mip_count(size: u32) -> u32 {
    size.max(16).ilog2().saturating_sub(3).max(1)
}

/// BRDF integration LUT resolution.
pub const BRDF_LUT_SIZE: u32 = 512;

/// Probe record in the per-frame probe buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuProbeData {
    pub position: Vec3,
    pub range_sqr: f32,

    pub lambertian_index: u32,
    pub ggx_index: u32,
    pub brdf_lut_index: u32,
    pub parallax_correction: i32,

    pub aabb_min: Vec4,
    pub aabb_max: Vec4,
}

/// Parameters of one prefilter dispatch, mirroring the compute shader's
/// uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct EnvFilterParams {
    pub resolution: i32,
    pub roughness: f32,
    pub sample_count: i32,
    pub width: i32,
    /// 0 lambertian, 1 GGX.
    pub distribution: i32,
    pub mip_level: i32,
    pub _unused: [i32; 2],
}

/// Cube render target with one attachment view per face.
pub struct ProbeTarget {
    pub texture: wgpu::Texture,
    pub face_views: [wgpu::TextureView; 6],
}

fn create_probe_target(
    device: &wgpu::Device,
    size: u32,
    format: wgpu::TextureFormat,
    label: &str,
) -> ProbeTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 6,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let face_views = std::array::from_fn(|face| {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(label),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: face as u32,
            array_layer_count: Some(1),
            ..Default::default()
        })
    });
    ProbeTarget {
        texture,
        face_views,
    }
}

/// CPU-side state of one probe.
pub struct ProbeData {
    pub entity: Entity,
    pub resolution: u32,
    pub sample_count: u32,
    pub update_interval: u32,
    pub flags: ProbeFlags,
    pub position: Vec3,
    pub range: f32,
    pub extents: Vec3,

    // Capture targets
    pub albedo: ProbeTarget,
    pub normal: ProbeTarget,
    pub ao_metal_roughness: ProbeTarget,
    pub emissive: ProbeTarget,
    pub raw_output: ProbeTarget,
    pub depth: ProbeTarget,
    pub depth_sampled_faces: [wgpu::TextureView; 6],
    /// G-buffer inputs per face, for the probe's lighting pass.
    pub lighting_bind_groups: [wgpu::BindGroup; 6],
    /// Per-face camera globals (static per face until the probe moves).
    pub face_globals: [wgpu::Buffer; 6],

    // Prefiltered outputs
    pub capture_cube_view: wgpu::TextureView,
    pub lambertian: TextureId,
    pub lambertian_slot: u32,
    pub ggx: TextureId,
    pub ggx_slot: u32,
    pub brdf_lut: TextureId,
    pub brdf_lut_slot: u32,
    pub ggx_mip_count: u32,

    // Scheduling
    pub current_face: u32,
    pub faces_dirty: [bool; 6],
    /// Set once the LUT and irradiance dispatches have run.
    pub static_filters_done: bool,

    // Per-face visible lists
    pub visible_opaque: [Vec<u32>; 6],
    pub visible_transparent: [Vec<u32>; 6],
}

impl ProbeData {
    /// Allocates the probe's capture targets and prefiltered outputs, and
    /// claims their bindless cube slots.
    pub fn new(
        core: &mut GpuCore,
        bindless: &mut crate::scene::bindless::BindlessTables,
        entity: Entity,
        component: &EnvironmentProbe,
        position: Vec3,
    ) -> crate::errors::Result<Self> {
        let device = &core.device;
        let size = component.resolution.max(16).next_power_of_two();
        let mips = ggx_mip_count(size);

        let albedo = create_probe_target(device, size, GBUFFER_ALBEDO_FORMAT, "probe albedo");
        let normal = create_probe_target(device, size, GBUFFER_NORMAL_FORMAT, "probe normal");
        let ao_metal_roughness =
            create_probe_target(device, size, GBUFFER_AOMR_FORMAT, "probe ao-metal-roughness");
        let emissive = create_probe_target(device, size, GBUFFER_EMISSIVE_FORMAT, "probe emissive");
        let raw_output = create_probe_target(device, size, RAW_OUTPUT_FORMAT, "probe raw output");
        let depth = create_probe_target(
            device,
            size,
            wgpu::TextureFormat::Depth32FloatStencil8,
            "probe depth",
        );
        let depth_sampled_faces = std::array::from_fn(|face| {
            depth.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("probe depth sampled"),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: face as u32,
                array_layer_count: Some(1),
                aspect: wgpu::TextureAspect::DepthOnly,
                ..Default::default()
            })
        });

        let lighting_bind_groups = std::array::from_fn(|face| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("probe lighting inputs"),
                layout: &core.layouts.lighting_inputs,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&albedo.face_views[face]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&normal.face_views[face]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(
                            &ao_metal_roughness.face_views[face],
                        ),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(&emissive.face_views[face]),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(&depth_sampled_faces[face]),
                    },
                ],
            })
        });

        let face_globals = std::array::from_fn(|face| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("probe face globals {face}")),
                size: std::mem::size_of::<crate::scene::view::GpuGlobals>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let capture_cube_view = raw_output.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("probe capture cube"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            ..Default::default()
        });

        let storage_cube_usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_DST;
        let lambertian = core.registry.insert(create_cube_texture(
            device,
            size,
            1,
            wgpu::TextureFormat::Rgba16Float,
            storage_cube_usage,
            "probe lambertian",
        ));
        let ggx = core.registry.insert(create_cube_texture(
            device,
            size,
            mips,
            wgpu::TextureFormat::Rgba16Float,
            storage_cube_usage,
            "probe ggx",
        ));
        let brdf_lut_tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("brdf lut"),
            size: wgpu::Extent3d {
                width: BRDF_LUT_SIZE,
                height: BRDF_LUT_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba16Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING,
            view_formats: &[],
        });
        let brdf_lut_view = brdf_lut_tex.create_view(&wgpu::TextureViewDescriptor::default());
        let brdf_lut = core.registry.insert(GpuTexture {
            texture: brdf_lut_tex,
            view: brdf_lut_view,
            kind: crate::gpu::texture::TextureKind::D2,
        });

        let lambertian_slot = bindless.index_cube(lambertian)?;
        let ggx_slot = bindless.index_cube(ggx)?;
        let brdf_lut_slot = bindless.index_2d(brdf_lut)?;

        Ok(Self {
            entity,
            resolution: size,
            sample_count: component.sample_count.max(1),
            update_interval: component.update_interval.max(1),
            flags: component.flags | ProbeFlags::DIRTY,
            position,
            range: component.range,
            extents: component.extents,
            albedo,
            normal,
            ao_metal_roughness,
            emissive,
            raw_output,
            depth,
            depth_sampled_faces,
            lighting_bind_groups,
            face_globals,
            capture_cube_view,
            lambertian,
            lambertian_slot,
            ggx,
            ggx_slot,
            brdf_lut,
            brdf_lut_slot,
            ggx_mip_count: mips,
            current_face: 0,
            faces_dirty: [true; 6],
            static_filters_done: false,
            visible_opaque: Default::default(),
            visible_transparent: Default::default(),
        })
    }

    /// Marks every face stale; the time-sliced updates rebuild them.
    pub fn mark_all_faces_dirty(&mut self) {
        self.faces_dirty = [true; 6];
        self.flags |= ProbeFlags::DIRTY;
    }

    /// Faces due this frame: all six at interval 1, otherwise the rotating
    /// current face when the frame lands on the interval.
    #[must_use]
    pub fn faces_due(&self, frame_number: u64) -> Vec<u32> {
        let any_dirty = self.faces_dirty.iter().any(|d| *d);
        let realtime = self.flags.contains(ProbeFlags::REALTIME);
        if !any_dirty && !realtime {
            return Vec::new();
        }
        if self.update_interval == 1 {
            return (0..6).collect();
        }
        if frame_number % u64::from(self.update_interval) == 0 {
            vec![self.current_face]
        } else {
            Vec::new()
        }
    }

    #[must_use]
    pub fn gpu_record(&self) -> GpuProbeData {
        GpuProbeData {
            position: self.position,
            range_sqr: self.range * self.range,
            lambertian_index: self.lambertian_slot,
            ggx_index: self.ggx_slot,
            brdf_lut_index: self.brdf_lut_slot,
            parallax_correction: i32::from(
                self.flags.contains(ProbeFlags::PARALLAX_CORRECTION_BOX),
            ),
            aabb_min: (self.position - self.extents).extend(1.0),
            aabb_max: (self.position + self.extents).extend(1.0),
        }
    }
}

/// View and projection for a probe face camera: 90° FOV looking along
/// ±X/±Y/±Z, matching the cubemap face order.
#[must_use]
pub fn probe_face_camera(position: Vec3, face: u32, near: f32, far: f32) -> (Mat4, Mat4) {
    const DIRECTIONS: [(Vec3, Vec3); 6] = [
        (Vec3::X, Vec3::Y),
        (Vec3::NEG_X, Vec3::Y),
        (Vec3::Y, Vec3::Z),
        (Vec3::NEG_Y, Vec3::Z),
        (Vec3::Z, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y),
    ];
    let (forward, up) = DIRECTIONS[face as usize % 6];
    let view = Mat4::look_at_rh(position, position + forward, up);
    let projection = Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, near, far);
    (view, projection)
}
