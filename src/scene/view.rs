//! Views
//!
//! A view owns one set of render targets — the G-buffer, the HDR raw
//! output, the tonemapped final texture, the pick attachment — plus its
//! per-frame global uniform buffers, visible-drawable lists, and picking
//! state. Resizing reallocates the targets and rebuilds the bind groups
//! that reference them.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::FRAMES_IN_FLIGHT;
use crate::ecs::Camera;
use crate::gpu::core::GpuCore;
use crate::scene::picking::PickState;

pub const GBUFFER_ALBEDO_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const GBUFFER_NORMAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const GBUFFER_AOMR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const GBUFFER_EMISSIVE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const RAW_OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32FloatStencil8;
pub const FINAL_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const PICK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Per-view globals, one buffer per frame in flight.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuGlobals {
    /// w, h, 1/w, 1/h
    pub viewport_size: Vec4,
    pub camera_position: Vec4,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    pub inverse_view_projection: Mat4,
    /// x: punctual enabled, y: IBL enabled, z: shadows enabled, w: probe
    /// count this frame.
    pub flags: [u32; 4],
    /// x: light count, y: probe count this frame.
    pub counts: [u32; 4],
}

impl GpuGlobals {
    #[must_use]
    pub fn from_camera(
        camera: &Camera,
        size: (u32, u32),
        punctual: bool,
        ibl: bool,
        shadows: bool,
        light_count: u32,
        probe_count: u32,
    ) -> Self {
        let view_projection = camera.view_projection();
        Self {
            viewport_size: Vec4::new(
                size.0 as f32,
                size.1 as f32,
                1.0 / size.0.max(1) as f32,
                1.0 / size.1.max(1) as f32,
            ),
            camera_position: camera.position.extend(1.0),
            view: camera.view,
            projection: camera.projection(),
            view_projection,
            inverse_view_projection: view_projection.inverse(),
            flags: [
                u32::from(punctual),
                u32::from(ibl),
                u32::from(shadows),
                probe_count,
            ],
            counts: [light_count, probe_count, 0, 0],
        }
    }
}

/// One render target texture plus its attachment view.
pub struct Target {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

fn create_target(
    device: &wgpu::Device,
    size: (u32, u32),
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    label: &str,
) -> Target {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size.0.max(1),
            height: size.1.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Target { texture, view }
}

/// The view's target set.
pub struct ViewTargets {
    pub albedo: Target,
    pub normal: Target,
    pub ao_metal_roughness: Target,
    pub emissive: Target,
    pub raw_output: Target,
    pub depth: Target,
    /// Depth-only view for sampling in the lighting pass.
    pub depth_sampled: wgpu::TextureView,
    pub final_color: Target,
    pub pick: Target,
}

impl ViewTargets {
    fn new(device: &wgpu::Device, size: (u32, u32)) -> Self {
        let attach_sample =
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let depth = create_target(device, size, DEPTH_FORMAT, attach_sample, "view depth");
        let depth_sampled = depth.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("view depth sampled"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });
        Self {
            albedo: create_target(device, size, GBUFFER_ALBEDO_FORMAT, attach_sample, "gbuffer albedo"),
            normal: create_target(device, size, GBUFFER_NORMAL_FORMAT, attach_sample, "gbuffer normal"),
            ao_metal_roughness: create_target(
                device,
                size,
                GBUFFER_AOMR_FORMAT,
                attach_sample,
                "gbuffer ao-metal-roughness",
            ),
            emissive: create_target(
                device,
                size,
                GBUFFER_EMISSIVE_FORMAT,
                attach_sample,
                "gbuffer emissive",
            ),
            raw_output: create_target(device, size, RAW_OUTPUT_FORMAT, attach_sample, "raw output"),
            depth,
            depth_sampled,
            final_color: create_target(device, size, FINAL_FORMAT, attach_sample, "final color"),
            pick: create_target(
                device,
                size,
                PICK_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                "pick ids",
            ),
        }
    }
}

/// Per-view visible-drawable lists, rebuilt by culling each frame.
#[derive(Debug, Default)]
pub struct VisibleLists {
    pub all: Vec<u32>,
    pub opaque: Vec<u32>,
    pub transparent: Vec<u32>,
}

impl VisibleLists {
    pub fn clear(&mut self) {
        self.all.clear();
        self.opaque.clear();
        self.transparent.clear();
    }
}

/// A render viewpoint over a scene.
pub struct View {
    pub size: (u32, u32),
    pub targets: ViewTargets,
    pub globals: Vec<wgpu::Buffer>,
    /// G-buffer inputs for the lighting pass; rebuilt on resize.
    pub lighting_bind_group: wgpu::BindGroup,
    pub tonemap_bind_group: wgpu::BindGroup,
    pub pick: PickState,
    pub visible: VisibleLists,
}

impl View {
    pub fn new(core: &GpuCore, size: (u32, u32)) -> Self {
        let targets = ViewTargets::new(&core.device, size);
        let globals = (0..FRAMES_IN_FLIGHT)
            .map(|i| {
                core.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("view globals {i}")),
                    size: std::mem::size_of::<GpuGlobals>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();
        let lighting_bind_group = Self::create_lighting_bind_group(core, &targets);
        let tonemap_bind_group = Self::create_tonemap_bind_group(core, &targets);
        Self {
            size,
            targets,
            globals,
            lighting_bind_group,
            tonemap_bind_group,
            pick: PickState::new(&core.device),
            visible: VisibleLists::default(),
        }
    }

    fn create_lighting_bind_group(core: &GpuCore, targets: &ViewTargets) -> wgpu::BindGroup {
        core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lighting inputs"),
            layout: &core.layouts.lighting_inputs,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.albedo.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.normal.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.ao_metal_roughness.view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&targets.emissive.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&targets.depth_sampled),
                },
            ],
        })
    }

    fn create_tonemap_bind_group(core: &GpuCore, targets: &ViewTargets) -> wgpu::BindGroup {
        core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("tonemap input"),
            layout: &core.layouts.tonemap_input,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&targets.raw_output.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&core.samplers.default),
                },
            ],
        })
    }

    /// Reallocates targets for a new size and rebuilds dependent bind
    /// groups. Old targets drop through the deferred deletion path.
    pub fn resize(&mut self, core: &GpuCore, size: (u32, u32)) {
        if size == self.size || size.0 == 0 || size.1 == 0 {
            return;
        }
        self.size = size;
        self.targets = ViewTargets::new(&core.device, size);
        self.lighting_bind_group = Self::create_lighting_bind_group(core, &self.targets);
        self.tonemap_bind_group = Self::create_tonemap_bind_group(core, &self.targets);
    }

    /// Writes the frame's globals for this view.
    pub fn write_globals(&self, queue: &wgpu::Queue, slot: usize, globals: &GpuGlobals) {
        queue.write_buffer(&self.globals[slot], 0, bytemuck::bytes_of(globals));
    }
}
