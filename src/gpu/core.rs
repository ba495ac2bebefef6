//! Shared GPU Core
//!
//! Everything scene-independent that lives for the renderer's lifetime:
//! device and queue, the default samplers and dummy textures, the bind
//! group layouts every scene builds against, the shader template
//! environment, allocators, the staging ring, and the frame ring.

use std::num::NonZeroU32;

use crate::errors::Result;
use crate::gpu::allocator::GpuAllocators;
use crate::gpu::frame::FrameRing;
use crate::gpu::staging::StagingRing;
use crate::gpu::texture::{
    self, TextureId, TextureRegistry, create_dummy_cube_texture, create_dummy_texture,
};
use crate::pipeline::ShaderLibrary;
use crate::{MAX_BINDLESS_CUBE_TEXTURES, MAX_BINDLESS_TEXTURES};

/// Staging ring slice per frame in flight.
const STAGING_CAPACITY: u64 = 32 * 1024 * 1024;

/// Stride of one slot in the per-draw dynamic uniform buffer.
pub const DYNAMIC_SLOT_SIZE: u64 = 256;

/// The samplers created once at init.
pub struct Samplers {
    pub default: wgpu::Sampler,
    /// Comparison sampler for the shadow atlas.
    pub shadow: wgpu::Sampler,
    /// Trilinear clamped sampler for prefiltered environment mips.
    pub env: wgpu::Sampler,
    pub skybox: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        let default = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("default sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        let shadow = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let env = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("environment sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        let skybox = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("skybox sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Linear,
            ..Default::default()
        });
        Self {
            default,
            shadow,
            env,
            skybox,
        }
    }
}

/// Bind group layouts shared by every scene.
pub struct SharedLayouts {
    /// Group 0: globals, scene storage buffers, bindless arrays, samplers.
    pub global: wgpu::BindGroupLayout,
    /// Group 1: per-draw dynamic uniform.
    pub draw_data: wgpu::BindGroupLayout,
    /// Group 1 of the lighting pass: G-buffer attachments.
    pub lighting_inputs: wgpu::BindGroupLayout,
    /// Group 0 of the tonemap pass: raw output + sampler.
    pub tonemap_input: wgpu::BindGroupLayout,
    /// Skinning compute: source, destinations, joint texture, params.
    pub skinning: wgpu::BindGroupLayout,
    /// Environment prefilter: source cube + sampler + params.
    pub env_filter_source: wgpu::BindGroupLayout,
    /// Environment prefilter: destination array view.
    pub env_filter_dest: wgpu::BindGroupLayout,
    /// BRDF LUT destination.
    pub brdf_dest: wgpu::BindGroupLayout,
    /// Panorama decode: equirect source + destination cube array.
    pub panorama: wgpu::BindGroupLayout,
}

impl SharedLayouts {
    fn new(device: &wgpu::Device) -> Self {
        let storage_read = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only: true },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let vs_fs = wgpu::ShaderStages::VERTEX_FRAGMENT;

        let global = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("global bind group layout"),
            entries: &[
                // Globals
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: vs_fs,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage_read(1, vs_fs),                         // materials
                storage_read(2, wgpu::ShaderStages::VERTEX),    // transforms
                storage_read(3, wgpu::ShaderStages::VERTEX),    // instances
                storage_read(4, wgpu::ShaderStages::FRAGMENT),  // lights
                storage_read(5, vs_fs),                         // light shadow data
                storage_read(6, wgpu::ShaderStages::FRAGMENT),  // probes
                storage_read(7, vs_fs),                         // vertex data streams
                // Bindless 2D array
                wgpu::BindGroupLayoutEntry {
                    binding: 8,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: Some(NonZeroU32::new(MAX_BINDLESS_TEXTURES).expect("nonzero")),
                },
                // Bindless cube array
                wgpu::BindGroupLayoutEntry {
                    binding: 9,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: Some(NonZeroU32::new(MAX_BINDLESS_CUBE_TEXTURES).expect("nonzero")),
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 10,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 11,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 12,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Shadow atlas. Depth textures cannot join the filterable
                // bindless array, so the atlas gets its own slot.
                wgpu::BindGroupLayoutEntry {
                    binding: 13,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let draw_data = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw data layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: vs_fs,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(DYNAMIC_SLOT_SIZE),
                },
                count: None,
            }],
        });

        let gbuffer_tex = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let lighting_inputs = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("lighting inputs layout"),
            entries: &[
                gbuffer_tex(0), // albedo
                gbuffer_tex(1), // normal
                gbuffer_tex(2), // AO-metal-roughness
                gbuffer_tex(3), // emissive
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let tonemap_input = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tonemap input layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let compute_storage =
            |binding: u32, read_only: bool| wgpu::BindGroupLayoutEntry {
                binding,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            };
        let skinning = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("skinning layout"),
            entries: &[
                compute_storage(0, true),  // skin source streams
                compute_storage(1, false), // destination positions
                compute_storage(2, false), // destination data streams
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let env_filter_source = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("env filter source layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::Cube,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let storage_tex_array = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: wgpu::TextureFormat::Rgba16Float,
                view_dimension: wgpu::TextureViewDimension::D2Array,
            },
            count: None,
        };
        let env_filter_dest = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("env filter dest layout"),
            entries: &[storage_tex_array],
        });

        let brdf_dest = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("brdf dest layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::StorageTexture {
                    access: wgpu::StorageTextureAccess::WriteOnly,
                    format: wgpu::TextureFormat::Rgba16Float,
                    view_dimension: wgpu::TextureViewDimension::D2,
                },
                count: None,
            }],
        });

        let panorama = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("panorama layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: wgpu::TextureFormat::Rgba16Float,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                    },
                    count: None,
                },
            ],
        });

        Self {
            global,
            draw_data,
            lighting_inputs,
            tonemap_input,
            skinning,
            env_filter_source,
            env_filter_dest,
            brdf_dest,
            panorama,
        }
    }
}

/// CPU arena for per-draw dynamic uniform data: fixed 256-byte slots,
/// uploaded whole to the frame's dynamic buffer, addressed by dynamic
/// offset at draw time.
#[derive(Default)]
pub struct DynamicArena {
    data: Vec<u8>,
}

impl DynamicArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Pushes one record, returning its byte offset for `set_bind_group`.
    pub fn push<T: bytemuck::Pod>(&mut self, value: &T) -> u32 {
        let offset = self.data.len() as u32;
        debug_assert!(std::mem::size_of::<T>() as u64 <= DYNAMIC_SLOT_SIZE);
        self.data.extend_from_slice(bytemuck::bytes_of(value));
        self.data.resize(offset as usize + DYNAMIC_SLOT_SIZE as usize, 0);
        offset
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.data.len() / DYNAMIC_SLOT_SIZE as usize
    }
}

/// The renderer's shared GPU state.
pub struct GpuCore {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub limits: wgpu::Limits,
    pub samplers: Samplers,
    pub layouts: SharedLayouts,
    pub shaders: ShaderLibrary,
    pub registry: TextureRegistry,
    pub dummy_2d: TextureId,
    pub dummy_cube: TextureId,
    /// 1×1 depth view bound where no shadow atlas exists yet.
    pub dummy_depth_view: wgpu::TextureView,
    pub allocators: GpuAllocators,
    pub staging: StagingRing,
    pub frame_ring: FrameRing,
    /// Command buffers accumulated between `begin_frame` and `end_frame`,
    /// submitted together in dependency order.
    pub pending: Vec<wgpu::CommandBuffer>,
    /// Draw calls recorded this frame.
    pub draw_calls: u64,
}

impl GpuCore {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self> {
        let limits = device.limits();
        let samplers = Samplers::new(&device);
        let layouts = SharedLayouts::new(&device);
        let shaders = ShaderLibrary::new()?;
        let staging = StagingRing::new(&device, STAGING_CAPACITY);

        let mut registry = TextureRegistry::new();
        let dummy_2d = registry.insert(create_dummy_texture(&device, &queue));
        let dummy_cube = registry.insert(create_dummy_cube_texture(&device, &queue));

        let dummy_depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("dummy depth"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let dummy_depth_view = dummy_depth.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            device,
            queue,
            limits,
            samplers,
            layouts,
            shaders,
            registry,
            dummy_2d,
            dummy_cube,
            dummy_depth_view,
            allocators: GpuAllocators::new(),
            staging,
            frame_ring: FrameRing::new(),
            pending: Vec::new(),
            draw_calls: 0,
        })
    }

    /// The view for a registered texture, falling back to the dummy.
    #[must_use]
    pub fn texture_view_or_dummy(&self, id: TextureId, cube: bool) -> &wgpu::TextureView {
        if let Some(tex) = self.registry.get(id) {
            return &tex.view;
        }
        let dummy = if cube { self.dummy_cube } else { self.dummy_2d };
        &self
            .registry
            .get(dummy)
            .expect("dummy textures registered at init")
            .view
    }

    /// Uploads decoded pixels as a registered 2D texture.
    pub fn upload_texture_2d(
        &mut self,
        data: &texture::TextureData,
        max_resolution: u32,
        label: &str,
    ) -> Result<TextureId> {
        let gpu = texture::create_texture_2d(&self.device, &self.queue, data, max_resolution, label)?;
        Ok(self.registry.insert(gpu))
    }
}
