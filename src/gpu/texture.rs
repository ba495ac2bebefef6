//! Texture Registry
//!
//! Scene textures are owned here and referenced everywhere else by
//! [`TextureId`], a generational key. The bindless tables map ids to array
//! slots; a removed id invalidates its slot back to the dummy texture.

use slotmap::{SlotMap, new_key_type};

use crate::errors::{RenderError, Result};

new_key_type! {
    /// Generational handle to a registered texture.
    pub struct TextureId;
}

/// Shape of a registered texture, for bindless table routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    D2,
    Cube,
}

/// A texture plus its canonical sampled view.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub kind: TextureKind,
}

/// Owns every scene texture.
#[derive(Default)]
pub struct TextureRegistry {
    textures: SlotMap<TextureId, GpuTexture>,
}

impl TextureRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, texture: GpuTexture) -> TextureId {
        self.textures.insert(texture)
    }

    #[must_use]
    pub fn get(&self, id: TextureId) -> Option<&GpuTexture> {
        self.textures.get(id)
    }

    pub fn remove(&mut self, id: TextureId) -> Option<GpuTexture> {
        self.textures.remove(id)
    }

    #[must_use]
    pub fn contains(&self, id: TextureId) -> bool {
        self.textures.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

// ─── CPU-side pixel data ─────────────────────────────────────────────────────

/// Decoded pixel data ready for upload.
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
    pub pixels: Vec<u8>,
}

impl TextureData {
    /// Decodes LDR image bytes (PNG/JPG/TGA/BMP) to RGBA8.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            pixels: image.into_raw(),
        })
    }

    /// Decodes LDR bytes into linear (non-sRGB) RGBA8, for normal and
    /// data maps.
    pub fn decode_linear(bytes: &[u8]) -> Result<Self> {
        let mut data = Self::decode(bytes)?;
        data.format = wgpu::TextureFormat::Rgba8Unorm;
        Ok(data)
    }

    /// Decodes an HDR equirectangular panorama to RGBA32F.
    pub fn decode_hdr(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)?.to_rgba32f();
        let (width, height) = image.dimensions();
        Ok(Self {
            width,
            height,
            format: wgpu::TextureFormat::Rgba32Float,
            pixels: bytemuck::cast_slice(&image.into_raw()).to_vec(),
        })
    }

    fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            wgpu::TextureFormat::Rgba32Float => 16,
            wgpu::TextureFormat::Rgba16Float => 8,
            _ => 4,
        }
    }
}

// ─── Creation helpers ────────────────────────────────────────────────────────

/// Creates and uploads a sampled 2D texture.
pub fn create_texture_2d(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    data: &TextureData,
    max_resolution: u32,
    label: &str,
) -> Result<GpuTexture> {
    if data.width == 0 || data.height == 0 {
        return Err(RenderError::InvalidInput(format!(
            "texture '{label}' has zero extent"
        )));
    }
    if data.width.max(data.height) > max_resolution {
        return Err(RenderError::InvalidInput(format!(
            "texture '{label}' is {}x{}, exceeding the {max_resolution} limit",
            data.width, data.height
        )));
    }

    let size = wgpu::Extent3d {
        width: data.width,
        height: data.height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: data.format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        &data.pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(data.width * data.bytes_per_pixel()),
            rows_per_image: Some(data.height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Ok(GpuTexture {
        texture,
        view,
        kind: TextureKind::D2,
    })
}

/// Creates an empty cube texture with `mips` levels and a cube view.
pub fn create_cube_texture(
    device: &wgpu::Device,
    size: u32,
    mips: u32,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    label: &str,
) -> GpuTexture {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 6,
        },
        mip_level_count: mips,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some(label),
        dimension: Some(wgpu::TextureViewDimension::Cube),
        ..Default::default()
    });
    GpuTexture {
        texture,
        view,
        kind: TextureKind::Cube,
    }
}

/// Creates the 1×1 dummy 2D texture occupying bindless slot 0.
pub fn create_dummy_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
    let data = TextureData {
        width: 1,
        height: 1,
        format: wgpu::TextureFormat::Rgba8Unorm,
        pixels: vec![255, 255, 255, 255],
    };
    create_texture_2d(device, queue, &data, 1, "dummy texture").expect("dummy texture is valid")
}

/// Creates the 1×1 dummy cube texture occupying cube slot 0.
pub fn create_dummy_cube_texture(device: &wgpu::Device, queue: &wgpu::Queue) -> GpuTexture {
    let cube = create_cube_texture(
        device,
        1,
        1,
        wgpu::TextureFormat::Rgba8Unorm,
        wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        "dummy cube texture",
    );
    for face in 0..6 {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &cube.texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: 0,
                    z: face,
                },
                aspect: wgpu::TextureAspect::All,
            },
            &[0, 0, 0, 255],
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4),
                rows_per_image: Some(1),
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
    }
    cube
}
