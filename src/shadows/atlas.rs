//! Shadow Atlas Packing
//!
//! One `Depth32FloatStencil8` texture holds every shadow map rendered this
//! frame. Rectangles are packed shelf-by-shelf, largest first; when the
//! set does not fit, the atlas doubles (power of two) up to the device
//! limit, and past that lights are packed greedily with the remainder
//! losing shadows for the frame.

use crate::errors::Result;

/// One packed square of the atlas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtlasRect {
    pub x: u32,
    pub y: u32,
    pub size: u32,
    /// Index into the frame's shadow-casting light list.
    pub light_index: u32,
    /// Cascade index (directional), face index (point), 0 (spot).
    pub slice: u32,
}

/// A light's per-frame atlas request.
#[derive(Debug, Clone, Copy)]
pub struct ShadowRequest {
    pub light_index: u32,
    /// Cascade/face count: directional `cascade_count`, point 6, spot 1.
    pub slice_count: u32,
    /// Square resolution per slice.
    pub resolution: u32,
}

// ─── Shelf packer ────────────────────────────────────────────────────────────

struct Shelf {
    y: u32,
    height: u32,
    cursor_x: u32,
}

/// Skyline-free shelf packer. Good fits come from feeding it requests in
/// descending size order, which [`ShadowAtlas::pack`] does.
pub struct ShelfPacker {
    size: u32,
    shelves: Vec<Shelf>,
    next_y: u32,
}

impl ShelfPacker {
    #[must_use]
    pub fn new(size: u32) -> Self {
        Self {
            size,
            shelves: Vec::new(),
            next_y: 0,
        }
    }

    /// Places a `side`×`side` square, returning its origin.
    pub fn pack(&mut self, side: u32) -> Option<(u32, u32)> {
        if side == 0 || side > self.size {
            return None;
        }

        // Existing shelf with room and matching height class
        for shelf in &mut self.shelves {
            if shelf.height >= side && shelf.cursor_x + side <= self.size {
                let origin = (shelf.cursor_x, shelf.y);
                shelf.cursor_x += side;
                return Some(origin);
            }
        }

        // Open a new shelf
        if self.next_y + side > self.size {
            return None;
        }
        let shelf = Shelf {
            y: self.next_y,
            height: side,
            cursor_x: side,
        };
        let origin = (0, self.next_y);
        self.next_y += side;
        self.shelves.push(shelf);
        Some(origin)
    }
}

// ─── Atlas ───────────────────────────────────────────────────────────────────

/// The result of a frame's packing pass.
#[derive(Debug, Default)]
pub struct PackOutcome {
    pub rects: Vec<AtlasRect>,
    /// Light indices whose requests did not fit at the maximum resolution.
    pub dropped: Vec<u32>,
    /// The atlas grew this frame; its texture must be recreated.
    pub grew: bool,
}

/// The shared shadow atlas: resolution state plus the packed layout.
pub struct ShadowAtlas {
    resolution: u32,
    max_resolution: u32,
    pub rects: Vec<AtlasRect>,
    pub texture: Option<wgpu::Texture>,
    /// Attachment view (all aspects), for the shadow render pass.
    pub view: Option<wgpu::TextureView>,
    /// Depth-only view, for sampling from the lighting pass.
    pub sampled_view: Option<wgpu::TextureView>,
    /// Bindless 2D slot of the atlas depth texture.
    pub bindless_index: u32,
}

/// Atlas depth format: D32 with stencil, matching the shadow pipelines.
pub const SHADOW_ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32FloatStencil8;

impl ShadowAtlas {
    #[must_use]
    pub fn new(resolution: u32, max_resolution: u32) -> Self {
        Self {
            resolution: resolution.next_power_of_two(),
            max_resolution,
            rects: Vec::new(),
            texture: None,
            view: None,
            sampled_view: None,
            bindless_index: 0,
        }
    }

    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Packs the frame's requests, growing the atlas if needed.
    ///
    /// Requests are sorted by slice resolution descending before packing;
    /// rect order in the result follows that sort, not request order.
    pub fn pack(&mut self, requests: &[ShadowRequest]) -> PackOutcome {
        let mut sorted: Vec<ShadowRequest> = requests.to_vec();
        sorted.sort_by(|a, b| b.resolution.cmp(&a.resolution));

        let mut outcome = PackOutcome::default();
        loop {
            match Self::try_pack(&sorted, self.resolution) {
                Ok(rects) => {
                    outcome.rects = rects;
                    break;
                }
                Err(_) if self.resolution * 2 <= self.max_resolution => {
                    self.resolution *= 2;
                    self.texture = None;
                    self.view = None;
                    self.sampled_view = None;
                    outcome.grew = true;
                    log::debug!("shadow atlas grown to {}", self.resolution);
                }
                Err(_) => {
                    // At the cap: greedy pack, drop the remainder
                    let (rects, dropped) = Self::pack_greedy(&sorted, self.resolution);
                    for light in &dropped {
                        log::warn!(
                            "shadow atlas full at {}; light {} loses shadows this frame",
                            self.resolution,
                            light
                        );
                    }
                    outcome.rects = rects;
                    outcome.dropped = dropped;
                    break;
                }
            }
        }

        self.rects.clone_from(&outcome.rects);
        outcome
    }

    /// All-or-nothing packing attempt.
    fn try_pack(requests: &[ShadowRequest], resolution: u32) -> Result<Vec<AtlasRect>> {
        let mut packer = ShelfPacker::new(resolution);
        let mut rects = Vec::new();
        for request in requests {
            for slice in 0..request.slice_count {
                let Some((x, y)) = packer.pack(request.resolution) else {
                    return Err(crate::errors::RenderError::ResourceExhausted {
                        context: "shadow atlas",
                        requested: u64::from(request.resolution),
                        available: u64::from(resolution),
                    });
                };
                rects.push(AtlasRect {
                    x,
                    y,
                    size: request.resolution,
                    light_index: request.light_index,
                    slice,
                });
            }
        }
        Ok(rects)
    }

    /// Packs what fits; a light either gets all of its slices or none.
    fn pack_greedy(requests: &[ShadowRequest], resolution: u32) -> (Vec<AtlasRect>, Vec<u32>) {
        let mut packer = ShelfPacker::new(resolution);
        let mut rects = Vec::new();
        let mut dropped = Vec::new();
        for request in requests {
            let mark = rects.len();
            let mut complete = true;
            for slice in 0..request.slice_count {
                if let Some((x, y)) = packer.pack(request.resolution) {
                    rects.push(AtlasRect {
                        x,
                        y,
                        size: request.resolution,
                        light_index: request.light_index,
                        slice,
                    });
                } else {
                    complete = false;
                    break;
                }
            }
            if !complete {
                rects.truncate(mark);
                dropped.push(request.light_index);
            }
        }
        (rects, dropped)
    }

    /// Recreates the atlas texture when missing (first use or growth).
    pub fn ensure_texture(&mut self, device: &wgpu::Device) {
        if self.texture.is_some() {
            return;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow atlas"),
            size: wgpu::Extent3d {
                width: self.resolution,
                height: self.resolution,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: SHADOW_ATLAS_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampled_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("shadow atlas depth"),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });
        self.texture = Some(texture);
        self.view = Some(view);
        self.sampled_view = Some(sampled_view);
    }

    /// Drops GPU state; CPU layout survives for the next frame.
    pub fn release(&mut self) {
        self.texture = None;
        self.view = None;
        self.sampled_view = None;
    }
}
