//! Render Settings
//!
//! Configuration for the renderer: GPU selection, surface behavior, and the
//! graphics options toggled at runtime from the host (culling, shadows,
//! lighting paths, debug overlays).

/// Configuration options for the renderer.
///
/// Construct with struct-update syntax over [`RenderSettings::default`].
#[derive(Debug, Clone)]
pub struct RenderSettings {
    /// GPU adapter selection preference.
    pub power_preference: wgpu::PowerPreference,

    /// Extra features requested on top of what the bindless design needs.
    pub extra_features: wgpu::Features,

    /// Enable vertical synchronization.
    pub vsync: bool,

    /// Number of MSAA samples for the swapchain resolve. 1 disables MSAA.
    pub msaa_samples: u32,

    /// Background clear color for view render targets.
    pub clear_color: wgpu::Color,

    /// Per-view frustum culling. When `false`, every drawable is treated
    /// as visible in every view.
    pub frustum_culling: bool,

    /// Image-based lighting from environment probes.
    pub image_based_lighting: bool,

    /// Direct (punctual) lighting.
    pub punctual_lighting: bool,

    /// Issue all cascades of a shadow draw in one call when the device
    /// supports multiple viewports. Falls back to one draw per viewport.
    pub multi_viewport_shadows: bool,

    /// Constant depth bias applied to shadow pipelines.
    pub shadow_constant_depth_bias: i32,

    /// Slope-scaled depth bias applied to shadow pipelines.
    pub shadow_slope_depth_bias: f32,

    /// Initial shadow atlas resolution. Grown (power of two) when packing
    /// fails, up to the device's maximum texture dimension.
    pub shadow_atlas_resolution: u32,

    /// Selection outline width in pixels.
    pub outline_width: u32,

    /// Largest texture edge accepted at upload; larger images are rejected.
    pub max_texture_resolution: u32,

    // ------------------------------------------------------------------
    // Debug toggles
    // ------------------------------------------------------------------
    /// Render probe gizmo spheres.
    pub show_probes: bool,
    /// Wireframe rasterization where supported.
    pub wireframe: bool,
    /// Draw the world origin axes into the view drawlist.
    pub show_origin: bool,
    /// Draw every drawable's world AABB.
    pub draw_all_bounding_boxes: bool,
    /// Draw AABBs of drawables that survived culling.
    pub draw_visible_bounding_boxes: bool,
    /// Draw the AABB of the current selection.
    pub show_selected_bounding_box: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            extra_features: wgpu::Features::empty(),
            vsync: true,
            msaa_samples: 1,
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.0,
                a: 1.0,
            },
            frustum_culling: true,
            image_based_lighting: true,
            punctual_lighting: true,
            multi_viewport_shadows: true,
            shadow_constant_depth_bias: -1,
            shadow_slope_depth_bias: -1.75,
            shadow_atlas_resolution: 2048,
            outline_width: 4,
            max_texture_resolution: 4096,
            show_probes: false,
            wireframe: false,
            show_origin: false,
            draw_all_bounding_boxes: false,
            draw_visible_bounding_boxes: false,
            show_selected_bounding_box: true,
        }
    }
}

impl RenderSettings {
    /// Features the bindless table design requires from the adapter.
    #[must_use]
    pub fn required_features(&self) -> wgpu::Features {
        wgpu::Features::TEXTURE_BINDING_ARRAY
            | wgpu::Features::SAMPLED_TEXTURE_AND_STORAGE_BUFFER_ARRAY_NON_UNIFORM_INDEXING
            | wgpu::Features::PARTIALLY_BOUND_BINDING_ARRAY
            | wgpu::Features::DEPTH32FLOAT_STENCIL8
            | self.extra_features
    }

    /// One-line-per-option diagnostic dump, for the host's options panel.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let mut line = |name: &str, value: String| {
            out.push_str(name);
            out.push_str(": ");
            out.push_str(&value);
            out.push('\n');
        };
        line("vsync", self.vsync.to_string());
        line("msaa samples", self.msaa_samples.to_string());
        line("frustum culling", self.frustum_culling.to_string());
        line("punctual lighting", self.punctual_lighting.to_string());
        line("image based lighting", self.image_based_lighting.to_string());
        line("multi-viewport shadows", self.multi_viewport_shadows.to_string());
        line("shadow atlas resolution", self.shadow_atlas_resolution.to_string());
        line(
            "shadow depth bias",
            format!(
                "{} constant, {} slope",
                self.shadow_constant_depth_bias, self.shadow_slope_depth_bias
            ),
        );
        line("outline width", self.outline_width.to_string());
        line("wireframe", self.wireframe.to_string());
        line("show probes", self.show_probes.to_string());
        out
    }
}
