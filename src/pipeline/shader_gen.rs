//! Shader Generation
//!
//! Shaders ship as WGSL templates; a variant's generator state is a set of
//! integer defines rendered through the template engine. `{% if DEFINE %}`
//! gates optional code, `{{ DEFINE }}` splices constants (array sizes,
//! stream strides). Undefined names are falsy, so templates need no
//! default blocks.

use std::collections::BTreeMap;

use xxhash_rust::xxh3::Xxh3;

use crate::errors::{RenderError, Result};

// ─── Defines ─────────────────────────────────────────────────────────────────

/// Ordered integer defines. Ordering makes the byte serialization — and
/// therefore the variant hash — canonical.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderDefines {
    map: BTreeMap<String, i64>,
}

impl ShaderDefines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: i64) -> &mut Self {
        self.map.insert(key.to_owned(), value);
        self
    }

    /// Sets a boolean-style define to 1.
    pub fn flag(&mut self, key: &str) -> &mut Self {
        self.set(key, 1)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<i64> {
        self.map.get(key).copied()
    }

    pub fn merge(&mut self, other: &ShaderDefines) {
        for (k, v) in &other.map {
            self.map.insert(k.clone(), *v);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Canonical byte serialization used for variant hashing — the
    /// "specialization constant bytes" of a variant key.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.map.len() * 16);
        for (k, v) in &self.map {
            out.extend_from_slice(k.as_bytes());
            out.push(b'=');
            out.extend_from_slice(&v.to_le_bytes());
            out.push(b';');
        }
        out
    }

    fn render_context(&self) -> minijinja::Value {
        minijinja::Value::from_serialize(&self.map)
    }
}

// ─── Templates ───────────────────────────────────────────────────────────────

/// The shader template set. Graphics templates specialize per material
/// state; compute templates per dispatch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderTemplate {
    // Graphics
    Deferred,
    Forward,
    Lighting,
    Shadow,
    Skybox,
    Pick,
    Outline,
    Tonemap,
    Missing,
    // Compute
    Skinning,
    EnvFilter,
    BrdfLut,
    PanoramaToCube,
}

impl ShaderTemplate {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Deferred => "deferred",
            Self::Forward => "forward",
            Self::Lighting => "lighting",
            Self::Shadow => "shadow",
            Self::Skybox => "skybox",
            Self::Pick => "pick",
            Self::Outline => "outline",
            Self::Tonemap => "tonemap",
            Self::Missing => "missing",
            Self::Skinning => "skinning",
            Self::EnvFilter => "env_filter",
            Self::BrdfLut => "brdf_lut",
            Self::PanoramaToCube => "panorama_to_cube",
        }
    }

    #[must_use]
    pub fn is_compute(self) -> bool {
        matches!(
            self,
            Self::Skinning | Self::EnvFilter | Self::BrdfLut | Self::PanoramaToCube
        )
    }
}

/// Template sources, including the shared snippets reachable through
/// `{% include %}`.
const TEMPLATE_SOURCES: &[(&str, &str)] = &[
    ("common", include_str!("../shaders/common.wgsl")),
    ("bindless", include_str!("../shaders/bindless.wgsl")),
    ("pbr", include_str!("../shaders/pbr.wgsl")),
    ("deferred", include_str!("../shaders/deferred.wgsl")),
    ("forward", include_str!("../shaders/forward.wgsl")),
    ("lighting", include_str!("../shaders/lighting.wgsl")),
    ("shadow", include_str!("../shaders/shadow.wgsl")),
    ("skybox", include_str!("../shaders/skybox.wgsl")),
    ("pick", include_str!("../shaders/pick.wgsl")),
    ("outline", include_str!("../shaders/outline.wgsl")),
    ("tonemap", include_str!("../shaders/tonemap.wgsl")),
    ("missing", include_str!("../shaders/missing.wgsl")),
    ("skinning", include_str!("../shaders/skinning.wgsl")),
    ("env_filter", include_str!("../shaders/env_filter.wgsl")),
    ("brdf_lut", include_str!("../shaders/brdf_lut.wgsl")),
    (
        "panorama_to_cube",
        include_str!("../shaders/panorama_to_cube.wgsl"),
    ),
];

/// Owns the template environment and produces final WGSL.
pub struct ShaderLibrary {
    env: minijinja::Environment<'static>,
}

impl ShaderLibrary {
    pub fn new() -> Result<Self> {
        let mut env = minijinja::Environment::new();
        for (name, source) in TEMPLATE_SOURCES {
            env.add_template(name, source)
                .map_err(|e| RenderError::ShaderCompile {
                    template: name,
                    message: e.to_string(),
                })?;
        }
        Ok(Self { env })
    }

    /// Renders a template against the defines.
    pub fn generate(&self, template: ShaderTemplate, defines: &ShaderDefines) -> Result<String> {
        let tmpl = self
            .env
            .get_template(template.name())
            .map_err(|e| RenderError::ShaderCompile {
                template: template.name(),
                message: e.to_string(),
            })?;
        tmpl.render(defines.render_context())
            .map_err(|e| RenderError::ShaderCompile {
                template: template.name(),
                message: e.to_string(),
            })
    }

    /// Renders and wraps the result in a shader module.
    pub fn compile(
        &self,
        device: &wgpu::Device,
        template: ShaderTemplate,
        defines: &ShaderDefines,
    ) -> Result<wgpu::ShaderModule> {
        let source = self.generate(template, defines)?;
        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(template.name()),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Owned(source)),
        }))
    }
}

/// Variant key hash over `(template, graphics-state bits, define bytes)`.
#[must_use]
pub fn variant_hash(template: ShaderTemplate, state_bits: u64, defines: &ShaderDefines) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.update(template.name().as_bytes());
    hasher.update(&state_bits.to_le_bytes());
    hasher.update(&defines.to_bytes());
    hasher.digest()
}
