//! Pipelines & Shader Variants
//!
//! Draw pipelines are specializations of a small set of WGSL templates.
//! [`GraphicsState`] packs the fixed-function half of that specialization
//! into a single `u64`; [`ShaderDefines`] carries the generator half. The
//! [`VariantCache`] maps `(template, state, defines)` to compiled
//! pipelines, monotonically per scene.

pub mod graphics_state;
pub mod shader_gen;
pub mod variant_cache;

pub use graphics_state::{GraphicsState, PassKind, StencilMode};
pub use shader_gen::{ShaderDefines, ShaderLibrary, ShaderTemplate};
pub use variant_cache::{
    ComputePipelineId, PipelineTargets, RenderPipelineId, ShaderVariant, VariantCache,
};
