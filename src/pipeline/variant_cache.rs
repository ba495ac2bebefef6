//! Shader Variant Cache
//!
//! Maps `(template, graphics state, defines)` to compiled pipelines.
//! Pipelines live in contiguous `Vec`s addressed by lightweight ids; the
//! lookup is the variant hash. The cache is append-only for a scene's
//! lifetime — the same key always returns the same id — and is retired
//! with the scene.
//!
//! A variant whose generation fails compiles the `missing` template
//! (solid magenta) under the same key instead, so the rest of the scene
//! keeps rendering while the failure is visible on screen and in the log.

use rustc_hash::FxHashMap;

use crate::errors::Result;
use crate::pipeline::graphics_state::{GraphicsState, PassKind};
use crate::pipeline::shader_gen::{ShaderDefines, ShaderLibrary, ShaderTemplate, variant_hash};

/// Handle to a cached render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineId(u32);

impl RenderPipelineId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a cached compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineId(u32);

impl ComputePipelineId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A requested specialization of a shader template.
#[derive(Debug, Clone)]
pub struct ShaderVariant {
    pub template: ShaderTemplate,
    pub state: GraphicsState,
    pub defines: ShaderDefines,
}

impl ShaderVariant {
    #[must_use]
    pub fn key_hash(&self) -> u64 {
        variant_hash(self.template, self.state.as_u64(), &self.defines)
    }
}

/// Attachment shape a variant compiles against.
pub struct PipelineTargets<'a> {
    pub color_formats: &'a [wgpu::TextureFormat],
    pub depth_format: Option<wgpu::TextureFormat>,
    pub sample_count: u32,
    pub depth_bias: wgpu::DepthBiasState,
}

impl Default for PipelineTargets<'_> {
    fn default() -> Self {
        Self {
            color_formats: &[],
            depth_format: None,
            sample_count: 1,
            depth_bias: wgpu::DepthBiasState::default(),
        }
    }
}

/// Vertex layout of the scene vertex buffer: tightly packed positions.
/// Every other stream is fetched from the data storage buffer by index.
#[must_use]
pub fn position_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 0,
    }];
    wgpu::VertexBufferLayout {
        array_stride: 12,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

/// The per-scene pipeline cache.
pub struct VariantCache {
    render_pipelines: Vec<wgpu::RenderPipeline>,
    compute_pipelines: Vec<wgpu::ComputePipeline>,
    render_lookup: FxHashMap<u64, RenderPipelineId>,
    compute_lookup: FxHashMap<u64, ComputePipelineId>,
}

impl VariantCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            render_pipelines: Vec::with_capacity(32),
            compute_pipelines: Vec::with_capacity(8),
            render_lookup: FxHashMap::default(),
            compute_lookup: FxHashMap::default(),
        }
    }

    #[inline]
    #[must_use]
    pub fn render_pipeline(&self, id: RenderPipelineId) -> &wgpu::RenderPipeline {
        &self.render_pipelines[id.index()]
    }

    #[inline]
    #[must_use]
    pub fn compute_pipeline(&self, id: ComputePipelineId) -> &wgpu::ComputePipeline {
        &self.compute_pipelines[id.index()]
    }

    #[must_use]
    pub fn render_pipeline_count(&self) -> usize {
        self.render_pipelines.len()
    }

    #[must_use]
    pub fn compute_pipeline_count(&self) -> usize {
        self.compute_pipelines.len()
    }

    /// Retires every pipeline. Called on scene teardown after the device
    /// flush.
    pub fn clear(&mut self) {
        self.render_pipelines.clear();
        self.compute_pipelines.clear();
        self.render_lookup.clear();
        self.compute_lookup.clear();
    }

    /// Looks up or compiles a graphics variant.
    pub fn get_or_create_render(
        &mut self,
        device: &wgpu::Device,
        shaders: &ShaderLibrary,
        variant: &ShaderVariant,
        targets: &PipelineTargets,
        layouts: &[&wgpu::BindGroupLayout],
        vertex_buffers: &[wgpu::VertexBufferLayout],
    ) -> RenderPipelineId {
        let hash = variant.key_hash();
        if let Some(&id) = self.render_lookup.get(&hash) {
            return id;
        }

        let module = match shaders.compile(device, variant.template, &variant.defines) {
            Ok(module) => module,
            Err(err) => {
                log::error!(
                    "shader variant for template '{}' failed, substituting missing shader: {err}",
                    variant.template.name()
                );
                shaders
                    .compile(device, ShaderTemplate::Missing, &ShaderDefines::new())
                    .expect("missing shader template always renders")
            }
        };

        let pipeline = self.build_render_pipeline(
            device,
            &module,
            variant,
            targets,
            layouts,
            vertex_buffers,
        );

        let id = RenderPipelineId(self.render_pipelines.len() as u32);
        self.render_pipelines.push(pipeline);
        self.render_lookup.insert(hash, id);
        id
    }

    fn build_render_pipeline(
        &self,
        device: &wgpu::Device,
        module: &wgpu::ShaderModule,
        variant: &ShaderVariant,
        targets: &PipelineTargets,
        layouts: &[&wgpu::BindGroupLayout],
        vertex_buffers: &[wgpu::VertexBufferLayout],
    ) -> wgpu::RenderPipeline {
        let layout_opts: Vec<Option<&wgpu::BindGroupLayout>> =
            layouts.iter().map(|&l| Some(l)).collect();
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(variant.template.name()),
            bind_group_layouts: &layout_opts,
            immediate_size: 0,
        });

        let blend = variant.state.blend_state();
        let write_mask = if variant.state.color_writes {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = targets
            .color_formats
            .iter()
            .map(|&format| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend,
                    write_mask,
                })
            })
            .collect();

        let depth_stencil = targets.depth_format.map(|format| wgpu::DepthStencilState {
            format,
            depth_write_enabled: Some(variant.state.depth_write),
            depth_compare: Some(variant.state.depth_compare),
            stencil: variant.state.stencil_state(),
            bias: targets.depth_bias,
        });

        let fragment = if color_targets.is_empty() && variant.state.pass == PassKind::Shadow {
            // Depth-only opaque shadow; the alpha-tested variant keeps its
            // fragment stage through the ALPHA_MASK define.
            if variant.defines.get("ALPHA_MASK").is_some() {
                Some(wgpu::FragmentState {
                    module,
                    entry_point: Some("fs_main"),
                    targets: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                })
            } else {
                None
            }
        } else {
            Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &color_targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            })
        };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(variant.template.name()),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: vertex_buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment,
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: variant.state.cull_mode,
                front_face: if variant.state.front_ccw {
                    wgpu::FrontFace::Ccw
                } else {
                    wgpu::FrontFace::Cw
                },
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: targets.sample_count,
                ..Default::default()
            },
            multiview_mask: None,
            cache: None,
        })
    }

    /// Looks up or compiles a compute variant.
    pub fn get_or_create_compute(
        &mut self,
        device: &wgpu::Device,
        shaders: &ShaderLibrary,
        template: ShaderTemplate,
        defines: &ShaderDefines,
        layouts: &[&wgpu::BindGroupLayout],
    ) -> Result<ComputePipelineId> {
        let hash = variant_hash(template, 0, defines);
        if let Some(&id) = self.compute_lookup.get(&hash) {
            return Ok(id);
        }

        let module = shaders.compile(device, template, defines)?;
        let layout_opts: Vec<Option<&wgpu::BindGroupLayout>> =
            layouts.iter().map(|&l| Some(l)).collect();
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(template.name()),
            bind_group_layouts: &layout_opts,
            immediate_size: 0,
        });
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(template.name()),
            layout: Some(&layout),
            module: &module,
            entry_point: Some("main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let id = ComputePipelineId(self.compute_pipelines.len() as u32);
        self.compute_pipelines.push(pipeline);
        self.compute_lookup.insert(hash, id);
        Ok(id)
    }
}

impl Default for VariantCache {
    fn default() -> Self {
        Self::new()
    }
}
