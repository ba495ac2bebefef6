//! Renderer
//!
//! The owned entry point: device bring-up, scene and view lifecycles, the
//! frame loop, and the swapchain present. One `Renderer` value replaces
//! any process-wide state; hosts pass it explicitly.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashSet;
use slotmap::{SlotMap, new_key_type};

use crate::ecs::{Camera, Entity};
use crate::errors::{RenderError, Result};
use crate::gpu::core::GpuCore;
use crate::gpu::texture::{self, TextureData, TextureId, TextureKind};
use crate::graph;
use crate::pipeline::{ShaderDefines, ShaderTemplate};
use crate::scene::{Scene, Skybox};
use crate::settings::RenderSettings;

new_key_type! {
    /// Handle to a scene owned by the renderer.
    pub struct SceneId;
}

/// Handle to a view within a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewId(pub u32);

/// Per-call parameters of `render_scene`.
#[derive(Debug, Clone, Copy)]
pub struct RenderSceneParams {
    pub camera: Camera,
    /// Separate culling camera (debugging frozen-frustum setups).
    pub cull_camera: Option<Camera>,
    /// Directional light driving the cascades; defaults to the first
    /// shadow-casting directional light in the snapshot.
    pub sun_light: Option<Entity>,
}

impl RenderSceneParams {
    #[must_use]
    pub fn new(camera: Camera) -> Self {
        Self {
            camera,
            cull_camera: None,
            sun_light: None,
        }
    }
}

struct SurfaceState {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    frame: Option<wgpu::SurfaceTexture>,
    blit_pipeline: Option<wgpu::RenderPipeline>,
}

/// The renderer.
pub struct Renderer {
    pub settings: RenderSettings,
    core: Option<GpuCore>,
    scenes: SlotMap<SceneId, Scene>,
    surface: Option<SurfaceState>,
    frame_active: bool,
    prepared_scenes: FxHashSet<SceneId>,
    last_rendered: Option<(SceneId, ViewId)>,
}

impl Renderer {
    /// Phase 1: configuration only; no GPU resources yet.
    #[must_use]
    pub fn new(settings: RenderSettings) -> Self {
        Self {
            settings,
            core: None,
            scenes: SlotMap::with_key(),
            surface: None,
            frame_active: false,
            prepared_scenes: FxHashSet::default(),
            last_rendered: None,
        }
    }

    /// Phase 2: device bring-up against a window surface.
    pub async fn initialize<W>(&mut self, window: W, width: u32, height: u32) -> Result<()>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        if self.core.is_some() {
            return Ok(());
        }

        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|e| RenderError::AdapterRequestFailed(e.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: self.settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::AdapterRequestFailed(e.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: self.settings.required_features(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        let mut config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .ok_or_else(|| {
                RenderError::AdapterRequestFailed("surface not supported by adapter".to_owned())
            })?;
        config.present_mode = if self.settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        surface.configure(&device, &config);

        self.surface = Some(SurfaceState {
            surface,
            config,
            frame: None,
            blit_pipeline: None,
        });
        self.core = Some(GpuCore::new(device, queue)?);
        log::info!("renderer initialized ({width}x{height})");
        Ok(())
    }

    /// Device bring-up without a window; views render offscreen.
    pub async fn initialize_headless(&mut self) -> Result<()> {
        if self.core.is_some() {
            return Ok(());
        }
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: self.settings.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RenderError::AdapterRequestFailed(e.to_string()))?;
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: self.settings.required_features(),
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;
        self.core = Some(GpuCore::new(device, queue)?);
        log::info!("renderer initialized headless");
        Ok(())
    }

    fn core(&self) -> Result<&GpuCore> {
        self.core
            .as_ref()
            .ok_or_else(|| RenderError::InvalidInput("renderer not initialized".to_owned()))
    }

    fn core_mut(&mut self) -> Result<&mut GpuCore> {
        self.core
            .as_mut()
            .ok_or_else(|| RenderError::InvalidInput("renderer not initialized".to_owned()))
    }

    /// Handles a window resize: flushes in-flight work and reconfigures
    /// the swapchain.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        let Some(core) = self.core.as_mut() else {
            return Ok(());
        };
        if width == 0 || height == 0 {
            return Ok(());
        }
        core.frame_ring.flush(&core.device)?;
        if let Some(surface) = self.surface.as_mut() {
            surface.config.width = width;
            surface.config.height = height;
            surface.frame = None;
            surface.surface.configure(&core.device, &surface.config);
        }
        Ok(())
    }

    // ========================================================================
    // Scene API
    // ========================================================================

    pub fn create_scene(&mut self) -> Result<SceneId> {
        let settings = self.settings.clone();
        let core = self.core()?;
        let scene = Scene::new(core, &settings);
        Ok(self.scenes.insert(scene))
    }

    #[must_use]
    pub fn scene(&self, id: SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn scene_mut(&mut self, id: SceneId) -> Option<&mut Scene> {
        self.scenes.get_mut(id)
    }

    fn scene_entry(&mut self, id: SceneId) -> Result<&mut Scene> {
        self.scenes
            .get_mut(id)
            .ok_or_else(|| RenderError::InvalidInput(format!("unknown scene {id:?}")))
    }

    /// Stages opaque and transparent drawable entities for packing.
    pub fn add_drawable_objects_to_scene(
        &mut self,
        scene: SceneId,
        opaque: &[Entity],
        transparent: &[Entity],
    ) -> Result<()> {
        self.scene_entry(scene)?.stage_drawables(opaque, transparent);
        Ok(())
    }

    /// Packs every staged drawable into the scene's GPU buffers.
    pub fn finalize_scene(&mut self, scene: SceneId) -> Result<()> {
        let settings = self.settings.clone();
        let Some(core) = self.core.as_mut() else {
            return Err(RenderError::InvalidInput(
                "renderer not initialized".to_owned(),
            ));
        };
        let scene = self
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RenderError::InvalidInput("unknown scene".to_owned()))?;
        scene.finalize(core, &settings)
    }

    /// Marks material mirrors stale; the table re-uploads next frame.
    pub fn update_scene_materials(&mut self, scene: SceneId, entities: &[Entity]) -> Result<()> {
        let Some(core) = self.core.as_ref() else {
            return Err(RenderError::InvalidInput(
                "renderer not initialized".to_owned(),
            ));
        };
        let scene = self
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RenderError::InvalidInput("unknown scene".to_owned()))?;
        scene.update_materials(core, entities);
        Ok(())
    }

    /// Replaces the outline selection set.
    pub fn select_entities(&mut self, scene: SceneId, entities: &[Entity]) -> Result<()> {
        self.scene_entry(scene)?.select_entities(entities);
        Ok(())
    }

    /// Runs the built-in system driver over the scene's snapshot.
    pub fn run_ecs(&mut self, scene: SceneId) -> Result<()> {
        crate::ecs::run_systems(&mut self.scene_entry(scene)?.components);
        Ok(())
    }

    /// Decodes HDR panorama bytes into the scene's skybox cubemap.
    pub fn load_skybox_from_panorama(
        &mut self,
        scene: SceneId,
        path: &str,
        resolution: u32,
    ) -> Result<()> {
        let bytes = std::fs::read(path)?;
        self.load_skybox_from_panorama_bytes(scene, &bytes, resolution)
    }

    pub fn load_skybox_from_panorama_bytes(
        &mut self,
        scene_id: SceneId,
        bytes: &[u8],
        resolution: u32,
    ) -> Result<()> {
        let data = TextureData::decode_hdr(bytes)?;
        let resolution = resolution.max(16).next_power_of_two();

        let Some(core) = self.core.as_mut() else {
            return Err(RenderError::InvalidInput(
                "renderer not initialized".to_owned(),
            ));
        };
        let scene = self
            .scenes
            .get_mut(scene_id)
            .ok_or_else(|| RenderError::InvalidInput("unknown scene".to_owned()))?;

        // Upload the panorama, then decode it into a cube on the GPU
        let panorama =
            texture::create_texture_2d(&core.device, &core.queue, &data, u32::MAX, "panorama")?;

        let cube = texture::create_cube_texture(
            &core.device,
            resolution,
            1,
            wgpu::TextureFormat::Rgba16Float,
            wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_DST,
            "skybox cube",
        );

        let pipeline_id = scene.variants.get_or_create_compute(
            &core.device,
            &core.shaders,
            ShaderTemplate::PanoramaToCube,
            &ShaderDefines::new(),
            &[&core.layouts.panorama],
        )?;

        let dest_view = cube.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("skybox cube dest"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            usage: Some(wgpu::TextureUsages::STORAGE_BINDING),
            ..Default::default()
        });
        let bind_group = core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("panorama decode"),
            layout: &core.layouts.panorama,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&panorama.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&core.samplers.skybox),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&dest_view),
                },
            ],
        });

        let mut encoder = core
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("panorama decode"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("panorama to cube"),
                timestamp_writes: None,
            });
            pass.set_pipeline(scene.variants.compute_pipeline(pipeline_id));
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = (resolution / 16).max(1);
            pass.dispatch_workgroups(groups, groups, 6);
        }
        core.queue.submit(std::iter::once(encoder.finish()));

        let cube_id: TextureId = core.registry.insert(cube);
        debug_assert_eq!(
            core.registry.get(cube_id).map(|t| t.kind),
            Some(TextureKind::Cube)
        );
        let cube_slot = scene.bindless.index_cube(cube_id)?;
        scene.skybox = Some(Skybox {
            texture: cube_id,
            cube_slot,
            show: true,
        });
        log::info!("skybox loaded at {resolution}");
        Ok(())
    }

    /// Decodes and uploads material texture bytes as a parallel batch —
    /// one job per texture, publishing into the registry behind a lock.
    /// Result order matches the input.
    pub fn load_material_textures(
        &mut self,
        items: &[(String, Vec<u8>, bool)],
    ) -> Result<Vec<TextureId>> {
        use rayon::prelude::*;
        let max_resolution = self.settings.max_texture_resolution;
        let core = self.core_mut()?;
        let device = core.device.clone();
        let queue = core.queue.clone();
        let registry = parking_lot::Mutex::new(&mut core.registry);

        let ids: Vec<Result<TextureId>> = items
            .par_iter()
            .map(|(name, bytes, srgb)| {
                let data = if *srgb {
                    TextureData::decode(bytes)?
                } else {
                    TextureData::decode_linear(bytes)?
                };
                let gpu = texture::create_texture_2d(&device, &queue, &data, max_resolution, name)?;
                Ok(registry.lock().insert(gpu))
            })
            .collect();

        ids.into_iter().collect()
    }

    // ========================================================================
    // View API
    // ========================================================================

    pub fn create_view(&mut self, scene: SceneId, size: (u32, u32)) -> Result<ViewId> {
        let Some(core) = self.core.as_ref() else {
            return Err(RenderError::InvalidInput(
                "renderer not initialized".to_owned(),
            ));
        };
        let scene = self
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RenderError::InvalidInput("unknown scene".to_owned()))?;
        scene.create_view(core, size).map(ViewId)
    }

    pub fn resize_view(&mut self, scene: SceneId, view: ViewId, size: (u32, u32)) -> Result<()> {
        let Some(core) = self.core.as_ref() else {
            return Err(RenderError::InvalidInput(
                "renderer not initialized".to_owned(),
            ));
        };
        let scene = self
            .scenes
            .get_mut(scene)
            .ok_or_else(|| RenderError::InvalidInput("unknown scene".to_owned()))?;
        let view = scene
            .view_mut(view.0)
            .ok_or_else(|| RenderError::InvalidInput("unknown view".to_owned()))?;
        view.resize(core, size);
        Ok(())
    }

    /// The view's tonemapped color texture.
    #[must_use]
    pub fn get_view_color_texture(&self, scene: SceneId, view: ViewId) -> Option<&wgpu::TextureView> {
        self.scenes
            .get(scene)?
            .view(view.0)
            .map(|v| &v.targets.final_color.view)
    }

    /// Requests a hover check at the cursor for the next rendered frame.
    pub fn request_hover_check(
        &mut self,
        scene: SceneId,
        view: ViewId,
        cursor: (u32, u32),
    ) -> Result<()> {
        let scene = self.scene_entry(scene)?;
        let view = scene
            .view_mut(view.0)
            .ok_or_else(|| RenderError::InvalidInput("unknown view".to_owned()))?;
        view.pick.request_hover = true;
        view.pick.cursor = cursor;
        Ok(())
    }

    /// The entity under the cursor from the most recent completed pick
    /// readback, or the null entity when none is ready.
    pub fn get_picked_entity(&mut self, scene_id: SceneId, view: ViewId) -> Entity {
        let Some(core) = self.core.as_ref() else {
            return Entity::NULL;
        };
        let Some(scene) = self.scenes.get_mut(scene_id) else {
            return Entity::NULL;
        };
        let slot = core.frame_ring.slot();

        // Index → live entity map for decode validation
        let mut by_index: rustc_hash::FxHashMap<u32, Entity> = rustc_hash::FxHashMap::default();
        for drawable in &scene.drawables.drawables {
            by_index.insert(drawable.entity.index(), drawable.entity);
        }

        let Some(view) = scene.views.get_mut(view.0 as usize) else {
            return Entity::NULL;
        };
        if !view.pick.is_ready(slot) {
            return view.pick.hovered;
        }
        match view
            .pick
            .resolve(&core.device, slot, |index| by_index.get(&index).copied())
        {
            Ok(entity) => entity,
            Err(err) => {
                log::debug!("pick readback not ready: {err}");
                Entity::NULL
            }
        }
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Starts a frame: waits for the slot's previous occupant, rewinds the
    /// staging slice, advances pick readback rings, and acquires the
    /// swapchain image. Returns `false` when the device or surface was
    /// lost and the host should recreate the window surface.
    pub fn begin_frame(&mut self) -> Result<bool> {
        let Some(core) = self.core.as_mut() else {
            return Err(RenderError::InvalidInput(
                "renderer not initialized".to_owned(),
            ));
        };

        if let Err(err) = core.frame_ring.begin(&core.device) {
            log::error!("begin_frame: {err}");
            return Ok(false);
        }
        let slot = core.frame_ring.slot();
        core.staging.reset(slot);
        core.draw_calls = 0;
        core.pending.clear();

        for (_, scene) in &mut self.scenes {
            for view in &mut scene.views {
                view.pick.advance(slot);
            }
        }

        if let Some(surface) = self.surface.as_mut() {
            match surface.surface.get_current_texture() {
                wgpu::CurrentSurfaceTexture::Success(frame)
                | wgpu::CurrentSurfaceTexture::Suboptimal(frame) => {
                    surface.frame = Some(frame);
                }
                wgpu::CurrentSurfaceTexture::Lost | wgpu::CurrentSurfaceTexture::Outdated => {
                    surface.surface.configure(&core.device, &surface.config);
                    core.frame_ring.skip();
                    return Ok(false);
                }
                err => {
                    log::error!("swapchain acquire failed: {err:?}");
                    core.frame_ring.skip();
                    return Ok(false);
                }
            }
        }

        self.prepared_scenes.clear();
        self.frame_active = true;
        Ok(true)
    }

    /// Renders one scene into one view. The first call for a scene in a
    /// frame also runs the shared passes (skinning, shadows, probes).
    pub fn render_scene(
        &mut self,
        scene_id: SceneId,
        view: ViewId,
        params: &RenderSceneParams,
    ) -> Result<()> {
        if !self.frame_active {
            return Err(RenderError::InvalidInput(
                "render_scene outside begin_frame/end_frame".to_owned(),
            ));
        }
        let settings = self.settings.clone();
        let first_for_scene = self.prepared_scenes.insert(scene_id);

        let Some(core) = self.core.as_mut() else {
            return Err(RenderError::InvalidInput(
                "renderer not initialized".to_owned(),
            ));
        };
        let scene = self
            .scenes
            .get_mut(scene_id)
            .ok_or_else(|| RenderError::InvalidInput("unknown scene".to_owned()))?;
        if scene.view(view.0).is_none() {
            return Err(RenderError::InvalidInput("unknown view".to_owned()));
        }

        let mut encoder = core
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene frame"),
            });

        if first_for_scene {
            graph::prepare_scene_frame(core, scene, &params.camera, &settings, &mut encoder)?;
        }

        let cull_camera = params.cull_camera.unwrap_or(params.camera);
        graph::render_view(
            core,
            scene,
            view.0 as usize,
            &params.camera,
            &cull_camera,
            &settings,
            &mut encoder,
        )?;

        // Upload everything the recorded passes reference
        let slot = core.frame_ring.slot();
        scene.write_shadow_frame_data(core, slot);
        scene.write_dynamic_data(core, slot);
        scene.materials.clear_dirty();

        core.pending.push(encoder.finish());
        self.last_rendered = Some((scene_id, view));
        Ok(())
    }

    /// Submits the frame's command buffers in order and presents.
    pub fn end_frame(&mut self) -> Result<()> {
        if !self.frame_active {
            return Ok(());
        }
        self.frame_active = false;

        // Blit the last rendered view into the swapchain image
        self.record_present();

        let Some(core) = self.core.as_mut() else {
            return Ok(());
        };
        let buffers = std::mem::take(&mut core.pending);
        if buffers.is_empty() {
            core.frame_ring.skip();
            if let Some(surface) = self.surface.as_mut() {
                surface.frame = None;
            }
            return Ok(());
        }
        core.queue.submit(buffers);

        if let Some(surface) = self.surface.as_mut() {
            if let Some(frame) = surface.frame.take() {
                frame.present();
            }
        }
        core.frame_ring.end();
        Ok(())
    }

    /// Records the swapchain blit from the last rendered view.
    fn record_present(&mut self) {
        let Some((scene_id, view_id)) = self.last_rendered else {
            return;
        };
        let Some(core) = self.core.as_ref() else {
            return;
        };
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        let Some(frame) = surface.frame.as_ref() else {
            return;
        };
        let Some(scene) = self.scenes.get(scene_id) else {
            return;
        };
        let Some(view) = scene.view(view_id.0) else {
            return;
        };

        // Lazily build the blit pipeline against the surface format
        if surface.blit_pipeline.is_none() {
            let mut defines = ShaderDefines::new();
            defines.flag("BLIT");
            let module = match core
                .shaders
                .compile(&core.device, ShaderTemplate::Tonemap, &defines)
            {
                Ok(module) => module,
                Err(err) => {
                    log::error!("present blit shader failed: {err}");
                    return;
                }
            };
            let layout = core
                .device
                .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some("present blit layout"),
                    bind_group_layouts: &[Some(&core.layouts.tonemap_input)],
                    immediate_size: 0,
                });
            surface.blit_pipeline = Some(core.device.create_render_pipeline(
                &wgpu::RenderPipelineDescriptor {
                    label: Some("present blit"),
                    layout: Some(&layout),
                    vertex: wgpu::VertexState {
                        module: &module,
                        entry_point: Some("vs_main"),
                        buffers: &[],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &module,
                        entry_point: Some("fs_main"),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: surface.config.format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: wgpu::PipelineCompilationOptions::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        ..Default::default()
                    },
                    depth_stencil: None,
                    multisample: wgpu::MultisampleState::default(),
                    multiview_mask: None,
                    cache: None,
                },
            ));
        }
        let Some(pipeline) = surface.blit_pipeline.as_ref() else {
            return;
        };

        let bind_group = core.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("present blit input"),
            layout: &core.layouts.tonemap_input,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view.targets.final_color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&core.samplers.default),
                },
            ],
        });
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = core
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("present blit"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("present blit"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.pending_push(encoder.finish());
    }

    fn pending_push(&mut self, buffer: wgpu::CommandBuffer) {
        if let Some(core) = self.core.as_mut() {
            core.pending.push(buffer);
        }
    }

    // ========================================================================
    // Diagnostics & teardown
    // ========================================================================

    /// Draw calls recorded in the current frame so far.
    #[must_use]
    pub fn draw_call_count(&self) -> u64 {
        self.core.as_ref().map_or(0, |c| c.draw_calls)
    }

    /// One-line-per-option graphics settings dump.
    #[must_use]
    pub fn show_graphics_options(&self) -> String {
        self.settings.summary()
    }

    /// Flushes the device and releases every scene.
    pub fn cleanup(&mut self) -> Result<()> {
        let scene_ids: Vec<SceneId> = self.scenes.keys().collect();
        if let Some(core) = self.core.as_mut() {
            core.frame_ring.flush(&core.device)?;
            core.pending.clear();
        }
        for id in scene_ids {
            if let Some(mut scene) = self.scenes.remove(id) {
                if let Some(core) = self.core.as_mut() {
                    scene.release(core);
                }
            }
        }
        self.surface = None;
        log::info!("renderer cleaned up");
        Ok(())
    }
}
