//! Environment Probe Capture & Prefilter
//!
//! Faces due this frame render through the G-buffer + lighting graph,
//! restricted to PROBE drawables (plus the skybox when the probe includes
//! it). Once no face remains dirty, the prefilter chain runs: the BRDF
//! LUT (once), the lambertian irradiance cube, and one GGX dispatch per
//! mip with the roughness stepped over the chain.

use glam::Vec3;

use crate::ecs::{Camera, ProbeFlags};
use crate::gpu::core::GpuCore;
use crate::graph::draw_stream::{DrawCall, DrawDynamicData, DrawStream};
use crate::math::sat_visibility_test;
use crate::pipeline::{ComputePipelineId, ShaderDefines, ShaderTemplate};
use crate::scene::Scene;
use crate::scene::probes::{BRDF_LUT_SIZE, EnvFilterParams, probe_face_camera};
use crate::scene::view::GpuGlobals;
use crate::settings::RenderSettings;

struct FilterPipelines {
    lambertian: ComputePipelineId,
    ggx: ComputePipelineId,
    brdf: ComputePipelineId,
}

fn resolve_filter_pipelines(core: &GpuCore, scene: &mut Scene) -> Option<FilterPipelines> {
    let mut lambertian_defines = ShaderDefines::new();
    lambertian_defines.set("DISTRIBUTION", 0);
    let mut ggx_defines = ShaderDefines::new();
    ggx_defines.set("DISTRIBUTION", 1);

    let layouts = [
        &core.layouts.env_filter_source,
        &core.layouts.env_filter_dest,
    ];
    let lambertian = scene
        .variants
        .get_or_create_compute(
            &core.device,
            &core.shaders,
            ShaderTemplate::EnvFilter,
            &lambertian_defines,
            &layouts,
        )
        .ok()?;
    let ggx = scene
        .variants
        .get_or_create_compute(
            &core.device,
            &core.shaders,
            ShaderTemplate::EnvFilter,
            &ggx_defines,
            &layouts,
        )
        .ok()?;
    let brdf = scene
        .variants
        .get_or_create_compute(
            &core.device,
            &core.shaders,
            ShaderTemplate::BrdfLut,
            &ShaderDefines::new(),
            &[&core.layouts.brdf_dest],
        )
        .ok()?;
    Some(FilterPipelines {
        lambertian,
        ggx,
        brdf,
    })
}

fn filter_params_buffer(device: &wgpu::Device, params: &EnvFilterParams) -> wgpu::Buffer {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("env filter params"),
        size: std::mem::size_of::<EnvFilterParams>() as u64,
        usage: wgpu::BufferUsages::UNIFORM,
        mapped_at_creation: true,
    });
    {
        let mut view = buffer.slice(..).get_mapped_range_mut();
        view.copy_from_slice(bytemuck::bytes_of(params));
    }
    buffer.unmap();
    buffer
}

pub fn record(
    core: &mut GpuCore,
    scene: &mut Scene,
    slot: usize,
    encoder: &mut wgpu::CommandEncoder,
    settings: &RenderSettings,
) {
    if scene.probes.is_empty() {
        return;
    }
    let Some(filters) = resolve_filter_pipelines(core, scene) else {
        log::error!("environment filter shaders unavailable; probes skipped");
        return;
    };
    let frame_number = core.frame_ring.frame_number();

    for probe_index in 0..scene.probes.len() {
        let faces = scene.probes[probe_index].faces_due(frame_number);
        if faces.is_empty() {
            continue;
        }

        for &face in &faces {
            record_probe_face(core, scene, probe_index, face, slot, encoder, settings);
            let probe = &mut scene.probes[probe_index];
            probe.faces_dirty[face as usize] = false;
            probe.current_face = (face + 1) % 6;
        }

        let probe = &mut scene.probes[probe_index];
        let all_clean = !probe.faces_dirty.iter().any(|d| *d);
        if all_clean {
            probe.flags.remove(ProbeFlags::DIRTY);
            record_prefilter(core, scene, probe_index, encoder, &filters);
            scene.probes[probe_index].static_filters_done = true;
        }
    }
}

/// One cube face through G-buffer + lighting (+ skybox), restricted to
/// the probe set.
fn record_probe_face(
    core: &mut GpuCore,
    scene: &mut Scene,
    probe_index: usize,
    face: u32,
    slot: usize,
    encoder: &mut wgpu::CommandEncoder,
    settings: &RenderSettings,
) {
    let (position, range, resolution) = {
        let probe = &scene.probes[probe_index];
        (probe.position, probe.range, probe.resolution)
    };
    let (view_matrix, _projection) = probe_face_camera(position, face, 0.05, range.max(1.0) * 4.0);

    // Face camera for culling and globals
    let forward = -Vec3::new(view_matrix.x_axis.z, view_matrix.y_axis.z, view_matrix.z_axis.z);
    let mut camera = Camera::look_at(
        position,
        position + forward,
        std::f32::consts::FRAC_PI_2,
        1.0,
        0.05,
        range.max(1.0) * 4.0,
    );
    camera.view = view_matrix;

    // Cull the probe set against the face frustum and split it the way
    // the main view does: DEFERRED drawables feed the face's G-buffer,
    // the rest render forward.
    let probe_drawables = scene.drawables.probe_drawables.clone();
    let mut visible_opaque = Vec::new();
    let mut visible_transparent = Vec::new();
    for &index in &probe_drawables {
        let drawable = &scene.drawables.drawables[index as usize];
        let mesh_entity = scene
            .components
            .objects
            .get(drawable.entity)
            .map_or(drawable.entity, |o| o.mesh);
        let Some(mesh) = scene.components.meshes.get(mesh_entity) else {
            continue;
        };
        if !settings.frustum_culling || sat_visibility_test(&camera, &mesh.world_aabb) {
            if drawable.flags.contains(crate::scene::DrawableFlags::DEFERRED) {
                visible_opaque.push(index);
            } else {
                visible_transparent.push(index);
            }
        }
    }

    // Forward set draws back to front in the face camera's frame
    {
        let view = camera.view;
        let mut keyed: Vec<(f32, u32)> = visible_transparent
            .iter()
            .map(|&index| {
                let drawable = &scene.drawables.drawables[index as usize];
                let world = scene.transforms_cpu[drawable.transform_index as usize];
                (view.transform_point3(world.w_axis.truncate()).z, index)
            })
            .collect();
        keyed.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        visible_transparent = keyed.into_iter().map(|(_, index)| index).collect();
    }

    // The probe's per-face lists are the canonical record; the streams
    // below are built from them.
    scene.probes[probe_index].visible_opaque[face as usize] = visible_opaque;
    scene.probes[probe_index].visible_transparent[face as usize] = visible_transparent;

    // Face globals + bind group
    let globals = GpuGlobals::from_camera(
        &camera,
        (resolution, resolution),
        settings.punctual_lighting,
        false,
        true,
        scene.lights_cpu.len() as u32,
        0,
    );
    core.queue.write_buffer(
        &scene.probes[probe_index].face_globals[face as usize],
        0,
        bytemuck::bytes_of(&globals),
    );
    let global_bind_group = scene.build_global_bind_group(
        core,
        slot,
        &scene.probes[probe_index].face_globals[face as usize],
    );

    // Streams for the face: G-buffer over the opaque set, forward over
    // the sorted transparent set
    fn push_env_call(scene: &mut Scene, stream: &mut DrawStream, slot: usize, index: u32) {
        let drawable = scene.drawables.drawables[index as usize].clone();
        let Some(pipeline) = drawable.env_shader else {
            return;
        };
        let (data_offset, vertex_offset, base_vertex) = drawable.frame_offsets(slot);
        let dynamic_offset = scene.dynamic.push(&DrawDynamicData {
            data_offset: data_offset as i32,
            vertex_offset: vertex_offset as i32,
            material_index: drawable.material_index,
            transform_index: drawable.transform_index,
            extra: [0.0; 4],
        });
        stream.push(DrawCall {
            pipeline,
            dynamic_offset,
            index_offset: drawable.index_offset,
            index_count: drawable.index_count,
            base_vertex,
            instance_range: (0, 1),
            viewport: None,
            stencil_reference: None,
        });
    }

    let face_opaque = scene.probes[probe_index].visible_opaque[face as usize].clone();
    let face_transparent = scene.probes[probe_index].visible_transparent[face as usize].clone();
    let mut stream = DrawStream::new();
    for &index in &face_opaque {
        push_env_call(scene, &mut stream, slot, index);
    }
    let mut forward_stream = DrawStream::new();
    for &index in &face_transparent {
        push_env_call(scene, &mut forward_stream, slot, index);
    }

    let include_sky = scene.probes[probe_index]
        .flags
        .contains(ProbeFlags::INCLUDE_SKY);
    let skybox_dynamic = if include_sky {
        scene
            .skybox
            .as_ref()
            .filter(|s| s.show)
            .map(|s| s.cube_slot)
            .map(|cube_slot| {
                scene.dynamic.push(&DrawDynamicData {
                    data_offset: 0,
                    vertex_offset: 0,
                    material_index: 0,
                    transform_index: 0,
                    extra: [cube_slot as f32, 0.0, 0.0, 0.0],
                })
            })
    } else {
        None
    };

    fn attachment(view: &wgpu::TextureView) -> Option<wgpu::RenderPassColorAttachment<'_>> {
        Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })
    }

    let face_index = face as usize;
    let probe = &scene.probes[probe_index];
    let frame = &scene.frames[slot];

    // G-buffer pass for the face
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("probe gbuffer pass"),
            color_attachments: &[
                attachment(&probe.albedo.face_views[face_index]),
                attachment(&probe.normal.face_views[face_index]),
                attachment(&probe.ao_metal_roughness.face_views[face_index]),
                attachment(&probe.emissive.face_views[face_index]),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &probe.depth.face_views[face_index],
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        if let (Some(vertex_buffer), Some(index_buffer)) =
            (scene.vertex_buffer.as_ref(), scene.index_buffer.as_ref())
        {
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(0, &global_bind_group, &[]);
            core.draw_calls += stream.replay(&mut pass, &scene.variants, &frame.dynamic_bind_group);
        }
    }

    // Lighting resolve into the face's raw output, then the skybox
    {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("probe lighting pass"),
            color_attachments: &[attachment(&probe.raw_output.face_views[face_index])],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        if let Some(pipeline) = scene.pipelines.probe_lighting {
            pass.set_pipeline(scene.variants.render_pipeline(pipeline));
            pass.set_bind_group(0, &global_bind_group, &[]);
            pass.set_bind_group(1, &probe.lighting_bind_groups[face_index], &[]);
            pass.draw(0..3, 0..1);
            core.draw_calls += 1;
        }
    }

    if let (Some(pipeline), Some(dynamic_offset)) = (scene.pipelines.probe_skybox, skybox_dynamic) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("probe skybox pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &probe.raw_output.face_views[face_index],
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &probe.depth.face_views[face_index],
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        pass.set_pipeline(scene.variants.render_pipeline(pipeline));
        pass.set_bind_group(0, &global_bind_group, &[]);
        pass.set_bind_group(1, &frame.dynamic_bind_group, &[dynamic_offset]);
        pass.draw(0..3, 0..1);
        core.draw_calls += 1;
    }

    // Forward set over the lit face, back to front against its depth
    if !forward_stream.is_empty() {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("probe forward pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &probe.raw_output.face_views[face_index],
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &probe.depth.face_views[face_index],
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Discard,
                }),
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        if let (Some(vertex_buffer), Some(index_buffer)) =
            (scene.vertex_buffer.as_ref(), scene.index_buffer.as_ref())
        {
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.set_bind_group(0, &global_bind_group, &[]);
            core.draw_calls +=
                forward_stream.replay(&mut pass, &scene.variants, &frame.dynamic_bind_group);
        }
    }
}

/// The prefilter chain: BRDF LUT once, lambertian irradiance, and the
/// GGX mip ladder with roughness `m / (mips − 1)`.
fn record_prefilter(
    core: &GpuCore,
    scene: &Scene,
    probe_index: usize,
    encoder: &mut wgpu::CommandEncoder,
    filters: &FilterPipelines,
) {
    let probe = &scene.probes[probe_index];
    let device = &core.device;
    let resolution = probe.resolution;
    let sample_count = probe.sample_count as i32;

    let source_bind_group = |params: &EnvFilterParams| {
        let buffer = filter_params_buffer(device, params);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("env filter source"),
            layout: &core.layouts.env_filter_source,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&probe.capture_cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&core.samplers.env),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: buffer.as_entire_binding(),
                },
            ],
        });
        (buffer, bind_group)
    };

    let dest_bind_group = |view: &wgpu::TextureView| {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("env filter dest"),
            layout: &core.layouts.env_filter_dest,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        })
    };

    // BRDF LUT, generated once per probe
    if !probe.static_filters_done {
        if let Some(lut) = core.registry.get(probe.brdf_lut) {
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("brdf lut dest"),
                layout: &core.layouts.brdf_dest,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&lut.view),
                }],
            });
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("brdf lut"),
                timestamp_writes: None,
            });
            pass.set_pipeline(scene.variants.compute_pipeline(filters.brdf));
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(BRDF_LUT_SIZE / 16, BRDF_LUT_SIZE / 16, 1);
        }
    }

    // Lambertian irradiance over the whole cube
    if let Some(lambertian) = core.registry.get(probe.lambertian) {
        let dest_view = lambertian.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("lambertian dest"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            usage: Some(wgpu::TextureUsages::STORAGE_BINDING),
            ..Default::default()
        });
        let params = EnvFilterParams {
            resolution: resolution as i32,
            roughness: 0.0,
            sample_count,
            width: resolution as i32,
            distribution: 0,
            mip_level: 0,
            _unused: [0; 2],
        };
        let (_buffer, source) = source_bind_group(&params);
        let dest = dest_bind_group(&dest_view);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("lambertian filter"),
            timestamp_writes: None,
        });
        pass.set_pipeline(scene.variants.compute_pipeline(filters.lambertian));
        pass.set_bind_group(0, &source, &[]);
        pass.set_bind_group(1, &dest, &[]);
        let groups = (resolution / 16).max(1);
        pass.dispatch_workgroups(groups, groups, 6);
    }

    // GGX ladder: one dispatch per mip
    if let Some(ggx) = core.registry.get(probe.ggx) {
        let mips = probe.ggx_mip_count;
        for mip in 0..mips {
            let width = (resolution >> mip).max(16);
            let roughness = if mips > 1 {
                mip as f32 / (mips - 1) as f32
            } else {
                0.0
            };
            let dest_view = ggx.texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some("ggx mip dest"),
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                base_mip_level: mip,
                mip_level_count: Some(1),
                base_array_layer: 0,
                array_layer_count: Some(6),
                usage: Some(wgpu::TextureUsages::STORAGE_BINDING),
                ..Default::default()
            });
            let params = EnvFilterParams {
                resolution: resolution as i32,
                roughness,
                sample_count,
                width: width as i32,
                distribution: 1,
                mip_level: mip as i32,
                _unused: [0; 2],
            };
            let (_buffer, source) = source_bind_group(&params);
            let dest = dest_bind_group(&dest_view);
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ggx filter"),
                timestamp_writes: None,
            });
            pass.set_pipeline(scene.variants.compute_pipeline(filters.ggx));
            pass.set_bind_group(0, &source, &[]);
            pass.set_bind_group(1, &dest, &[]);
            pass.dispatch_workgroups(width / 16, width / 16, 6);
        }
    }
}
