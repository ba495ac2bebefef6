//! Per-View Passes
//!
//! The view's render graph after shadows: G-buffer over the visible
//! deferred set, the full-screen deferred lighting resolve, the forward
//! chain (skybox, sorted transparencies, selection outlines), the
//! tonemap into the final texture, and the on-demand pick pass with its
//! one-texel readback copy.

use crate::gpu::core::GpuCore;
use crate::graph::draw_stream::{DrawCall, DrawDynamicData, DrawStream};
use crate::scene::Scene;
use crate::scene::picking;
use crate::settings::RenderSettings;

fn color_attachment<'a>(
    view: &'a wgpu::TextureView,
    clear: Option<wgpu::Color>,
) -> Option<wgpu::RenderPassColorAttachment<'a>> {
    Some(wgpu::RenderPassColorAttachment {
        view,
        resolve_target: None,
        ops: wgpu::Operations {
            load: clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
            store: wgpu::StoreOp::Store,
        },
        depth_slice: None,
    })
}

fn push_drawable_call(
    scene: &mut Scene,
    stream: &mut DrawStream,
    slot: usize,
    drawable_index: u32,
    pipeline: crate::pipeline::RenderPipelineId,
    extra: [f32; 4],
    stencil_reference: Option<u32>,
) {
    let drawable = scene.drawables.drawables[drawable_index as usize].clone();
    let (data_offset, vertex_offset, base_vertex) = drawable.frame_offsets(slot);
    let dynamic_offset = scene.dynamic.push(&DrawDynamicData {
        data_offset: data_offset as i32,
        vertex_offset: vertex_offset as i32,
        material_index: drawable.material_index,
        transform_index: drawable.transform_index,
        extra,
    });
    stream.push(DrawCall {
        pipeline,
        dynamic_offset,
        index_offset: drawable.index_offset,
        index_count: drawable.index_count,
        base_vertex,
        instance_range: (0, 1),
        viewport: None,
        stencil_reference,
    });
}

// ─── G-buffer ────────────────────────────────────────────────────────────────

/// Renders the visible deferred set into the G-buffer attachments.
pub fn record_gbuffer(
    core: &mut GpuCore,
    scene: &mut Scene,
    view_index: usize,
    slot: usize,
    encoder: &mut wgpu::CommandEncoder,
    global_bind_group: &wgpu::BindGroup,
) {
    let opaque = scene.views[view_index].visible.opaque.clone();
    let mut stream = DrawStream::new();
    for &index in &opaque {
        let Some(pipeline) = scene.drawables.drawables[index as usize].shader else {
            continue;
        };
        push_drawable_call(scene, &mut stream, slot, index, pipeline, [0.0; 4], None);
    }

    let view = &scene.views[view_index];
    let frame = &scene.frames[slot];
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("gbuffer pass"),
        color_attachments: &[
            color_attachment(&view.targets.albedo.view, Some(wgpu::Color::BLACK)),
            color_attachment(&view.targets.normal.view, Some(wgpu::Color::BLACK)),
            color_attachment(&view.targets.ao_metal_roughness.view, Some(wgpu::Color::BLACK)),
            color_attachment(&view.targets.emissive.view, Some(wgpu::Color::BLACK)),
        ],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &view.targets.depth.view,
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
        pass.set_bind_group(0, global_bind_group, &[]);
        core.draw_calls += stream.replay(&mut pass, &scene.variants, &frame.dynamic_bind_group);
    }
}

// ─── Deferred lighting ───────────────────────────────────────────────────────

/// Full-screen resolve of the G-buffer: direct punctual lighting, probe
/// IBL, and shadow attenuation from the atlas.
pub fn record_lighting(
    core: &mut GpuCore,
    scene: &Scene,
    view_index: usize,
    encoder: &mut wgpu::CommandEncoder,
    global_bind_group: &wgpu::BindGroup,
    settings: &RenderSettings,
) {
    let pipeline = if settings.image_based_lighting && !scene.probes.is_empty() {
        scene.pipelines.env_lighting
    } else {
        scene.pipelines.lighting
    };
    let Some(pipeline) = pipeline else {
        return;
    };

    let view = &scene.views[view_index];
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("deferred lighting pass"),
        color_attachments: &[color_attachment(
            &view.targets.raw_output.view,
            Some(settings.clear_color),
        )],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    pass.set_pipeline(scene.variants.render_pipeline(pipeline));
    pass.set_bind_group(0, global_bind_group, &[]);
    pass.set_bind_group(1, &view.lighting_bind_group, &[]);
    pass.draw(0..3, 0..1);
    core.draw_calls += 1;
}

// ─── Forward ─────────────────────────────────────────────────────────────────

/// Skybox, back-to-front transparencies, then selection outlines.
pub fn record_forward(
    core: &mut GpuCore,
    scene: &mut Scene,
    view_index: usize,
    slot: usize,
    encoder: &mut wgpu::CommandEncoder,
    global_bind_group: &wgpu::BindGroup,
    settings: &RenderSettings,
) {
    // Transparent stream (already sorted back to front by culling)
    let transparent = scene.views[view_index].visible.transparent.clone();
    let mut stream = DrawStream::new();
    for &index in &transparent {
        let Some(pipeline) = scene.drawables.drawables[index as usize].shader else {
            continue;
        };
        push_drawable_call(scene, &mut stream, slot, index, pipeline, [0.0; 4], None);
    }

    // Selection outlines: stencil mask, then the inflated edge draw
    let mut outline_stream = DrawStream::new();
    let outline_scale = 1.0 + settings.outline_width as f32 * 0.01;
    if let (Some(mask_pipeline), Some(edge_pipeline)) =
        (scene.pipelines.outline_mask, scene.pipelines.outline_edge)
    {
        let selected = scene.selected.clone();
        for entity in selected {
            let Some(index) = scene.drawables.index_of(entity) else {
                continue;
            };
            push_drawable_call(
                scene,
                &mut outline_stream,
                slot,
                index,
                mask_pipeline,
                [0.0; 4],
                Some(0xFF),
            );
            push_drawable_call(
                scene,
                &mut outline_stream,
                slot,
                index,
                edge_pipeline,
                // Outline color and inflation factor
                [1.0, 0.6, 0.1, outline_scale],
                Some(0),
            );
        }
    }

    let skybox = scene
        .skybox
        .as_ref()
        .filter(|s| s.show)
        .map(|s| s.cube_slot);
    let skybox_dynamic = skybox.map(|slot_index| {
        scene.dynamic.push(&DrawDynamicData {
            data_offset: 0,
            vertex_offset: 0,
            material_index: 0,
            transform_index: 0,
            extra: [slot_index as f32, 0.0, 0.0, 0.0],
        })
    });

    let view = &scene.views[view_index];
    let frame = &scene.frames[slot];
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("forward pass"),
        color_attachments: &[color_attachment(&view.targets.raw_output.view, None)],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: &view.targets.depth.view,
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
    pass.set_bind_group(0, global_bind_group, &[]);

    // Skybox first: depth-equal against the cleared far plane
    if let (Some(pipeline), Some(dynamic_offset)) = (scene.pipelines.skybox, skybox_dynamic) {
        pass.set_pipeline(scene.variants.render_pipeline(pipeline));
        pass.set_bind_group(1, &frame.dynamic_bind_group, &[dynamic_offset]);
        pass.draw(0..3, 0..1);
        core.draw_calls += 1;
    }

    if let (Some(vertex_buffer), Some(index_buffer)) =
        (scene.vertex_buffer.as_ref(), scene.index_buffer.as_ref())
    {
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        core.draw_calls += stream.replay(&mut pass, &scene.variants, &frame.dynamic_bind_group);
        core.draw_calls +=
            outline_stream.replay(&mut pass, &scene.variants, &frame.dynamic_bind_group);
    }
}

// ─── Post-process ────────────────────────────────────────────────────────────

/// Tonemap + gamma from the HDR raw output into the view's final
/// texture.
pub fn record_post_process(
    core: &mut GpuCore,
    scene: &Scene,
    view_index: usize,
    encoder: &mut wgpu::CommandEncoder,
) {
    let Some(pipeline) = scene.pipelines.tonemap else {
        return;
    };
    let view = &scene.views[view_index];
    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("post process pass"),
        color_attachments: &[color_attachment(
            &view.targets.final_color.view,
            Some(wgpu::Color::BLACK),
        )],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
    pass.set_pipeline(scene.variants.render_pipeline(pipeline));
    pass.set_bind_group(0, &view.tonemap_bind_group, &[]);
    pass.draw(0..3, 0..1);
    core.draw_calls += 1;
}

// ─── Pick ────────────────────────────────────────────────────────────────────

/// On-demand id pass plus the cursor-texel copy into the frame's
/// readback buffer.
pub fn record_pick(
    core: &mut GpuCore,
    scene: &mut Scene,
    view_index: usize,
    slot: usize,
    encoder: &mut wgpu::CommandEncoder,
    global_bind_group: &wgpu::BindGroup,
) {
    if !scene.views[view_index].pick.request_hover {
        return;
    }
    let Some(pick_pipeline) = scene.pick_pipeline else {
        return;
    };

    let all = scene.views[view_index].visible.all.clone();
    let mut stream = DrawStream::new();
    for &index in &all {
        let entity = scene.drawables.drawables[index as usize].entity;
        let color = picking::encode_entity_color(entity);
        push_drawable_call(scene, &mut stream, slot, index, pick_pipeline, color, None);
    }

    {
        let view = &scene.views[view_index];
        let frame = &scene.frames[slot];
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("pick pass"),
            color_attachments: &[color_attachment(
                &view.targets.pick.view,
                Some(picking::clear_color()),
            )],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &view.targets.depth.view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Discard,
                }),
                stencil_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(0),
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
            pass.set_bind_group(0, global_bind_group, &[]);
            core.draw_calls += stream.replay(&mut pass, &scene.variants, &frame.dynamic_bind_group);
        }
    }

    // One texel under the cursor into the frame's readback slot
    let view = &mut scene.views[view_index];
    let (x, y) = (
        view.pick.cursor.0.min(view.size.0.saturating_sub(1)),
        view.pick.cursor.1.min(view.size.1.saturating_sub(1)),
    );
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture: &view.targets.pick.texture,
            mip_level: 0,
            origin: wgpu::Origin3d { x, y, z: 0 },
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: view.pick.buffer(slot),
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: None,
                rows_per_image: None,
            },
        },
        wgpu::Extent3d {
            width: 1,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
    view.pick.mark_copied(slot);
    view.pick.request_hover = false;
}
