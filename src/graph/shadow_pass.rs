//! Shadow Pass
//!
//! Preparation packs the frame's shadow requests into the atlas and
//! builds every light's view-projection set; recording replays one
//! depth-only draw per (atlas rectangle, caster), the viewport set from
//! the rectangle and the caster's instance record carrying its slice
//! index.

use glam::Vec4;

use crate::ecs::{Camera, LightKind};
use crate::errors::Result;
use crate::gpu::core::GpuCore;
use crate::graph::draw_stream::{DrawCall, DrawStream, ShadowDynamicData};
use crate::scene::Scene;
use crate::scene::lights::GpuLightShadowData;
use crate::scene::scene::GpuInstance;
use crate::shadows::atlas::ShadowRequest;
use crate::shadows::cascades::{
    build_cascade_view_projection, build_spot_view_projection, compute_cascade_splits,
    frustum_slice_corners_world, point_light_face_matrices,
};
use crate::MAX_SHADOW_CASCADES;

/// Furthest shadow caster from the camera, used to extend directional
/// cascade near planes toward the light.
fn caster_extent(scene: &Scene, camera: &Camera) -> f32 {
    let mut max_distance = 50.0f32;
    for &index in scene
        .drawables
        .shadow_deferred
        .iter()
        .chain(&scene.drawables.shadow_forward)
    {
        let drawable = &scene.drawables.drawables[index as usize];
        let mesh_entity = scene
            .components
            .objects
            .get(drawable.entity)
            .map_or(drawable.entity, |o| o.mesh);
        if let Some(mesh) = scene.components.meshes.get(mesh_entity) {
            if mesh.world_aabb.is_finite() {
                let center = mesh.world_aabb.center();
                let radius = mesh.world_aabb.half_extents().length();
                max_distance = max_distance.max(camera.position.distance(center) + radius);
            }
        }
    }
    max_distance
}

/// Packs the atlas and fills the frame's shadow records. Lights that do
/// not fit lose shadows for the frame.
pub fn prepare(core: &GpuCore, scene: &mut Scene, camera: &Camera) -> Result<()> {
    scene.shadow_cpu.clear();

    let mut requests = Vec::new();
    for (index, light) in scene.lights_cpu.iter().enumerate() {
        if light.cast_shadow == 0 {
            continue;
        }
        let entity = scene.light_entities[index];
        let Some(component) = scene.components.lights.get(entity) else {
            continue;
        };
        let slice_count = match component.kind {
            LightKind::Directional => component.cascade_count.clamp(1, MAX_SHADOW_CASCADES),
            LightKind::Point => 6,
            LightKind::Spot { .. } => 1,
        };
        requests.push(ShadowRequest {
            light_index: index as u32,
            slice_count,
            resolution: component.shadow_resolution.max(64).next_power_of_two(),
        });
    }

    if requests.is_empty() {
        return Ok(());
    }

    let outcome = scene.atlas.pack(&requests);
    scene.atlas.ensure_texture(&core.device);
    let atlas_resolution = scene.atlas.resolution() as f32;
    let extension = caster_extent(scene, camera);

    for request in &requests {
        let light_index = request.light_index as usize;
        if outcome.dropped.contains(&request.light_index) {
            scene.lights_cpu[light_index].shadow_index = -1;
            continue;
        }
        let entity = scene.light_entities[light_index];
        let Some(component) = scene.components.lights.get(entity).copied() else {
            continue;
        };

        let mut record = GpuLightShadowData::default();

        // Slice rectangles, in slice order
        let mut rects: smallvec::SmallVec<[_; 6]> = scene
            .atlas
            .rects
            .iter()
            .filter(|r| r.light_index == request.light_index)
            .copied()
            .collect();
        rects.sort_by_key(|r| r.slice);
        for rect in &rects {
            record.slice_rects[rect.slice as usize] = Vec4::new(
                rect.x as f32 / atlas_resolution,
                rect.y as f32 / atlas_resolution,
                rect.size as f32 / atlas_resolution,
                0.0,
            );
        }

        let cascade_count;
        match component.kind {
            LightKind::Directional => {
                cascade_count = request.slice_count;
                let shadow_far = if camera.far.is_finite() {
                    camera.far.min(100.0)
                } else {
                    100.0
                };
                let splits = compute_cascade_splits(
                    cascade_count,
                    camera.near.max(0.01),
                    shadow_far,
                    component.cascade_split_lambda,
                );
                let mut previous = camera.near.max(0.01);
                for cascade in 0..cascade_count as usize {
                    let corners = frustum_slice_corners_world(camera, previous, splits[cascade]);
                    previous = splits[cascade];
                    record.view_projections[cascade] = build_cascade_view_projection(
                        component.direction,
                        &corners,
                        request.resolution,
                        extension,
                    );
                }
                record.cascade_splits =
                    Vec4::new(splits[0], splits[1], splits[2], splits[3]);
            }
            LightKind::Point => {
                cascade_count = 6;
                let faces = point_light_face_matrices(component.position, component.range);
                record.view_projections[..6].copy_from_slice(&faces);
            }
            LightKind::Spot { outer_cone, .. } => {
                cascade_count = 1;
                record.view_projections[0] = build_spot_view_projection(
                    component.position,
                    component.direction,
                    outer_cone,
                    component.range,
                );
            }
        }

        let light = &mut scene.lights_cpu[light_index];
        light.shadow_index = scene.shadow_cpu.len() as i32;
        light.cascade_count = cascade_count as i32;
        record.shadow_map_index = scene.atlas.bindless_index as i32;
        scene.shadow_cpu.push(record);
    }

    Ok(())
}

/// Records the atlas render pass: every rectangle draws its light's
/// casters through the per-slice viewport.
pub fn record(
    core: &mut GpuCore,
    scene: &mut Scene,
    slot: usize,
    encoder: &mut wgpu::CommandEncoder,
) {
    if scene.shadow_cpu.is_empty() || scene.atlas.view.is_none() {
        return;
    }

    // Build the stream: one draw per (rect, caster)
    let mut stream = DrawStream::new();
    let caster_indices: Vec<u32> = scene
        .drawables
        .shadow_deferred
        .iter()
        .chain(&scene.drawables.shadow_forward)
        .copied()
        .collect();
    let rects = scene.atlas.rects.clone();

    for rect in &rects {
        let light_index = rect.light_index as usize;
        let shadow_index = scene.lights_cpu[light_index].shadow_index;
        if shadow_index < 0 {
            continue;
        }
        for &caster in &caster_indices {
            let drawable = scene.drawables.drawables[caster as usize].clone();
            let Some(pipeline) = drawable.shadow_shader else {
                continue;
            };
            let (data_offset, vertex_offset, base_vertex) = drawable.frame_offsets(slot);
            let instance_base = scene.instances_cpu.len() as u32;
            scene.instances_cpu.push(GpuInstance {
                transform_index: drawable.transform_index,
                viewport_index: rect.slice as i32,
                _unused: [0; 2],
            });
            let dynamic_offset = scene.dynamic.push(&ShadowDynamicData {
                data_offset: data_offset as i32,
                vertex_offset: vertex_offset as i32,
                material_index: drawable.material_index,
                shadow_index: shadow_index as u32,
            });
            stream.push(DrawCall {
                pipeline,
                dynamic_offset,
                index_offset: drawable.index_offset,
                index_count: drawable.index_count,
                base_vertex,
                instance_range: (instance_base, instance_base + 1),
                viewport: Some([
                    rect.x as f32,
                    rect.y as f32,
                    rect.size as f32,
                    rect.size as f32,
                ]),
                stencil_reference: None,
            });
        }
    }

    if stream.is_empty() {
        return;
    }

    // Instance/shadow buffers must reach final size before any bind group
    // captures them for the frame.
    scene.ensure_frame_capacity(core, slot);

    let global_bind_group = scene.build_global_bind_group(core, slot, &scene.shadow_globals);
    let atlas_view = scene.atlas.view.as_ref().expect("atlas texture ensured");
    let frame = &scene.frames[slot];

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("shadow atlas pass"),
        color_attachments: &[],
        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
            view: atlas_view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Clear(1.0),
                store: wgpu::StoreOp::Store,
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
        pass.set_bind_group(0, &global_bind_group, &[]);
        core.draw_calls += stream.replay(&mut pass, &scene.variants, &frame.dynamic_bind_group);
    }
}
