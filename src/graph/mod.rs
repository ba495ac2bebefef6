//! Per-View Render Graph
//!
//! The fixed pass order of a frame: skinning (shared), shadow atlas,
//! probe captures, then per view — G-buffer, deferred lighting, forward,
//! post-process, and the on-demand pick pass. Every pass builds an
//! immutable draw stream and replays it; scene-frame preparation runs
//! once per scene per frame, before its first view.

pub mod culling;
pub mod draw_stream;
pub mod probe_pass;
pub mod shadow_pass;
pub mod skinning_pass;
pub mod view_passes;

use crate::ecs::Camera;
use crate::errors::Result;
use crate::gpu::core::GpuCore;
use crate::scene::Scene;
use crate::scene::view::GpuGlobals;
use crate::settings::RenderSettings;

pub use draw_stream::{DrawCall, DrawDynamicData, DrawStream, ShadowDynamicData};

/// Once-per-frame scene preparation: per-frame buffer writes, skinning,
/// shadow atlas, probe updates.
pub fn prepare_scene_frame(
    core: &mut GpuCore,
    scene: &mut Scene,
    camera: &Camera,
    settings: &RenderSettings,
    encoder: &mut wgpu::CommandEncoder,
) -> Result<()> {
    let slot = core.frame_ring.slot();

    scene.dynamic.clear();
    scene.instances_cpu.clear();
    scene.write_frame_data(core, slot)?;

    skinning_pass::record(core, scene, slot, encoder);

    if let Err(err) = shadow_pass::prepare(core, scene, camera) {
        log::warn!("shadow preparation degraded: {err}");
    }

    // All growth happens before any pass captures a frame bind group
    let estimate = scene.dynamic_slot_estimate();
    scene.ensure_dynamic_capacity(core, slot, estimate);
    scene.ensure_frame_capacity(core, slot);

    shadow_pass::record(core, scene, slot, encoder);

    probe_pass::record(core, scene, slot, encoder, settings);
    Ok(())
}

/// Records one view's graph into the frame encoder.
pub fn render_view(
    core: &mut GpuCore,
    scene: &mut Scene,
    view_index: usize,
    camera: &Camera,
    cull_camera: &Camera,
    settings: &RenderSettings,
    encoder: &mut wgpu::CommandEncoder,
) -> Result<()> {
    let slot = core.frame_ring.slot();

    // Culling: parallel batch, then the view's lists
    let visibility = culling::cull_drawables(scene, cull_camera, settings.frustum_culling);
    {
        let mut lists = std::mem::take(&mut scene.views[view_index].visible);
        culling::build_visible_lists(scene, camera, &visibility, &mut lists);
        scene.views[view_index].visible = lists;
    }

    // View globals for the frame slot
    let size = scene.views[view_index].size;
    let globals = GpuGlobals::from_camera(
        camera,
        size,
        settings.punctual_lighting,
        settings.image_based_lighting,
        true,
        scene.lights_cpu.len() as u32,
        scene.probes.len() as u32,
    );
    scene.views[view_index].write_globals(&core.queue, slot, &globals);

    let global_bind_group =
        scene.build_global_bind_group(core, slot, &scene.views[view_index].globals[slot]);

    view_passes::record_gbuffer(core, scene, view_index, slot, encoder, &global_bind_group);
    view_passes::record_lighting(core, scene, view_index, encoder, &global_bind_group, settings);
    view_passes::record_forward(
        core,
        scene,
        view_index,
        slot,
        encoder,
        &global_bind_group,
        settings,
    );
    view_passes::record_post_process(core, scene, view_index, encoder);
    view_passes::record_pick(core, scene, view_index, slot, encoder, &global_bind_group);

    Ok(())
}
