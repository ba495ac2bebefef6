//! Skinning Dispatch
//!
//! Runs once per frame before the first view: joint matrices are staged
//! and blitted into each skin's frame texture, then every skin dispatches
//! its deform pass into the live vertex and data buffers.

use crate::gpu::core::GpuCore;
use crate::scene::Scene;

pub fn record(
    core: &mut GpuCore,
    scene: &mut Scene,
    slot: usize,
    encoder: &mut wgpu::CommandEncoder,
) {
    if scene.skins.is_empty() {
        return;
    }
    let Some(pipeline_id) = scene.pipelines.skinning else {
        return;
    };

    // Joint upload (blit) before the dispatches
    for index in 0..scene.skins.len() {
        let entity = scene.skins[index].entity;
        let Some(skin_component) = scene.components.skins.get(entity) else {
            continue;
        };
        if skin_component.joint_matrices.is_empty() {
            log::warn!("skin {entity:?} has no joint matrices this frame");
            continue;
        }
        let matrices = skin_component.joint_matrices.clone();
        if let Err(err) = scene.skins[index].upload_joints(core, encoder, slot, &matrices) {
            log::error!("joint upload failed for skin {entity:?}: {err}");
        }
    }

    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
        label: Some("skinning pass"),
        timestamp_writes: None,
    });
    pass.set_pipeline(scene.variants.compute_pipeline(pipeline_id));
    for skin in &scene.skins {
        let Some(bind_group) = skin.bind_group(slot) else {
            continue;
        };
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(skin.vertex_count, 1, 1);
    }
}
