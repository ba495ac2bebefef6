//! Culling Driver
//!
//! Runs the SAT test for every drawable against a view's cull camera as a
//! parallel batch — one invocation per drawable, each producing only its
//! own visibility flag. With culling disabled every drawable is visible.

use rayon::prelude::*;

use crate::ecs::{Camera, Entity};
use crate::math::sat_visibility_test;
use crate::scene::Scene;
use crate::scene::drawable::DrawableFlags;
use crate::scene::view::VisibleLists;

/// Per-drawable visibility against `camera`.
#[must_use]
pub fn cull_drawables(scene: &Scene, camera: &Camera, enabled: bool) -> Vec<bool> {
    let components = &scene.components;
    scene
        .drawables
        .drawables
        .par_iter()
        .map(|drawable| {
            if !enabled {
                return true;
            }
            let mesh_entity = mesh_entity_of(scene, drawable.entity);
            let Some(mesh) = components.meshes.get(mesh_entity) else {
                return false;
            };
            sat_visibility_test(camera, &mesh.world_aabb)
        })
        .collect()
}

fn mesh_entity_of(scene: &Scene, entity: Entity) -> Entity {
    scene
        .components
        .objects
        .get(entity)
        .map_or(entity, |object| object.mesh)
}

/// Splits visibility flags into the view's lists and sorts transparents
/// back to front on camera-space depth of the drawable origin.
pub fn build_visible_lists(
    scene: &Scene,
    camera: &Camera,
    visibility: &[bool],
    lists: &mut VisibleLists,
) {
    lists.clear();
    for (index, drawable) in scene.drawables.drawables.iter().enumerate() {
        if !visibility.get(index).copied().unwrap_or(false) {
            continue;
        }
        let index = index as u32;
        lists.all.push(index);
        if drawable.flags.contains(DrawableFlags::DEFERRED) {
            lists.opaque.push(index);
        } else {
            lists.transparent.push(index);
        }
    }

    // Back-to-front: most negative view-space z (farthest) first
    let view = camera.view;
    let mut depth_of = |index: u32| -> f32 {
        let drawable = &scene.drawables.drawables[index as usize];
        let world = scene.transforms_cpu[drawable.transform_index as usize];
        let origin = world.w_axis.truncate();
        view.transform_point3(origin).z
    };
    let mut keyed: Vec<(f32, u32)> = lists
        .transparent
        .iter()
        .map(|&i| (depth_of(i), i))
        .collect();
    keyed.sort_unstable_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    lists.transparent = keyed.into_iter().map(|(_, i)| i).collect();
}
