//! GPU Material Table
//!
//! A material component maps 1:1 onto a packed [`GpuMaterial`] record in a
//! flat array mirrored to a per-frame storage buffer. Indices are handed
//! out on first sight and are stable for the scene's lifetime. Updates
//! mark the table dirty; a dirty table re-uploads whole for the active
//! frame slot — the set is bounded by scene size, so per-entry ranges are
//! not worth tracking.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::ecs::{Entity, Material, TextureRef};

/// Packed material record, matching the shader-side layout.
///
/// Texture fields are bindless slots; 0 is the dummy texture. UV-set
/// selectors pick one of the mesh's UV streams per map.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuMaterial {
    pub metallic: f32,
    pub roughness: f32,
    pub _unused0: [u32; 2],
    pub base_color_factor: Vec4,

    pub emissive_factor: Vec3,
    pub emissive_strength: f32,

    pub alpha_cutoff: f32,
    pub occlusion_strength: f32,
    pub base_color_uv: i32,
    pub normal_uv: i32,

    pub emissive_uv: i32,
    pub occlusion_uv: i32,
    pub metallic_roughness_uv: i32,
    pub base_color_tex: i32,

    pub normal_tex: i32,
    pub emissive_tex: i32,
    pub metallic_roughness_tex: i32,
    pub occlusion_tex: i32,
}

impl GpuMaterial {
    /// Converts a material component. `resolve` maps a texture slot to its
    /// bindless index (0 when the texture is absent or unregistered).
    pub fn from_component(
        material: &Material,
        mut resolve: impl FnMut(Option<&TextureRef>) -> u32,
    ) -> Self {
        let uv_of = |slot: Option<&TextureRef>| slot.map_or(0, |t| t.uv_set as i32);
        Self {
            metallic: material.metallic,
            roughness: material.roughness,
            _unused0: [0; 2],
            base_color_factor: material.base_color_factor,
            emissive_factor: material.emissive_factor,
            emissive_strength: material.emissive_strength,
            alpha_cutoff: material.alpha_cutoff,
            occlusion_strength: material.occlusion_strength,
            base_color_uv: uv_of(material.base_color_map.as_ref()),
            normal_uv: uv_of(material.normal_map.as_ref()),
            emissive_uv: uv_of(material.emissive_map.as_ref()),
            occlusion_uv: uv_of(material.occlusion_map.as_ref()),
            metallic_roughness_uv: uv_of(material.metallic_roughness_map.as_ref()),
            base_color_tex: resolve(material.base_color_map.as_ref()) as i32,
            normal_tex: resolve(material.normal_map.as_ref()) as i32,
            emissive_tex: resolve(material.emissive_map.as_ref()) as i32,
            metallic_roughness_tex: resolve(material.metallic_roughness_map.as_ref()) as i32,
            occlusion_tex: resolve(material.occlusion_map.as_ref()) as i32,
        }
    }
}

/// The scene's material table.
///
/// Dirtiness is a frame countdown: every in-flight buffer slot re-uploads
/// once before the table counts as clean again.
#[derive(Default)]
pub struct MaterialTable {
    records: Vec<GpuMaterial>,
    index_of: FxHashMap<Entity, u32>,
    dirty_frames: usize,
}

impl MaterialTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the entity's material, appending the record on first
    /// sight.
    pub fn get_or_insert(
        &mut self,
        entity: Entity,
        material: &Material,
        resolve: impl FnMut(Option<&TextureRef>) -> u32,
    ) -> u32 {
        if let Some(&index) = self.index_of.get(&entity) {
            return index;
        }
        let index = self.records.len() as u32;
        self.records.push(GpuMaterial::from_component(material, resolve));
        self.index_of.insert(entity, index);
        self.mark_dirty();
        index
    }

    /// Rewrites the record of an already-registered material and marks the
    /// table dirty. Unknown entities are ignored.
    pub fn update(
        &mut self,
        entity: Entity,
        material: &Material,
        resolve: impl FnMut(Option<&TextureRef>) -> u32,
    ) {
        if let Some(&index) = self.index_of.get(&entity) {
            self.records[index as usize] = GpuMaterial::from_component(material, resolve);
            self.mark_dirty();
        }
    }

    #[must_use]
    pub fn index_of(&self, entity: Entity) -> Option<u32> {
        self.index_of.get(&entity).copied()
    }

    #[must_use]
    pub fn records(&self) -> &[GpuMaterial] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty_frames > 0
    }

    pub fn mark_dirty(&mut self) {
        self.dirty_frames = crate::FRAMES_IN_FLIGHT;
    }

    /// One frame slot has re-uploaded.
    pub fn clear_dirty(&mut self) {
        self.dirty_frames = self.dirty_frames.saturating_sub(1);
    }
}
