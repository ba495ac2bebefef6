//! Material Table Tests
//!
//! Tests for:
//! - Stable index assignment across repeated queries
//! - Record mirroring of component factors and texture slots
//! - Dirty tracking through updates

use glam::{Vec3, Vec4};

use vesper::ecs::{BlendMode, Entity, Material};
use vesper::scene::MaterialTable;

fn entity(index: u32) -> Entity {
    Entity::new(index, 0)
}

fn resolve_none(_: Option<&vesper::ecs::TextureRef>) -> u32 {
    0
}

// ============================================================================
// Index stability
// ============================================================================

#[test]
fn first_sight_appends_then_caches() {
    let mut table = MaterialTable::new();
    let material = Material::default();

    let a = table.get_or_insert(entity(1), &material, resolve_none);
    let b = table.get_or_insert(entity(2), &material, resolve_none);
    let a_again = table.get_or_insert(entity(1), &material, resolve_none);

    assert_eq!(a, 0);
    assert_eq!(b, 1);
    assert_eq!(a, a_again, "material index must be stable");
    assert_eq!(table.len(), 2);
}

#[test]
fn indices_survive_many_queries() {
    let mut table = MaterialTable::new();
    let material = Material::default();
    let mut first = Vec::new();
    for i in 0..16 {
        first.push(table.get_or_insert(entity(i), &material, resolve_none));
    }
    for i in 0..16 {
        let again = table.get_or_insert(entity(i), &material, resolve_none);
        assert_eq!(first[i as usize], again);
    }
    assert_eq!(table.len(), 16);
}

// ============================================================================
// Record contents
// ============================================================================

#[test]
fn record_mirrors_component() {
    let mut table = MaterialTable::new();
    let material = Material {
        metallic: 0.25,
        roughness: 0.75,
        base_color_factor: Vec4::new(0.5, 0.25, 0.125, 1.0),
        emissive_factor: Vec3::new(2.0, 0.0, 0.0),
        emissive_strength: 3.0,
        alpha_cutoff: 0.33,
        ..Material::default()
    };
    let index = table.get_or_insert(entity(7), &material, resolve_none);
    let record = table.records()[index as usize];

    assert_eq!(record.metallic, 0.25);
    assert_eq!(record.roughness, 0.75);
    assert_eq!(record.base_color_factor, material.base_color_factor);
    assert_eq!(record.emissive_factor, material.emissive_factor);
    assert_eq!(record.emissive_strength, 3.0);
    assert_eq!(record.alpha_cutoff, 0.33);
    // Absent maps resolve to the dummy slot
    assert_eq!(record.base_color_tex, 0);
    assert_eq!(record.normal_tex, 0);
}

#[test]
fn record_layout_matches_shader_expectation() {
    // Six 16-byte rows, matching the WGSL struct
    assert_eq!(std::mem::size_of::<vesper::scene::GpuMaterial>(), 96);
}

// ============================================================================
// Dirty tracking
// ============================================================================

#[test]
fn dirtiness_covers_every_frame_slot() {
    let mut table = MaterialTable::new();
    assert!(!table.is_dirty());
    table.get_or_insert(entity(1), &Material::default(), resolve_none);
    // Each in-flight buffer slot re-uploads once before the table is clean
    for _ in 0..vesper::FRAMES_IN_FLIGHT {
        assert!(table.is_dirty());
        table.clear_dirty();
    }
    assert!(!table.is_dirty());
}

#[test]
fn update_rewrites_record_in_place() {
    let mut table = MaterialTable::new();
    let mut material = Material::default();
    let index = table.get_or_insert(entity(4), &material, resolve_none);
    for _ in 0..vesper::FRAMES_IN_FLIGHT {
        table.clear_dirty();
    }

    material.metallic = 0.0;
    material.blend_mode = BlendMode::Blend;
    table.update(entity(4), &material, resolve_none);

    assert!(table.is_dirty());
    assert_eq!(table.index_of(entity(4)), Some(index));
    assert_eq!(table.records()[index as usize].metallic, 0.0);
    assert_eq!(table.len(), 1, "update must not append");
}

#[test]
fn update_of_unknown_entity_is_ignored() {
    let mut table = MaterialTable::new();
    table.update(entity(99), &Material::default(), resolve_none);
    assert!(table.is_empty());
    assert!(!table.is_dirty());
}

#[test]
fn stale_generation_is_a_different_key() {
    let mut table = MaterialTable::new();
    let material = Material::default();
    let old = Entity::new(3, 0);
    let reused = Entity::new(3, 1);
    let a = table.get_or_insert(old, &material, resolve_none);
    let b = table.get_or_insert(reused, &material, resolve_none);
    assert_ne!(a, b, "generation must separate reused slots");
}
