//! Bindless Table Tests
//!
//! Tests for:
//! - Slot 0 reserved for the dummy texture
//! - Stable slot assignment across queries (append-only index space)
//! - Generation-aware invalidation back to the dummy

use slotmap::SlotMap;

use vesper::gpu::TextureId;
use vesper::scene::BindlessTables;

struct Ids {
    map: SlotMap<TextureId, ()>,
    dummy_2d: TextureId,
    dummy_cube: TextureId,
}

fn ids() -> Ids {
    let mut map: SlotMap<TextureId, ()> = SlotMap::with_key();
    let dummy_2d = map.insert(());
    let dummy_cube = map.insert(());
    Ids {
        map,
        dummy_2d,
        dummy_cube,
    }
}

// ============================================================================
// Slot assignment
// ============================================================================

#[test]
fn dummy_occupies_slot_zero() {
    let ids = ids();
    let tables = BindlessTables::new(ids.dummy_2d, ids.dummy_cube);
    assert_eq!(tables.len_2d(), 1);
    assert_eq!(tables.len_cube(), 1);
    assert_eq!(tables.slots_2d()[0], ids.dummy_2d);
    assert_eq!(tables.slots_cube()[0], ids.dummy_cube);
}

#[test]
fn first_query_appends_subsequent_return_cached() {
    let mut ids = ids();
    let mut tables = BindlessTables::new(ids.dummy_2d, ids.dummy_cube);

    let a = ids.map.insert(());
    let b = ids.map.insert(());

    let slot_a = tables.index_2d(a).unwrap();
    let slot_b = tables.index_2d(b).unwrap();
    assert_eq!(slot_a, 1);
    assert_eq!(slot_b, 2);

    for _ in 0..8 {
        assert_eq!(tables.index_2d(a).unwrap(), slot_a);
        assert_eq!(tables.index_2d(b).unwrap(), slot_b);
    }
    assert_eq!(tables.len_2d(), 3);
}

#[test]
fn cube_space_is_independent() {
    let mut ids = ids();
    let mut tables = BindlessTables::new(ids.dummy_2d, ids.dummy_cube);
    let flat = ids.map.insert(());
    let cube = ids.map.insert(());

    assert_eq!(tables.index_2d(flat).unwrap(), 1);
    assert_eq!(tables.index_cube(cube).unwrap(), 1);
    assert_eq!(tables.len_2d(), 2);
    assert_eq!(tables.len_cube(), 2);
}

// ============================================================================
// Invalidation
// ============================================================================

#[test]
fn invalidate_points_slot_at_dummy() {
    let mut ids = ids();
    let mut tables = BindlessTables::new(ids.dummy_2d, ids.dummy_cube);
    let a = ids.map.insert(());
    let slot = tables.index_2d(a).unwrap();

    tables.invalidate(a);
    assert_eq!(tables.slots_2d()[slot as usize], ids.dummy_2d);
    // The slot itself is never reassigned
    let b = ids.map.insert(());
    assert_eq!(tables.index_2d(b).unwrap(), slot + 1);
}

#[test]
fn reused_registry_slot_gets_a_fresh_index() {
    let mut ids = ids();
    let mut tables = BindlessTables::new(ids.dummy_2d, ids.dummy_cube);

    let a = ids.map.insert(());
    let slot_a = tables.index_2d(a).unwrap();
    tables.invalidate(a);
    ids.map.remove(a);

    // Same storage slot, new generation
    let reborn = ids.map.insert(());
    let slot_reborn = tables.index_2d(reborn).unwrap();
    assert_ne!(
        slot_a, slot_reborn,
        "a reused handle generation must not resurrect the old slot"
    );
}

#[test]
fn generation_changes_bump_table_generation() {
    let mut ids = ids();
    let mut tables = BindlessTables::new(ids.dummy_2d, ids.dummy_cube);
    let start = tables.generation();
    let a = ids.map.insert(());
    tables.index_2d(a).unwrap();
    assert!(tables.generation() > start);
    let mid = tables.generation();
    tables.index_2d(a).unwrap();
    assert_eq!(tables.generation(), mid, "cache hits must not invalidate");
}

#[test]
fn clear_resets_to_dummies() {
    let mut ids = ids();
    let mut tables = BindlessTables::new(ids.dummy_2d, ids.dummy_cube);
    for _ in 0..4 {
        let id = ids.map.insert(());
        tables.index_2d(id).unwrap();
    }
    tables.clear();
    assert_eq!(tables.len_2d(), 1);
    assert_eq!(tables.len_cube(), 1);
}
