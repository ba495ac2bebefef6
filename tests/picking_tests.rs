//! Picking Encode/Decode Tests
//!
//! The pick pass writes entity ids as RGBA8: index low 24 bits in RGB,
//! generation low byte in alpha. Decode validates against the live set.

use vesper::ecs::Entity;
use vesper::scene::picking::{clear_color, decode_entity, encode_entity, encode_entity_color};

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn encode_decode_round_trip() {
    let entity = Entity::new(0x00AB_CDEF & 0x00FF_FFFF, 7);
    let rgba = encode_entity(entity);
    let decoded = decode_entity(rgba, |index| {
        if index == entity.index() {
            Some(entity)
        } else {
            None
        }
    });
    assert_eq!(decoded, entity);
}

#[test]
fn round_trip_over_index_range() {
    for index in [0u32, 1, 255, 256, 65_535, 65_536, 0x00FF_FFFE] {
        for generation in [0u32, 1, 200, 255, 256, 1000] {
            let entity = Entity::new(index, generation);
            let rgba = encode_entity(entity);
            let decoded = decode_entity(rgba, |i| (i == index).then_some(entity));
            assert_eq!(decoded, entity, "index {index} generation {generation}");
        }
    }
}

// ============================================================================
// Miss and staleness
// ============================================================================

#[test]
fn clear_pixel_decodes_to_null() {
    let clear = clear_color();
    let rgba = [
        (clear.r * 255.0) as u8,
        (clear.g * 255.0) as u8,
        (clear.b * 255.0) as u8,
        (clear.a * 255.0) as u8,
    ];
    let decoded = decode_entity(rgba, |_| Some(Entity::new(1, 0)));
    assert!(decoded.is_null());
}

#[test]
fn unknown_index_decodes_to_null() {
    let entity = Entity::new(42, 3);
    let rgba = encode_entity(entity);
    let decoded = decode_entity(rgba, |_| None);
    assert!(decoded.is_null());
}

#[test]
fn stale_generation_decodes_to_null() {
    // The slot was reused between the pass and the readback
    let old = Entity::new(42, 3);
    let current = Entity::new(42, 4);
    let rgba = encode_entity(old);
    let decoded = decode_entity(rgba, |index| (index == 42).then_some(current));
    assert!(decoded.is_null());
}

#[test]
fn generation_low_byte_collision_resolves_to_live_entity() {
    // Generations 3 and 259 share a low byte; the live entity wins
    let old = Entity::new(9, 3);
    let wrapped = Entity::new(9, 259);
    let rgba = encode_entity(old);
    let decoded = decode_entity(rgba, |index| (index == 9).then_some(wrapped));
    assert_eq!(decoded, wrapped);
}

// ============================================================================
// Color encoding
// ============================================================================

#[test]
fn color_encoding_is_normalized_bytes() {
    let entity = Entity::new(0x0000_0102, 5);
    let bytes = encode_entity(entity);
    let color = encode_entity_color(entity);
    for (byte, channel) in bytes.iter().zip(color.iter()) {
        assert!((f32::from(*byte) / 255.0 - channel).abs() < 1e-6);
    }
}

#[test]
fn null_entity_encodes_as_clear() {
    let rgba = encode_entity(Entity::NULL);
    assert_eq!(rgba[0], 0xFF);
    assert_eq!(rgba[1], 0xFF);
    assert_eq!(rgba[2], 0xFF);
    let decoded = decode_entity(rgba, |_| Some(Entity::new(1, 0)));
    assert!(decoded.is_null());
}
