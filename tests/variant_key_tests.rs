//! Shader Variant Key Tests
//!
//! Tests for:
//! - Graphics-state packing: distinct states, distinct bits
//! - Define serialization and merge semantics
//! - Variant hashing: same key same hash, any component change changes it
//! - Template rendering through the shader library

use vesper::ecs::BlendMode;
use vesper::pipeline::{
    GraphicsState, PassKind, ShaderDefines, ShaderLibrary, ShaderTemplate, ShaderVariant,
    StencilMode,
};

// ============================================================================
// Graphics state packing
// ============================================================================

#[test]
fn state_bits_distinguish_fields() {
    let base = GraphicsState::opaque(PassKind::Deferred);
    let variants = [
        GraphicsState {
            depth_write: false,
            ..base
        },
        GraphicsState {
            cull_mode: None,
            ..base
        },
        GraphicsState {
            cull_mode: Some(wgpu::Face::Front),
            ..base
        },
        GraphicsState {
            blend: BlendMode::Blend,
            ..base
        },
        GraphicsState {
            blend: BlendMode::AlphaMask,
            ..base
        },
        GraphicsState {
            stencil: StencilMode::AlwaysReplace,
            ..base
        },
        GraphicsState {
            stencil: StencilMode::TestGreaterEqual,
            ..base
        },
        GraphicsState {
            color_writes: false,
            ..base
        },
        GraphicsState {
            depth_compare: wgpu::CompareFunction::Always,
            ..base
        },
        GraphicsState::opaque(PassKind::Forward),
        GraphicsState::opaque(PassKind::Shadow),
        GraphicsState::opaque(PassKind::Pick),
    ];

    let mut bits: Vec<u64> = variants.iter().map(|v| v.as_u64()).collect();
    bits.push(base.as_u64());
    let len_before = bits.len();
    bits.sort_unstable();
    bits.dedup();
    assert_eq!(bits.len(), len_before, "state packings must be unique");
}

#[test]
fn equal_states_pack_equal() {
    let a = GraphicsState::opaque(PassKind::Forward);
    let b = GraphicsState::opaque(PassKind::Forward);
    assert_eq!(a.as_u64(), b.as_u64());
}

// ============================================================================
// Defines
// ============================================================================

#[test]
fn define_serialization_is_order_independent() {
    let mut a = ShaderDefines::new();
    a.set("ALPHA", 1).set("BETA", 2);
    let mut b = ShaderDefines::new();
    b.set("BETA", 2).set("ALPHA", 1);
    assert_eq!(a.to_bytes(), b.to_bytes());
}

#[test]
fn merge_overwrites_and_adds() {
    let mut a = ShaderDefines::new();
    a.set("X", 1).set("Y", 2);
    let mut b = ShaderDefines::new();
    b.set("Y", 5).set("Z", 3);
    a.merge(&b);
    assert_eq!(a.get("X"), Some(1));
    assert_eq!(a.get("Y"), Some(5));
    assert_eq!(a.get("Z"), Some(3));
}

// ============================================================================
// Variant hashing
// ============================================================================

fn base_variant() -> ShaderVariant {
    let mut defines = ShaderDefines::new();
    defines.set("MAX_LIGHTS", 100);
    defines.set("DATA_STRIDE", 3);
    ShaderVariant {
        template: ShaderTemplate::Forward,
        state: GraphicsState::opaque(PassKind::Forward),
        defines,
    }
}

#[test]
fn same_variant_same_hash() {
    assert_eq!(base_variant().key_hash(), base_variant().key_hash());
}

#[test]
fn template_changes_hash() {
    let mut other = base_variant();
    other.template = ShaderTemplate::Deferred;
    assert_ne!(base_variant().key_hash(), other.key_hash());
}

#[test]
fn state_changes_hash() {
    let mut other = base_variant();
    other.state.blend = BlendMode::Blend;
    assert_ne!(base_variant().key_hash(), other.key_hash());
}

#[test]
fn define_changes_hash() {
    let mut other = base_variant();
    other.defines.set("DATA_STRIDE", 4);
    assert_ne!(base_variant().key_hash(), other.key_hash());
}

#[test]
fn shared_material_state_shares_key() {
    // Two materials with identical blend mode, stream mask, and texture
    // set produce one pipeline key; a third with another blend mode adds
    // exactly one more.
    let first = base_variant();
    let second = base_variant();
    let mut third = base_variant();
    third.state.blend = BlendMode::Blend;

    let mut keys = vec![first.key_hash(), second.key_hash(), third.key_hash()];
    keys.sort_unstable();
    keys.dedup();
    assert_eq!(keys.len(), 2);
}

// ============================================================================
// Template rendering
// ============================================================================

fn geometry_defines() -> ShaderDefines {
    let mut defines = ShaderDefines::new();
    defines.set("MAX_LIGHTS", 100);
    defines.set("MAX_BINDLESS_TEXTURES", 4096);
    defines.set("MAX_BINDLESS_CUBE_TEXTURES", 256);
    defines.set("DATA_STRIDE", 2);
    defines.set("NORMAL_OFFSET", 0);
    defines.set("UV0_OFFSET", 1);
    defines.flag("HAS_NORMAL");
    defines.flag("HAS_UV0");
    defines.flag("USE_PUNCTUAL");
    defines.flag("USE_SHADOWS");
    defines
}

#[test]
fn templates_render_entry_points() {
    let library = ShaderLibrary::new().expect("templates parse");
    let defines = geometry_defines();

    for template in [
        ShaderTemplate::Deferred,
        ShaderTemplate::Forward,
        ShaderTemplate::Lighting,
        ShaderTemplate::Shadow,
        ShaderTemplate::Skybox,
        ShaderTemplate::Pick,
        ShaderTemplate::Outline,
        ShaderTemplate::Tonemap,
        ShaderTemplate::Missing,
    ] {
        let source = library.generate(template, &defines).expect("renders");
        assert!(
            source.contains("fn vs_main"),
            "{} lacks vs_main",
            template.name()
        );
    }

    for template in [
        ShaderTemplate::Skinning,
        ShaderTemplate::EnvFilter,
        ShaderTemplate::BrdfLut,
        ShaderTemplate::PanoramaToCube,
    ] {
        let source = library.generate(template, &defines).expect("renders");
        assert!(source.contains("fn main"), "{} lacks main", template.name());
    }
}

#[test]
fn defines_gate_template_content() {
    let library = ShaderLibrary::new().expect("templates parse");

    let with = library
        .generate(ShaderTemplate::Deferred, &geometry_defines())
        .unwrap();
    assert!(with.contains("world_normal"));

    let mut without = geometry_defines();
    without.set("HAS_NORMAL", 0);
    let source = library.generate(ShaderTemplate::Deferred, &without).unwrap();
    assert!(!source.contains("world_normal"));
}

#[test]
fn alpha_mask_gates_discard_in_shadow_template() {
    let library = ShaderLibrary::new().expect("templates parse");
    let mut defines = geometry_defines();
    let opaque = library.generate(ShaderTemplate::Shadow, &defines).unwrap();
    assert!(!opaque.contains("discard"));

    defines.flag("ALPHA_MASK");
    let masked = library.generate(ShaderTemplate::Shadow, &defines).unwrap();
    assert!(masked.contains("discard"));
}

#[test]
fn constants_splice_into_source() {
    let library = ShaderLibrary::new().expect("templates parse");
    let source = library
        .generate(ShaderTemplate::Deferred, &geometry_defines())
        .unwrap();
    assert!(source.contains("binding_array<texture_2d<f32>, 4096>"));
}
