//! Scenes
//!
//! A scene owns the GPU-resident mirror of a component snapshot: packed
//! geometry buffers, the material table, the bindless texture tables, the
//! drawable registry, lights and probes, the shadow atlas, and up to four
//! views. Per-frame data rotates through `FRAMES_IN_FLIGHT` buffer slots.

pub mod bindless;
pub mod drawable;
pub mod lights;
pub mod material_table;
pub mod packing;
pub mod picking;
pub mod probes;
#[allow(clippy::module_inception)]
pub mod scene;
pub mod view;

pub use bindless::BindlessTables;
pub use drawable::{
    Drawable, DrawableFlags, DrawableSet, ShadowKind, SkinSlice, VertexStreamFlags,
    classify_material, shadow_casting,
};
pub use lights::{GpuLight, GpuLightShadowData};
pub use material_table::{GpuMaterial, MaterialTable};
pub use packing::{GeometryArrays, PackedPrimitive, pack_mesh, stream_flags_of};
pub use probes::{GpuProbeData, ProbeData, ggx_mip_count};
pub use scene::{GpuInstance, Scene, Skybox};
pub use view::{GpuGlobals, View, VisibleLists};
