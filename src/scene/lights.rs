//! GPU Light Records
//!
//! Per-frame mirrors of the light components, in the layout the lighting
//! shader reads. Shadow-casting lights additionally carry a
//! [`GpuLightShadowData`] record linking them to their atlas rectangles.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::ecs::{Light, LightKind};

pub const LIGHT_TYPE_DIRECTIONAL: i32 = 0;
pub const LIGHT_TYPE_POINT: i32 = 1;
pub const LIGHT_TYPE_SPOT: i32 = 2;

/// Light record in the per-frame light buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLight {
    pub position: Vec3,
    pub intensity: f32,

    pub direction: Vec3,
    pub inner_cone_cos: f32,

    pub color: Vec3,
    pub range: f32,

    /// Index into the shadow-data buffer, -1 when not casting.
    pub shadow_index: i32,
    pub cascade_count: i32,
    pub cast_shadow: i32,
    pub outer_cone_cos: f32,

    pub kind: i32,
    pub _unused: [i32; 3],
}

impl GpuLight {
    #[must_use]
    pub fn from_component(light: &Light) -> Self {
        let (kind, inner_cos, outer_cos) = match light.kind {
            LightKind::Directional => (LIGHT_TYPE_DIRECTIONAL, 0.0, 0.0),
            LightKind::Point => (LIGHT_TYPE_POINT, 0.0, 0.0),
            LightKind::Spot {
                inner_cone,
                outer_cone,
            } => (LIGHT_TYPE_SPOT, inner_cone.cos(), outer_cone.cos()),
        };
        Self {
            position: light.position,
            intensity: light.intensity,
            direction: light.direction,
            inner_cone_cos: inner_cos,
            color: light.color,
            range: light.range,
            shadow_index: -1,
            cascade_count: 0,
            cast_shadow: i32::from(light.cast_shadow),
            outer_cone_cos: outer_cos,
            kind,
            _unused: [0; 3],
        }
    }
}

/// Shadow record: cascade splits, one view-projection per cascade/face,
/// per-slice atlas rectangles (origin and scale in atlas UV), the atlas
/// bindless slot, and the light's depth-bias factor.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GpuLightShadowData {
    pub cascade_splits: Vec4,
    pub view_projections: [Mat4; 6],
    /// Per cascade/face: x offset, y offset, uv scale, unused.
    pub slice_rects: [Vec4; 6],
    pub shadow_map_index: i32,
    pub bias_factor: f32,
    pub _unused: [f32; 2],
}

impl Default for GpuLightShadowData {
    fn default() -> Self {
        Self {
            cascade_splits: Vec4::ZERO,
            view_projections: [Mat4::IDENTITY; 6],
            slice_rects: [Vec4::ZERO; 6],
            shadow_map_index: -1,
            bias_factor: 1.0,
            _unused: [0.0; 2],
        }
    }
}
