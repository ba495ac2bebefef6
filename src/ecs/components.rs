//! Component Types
//!
//! The component vocabulary the renderer reads from the host snapshot.
//! These are plain data; no component holds GPU state.

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec2, Vec3, Vec4};

use crate::ecs::Entity;
use crate::gpu::texture::TextureId;
use crate::math::Aabb;

/// Debug name attached to an entity.
#[derive(Debug, Clone, Default)]
pub struct Tag {
    pub name: String,
}

// ─── Transform & hierarchy ───────────────────────────────────────────────────

/// Local TRS plus the world matrix the transform system writes.
#[derive(Debug, Clone, Copy)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// World matrix, authoritative for rendering. Refreshed by the host's
    /// transform system or by [`crate::ecs::run_systems`].
    pub world: Mat4,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            world: Mat4::IDENTITY,
        }
    }
}

impl Transform {
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        let mut t = Self {
            translation,
            ..Self::default()
        };
        t.world = t.local_matrix();
        t
    }

    #[must_use]
    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        let mut t = Self {
            translation,
            rotation,
            scale,
            world: Mat4::IDENTITY,
        };
        t.world = t.local_matrix();
        t
    }

    #[must_use]
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Parent link. Entities without one are roots.
#[derive(Debug, Clone, Copy)]
pub struct Hierarchy {
    pub parent: Entity,
}

// ─── Mesh ────────────────────────────────────────────────────────────────────

/// One renderable mesh primitive: positions and indices are mandatory, the
/// secondary streams optional. Streams that are present must match the
/// vertex count.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    /// Up to 8 UV sets.
    pub uv_sets: Vec<Vec<Vec2>>,
    /// Up to 2 vertex color sets.
    pub color_sets: Vec<Vec<Vec4>>,
    /// Joint indices, four per vertex, stored as floats for texture fetch.
    pub joints: Vec<Vec4>,
    /// Joint weights, four per vertex.
    pub weights: Vec<Vec4>,
    /// Object-space bounds.
    pub aabb: Aabb,
    /// World-space bounds, refreshed by the transform system.
    pub world_aabb: Aabb,
    /// Whether this mesh participates in environment-probe captures.
    pub include_in_probes: bool,
}

impl Mesh {
    /// Builds a mesh from positions and indices, computing object bounds.
    #[must_use]
    pub fn from_positions(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        let aabb = Aabb::from_points(&positions);
        Self {
            positions,
            indices,
            aabb,
            world_aabb: aabb,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    #[must_use]
    pub fn has_skin_streams(&self) -> bool {
        !self.joints.is_empty() && !self.weights.is_empty()
    }
}

// ─── Material ────────────────────────────────────────────────────────────────

/// How fragments blend against the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Opaque,
    AlphaMask,
    Blend,
}

/// Shading model selector. The tagged variant feeds the variant-key
/// builder; the deep per-property switches live nowhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Pbr,
    Unlit,
}

/// A texture slot reference: which texture, sampled with which UV set.
#[derive(Debug, Clone, Copy)]
pub struct TextureRef {
    pub texture: TextureId,
    pub uv_set: u32,
}

/// Material component. Blend mode and double-sidedness drive pipeline
/// state selection; the factors and texture slots mirror into the GPU
/// material table.
#[derive(Debug, Clone)]
pub struct Material {
    pub kind: MaterialKind,
    pub blend_mode: BlendMode,
    pub double_sided: bool,
    pub cast_shadow: bool,

    pub base_color_factor: Vec4,
    pub metallic: f32,
    pub roughness: f32,
    pub emissive_factor: Vec3,
    pub emissive_strength: f32,
    pub alpha_cutoff: f32,
    pub occlusion_strength: f32,

    pub base_color_map: Option<TextureRef>,
    pub normal_map: Option<TextureRef>,
    pub emissive_map: Option<TextureRef>,
    pub metallic_roughness_map: Option<TextureRef>,
    pub occlusion_map: Option<TextureRef>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            kind: MaterialKind::Pbr,
            blend_mode: BlendMode::Opaque,
            double_sided: false,
            cast_shadow: true,
            base_color_factor: Vec4::ONE,
            metallic: 1.0,
            roughness: 1.0,
            emissive_factor: Vec3::ZERO,
            emissive_strength: 1.0,
            alpha_cutoff: 0.5,
            occlusion_strength: 1.0,
            base_color_map: None,
            normal_map: None,
            emissive_map: None,
            metallic_roughness_map: None,
            occlusion_map: None,
        }
    }
}

// ─── Object ──────────────────────────────────────────────────────────────────

/// Pairs a mesh-carrying entity with a transform-carrying entity.
#[derive(Debug, Clone, Copy)]
pub struct Object {
    pub mesh: Entity,
    pub transform: Entity,
}

// ─── Camera ──────────────────────────────────────────────────────────────────

/// Perspective camera. The view matrix is derived from position/target and
/// cached; `refresh_view` is called by the system driver.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub view: Mat4,
}

impl Camera {
    #[must_use]
    pub fn look_at(position: Vec3, target: Vec3, fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position,
            target,
            up: Vec3::Y,
            fov_y,
            aspect,
            near,
            far,
            view: Mat4::IDENTITY,
        };
        camera.refresh_view();
        camera
    }

    pub fn refresh_view(&mut self) {
        self.view = Mat4::look_at_rh(self.position, self.target, self.up);
    }

    #[must_use]
    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection() * self.view
    }

    #[must_use]
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize_or_zero()
    }
}

// ─── Light ───────────────────────────────────────────────────────────────────

/// Light shapes. Cone angles are half-angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Directional,
    Point,
    Spot { inner_cone: f32, outer_cone: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub range: f32,
    pub position: Vec3,
    pub direction: Vec3,
    pub cast_shadow: bool,
    /// Cascade count for directional shadows (clamped to
    /// [`crate::MAX_SHADOW_CASCADES`]). Ignored for point/spot.
    pub cascade_count: u32,
    /// Shadow map resolution per cascade/face.
    pub shadow_resolution: u32,
    /// Log/uniform blend for the cascade split scheme.
    pub cascade_split_lambda: f32,
}

impl Light {
    #[must_use]
    pub fn directional(direction: Vec3, color: Vec3, intensity: f32) -> Self {
        Self {
            kind: LightKind::Directional,
            color,
            intensity,
            range: 0.0,
            position: Vec3::ZERO,
            direction: direction.normalize_or_zero(),
            cast_shadow: false,
            cascade_count: 4,
            shadow_resolution: 1024,
            cascade_split_lambda: 0.95,
        }
    }

    #[must_use]
    pub fn point(position: Vec3, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
            range,
            position,
            direction: -Vec3::Y,
            cast_shadow: false,
            cascade_count: 1,
            shadow_resolution: 1024,
            cascade_split_lambda: 0.95,
        }
    }

    #[must_use]
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        color: Vec3,
        intensity: f32,
        range: f32,
        inner_cone: f32,
        outer_cone: f32,
    ) -> Self {
        Self {
            kind: LightKind::Spot {
                inner_cone,
                outer_cone,
            },
            color,
            intensity,
            range,
            position,
            direction: direction.normalize_or_zero(),
            cast_shadow: false,
            cascade_count: 1,
            shadow_resolution: 1024,
            cascade_split_lambda: 0.95,
        }
    }
}

// ─── Skin ────────────────────────────────────────────────────────────────────

/// Skin component: joint entities, their inverse bind matrices, and the
/// per-frame joint matrices the skin system writes.
#[derive(Debug, Clone, Default)]
pub struct Skin {
    pub joints: Vec<Entity>,
    pub inverse_bind_matrices: Vec<Mat4>,
    /// `joint_world * inverse_bind`, one per joint.
    pub joint_matrices: Vec<Mat4>,
}

// ─── Environment probe ───────────────────────────────────────────────────────

bitflags! {
    /// Probe behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProbeFlags: u32 {
        /// Re-capture on the update interval rather than once.
        const REALTIME = 1 << 0;
        /// Include the skybox in the capture.
        const INCLUDE_SKY = 1 << 1;
        /// Parallax-correct lookups against the probe's box extents.
        const PARALLAX_CORRECTION_BOX = 1 << 2;
        /// Capture is stale; all faces re-render.
        const DIRTY = 1 << 3;
    }
}

/// Environment probe component. Position comes from the entity transform.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentProbe {
    pub range: f32,
    /// Cube face resolution (power of two).
    pub resolution: u32,
    /// Sample count for the GGX prefilter.
    pub sample_count: u32,
    /// 1 = all faces every frame; N = one face per N frames, rotated.
    pub update_interval: u32,
    pub flags: ProbeFlags,
    /// Half-extents of the parallax correction box.
    pub extents: Vec3,
}

impl Default for EnvironmentProbe {
    fn default() -> Self {
        Self {
            range: 10.0,
            resolution: 128,
            sample_count: 128,
            update_interval: 6,
            flags: ProbeFlags::DIRTY | ProbeFlags::PARALLAX_CORRECTION_BOX,
            extents: Vec3::splat(10.0),
        }
    }
}
