//! Entity/Component Snapshot Interface
//!
//! The renderer does not own an ECS. It consumes a coherent snapshot of the
//! host's world through the types in this module: an opaque [`Entity`]
//! (index + generation, never dereferenced by the core) and a
//! [`ComponentLibrary`] of typed component maps the host fills before each
//! frame. [`run_systems`] is a minimal driver for hosts without their own
//! transform/skin systems: it propagates hierarchy transforms, refreshes
//! world-space bounds, and rebuilds skin joint matrices.

pub mod components;

use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::math::Aabb;

pub use components::{
    BlendMode, Camera, EnvironmentProbe, Hierarchy, Light, LightKind, Material, MaterialKind,
    Mesh, Object, ProbeFlags, Skin, Tag, TextureRef, Transform,
};

// ─── Entity ──────────────────────────────────────────────────────────────────

/// Opaque 64-bit entity id: index in the low 32 bits, generation in the
/// high 32 bits. Hashable and comparable; reused slots bump the generation
/// so stale references never collide with live ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Entity(u64);

impl Entity {
    /// The null entity. Returned by lookups that found nothing.
    pub const NULL: Entity = Entity(0x0000_0000_FFFF_FFFF);

    #[must_use]
    pub fn new(index: u32, generation: u32) -> Self {
        Self((u64::from(generation) << 32) | u64::from(index))
    }

    #[must_use]
    pub fn index(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[must_use]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[must_use]
    pub fn is_null(self) -> bool {
        self.index() == 0xFFFF_FFFF
    }

    #[must_use]
    pub fn to_bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

/// Hands out entities with generation-tracked slot reuse.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    next_index: u32,
    free: Vec<Entity>,
}

impl EntityAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> Entity {
        if let Some(old) = self.free.pop() {
            return Entity::new(old.index(), old.generation().wrapping_add(1));
        }
        let index = self.next_index;
        self.next_index += 1;
        Entity::new(index, 0)
    }

    /// Returns the slot to the free list. The caller must have removed the
    /// entity's components first.
    pub fn destroy(&mut self, entity: Entity) {
        if !entity.is_null() {
            self.free.push(entity);
        }
    }
}

// ─── Component storage ───────────────────────────────────────────────────────

/// A typed component map keyed by entity.
#[derive(Debug)]
pub struct ComponentMap<T> {
    map: FxHashMap<Entity, T>,
}

impl<T> Default for ComponentMap<T> {
    fn default() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }
}

impl<T> ComponentMap<T> {
    pub fn insert(&mut self, entity: Entity, component: T) -> Option<T> {
        self.map.insert(entity, component)
    }

    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&T> {
        self.map.get(&entity)
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut T> {
        self.map.get_mut(&entity)
    }

    pub fn remove(&mut self, entity: Entity) -> Option<T> {
        self.map.remove(&entity)
    }

    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.map.contains_key(&entity)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Entity, &T)> {
        self.map.iter().map(|(e, c)| (*e, c))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut T)> {
        self.map.iter_mut().map(|(e, c)| (*e, c))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

/// The component snapshot a scene renders from.
///
/// The renderer reads these maps during scene preparation and writes only
/// its own scene-local buffers; the host owns the data between frames.
#[derive(Debug, Default)]
pub struct ComponentLibrary {
    pub tags: ComponentMap<Tag>,
    pub transforms: ComponentMap<Transform>,
    pub hierarchies: ComponentMap<Hierarchy>,
    pub meshes: ComponentMap<Mesh>,
    pub materials: ComponentMap<Material>,
    pub objects: ComponentMap<Object>,
    pub cameras: ComponentMap<Camera>,
    pub lights: ComponentMap<Light>,
    pub skins: ComponentMap<Skin>,
    pub probes: ComponentMap<EnvironmentProbe>,
    allocator: EntityAllocator,
}

impl ComponentLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_entity(&mut self) -> Entity {
        self.allocator.create()
    }

    pub fn destroy_entity(&mut self, entity: Entity) {
        self.tags.remove(entity);
        self.transforms.remove(entity);
        self.hierarchies.remove(entity);
        self.meshes.remove(entity);
        self.materials.remove(entity);
        self.objects.remove(entity);
        self.cameras.remove(entity);
        self.lights.remove(entity);
        self.skins.remove(entity);
        self.probes.remove(entity);
        self.allocator.destroy(entity);
    }

    /// Resolves the world matrix of an entity, walking the hierarchy chain.
    #[must_use]
    pub fn world_matrix(&self, entity: Entity) -> Mat4 {
        let Some(transform) = self.transforms.get(entity) else {
            return Mat4::IDENTITY;
        };
        transform.world
    }
}

// ─── Minimal system driver ───────────────────────────────────────────────────

/// Runs the transform, bounds, and skinning systems over the snapshot.
///
/// Hierarchy depth is resolved iteratively: parents are flushed before
/// children by walking until no world matrix changes (scene graphs are
/// shallow in practice).
pub fn run_systems(library: &mut ComponentLibrary) {
    update_transforms(library);
    update_world_bounds(library);
    update_skin_matrices(library);
    update_cameras(library);
}

fn update_transforms(library: &mut ComponentLibrary) {
    // Roots carry their local matrix
    let entities: Vec<Entity> = library.transforms.iter().map(|(e, _)| e).collect();
    for entity in &entities {
        if library.hierarchies.get(*entity).is_none() {
            if let Some(t) = library.transforms.get_mut(*entity) {
                t.world = t.local_matrix();
            }
        }
    }

    // Children converge by fixed point: each pass propagates one level, so
    // hierarchy-depth passes suffice. Depth is capped; deeper chains are a
    // content error.
    let children: Vec<(Entity, Entity)> = entities
        .iter()
        .filter_map(|e| library.hierarchies.get(*e).map(|h| (*e, h.parent)))
        .collect();
    let passes = children.len().min(64).max(1);
    for _ in 0..passes {
        for (entity, parent) in &children {
            let parent_world = library.world_matrix(*parent);
            if let Some(t) = library.transforms.get_mut(*entity) {
                t.world = parent_world * t.local_matrix();
            }
        }
    }
}

fn update_world_bounds(library: &mut ComponentLibrary) {
    let objects: Vec<(Entity, Object)> = library
        .objects
        .iter()
        .map(|(e, o)| (e, *o))
        .collect();
    for (_, object) in objects {
        let world = library.world_matrix(object.transform);
        if let Some(mesh) = library.meshes.get_mut(object.mesh) {
            mesh.world_aabb = mesh.aabb.transformed(&world);
        }
    }
}

fn update_skin_matrices(library: &mut ComponentLibrary) {
    let skinned: Vec<Entity> = library.skins.iter().map(|(e, _)| e).collect();
    for entity in skinned {
        let Some(skin) = library.skins.get(entity) else {
            continue;
        };
        let mut matrices = Vec::with_capacity(skin.joints.len());
        for (i, joint) in skin.joints.iter().enumerate() {
            let joint_world = library.world_matrix(*joint);
            let inverse_bind = skin
                .inverse_bind_matrices
                .get(i)
                .copied()
                .unwrap_or(Mat4::IDENTITY);
            matrices.push(joint_world * inverse_bind);
        }
        if let Some(skin) = library.skins.get_mut(entity) {
            skin.joint_matrices = matrices;
        }
    }
}

fn update_cameras(library: &mut ComponentLibrary) {
    for (_, camera) in library.cameras.iter_mut() {
        camera.refresh_view();
    }
}

/// Computes a world AABB for an entity's mesh, used by culling and probes.
#[must_use]
pub fn world_aabb_of(library: &ComponentLibrary, entity: Entity) -> Aabb {
    library
        .meshes
        .get(entity)
        .map_or_else(Aabb::empty, |m| m.world_aabb)
}
