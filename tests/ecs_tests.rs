//! Component Snapshot Tests
//!
//! Tests for:
//! - Entity allocation and generation-tracked reuse
//! - The system driver: hierarchy propagation, world bounds, joint
//!   matrices

use glam::{Mat4, Quat, Vec3};

use vesper::ecs::{
    Camera, ComponentLibrary, Entity, Hierarchy, Mesh, Object, Skin, Transform, run_systems,
};

// ============================================================================
// Entities
// ============================================================================

#[test]
fn null_entity_is_null() {
    assert!(Entity::NULL.is_null());
    assert!(!Entity::new(0, 0).is_null());
}

#[test]
fn bits_round_trip() {
    let entity = Entity::new(123, 456);
    assert_eq!(Entity::from_bits(entity.to_bits()), entity);
    assert_eq!(entity.index(), 123);
    assert_eq!(entity.generation(), 456);
}

#[test]
fn destroyed_slot_reuses_with_bumped_generation() {
    let mut library = ComponentLibrary::new();
    let a = library.create_entity();
    let b = library.create_entity();
    assert_ne!(a, b);

    library.destroy_entity(a);
    let reborn = library.create_entity();
    assert_eq!(reborn.index(), a.index());
    assert_eq!(reborn.generation(), a.generation() + 1);
    assert_ne!(reborn, a, "stale references must not match the reused slot");
}

// ============================================================================
// Transform system
// ============================================================================

#[test]
fn root_world_matrix_is_local() {
    let mut library = ComponentLibrary::new();
    let entity = library.create_entity();
    library
        .transforms
        .insert(entity, Transform::from_translation(Vec3::new(1.0, 2.0, 3.0)));
    run_systems(&mut library);
    let world = library.world_matrix(entity);
    assert_eq!(world.w_axis.truncate(), Vec3::new(1.0, 2.0, 3.0));
}

#[test]
fn child_inherits_parent_transform() {
    let mut library = ComponentLibrary::new();
    let parent = library.create_entity();
    let child = library.create_entity();
    library
        .transforms
        .insert(parent, Transform::from_translation(Vec3::new(10.0, 0.0, 0.0)));
    library
        .transforms
        .insert(child, Transform::from_translation(Vec3::new(0.0, 5.0, 0.0)));
    library.hierarchies.insert(child, Hierarchy { parent });

    run_systems(&mut library);
    let world = library.world_matrix(child);
    assert_eq!(world.w_axis.truncate(), Vec3::new(10.0, 5.0, 0.0));
}

#[test]
fn grandchild_chains_through_two_parents() {
    let mut library = ComponentLibrary::new();
    let a = library.create_entity();
    let b = library.create_entity();
    let c = library.create_entity();
    for (entity, x) in [(a, 1.0f32), (b, 2.0), (c, 4.0)] {
        library
            .transforms
            .insert(entity, Transform::from_translation(Vec3::new(x, 0.0, 0.0)));
    }
    library.hierarchies.insert(b, Hierarchy { parent: a });
    library.hierarchies.insert(c, Hierarchy { parent: b });

    run_systems(&mut library);
    assert_eq!(library.world_matrix(c).w_axis.x, 7.0);
}

#[test]
fn rotation_and_scale_compose() {
    let mut library = ComponentLibrary::new();
    let entity = library.create_entity();
    library.transforms.insert(
        entity,
        Transform::from_trs(
            Vec3::ZERO,
            Quat::from_rotation_y(std::f32::consts::FRAC_PI_2),
            Vec3::splat(2.0),
        ),
    );
    run_systems(&mut library);
    let world = library.world_matrix(entity);
    let moved = world.transform_point3(Vec3::X);
    // Scale 2 then rotate +90° about Y: +X lands on -Z
    assert!((moved - Vec3::new(0.0, 0.0, -2.0)).length() < 1e-5);
}

// ============================================================================
// World bounds
// ============================================================================

#[test]
fn object_updates_mesh_world_bounds() {
    let mut library = ComponentLibrary::new();
    let mesh_entity = library.create_entity();
    let transform_entity = library.create_entity();
    let object_entity = library.create_entity();

    library.meshes.insert(
        mesh_entity,
        Mesh::from_positions(
            vec![Vec3::splat(-1.0), Vec3::splat(1.0)],
            vec![0, 1, 0],
        ),
    );
    library.transforms.insert(
        transform_entity,
        Transform::from_translation(Vec3::new(100.0, 0.0, 0.0)),
    );
    library.objects.insert(
        object_entity,
        Object {
            mesh: mesh_entity,
            transform: transform_entity,
        },
    );

    run_systems(&mut library);
    let mesh = library.meshes.get(mesh_entity).unwrap();
    assert_eq!(mesh.world_aabb.min, Vec3::new(99.0, -1.0, -1.0));
    assert_eq!(mesh.world_aabb.max, Vec3::new(101.0, 1.0, 1.0));
}

// ============================================================================
// Skin matrices
// ============================================================================

#[test]
fn joint_matrices_fold_inverse_bind() {
    let mut library = ComponentLibrary::new();
    let joint = library.create_entity();
    let skinned = library.create_entity();

    let bind = Mat4::from_translation(Vec3::new(0.0, 2.0, 0.0));
    library.transforms.insert(
        joint,
        Transform::from_translation(Vec3::new(0.0, 3.0, 0.0)),
    );
    library.skins.insert(
        skinned,
        Skin {
            joints: vec![joint],
            inverse_bind_matrices: vec![bind.inverse()],
            joint_matrices: Vec::new(),
        },
    );

    run_systems(&mut library);
    let skin = library.skins.get(skinned).unwrap();
    assert_eq!(skin.joint_matrices.len(), 1);
    // Joint moved +1 in y relative to its bind pose
    let moved = skin.joint_matrices[0].transform_point3(Vec3::ZERO);
    assert!((moved - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
}

// ============================================================================
// Camera
// ============================================================================

#[test]
fn camera_view_projection_is_invertible() {
    let camera = Camera::look_at(
        Vec3::new(0.0, 0.0, 5.0),
        Vec3::ZERO,
        std::f32::consts::FRAC_PI_3,
        16.0 / 9.0,
        0.1,
        100.0,
    );
    let vp = camera.view_projection();
    assert!(vp.determinant().abs() > 1e-9);

    // The target projects to the screen center
    let clip = vp * Vec3::ZERO.extend(1.0);
    let ndc = clip.truncate() / clip.w;
    assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5);
}
