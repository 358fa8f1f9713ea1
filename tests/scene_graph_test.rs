use approx::assert_relative_eq;
use cgmath::{Deg, Matrix4, Quaternion, Rotation3, Vector3, Vector4};
use scene_ngin::{
    data_structures::{
        component::{ComponentData, ComponentKind},
        transform::{self, Transform, TransformLookup},
    },
    error::EngineError,
};

use crate::common::test_utils::recording_world;

mod common;

#[test]
fn destroyed_object_ids_are_handed_out_again() {
    let (mut world, _) = recording_world();
    let object = world.spawn("Doomed");
    let (object_id, transform_id) = (object.id(), object.transform().id());
    world.add_game_object(object).unwrap();

    assert!(world.destroy_game_object(object_id).unwrap());
    assert!(!world.scene().unwrap().contains(object_id));

    let again = world.spawn("Reborn");
    assert_eq!(again.id(), object_id);
    assert_eq!(again.transform().id(), transform_id);
}

#[test]
fn destroying_a_parent_takes_its_subtree() {
    let (mut world, _) = recording_world();
    let parent = world.spawn("Parent");
    let child = world.spawn("Child");
    let grandchild = world.spawn("Grandchild");
    let bystander = world.spawn("Bystander");
    let parent = world.add_game_object(parent).unwrap();
    let child = world.add_game_object(child).unwrap();
    let grandchild = world.add_game_object(grandchild).unwrap();
    let bystander = world.add_game_object(bystander).unwrap();
    let scene = world.scene_mut().unwrap();
    scene.set_parent(child, Some(parent)).unwrap();
    scene.set_parent(grandchild, Some(child)).unwrap();

    assert!(world.destroy_game_object(parent).unwrap());
    let scene = world.scene().unwrap();
    assert_eq!(scene.object_ids(), vec![bystander]);
    assert!(!world.destroy_game_object(grandchild).unwrap());
}

#[test]
fn world_matrix_composes_parent_to_child() {
    let (mut world, _) = recording_world();
    let root = world.spawn("Root");
    let middle = world.spawn("Middle");
    let leaf = world.spawn("Leaf");
    let root = world.add_game_object(root).unwrap();
    let middle = world.add_game_object(middle).unwrap();
    let leaf = world.add_game_object(leaf).unwrap();

    let scene = world.scene_mut().unwrap();
    scene.set_parent(middle, Some(root)).unwrap();
    scene.set_parent(leaf, Some(middle)).unwrap();
    {
        let t = scene.transform_mut(root).unwrap();
        t.set_position(Vector3::new(1.0, 0.0, 0.0));
        t.set_scale(Vector3::new(2.0, 2.0, 2.0));
    }
    scene
        .transform_mut(middle)
        .unwrap()
        .set_rotation(Quaternion::from_angle_y(Deg(90.0)));
    scene
        .transform_mut(leaf)
        .unwrap()
        .set_position(Vector3::new(0.0, 0.0, 1.0));

    let expected = scene.transform(root).unwrap().local_matrix()
        * scene.transform(middle).unwrap().local_matrix()
        * scene.transform(leaf).unwrap().local_matrix();
    let actual = scene.world_matrix(leaf).unwrap();
    assert_relative_eq!(actual, expected, epsilon = 1e-5);
    // (0,0,1) turned onto +X, doubled, then moved by the root
    assert_relative_eq!(
        actual.w,
        Vector4::new(3.0, 0.0, 0.0, 1.0),
        epsilon = 1e-5
    );

    // moving only the root is visible on the next read of the leaf
    scene
        .transform_mut(root)
        .unwrap()
        .set_position(Vector3::new(1.0, 5.0, 0.0));
    let moved = transform::world_position(&*scene, leaf).unwrap();
    assert_relative_eq!(moved, Vector3::new(3.0, 5.0, 0.0), epsilon = 1e-5);
}

#[test]
fn detached_child_falls_back_to_its_local_matrix() {
    let (mut world, _) = recording_world();
    let parent = world.spawn("Parent");
    let child = world.spawn("Child");
    let parent = world.add_game_object(parent).unwrap();
    let child = world.add_game_object(child).unwrap();
    let scene = world.scene_mut().unwrap();
    scene
        .transform_mut(parent)
        .unwrap()
        .set_position(Vector3::new(0.0, 10.0, 0.0));
    scene.set_parent(child, Some(parent)).unwrap();
    scene.set_parent(child, None).unwrap();

    assert!(scene.transform(parent).unwrap().children().is_empty());
    assert_relative_eq!(
        scene.world_matrix(child).unwrap(),
        Matrix4::from_translation(Vector3::new(0.0, 0.0, 0.0)),
        epsilon = 1e-6
    );
}

#[test]
fn colliding_object_names_are_suffixed() {
    let (mut world, _) = recording_world();
    let first = world.spawn("Crate");
    let second = world.spawn("Crate");
    let third = world.spawn("Crate").with_tag("Loot");
    let first = world.add_game_object(first).unwrap();
    let second = world.add_game_object(second).unwrap();
    let third = world.add_game_object(third).unwrap();

    let scene = world.scene().unwrap();
    assert_eq!(scene.stored_name(first), Some("Crate"));
    assert_eq!(scene.stored_name(second), Some("Crate_1"));
    assert_eq!(scene.stored_name(third), Some("Crate_2"));
    assert_eq!(scene.game_object_by_name("Crate_1").unwrap().id(), second);
    assert_eq!(scene.ids_by_tag("Loot"), &[third]);
}

#[test]
fn a_second_transform_is_refused() {
    let (mut world, _) = recording_world();
    let mut object = world.spawn("Solo");
    let err = object
        .add_component(&mut world.ids, ComponentKind::Transform)
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::DuplicateComponent {
            kind: ComponentKind::Transform,
            ..
        }
    ));
    // the built-in transform is the only component
    assert_eq!(object.component_count(), 1);

    object
        .add_component(&mut world.ids, ComponentKind::Camera)
        .unwrap();
    assert_eq!(object.component_count(), 2);
    assert_eq!(object.components_of_kind(ComponentKind::Camera).len(), 1);
}

#[test]
fn refused_component_ids_are_recycled() {
    let (mut world, _) = recording_world();
    let mut object = world.spawn("Solo");
    let issued = world.ids.issued();
    let owner = object.id();
    let err = object
        .attach(
            &mut world.ids,
            ComponentData::Transform(Transform::new(owner, owner)),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::DuplicateComponent { .. }));
    assert_eq!(world.ids.issued(), issued + 1);
    // the refused id is the next one handed out
    assert_eq!(world.ids.create(), issued);
    assert_eq!(object.component_count(), 1);
}
