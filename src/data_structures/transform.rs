//! Position, rotation and scale of a game object and its place in the
//! parent/child hierarchy.
//!
//! A [`Transform`] caches its local matrix until one of its setters changes a
//! value. World matrices are never cached: [`world_matrix`] walks the parent
//! chain on every call, so a moved ancestor is reflected immediately.
//!
//! Hierarchy links store game object ids. Functions that need to follow them
//! take a [`TransformLookup`], which the scene implements.

use std::cell::Cell;

use cgmath::{
    Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Quaternion, Rotation, Rotation3,
    SquareMatrix, Transform as _, Vector3, Zero,
};

use crate::{data_structures::entity::EntityId, error::EngineError};

/// Reference frame for [`Transform::translate`] and [`Transform::rotate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Space {
    /// Axes follow the transform's own rotation.
    #[default]
    Local,
    World,
}

#[derive(Debug, Clone)]
pub struct Transform {
    id: EntityId,
    owner: EntityId,
    pub is_active: bool,
    position: Vector3<f32>,
    rotation: Quaternion<f32>,
    scale: Vector3<f32>,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    local: Cell<Option<Matrix4<f32>>>,
    changed: Cell<bool>,
}

impl Transform {
    pub fn new(id: EntityId, owner: EntityId) -> Self {
        Self {
            id,
            owner,
            is_active: true,
            position: Vector3::zero(),
            rotation: Quaternion::from_sv(1.0, Vector3::zero()),
            scale: Vector3::new(1.0, 1.0, 1.0),
            parent: None,
            children: Vec::new(),
            local: Cell::new(None),
            changed: Cell::new(true),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Game object this transform belongs to.
    pub fn owner(&self) -> EntityId {
        self.owner
    }

    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    pub fn rotation(&self) -> Quaternion<f32> {
        self.rotation
    }

    pub fn scale(&self) -> Vector3<f32> {
        self.scale
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    pub fn set_position(&mut self, position: Vector3<f32>) {
        if self.position != position {
            self.position = position;
            self.invalidate();
        }
    }

    pub fn set_rotation(&mut self, rotation: Quaternion<f32>) {
        if self.rotation != rotation {
            self.rotation = rotation;
            self.invalidate();
        }
    }

    pub fn set_scale(&mut self, scale: Vector3<f32>) {
        if self.scale != scale {
            self.scale = scale;
            self.invalidate();
        }
    }

    fn invalidate(&mut self) {
        self.local.set(None);
        self.changed.set(true);
    }

    /// Raised by every effective setter call. Readers that derive their own
    /// state from this transform clear it once they have caught up.
    pub fn changed(&self) -> bool {
        self.changed.get()
    }

    pub fn clear_changed(&self) {
        self.changed.set(false);
    }

    pub fn has_cached_local(&self) -> bool {
        self.local.get().is_some()
    }

    /// `T * R * S`, rebuilt only after a setter ran.
    pub fn local_matrix(&self) -> Matrix4<f32> {
        if let Some(matrix) = self.local.get() {
            return matrix;
        }
        let matrix = Matrix4::from_translation(self.position)
            * Matrix4::from(self.rotation)
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z);
        self.local.set(Some(matrix));
        self.changed.set(false);
        matrix
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.rotation.rotate_vector(Vector3::unit_z())
    }

    pub fn right(&self) -> Vector3<f32> {
        self.rotation.rotate_vector(Vector3::unit_x())
    }

    pub fn up(&self) -> Vector3<f32> {
        self.rotation.rotate_vector(Vector3::unit_y())
    }

    pub fn translate(&mut self, delta: Vector3<f32>, space: Space) {
        let delta = match space {
            Space::Local => self.rotation.rotate_vector(delta),
            Space::World => delta,
        };
        self.set_position(self.position + delta);
    }

    pub fn rotate(&mut self, axis: Vector3<f32>, degrees: f32, space: Space) {
        if axis.magnitude2() == 0.0 {
            return;
        }
        let axis = match space {
            Space::Local => axis,
            Space::World => self.rotation.invert().rotate_vector(axis),
        };
        let delta = Quaternion::from_axis_angle(axis.normalize(), Deg(degrees));
        self.set_rotation((self.rotation * delta).normalize());
    }

    /// Orbits the position around `pivot` and turns the rotation by the same
    /// amount.
    pub fn rotate_around(&mut self, pivot: Vector3<f32>, axis: Vector3<f32>, degrees: f32) {
        if axis.magnitude2() == 0.0 {
            return;
        }
        let delta = Quaternion::from_axis_angle(axis.normalize(), Deg(degrees));
        let offset = self.position - pivot;
        self.set_position(pivot + delta.rotate_vector(offset));
        self.set_rotation((delta * self.rotation).normalize());
    }
}

/// Finds the transform of a game object by the object's id.
pub trait TransformLookup {
    fn transform(&self, owner: EntityId) -> Option<&Transform>;
    fn transform_mut(&mut self, owner: EntityId) -> Option<&mut Transform>;
}

/// `world(parent) * local(node)`, walking up to the root on every call.
pub fn world_matrix<L>(lookup: &L, owner: EntityId) -> Option<Matrix4<f32>>
where
    L: TransformLookup + ?Sized,
{
    let transform = lookup.transform(owner)?;
    let local = transform.local_matrix();
    match transform.parent.and_then(|parent| world_matrix(lookup, parent)) {
        Some(parent_world) => Some(parent_world * local),
        None => Some(local),
    }
}

pub fn world_position<L>(lookup: &L, owner: EntityId) -> Option<Vector3<f32>>
where
    L: TransformLookup + ?Sized,
{
    world_matrix(lookup, owner).map(|matrix| matrix.w.truncate())
}

pub fn transform_point_to_world<L>(
    lookup: &L,
    owner: EntityId,
    point: Vector3<f32>,
) -> Option<Vector3<f32>>
where
    L: TransformLookup + ?Sized,
{
    let matrix = world_matrix(lookup, owner)?;
    Some(matrix.transform_point(Point3::from_vec(point)).to_vec())
}

pub fn transform_point_to_local<L>(
    lookup: &L,
    owner: EntityId,
    point: Vector3<f32>,
) -> Option<Vector3<f32>>
where
    L: TransformLookup + ?Sized,
{
    let inverse = world_matrix(lookup, owner)?.invert()?;
    Some(inverse.transform_point(Point3::from_vec(point)).to_vec())
}

/// Moves `child` under `parent`, or detaches it when `parent` is `None`.
///
/// The child is removed from its previous parent's child list. Self-parenting
/// and parenting under a descendant are refused and change nothing.
pub fn set_parent<L>(
    lookup: &mut L,
    child: EntityId,
    parent: Option<EntityId>,
) -> Result<(), EngineError>
where
    L: TransformLookup + ?Sized,
{
    if parent == Some(child) {
        log::error!("Transform of {} cannot be parented to itself", child);
        return Err(EngineError::SelfParenting(child));
    }
    let current = lookup
        .transform(child)
        .ok_or(EngineError::UnknownObject(child))?
        .parent;
    if current == parent {
        return Ok(());
    }
    if let Some(parent) = parent {
        let mut cursor = Some(parent);
        while let Some(node) = cursor {
            if node == child {
                log::error!("Parenting {} under {} would create a cycle", child, parent);
                return Err(EngineError::HierarchyCycle { child, parent });
            }
            cursor = lookup
                .transform(node)
                .ok_or(EngineError::UnknownObject(node))?
                .parent;
        }
    }

    if let Some(old) = current {
        if let Some(old) = lookup.transform_mut(old) {
            old.children.retain(|other| *other != child);
        }
    }
    if let Some(parent) = parent {
        if let Some(parent) = lookup.transform_mut(parent) {
            if !parent.children.contains(&child) {
                parent.children.push(child);
            }
        }
    }
    if let Some(child) = lookup.transform_mut(child) {
        child.parent = parent;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use approx::assert_relative_eq;

    use super::*;

    #[derive(Default)]
    struct Nodes(HashMap<EntityId, Transform>);

    impl Nodes {
        fn with(ids: &[EntityId]) -> Self {
            Self(ids.iter().map(|id| (*id, Transform::new(100 + id, *id))).collect())
        }
    }

    impl TransformLookup for Nodes {
        fn transform(&self, owner: EntityId) -> Option<&Transform> {
            self.0.get(&owner)
        }

        fn transform_mut(&mut self, owner: EntityId) -> Option<&mut Transform> {
            self.0.get_mut(&owner)
        }
    }

    #[test]
    fn same_value_keeps_cache() {
        let mut transform = Transform::new(1, 0);
        transform.set_position(Vector3::new(1.0, 2.0, 3.0));
        transform.local_matrix();
        assert!(transform.has_cached_local());
        assert!(!transform.changed());

        transform.set_position(Vector3::new(1.0, 2.0, 3.0));
        assert!(transform.has_cached_local());
        assert!(!transform.changed());

        transform.set_position(Vector3::new(1.0, 2.0, 4.0));
        assert!(!transform.has_cached_local());
        assert!(transform.changed());
    }

    #[test]
    fn local_translation_follows_rotation() {
        let mut transform = Transform::new(1, 0);
        transform.rotate(Vector3::unit_y(), 90.0, Space::World);
        transform.translate(Vector3::unit_z(), Space::Local);
        assert_relative_eq!(transform.position(), Vector3::unit_x(), epsilon = 1e-5);

        transform.translate(Vector3::unit_z(), Space::World);
        assert_relative_eq!(
            transform.position(),
            Vector3::new(1.0, 0.0, 1.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn rotate_around_orbits_and_turns() {
        let mut transform = Transform::new(1, 0);
        transform.set_position(Vector3::new(2.0, 0.0, 0.0));
        transform.rotate_around(Vector3::new(1.0, 0.0, 0.0), Vector3::unit_y(), 180.0);
        assert_relative_eq!(transform.position(), Vector3::zero(), epsilon = 1e-5);
        assert_relative_eq!(
            transform.forward(),
            Vector3::new(0.0, 0.0, -1.0),
            epsilon = 1e-5
        );
    }

    #[test]
    fn reparenting_prunes_old_parent() {
        let mut nodes = Nodes::with(&[1, 2, 3]);
        set_parent(&mut nodes, 3, Some(1)).unwrap();
        set_parent(&mut nodes, 3, Some(2)).unwrap();
        assert!(nodes.transform(1).unwrap().children().is_empty());
        assert_eq!(nodes.transform(2).unwrap().children(), &[3]);
        assert_eq!(nodes.transform(3).unwrap().parent(), Some(2));

        set_parent(&mut nodes, 3, None).unwrap();
        assert!(nodes.transform(2).unwrap().children().is_empty());
        assert_eq!(nodes.transform(3).unwrap().parent(), None);
    }

    #[test]
    fn cycles_and_self_parenting_are_refused() {
        let mut nodes = Nodes::with(&[1, 2, 3]);
        set_parent(&mut nodes, 2, Some(1)).unwrap();
        set_parent(&mut nodes, 3, Some(2)).unwrap();

        assert!(matches!(
            set_parent(&mut nodes, 1, Some(1)),
            Err(EngineError::SelfParenting(1))
        ));
        assert!(matches!(
            set_parent(&mut nodes, 1, Some(3)),
            Err(EngineError::HierarchyCycle { child: 1, parent: 3 })
        ));
        assert_eq!(nodes.transform(1).unwrap().parent(), None);
        assert_eq!(nodes.transform(3).unwrap().children(), &[] as &[EntityId]);
    }

    #[test]
    fn point_round_trips_through_world_space() {
        let mut nodes = Nodes::with(&[1]);
        let node = nodes.transform_mut(1).unwrap();
        node.set_position(Vector3::new(0.0, 5.0, 0.0));
        node.set_scale(Vector3::new(2.0, 2.0, 2.0));
        let world = transform_point_to_world(&nodes, 1, Vector3::unit_x()).unwrap();
        assert_relative_eq!(world, Vector3::new(2.0, 5.0, 0.0), epsilon = 1e-5);
        let local = transform_point_to_local(&nodes, 1, world).unwrap();
        assert_relative_eq!(local, Vector3::unit_x(), epsilon = 1e-5);
    }
}
