//! Scenes and the scene manager.

use cgmath::Matrix4;

use crate::{
    data_structures::{
        entity::{EntityAllocator, EntityId},
        game_object::GameObject,
        registry::{IndexedRegistry, RegistryKeys},
        transform::{self, Transform, TransformLookup},
    },
    error::EngineError,
};

/// A named collection of game objects.
#[derive(Debug)]
pub struct Scene {
    id: EntityId,
    name: String,
    objects: IndexedRegistry<GameObject>,
}

impl Scene {
    pub fn new(ids: &mut EntityAllocator, name: impl Into<String>) -> Self {
        Self {
            id: ids.create(),
            name: name.into(),
            objects: IndexedRegistry::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `object` by id, name and tags. A name already taken in this
    /// scene is stored with a numeric suffix.
    pub fn add_game_object(&mut self, object: GameObject) -> Result<EntityId, EngineError> {
        let id = object.id();
        let keys = RegistryKeys::named(object.name.clone()).with_tags(object.tags().to_vec());
        self.objects.add(id, object, keys)?;
        Ok(id)
    }

    pub fn add_game_objects(
        &mut self,
        objects: impl IntoIterator<Item = GameObject>,
    ) -> Result<Vec<EntityId>, EngineError> {
        objects
            .into_iter()
            .map(|object| self.add_game_object(object))
            .collect()
    }

    /// Takes `id` out of the scene. It is detached from its parent and its
    /// children become roots.
    pub fn remove_game_object(&mut self, id: EntityId) -> Option<GameObject> {
        if !self.objects.contains(id) {
            return None;
        }
        if let Err(e) = transform::set_parent(self, id, None) {
            log::warn!("Could not detach {} before removal: {}", id, e);
        }
        let children = self
            .transform(id)
            .map(|transform| transform.children().to_vec())
            .unwrap_or_default();
        for child in children {
            if let Err(e) = transform::set_parent(self, child, None) {
                log::warn!("Could not orphan {}: {}", child, e);
            }
        }
        self.objects.remove(id)
    }

    pub fn game_object(&self, id: EntityId) -> Option<&GameObject> {
        self.objects.get(id)
    }

    pub fn game_object_mut(&mut self, id: EntityId) -> Option<&mut GameObject> {
        self.objects.get_mut(id)
    }

    pub fn game_object_by_name(&self, name: &str) -> Option<&GameObject> {
        self.objects.get_by_name(name)
    }

    /// Name the object is stored under in this scene.
    pub fn stored_name(&self, id: EntityId) -> Option<&str> {
        self.objects.name_of(id)
    }

    pub fn game_objects_by_tag(&self, tag: &str) -> Vec<&GameObject> {
        self.objects.by_tag(tag)
    }

    pub fn ids_by_tag(&self, tag: &str) -> &[EntityId] {
        self.objects.ids_by_tag(tag)
    }

    /// Objects in insertion order.
    pub fn game_objects(&self) -> impl Iterator<Item = &GameObject> {
        self.objects.iter().map(|(_, object)| object)
    }

    pub fn object_ids(&self) -> Vec<EntityId> {
        self.objects.ids().to_vec()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.objects.contains(id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn set_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), EngineError> {
        transform::set_parent(self, child, parent)
    }

    pub fn world_matrix(&self, id: EntityId) -> Option<Matrix4<f32>> {
        transform::world_matrix(self, id)
    }
}

impl TransformLookup for Scene {
    fn transform(&self, owner: EntityId) -> Option<&Transform> {
        self.objects.get(owner).map(GameObject::transform)
    }

    fn transform_mut(&mut self, owner: EntityId) -> Option<&mut Transform> {
        self.objects.get_mut(owner).map(GameObject::transform_mut)
    }
}

/// Owns every loaded scene and remembers which one is current.
#[derive(Debug, Default)]
pub struct SceneManager {
    scenes: Vec<Scene>,
    current: Option<usize>,
}

impl SceneManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `scene` and makes it current.
    pub fn add_scene(&mut self, scene: Scene) -> usize {
        self.scenes.push(scene);
        let index = self.scenes.len() - 1;
        self.current = Some(index);
        index
    }

    pub fn scene_by_index(&self, index: usize) -> Option<&Scene> {
        self.scenes.get(index)
    }

    pub fn scene_by_name(&self, name: &str) -> Option<&Scene> {
        self.scenes.iter().find(|scene| scene.name() == name)
    }

    pub fn scene_by_name_mut(&mut self, name: &str) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|scene| scene.name() == name)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.iter()
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn set_current(&mut self, index: usize) -> Result<(), EngineError> {
        if index >= self.scenes.len() {
            return Err(EngineError::null_reference(
                "SceneManager",
                format!("there is no scene at index {}", index),
                format!("only {} scenes are loaded", self.scenes.len()),
            ));
        }
        self.current = Some(index);
        Ok(())
    }

    pub fn load_scene_by_name(&mut self, name: &str) -> Result<(), EngineError> {
        let index = self
            .scenes
            .iter()
            .position(|scene| scene.name() == name)
            .ok_or_else(|| {
                EngineError::null_reference(
                    "SceneManager",
                    format!("scene `{}` was not found", name),
                    "add the scene before loading it",
                )
            })?;
        self.current = Some(index);
        Ok(())
    }

    /// Removes a scene. Removing the current scene leaves none selected.
    pub fn remove_scene(&mut self, name: &str) -> Option<Scene> {
        let index = self.scenes.iter().position(|scene| scene.name() == name)?;
        let scene = self.scenes.remove(index);
        self.current = match self.current {
            Some(current) if current == index => None,
            Some(current) if current > index => Some(current - 1),
            other => other,
        };
        Some(scene)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current(&self) -> Result<&Scene, EngineError> {
        self.current
            .and_then(|index| self.scenes.get(index))
            .ok_or_else(no_current_scene)
    }

    pub fn current_mut(&mut self) -> Result<&mut Scene, EngineError> {
        self.current
            .and_then(|index| self.scenes.get_mut(index))
            .ok_or_else(no_current_scene)
    }
}

fn no_current_scene() -> EngineError {
    EngineError::null_reference(
        "SceneManager",
        "no scene is currently selected",
        "add a scene or load one by name before the first frame",
    )
}
