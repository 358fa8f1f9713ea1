use crate::{
    data_structures::{
        camera::Camera,
        component::{
            Component, ComponentData, ComponentGroup, ComponentId, ComponentKind, MeshFilter,
            MeshRenderer,
        },
        entity::{EntityAllocator, EntityId},
        registry::{IndexedRegistry, RegistryKeys},
        transform::Transform,
    },
    error::EngineError,
};

/// An entity with a transform and a bag of components.
///
/// The transform is created together with the object and is the only one it
/// will ever have. Other components are kept in an [`IndexedRegistry`] so they
/// can be queried by kind and group.
#[derive(Debug)]
pub struct GameObject {
    id: EntityId,
    pub name: String,
    pub is_active: bool,
    tags: Vec<String>,
    transform: Transform,
    components: IndexedRegistry<Component, ComponentKind, ComponentGroup>,
}

impl GameObject {
    pub fn new(ids: &mut EntityAllocator, name: impl Into<String>) -> Self {
        let id = ids.create();
        let transform = Transform::new(ids.create(), id);
        Self {
            id,
            name: name.into(),
            is_active: true,
            tags: Vec::new(),
            transform,
            components: IndexedRegistry::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.add_tag(tag);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|other| other == tag)
    }

    /// Only takes effect in scene lookups for objects added afterwards.
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into();
        if !self.has_tag(&tag) {
            self.tags.push(tag);
        }
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    /// Binds `component` to this object and registers it under its kind and
    /// group. A second transform is refused; the refused component's id is
    /// left to whoever allocated it.
    pub fn add_component_instance(
        &mut self,
        mut component: Component,
    ) -> Result<ComponentId, EngineError> {
        let kind = component.kind();
        if kind == ComponentKind::Transform {
            log::error!("Game object {} ({}) already has a transform", self.id, self.name);
            return Err(EngineError::DuplicateComponent {
                owner: self.id,
                kind,
            });
        }
        component.bind(self.id);
        let id = component.id();
        let keys = RegistryKeys::default()
            .with_kind(kind)
            .with_group(kind.group());
        self.components.add(id, component, keys)?;
        Ok(id)
    }

    pub fn add_component(
        &mut self,
        ids: &mut EntityAllocator,
        kind: ComponentKind,
    ) -> Result<ComponentId, EngineError> {
        if kind == ComponentKind::Transform {
            log::error!("Game object {} ({}) already has a transform", self.id, self.name);
            return Err(EngineError::DuplicateComponent {
                owner: self.id,
                kind,
            });
        }
        let component = Component::of_kind(ids, kind);
        self.add_component_instance(component)
    }

    pub fn remove_component(&mut self, id: ComponentId) -> Option<Component> {
        self.components.remove(id)
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(id)
    }

    pub fn component_mut(&mut self, id: ComponentId) -> Option<&mut Component> {
        self.components.get_mut(id)
    }

    /// Components in the order they were added, without the transform.
    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().map(|(_, component)| component)
    }

    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut Component> {
        self.components.values_mut()
    }

    pub fn components_of_kind(&self, kind: ComponentKind) -> Vec<&Component> {
        self.components.by_kind(&kind)
    }

    pub fn component_ids_of_kind(&self, kind: ComponentKind) -> Vec<ComponentId> {
        self.components.ids_by_kind(&kind).to_vec()
    }

    pub fn component_of_kind(&self, kind: ComponentKind) -> Option<&Component> {
        let id = self.components.ids_by_kind(&kind).first()?;
        self.components.get(*id)
    }

    pub fn component_of_kind_mut(&mut self, kind: ComponentKind) -> Option<&mut Component> {
        let id = *self.components.ids_by_kind(&kind).first()?;
        self.components.get_mut(id)
    }

    pub fn components_in_group(&self, group: ComponentGroup) -> Vec<&Component> {
        self.components.by_group(&group)
    }

    pub fn component_ids_in_group(&self, group: ComponentGroup) -> Vec<ComponentId> {
        self.components.ids_by_group(&group).to_vec()
    }

    /// Number of components including the transform.
    pub fn component_count(&self) -> usize {
        self.components.len() + 1
    }

    pub fn mesh_filter(&self) -> Option<&MeshFilter> {
        self.component_of_kind(ComponentKind::MeshFilter)
            .and_then(Component::as_mesh_filter)
    }

    pub fn mesh_renderer(&self) -> Option<&MeshRenderer> {
        self.component_of_kind(ComponentKind::MeshRenderer)
            .and_then(Component::as_mesh_renderer)
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.component_of_kind(ComponentKind::Camera)
            .and_then(Component::as_camera)
    }

    pub fn camera_mut(&mut self) -> Option<&mut Camera> {
        self.component_of_kind_mut(ComponentKind::Camera)
            .and_then(Component::as_camera_mut)
    }

    /// Integrates every active rigid body into the object's transform.
    pub fn step_physics(&mut self, dt: f32) {
        let transform = &mut self.transform;
        for component in self.components.values_mut() {
            if !component.is_active {
                continue;
            }
            if let Some(body) = component.as_rigid_body_mut() {
                body.integrate(transform, dt);
            }
        }
    }

    /// Shorthand for attaching plain data. The id allocated for the
    /// component goes back to `ids` when the object refuses it.
    pub fn attach(
        &mut self,
        ids: &mut EntityAllocator,
        data: ComponentData,
    ) -> Result<ComponentId, EngineError> {
        let component = Component::new(ids, data);
        let id = component.id();
        let added = self.add_component_instance(component);
        if let Err(EngineError::DuplicateComponent { .. }) = added {
            ids.destroy(id);
        }
        added
    }
}
