//! Components attachable to a game object.
//!
//! The set of component kinds is closed: [`ComponentData`] lists all of them,
//! and [`ComponentKind`]/[`ComponentGroup`] replace lookups by type name.
//! Group-style queries go through the capability traits [`Renderer`],
//! [`Collider`] and [`LightSource`].

use cgmath::{Matrix4, Vector3};

use crate::{
    data_structures::{
        camera::Camera,
        entity::{EntityAllocator, EntityId},
        light::{Light, LightKind},
        material::MaterialId,
        mesh::MeshId,
        physics::{Aabb, BoxCollider, Pose, Ray, RigidBody},
        script::Script,
        transform::Transform,
    },
    error::EngineError,
    resources::{buffers::GpuResources, uniform_block::UniformBlock},
};

pub type ComponentId = EntityId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Transform,
    MeshFilter,
    MeshRenderer,
    Camera,
    Light,
    RigidBody,
    BoxCollider,
    Script,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentGroup {
    Transform,
    MeshFilter,
    Renderer,
    Camera,
    Light,
    RigidBody,
    Collider,
    Script,
}

impl ComponentKind {
    pub fn group(self) -> ComponentGroup {
        match self {
            Self::Transform => ComponentGroup::Transform,
            Self::MeshFilter => ComponentGroup::MeshFilter,
            Self::MeshRenderer => ComponentGroup::Renderer,
            Self::Camera => ComponentGroup::Camera,
            Self::Light => ComponentGroup::Light,
            Self::RigidBody => ComponentGroup::RigidBody,
            Self::BoxCollider => ComponentGroup::Collider,
            Self::Script => ComponentGroup::Script,
        }
    }
}

/// Points a game object at a mesh.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshFilter {
    pub mesh: Option<MeshId>,
}

impl MeshFilter {
    pub fn new(mesh: MeshId) -> Self {
        Self { mesh: Some(mesh) }
    }
}

/// Draws the object's mesh filter mesh with a material.
#[derive(Debug, Default)]
pub struct MeshRenderer {
    pub material: Option<MaterialId>,
    uniforms: UniformBlock,
}

impl MeshRenderer {
    pub const MODEL_MATRIX: &'static str = "u_modelMatrix";

    pub fn new(material: MaterialId) -> Self {
        Self {
            material: Some(material),
            uniforms: UniformBlock::new(),
        }
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    /// Writes `model` into the object uniform block, creating the block on
    /// first use with `owner` as its GPU buffer key.
    pub fn sync_model_matrix(
        &mut self,
        gpu: &mut GpuResources,
        owner: ComponentId,
        model: Matrix4<f32>,
    ) -> Result<(), EngineError> {
        let model: [[f32; 4]; 4] = model.into();
        if !self.uniforms.is_created() {
            if self.uniforms.property(Self::MODEL_MATRIX).is_none() {
                self.uniforms.define_mat4(Self::MODEL_MATRIX, model)?;
            } else {
                self.uniforms.set_mat4(gpu, Self::MODEL_MATRIX, model);
            }
            self.uniforms.create_buffer(gpu, owner)?;
            return Ok(());
        }
        self.uniforms.set_mat4(gpu, Self::MODEL_MATRIX, model);
        Ok(())
    }

    pub(crate) fn release(&mut self, gpu: &mut GpuResources) {
        self.uniforms.release(gpu);
    }
}

pub trait Renderer {
    fn material(&self) -> Option<MaterialId>;
}

impl Renderer for MeshRenderer {
    fn material(&self) -> Option<MaterialId> {
        self.material
    }
}

pub trait Collider {
    /// First point where `ray` enters the collider, in world space.
    fn raycast(&self, pose: &Pose, ray: &Ray) -> Option<Vector3<f32>>;

    fn bounds(&self, pose: &Pose) -> Aabb;
}

pub trait LightSource {
    fn light_kind(&self) -> LightKind;
    fn radiance(&self) -> Vector3<f32>;
}

impl LightSource for Light {
    fn light_kind(&self) -> LightKind {
        self.kind
    }

    fn radiance(&self) -> Vector3<f32> {
        Vector3::from(self.color) * self.intensity
    }
}

#[derive(Debug)]
pub enum ComponentData {
    Transform(Transform),
    MeshFilter(MeshFilter),
    MeshRenderer(MeshRenderer),
    Camera(Camera),
    Light(Light),
    RigidBody(RigidBody),
    BoxCollider(BoxCollider),
    Script(Script),
}

impl ComponentData {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Transform(_) => ComponentKind::Transform,
            Self::MeshFilter(_) => ComponentKind::MeshFilter,
            Self::MeshRenderer(_) => ComponentKind::MeshRenderer,
            Self::Camera(_) => ComponentKind::Camera,
            Self::Light(_) => ComponentKind::Light,
            Self::RigidBody(_) => ComponentKind::RigidBody,
            Self::BoxCollider(_) => ComponentKind::BoxCollider,
            Self::Script(_) => ComponentKind::Script,
        }
    }
}

#[derive(Debug)]
pub struct Component {
    id: ComponentId,
    owner: Option<EntityId>,
    pub is_active: bool,
    pub data: ComponentData,
}

impl Component {
    pub fn new(ids: &mut EntityAllocator, data: ComponentData) -> Self {
        Self {
            id: ids.create(),
            owner: None,
            is_active: true,
            data,
        }
    }

    /// Default instance of `kind`.
    pub fn of_kind(ids: &mut EntityAllocator, kind: ComponentKind) -> Self {
        let data = match kind {
            ComponentKind::Transform => {
                let id = ids.create();
                ComponentData::Transform(Transform::new(id, id))
            }
            ComponentKind::MeshFilter => ComponentData::MeshFilter(MeshFilter::default()),
            ComponentKind::MeshRenderer => ComponentData::MeshRenderer(MeshRenderer::default()),
            ComponentKind::Camera => ComponentData::Camera(Camera::default()),
            ComponentKind::Light => ComponentData::Light(Light::default()),
            ComponentKind::RigidBody => ComponentData::RigidBody(RigidBody::default()),
            ComponentKind::BoxCollider => ComponentData::BoxCollider(BoxCollider::default()),
            ComponentKind::Script => ComponentData::Script(Script::empty()),
        };
        Self::new(ids, data)
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub(crate) fn bind(&mut self, owner: EntityId) {
        self.owner = Some(owner);
    }

    pub fn kind(&self) -> ComponentKind {
        self.data.kind()
    }

    pub fn group(&self) -> ComponentGroup {
        self.kind().group()
    }

    pub fn as_renderer(&self) -> Option<&dyn Renderer> {
        match &self.data {
            ComponentData::MeshRenderer(renderer) => Some(renderer),
            _ => None,
        }
    }

    pub fn as_collider(&self) -> Option<&dyn Collider> {
        match &self.data {
            ComponentData::BoxCollider(collider) => Some(collider),
            _ => None,
        }
    }

    pub fn as_light_source(&self) -> Option<&dyn LightSource> {
        match &self.data {
            ComponentData::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn as_mesh_filter(&self) -> Option<&MeshFilter> {
        match &self.data {
            ComponentData::MeshFilter(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn as_mesh_filter_mut(&mut self) -> Option<&mut MeshFilter> {
        match &mut self.data {
            ComponentData::MeshFilter(filter) => Some(filter),
            _ => None,
        }
    }

    pub fn as_mesh_renderer(&self) -> Option<&MeshRenderer> {
        match &self.data {
            ComponentData::MeshRenderer(renderer) => Some(renderer),
            _ => None,
        }
    }

    pub fn as_mesh_renderer_mut(&mut self) -> Option<&mut MeshRenderer> {
        match &mut self.data {
            ComponentData::MeshRenderer(renderer) => Some(renderer),
            _ => None,
        }
    }

    pub fn as_camera(&self) -> Option<&Camera> {
        match &self.data {
            ComponentData::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn as_camera_mut(&mut self) -> Option<&mut Camera> {
        match &mut self.data {
            ComponentData::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    pub fn as_light(&self) -> Option<&Light> {
        match &self.data {
            ComponentData::Light(light) => Some(light),
            _ => None,
        }
    }

    pub fn as_rigid_body_mut(&mut self) -> Option<&mut RigidBody> {
        match &mut self.data {
            ComponentData::RigidBody(body) => Some(body),
            _ => None,
        }
    }

    pub fn as_script_mut(&mut self) -> Option<&mut Script> {
        match &mut self.data {
            ComponentData::Script(script) => Some(script),
            _ => None,
        }
    }

    /// Frees GPU resources the component owns.
    pub(crate) fn release(&mut self, gpu: &mut GpuResources) {
        match &mut self.data {
            ComponentData::MeshRenderer(renderer) => renderer.release(gpu),
            ComponentData::Camera(camera) => camera.release(gpu),
            _ => (),
        }
    }
}
