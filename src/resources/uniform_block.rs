//! Named uniform block layouts with partial uploads.
//!
//! Properties are laid out back to back in declaration order without any
//! padding, so the declaring code and the shader struct have to agree on the
//! layout. Once the GPU buffer exists the layout is frozen; setters then
//! write only the bytes of the property that changed.

use std::collections::{HashMap, HashSet};

use crate::{
    data_structures::entity::EntityId,
    device::BufferHandle,
    error::EngineError,
    resources::buffers::GpuResources,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UniformType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
}

impl UniformType {
    pub fn components(self) -> usize {
        match self {
            Self::Float => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 => 4,
            Self::Mat4 => 16,
        }
    }

    /// Byte width reserved for a property of this type.
    pub fn size(self) -> usize {
        self.components() * std::mem::size_of::<f32>()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct UniformProperty {
    pub name: String,
    pub ty: UniformType,
    pub offset: usize,
    value: Vec<f32>,
}

impl UniformProperty {
    pub fn size(&self) -> usize {
        self.ty.size()
    }

    pub fn value(&self) -> &[f32] {
        &self.value
    }
}

#[derive(Debug, Default)]
pub struct UniformBlock {
    properties: Vec<UniformProperty>,
    lookup: HashMap<String, usize>,
    size: usize,
    owner: Option<EntityId>,
    missing: HashSet<String>,
}

impl UniformBlock {
    pub fn new() -> Self {
        Self::default()
    }

    fn define(&mut self, name: &str, ty: UniformType, value: &[f32]) -> Result<(), EngineError> {
        if self.lookup.contains_key(name) {
            log::error!("Uniform property {} is already defined", name);
            return Err(EngineError::DuplicateProperty(name.to_string()));
        }
        if self.owner.is_some() {
            log::error!("Uniform property {} defined after buffer creation", name);
            return Err(EngineError::BlockSealed(name.to_string()));
        }
        self.lookup.insert(name.to_string(), self.properties.len());
        self.properties.push(UniformProperty {
            name: name.to_string(),
            ty,
            offset: self.size,
            value: value.to_vec(),
        });
        self.size += ty.size();
        Ok(())
    }

    pub fn define_float(&mut self, name: &str, value: f32) -> Result<(), EngineError> {
        self.define(name, UniformType::Float, &[value])
    }

    pub fn define_vec2(&mut self, name: &str, value: [f32; 2]) -> Result<(), EngineError> {
        self.define(name, UniformType::Vec2, &value)
    }

    pub fn define_vec3(&mut self, name: &str, value: [f32; 3]) -> Result<(), EngineError> {
        self.define(name, UniformType::Vec3, &value)
    }

    pub fn define_vec4(&mut self, name: &str, value: [f32; 4]) -> Result<(), EngineError> {
        self.define(name, UniformType::Vec4, &value)
    }

    /// Column-major, as produced by `cgmath::Matrix4::into`.
    pub fn define_mat4(&mut self, name: &str, value: [[f32; 4]; 4]) -> Result<(), EngineError> {
        self.define(name, UniformType::Mat4, value.as_flattened())
    }

    /// Allocates the GPU buffer under `owner` and uploads every property.
    pub fn create_buffer(
        &mut self,
        gpu: &mut GpuResources,
        owner: EntityId,
    ) -> Result<BufferHandle, EngineError> {
        if self.owner.is_some() {
            log::error!("Uniform block of {} already has a buffer", owner);
            return Err(EngineError::BufferAlreadyCreated);
        }
        let buffer = gpu.create_uniform_buffer(owner, &format!("Uniform Block {}", owner), &self.bytes())?;
        self.owner = Some(owner);
        Ok(buffer)
    }

    pub fn is_created(&self) -> bool {
        self.owner.is_some()
    }

    pub fn owner(&self) -> Option<EntityId> {
        self.owner
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn property(&self, name: &str) -> Option<&UniformProperty> {
        self.lookup.get(name).map(|index| &self.properties[*index])
    }

    pub fn properties(&self) -> &[UniformProperty] {
        &self.properties
    }

    /// All property values, packed.
    pub fn bytes(&self) -> Vec<u8> {
        let values: Vec<f32> = self
            .properties
            .iter()
            .flat_map(|property| property.value.iter().copied())
            .collect();
        bytemuck::cast_slice(&values).to_vec()
    }

    pub fn set_float(&mut self, gpu: &mut GpuResources, name: &str, value: f32) -> bool {
        self.set(gpu, name, UniformType::Float, &[value])
    }

    pub fn set_vec2(&mut self, gpu: &mut GpuResources, name: &str, value: [f32; 2]) -> bool {
        self.set(gpu, name, UniformType::Vec2, &value)
    }

    pub fn set_vec3(&mut self, gpu: &mut GpuResources, name: &str, value: [f32; 3]) -> bool {
        self.set(gpu, name, UniformType::Vec3, &value)
    }

    pub fn set_vec4(&mut self, gpu: &mut GpuResources, name: &str, value: [f32; 4]) -> bool {
        self.set(gpu, name, UniformType::Vec4, &value)
    }

    pub fn set_mat4(&mut self, gpu: &mut GpuResources, name: &str, value: [[f32; 4]; 4]) -> bool {
        self.set(gpu, name, UniformType::Mat4, value.as_flattened())
    }

    /// Stores the value and, once the buffer exists, uploads its bytes.
    ///
    /// Unknown names are a soft failure: they are reported once and then
    /// remembered as missing.
    fn set(&mut self, gpu: &mut GpuResources, name: &str, ty: UniformType, value: &[f32]) -> bool {
        let Some(index) = self.lookup.get(name).copied() else {
            if self.missing.insert(name.to_string()) {
                log::warn!("Uniform property {} not found, further writes are ignored", name);
            }
            return false;
        };
        let property = &mut self.properties[index];
        if property.ty != ty {
            log::warn!(
                "Uniform property {} is a {:?}, not a {:?}",
                name,
                property.ty,
                ty
            );
            return false;
        }
        property.value.copy_from_slice(value);
        let Some(owner) = self.owner else {
            return true;
        };
        let offset = property.offset;
        if let Err(e) = gpu.write_uniform(owner, offset, bytemuck::cast_slice(value)) {
            log::error!("Could not upload uniform {}: {}", name, e);
            return false;
        }
        true
    }

    /// Frees the GPU buffer. The layout and values are kept.
    pub fn release(&mut self, gpu: &mut GpuResources) {
        if let Some(owner) = self.owner.take() {
            gpu.release_uniform(owner);
        }
    }
}
