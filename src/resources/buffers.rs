//! GPU resource ownership keyed by entity id.

use std::collections::HashMap;

use crate::{
    data_structures::{
        entity::EntityId,
        mesh::{IndexType, Mesh, MeshId, Topology},
    },
    device::{
        AttributeSlot, BufferHandle, BufferKind, GraphicsDevice, TextureData, TextureHandle,
        VertexArrayDesc, VertexArrayHandle,
    },
    error::EngineError,
};

/// The buffers of one uploaded mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshBuffers {
    pub vertex_array: VertexArrayHandle,
    pub streams: Vec<(AttributeSlot, BufferHandle)>,
    pub index_buffer: BufferHandle,
    pub index_type: IndexType,
    pub index_count: u32,
    pub topology: Topology,
}

/// Owns the graphics device and every buffer created through the engine.
///
/// Mesh buffers and uniform buffers live in separate maps, both keyed by the
/// id of the object that owns them. Each has an explicit release path that
/// destroys the device resources.
pub struct GpuResources {
    device: Box<dyn GraphicsDevice>,
    meshes: HashMap<MeshId, MeshBuffers>,
    uniforms: HashMap<EntityId, BufferHandle>,
}

impl std::fmt::Debug for GpuResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuResources")
            .field("meshes", &self.meshes.len())
            .field("uniforms", &self.uniforms.len())
            .finish()
    }
}

fn stream_bytes<T: bytemuck::Pod>(values: &[T]) -> Option<&[u8]> {
    if values.is_empty() {
        None
    } else {
        Some(bytemuck::cast_slice(values))
    }
}

impl GpuResources {
    pub fn new(device: impl GraphicsDevice + 'static) -> Self {
        Self::from_boxed(Box::new(device))
    }

    pub fn from_boxed(device: Box<dyn GraphicsDevice>) -> Self {
        Self {
            device,
            meshes: HashMap::new(),
            uniforms: HashMap::new(),
        }
    }

    pub fn device(&mut self) -> &mut dyn GraphicsDevice {
        self.device.as_mut()
    }

    /// Uploads every present attribute stream plus the index stream and
    /// binds them into one vertex array.
    pub fn create_mesh_buffer(&mut self, mesh: &Mesh) -> Result<&MeshBuffers, EngineError> {
        let id = mesh.id();
        if self.meshes.contains_key(&id) {
            log::error!("Mesh {} ({}) already has GPU buffers", id, mesh.name);
            return Err(EngineError::DuplicateBuffer(id));
        }
        let index_type = mesh.index_type()?;

        let streams: Vec<(AttributeSlot, &[u8])> = [
            (AttributeSlot::Position, stream_bytes(&mesh.positions)),
            (AttributeSlot::Normal, stream_bytes(&mesh.normals)),
            (AttributeSlot::Uv, stream_bytes(&mesh.uvs)),
            (AttributeSlot::Tangent, stream_bytes(&mesh.tangents)),
        ]
        .into_iter()
        .filter_map(|(slot, bytes)| bytes.map(|bytes| (slot, bytes)))
        .collect();

        let streams: Vec<(AttributeSlot, BufferHandle)> = streams
            .into_iter()
            .map(|(slot, bytes)| {
                let label = format!("{} {:?} Buffer", mesh.name, slot);
                (slot, self.device.create_buffer(BufferKind::Vertex, &label, bytes))
            })
            .collect();
        let index_buffer = self.device.create_buffer(
            BufferKind::Index(index_type),
            &format!("{} Index Buffer", mesh.name),
            &index_type.encode(&mesh.indices),
        );

        let desc = VertexArrayDesc {
            attributes: streams.clone(),
            index: Some((index_buffer, index_type)),
            vertex_count: mesh.positions.len() as u32,
        };
        let vertex_array = match self.device.create_vertex_array(&desc) {
            Ok(vertex_array) => vertex_array,
            Err(e) => {
                for (_, buffer) in &streams {
                    let _ = self.device.destroy_buffer(*buffer);
                }
                let _ = self.device.destroy_buffer(index_buffer);
                return Err(e.into());
            }
        };

        let buffers = MeshBuffers {
            vertex_array,
            streams,
            index_buffer,
            index_type,
            index_count: mesh.indices.len() as u32,
            topology: mesh.topology,
        };
        Ok(self.meshes.entry(id).or_insert(buffers))
    }

    pub fn mesh_buffer(&self, id: MeshId) -> Option<&MeshBuffers> {
        self.meshes.get(&id)
    }

    /// Destroys the vertex array and all buffers of mesh `id`.
    pub fn release_mesh(&mut self, id: MeshId) -> bool {
        let Some(buffers) = self.meshes.remove(&id) else {
            return false;
        };
        if let Err(e) = self.device.destroy_vertex_array(buffers.vertex_array) {
            log::warn!("Releasing mesh {}: {}", id, e);
        }
        let handles = buffers
            .streams
            .iter()
            .map(|(_, buffer)| *buffer)
            .chain(std::iter::once(buffers.index_buffer));
        for buffer in handles {
            if let Err(e) = self.device.destroy_buffer(buffer) {
                log::warn!("Releasing mesh {}: {}", id, e);
            }
        }
        true
    }

    pub fn create_uniform_buffer(
        &mut self,
        owner: EntityId,
        label: &str,
        contents: &[u8],
    ) -> Result<BufferHandle, EngineError> {
        if self.uniforms.contains_key(&owner) {
            log::error!("Uniform buffer for {} already exists", owner);
            return Err(EngineError::DuplicateBuffer(owner));
        }
        let buffer = self
            .device
            .create_buffer(BufferKind::Uniform, label, contents);
        self.uniforms.insert(owner, buffer);
        Ok(buffer)
    }

    pub fn uniform_buffer(&self, owner: EntityId) -> Option<BufferHandle> {
        self.uniforms.get(&owner).copied()
    }

    pub fn write_uniform(
        &mut self,
        owner: EntityId,
        offset: usize,
        data: &[u8],
    ) -> Result<(), EngineError> {
        let buffer = self
            .uniform_buffer(owner)
            .ok_or(EngineError::MissingBuffer(owner))?;
        self.device.write_buffer(buffer, offset, data)?;
        Ok(())
    }

    pub fn release_uniform(&mut self, owner: EntityId) -> bool {
        let Some(buffer) = self.uniforms.remove(&owner) else {
            return false;
        };
        if let Err(e) = self.device.destroy_buffer(buffer) {
            log::warn!("Releasing uniform buffer of {}: {}", owner, e);
        }
        true
    }

    pub fn create_texture(
        &mut self,
        label: &str,
        data: &TextureData,
    ) -> Result<TextureHandle, EngineError> {
        Ok(self.device.create_texture(label, data)?)
    }

    pub fn release_texture(&mut self, texture: TextureHandle) {
        if let Err(e) = self.device.destroy_texture(texture) {
            log::warn!("Releasing texture: {}", e);
        }
    }

    pub fn mesh_buffer_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn uniform_buffer_count(&self) -> usize {
        self.uniforms.len()
    }

    /// Frees everything, e.g. before the device goes away.
    pub fn release_all(&mut self) {
        let meshes: Vec<MeshId> = self.meshes.keys().copied().collect();
        for id in meshes {
            self.release_mesh(id);
        }
        let owners: Vec<EntityId> = self.uniforms.keys().copied().collect();
        for owner in owners {
            self.release_uniform(owner);
        }
    }
}
