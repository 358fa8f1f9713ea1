use std::{cell::RefCell, rc::Rc};

use slotmap::SlotMap;

use crate::{
    data_structures::{
        material::TextureSlot,
        mesh::{IndexType, Topology},
    },
    device::{
        BlendMode, BufferHandle, BufferKind, DeviceError, GraphicsDevice, ShaderKind,
        TextureData, TextureHandle, UniformSlot, VertexArrayDesc, VertexArrayHandle,
    },
};

#[derive(Clone, Debug, PartialEq)]
pub enum GpuCommand {
    CreateBuffer {
        buffer: BufferHandle,
        kind: BufferKind,
        size: usize,
    },
    WriteBuffer {
        buffer: BufferHandle,
        offset: usize,
        len: usize,
    },
    DestroyBuffer(BufferHandle),
    CreateVertexArray(VertexArrayHandle),
    DestroyVertexArray(VertexArrayHandle),
    CreateTexture(TextureHandle),
    DestroyTexture(TextureHandle),
    UseShader(ShaderKind),
    BindUniform {
        slot: UniformSlot,
        buffer: BufferHandle,
    },
    BindTexture {
        slot: TextureSlot,
        texture: Option<TextureHandle>,
    },
    DepthTest(bool),
    DepthWrite(bool),
    Blend(BlendMode),
    Draw {
        vertex_array: VertexArrayHandle,
        topology: Topology,
        index_type: IndexType,
        count: u32,
    },
    BeginFrame,
    EndFrame,
    Resize(u32, u32),
}

#[derive(Debug)]
struct RecordedBuffer {
    kind: BufferKind,
    label: String,
    bytes: Vec<u8>,
}

/// Everything a [`RecordingDevice`] has seen, plus the resources that are
/// still alive.
#[derive(Debug, Default)]
pub struct Recording {
    pub commands: Vec<GpuCommand>,
    buffers: SlotMap<BufferHandle, RecordedBuffer>,
    vertex_arrays: SlotMap<VertexArrayHandle, VertexArrayDesc>,
    textures: SlotMap<TextureHandle, (u32, u32)>,
    in_frame: bool,
}

impl Recording {
    pub fn buffer_contents(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(buffer).map(|b| b.bytes.as_slice())
    }

    pub fn buffer_kind(&self, buffer: BufferHandle) -> Option<BufferKind> {
        self.buffers.get(buffer).map(|b| b.kind)
    }

    pub fn buffer_label(&self, buffer: BufferHandle) -> Option<&str> {
        self.buffers.get(buffer).map(|b| b.label.as_str())
    }

    pub fn vertex_array(&self, vertex_array: VertexArrayHandle) -> Option<&VertexArrayDesc> {
        self.vertex_arrays.get(vertex_array)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn live_vertex_arrays(&self) -> usize {
        self.vertex_arrays.len()
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Vertex arrays in the order they were drawn.
    pub fn draws(&self) -> Vec<VertexArrayHandle> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::Draw { vertex_array, .. } => Some(*vertex_array),
                _ => None,
            })
            .collect()
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }
}

/// A [`GraphicsDevice`] without a GPU. Buffer contents are kept in memory
/// and every call is appended to a shared [`Recording`].
#[derive(Clone, Debug, Default)]
pub struct RecordingDevice {
    log: Rc<RefCell<Recording>>,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the log that stays valid after the device was moved
    /// into the engine.
    pub fn probe(&self) -> Rc<RefCell<Recording>> {
        self.log.clone()
    }

    fn push(&self, command: GpuCommand) {
        self.log.borrow_mut().commands.push(command);
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer(&mut self, kind: BufferKind, label: &str, contents: &[u8]) -> BufferHandle {
        let buffer = self.log.borrow_mut().buffers.insert(RecordedBuffer {
            kind,
            label: label.to_string(),
            bytes: contents.to_vec(),
        });
        self.push(GpuCommand::CreateBuffer {
            buffer,
            kind,
            size: contents.len(),
        });
        buffer
    }

    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError> {
        {
            let mut log = self.log.borrow_mut();
            let stored = log
                .buffers
                .get_mut(buffer)
                .ok_or(DeviceError::UnknownBuffer(buffer))?;
            let size = stored.bytes.len();
            let end = offset + data.len();
            if end > size {
                return Err(DeviceError::OutOfRange {
                    offset,
                    len: data.len(),
                    size,
                });
            }
            stored.bytes[offset..end].copy_from_slice(data);
        }
        self.push(GpuCommand::WriteBuffer {
            buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError> {
        self.log
            .borrow_mut()
            .buffers
            .remove(buffer)
            .ok_or(DeviceError::UnknownBuffer(buffer))?;
        self.push(GpuCommand::DestroyBuffer(buffer));
        Ok(())
    }

    fn create_vertex_array(
        &mut self,
        desc: &VertexArrayDesc,
    ) -> Result<VertexArrayHandle, DeviceError> {
        let vertex_array = {
            let mut log = self.log.borrow_mut();
            let buffers = desc
                .attributes
                .iter()
                .map(|(_, buffer)| *buffer)
                .chain(desc.index.map(|(buffer, _)| buffer));
            for buffer in buffers {
                if !log.buffers.contains_key(buffer) {
                    return Err(DeviceError::UnknownBuffer(buffer));
                }
            }
            log.vertex_arrays.insert(desc.clone())
        };
        self.push(GpuCommand::CreateVertexArray(vertex_array));
        Ok(vertex_array)
    }

    fn destroy_vertex_array(
        &mut self,
        vertex_array: VertexArrayHandle,
    ) -> Result<(), DeviceError> {
        self.log
            .borrow_mut()
            .vertex_arrays
            .remove(vertex_array)
            .ok_or(DeviceError::UnknownVertexArray(vertex_array))?;
        self.push(GpuCommand::DestroyVertexArray(vertex_array));
        Ok(())
    }

    fn create_texture(
        &mut self,
        _label: &str,
        data: &TextureData,
    ) -> Result<TextureHandle, DeviceError> {
        if data.rgba.len() != data.expected_len() {
            return Err(DeviceError::TextureSize {
                expected: data.expected_len(),
                actual: data.rgba.len(),
            });
        }
        let texture = self
            .log
            .borrow_mut()
            .textures
            .insert((data.width, data.height));
        self.push(GpuCommand::CreateTexture(texture));
        Ok(texture)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), DeviceError> {
        self.log
            .borrow_mut()
            .textures
            .remove(texture)
            .ok_or(DeviceError::UnknownTexture(texture))?;
        self.push(GpuCommand::DestroyTexture(texture));
        Ok(())
    }

    fn use_shader(&mut self, shader: ShaderKind) {
        self.push(GpuCommand::UseShader(shader));
    }

    fn bind_uniform_buffer(
        &mut self,
        slot: UniformSlot,
        buffer: BufferHandle,
    ) -> Result<(), DeviceError> {
        if !self.log.borrow().buffers.contains_key(buffer) {
            return Err(DeviceError::UnknownBuffer(buffer));
        }
        self.push(GpuCommand::BindUniform { slot, buffer });
        Ok(())
    }

    fn bind_texture(
        &mut self,
        slot: TextureSlot,
        texture: Option<TextureHandle>,
    ) -> Result<(), DeviceError> {
        if let Some(texture) = texture {
            if !self.log.borrow().textures.contains_key(texture) {
                return Err(DeviceError::UnknownTexture(texture));
            }
        }
        self.push(GpuCommand::BindTexture { slot, texture });
        Ok(())
    }

    fn set_depth_test(&mut self, enabled: bool) {
        self.push(GpuCommand::DepthTest(enabled));
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.push(GpuCommand::DepthWrite(enabled));
    }

    fn set_blend(&mut self, mode: BlendMode) {
        self.push(GpuCommand::Blend(mode));
    }

    fn draw_indexed(
        &mut self,
        vertex_array: VertexArrayHandle,
        topology: Topology,
        index_type: IndexType,
        count: u32,
    ) -> Result<(), DeviceError> {
        {
            let log = self.log.borrow();
            if !log.in_frame {
                return Err(DeviceError::NoFrame);
            }
            if !log.vertex_arrays.contains_key(vertex_array) {
                return Err(DeviceError::UnknownVertexArray(vertex_array));
            }
        }
        self.push(GpuCommand::Draw {
            vertex_array,
            topology,
            index_type,
            count,
        });
        Ok(())
    }

    fn begin_frame(&mut self, _clear_color: [f64; 4]) -> Result<(), DeviceError> {
        self.log.borrow_mut().in_frame = true;
        self.push(GpuCommand::BeginFrame);
        Ok(())
    }

    fn end_frame(&mut self) -> Result<(), DeviceError> {
        self.log.borrow_mut().in_frame = false;
        self.push(GpuCommand::EndFrame);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.push(GpuCommand::Resize(width, height));
    }
}
