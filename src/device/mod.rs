//! The graphics device boundary.
//!
//! Everything the engine needs from a GPU API goes through [`GraphicsDevice`]:
//! buffers, vertex arrays, textures, a little fixed-function state and indexed
//! draws. [`crate::context::WgpuDevice`] implements it on top of wgpu (WebGL2
//! in the browser); [`recording::RecordingDevice`] records the calls instead,
//! which is what the tests render with.

pub mod recording;

use thiserror::Error;

use crate::data_structures::{
    material::TextureSlot,
    mesh::{IndexType, Topology},
};

slotmap::new_key_type! {
    pub struct BufferHandle;
    pub struct VertexArrayHandle;
    pub struct TextureHandle;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index(IndexType),
    Uniform,
}

/// Fixed attribute locations shared by every shader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AttributeSlot {
    Position = 0,
    Normal = 1,
    Uv = 2,
    Tangent = 3,
}

impl AttributeSlot {
    pub const ALL: [AttributeSlot; 4] = [Self::Position, Self::Normal, Self::Uv, Self::Tangent];

    pub fn location(self) -> u32 {
        self as u32
    }

    /// Number of f32 components per vertex.
    pub fn components(self) -> u32 {
        match self {
            Self::Uv => 2,
            _ => 3,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VertexArrayDesc {
    pub attributes: Vec<(AttributeSlot, BufferHandle)>,
    pub index: Option<(BufferHandle, IndexType)>,
    pub vertex_count: u32,
}

/// Uniform buffer binding points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    Camera = 0,
    Material = 1,
    Object = 2,
    Lighting = 3,
}

impl UniformSlot {
    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Disabled,
    /// `src * src_alpha + dst * (1 - src_alpha)`
    Alpha,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ShaderKind {
    #[default]
    Pbr,
    Unlit,
}

/// Tightly packed RGBA8 pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// Colour data is sampled as sRGB, data maps (normals etc.) linearly.
    pub srgb: bool,
}

impl TextureData {
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
            srgb: true,
        }
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("unknown buffer {0:?}")]
    UnknownBuffer(BufferHandle),
    #[error("unknown vertex array {0:?}")]
    UnknownVertexArray(VertexArrayHandle),
    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureHandle),
    #[error("writing {len} bytes at offset {offset} overflows a buffer of {size} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("texture data holds {actual} bytes but {expected} are needed")]
    TextureSize { expected: usize, actual: usize },
    #[error("writes must be 4 byte aligned (offset {offset}, {len} bytes)")]
    Unaligned { offset: usize, len: usize },
    #[error("draw issued outside of a frame")]
    NoFrame,
    #[error("nothing is bound to uniform slot {0:?}")]
    MissingBinding(UniformSlot),
    #[error("surface unavailable: {0}")]
    Surface(String),
}

pub trait GraphicsDevice {
    fn create_buffer(&mut self, kind: BufferKind, label: &str, contents: &[u8]) -> BufferHandle;
    fn write_buffer(
        &mut self,
        buffer: BufferHandle,
        offset: usize,
        data: &[u8],
    ) -> Result<(), DeviceError>;
    fn destroy_buffer(&mut self, buffer: BufferHandle) -> Result<(), DeviceError>;

    fn create_vertex_array(
        &mut self,
        desc: &VertexArrayDesc,
    ) -> Result<VertexArrayHandle, DeviceError>;
    fn destroy_vertex_array(&mut self, vertex_array: VertexArrayHandle)
    -> Result<(), DeviceError>;

    fn create_texture(&mut self, label: &str, data: &TextureData)
    -> Result<TextureHandle, DeviceError>;
    fn destroy_texture(&mut self, texture: TextureHandle) -> Result<(), DeviceError>;

    fn use_shader(&mut self, shader: ShaderKind);
    fn bind_uniform_buffer(
        &mut self,
        slot: UniformSlot,
        buffer: BufferHandle,
    ) -> Result<(), DeviceError>;
    /// `None` unbinds the slot.
    fn bind_texture(
        &mut self,
        slot: TextureSlot,
        texture: Option<TextureHandle>,
    ) -> Result<(), DeviceError>;
    fn set_depth_test(&mut self, enabled: bool);
    fn set_depth_write(&mut self, enabled: bool);
    fn set_blend(&mut self, mode: BlendMode);

    fn draw_indexed(
        &mut self,
        vertex_array: VertexArrayHandle,
        topology: Topology,
        index_type: IndexType,
        count: u32,
    ) -> Result<(), DeviceError>;

    fn begin_frame(&mut self, clear_color: [f64; 4]) -> Result<(), DeviceError>;
    fn end_frame(&mut self) -> Result<(), DeviceError>;
    fn resize(&mut self, width: u32, height: u32);
}
