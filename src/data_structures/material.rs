//! Surface materials.
//!
//! A material owns a uniform block with its shading scalars. The block is
//! laid out once in [`Material::new`] and its GPU buffer is created the first
//! time the material is bound. Setters compare before writing and push the
//! changed property straight into the block.

use crate::{
    data_structures::entity::{EntityAllocator, EntityId},
    device::{ShaderKind, TextureHandle, UniformSlot},
    error::EngineError,
    resources::{buffers::GpuResources, uniform_block::UniformBlock},
};

pub type MaterialId = EntityId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum AlphaMode {
    #[default]
    Opaque,
    Mask,
    Blend,
}

impl AlphaMode {
    /// glTF spelling; anything unknown is opaque.
    pub fn parse(value: &str) -> Self {
        match value {
            "MASK" => Self::Mask,
            "BLEND" => Self::Blend,
            _ => Self::Opaque,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    BaseColor,
    Normal,
    MetallicRoughness,
    Emissive,
    Occlusion,
}

impl TextureSlot {
    pub const ALL: [TextureSlot; 5] = [
        Self::BaseColor,
        Self::Normal,
        Self::MetallicRoughness,
        Self::Emissive,
        Self::Occlusion,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Bit set in the `texture_flags` uniform while the slot is bound.
    pub fn flag(self) -> u32 {
        1 << self.index()
    }
}

#[derive(Debug)]
pub struct Material {
    id: MaterialId,
    pub name: String,
    /// A material without a shader is skipped by the renderer.
    pub shader: Option<ShaderKind>,
    pub alpha_mode: AlphaMode,
    color: [f32; 3],
    alpha: f32,
    metallic: f32,
    roughness: f32,
    ior: f32,
    emissive: [f32; 3],
    tiling: [f32; 2],
    offset: [f32; 2],
    textures: [Option<TextureHandle>; 5],
    sources: [Option<String>; 5],
    uniforms: UniformBlock,
}

impl Material {
    pub const COLOR: &'static str = "color";
    pub const ALPHA: &'static str = "alpha";
    pub const METALLIC: &'static str = "metallic";
    pub const ROUGHNESS: &'static str = "roughness";
    pub const IOR: &'static str = "ior";
    pub const EMISSIVE: &'static str = "emissive";
    pub const TILING: &'static str = "tiling";
    pub const OFFSET: &'static str = "offset";
    pub const TEXTURE_FLAGS: &'static str = "texture_flags";

    pub fn new(ids: &mut EntityAllocator, name: impl Into<String>) -> Self {
        let mut material = Self {
            id: ids.create(),
            name: name.into(),
            shader: Some(ShaderKind::Pbr),
            alpha_mode: AlphaMode::Opaque,
            color: [1.0; 3],
            alpha: 1.0,
            metallic: 0.2,
            roughness: 0.4,
            ior: 1.5,
            emissive: [0.0; 3],
            tiling: [1.0; 2],
            offset: [0.0; 2],
            textures: [None; 5],
            sources: Default::default(),
            uniforms: UniformBlock::new(),
        };
        if let Err(e) = material.define_layout() {
            log::error!("Material {}: {}", material.name, e);
        }
        material
    }

    pub fn unlit(ids: &mut EntityAllocator, name: impl Into<String>) -> Self {
        let mut material = Self::new(ids, name);
        material.shader = Some(ShaderKind::Unlit);
        material
    }

    fn define_layout(&mut self) -> Result<(), EngineError> {
        let block = &mut self.uniforms;
        block.define_vec3(Self::COLOR, self.color)?;
        block.define_float(Self::ALPHA, self.alpha)?;
        block.define_float(Self::METALLIC, self.metallic)?;
        block.define_float(Self::ROUGHNESS, self.roughness)?;
        block.define_float(Self::IOR, self.ior)?;
        block.define_vec3(Self::EMISSIVE, self.emissive)?;
        block.define_vec2(Self::TILING, self.tiling)?;
        block.define_vec2(Self::OFFSET, self.offset)?;
        block.define_float(Self::TEXTURE_FLAGS, 0.0)?;
        Ok(())
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn is_transparent(&self) -> bool {
        self.alpha_mode != AlphaMode::Opaque || self.alpha < 1.0
    }

    pub fn color(&self) -> [f32; 3] {
        self.color
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn metallic(&self) -> f32 {
        self.metallic
    }

    pub fn roughness(&self) -> f32 {
        self.roughness
    }

    pub fn ior(&self) -> f32 {
        self.ior
    }

    pub fn emissive(&self) -> [f32; 3] {
        self.emissive
    }

    pub fn tiling(&self) -> [f32; 2] {
        self.tiling
    }

    pub fn offset(&self) -> [f32; 2] {
        self.offset
    }

    pub fn uniforms(&self) -> &UniformBlock {
        &self.uniforms
    }

    pub fn set_color(&mut self, gpu: &mut GpuResources, color: [f32; 3]) {
        if self.color != color {
            self.color = color;
            self.uniforms.set_vec3(gpu, Self::COLOR, color);
        }
    }

    pub fn set_alpha(&mut self, gpu: &mut GpuResources, alpha: f32) {
        if self.alpha != alpha {
            self.alpha = alpha;
            self.uniforms.set_float(gpu, Self::ALPHA, alpha);
        }
    }

    pub fn set_metallic(&mut self, gpu: &mut GpuResources, metallic: f32) {
        if self.metallic != metallic {
            self.metallic = metallic;
            self.uniforms.set_float(gpu, Self::METALLIC, metallic);
        }
    }

    pub fn set_roughness(&mut self, gpu: &mut GpuResources, roughness: f32) {
        if self.roughness != roughness {
            self.roughness = roughness;
            self.uniforms.set_float(gpu, Self::ROUGHNESS, roughness);
        }
    }

    pub fn set_ior(&mut self, gpu: &mut GpuResources, ior: f32) {
        if self.ior != ior {
            self.ior = ior;
            self.uniforms.set_float(gpu, Self::IOR, ior);
        }
    }

    pub fn set_emissive(&mut self, gpu: &mut GpuResources, emissive: [f32; 3]) {
        if self.emissive != emissive {
            self.emissive = emissive;
            self.uniforms.set_vec3(gpu, Self::EMISSIVE, emissive);
        }
    }

    pub fn set_tiling(&mut self, gpu: &mut GpuResources, tiling: [f32; 2]) {
        if self.tiling != tiling {
            self.tiling = tiling;
            self.uniforms.set_vec2(gpu, Self::TILING, tiling);
        }
    }

    pub fn set_offset(&mut self, gpu: &mut GpuResources, offset: [f32; 2]) {
        if self.offset != offset {
            self.offset = offset;
            self.uniforms.set_vec2(gpu, Self::OFFSET, offset);
        }
    }

    pub fn texture(&self, slot: TextureSlot) -> Option<TextureHandle> {
        self.textures[slot.index()]
    }

    /// Where the texture of `slot` is loaded from, if it has not arrived yet
    /// or came from a URI.
    pub fn texture_source(&self, slot: TextureSlot) -> Option<&str> {
        self.sources[slot.index()].as_deref()
    }

    pub fn set_texture_source(&mut self, slot: TextureSlot, uri: impl Into<String>) {
        self.sources[slot.index()] = Some(uri.into());
    }

    /// Swaps the texture of `slot` and returns the previous one so the caller
    /// can release it.
    pub fn set_texture(
        &mut self,
        gpu: &mut GpuResources,
        slot: TextureSlot,
        texture: Option<TextureHandle>,
    ) -> Option<TextureHandle> {
        let previous = std::mem::replace(&mut self.textures[slot.index()], texture);
        let flags = self.texture_flags() as f32;
        self.uniforms.set_float(gpu, Self::TEXTURE_FLAGS, flags);
        previous
    }

    pub fn texture_flags(&self) -> u32 {
        TextureSlot::ALL
            .iter()
            .filter(|slot| self.texture(**slot).is_some())
            .fold(0, |flags, slot| flags | slot.flag())
    }

    /// Selects the shader and binds the uniform block and textures. Creates
    /// the uniform buffer on first use. Returns false when there is no shader.
    pub fn bind(&mut self, gpu: &mut GpuResources) -> Result<bool, EngineError> {
        let Some(shader) = self.shader else {
            return Ok(false);
        };
        if !self.uniforms.is_created() {
            self.uniforms.create_buffer(gpu, self.id)?;
        }
        let buffer = gpu
            .uniform_buffer(self.id)
            .ok_or(EngineError::MissingBuffer(self.id))?;
        let device = gpu.device();
        device.use_shader(shader);
        device.bind_uniform_buffer(UniformSlot::Material, buffer)?;
        for slot in TextureSlot::ALL {
            device.bind_texture(slot, self.textures[slot.index()])?;
        }
        Ok(true)
    }

    /// Frees the uniform buffer and every texture.
    pub fn release(&mut self, gpu: &mut GpuResources) {
        self.uniforms.release(gpu);
        for texture in self.textures.iter_mut().filter_map(Option::take) {
            gpu.release_texture(texture);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shading_scalars_are_packed_without_padding() {
        let mut ids = EntityAllocator::new();
        let material = Material::new(&mut ids, "m");
        let offset = |name| material.uniforms().property(name).unwrap().offset;
        assert_eq!(offset(Material::COLOR), 0);
        assert_eq!(offset(Material::ALPHA), 12);
        assert_eq!(offset(Material::METALLIC), 16);
        assert_eq!(offset(Material::EMISSIVE), 28);
        assert_eq!(offset(Material::TILING), 40);
        assert_eq!(offset(Material::TEXTURE_FLAGS), 56);
        assert_eq!(material.uniforms().size(), 60);
    }

    #[test]
    fn transparency_follows_alpha_mode_and_alpha() {
        let mut ids = EntityAllocator::new();
        let mut material = Material::new(&mut ids, "m");
        assert!(!material.is_transparent());
        material.alpha_mode = AlphaMode::parse("BLEND");
        assert!(material.is_transparent());
        material.alpha_mode = AlphaMode::parse("OPAQUE");
        material.alpha = 0.5;
        assert!(material.is_transparent());
    }
}
