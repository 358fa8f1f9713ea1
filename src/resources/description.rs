//! Structured scene description extracted from a glTF document.
//!
//! The JSON of a [`GlbDocument`] is validated through the `gltf` crate and
//! flattened into plain vectors the converter can consume without touching
//! glTF types: nodes with their TRS and links, the geometry of every
//! primitive of each mesh and the factors and texture URIs of each material.

use crate::{
    data_structures::{
        material::{AlphaMode, TextureSlot},
        mesh::Topology,
    },
    resources::glb::{GlbDocument, GlbError},
};

#[derive(Clone, Debug, PartialEq)]
pub struct NodeDescription {
    pub name: String,
    pub translation: [f32; 3],
    /// `[x, y, z, w]`
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
}

/// One primitive of a glTF mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshDescription {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    /// `None` when the primitive is not indexed.
    pub indices: Option<Vec<u32>>,
    pub topology: Topology,
    pub material: Option<usize>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialDescription {
    pub name: String,
    pub base_color: [f32; 4],
    pub metallic: f32,
    pub roughness: f32,
    pub emissive: [f32; 3],
    pub alpha_mode: AlphaMode,
    /// Image URIs indexed by [`TextureSlot::index`].
    pub textures: [Option<String>; 5],
}

impl MaterialDescription {
    pub fn texture(&self, slot: TextureSlot) -> Option<&str> {
        self.textures[slot.index()].as_deref()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneDescription {
    pub nodes: Vec<NodeDescription>,
    /// Primitives of each glTF mesh, in mesh order.
    pub meshes: Vec<Vec<MeshDescription>>,
    pub materials: Vec<MaterialDescription>,
}

fn topology(mode: gltf::mesh::Mode) -> Topology {
    use gltf::mesh::Mode;
    match mode {
        Mode::Points => Topology::Points,
        Mode::Lines => Topology::Lines,
        Mode::LineStrip => Topology::LineStrip,
        Mode::Triangles => Topology::Triangles,
        Mode::TriangleStrip => Topology::TriangleStrip,
        Mode::LineLoop => {
            log::warn!("Line loops are drawn as line strips");
            Topology::LineStrip
        }
        Mode::TriangleFan => {
            log::warn!("Triangle fans are not supported, drawing as triangles");
            Topology::Triangles
        }
    }
}

fn image_uri(texture: gltf::Texture) -> Option<String> {
    match texture.source().source() {
        gltf::image::Source::Uri { uri, .. } => Some(uri.to_string()),
        gltf::image::Source::View { .. } => {
            log::warn!(
                "Image {} is still stored in a buffer view and is ignored",
                texture.source().index()
            );
            None
        }
    }
}

fn describe_material(material: gltf::Material) -> MaterialDescription {
    let pbr = material.pbr_metallic_roughness();
    let mut textures: [Option<String>; 5] = Default::default();
    textures[TextureSlot::BaseColor.index()] =
        pbr.base_color_texture().and_then(|info| image_uri(info.texture()));
    textures[TextureSlot::MetallicRoughness.index()] = pbr
        .metallic_roughness_texture()
        .and_then(|info| image_uri(info.texture()));
    textures[TextureSlot::Normal.index()] = material
        .normal_texture()
        .and_then(|info| image_uri(info.texture()));
    textures[TextureSlot::Occlusion.index()] = material
        .occlusion_texture()
        .and_then(|info| image_uri(info.texture()));
    textures[TextureSlot::Emissive.index()] = material
        .emissive_texture()
        .and_then(|info| image_uri(info.texture()));

    let alpha_mode = match material.alpha_mode() {
        gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
        gltf::material::AlphaMode::Mask => AlphaMode::Mask,
        gltf::material::AlphaMode::Blend => AlphaMode::Blend,
    };
    MaterialDescription {
        name: material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Material {}", material.index().unwrap_or(0))),
        base_color: pbr.base_color_factor(),
        metallic: pbr.metallic_factor(),
        roughness: pbr.roughness_factor(),
        emissive: material.emissive_factor(),
        alpha_mode,
        textures,
    }
}

fn describe_primitive(
    name: String,
    primitive: gltf::Primitive,
    bin: Option<&[u8]>,
) -> MeshDescription {
    let reader = primitive.reader(|buffer| match buffer.source() {
        gltf::buffer::Source::Bin => bin,
        gltf::buffer::Source::Uri(uri) => {
            log::warn!("External buffer {} is not loaded", uri);
            None
        }
    });
    MeshDescription {
        name,
        positions: reader
            .read_positions()
            .map(Iterator::collect)
            .unwrap_or_default(),
        normals: reader
            .read_normals()
            .map(Iterator::collect)
            .unwrap_or_default(),
        uvs: reader
            .read_tex_coords(0)
            .map(|uvs| uvs.into_f32().collect())
            .unwrap_or_default(),
        indices: reader.read_indices().map(|i| i.into_u32().collect()),
        topology: topology(primitive.mode()),
        material: primitive.material().index(),
    }
}

/// Every primitive of `mesh`. The first keeps the mesh name, later ones get
/// their primitive index appended.
fn describe_mesh(mesh: gltf::Mesh, bin: Option<&[u8]>) -> Vec<MeshDescription> {
    let name = mesh
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Mesh {}", mesh.index()));
    let primitives: Vec<MeshDescription> = mesh
        .primitives()
        .map(|primitive| {
            let name = match primitive.index() {
                0 => name.clone(),
                index => format!("{} {}", name, index),
            };
            describe_primitive(name, primitive, bin)
        })
        .collect();
    if primitives.is_empty() {
        log::warn!("Mesh {} has no primitives", name);
    }
    primitives
}

/// Validates the JSON of `doc` and extracts nodes, meshes and materials.
pub fn describe(doc: &GlbDocument) -> Result<SceneDescription, GlbError> {
    let root: gltf::json::Root = serde_json::from_value(doc.json.clone())?;
    let document = gltf::Document::from_json(root)?;
    let bin = doc.bin.as_deref();

    let materials = document.materials().map(describe_material).collect();
    let meshes = document
        .meshes()
        .map(|mesh| describe_mesh(mesh, bin))
        .collect();
    let nodes = document
        .nodes()
        .map(|node| {
            let (translation, rotation, scale) = node.transform().decomposed();
            NodeDescription {
                name: node
                    .name()
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Node {}", node.index())),
                translation,
                rotation,
                scale,
                mesh: node.mesh().map(|mesh| mesh.index()),
                children: node.children().map(|child| child.index()).collect(),
            }
        })
        .collect();

    Ok(SceneDescription {
        nodes,
        meshes,
        materials,
    })
}
