//! Turns a [`SceneDescription`] into game objects of the current scene.

use std::collections::HashMap;

use cgmath::{Quaternion, Vector3};

use crate::{
    data_structures::{
        component::{ComponentData, MeshFilter, MeshRenderer},
        entity::{EntityAllocator, EntityHandle, EntityId},
        game_object::GameObject,
        material::{Material, MaterialId, TextureSlot},
        mesh::{Mesh, MeshId},
        transform::TransformLookup,
    },
    device::TextureData,
    error::EngineError,
    resources::{
        blob::{data_uri_bytes, is_data_uri, BlobStore},
        description::{MaterialDescription, MeshDescription, SceneDescription},
        decode_texture,
    },
    world::World,
};

/// A texture that still has to be fetched before it can be applied.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTexture {
    pub material: EntityHandle,
    pub slot: TextureSlot,
    pub uri: String,
}

/// A fetched and decoded texture, ready for [`World::apply_textures`].
#[derive(Clone, Debug, PartialEq)]
pub struct LoadedTexture {
    pub target: PendingTexture,
    pub data: TextureData,
}

/// What [`instantiate`] created.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Instantiated {
    /// One game object per node, in node order.
    pub objects: Vec<EntityId>,
    /// Objects left without a parent.
    pub roots: Vec<EntityId>,
    /// Children created for the second and later primitives of a node's
    /// mesh. The first primitive is drawn by the node's own object.
    pub parts: Vec<EntityId>,
    pub materials: Vec<MaterialId>,
    pub meshes: Vec<MeshId>,
    pub pending: Vec<PendingTexture>,
}

/// Colour textures are sampled as sRGB, data maps linearly.
pub fn is_color_slot(slot: TextureSlot) -> bool {
    matches!(slot, TextureSlot::BaseColor | TextureSlot::Emissive)
}

fn convert_material(
    world: &mut World,
    description: &MaterialDescription,
    pending: &mut Vec<PendingTexture>,
) -> Result<MaterialId, EngineError> {
    let mut material = Material::new(&mut world.ids, description.name.clone());
    let [r, g, b, a] = description.base_color;
    let gpu = &mut world.gpu;
    material.set_color(gpu, [r, g, b]);
    material.set_alpha(gpu, a);
    material.set_metallic(gpu, description.metallic);
    material.set_roughness(gpu, description.roughness);
    material.set_emissive(gpu, description.emissive);
    material.alpha_mode = description.alpha_mode;

    let handle = world.ids.handle(material.id());
    for slot in TextureSlot::ALL {
        let Some(uri) = description.texture(slot) else {
            continue;
        };
        material.set_texture_source(slot, uri);
        let bytes = if BlobStore::is_blob_uri(uri) {
            match world.blobs.get(uri) {
                Some(blob) => blob.bytes,
                None => {
                    log::warn!("Blob {} of material {} was already revoked", uri, material.name);
                    continue;
                }
            }
        } else if is_data_uri(uri) {
            match data_uri_bytes(uri) {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::warn!("Inline {:?} image of {} is unusable: {}", slot, material.name, e);
                    continue;
                }
            }
        } else {
            pending.push(PendingTexture {
                material: handle,
                slot,
                uri: uri.to_string(),
            });
            continue;
        };
        let data = match decode_texture(&bytes, is_color_slot(slot)) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Could not decode {:?} texture of {}: {}", slot, material.name, e);
                continue;
            }
        };
        let label = format!("{} {:?}", material.name, slot);
        let texture = world.gpu.create_texture(&label, &data)?;
        material.set_texture(&mut world.gpu, slot, Some(texture));
    }
    world.add_material(material)
}

fn convert_mesh(world: &mut World, description: &MeshDescription) -> Result<MeshId, EngineError> {
    let indices = description
        .indices
        .clone()
        .unwrap_or_else(|| (0..description.positions.len() as u32).collect());
    let mut mesh = Mesh::new(
        &mut world.ids,
        description.name.clone(),
        description.positions.clone(),
        indices,
    )
    .with_normals(description.normals.clone())
    .with_uvs(description.uvs.clone())
    .with_topology(description.topology);
    mesh.ensure_tangents();
    world.add_mesh(mesh)
}

/// A converted primitive, ready to be attached to an object.
struct Part {
    name: String,
    mesh: MeshId,
    material: Option<MaterialId>,
}

/// Uploads each primitive of mesh `index` once. Nodes sharing a mesh share
/// its buffers.
fn convert_primitives(
    world: &mut World,
    description: &SceneDescription,
    index: usize,
    uploaded: &mut HashMap<(usize, usize), MeshId>,
    result: &mut Instantiated,
) -> Result<Vec<Part>, EngineError> {
    let Some(primitives) = description.meshes.get(index) else {
        log::warn!("Mesh {} does not exist", index);
        return Ok(Vec::new());
    };
    let mut parts = Vec::with_capacity(primitives.len());
    for (primitive_index, primitive) in primitives.iter().enumerate() {
        let mesh = match uploaded.get(&(index, primitive_index)) {
            Some(mesh) => *mesh,
            None if primitive.positions.is_empty() => {
                log::warn!("Primitive {} has no positions, skipping", primitive.name);
                continue;
            }
            None => {
                let mesh = convert_mesh(world, primitive)?;
                uploaded.insert((index, primitive_index), mesh);
                result.meshes.push(mesh);
                mesh
            }
        };
        parts.push(Part {
            name: primitive.name.clone(),
            mesh,
            material: primitive
                .material
                .and_then(|material| result.materials.get(material).copied()),
        });
    }
    Ok(parts)
}

fn attach_part(
    ids: &mut EntityAllocator,
    object: &mut GameObject,
    part: &Part,
) -> Result<(), EngineError> {
    object.attach(ids, ComponentData::MeshFilter(MeshFilter::new(part.mesh)))?;
    let mut renderer = MeshRenderer::default();
    renderer.material = part.material;
    object.attach(ids, ComponentData::MeshRenderer(renderer))?;
    Ok(())
}

/// Creates materials, meshes and one game object per node in the current
/// scene of `world`.
///
/// Embedded images must still be resolvable through `world.blobs`; they are
/// decoded and uploaded right away. Any other image URI is returned as a
/// [`PendingTexture`]. A node only adopts children that were converted
/// before it, later ones are skipped with a warning.
pub fn instantiate(
    world: &mut World,
    description: &SceneDescription,
) -> Result<Instantiated, EngineError> {
    world.scenes.current()?;
    let mut result = Instantiated::default();

    for material in &description.materials {
        let id = convert_material(world, material, &mut result.pending)?;
        result.materials.push(id);
    }

    let mut uploaded: HashMap<(usize, usize), MeshId> = HashMap::new();
    for node in &description.nodes {
        let mut object = world.spawn(node.name.clone());
        let [x, y, z, w] = node.rotation;
        let transform = object.transform_mut();
        transform.set_position(Vector3::from(node.translation));
        transform.set_rotation(Quaternion::new(w, x, y, z));
        transform.set_scale(Vector3::from(node.scale));

        let parts = match node.mesh {
            Some(index) => {
                convert_primitives(world, description, index, &mut uploaded, &mut result)?
            }
            None => Vec::new(),
        };
        let mut parts = parts.iter();
        if let Some(part) = parts.next() {
            attach_part(&mut world.ids, &mut object, part)?;
        }
        let id = world.add_game_object(object)?;

        for part in parts {
            let mut child = world.spawn(format!("{} {}", node.name, part.name));
            attach_part(&mut world.ids, &mut child, part)?;
            let child = world.add_game_object(child)?;
            world.scenes.current_mut()?.set_parent(child, Some(id))?;
            result.parts.push(child);
        }

        let scene = world.scenes.current_mut()?;
        for &child in &node.children {
            match result.objects.get(child) {
                Some(&child) => scene.set_parent(child, Some(id))?,
                None => log::warn!(
                    "Node {} lists child {} before it was converted, skipping",
                    node.name,
                    child
                ),
            }
        }
        result.objects.push(id);
    }

    let scene = world.scenes.current()?;
    result.roots = result
        .objects
        .iter()
        .copied()
        .filter(|id| scene.transform(*id).is_some_and(|t| t.parent().is_none()))
        .collect();
    Ok(result)
}
