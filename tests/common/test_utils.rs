#![allow(dead_code)]

use std::{cell::RefCell, io::Cursor, rc::Rc};

use cgmath::Vector3;
use scene_ngin::{
    config::EngineConfig,
    data_structures::{
        camera::{Camera, MAIN_CAMERA_TAG},
        component::{ComponentData, MeshFilter, MeshRenderer},
        entity::EntityId,
        material::{AlphaMode, Material, MaterialId},
        mesh::{Mesh, MeshId},
    },
    device::{
        recording::{Recording, RecordingDevice},
        VertexArrayHandle,
    },
    world::World,
};
use serde_json::{json, Value};

pub const JSON_CHUNK: u32 = 0x4E4F_534A;
pub const BIN_CHUNK: u32 = 0x004E_4942;

/// A world rendering into a [`RecordingDevice`], with an empty current
/// scene and an 800x600 viewport.
pub fn recording_world() -> (World, Rc<RefCell<Recording>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let device = RecordingDevice::new();
    let probe = device.probe();
    let mut world = World::new(EngineConfig::default(), device);
    world.create_scene("Test Scene");
    world.resize(800, 600);
    (world, probe)
}

/// Adds the main camera at `position`, looking down -Z.
pub fn add_camera(world: &mut World, position: Vector3<f32>) -> EntityId {
    let mut object = world.spawn("Main Camera").with_tag(MAIN_CAMERA_TAG);
    object.transform_mut().set_position(position);
    object
        .attach(&mut world.ids, ComponentData::Camera(Camera::default()))
        .unwrap();
    world.add_game_object(object).unwrap()
}

pub fn add_quad(world: &mut World, name: &str) -> MeshId {
    let mesh = Mesh::quad(&mut world.ids, name);
    world.add_mesh(mesh).unwrap()
}

pub fn add_material(world: &mut World, name: &str, alpha_mode: AlphaMode) -> MaterialId {
    let mut material = Material::new(&mut world.ids, name);
    material.alpha_mode = alpha_mode;
    world.add_material(material).unwrap()
}

/// An object with a mesh filter and a mesh renderer at `position`.
pub fn add_renderable(
    world: &mut World,
    name: &str,
    mesh: MeshId,
    material: MaterialId,
    position: Vector3<f32>,
) -> EntityId {
    let mut object = world.spawn(name);
    object.transform_mut().set_position(position);
    object
        .attach(&mut world.ids, ComponentData::MeshFilter(MeshFilter::new(mesh)))
        .unwrap();
    object
        .attach(
            &mut world.ids,
            ComponentData::MeshRenderer(MeshRenderer::new(material)),
        )
        .unwrap();
    world.add_game_object(object).unwrap()
}

pub fn vertex_array(world: &World, mesh: MeshId) -> VertexArrayHandle {
    world.gpu.mesh_buffer(mesh).unwrap().vertex_array
}

/// Pads `payload` to a multiple of four bytes.
fn padded(mut payload: Vec<u8>, fill: u8) -> Vec<u8> {
    while payload.len() % 4 != 0 {
        payload.push(fill);
    }
    payload
}

/// Assembles a GLB container from chunks, in the given order.
pub fn glb(version: u32, chunks: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (kind, payload) in chunks {
        let fill = if *kind == JSON_CHUNK { b' ' } else { 0 };
        let payload = padded(payload.clone(), fill);
        body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        body.extend_from_slice(&kind.to_le_bytes());
        body.extend_from_slice(&payload);
    }
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x4654_6C67u32.to_le_bytes());
    bytes.extend_from_slice(&version.to_le_bytes());
    bytes.extend_from_slice(&((12 + body.len()) as u32).to_le_bytes());
    bytes.extend_from_slice(&body);
    bytes
}

pub fn json_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap()
}

/// A 2x2 PNG of a single colour.
pub fn png(rgba: [u8; 4]) -> Vec<u8> {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba(rgba));
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .unwrap();
    bytes.into_inner()
}

/// A glTF document holding one indexed triangle (mesh 0) plus the binary
/// chunk it reads from. `image` is appended to the binary chunk and exposed
/// as buffer view 2 when given.
pub fn triangle_document(nodes: Value, materials: Value, image: Option<&[u8]>) -> (Value, Vec<u8>) {
    let positions: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];
    let indices: [u16; 3] = [0, 1, 2];

    let mut bin: Vec<u8> = bytemuck::cast_slice(&positions).to_vec();
    bin.extend_from_slice(bytemuck::cast_slice(&indices));
    let mut bin = padded(bin, 0);
    let mut buffer_views = vec![
        json!({ "buffer": 0, "byteOffset": 0, "byteLength": 36 }),
        json!({ "buffer": 0, "byteOffset": 36, "byteLength": 6 }),
    ];
    if let Some(image) = image {
        buffer_views.push(json!({
            "buffer": 0,
            "byteOffset": bin.len(),
            "byteLength": image.len()
        }));
        bin.extend_from_slice(image);
        bin = padded(bin, 0);
    }

    let mut document = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": buffer_views,
        "accessors": [
            {
                "bufferView": 0,
                "componentType": 5126,
                "count": 3,
                "type": "VEC3",
                "min": [0.0, 0.0, 0.0],
                "max": [1.0, 1.0, 0.0]
            },
            {
                "bufferView": 1,
                "componentType": 5123,
                "count": 3,
                "type": "SCALAR"
            }
        ],
        "meshes": [{
            "name": "Triangle",
            "primitives": [{
                "attributes": { "POSITION": 0 },
                "indices": 1,
                "material": 0
            }]
        }],
        "materials": materials,
        "nodes": nodes
    });
    if image.is_some() {
        document["images"] = json!([{ "bufferView": 2, "mimeType": "image/png" }]);
        document["textures"] = json!([{ "source": 0 }]);
    }
    (document, bin)
}
