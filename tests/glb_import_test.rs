use approx::assert_relative_eq;
use base64::Engine;
use cgmath::Vector3;
use scene_ngin::{
    data_structures::{
        material::{AlphaMode, TextureSlot},
        mesh::IndexType,
        transform,
    },
    device::TextureData,
    resources::{
        convert::LoadedTexture,
        description::describe,
        glb::{parse_glb, GlbError},
        import_glb,
    },
};
use serde_json::json;

use crate::common::test_utils::{
    glb, json_bytes, png, recording_world, triangle_document, BIN_CHUNK, JSON_CHUNK,
};

mod common;

fn paint() -> serde_json::Value {
    json!([{
        "name": "Paint",
        "pbrMetallicRoughness": {
            "baseColorFactor": [1.0, 0.0, 0.0, 1.0],
            "metallicFactor": 0.5,
            "roughnessFactor": 0.25
        }
    }])
}

#[test]
fn chunk_order_does_not_matter() {
    let (document, bin) = triangle_document(json!([{ "mesh": 0 }]), paint(), None);
    let json_first = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin.clone())]);
    let bin_first = glb(2, &[(BIN_CHUNK, bin.clone()), (JSON_CHUNK, json_bytes(&document))]);

    let a = parse_glb(&json_first).unwrap();
    let b = parse_glb(&bin_first).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.json, document);
    assert_eq!(a.bin.as_deref(), Some(bin.as_slice()));
}

#[test]
fn unknown_chunks_are_skipped() {
    let document = json!({ "asset": { "version": "2.0" } });
    let bytes = glb(
        2,
        &[
            (0x1234_5678, vec![1, 2, 3, 4]),
            (JSON_CHUNK, json_bytes(&document)),
        ],
    );
    let parsed = parse_glb(&bytes).unwrap();
    assert_eq!(parsed.json, document);
    assert!(parsed.bin.is_none());
}

#[test]
fn other_versions_and_missing_json_are_rejected() {
    let document = json!({ "asset": { "version": "2.0" } });
    let version_three = glb(3, &[(JSON_CHUNK, json_bytes(&document))]);
    assert!(matches!(
        parse_glb(&version_three),
        Err(GlbError::UnsupportedVersion(3))
    ));

    let bin_only = glb(2, &[(BIN_CHUNK, vec![0; 8])]);
    assert!(matches!(parse_glb(&bin_only), Err(GlbError::MissingJsonChunk)));
}

#[test]
fn corrupt_containers_are_rejected() {
    let document = json!({ "asset": { "version": "2.0" } });
    let valid = glb(2, &[(JSON_CHUNK, json_bytes(&document))]);

    assert!(matches!(
        parse_glb(&valid[..8]),
        Err(GlbError::Truncated { offset: 8 })
    ));

    let mut bad_magic = valid.clone();
    bad_magic[0] = b'x';
    assert!(matches!(parse_glb(&bad_magic), Err(GlbError::BadMagic(_))));

    // chunk header claims more payload than the file holds
    let mut short = valid.clone();
    short.truncate(valid.len() - 4);
    assert!(matches!(
        parse_glb(&short),
        Err(GlbError::Truncated { offset: 20 })
    ));

    // a chunk header cut in half
    let mut cut = valid.clone();
    cut.extend_from_slice(&[8, 0]);
    assert!(matches!(parse_glb(&cut), Err(GlbError::Truncated { .. })));

    let not_utf8 = glb(2, &[(JSON_CHUNK, vec![0xff, 0xfe, 0xfd, 0xfc])]);
    assert!(matches!(parse_glb(&not_utf8), Err(GlbError::InvalidUtf8(_))));

    let not_json = glb(2, &[(JSON_CHUNK, b"{ not json".to_vec())]);
    assert!(matches!(parse_glb(&not_json), Err(GlbError::Json(_))));

    let dangling = json!({
        "asset": { "version": "2.0" },
        "nodes": [{ "mesh": 5 }]
    });
    let parsed = parse_glb(&glb(2, &[(JSON_CHUNK, json_bytes(&dangling))])).unwrap();
    assert!(matches!(describe(&parsed), Err(GlbError::Gltf(_))));
}

#[test]
fn nodes_become_game_objects() {
    let (mut world, _) = recording_world();
    let nodes = json!([
        { "name": "Leaf", "mesh": 0, "translation": [0.0, 1.0, 0.0] },
        { "name": "Root", "children": [0], "translation": [2.0, 0.0, 0.0] }
    ]);
    let (document, bin) = triangle_document(nodes, paint(), None);
    let bytes = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin)]);

    let result = import_glb(&mut world, &bytes).unwrap();
    assert_eq!(result.objects.len(), 2);
    let (leaf, root) = (result.objects[0], result.objects[1]);
    assert_eq!(result.roots, vec![root]);

    let scene = world.scene().unwrap();
    let leaf_object = scene.game_object(leaf).unwrap();
    assert_eq!(leaf_object.name, "Leaf");
    assert_eq!(leaf_object.transform().parent(), Some(root));
    assert_relative_eq!(
        transform::world_position(scene, leaf).unwrap(),
        Vector3::new(2.0, 1.0, 0.0),
        epsilon = 1e-6
    );

    let mesh_id = leaf_object.mesh_filter().unwrap().mesh.unwrap();
    assert_eq!(result.meshes, vec![mesh_id]);
    let mesh = world.meshes.get(mesh_id).unwrap();
    assert_eq!(mesh.positions.len(), 3);
    assert_eq!(mesh.indices, vec![0, 1, 2]);
    assert_eq!(world.gpu.mesh_buffer(mesh_id).unwrap().index_type, IndexType::U8);

    let material_id = leaf_object.mesh_renderer().unwrap().material.unwrap();
    let material = world.materials.get(material_id).unwrap();
    assert_eq!(material.name, "Paint");
    assert_eq!(material.color(), [1.0, 0.0, 0.0]);
    assert_relative_eq!(material.metallic(), 0.5);
    assert_relative_eq!(material.roughness(), 0.25);
    assert_eq!(material.alpha_mode, AlphaMode::Opaque);
    assert!(scene.game_object(root).unwrap().mesh_filter().is_none());
}

#[test]
fn forward_child_references_are_skipped() {
    let (mut world, _) = recording_world();
    let nodes = json!([
        { "name": "Root", "children": [1] },
        { "name": "Leaf", "mesh": 0 }
    ]);
    let (document, bin) = triangle_document(nodes, paint(), None);
    let bytes = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin)]);

    let result = import_glb(&mut world, &bytes).unwrap();
    assert_eq!(result.roots, result.objects);
    let root = world.scene().unwrap().game_object(result.objects[0]).unwrap();
    assert!(root.transform().children().is_empty());
}

#[test]
fn nodes_sharing_a_mesh_share_its_buffers() {
    let (mut world, _) = recording_world();
    let nodes = json!([
        { "name": "Left", "mesh": 0 },
        { "name": "Right", "mesh": 0 }
    ]);
    let (document, bin) = triangle_document(nodes, paint(), None);
    let bytes = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin)]);

    let result = import_glb(&mut world, &bytes).unwrap();
    assert_eq!(result.meshes.len(), 1);
    assert_eq!(world.meshes.len(), 1);
    assert_eq!(world.gpu.mesh_buffer_count(), 1);
}

#[test]
fn later_primitives_become_child_objects() {
    let (mut world, _) = recording_world();
    let materials = json!([{ "name": "Body" }, { "name": "Trim" }]);
    let (mut document, bin) =
        triangle_document(json!([{ "name": "Car", "mesh": 0 }]), materials, None);
    document["meshes"][0]["primitives"] = json!([
        { "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 },
        { "attributes": { "POSITION": 0 }, "material": 1 }
    ]);
    let bytes = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin)]);

    let result = import_glb(&mut world, &bytes).unwrap();
    assert_eq!(result.objects.len(), 1);
    assert_eq!(result.roots, result.objects);
    assert_eq!(result.meshes.len(), 2);
    assert_eq!(result.parts.len(), 1);

    let scene = world.scene().unwrap();
    let car = scene.game_object(result.objects[0]).unwrap();
    assert_eq!(car.transform().children(), &[result.parts[0]]);
    let body = car.mesh_renderer().unwrap().material.unwrap();
    assert_eq!(world.materials.get(body).unwrap().name, "Body");

    let trim = scene.game_object(result.parts[0]).unwrap();
    assert_eq!(trim.name, "Car Triangle 1");
    let trim_material = trim.mesh_renderer().unwrap().material.unwrap();
    assert_eq!(world.materials.get(trim_material).unwrap().name, "Trim");
    // not indexed, so every vertex is drawn in order
    let trim_mesh = trim.mesh_filter().unwrap().mesh.unwrap();
    assert_eq!(world.meshes.get(trim_mesh).unwrap().indices, vec![0, 1, 2]);
}

#[test]
fn embedded_images_are_uploaded_and_their_blobs_revoked() {
    let (mut world, probe) = recording_world();
    let image = png([255, 255, 255, 255]);
    let materials = json!([{
        "name": "Decal",
        "alphaMode": "BLEND",
        "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } }
    }]);
    let (document, bin) = triangle_document(json!([{ "mesh": 0 }]), materials, Some(&image));
    let bytes = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin)]);

    let result = import_glb(&mut world, &bytes).unwrap();
    assert!(result.pending.is_empty());
    assert!(world.blobs.is_empty());
    assert_eq!(probe.borrow().live_textures(), 1);

    let material = world.materials.get(result.materials[0]).unwrap();
    assert!(material.texture(TextureSlot::BaseColor).is_some());
    assert_eq!(material.texture_flags() & TextureSlot::BaseColor.flag(), 1);
    assert_eq!(material.alpha_mode, AlphaMode::Blend);
    assert!(material.is_transparent());
}

#[test]
fn inline_data_uri_images_are_uploaded_right_away() {
    let (mut world, probe) = recording_world();
    let encoded = base64::engine::general_purpose::STANDARD.encode(png([0, 255, 0, 255]));
    let materials = json!([{
        "name": "Grass",
        "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } }
    }]);
    let (mut document, bin) = triangle_document(json!([{ "mesh": 0 }]), materials, None);
    document["images"] = json!([{ "uri": format!("data:image/png;base64,{}", encoded) }]);
    document["textures"] = json!([{ "source": 0 }]);
    let bytes = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin)]);

    let result = import_glb(&mut world, &bytes).unwrap();
    assert!(result.pending.is_empty());
    assert_eq!(probe.borrow().live_textures(), 1);
    let material = world.materials.get(result.materials[0]).unwrap();
    assert!(material.texture(TextureSlot::BaseColor).is_some());
}

#[test]
fn fetched_textures_only_reach_live_materials() {
    let (mut world, probe) = recording_world();
    let materials = json!([{
        "name": "Wall",
        "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } },
        "normalTexture": { "index": 1 }
    }]);
    let (mut document, bin) = triangle_document(json!([{ "mesh": 0 }]), materials, None);
    document["images"] = json!([{ "uri": "wall.png" }, { "uri": "wall_normal.png" }]);
    document["textures"] = json!([{ "source": 0 }, { "source": 1 }]);
    let bytes = glb(2, &[(JSON_CHUNK, json_bytes(&document)), (BIN_CHUNK, bin)]);

    let result = import_glb(&mut world, &bytes).unwrap();
    let slots: Vec<(TextureSlot, &str)> = result
        .pending
        .iter()
        .map(|p| (p.slot, p.uri.as_str()))
        .collect();
    assert!(slots.contains(&(TextureSlot::BaseColor, "wall.png")));
    assert!(slots.contains(&(TextureSlot::Normal, "wall_normal.png")));

    let loaded = |slot: TextureSlot| {
        let target = result
            .pending
            .iter()
            .find(|p| p.slot == slot)
            .unwrap()
            .clone();
        LoadedTexture {
            target,
            data: TextureData::solid([128, 128, 255, 255]),
        }
    };

    assert_eq!(world.apply_textures(vec![loaded(TextureSlot::BaseColor)]), 1);
    // a second delivery replaces the first texture
    assert_eq!(world.apply_textures(vec![loaded(TextureSlot::BaseColor)]), 1);
    assert_eq!(probe.borrow().live_textures(), 1);

    assert!(world.destroy_material(result.materials[0]));
    assert_eq!(probe.borrow().live_textures(), 0);
    // the id may be reused, the stale handle still must not match
    let reused = scene_ngin::data_structures::material::Material::new(&mut world.ids, "Reused");
    world.add_material(reused).unwrap();
    assert_eq!(world.apply_textures(vec![loaded(TextureSlot::Normal)]), 0);
    assert_eq!(probe.borrow().live_textures(), 0);
}
