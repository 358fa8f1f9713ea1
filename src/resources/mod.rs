use std::collections::HashMap;

use crate::{
    device::TextureData,
    resources::{
        blob::{is_data_uri, resolve_embedded_images, BlobStore},
        convert::{instantiate, is_color_slot, Instantiated, LoadedTexture, PendingTexture},
        description::describe,
        glb::parse_glb,
    },
    world::World,
};

/**
 * This module contains all logic for loading meshes, textures and scenes from external files
 * and for the GPU resources they end up in.
 */
pub mod blob;
pub mod buffers;
pub mod convert;
pub mod description;
pub mod glb;
pub mod uniform_block;

#[cfg(target_arch = "wasm32")]
fn format_url(asset_root: &str, file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().ok_or_else(|| anyhow::anyhow!("no browser window"))?;
    let origin = window
        .location()
        .origin()
        .map_err(|e| anyhow::anyhow!("no page origin: {:?}", e))?;
    let base = reqwest::Url::parse(&format!("{}/{}/", origin, asset_root.trim_matches('/')))?;
    Ok(base.join(file_name)?)
}

/// Reads `file_name` below `asset_root`: from disk on native targets, over
/// HTTP relative to the page origin on wasm32.
pub async fn load_binary(asset_root: &str, file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(asset_root, file_name)?;
        reqwest::get(url).await?.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = {
        let path = std::path::Path::new("./").join(asset_root).join(file_name);
        tokio::fs::read(path).await?
    };

    Ok(data)
}

/// Decodes any image format the `image` crate was built with into RGBA8.
pub fn decode_texture(bytes: &[u8], srgb: bool) -> anyhow::Result<TextureData> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    Ok(TextureData {
        width: rgba.width(),
        height: rgba.height(),
        rgba: rgba.into_raw(),
        srgb,
    })
}

/// Path of `uri` relative to the directory of `base_file`.
fn sibling(base_file: &str, uri: &str) -> String {
    match base_file.rfind('/') {
        Some(end) => format!("{}/{}", &base_file[..end], uri),
        None => uri.to_string(),
    }
}

/// Image URIs of `json` that have to be fetched: neither embedded in a
/// buffer view nor inline data.
fn external_image_uris(json: &serde_json::Value) -> Vec<String> {
    json.get("images")
        .and_then(|images| images.as_array())
        .into_iter()
        .flatten()
        .filter(|image| image.get("bufferView").is_none())
        .filter_map(|image| image.get("uri")?.as_str())
        .filter(|uri| !is_data_uri(uri) && !BlobStore::is_blob_uri(uri))
        .map(str::to_string)
        .collect()
}

/// Parses a GLB container and adds its nodes to the current scene.
///
/// Embedded images live in the world's blob store only while this call runs;
/// their URIs are revoked on return, whether the import succeeded or not.
pub fn import_glb(world: &mut World, bytes: &[u8]) -> anyhow::Result<Instantiated> {
    let mut document = parse_glb(bytes)?;
    let _embedded = resolve_embedded_images(&mut document, &world.blobs);
    let description = describe(&document)?;
    let result = instantiate(world, &description)?;
    log::info!(
        "Imported {} nodes, {} meshes and {} materials",
        result.objects.len(),
        result.meshes.len(),
        result.materials.len()
    );
    Ok(result)
}

/// Fetches and decodes pending textures. URIs are resolved next to
/// `base_file`. Failures are logged and left out.
pub async fn fetch_textures(
    asset_root: &str,
    base_file: &str,
    pending: Vec<PendingTexture>,
) -> Vec<LoadedTexture> {
    let mut loaded = Vec::new();
    for target in pending {
        let bytes = match load_binary(asset_root, &sibling(base_file, &target.uri)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Could not fetch texture {}: {}", target.uri, e);
                continue;
            }
        };
        match decode_texture(&bytes, is_color_slot(target.slot)) {
            Ok(data) => loaded.push(LoadedTexture { target, data }),
            Err(e) => log::warn!("Could not decode texture {}: {}", target.uri, e),
        }
    }
    loaded
}

/// Loads a GLB file and its external textures, then yields a mutation that
/// imports it into the current scene. Meant to be handed to the run loop as
/// part of [`crate::flow::Out::FutFn`].
pub async fn load_glb(asset_root: String, file_name: String) -> Box<dyn FnOnce(&mut World)> {
    let fetched = async {
        let bytes = load_binary(&asset_root, &file_name).await?;
        let json = parse_glb(&bytes)?.json;
        let mut images = HashMap::new();
        for uri in external_image_uris(&json) {
            match load_binary(&asset_root, &sibling(&file_name, &uri)).await {
                Ok(image) => {
                    images.insert(uri, image);
                }
                Err(e) => log::warn!("Could not fetch texture {}: {}", uri, e),
            }
        }
        anyhow::Ok((bytes, images))
    }
    .await;

    Box::new(move |world: &mut World| {
        let (bytes, images) = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                log::error!("Could not load {}: {}", file_name, e);
                return;
            }
        };
        let result = match import_glb(world, &bytes) {
            Ok(result) => result,
            Err(e) => {
                log::error!("Could not import {}: {}", file_name, e);
                return;
            }
        };
        let textures = result
            .pending
            .into_iter()
            .filter_map(|target| {
                let Some(raw) = images.get(&target.uri) else {
                    log::warn!("Texture {} was not fetched, skipping", target.uri);
                    return None;
                };
                match decode_texture(raw, is_color_slot(target.slot)) {
                    Ok(data) => Some(LoadedTexture { target, data }),
                    Err(e) => {
                        log::warn!("Could not decode texture {}: {}", target.uri, e);
                        None
                    }
                }
            })
            .collect();
        world.apply_textures(textures);
    })
}
