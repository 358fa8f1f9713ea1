//! In-memory blobs addressed by `blob:` URIs.
//!
//! Images embedded in a GLB container are sliced out of the BIN chunk and
//! given a URI so the scene description can point at them like at any other
//! image. The URI lives exactly as long as its [`BlobUrl`]: dropping the
//! handle revokes it and frees the bytes.

use std::{
    cell::RefCell,
    collections::HashMap,
    rc::{Rc, Weak},
};

use base64::Engine;

use crate::resources::glb::GlbDocument;

const SCHEME: &str = "blob:scene-ngin/";

#[derive(Clone, Debug, PartialEq)]
pub struct Blob {
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct BlobTable {
    next: u64,
    entries: HashMap<String, Blob>,
}

#[derive(Debug, Default)]
pub struct BlobStore {
    table: Rc<RefCell<BlobTable>>,
}

/// Owned `blob:` URI. Revoked on drop.
#[derive(Debug)]
pub struct BlobUrl {
    uri: String,
    table: Weak<RefCell<BlobTable>>,
}

impl BlobUrl {
    pub fn as_str(&self) -> &str {
        &self.uri
    }
}

impl Drop for BlobUrl {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.borrow_mut().entries.remove(&self.uri);
        }
    }
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Vec<u8>, mime_type: Option<String>) -> BlobUrl {
        let mut table = self.table.borrow_mut();
        let uri = format!("{}{}", SCHEME, table.next);
        table.next += 1;
        table.entries.insert(uri.clone(), Blob { mime_type, bytes });
        BlobUrl {
            uri,
            table: Rc::downgrade(&self.table),
        }
    }

    pub fn is_blob_uri(uri: &str) -> bool {
        uri.starts_with("blob:")
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.table.borrow().entries.contains_key(uri)
    }

    /// Copy of the blob behind `uri`, if it has not been revoked.
    pub fn get(&self, uri: &str) -> Option<Blob> {
        self.table.borrow().entries.get(uri).cloned()
    }

    pub fn len(&self) -> usize {
        self.table.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn slice_view<'a>(json: &serde_json::Value, bin: &'a [u8], view: usize) -> Option<&'a [u8]> {
    let view = json.get("bufferViews")?.get(view)?;
    let offset = view.get("byteOffset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
    let length = view.get("byteLength")?.as_u64()? as usize;
    bin.get(offset..offset.checked_add(length)?)
}

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Payload of a base64 encoded `data:` URI.
pub fn data_uri_bytes(uri: &str) -> anyhow::Result<Vec<u8>> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| anyhow::anyhow!("not a data URI"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("data URI has no payload"))?;
    if !header.ends_with(";base64") {
        anyhow::bail!("only base64 data URIs are supported");
    }
    Ok(base64::engine::general_purpose::STANDARD.decode(payload)?)
}

/// Moves every image stored in a buffer view into `store`.
///
/// The image's `bufferView` is replaced by the URI of the new blob. Images
/// whose view is missing or out of range are left untouched. The returned
/// handles keep the URIs alive.
pub fn resolve_embedded_images(doc: &mut GlbDocument, store: &BlobStore) -> Vec<BlobUrl> {
    let Some(bin) = doc.bin.as_deref() else {
        return Vec::new();
    };
    let image_count = doc
        .json
        .get("images")
        .and_then(|images| images.as_array())
        .map_or(0, Vec::len);

    let mut urls = Vec::new();
    for index in 0..image_count {
        let image = &doc.json["images"][index];
        let Some(view) = image.get("bufferView").and_then(|v| v.as_u64()) else {
            continue;
        };
        let Some(bytes) = slice_view(&doc.json, bin, view as usize) else {
            log::warn!("Image {} points at an invalid buffer view {}", index, view);
            continue;
        };
        let mime_type = image
            .get("mimeType")
            .and_then(|m| m.as_str())
            .map(str::to_string);
        let url = store.create(bytes.to_vec(), mime_type);

        let entry = doc
            .json
            .get_mut("images")
            .and_then(|images| images.get_mut(index))
            .and_then(serde_json::Value::as_object_mut);
        if let Some(image) = entry {
            image.remove("bufferView");
            image.insert(
                "uri".to_string(),
                serde_json::Value::String(url.as_str().to_string()),
            );
        }
        urls.push(url);
    }
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dropping_the_url_revokes_it() {
        let store = BlobStore::new();
        let url = store.create(vec![1, 2, 3], None);
        let uri = url.as_str().to_string();
        assert!(BlobStore::is_blob_uri(&uri));
        assert_eq!(store.get(&uri).unwrap().bytes, vec![1, 2, 3]);
        drop(url);
        assert!(!store.contains(&uri));
        assert!(store.is_empty());
    }

    #[test]
    fn data_uris_decode_base64_payloads() {
        assert_eq!(
            data_uri_bytes("data:image/png;base64,AQID").unwrap(),
            vec![1, 2, 3]
        );
        assert!(data_uri_bytes("data:text/plain,hello").is_err());
        assert!(data_uri_bytes("data:image/png;base64").is_err());
        assert!(!is_data_uri("textures/wall.png"));
    }
}
