//! Binary glTF container parsing.
//!
//! A GLB file is a 12 byte header (magic, version, total length) followed by
//! chunks of `(length: u32, type: u32, payload)`, all little endian. Only the
//! JSON chunk is required. Chunks may come in any order; unknown chunk types
//! are skipped.

use thiserror::Error;

const MAGIC: u32 = 0x4654_6C67;
const JSON_CHUNK: u32 = 0x4E4F_534A;
const BIN_CHUNK: u32 = 0x004E_4942;
const HEADER_LEN: usize = 12;
const CHUNK_HEADER_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum GlbError {
    #[error("container is truncated at byte {offset}")]
    Truncated { offset: usize },
    #[error("not a GLB container (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported GLB version {0}, expected 2")]
    UnsupportedVersion(u32),
    #[error("container has no JSON chunk")]
    MissingJsonChunk,
    #[error("JSON chunk is not valid UTF-8")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("JSON chunk could not be decoded: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid glTF document: {0}")]
    Gltf(#[from] gltf::Error),
}

/// The decoded contents of a GLB container.
#[derive(Clone, Debug, PartialEq)]
pub struct GlbDocument {
    pub json: serde_json::Value,
    pub bin: Option<Vec<u8>>,
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, GlbError> {
    offset
        .checked_add(4)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|word| word.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(GlbError::Truncated { offset })
}

pub fn parse_glb(bytes: &[u8]) -> Result<GlbDocument, GlbError> {
    if bytes.len() < HEADER_LEN {
        return Err(GlbError::Truncated {
            offset: bytes.len(),
        });
    }
    let magic = read_u32(bytes, 0)?;
    if magic != MAGIC {
        return Err(GlbError::BadMagic(magic));
    }
    let version = read_u32(bytes, 4)?;
    if version != 2 {
        return Err(GlbError::UnsupportedVersion(version));
    }

    let mut json = None;
    let mut bin = None;
    let mut offset = HEADER_LEN;
    while offset < bytes.len() {
        let length = read_u32(bytes, offset)? as usize;
        let kind = read_u32(bytes, offset + 4)?;
        let start = offset + CHUNK_HEADER_LEN;
        let end = start
            .checked_add(length)
            .ok_or(GlbError::Truncated { offset: start })?;
        let payload = bytes
            .get(start..end)
            .ok_or(GlbError::Truncated { offset: start })?;
        match kind {
            JSON_CHUNK if json.is_none() => json = Some(payload),
            BIN_CHUNK if bin.is_none() => bin = Some(payload.to_vec()),
            JSON_CHUNK | BIN_CHUNK => log::warn!("Ignoring repeated GLB chunk {:#010x}", kind),
            other => log::debug!("Skipping GLB chunk of type {:#010x}", other),
        }
        offset = end;
    }

    let json = json.ok_or(GlbError::MissingJsonChunk)?;
    let text = std::str::from_utf8(json)?;
    let json = serde_json::from_str(text)?;
    Ok(GlbDocument { json, bin })
}
