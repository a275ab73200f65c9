//! Block framing: multicodec header + CBOR payload.
//!
//! ## Frame layout
//!
//! ```text
//! [codec: u8 = 0x71 "dag-cbor"][format: u8 = 0x01][CBOR payload ...]
//! ```
//!
//! The two header bytes identify the payload codec and its format version,
//! so readers can reject blocks written by an incompatible writer before
//! attempting to parse them. Bumping the format version is how any breaking
//! change to node layouts ships.

use serde::{de::DeserializeOwned, Serialize};

use crate::{Result, StoreError};

/// Multicodec identifier for CBOR payloads (dag-cbor).
pub const BLOCK_CODEC_CBOR: u8 = 0x71;

/// Current block format version.
pub const BLOCK_FORMAT_V1: u8 = 0x01;

/// Size of the block header in bytes.
pub const BLOCK_HEADER_BYTES: usize = 2;

/// Encodes `value` into a framed block: header followed by CBOR.
///
/// # Errors
///
/// Returns [`StoreError::Encode`] when the value cannot be serialized.
pub fn encode_block<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = vec![BLOCK_CODEC_CBOR, BLOCK_FORMAT_V1];
    ciborium::ser::into_writer(value, &mut buf)
        .map_err(|e| StoreError::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes a framed block produced by [`encode_block`].
///
/// # Errors
///
/// Returns [`StoreError::Decode`] when the frame is too short, the header
/// names an unknown codec or version, or the payload does not parse as `T`.
pub fn decode_block<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < BLOCK_HEADER_BYTES {
        return Err(StoreError::Decode(format!(
            "block of {} bytes is shorter than the {}-byte header",
            bytes.len(),
            BLOCK_HEADER_BYTES
        )));
    }
    if bytes[0] != BLOCK_CODEC_CBOR {
        return Err(StoreError::Decode(format!(
            "unknown block codec 0x{:02x}",
            bytes[0]
        )));
    }
    if bytes[1] != BLOCK_FORMAT_V1 {
        return Err(StoreError::Decode(format!(
            "unsupported block format version {}",
            bytes[1]
        )));
    }
    ciborium::de::from_reader(&bytes[BLOCK_HEADER_BYTES..])
        .map_err(|e| StoreError::Decode(e.to_string()))
}
