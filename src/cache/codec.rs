//! Payload encoding: JSON serialization with threshold-gated compression.
//!
//! Values are encoded as JSON (`None` encodes the empty marker) and
//! gzip-compressed only above a size threshold, since compressing small
//! payloads costs CPU for nothing. Decoding sniffs the gzip magic bytes,
//! so plain and compressed payloads coexist in the same store.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Magic bytes of a gzip stream; JSON cannot begin with these.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Payload encode/decode errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Compression or decompression failed.
    #[error("compression error: {0}")]
    Io(#[from] io::Error),
}

/// Encode a value (or the empty marker) into payload bytes.
///
/// Payloads larger than `compress_threshold` bytes are gzip-compressed.
pub fn encode<V: Serialize>(
    value: &Option<V>,
    compress_threshold: usize,
) -> Result<Vec<u8>, CodecError> {
    let raw = serde_json::to_vec(value)?;
    if raw.len() <= compress_threshold {
        return Ok(raw);
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder.write_all(&raw)?;
    Ok(encoder.finish()?)
}

/// Decode payload bytes back into a value (or the empty marker).
pub fn decode<V: DeserializeOwned>(payload: &[u8]) -> Result<Option<V>, CodecError> {
    if payload.starts_with(&GZIP_MAGIC) {
        let mut decoder = GzDecoder::new(payload);
        let mut raw = Vec::with_capacity(payload.len() * 2);
        decoder.read_to_end(&mut raw)?;
        Ok(serde_json::from_slice(&raw)?)
    } else {
        Ok(serde_json::from_slice(payload)?)
    }
}
