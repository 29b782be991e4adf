//! Payload compression for cached responses (zstd).

use crate::{Result, SwitchyardError};

/// zstd level used for cached payloads.
const COMPRESSION_LEVEL: i32 = 3;

/// Compress a response payload.
pub fn compress(text: &str) -> Result<Vec<u8>> {
    zstd::encode_all(text.as_bytes(), COMPRESSION_LEVEL)
        .map_err(|e| SwitchyardError::Compression(e.to_string()))
}

/// Decompress a payload produced by [`compress`].
pub fn decompress(bytes: &[u8]) -> Result<String> {
    let raw =
        zstd::decode_all(bytes).map_err(|e| SwitchyardError::Compression(e.to_string()))?;
    String::from_utf8(raw).map_err(|e| SwitchyardError::Compression(e.to_string()))
}

/// Turn a stored payload back into text according to its `compressed` flag.
pub(crate) fn decode_payload(bytes: Vec<u8>, compressed: bool) -> Result<String> {
    if compressed {
        decompress(&bytes)
    } else {
        String::from_utf8(bytes).map_err(|e| SwitchyardError::Compression(e.to_string()))
    }
}
