//! Binary-to-text conversion of the compressed image payload.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

use crate::error::EncodingError;

/// Encodes raw bytes as standard (padded) base64
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(text)
}

/// Extracts the byte array held in `compressed_image.data`.
///
/// The service sends the image as a JSON array of integers; anything else
/// (absent object, absent field, non-array, values outside 0..=255) is an
/// [`EncodingError`].
pub fn payload_bytes(payload: Option<&Value>) -> Result<Vec<u8>, EncodingError> {
    let data = payload
        .and_then(|p| p.get("data"))
        .ok_or(EncodingError::MissingData)?;

    let items = data.as_array().ok_or(EncodingError::NotByteArray)?;

    let mut bytes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let byte = item
            .as_u64()
            .and_then(|n| u8::try_from(n).ok())
            .ok_or(EncodingError::InvalidByte { index })?;
        bytes.push(byte);
    }
    Ok(bytes)
}

/// Converts a `compressed_image` payload straight to base64 text
pub fn encode_payload(payload: Option<&Value>) -> Result<String, EncodingError> {
    payload_bytes(payload).map(|bytes| encode(&bytes))
}
