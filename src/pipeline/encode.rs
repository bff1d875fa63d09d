//! Payload encoding: base64 at the wire boundary, raw bytes inside.
//!
//! Browsers hand files over as `data:<mime>;base64,<payload>` URIs (the
//! FileReader shape) while scripted clients usually send bare base64. Both
//! are accepted; the remote service always receives bare standard base64.

use crate::error::ConvertError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::debug;

/// Decode a base64 file payload, stripping an optional data-URI prefix and
/// any embedded whitespace or line breaks.
pub fn decode_payload(payload: &str) -> Result<Bytes, ConvertError> {
    let body = strip_data_uri(payload.trim());
    let compact: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let bytes = STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ConvertError::InvalidPayload {
            reason: e.to_string(),
        })?;
    debug!("Decoded payload: {} base64 chars → {} bytes", compact.len(), bytes.len());
    Ok(Bytes::from(bytes))
}

/// Encode raw file bytes for the remote service.
pub fn encode_payload(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

fn strip_data_uri(payload: &str) -> &str {
    match payload.strip_prefix("data:") {
        Some(rest) => match rest.split_once(',') {
            Some((header, body)) if header.ends_with(";base64") => body,
            _ => payload,
        },
        None => payload,
    }
}
