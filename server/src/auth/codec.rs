//! URL-safe, unpadded base64 segments used in the token wire format.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

/// Encode raw bytes as one token segment.
pub fn encode_segment(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode one token segment.
///
/// Trailing `=` padding is tolerated. Malformed input never errors here; it
/// decodes to an empty buffer, which fails the JSON parse or signature
/// comparison that follows.
pub fn decode_segment(segment: &str) -> Vec<u8> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .unwrap_or_default()
}
