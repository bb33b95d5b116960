//! Base64 codec for SCRAM wire fields.
//!
//! SCRAM uses standard base64 (`+`, `/`, `=` padding, no line wrapping) for
//! the nonce, the salt, the client proof and the server signature.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encode `data` as standard base64.
pub(crate) fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode standard base64, rejecting invalid characters and bad padding.
pub(crate) fn decode(ascii: &[u8]) -> Option<Vec<u8>> {
    STANDARD.decode(ascii).ok()
}
