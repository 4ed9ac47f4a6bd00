//! Strict base64url (RFC 4648 §5) without padding.
//!
//! The protocol forbids the standard-alphabet characters `+` and `/` and the
//! padding character `=` outright. They are rejected before decoding, even
//! where a lenient decoder would accept them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::error::DecryptError;

const FORBIDDEN: [char; 3] = ['+', '/', '='];

/// Encode bytes as unpadded base64url.
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url, rejecting `+`, `/` and `=`.
///
/// `field` names the payload field in the error message.
pub fn decode(field: &str, text: &str) -> Result<Vec<u8>, DecryptError> {
    if let Some(c) = text.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(DecryptError::Format(format!(
            "{field}: forbidden character {c:?} in base64url"
        )));
    }

    URL_SAFE_NO_PAD
        .decode(text)
        .map_err(|e| DecryptError::Format(format!("{field}: {e}")))
}
