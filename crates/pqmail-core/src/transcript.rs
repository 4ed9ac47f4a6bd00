//! Signed transcript construction.
//!
//! The server signs exactly these bytes; any deviation here makes every
//! legitimate payload fail verification.
//!
//! ```text
//! version (1 byte) || "kem:sig:aead:kdf" || context
//!   || ct_kem || nonce || aad || ciphertext || server_sig_pk
//! ```
//!
//! Variable-length fields are concatenated without delimiters. Fixed-size
//! fields are size-checked before the transcript is built.

use crate::suite::{self, CONTEXT};
use crate::wire::DecodedPayload;

/// Build the transcript for a decoded payload.
pub fn build_transcript(version: u8, algorithms_suite: &str, payload: &DecodedPayload) -> Vec<u8> {
    let mut out = Vec::with_capacity(
        1 + algorithms_suite.len()
            + CONTEXT.len()
            + payload.ct_kem.len()
            + payload.nonce.len()
            + payload.aad.len()
            + payload.ciphertext.len()
            + payload.server_sig_pk.len(),
    );

    out.push(version);
    out.extend_from_slice(algorithms_suite.as_bytes());
    out.extend_from_slice(CONTEXT.as_bytes());
    out.extend_from_slice(&payload.ct_kem);
    out.extend_from_slice(&payload.nonce);
    out.extend_from_slice(&payload.aad);
    out.extend_from_slice(&payload.ciphertext);
    out.extend_from_slice(&payload.server_sig_pk);
    out
}

/// Build the transcript using the supported suite string.
pub fn transcript_for(version: u8, payload: &DecodedPayload) -> Vec<u8> {
    build_transcript(version, &suite::ciphersuite(), payload)
}
