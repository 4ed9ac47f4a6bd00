//! The decrypt pipeline.
//!
//! Every inbound payload passes through the same fixed sequence:
//!
//! 1. pin the server signing key (constant time, before any parsing)
//! 2. strict base64url decode
//! 3. size validation
//! 4. version and algorithm-suite validation
//! 5. transcript construction
//! 6. ML-DSA signature verification
//! 7. ML-KEM decapsulation
//! 8. HKDF-SHA-512 key derivation
//! 9. AES-256-GCM authenticated decryption
//!
//! No step is skipped or reordered. The secret key is first touched in step 7,
//! after the payload is proven to come from the pinned server key.

use subtle::ConstantTimeEq;

use crate::crypto::{verify_signature, AeadKey, KemSecretKey};
use crate::error::{DecryptError, Result};
use crate::suite;
use crate::transcript::transcript_for;
use crate::wire::EncryptedPayload;

/// Decrypt a payload addressed to `secret_key`.
///
/// `expected_server_sig_pk` is the server's ML-DSA public key as base64url,
/// pinned when the inbox was created. Stateless and safe to call
/// concurrently; never retries.
pub fn decrypt(
    payload: &EncryptedPayload,
    secret_key: &KemSecretKey,
    expected_server_sig_pk: &str,
) -> Result<Vec<u8>> {
    check_server_key(&payload.server_sig_pk, expected_server_sig_pk)?;

    let decoded = payload.decode()?;
    decoded.validate_sizes()?;
    suite::validate(payload.version, &payload.algorithms)?;

    // validate() pinned the version to 1
    let transcript = transcript_for(payload.version as u8, &decoded);
    verify_signature(&decoded.server_sig_pk, &transcript, &decoded.signature)?;

    let shared_secret = secret_key.decapsulate(&decoded.ct_kem)?;
    let key = AeadKey::derive(&shared_secret, &decoded.ct_kem, &decoded.aad)
        .map_err(|_| DecryptError::KeyDerivation)?;
    drop(shared_secret);

    key.decrypt(&decoded.nonce, &decoded.aad, &decoded.ciphertext)
}

/// Compare the advertised server key text against the pinned one in constant time.
fn check_server_key(actual: &str, expected: &str) -> Result<()> {
    // slices of different lengths compare unequal
    if bool::from(actual.as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(DecryptError::ServerKeyMismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KemKeyPair;
    use crate::wire::Algorithms;

    fn garbage_payload(server_sig_pk: &str) -> EncryptedPayload {
        EncryptedPayload {
            version: 1,
            algorithms: Algorithms::supported(),
            ct_kem: "not+base64/url==".into(),
            nonce: "!!".into(),
            aad: "=".into(),
            ciphertext: "".into(),
            signature: "".into(),
            server_sig_pk: server_sig_pk.into(),
        }
    }

    #[test]
    fn test_key_mismatch_fires_before_decoding() {
        let keypair = KemKeyPair::generate().unwrap();
        let payload = garbage_payload("attacker-key");

        assert_eq!(
            decrypt(&payload, keypair.secret_key(), "pinned-key"),
            Err(DecryptError::ServerKeyMismatch)
        );
    }

    #[test]
    fn test_key_prefix_is_mismatch() {
        let keypair = KemKeyPair::generate().unwrap();
        let payload = garbage_payload("pinned");

        assert_eq!(
            decrypt(&payload, keypair.secret_key(), "pinned-key"),
            Err(DecryptError::ServerKeyMismatch)
        );
    }

    #[test]
    fn test_format_checked_after_key_pinning() {
        let keypair = KemKeyPair::generate().unwrap();
        let payload = garbage_payload("pinned-key");

        assert!(matches!(
            decrypt(&payload, keypair.secret_key(), "pinned-key"),
            Err(DecryptError::Format(_))
        ));
    }

    #[test]
    fn test_sizes_checked_before_algorithms() {
        let keypair = KemKeyPair::generate().unwrap();
        let mut payload = garbage_payload("AAAA");
        payload.ct_kem = "AAAA".into();
        payload.nonce = "AAAA".into();
        payload.aad = "".into();
        payload.ciphertext = "AAAA".into();
        payload.signature = "AAAA".into();
        payload.algorithms.kem = "X25519".into();

        assert!(matches!(
            decrypt(&payload, keypair.secret_key(), "AAAA"),
            Err(DecryptError::SizeValidation { .. })
        ));
    }
}
