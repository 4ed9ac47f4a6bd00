//! Wire representation of an encrypted payload.
//!
//! Field names follow the service's JSON exactly. Binary fields stay as
//! base64url text until the pipeline decodes them, so the server key can be
//! pinned before anything else is parsed.

use serde::{Deserialize, Serialize};

use crate::base64url;
use crate::error::DecryptError;
use crate::suite::{self, AEAD_ALGORITHM, KDF_ALGORITHM, KEM_ALGORITHM, SIG_ALGORITHM};

/// Algorithm identifiers advertised by a payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Algorithms {
    pub kem: String,
    pub sig: String,
    pub aead: String,
    pub kdf: String,
}

impl Algorithms {
    /// The single suite this build supports.
    pub fn supported() -> Self {
        Self {
            kem: KEM_ALGORITHM.to_string(),
            sig: SIG_ALGORITHM.to_string(),
            aead: AEAD_ALGORITHM.to_string(),
            kdf: KDF_ALGORITHM.to_string(),
        }
    }
}

/// An encrypted payload as delivered by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPayload {
    /// Protocol version; must be 1.
    #[serde(rename = "v")]
    pub version: u32,

    #[serde(rename = "algs")]
    pub algorithms: Algorithms,

    pub ct_kem: String,
    pub nonce: String,
    pub aad: String,

    /// AEAD ciphertext with the 16-byte tag appended.
    pub ciphertext: String,

    #[serde(rename = "sig")]
    pub signature: String,

    pub server_sig_pk: String,
}

/// Binary fields of a payload after strict decoding.
#[derive(Clone, PartialEq, Eq)]
pub struct DecodedPayload {
    pub ct_kem: Vec<u8>,
    pub nonce: Vec<u8>,
    pub aad: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub signature: Vec<u8>,
    pub server_sig_pk: Vec<u8>,
}

impl EncryptedPayload {
    /// Strictly decode every binary field.
    pub fn decode(&self) -> Result<DecodedPayload, DecryptError> {
        Ok(DecodedPayload {
            ct_kem: base64url::decode("ct_kem", &self.ct_kem)?,
            nonce: base64url::decode("nonce", &self.nonce)?,
            aad: base64url::decode("aad", &self.aad)?,
            ciphertext: base64url::decode("ciphertext", &self.ciphertext)?,
            signature: base64url::decode("sig", &self.signature)?,
            server_sig_pk: base64url::decode("server_sig_pk", &self.server_sig_pk)?,
        })
    }
}

impl DecodedPayload {
    /// Check every length the suite fixes.
    pub fn validate_sizes(&self) -> Result<(), DecryptError> {
        use suite::sizes;

        check_len("ct_kem", &self.ct_kem, sizes::KEM_CIPHERTEXT)?;
        check_len("nonce", &self.nonce, sizes::AEAD_NONCE)?;
        check_len("sig", &self.signature, sizes::SIGNATURE)?;
        check_len("server_sig_pk", &self.server_sig_pk, sizes::SIG_PUBLIC_KEY)?;

        if self.ciphertext.len() < sizes::AEAD_TAG {
            return Err(DecryptError::SizeValidation {
                field: "ciphertext",
                expected: sizes::AEAD_TAG,
                actual: self.ciphertext.len(),
            });
        }

        Ok(())
    }
}

impl std::fmt::Debug for DecodedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedPayload")
            .field("ct_kem", &self.ct_kem.len())
            .field("nonce", &hex::encode(&self.nonce))
            .field("aad", &self.aad.len())
            .field("ciphertext", &self.ciphertext.len())
            .field("signature", &self.signature.len())
            .field("server_sig_pk", &self.server_sig_pk.len())
            .finish()
    }
}

fn check_len(field: &'static str, bytes: &[u8], expected: usize) -> Result<(), DecryptError> {
    if bytes.len() != expected {
        return Err(DecryptError::SizeValidation {
            field,
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "v": 1,
        "algs": {"kem": "ML-KEM-768", "sig": "ML-DSA-65", "aead": "AES-256-GCM", "kdf": "HKDF-SHA-512"},
        "ct_kem": "AAAA",
        "nonce": "AAAA",
        "aad": "",
        "ciphertext": "AAAA",
        "sig": "AAAA",
        "server_sig_pk": "AAAA"
    }"#;

    #[test]
    fn test_parses_service_json() {
        let payload: EncryptedPayload = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(payload.version, 1);
        assert_eq!(payload.algorithms, Algorithms::supported());
        assert_eq!(payload.signature, "AAAA");
    }

    #[test]
    fn test_serializes_wire_names() {
        let payload: EncryptedPayload = serde_json::from_str(SAMPLE).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("v").is_some());
        assert!(value.get("algs").is_some());
        assert!(value.get("sig").is_some());
        assert!(value.get("version").is_none());
    }

    #[test]
    fn test_wrong_sizes_rejected() {
        let payload: EncryptedPayload = serde_json::from_str(SAMPLE).unwrap();
        let decoded = payload.decode().unwrap();

        match decoded.validate_sizes() {
            Err(DecryptError::SizeValidation { field, expected, actual }) => {
                assert_eq!(field, "ct_kem");
                assert_eq!(expected, 1088);
                assert_eq!(actual, 3);
            }
            other => panic!("expected SizeValidation, got {other:?}"),
        }
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        let decoded = DecodedPayload {
            ct_kem: vec![0; suite::sizes::KEM_CIPHERTEXT],
            nonce: vec![0; 12],
            aad: vec![],
            ciphertext: vec![0; 15],
            signature: vec![0; suite::sizes::SIGNATURE],
            server_sig_pk: vec![0; suite::sizes::SIG_PUBLIC_KEY],
        };

        assert!(matches!(
            decoded.validate_sizes(),
            Err(DecryptError::SizeValidation { field: "ciphertext", .. })
        ));
    }
}
