//! Reference server-side sealer.
//!
//! Produces payloads the way the service does: ML-KEM-768 encapsulation to
//! the inbox key, HKDF-SHA-512 key derivation, AES-256-GCM encryption, and
//! an ML-DSA-65 signature over the transcript.

use fips204::ml_dsa_65;
use fips204::traits::{SerDes, Signer};
use rand::RngCore;

use pqmail_core::suite::sizes;
use pqmail_core::{
    base64url, transcript_for, AeadKey, Algorithms, DecodedPayload, EncryptedPayload,
    KemPublicKey, PAYLOAD_VERSION,
};

/// A server signing identity that seals payloads for inboxes.
pub struct ServerSealer {
    signing_key: ml_dsa_65::PrivateKey,
    public_key: Vec<u8>,
    public_key_b64: String,
}

impl ServerSealer {
    /// Generate a fresh signing keypair.
    pub fn generate() -> Self {
        let (public_key, signing_key) =
            ml_dsa_65::try_keygen().expect("ML-DSA key generation failed");
        let public_key = public_key.into_bytes().to_vec();
        Self {
            signing_key,
            public_key_b64: base64url::encode(&public_key),
            public_key,
        }
    }

    /// The signing public key as base64url, as pinned by clients.
    pub fn public_key(&self) -> &str {
        &self.public_key_b64
    }

    /// Seal `plaintext` for `recipient`.
    pub fn seal(&self, recipient: &KemPublicKey, plaintext: &[u8], aad: &[u8]) -> EncryptedPayload {
        let (ct_kem, shared_secret) = recipient.encapsulate().expect("encapsulation failed");
        let key = AeadKey::derive(&shared_secret, &ct_kem, aad).expect("key derivation failed");

        let mut nonce = vec![0u8; sizes::AEAD_NONCE];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = key.encrypt(&nonce, aad, plaintext).expect("encryption failed");

        let decoded = DecodedPayload {
            ct_kem,
            nonce,
            aad: aad.to_vec(),
            ciphertext,
            signature: Vec::new(),
            server_sig_pk: self.public_key.clone(),
        };
        self.sign(decoded)
    }

    /// Sign decoded fields and encode them as a wire payload.
    ///
    /// Lets tests tamper with a payload and still present a valid signature.
    pub fn sign(&self, mut decoded: DecodedPayload) -> EncryptedPayload {
        let transcript = transcript_for(PAYLOAD_VERSION as u8, &decoded);
        let signature = self
            .signing_key
            .try_sign(&transcript, b"")
            .expect("signing failed");
        decoded.signature = signature.to_vec();
        encode(&decoded)
    }

    /// Re-sign an already encoded payload after its fields were changed.
    pub fn resign(&self, payload: &EncryptedPayload) -> EncryptedPayload {
        let mut decoded = payload.decode().expect("payload must decode to be re-signed");
        decoded.server_sig_pk = self.public_key.clone();
        self.sign(decoded)
    }
}

fn encode(decoded: &DecodedPayload) -> EncryptedPayload {
    EncryptedPayload {
        version: PAYLOAD_VERSION,
        algorithms: Algorithms::supported(),
        ct_kem: base64url::encode(&decoded.ct_kem),
        nonce: base64url::encode(&decoded.nonce),
        aad: base64url::encode(&decoded.aad),
        ciphertext: base64url::encode(&decoded.ciphertext),
        signature: base64url::encode(&decoded.signature),
        server_sig_pk: base64url::encode(&decoded.server_sig_pk),
    }
}
