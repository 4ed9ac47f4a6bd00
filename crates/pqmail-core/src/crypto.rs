//! Cryptographic primitives for pqmail.
//!
//! Wraps ML-KEM-768 (FIPS 203), ML-DSA-65 verification (FIPS 204),
//! HKDF-SHA-512 and AES-256-GCM with strong types. Secret-bearing types are
//! zeroized on drop and never print their contents.

use aes_gcm::aead::{Aead, AeadInPlace, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use fips203::ml_kem_768;
use fips203::traits::{Decaps, Encaps, KeyGen, SerDes as KemSerDes};
use fips204::ml_dsa_65;
use fips204::traits::{SerDes as SigSerDes, Verifier};
use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::base64url;
use crate::error::{CryptoError, DecryptError};
use crate::suite::{sizes, CONTEXT};

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

// ─────────────────────────────────────────────────────────────────────────────
// KEM
// ─────────────────────────────────────────────────────────────────────────────

/// An ML-KEM-768 encapsulation (public) key.
#[derive(Clone, PartialEq, Eq)]
pub struct KemPublicKey(Vec<u8>);

impl KemPublicKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != sizes::KEM_PUBLIC_KEY {
            return Err(CryptoError::InvalidKey {
                kind: "kem public",
                expected: sizes::KEM_PUBLIC_KEY,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as base64url, the form the service expects at inbox creation.
    pub fn to_base64url(&self) -> String {
        base64url::encode(&self.0)
    }

    /// Encapsulate a fresh shared secret to this key.
    ///
    /// Returns the KEM ciphertext and the shared secret. Clients never need
    /// this; it exists for the sealing side.
    pub fn encapsulate(&self) -> Result<(Vec<u8>, SharedSecret), CryptoError> {
        let bytes: [u8; ml_kem_768::EK_LEN] = self
            .0
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::Encryption("bad encapsulation key length".into()))?;
        let ek = ml_kem_768::EncapsKey::try_from_bytes(bytes)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        let (ssk, ct) = ek
            .try_encaps_with_rng(&mut rand::thread_rng())
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;
        Ok((ct.into_bytes().to_vec(), SharedSecret(ssk.into_bytes())))
    }
}

impl fmt::Debug for KemPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemPublicKey({}..)", hex::encode(&self.0[..8.min(self.0.len())]))
    }
}

/// An ML-KEM-768 decapsulation (secret) key.
///
/// Owned by the caller for the lifetime of an inbox. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct KemSecretKey(Vec<u8>);

impl KemSecretKey {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != sizes::KEM_SECRET_KEY {
            return Err(CryptoError::InvalidKey {
                kind: "kem secret",
                expected: sizes::KEM_SECRET_KEY,
                actual: bytes.len(),
            });
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Get the raw bytes (secret key material).
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Recover the shared secret from a KEM ciphertext.
    pub fn decapsulate(&self, ct_kem: &[u8]) -> Result<SharedSecret, DecryptError> {
        let ct: [u8; ml_kem_768::CT_LEN] = ct_kem
            .try_into()
            .map_err(|_| DecryptError::KeyEncapsulation)?;
        let ct = ml_kem_768::CipherText::try_from_bytes(ct)
            .map_err(|_| DecryptError::KeyEncapsulation)?;

        let mut dk_bytes: [u8; ml_kem_768::DK_LEN] = self
            .0
            .as_slice()
            .try_into()
            .map_err(|_| DecryptError::KeyEncapsulation)?;
        let dk = ml_kem_768::DecapsKey::try_from_bytes(dk_bytes);
        dk_bytes.zeroize();
        let dk = dk.map_err(|_| DecryptError::KeyEncapsulation)?;

        let ssk = dk
            .try_decaps(&ct)
            .map_err(|_| DecryptError::KeyEncapsulation)?;
        let secret = ssk.into_bytes();
        if secret.len() != sizes::KEM_SHARED_SECRET {
            return Err(DecryptError::KeyEncapsulation);
        }
        Ok(SharedSecret(secret))
    }
}

impl fmt::Debug for KemSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemSecretKey(<redacted>)")
    }
}

/// An ML-KEM-768 keypair for one inbox.
#[derive(Clone)]
pub struct KemKeyPair {
    public: KemPublicKey,
    secret: KemSecretKey,
}

impl KemKeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let (ek, dk) = ml_kem_768::KG::try_keygen_with_rng(&mut rand::thread_rng())
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        Ok(Self {
            public: KemPublicKey(ek.into_bytes().to_vec()),
            secret: KemSecretKey(dk.into_bytes().to_vec()),
        })
    }

    /// Rebuild a keypair from raw key bytes.
    pub fn from_bytes(public: &[u8], secret: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            public: KemPublicKey::from_bytes(public)?,
            secret: KemSecretKey::from_bytes(secret)?,
        })
    }

    pub fn public_key(&self) -> &KemPublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &KemSecretKey {
        &self.secret
    }

    /// The public key as base64url.
    pub fn public_key_b64(&self) -> String {
        self.public.to_base64url()
    }

    /// Identifier the service uses for this inbox in event notifications:
    /// base64url(SHA-256(public key)).
    pub fn inbox_hash(&self) -> String {
        base64url::encode(&sha256(self.public.as_bytes()))
    }
}

impl fmt::Debug for KemKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KemKeyPair({:?})", self.public)
    }
}

/// A 32-byte KEM shared secret. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Signature
// ─────────────────────────────────────────────────────────────────────────────

/// Verify an ML-DSA-65 signature (empty context) over `message`.
pub fn verify_signature(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
) -> Result<(), DecryptError> {
    let pk: [u8; ml_dsa_65::PK_LEN] = public_key
        .try_into()
        .map_err(|_| DecryptError::SignatureVerification)?;
    let sig: [u8; ml_dsa_65::SIG_LEN] = signature
        .try_into()
        .map_err(|_| DecryptError::SignatureVerification)?;

    let pk = ml_dsa_65::PublicKey::try_from_bytes(pk)
        .map_err(|_| DecryptError::SignatureVerification)?;

    if pk.verify(message, &sig, b"") {
        Ok(())
    } else {
        Err(DecryptError::SignatureVerification)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// KDF + AEAD
// ─────────────────────────────────────────────────────────────────────────────

/// A 256-bit AES-GCM key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AeadKey([u8; 32]);

impl AeadKey {
    /// Derive the payload key from a KEM shared secret.
    ///
    /// `salt = SHA-256(ct_kem)`, `info = context || u32_be(len(aad)) || aad`,
    /// HKDF-SHA-512 expanded to 32 bytes.
    pub fn derive(
        shared_secret: &SharedSecret,
        ct_kem: &[u8],
        aad: &[u8],
    ) -> Result<Self, CryptoError> {
        let salt = sha256(ct_kem);
        let aad_len = u32::try_from(aad.len())
            .map_err(|_| CryptoError::KeyDerivation("aad longer than u32::MAX".into()))?;

        let mut info = Vec::with_capacity(CONTEXT.len() + 4 + aad.len());
        info.extend_from_slice(CONTEXT.as_bytes());
        info.extend_from_slice(&aad_len.to_be_bytes());
        info.extend_from_slice(aad);

        let hk = Hkdf::<Sha512>::new(Some(&salt[..]), shared_secret.as_bytes());
        let mut okm = [0u8; sizes::AEAD_KEY];
        hk.expand(&info, &mut okm)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
        Ok(Self(okm))
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Encrypt, returning ciphertext with the 16-byte tag appended.
    pub fn encrypt(&self, nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != sizes::AEAD_NONCE {
            return Err(CryptoError::Encryption(format!(
                "nonce must be {} bytes",
                sizes::AEAD_NONCE
            )));
        }
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));
        cipher
            .encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Split off the trailing tag and decrypt.
    pub fn decrypt(&self, nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, DecryptError> {
        if nonce.len() != sizes::AEAD_NONCE || ciphertext.len() < sizes::AEAD_TAG {
            return Err(DecryptError::Authentication);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - sizes::AEAD_TAG);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.0));
        let mut buffer = body.to_vec();
        cipher
            .decrypt_in_place_detached(Nonce::from_slice(nonce), aad, &mut buffer, Tag::from_slice(tag))
            .map_err(|_| DecryptError::Authentication)?;
        Ok(buffer)
    }
}

impl fmt::Debug for AeadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AeadKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kem_roundtrip() {
        let keypair = KemKeyPair::generate().unwrap();
        let (ct, sender_secret) = keypair.public_key().encapsulate().unwrap();
        assert_eq!(ct.len(), sizes::KEM_CIPHERTEXT);

        let recipient_secret = keypair.secret_key().decapsulate(&ct).unwrap();
        assert_eq!(sender_secret.as_bytes(), recipient_secret.as_bytes());
    }

    #[test]
    fn test_keygen_and_encapsulation_draw_fresh_randomness() {
        let first = KemKeyPair::generate().unwrap();
        let second = KemKeyPair::generate().unwrap();
        assert_ne!(first.public_key().as_bytes(), second.public_key().as_bytes());

        let (ct_a, _) = first.public_key().encapsulate().unwrap();
        let (ct_b, _) = first.public_key().encapsulate().unwrap();
        assert_ne!(ct_a, ct_b);
    }

    #[test]
    fn test_decapsulate_rejects_wrong_length() {
        let keypair = KemKeyPair::generate().unwrap();
        assert_eq!(
            keypair.secret_key().decapsulate(&[0u8; 10]).err(),
            Some(DecryptError::KeyEncapsulation)
        );
    }

    #[test]
    fn test_keypair_from_bytes_validates_sizes() {
        let keypair = KemKeyPair::generate().unwrap();
        let rebuilt = KemKeyPair::from_bytes(
            keypair.public_key().as_bytes(),
            keypair.secret_key().as_bytes(),
        )
        .unwrap();
        assert_eq!(rebuilt.public_key(), keypair.public_key());

        let err = KemKeyPair::from_bytes(&[0u8; 10], keypair.secret_key().as_bytes()).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { actual: 10, .. }));
    }

    #[test]
    fn test_inbox_hash_is_stable_base64url() {
        let keypair = KemKeyPair::generate().unwrap();
        let hash = keypair.inbox_hash();
        assert_eq!(hash, keypair.inbox_hash());
        assert_eq!(base64url::decode("hash", &hash).unwrap().len(), 32);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let keypair = KemKeyPair::generate().unwrap();
        let rendered = format!("{:?}", keypair.secret_key());
        assert_eq!(rendered, "KemSecretKey(<redacted>)");
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let secret = SharedSecret([0x42; 32]);
        let k1 = AeadKey::derive(&secret, b"ct", b"aad").unwrap();
        let k2 = AeadKey::derive(&secret, b"ct", b"aad").unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_key_derivation_binds_ct_and_aad() {
        let secret = SharedSecret([0x42; 32]);
        let base = AeadKey::derive(&secret, b"ct", b"aad").unwrap();
        let other_ct = AeadKey::derive(&secret, b"cu", b"aad").unwrap();
        let other_aad = AeadKey::derive(&secret, b"ct", b"aae").unwrap();

        assert_ne!(base.as_bytes(), other_ct.as_bytes());
        assert_ne!(base.as_bytes(), other_aad.as_bytes());
    }

    #[test]
    fn test_aead_roundtrip() {
        let key = AeadKey::from_bytes([7; 32]);
        let nonce = [1u8; 12];
        let ciphertext = key.encrypt(&nonce, b"header", b"hello").unwrap();
        assert_eq!(ciphertext.len(), 5 + sizes::AEAD_TAG);

        assert_eq!(key.decrypt(&nonce, b"header", &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn test_aead_rejects_wrong_aad() {
        let key = AeadKey::from_bytes([7; 32]);
        let nonce = [1u8; 12];
        let ciphertext = key.encrypt(&nonce, b"header", b"hello").unwrap();

        assert_eq!(
            key.decrypt(&nonce, b"other", &ciphertext),
            Err(DecryptError::Authentication)
        );
    }

    #[test]
    fn test_verify_rejects_malformed_inputs() {
        assert_eq!(
            verify_signature(&[0u8; 3], b"msg", &[0u8; sizes::SIGNATURE]),
            Err(DecryptError::SignatureVerification)
        );
        assert_eq!(
            verify_signature(&[0u8; sizes::SIG_PUBLIC_KEY], b"msg", &[0u8; 3]),
            Err(DecryptError::SignatureVerification)
        );
    }
}
