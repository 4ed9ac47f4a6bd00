//! The supported algorithm suite and its mandated sizes.

use crate::error::DecryptError;
use crate::wire::Algorithms;

/// Current payload version.
pub const PAYLOAD_VERSION: u32 = 1;

/// Domain-separation context mixed into the transcript and the KDF info.
pub const CONTEXT: &str = "vaultsandbox:email:v1";

pub const KEM_ALGORITHM: &str = "ML-KEM-768";
pub const SIG_ALGORITHM: &str = "ML-DSA-65";
pub const AEAD_ALGORITHM: &str = "AES-256-GCM";
pub const KDF_ALGORITHM: &str = "HKDF-SHA-512";

/// Byte sizes mandated by the suite.
pub mod sizes {
    /// ML-KEM-768 ciphertext.
    pub const KEM_CIPHERTEXT: usize = fips203::ml_kem_768::CT_LEN;
    /// ML-KEM-768 encapsulation (public) key.
    pub const KEM_PUBLIC_KEY: usize = fips203::ml_kem_768::EK_LEN;
    /// ML-KEM-768 decapsulation (secret) key.
    pub const KEM_SECRET_KEY: usize = fips203::ml_kem_768::DK_LEN;
    pub const KEM_SHARED_SECRET: usize = 32;

    /// ML-DSA-65 public key.
    pub const SIG_PUBLIC_KEY: usize = fips204::ml_dsa_65::PK_LEN;
    /// ML-DSA-65 signature.
    pub const SIGNATURE: usize = fips204::ml_dsa_65::SIG_LEN;

    pub const AEAD_KEY: usize = 32;
    pub const AEAD_NONCE: usize = 12;
    pub const AEAD_TAG: usize = 16;
}

/// The suite string as it appears in the transcript: `kem:sig:aead:kdf`.
pub fn ciphersuite() -> String {
    format!("{KEM_ALGORITHM}:{SIG_ALGORITHM}:{AEAD_ALGORITHM}:{KDF_ALGORITHM}")
}

/// Check the payload version and that every advertised algorithm is supported.
pub fn validate(version: u32, algs: &Algorithms) -> Result<(), DecryptError> {
    if version != PAYLOAD_VERSION {
        return Err(DecryptError::UnsupportedVersion(version));
    }

    let checks: [(&'static str, &str, &str); 4] = [
        ("kem", &algs.kem, KEM_ALGORITHM),
        ("sig", &algs.sig, SIG_ALGORITHM),
        ("aead", &algs.aead, AEAD_ALGORITHM),
        ("kdf", &algs.kdf, KDF_ALGORITHM),
    ];

    for (kind, value, supported) in checks {
        if value != supported {
            return Err(DecryptError::UnsupportedAlgorithm {
                kind,
                value: value.to_string(),
            });
        }
    }

    Ok(())
}
