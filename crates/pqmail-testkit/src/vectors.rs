//! Tamper vectors for the decrypt pipeline.
//!
//! Each vector mutates a freshly sealed payload and names the error the
//! pipeline must report. None of them may ever yield plaintext.

use pqmail_core::{base64url, DecryptError, EncryptedPayload, KemKeyPair};

use crate::sealer::ServerSealer;

/// A binary field of the wire payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    CtKem,
    Nonce,
    Aad,
    Ciphertext,
    Signature,
    ServerSigPk,
}

impl Field {
    pub const ALL: [Field; 6] = [
        Field::CtKem,
        Field::Nonce,
        Field::Aad,
        Field::Ciphertext,
        Field::Signature,
        Field::ServerSigPk,
    ];

    fn text_mut(self, payload: &mut EncryptedPayload) -> &mut String {
        match self {
            Field::CtKem => &mut payload.ct_kem,
            Field::Nonce => &mut payload.nonce,
            Field::Aad => &mut payload.aad,
            Field::Ciphertext => &mut payload.ciphertext,
            Field::Signature => &mut payload.signature,
            Field::ServerSigPk => &mut payload.server_sig_pk,
        }
    }
}

/// Decode a field, apply `f` to its bytes, and encode it back.
pub fn mutate_field(
    payload: &EncryptedPayload,
    field: Field,
    f: impl FnOnce(&mut Vec<u8>),
) -> EncryptedPayload {
    let mut out = payload.clone();
    let text = field.text_mut(&mut out);
    let mut bytes = base64url::decode("field", text).expect("sealed field must decode");
    f(&mut bytes);
    *text = base64url::encode(&bytes);
    out
}

/// Flip one bit of a field. `bit` wraps around the field length.
pub fn flip_bit(payload: &EncryptedPayload, field: Field, bit: usize) -> EncryptedPayload {
    mutate_field(payload, field, |bytes| {
        if !bytes.is_empty() {
            let bit = bit % (bytes.len() * 8);
            bytes[bit / 8] ^= 1 << (bit % 8);
        }
    })
}

/// A named mutation and the failure it must produce.
pub struct TamperVector {
    pub name: &'static str,
    pub mutate: fn(&ServerSealer, &EncryptedPayload) -> EncryptedPayload,
    pub expected: fn(&DecryptError) -> bool,
}

/// Plaintext and aad every vector is sealed with. The aad is non-empty so
/// that flipping it is meaningful.
pub const PLAINTEXT: &[u8] = b"{\"subject\":\"tamper me\"}";
pub const AAD: &[u8] = b"inbox-metadata";

/// Get all tamper vectors.
pub fn all_vectors() -> Vec<TamperVector> {
    vec![
        TamperVector {
            name: "foreign server key",
            mutate: |_, p| flip_bit(p, Field::ServerSigPk, 0),
            expected: |e| *e == DecryptError::ServerKeyMismatch,
        },
        TamperVector {
            name: "padded ct_kem",
            mutate: |_, p| {
                let mut p = p.clone();
                p.ct_kem.push('=');
                p
            },
            expected: |e| matches!(e, DecryptError::Format(_)),
        },
        TamperVector {
            name: "standard alphabet nonce",
            mutate: |_, p| {
                let mut p = p.clone();
                p.nonce.replace_range(0..1, "+");
                p
            },
            expected: |e| matches!(e, DecryptError::Format(_)),
        },
        TamperVector {
            name: "truncated nonce",
            mutate: |_, p| mutate_field(p, Field::Nonce, |b| b.truncate(11)),
            expected: |e| matches!(e, DecryptError::SizeValidation { field: "nonce", .. }),
        },
        TamperVector {
            name: "ciphertext shorter than tag",
            mutate: |_, p| mutate_field(p, Field::Ciphertext, |b| b.truncate(15)),
            expected: |e| matches!(e, DecryptError::SizeValidation { field: "ciphertext", .. }),
        },
        TamperVector {
            name: "future version",
            mutate: |_, p| {
                let mut p = p.clone();
                p.version = 2;
                p
            },
            expected: |e| *e == DecryptError::UnsupportedVersion(2),
        },
        TamperVector {
            name: "classical kem",
            mutate: |_, p| {
                let mut p = p.clone();
                p.algorithms.kem = "X25519".into();
                p
            },
            expected: |e| matches!(e, DecryptError::UnsupportedAlgorithm { kind: "kem", .. }),
        },
        TamperVector {
            name: "flipped ct_kem",
            mutate: |_, p| flip_bit(p, Field::CtKem, 17),
            expected: |e| *e == DecryptError::SignatureVerification,
        },
        TamperVector {
            name: "flipped nonce",
            mutate: |_, p| flip_bit(p, Field::Nonce, 3),
            expected: |e| *e == DecryptError::SignatureVerification,
        },
        TamperVector {
            name: "flipped aad",
            mutate: |_, p| flip_bit(p, Field::Aad, 9),
            expected: |e| *e == DecryptError::SignatureVerification,
        },
        TamperVector {
            name: "flipped ciphertext",
            mutate: |_, p| flip_bit(p, Field::Ciphertext, 0),
            expected: |e| *e == DecryptError::SignatureVerification,
        },
        TamperVector {
            name: "flipped signature",
            mutate: |_, p| flip_bit(p, Field::Signature, 100),
            expected: |e| *e == DecryptError::SignatureVerification,
        },
        TamperVector {
            name: "re-signed flipped ct_kem",
            mutate: |s, p| s.resign(&flip_bit(p, Field::CtKem, 17)),
            expected: |e| *e == DecryptError::Authentication,
        },
        TamperVector {
            name: "re-signed flipped nonce",
            mutate: |s, p| s.resign(&flip_bit(p, Field::Nonce, 3)),
            expected: |e| *e == DecryptError::Authentication,
        },
        TamperVector {
            name: "re-signed flipped aad",
            mutate: |s, p| s.resign(&flip_bit(p, Field::Aad, 9)),
            expected: |e| *e == DecryptError::Authentication,
        },
        TamperVector {
            name: "re-signed flipped tag",
            mutate: |s, p| {
                let len = p.decode().expect("sealed payload decodes").ciphertext.len();
                s.resign(&flip_bit(p, Field::Ciphertext, (len - 1) * 8))
            },
            expected: |e| *e == DecryptError::Authentication,
        },
    ]
}

/// Run every vector against a fresh inbox and sealer.
///
/// Returns `(name, passed, outcome)` per vector.
pub fn verify_all_vectors() -> Vec<(String, bool, String)> {
    let sealer = ServerSealer::generate();
    let inbox = KemKeyPair::generate().expect("keygen");
    let sealed = sealer.seal(inbox.public_key(), PLAINTEXT, AAD);

    all_vectors()
        .iter()
        .map(|v| {
            let tampered = (v.mutate)(&sealer, &sealed);
            match pqmail_core::decrypt(&tampered, inbox.secret_key(), sealer.public_key()) {
                Ok(_) => (v.name.to_string(), false, "decrypted".to_string()),
                Err(e) => (v.name.to_string(), (v.expected)(&e), e.to_string()),
            }
        })
        .collect()
}
