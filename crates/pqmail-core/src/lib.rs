//! # pqmail core
//!
//! Pure primitives for the pqmail client: the encrypted payload wire model,
//! strict base64url, the algorithm suite, and the decrypt pipeline.
//!
//! This crate contains no I/O, no networking and no logging. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`EncryptedPayload`] - A payload as delivered by the service
//! - [`KemKeyPair`] - The ML-KEM-768 keypair that owns an inbox
//! - [`DecryptError`] - One variant per pipeline step
//!
//! ## Decrypting
//!
//! ```rust,no_run
//! use pqmail_core::{decrypt, EncryptedPayload, KemKeyPair};
//!
//! # fn example(payload: EncryptedPayload, server_sig_pk: &str) {
//! let keypair = KemKeyPair::generate().unwrap();
//! let plaintext = decrypt(&payload, keypair.secret_key(), server_sig_pk);
//! # }
//! ```

pub mod base64url;
pub mod crypto;
pub mod error;
pub mod pipeline;
pub mod suite;
pub mod transcript;
pub mod wire;

pub use crypto::{sha256, AeadKey, KemKeyPair, KemPublicKey, KemSecretKey, SharedSecret};
pub use error::{CryptoError, DecryptError, Result};
pub use pipeline::decrypt;
pub use suite::{ciphersuite, CONTEXT, PAYLOAD_VERSION};
pub use transcript::{build_transcript, transcript_for};
pub use wire::{Algorithms, DecodedPayload, EncryptedPayload};
