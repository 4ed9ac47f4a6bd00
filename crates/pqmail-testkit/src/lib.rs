//! # pqmail testkit
//!
//! Testing utilities for pqmail.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Sealer**: A reference implementation of the server side of the
//!   encryption, producing payloads the client must accept
//! - **Tamper vectors**: Named mutations of sealed payloads with the error
//!   each must produce
//! - **Generators**: Proptest strategies for property-based testing
//! - **Fixtures**: Inbox, server and record builders for test scenarios
//!
//! ## Sealing
//!
//! ```rust
//! use pqmail_core::{decrypt, KemKeyPair};
//! use pqmail_testkit::ServerSealer;
//!
//! let sealer = ServerSealer::generate();
//! let inbox = KemKeyPair::generate().unwrap();
//! let payload = sealer.seal(inbox.public_key(), b"hello", b"");
//! let plaintext = decrypt(&payload, inbox.secret_key(), sealer.public_key()).unwrap();
//! assert_eq!(plaintext, b"hello");
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use pqmail_testkit::{SealParams, TestFixture};
//!
//! proptest! {
//!     #[test]
//!     fn roundtrip(params: SealParams) {
//!         let fixture = TestFixture::new();
//!         let payload = fixture.seal(&params.plaintext, &params.aad);
//!         // ...
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust
//! use pqmail_testkit::TestFixture;
//!
//! let fixture = TestFixture::new();
//! let record = fixture.record("email-1", "bob@example.test", "Welcome");
//! ```

pub mod fixtures;
pub mod generators;
pub mod sealer;
pub mod vectors;

pub use fixtures::{multi_inbox_fixtures, TestFixture};
pub use generators::SealParams;
pub use sealer::ServerSealer;
pub use vectors::{all_vectors, flip_bit, verify_all_vectors, Field, TamperVector};
