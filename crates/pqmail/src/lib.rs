//! # pqmail
//!
//! Client for post-quantum encrypted test inboxes.
//!
//! ## Overview
//!
//! Every email stored by the service is sealed to the inbox's ML-KEM-768 key
//! and signed with the server's ML-DSA-65 key. This crate provides:
//!
//! - **Decryption**: the verify-then-decrypt pipeline, with the server key
//!   pinned per inbox
//! - **Delivery**: subscriptions over server-sent events, polling, or SSE
//!   with automatic fallback to polling
//! - **Waiting**: watches that yield each new email once, and
//!   `wait_for_email` for tests that expect a message to arrive
//!
//! ## Key Concepts
//!
//! - **Inbox id**: base64url SHA-256 of the inbox public key. Events name
//!   inboxes by it.
//! - **Pinned key**: the server signing key recorded at inbox creation. A
//!   payload signed by any other key is rejected before anything else.
//! - **Critical errors**: signature and key mismatches indicate tampering and
//!   are logged as warnings. Decryption is never retried.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pqmail::core::KemKeyPair;
//! use pqmail::sync::api::memory::MemoryInboxApi;
//! use pqmail::{Client, ClientConfig, EmailFilter, Inbox};
//!
//! async fn example(server_sig_pk: &str) {
//!     let api = MemoryInboxApi::new();
//!     let client = Client::new(api, ClientConfig::default());
//!
//!     let keypair = KemKeyPair::generate().unwrap();
//!     let inbox = Inbox::new("alice@example.test", keypair, server_sig_pk);
//!
//!     let filter = EmailFilter::new().subject("Verify your account");
//!     let email = client
//!         .wait_for_email(&inbox, &filter, Some(Duration::from_secs(10)))
//!         .await
//!         .unwrap();
//!     println!("{} from {}", email.subject(), email.from());
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `pqmail::core` - Wire format, suite and decrypt pipeline
//! - `pqmail::sync` - Delivery strategies and the service API trait

pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod inbox;

// Re-export component crates
pub use pqmail_core as core;
pub use pqmail_sync as sync;

// Re-export main types for convenience
pub use client::{Client, EmailWatch};
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use filter::EmailFilter;
pub use inbox::{Attachment, Email, EmailMetadata, Inbox, ParsedContent};

pub use pqmail_core::{DecryptError, EncryptedPayload, KemKeyPair};
pub use pqmail_sync::{DeliveryMode, InboxApi, SyncConfig, SyncError};
