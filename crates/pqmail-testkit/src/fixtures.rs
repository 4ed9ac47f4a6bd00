//! Test fixtures and helpers.
//!
//! Common setup code for integration tests: an inbox keypair, the server
//! that seals mail for it, and builders for listing records and events.

use std::sync::Arc;

use rand::Rng;
use serde_json::{json, Value};

use pqmail_core::{EncryptedPayload, KemKeyPair};
use pqmail_sync::api::memory::MemoryInboxApi;
use pqmail_sync::{EmailEvent, EmailRecord};

use crate::sealer::ServerSealer;

/// Fixed receive time used in generated metadata.
pub const RECEIVED_AT: &str = "2026-01-14T12:00:00Z";

/// An inbox and the server that seals mail for it.
pub struct TestFixture {
    pub inbox: KemKeyPair,
    pub sealer: Arc<ServerSealer>,
    pub email_address: String,
}

impl TestFixture {
    /// Create a fixture with a fresh inbox keypair and server.
    pub fn new() -> Self {
        Self::with_sealer(Arc::new(ServerSealer::generate()))
    }

    /// Create a fixture whose mail is sealed by an existing server.
    pub fn with_sealer(sealer: Arc<ServerSealer>) -> Self {
        let suffix: u32 = rand::thread_rng().gen();
        Self {
            inbox: KemKeyPair::generate().expect("ML-KEM key generation failed"),
            sealer,
            email_address: format!("test-{suffix:08x}@example.test"),
        }
    }

    /// The inbox hash the service uses as inbox id.
    pub fn inbox_id(&self) -> String {
        self.inbox.inbox_hash()
    }

    /// The pinned server signing key.
    pub fn server_sig_pk(&self) -> &str {
        self.sealer.public_key()
    }

    /// Register this inbox with an in-memory service.
    pub fn register(&self, api: &MemoryInboxApi) {
        api.create_inbox(&self.email_address, &self.inbox_id());
    }

    /// Seal raw bytes for this inbox.
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> EncryptedPayload {
        self.sealer.seal(self.inbox.public_key(), plaintext, aad)
    }

    /// Seal a JSON document for this inbox.
    pub fn seal_json(&self, value: &Value) -> EncryptedPayload {
        self.seal(value.to_string().as_bytes(), b"")
    }

    /// Metadata document for an email sent to this inbox.
    pub fn metadata(&self, from: &str, subject: &str) -> Value {
        json!({
            "from": from,
            "to": [self.email_address],
            "subject": subject,
            "receivedAt": RECEIVED_AT,
        })
    }

    /// Parsed-content document with a text body.
    pub fn parsed(&self, text: &str) -> Value {
        json!({
            "text": text,
            "html": format!("<p>{text}</p>"),
            "headers": { "message-id": "<fixture@example.test>" },
            "links": [],
            "attachments": [],
        })
    }

    /// A listing record with sealed metadata and content.
    pub fn record(&self, id: &str, from: &str, subject: &str) -> EmailRecord {
        EmailRecord {
            id: id.to_string(),
            encrypted_metadata: self.seal_json(&self.metadata(from, subject)),
            encrypted_parsed: Some(self.seal_json(&self.parsed(subject))),
        }
    }

    /// An arrival event carrying sealed metadata.
    pub fn event(&self, id: &str, from: &str, subject: &str) -> EmailEvent {
        EmailEvent {
            inbox_id: self.inbox_id(),
            email_id: id.to_string(),
            encrypted_metadata: self.seal_json(&self.metadata(from, subject)),
        }
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create several inboxes served by the same server.
pub fn multi_inbox_fixtures(count: usize) -> Vec<TestFixture> {
    let sealer = Arc::new(ServerSealer::generate());
    (0..count)
        .map(|_| TestFixture::with_sealer(Arc::clone(&sealer)))
        .collect()
}
