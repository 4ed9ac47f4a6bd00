//! Inboxes and decrypted emails.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pqmail_core::KemKeyPair;

/// An inbox owned by this client.
///
/// Holds the ML-KEM keypair that receives mail and the server signing key
/// pinned when the inbox was created.
#[derive(Clone)]
pub struct Inbox {
    email_address: String,
    keypair: KemKeyPair,
    server_sig_pk: String,
}

impl Inbox {
    pub fn new(
        email_address: impl Into<String>,
        keypair: KemKeyPair,
        server_sig_pk: impl Into<String>,
    ) -> Self {
        Self {
            email_address: email_address.into(),
            keypair,
            server_sig_pk: server_sig_pk.into(),
        }
    }

    pub fn email_address(&self) -> &str {
        &self.email_address
    }

    /// The inbox hash the service uses to address this inbox in events.
    pub fn inbox_id(&self) -> String {
        self.keypair.inbox_hash()
    }

    pub fn keypair(&self) -> &KemKeyPair {
        &self.keypair
    }

    /// The pinned server signing key (base64url).
    pub fn server_sig_pk(&self) -> &str {
        &self.server_sig_pk
    }
}

impl fmt::Debug for Inbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inbox")
            .field("email_address", &self.email_address)
            .field("keypair", &self.keypair)
            .finish_non_exhaustive()
    }
}

/// Decrypted email metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailMetadata {
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub received_at: Option<String>,
}

/// An attachment in the parsed content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Decrypted body and structure of an email.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedContent {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, Value>,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// A decrypted email.
#[derive(Debug, Clone, PartialEq)]
pub struct Email {
    pub id: String,
    pub inbox_id: String,
    pub metadata: EmailMetadata,
    /// Present when the content was fetched.
    pub parsed: Option<ParsedContent>,
}

impl Email {
    pub fn subject(&self) -> &str {
        &self.metadata.subject
    }

    pub fn from(&self) -> &str {
        &self.metadata.from
    }

    pub fn text(&self) -> Option<&str> {
        self.parsed.as_ref()?.text.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_from_camel_case_json() {
        let json = r#"{"from":"a@x.test","to":["b@x.test"],"subject":"hi","receivedAt":"2026-01-14T12:00:00Z"}"#;
        let metadata: EmailMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.subject, "hi");
        assert_eq!(metadata.received_at.as_deref(), Some("2026-01-14T12:00:00Z"));
    }

    #[test]
    fn test_parsed_content_tolerates_missing_fields() {
        let parsed: ParsedContent = serde_json::from_str(r#"{"text":"body"}"#).unwrap();
        assert_eq!(parsed.text.as_deref(), Some("body"));
        assert!(parsed.attachments.is_empty());
    }

    #[test]
    fn test_inbox_debug_hides_server_and_secret() {
        let inbox = Inbox::new("a@x.test", KemKeyPair::generate().unwrap(), "pinned");
        let debug = format!("{inbox:?}");
        assert!(debug.contains("a@x.test"));
        assert!(!debug.contains("pinned"));
    }
}
