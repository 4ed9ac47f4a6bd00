//! Inbox content hash.
//!
//! The service summarizes an inbox as a hash over its email ids. Polling
//! compares successive hashes to decide whether a listing fetch is needed.

use pqmail_core::{base64url, sha256};

/// Hash a set of email ids: base64url(SHA-256(sorted ids joined by ",")).
///
/// Ids are sorted ordinally (byte order), so the result does not depend on
/// listing order. The empty set hashes the empty string.
pub fn email_hash<S: AsRef<str>>(ids: &[S]) -> String {
    let mut sorted: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();
    sorted.sort_unstable();
    base64url::encode(&sha256(sorted.join(",").as_bytes()))
}

/// Stateless calculator matching the service's inbox hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmailHashCalculator;

impl EmailHashCalculator {
    pub fn hash<S: AsRef<str>>(&self, ids: &[S]) -> String {
        email_hash(ids)
    }
}
