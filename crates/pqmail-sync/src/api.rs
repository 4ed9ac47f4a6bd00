//! The collaborator API consumed by the delivery strategies.
//!
//! The REST/SSE client that talks to the service lives outside this crate and
//! implements [`InboxApi`]. [`memory::MemoryInboxApi`] is an in-process
//! implementation for tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pqmail_core::EncryptedPayload;

/// Errors reported by the collaborator API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The resource does not exist (HTTP 404). Never retried.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    /// Network-level failure; transient.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

/// Result type for API calls.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Raw server-sent-event bytes, chunked arbitrarily.
pub type EventStream = BoxStream<'static, ApiResult<Bytes>>;

/// Lightweight inbox state used for change detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxSyncStatus {
    pub email_count: u64,
    pub emails_hash: String,
}

/// One entry of an inbox listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRecord {
    pub id: String,
    pub encrypted_metadata: EncryptedPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_parsed: Option<EncryptedPayload>,
}

/// Notification that an email arrived in an inbox.
///
/// Delivered as SSE event data, and synthesized from listings by polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailEvent {
    pub inbox_id: String,
    pub email_id: String,
    pub encrypted_metadata: EncryptedPayload,
}

/// Inbox operations the strategies depend on.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait InboxApi: Send + Sync + 'static {
    /// Current email count and content hash of an inbox.
    async fn get_inbox_sync(&self, email_address: &str) -> ApiResult<InboxSyncStatus>;

    /// List the emails of an inbox.
    ///
    /// With `include_content == false`, `encrypted_parsed` is omitted.
    async fn get_emails(&self, email_address: &str, include_content: bool)
        -> ApiResult<Vec<EmailRecord>>;

    /// Open one event stream covering all given inbox ids.
    async fn open_event_stream(&self, inbox_ids: &[String]) -> ApiResult<EventStream>;
}

/// A simple in-memory service for testing.
///
/// Keeps inboxes and emails in memory and pushes SSE frames to open streams.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use futures::channel::mpsc;
    use futures::StreamExt;

    use crate::hash::email_hash;

    struct MemoryInbox {
        inbox_id: String,
        emails: Vec<EmailRecord>,
    }

    struct OpenStream {
        inbox_ids: HashSet<String>,
        tx: mpsc::UnboundedSender<ApiResult<Bytes>>,
    }

    #[derive(Default)]
    struct State {
        inboxes: HashMap<String, MemoryInbox>,
        streams: Vec<OpenStream>,
        open_failures: VecDeque<ApiError>,
        fail_all_opens: Option<ApiError>,
        opened: Vec<Vec<String>>,
        open_attempts: usize,
        sync_calls: usize,
        list_calls: usize,
    }

    /// In-memory [`InboxApi`] implementation.
    #[derive(Default)]
    pub struct MemoryInboxApi {
        state: Mutex<State>,
    }

    impl MemoryInboxApi {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn state(&self) -> MutexGuard<'_, State> {
            // a poisoned lock only means a test thread panicked
            self.state.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Register an inbox under its email address and inbox id.
        pub fn create_inbox(&self, email_address: &str, inbox_id: &str) {
            self.state().inboxes.insert(
                email_address.to_string(),
                MemoryInbox {
                    inbox_id: inbox_id.to_string(),
                    emails: Vec::new(),
                },
            );
        }

        /// Remove an inbox; later calls for it report `NotFound`.
        pub fn delete_inbox(&self, email_address: &str) {
            self.state().inboxes.remove(email_address);
        }

        /// Store an email and notify every open stream watching its inbox.
        pub fn deliver(&self, email_address: &str, record: EmailRecord) {
            let mut state = self.state();
            let Some(inbox) = state.inboxes.get_mut(email_address) else {
                return;
            };
            let event = EmailEvent {
                inbox_id: inbox.inbox_id.clone(),
                email_id: record.id.clone(),
                encrypted_metadata: record.encrypted_metadata.clone(),
            };
            inbox.emails.push(record);

            let frame = match serde_json::to_string(&event) {
                Ok(json) => format!("data: {json}\n\n"),
                Err(_) => return,
            };
            let inbox_id = event.inbox_id;
            state.streams.retain(|s| !s.tx.is_closed());
            for stream in state.streams.iter().filter(|s| s.inbox_ids.contains(&inbox_id)) {
                let _ = stream.tx.unbounded_send(Ok(Bytes::from(frame.clone())));
            }
        }

        /// Store an email without notifying any stream (a missed event).
        pub fn store_silently(&self, email_address: &str, record: EmailRecord) {
            if let Some(inbox) = self.state().inboxes.get_mut(email_address) {
                inbox.emails.push(record);
            }
        }

        /// Send raw bytes to every open stream.
        pub fn push_raw(&self, bytes: &[u8]) {
            let state = self.state();
            for stream in &state.streams {
                let _ = stream.tx.unbounded_send(Ok(Bytes::copy_from_slice(bytes)));
            }
        }

        /// Make the next `count` stream opens fail with `error`.
        pub fn fail_next_opens(&self, count: usize, error: ApiError) {
            let mut state = self.state();
            for _ in 0..count {
                state.open_failures.push_back(error.clone());
            }
        }

        /// Make every stream open fail until cleared with `None`.
        pub fn fail_all_opens(&self, error: Option<ApiError>) {
            self.state().fail_all_opens = error;
        }

        /// End every open stream gracefully.
        pub fn close_streams(&self) {
            self.state().streams.clear();
        }

        /// Fail every open stream with `error`, then end it.
        pub fn break_streams(&self, error: ApiError) {
            let mut state = self.state();
            for stream in state.streams.drain(..) {
                let _ = stream.tx.unbounded_send(Err(error.clone()));
            }
        }

        /// Number of streams opened so far.
        pub fn open_count(&self) -> usize {
            self.state().opened.len()
        }

        /// Number of stream opens attempted, failed ones included.
        pub fn open_attempts(&self) -> usize {
            self.state().open_attempts
        }

        /// Inbox id sets each stream was opened with, in order.
        pub fn opened_with(&self) -> Vec<Vec<String>> {
            self.state().opened.clone()
        }

        /// Streams whose receiving side is still held by a client.
        pub fn live_streams(&self) -> usize {
            let mut state = self.state();
            state.streams.retain(|s| !s.tx.is_closed());
            state.streams.len()
        }

        pub fn sync_calls(&self) -> usize {
            self.state().sync_calls
        }

        pub fn list_calls(&self) -> usize {
            self.state().list_calls
        }
    }

    #[async_trait]
    impl InboxApi for MemoryInboxApi {
        async fn get_inbox_sync(&self, email_address: &str) -> ApiResult<InboxSyncStatus> {
            let mut state = self.state();
            state.sync_calls += 1;
            let inbox = state
                .inboxes
                .get(email_address)
                .ok_or_else(|| ApiError::NotFound(email_address.to_string()))?;

            let ids: Vec<&str> = inbox.emails.iter().map(|e| e.id.as_str()).collect();
            Ok(InboxSyncStatus {
                email_count: inbox.emails.len() as u64,
                emails_hash: email_hash(&ids),
            })
        }

        async fn get_emails(
            &self,
            email_address: &str,
            include_content: bool,
        ) -> ApiResult<Vec<EmailRecord>> {
            let mut state = self.state();
            state.list_calls += 1;
            let inbox = state
                .inboxes
                .get(email_address)
                .ok_or_else(|| ApiError::NotFound(email_address.to_string()))?;

            Ok(inbox
                .emails
                .iter()
                .map(|record| {
                    let mut record = record.clone();
                    if !include_content {
                        record.encrypted_parsed = None;
                    }
                    record
                })
                .collect())
        }

        async fn open_event_stream(&self, inbox_ids: &[String]) -> ApiResult<EventStream> {
            let mut state = self.state();
            state.open_attempts += 1;
            if let Some(error) = state.open_failures.pop_front() {
                return Err(error);
            }
            if let Some(error) = &state.fail_all_opens {
                return Err(error.clone());
            }

            let (tx, rx) = mpsc::unbounded();
            state.opened.push(inbox_ids.to_vec());
            state.streams.push(OpenStream {
                inbox_ids: inbox_ids.iter().cloned().collect(),
                tx,
            });
            Ok(rx.boxed())
        }
    }
}
