//! # pqmail sync
//!
//! Delivery of new-email notifications for subscribed inboxes.
//!
//! ## Overview
//!
//! A [`DeliveryStrategy`] turns inbox subscriptions into a stream of
//! [`EmailEvent`]s. Three strategies exist:
//!
//! - **Sse**: one server-sent event stream for all inboxes, with exponential
//!   reconnect backoff and resynchronization callbacks
//! - **Polling**: one task per inbox comparing content hashes, with linear
//!   backoff while the inbox is quiet
//! - **Auto**: SSE first, switching to polling for the session if the first
//!   connection fails
//!
//! Strategies talk to the service only through the [`InboxApi`] trait.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pqmail_sync::api::memory::MemoryInboxApi;
//! use pqmail_sync::{build_strategy, DeliveryMode, NoopMetrics, Subscription, SyncConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() {
//!     let api = MemoryInboxApi::new();
//!     let strategy = build_strategy(DeliveryMode::Auto, api, SyncConfig::default(), NoopMetrics::shared());
//!
//!     let subscription = Subscription::new("inbox-hash", "alice@example.test", |event| async move {
//!         println!("email {} arrived", event.email_id);
//!         Ok(())
//!     });
//!     strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();
//! }
//! ```

pub mod api;
pub mod auto;
pub mod backoff;
pub mod config;
pub mod error;
pub mod event_stream;
pub mod hash;
pub mod metrics;
pub mod polling;
pub mod sse;
pub mod strategy;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ApiResult, EmailEvent, EmailRecord, EventStream, InboxApi, InboxSyncStatus};
pub use auto::AutoStrategy;
pub use config::{DeliveryMode, PollingConfig, SseConfig, SyncConfig};
pub use error::{Result, SyncError};
pub use event_stream::EventStreamParser;
pub use hash::{email_hash, EmailHashCalculator};
pub use metrics::{NoopMetrics, SyncMetrics};
pub use polling::PollingStrategy;
pub use sse::SseStrategy;
pub use strategy::{build_strategy, DeliveryStrategy};
pub use subscription::{Subscription, SubscriptionRegistry};
