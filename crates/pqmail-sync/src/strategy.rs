//! The delivery strategy abstraction.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::api::InboxApi;
use crate::auto::AutoStrategy;
use crate::config::{DeliveryMode, SyncConfig};
use crate::error::Result;
use crate::metrics::SyncMetrics;
use crate::polling::PollingStrategy;
use crate::sse::SseStrategy;
use crate::subscription::Subscription;

/// Delivers email notifications for subscribed inboxes.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DeliveryStrategy: Send + Sync {
    /// Start delivering events for `subscription`.
    ///
    /// Fails with `AlreadySubscribed` if its inbox id is registered.
    /// Cancelling `cancel` later removes the subscription.
    async fn subscribe(&self, subscription: Subscription, cancel: CancellationToken) -> Result<()>;

    /// Stop delivering events for an inbox. Unknown ids are a no-op.
    async fn unsubscribe(&self, inbox_id: &str) -> Result<()>;

    /// Whether events can currently be delivered.
    fn is_connected(&self) -> bool;

    /// Stop everything and drop all subscriptions.
    async fn dispose(&self);

    /// The variant currently delivering events.
    fn mode(&self) -> DeliveryMode;
}

/// Build the strategy for `mode`.
pub fn build_strategy<A: InboxApi>(
    mode: DeliveryMode,
    api: Arc<A>,
    config: SyncConfig,
    metrics: Arc<dyn SyncMetrics>,
) -> Arc<dyn DeliveryStrategy> {
    match mode {
        DeliveryMode::Sse => Arc::new(SseStrategy::new(api, config.sse, metrics)),
        DeliveryMode::Polling => Arc::new(PollingStrategy::new(api, config.polling, metrics)),
        DeliveryMode::Auto => Arc::new(AutoStrategy::new(api, config, metrics)),
    }
}
