//! SSE with a one-way fallback to polling.
//!
//! Subscriptions go to the SSE strategy until its first connection attempt
//! fails. From then on the session uses polling: subscriptions still held by
//! SSE are migrated, and SSE is disposed. The switch is never reversed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::InboxApi;
use crate::config::{DeliveryMode, SyncConfig};
use crate::error::{Result, SyncError};
use crate::metrics::{names, SyncMetrics};
use crate::polling::PollingStrategy;
use crate::sse::SseStrategy;
use crate::strategy::DeliveryStrategy;
use crate::subscription::Subscription;

/// Automatic strategy selection.
pub struct AutoStrategy<A> {
    sse: SseStrategy<A>,
    polling: PollingStrategy<A>,
    metrics: Arc<dyn SyncMetrics>,
    fell_back: AtomicBool,
    /// Serializes subscribes so the fallback happens exactly once.
    transition: Mutex<()>,
}

impl<A: InboxApi> AutoStrategy<A> {
    pub fn new(api: Arc<A>, config: SyncConfig, metrics: Arc<dyn SyncMetrics>) -> Self {
        Self {
            sse: SseStrategy::new(Arc::clone(&api), config.sse, Arc::clone(&metrics)),
            polling: PollingStrategy::new(api, config.polling, Arc::clone(&metrics)),
            metrics,
            fell_back: AtomicBool::new(false),
            transition: Mutex::new(()),
        }
    }

    fn using_polling(&self) -> bool {
        self.fell_back.load(Ordering::SeqCst)
    }

    async fn fall_back(&self) -> Result<()> {
        self.fell_back.store(true, Ordering::SeqCst);
        self.metrics.counter(names::AUTO_FALLBACKS, 1);

        let migrated = self.sse.take_subscriptions().await;
        self.sse.dispose().await;
        info!(migrated = migrated.len(), "switched to polling for this session");

        for (subscription, cancel) in migrated {
            self.polling.subscribe(subscription, cancel).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<A: InboxApi> DeliveryStrategy for AutoStrategy<A> {
    async fn subscribe(&self, subscription: Subscription, cancel: CancellationToken) -> Result<()> {
        let _transition = self.transition.lock().await;
        if self.using_polling() {
            return self.polling.subscribe(subscription, cancel).await;
        }

        match self.sse.subscribe(subscription.clone(), cancel.clone()).await {
            Ok(()) => Ok(()),
            Err(error @ (SyncError::AlreadySubscribed(_) | SyncError::Cancelled)) => Err(error),
            Err(error) => {
                warn!(%error, "event stream unavailable, falling back to polling");
                self.fall_back().await?;
                self.polling.subscribe(subscription, cancel).await
            }
        }
    }

    async fn unsubscribe(&self, inbox_id: &str) -> Result<()> {
        self.sse.unsubscribe(inbox_id).await?;
        self.polling.unsubscribe(inbox_id).await
    }

    fn is_connected(&self) -> bool {
        if self.using_polling() {
            self.polling.is_connected()
        } else {
            self.sse.is_connected()
        }
    }

    async fn dispose(&self) {
        self.sse.dispose().await;
        self.polling.dispose().await;
    }

    fn mode(&self) -> DeliveryMode {
        if self.using_polling() {
            DeliveryMode::Polling
        } else {
            DeliveryMode::Sse
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::api::memory::MemoryInboxApi;
    use crate::api::ApiError;
    use crate::config::{PollingConfig, SseConfig};
    use crate::metrics::memory::MemoryMetrics;
    use crate::testing::{address, record, recorded};

    fn config() -> SyncConfig {
        SyncConfig {
            sse: SseConfig {
                reconnect_interval: Duration::from_millis(100),
                jitter_factor: 0.0,
                ..SseConfig::default()
            },
            polling: PollingConfig {
                default_interval: Duration::from_secs(1),
                jitter_factor: 0.0,
                ..PollingConfig::default()
            },
        }
    }

    fn setup(inboxes: &[&str]) -> (Arc<MemoryInboxApi>, Arc<MemoryMetrics>, AutoStrategy<MemoryInboxApi>) {
        let api = MemoryInboxApi::new();
        for name in inboxes {
            api.create_inbox(&address(name), name);
        }
        let metrics = Arc::new(MemoryMetrics::new());
        let strategy = AutoStrategy::new(Arc::clone(&api), config(), metrics.clone());
        (api, metrics, strategy)
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefers_sse() {
        let (api, _metrics, strategy) = setup(&["a"]);
        let (subscription, mut recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        assert_eq!(strategy.mode(), DeliveryMode::Sse);
        assert!(strategy.is_connected());
        api.deliver(&address("a"), record("m1"));
        assert_eq!(recorder.next_event().await.unwrap().email_id, "m1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_falls_back_to_polling_on_first_failure() {
        let (api, metrics, strategy) = setup(&["a"]);
        api.fail_all_opens(Some(ApiError::Connection("refused".into())));
        let (subscription, mut recorder) = recorded("a");

        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();
        assert_eq!(strategy.mode(), DeliveryMode::Polling);
        assert!(strategy.is_connected());
        assert_eq!(metrics.count(names::AUTO_FALLBACKS), 1);

        api.store_silently(&address("a"), record("m1"));
        assert_eq!(recorder.next_event().await.unwrap().email_id, "m1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_is_one_way() {
        let (api, metrics, strategy) = setup(&["a", "b"]);
        api.fail_next_opens(1, ApiError::Connection("refused".into()));
        let (sub_a, _pa) = recorded("a");
        strategy.subscribe(sub_a, CancellationToken::new()).await.unwrap();
        assert_eq!(strategy.mode(), DeliveryMode::Polling);

        // the stream would open now, but the session stays on polling
        let (sub_b, _pb) = recorded("b");
        strategy.subscribe(sub_b, CancellationToken::new()).await.unwrap();
        assert_eq!(strategy.mode(), DeliveryMode::Polling);
        assert_eq!(api.open_attempts(), 1);
        assert_eq!(metrics.count(names::AUTO_FALLBACKS), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_does_not_fall_back() {
        let (_api, _metrics, strategy) = setup(&["a"]);
        let (first, _p1) = recorded("a");
        let (second, _p2) = recorded("a");
        strategy.subscribe(first, CancellationToken::new()).await.unwrap();

        let result = strategy.subscribe(second, CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::AlreadySubscribed(_))));
        assert_eq!(strategy.mode(), DeliveryMode::Sse);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_after_fallback() {
        let (api, _metrics, strategy) = setup(&["a"]);
        api.fail_all_opens(Some(ApiError::Connection("refused".into())));
        let (subscription, _recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        strategy.unsubscribe("a").await.unwrap();
        assert!(!strategy.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose() {
        let (_api, _metrics, strategy) = setup(&["a"]);
        let (subscription, _recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        strategy.dispose().await;
        assert!(!strategy.is_connected());
    }
}
