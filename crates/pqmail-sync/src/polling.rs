//! Pull delivery by polling each inbox's content hash.
//!
//! Every subscribed inbox gets its own task and timer. A tick asks for the
//! inbox hash; only when it changed is the listing fetched and unseen emails
//! emitted. Quiet inboxes back off linearly up to `max_backoff`; any change
//! snaps the interval back to the subscription's poll interval.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{ApiError, EmailEvent, InboxApi};
use crate::backoff;
use crate::config::{DeliveryMode, PollingConfig};
use crate::error::{Result, SyncError};
use crate::metrics::{names, SyncMetrics};
use crate::strategy::DeliveryStrategy;
use crate::subscription::{Registered, Subscription, SubscriptionRegistry};

/// Per-inbox polling state, owned by that inbox's task.
#[derive(Debug)]
struct SyncState {
    last_emails_hash: Option<String>,
    processed_email_ids: HashSet<String>,
    current_backoff: Duration,
}

impl SyncState {
    fn new(interval: Duration) -> Self {
        Self {
            last_emails_hash: None,
            processed_email_ids: HashSet::new(),
            current_backoff: interval,
        }
    }

    fn hash_changed(&self, hash: &str) -> bool {
        self.last_emails_hash.as_deref() != Some(hash)
    }

    /// Record an email id; `true` the first time it is seen.
    fn mark_processed(&mut self, email_id: &str) -> bool {
        self.processed_email_ids.insert(email_id.to_string())
    }
}

enum Tick {
    Changed,
    Unchanged,
    Failed,
    Gone(ApiError),
}

struct PollingInner<A> {
    api: Arc<A>,
    config: PollingConfig,
    metrics: Arc<dyn SyncMetrics>,
    registry: SubscriptionRegistry,
    shutdown: CancellationToken,
}

/// Polling delivery strategy.
pub struct PollingStrategy<A> {
    inner: Arc<PollingInner<A>>,
}

impl<A> Clone for PollingStrategy<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: InboxApi> PollingStrategy<A> {
    pub fn new(api: Arc<A>, config: PollingConfig, metrics: Arc<dyn SyncMetrics>) -> Self {
        Self {
            inner: Arc::new(PollingInner {
                api,
                config,
                metrics,
                registry: SubscriptionRegistry::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }
}

impl<A: InboxApi> PollingInner<A> {
    async fn poll_inbox(self: Arc<Self>, registered: Registered) {
        let subscription = Arc::clone(&registered.subscription);
        let inbox_id = subscription.inbox_id().to_string();
        let interval = subscription.interval().unwrap_or(self.config.default_interval);
        let mut state = SyncState::new(interval);
        debug!(%inbox_id, interval_ms = interval.as_millis() as u64, "polling started");

        loop {
            if registered.released.is_cancelled() {
                return;
            }
            match self.tick(&registered, &mut state).await {
                Tick::Changed => state.current_backoff = interval,
                Tick::Unchanged | Tick::Failed => {
                    state.current_backoff = backoff::linear(
                        state.current_backoff,
                        self.config.backoff_multiplier,
                        self.config.max_backoff,
                        self.config.jitter_factor,
                    );
                }
                Tick::Gone(error) => {
                    warn!(%inbox_id, %error, "inbox no longer exists, polling stopped");
                    if !registered.released.is_cancelled() {
                        self.registry.remove(&inbox_id);
                        subscription.notify_error(SyncError::InboxGone(inbox_id.clone())).await;
                    }
                    return;
                }
            }

            tokio::select! {
                biased;
                _ = registered.released.cancelled() => return,
                _ = self.shutdown.cancelled() => return,
                _ = registered.cancel.cancelled() => {
                    debug!(%inbox_id, "subscription cancelled by caller");
                    self.registry.remove(&inbox_id);
                    return;
                }
                _ = tokio::time::sleep(state.current_backoff) => {}
            }
        }
    }

    async fn tick(&self, registered: &Registered, state: &mut SyncState) -> Tick {
        let subscription = &registered.subscription;
        let email_address = subscription.email_address();
        self.metrics.counter(names::POLL_TICKS, 1);

        let status = match self.api.get_inbox_sync(email_address).await {
            Ok(status) => status,
            Err(error) => return self.failed(subscription.inbox_id(), error),
        };
        if !state.hash_changed(&status.emails_hash) {
            return Tick::Unchanged;
        }

        let records = match self.api.get_emails(email_address, false).await {
            Ok(records) => records,
            Err(error) => return self.failed(subscription.inbox_id(), error),
        };
        debug!(
            inbox_id = %subscription.inbox_id(),
            email_count = status.email_count,
            "inbox changed"
        );
        state.last_emails_hash = Some(status.emails_hash);

        for record in records {
            if registered.released.is_cancelled() {
                break;
            }
            if !state.mark_processed(&record.id) {
                continue;
            }
            let event = EmailEvent {
                inbox_id: subscription.inbox_id().to_string(),
                email_id: record.id,
                encrypted_metadata: record.encrypted_metadata,
            };
            self.metrics.counter(names::EMAILS_DELIVERED, 1);
            subscription.deliver(event).await;
        }
        Tick::Changed
    }

    fn failed(&self, inbox_id: &str, error: ApiError) -> Tick {
        if error.is_not_found() {
            return Tick::Gone(error);
        }
        warn!(%inbox_id, %error, "poll failed, backing off");
        self.metrics.counter(names::POLL_ERRORS, 1);
        Tick::Failed
    }
}

#[async_trait]
impl<A: InboxApi> DeliveryStrategy for PollingStrategy<A> {
    async fn subscribe(&self, subscription: Subscription, cancel: CancellationToken) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let registered = self.inner.registry.insert(subscription, cancel)?;
        debug!(inbox_id = %registered.subscription.inbox_id(), "subscribed");
        tokio::spawn(Arc::clone(&self.inner).poll_inbox(registered));
        Ok(())
    }

    async fn unsubscribe(&self, inbox_id: &str) -> Result<()> {
        if self.inner.registry.remove(inbox_id).is_some() {
            debug!(%inbox_id, "unsubscribed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.inner.shutdown.is_cancelled() && !self.inner.registry.is_empty()
    }

    async fn dispose(&self) {
        self.inner.shutdown.cancel();
        self.inner.registry.clear();
    }

    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Polling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::api::memory::MemoryInboxApi;
    use crate::metrics::NoopMetrics;
    use crate::testing::{address, eventually, record, recorded};

    fn config() -> PollingConfig {
        PollingConfig {
            default_interval: Duration::from_secs(2),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_secs(30),
            jitter_factor: 0.0,
        }
    }

    fn setup(inboxes: &[&str]) -> (Arc<MemoryInboxApi>, PollingStrategy<MemoryInboxApi>) {
        let api = MemoryInboxApi::new();
        for name in inboxes {
            api.create_inbox(&address(name), name);
        }
        let strategy = PollingStrategy::new(Arc::clone(&api), config(), NoopMetrics::shared());
        (api, strategy)
    }

    #[test]
    fn test_sync_state_dedup() {
        let mut state = SyncState::new(Duration::from_secs(1));
        assert!(state.hash_changed("h1"));
        state.last_emails_hash = Some("h1".into());
        assert!(!state.hash_changed("h1"));
        assert!(state.hash_changed("h2"));

        assert!(state.mark_processed("m1"));
        assert!(!state.mark_processed("m1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_email_emitted_once() {
        let (api, strategy) = setup(&["a"]);
        let (subscription, mut recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        api.store_silently(&address("a"), record("m1"));
        assert_eq!(recorder.next_event().await.unwrap().email_id, "m1");

        // m1 stays in the listing when m2 arrives
        api.store_silently(&address("a"), record("m2"));
        assert_eq!(recorder.next_event().await.unwrap().email_id, "m2");

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(recorder.events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_emails_emitted_on_first_tick() {
        let (api, strategy) = setup(&["a"]);
        api.store_silently(&address("a"), record("old"));
        let (subscription, mut recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        assert_eq!(recorder.next_event().await.unwrap().email_id, "old");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unchanged_hash_backs_off() {
        let (api, strategy) = setup(&["a"]);
        let (subscription, _recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        // the first tick sees a new hash; after that 2s, then 3s, 4.5s...
        assert!(eventually(|| api.sync_calls() == 1).await);
        tokio::time::sleep(Duration::from_millis(1_980)).await;
        assert_eq!(api.sync_calls(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.sync_calls(), 2);
        tokio::time::sleep(Duration::from_millis(2_980)).await;
        assert_eq!(api.sync_calls(), 2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.sync_calls(), 3);
        assert_eq!(api.list_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_caps_at_max() {
        let (api, strategy) = setup(&["a"]);
        let (subscription, _recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        // long enough for the interval to reach the 30s cap
        tokio::time::sleep(Duration::from_secs(300)).await;
        let before = api.sync_calls();
        tokio::time::sleep(Duration::from_secs(301)).await;
        let ticks = api.sync_calls() - before;
        assert!((10..=11).contains(&ticks), "ticks = {ticks}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_resets_interval() {
        let (api, strategy) = setup(&["a"]);
        let (subscription, mut recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        api.store_silently(&address("a"), record("m1"));
        assert_eq!(recorder.next_event().await.unwrap().email_id, "m1");

        // back at the 2s interval right after the change
        let before = api.sync_calls();
        tokio::time::sleep(Duration::from_millis(2_010)).await;
        assert_eq!(api.sync_calls(), before + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbox_gone_surfaces_error_and_stops() {
        let (api, strategy) = setup(&["a"]);
        let (subscription, mut recorder) = recorded("a");
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();
        assert!(eventually(|| api.sync_calls() == 1).await);

        api.delete_inbox(&address("a"));
        let error = recorder.next_error().await.unwrap();
        assert!(matches!(error, SyncError::InboxGone(id) if id == "a"));
        assert!(!strategy.is_connected());

        let calls = api.sync_calls();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.sync_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_poll_interval() {
        let (api, strategy) = setup(&["a"]);
        let (subscription, _recorder) = recorded("a");
        let subscription = subscription.poll_interval(Duration::from_secs(10));
        strategy.subscribe(subscription, CancellationToken::new()).await.unwrap();

        assert!(eventually(|| api.sync_calls() == 1).await);
        tokio::time::sleep(Duration::from_millis(9_980)).await;
        assert_eq!(api.sync_calls(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(api.sync_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_and_cancel_stop_polling() {
        let (api, strategy) = setup(&["a", "b"]);
        let (sub_a, _pa) = recorded("a");
        let (sub_b, _pb) = recorded("b");
        let cancel_b = CancellationToken::new();
        strategy.subscribe(sub_a, CancellationToken::new()).await.unwrap();
        strategy.subscribe(sub_b, cancel_b.clone()).await.unwrap();
        assert!(eventually(|| api.sync_calls() == 2).await);

        strategy.unsubscribe("a").await.unwrap();
        cancel_b.cancel();
        assert!(eventually(|| !strategy.is_connected()).await);

        let calls = api.sync_calls();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(api.sync_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_subscribe_rejected() {
        let (_api, strategy) = setup(&["a"]);
        let (first, _p1) = recorded("a");
        let (second, _p2) = recorded("a");
        strategy.subscribe(first, CancellationToken::new()).await.unwrap();

        let result = strategy.subscribe(second, CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::AlreadySubscribed(_))));
    }
}
