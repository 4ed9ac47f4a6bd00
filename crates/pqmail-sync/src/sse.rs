//! Push delivery over a single server-sent event stream.
//!
//! One stream carries events for every subscribed inbox. It is opened with
//! the full set of inbox ids and reopened whenever that set changes.
//!
//! ## Connection lifecycle
//!
//! - The first connection attempt fails fast: the error is returned from
//!   `subscribe` and the subscription is rolled back.
//! - Once a connection existed, a lost stream is retried with exponential
//!   backoff. A successful retry calls every `on_reconnected` callback once.
//!   After `max_reconnect_attempts` failed retries every subscription gets a
//!   terminal `Transport` error and the strategy resets.
//! - Each open stream is read by a driver task tied to a connection epoch.
//!   Reopening cancels the old epoch, so at most one driver reads at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::{ApiResult, EventStream, InboxApi};
use crate::backoff;
use crate::config::{DeliveryMode, SseConfig};
use crate::error::{Result, SyncError};
use crate::event_stream::{decode_event, EventStreamParser};
use crate::metrics::{names, SyncMetrics};
use crate::strategy::DeliveryStrategy;
use crate::subscription::{caller_cancelled, Registered, Subscription, SubscriptionRegistry};

/// Connection bookkeeping. Only touched under the strategy's mutex.
#[derive(Default)]
struct ConnectionState {
    reconnect_attempts: u32,
    had_previous_connection: bool,
    /// The stream was lost and has not been replaced yet.
    lost: bool,
    /// Token of the driver task currently owning the stream.
    epoch: Option<CancellationToken>,
}

struct SseInner<A> {
    api: Arc<A>,
    config: SseConfig,
    metrics: Arc<dyn SyncMetrics>,
    registry: SubscriptionRegistry,
    state: Mutex<ConnectionState>,
    connected: AtomicBool,
    shutdown: CancellationToken,
}

/// SSE delivery strategy.
pub struct SseStrategy<A> {
    inner: Arc<SseInner<A>>,
}

impl<A> Clone for SseStrategy<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: InboxApi> SseStrategy<A> {
    pub fn new(api: Arc<A>, config: SseConfig, metrics: Arc<dyn SyncMetrics>) -> Self {
        Self {
            inner: Arc::new(SseInner {
                api,
                config,
                metrics,
                registry: SubscriptionRegistry::new(),
                state: Mutex::new(ConnectionState::default()),
                connected: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Remove every subscription, returning them with their caller tokens.
    pub(crate) async fn take_subscriptions(&self) -> Vec<(Subscription, CancellationToken)> {
        let drained = self.inner.registry.drain();
        let mut state = self.inner.state.lock().await;
        self.inner.disconnect(&mut state);
        drained
    }

    fn watch_cancellation(&self, registered: Registered) {
        let strategy = self.clone();
        tokio::spawn(async move {
            if caller_cancelled(&registered).await {
                let inbox_id = registered.subscription.inbox_id().to_string();
                debug!(%inbox_id, "subscription cancelled by caller");
                let _ = strategy.unsubscribe(&inbox_id).await;
            }
        });
    }
}

impl<A: InboxApi> SseInner<A> {
    fn stop_driver(&self, state: &mut ConnectionState) {
        if let Some(epoch) = state.epoch.take() {
            epoch.cancel();
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Stop reading and forget all connection history.
    fn disconnect(&self, state: &mut ConnectionState) {
        self.stop_driver(state);
        *state = ConnectionState::default();
    }

    fn start_epoch(&self, state: &mut ConnectionState) -> CancellationToken {
        let epoch = self.shutdown.child_token();
        state.epoch = Some(epoch.clone());
        epoch
    }

    fn mark_connected(&self, state: &mut ConnectionState) {
        state.reconnect_attempts = 0;
        state.had_previous_connection = true;
        state.lost = false;
        self.connected.store(true, Ordering::SeqCst);
        self.metrics.counter(names::SSE_CONNECTS, 1);
    }

    /// Replace the current stream with one covering all registered inboxes.
    ///
    /// Returns `true` when the new stream ends an outage, in which case the
    /// caller owes the existing subscriptions their `on_reconnected` call.
    async fn reopen(self: &Arc<Self>, state: &mut ConnectionState) -> ApiResult<bool> {
        self.stop_driver(state);
        let inbox_ids = self.registry.ids();
        let stream = self.api.open_event_stream(&inbox_ids).await?;
        info!(inboxes = inbox_ids.len(), "event stream opened");

        let recovered = state.lost;
        self.mark_connected(state);
        let epoch = self.start_epoch(state);
        tokio::spawn(Arc::clone(self).drive(Some(stream), epoch));
        Ok(recovered)
    }

    /// Call `on_reconnected` once per subscription, skipping `except`.
    ///
    /// Must be called without the state lock held.
    async fn notify_reconnected(&self, except: Option<&str>) {
        for subscription in self.registry.all() {
            if Some(subscription.inbox_id()) != except {
                subscription.notify_reconnected().await;
            }
        }
    }

    /// Hand over to the reconnect loop in a fresh driver task.
    fn recover_in_background(self: &Arc<Self>, state: &mut ConnectionState) {
        self.stop_driver(state);
        let epoch = self.start_epoch(state);
        tokio::spawn(Arc::clone(self).drive(None, epoch));
    }

    /// Read `stream` until it ends, then reconnect, for as long as `epoch` lives.
    async fn drive(self: Arc<Self>, mut stream: Option<EventStream>, epoch: CancellationToken) {
        loop {
            if let Some(events) = stream.as_mut() {
                self.pump(events, &epoch).await;
            }
            if epoch.is_cancelled() {
                return;
            }

            stream = match self.reconnect(&epoch).await {
                Some(events) => Some(events),
                None => return,
            };
        }
    }

    async fn pump(&self, events: &mut EventStream, epoch: &CancellationToken) {
        let mut parser = EventStreamParser::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = epoch.cancelled() => return,
                next = events.next() => next,
            };
            match next {
                Some(Ok(chunk)) => {
                    for data in parser.feed(&chunk) {
                        self.dispatch(&data).await;
                    }
                }
                Some(Err(error)) => {
                    warn!(%error, "event stream failed");
                    return;
                }
                None => {
                    debug!("event stream ended");
                    return;
                }
            }
        }
    }

    async fn dispatch(&self, data: &str) {
        let event = match decode_event(data) {
            Ok(event) => event,
            Err(error) => {
                warn!(%error, "skipping undecodable event");
                self.metrics.counter(names::EVENTS_INVALID, 1);
                return;
            }
        };
        match self.registry.get(&event.inbox_id) {
            Some(subscription) => {
                self.metrics.counter(names::EMAILS_DELIVERED, 1);
                subscription.deliver(event).await;
            }
            None => debug!(inbox_id = %event.inbox_id, "event for unknown inbox"),
        }
    }

    /// Retry the stream with backoff. `None` when cancelled or exhausted.
    async fn reconnect(&self, epoch: &CancellationToken) -> Option<EventStream> {
        loop {
            let attempt = {
                let mut state = self.state.lock().await;
                if epoch.is_cancelled() {
                    return None;
                }
                state.lost = true;
                self.connected.store(false, Ordering::SeqCst);
                state.reconnect_attempts += 1;
                if state.reconnect_attempts > self.config.max_reconnect_attempts {
                    self.disconnect(&mut state);
                    drop(state);
                    self.give_up().await;
                    return None;
                }
                state.reconnect_attempts
            };

            let delay = backoff::exponential(
                self.config.reconnect_interval,
                attempt,
                self.config.max_backoff_multiplier,
                self.config.jitter_factor,
            );
            info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting event stream");
            self.metrics.counter(names::SSE_RECONNECTS, 1);
            tokio::select! {
                biased;
                _ = epoch.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }

            let mut state = self.state.lock().await;
            if epoch.is_cancelled() {
                return None;
            }
            let inbox_ids = self.registry.ids();
            match self.api.open_event_stream(&inbox_ids).await {
                Ok(events) => {
                    info!(attempt, inboxes = inbox_ids.len(), "event stream reconnected");
                    self.mark_connected(&mut state);
                    drop(state);
                    self.notify_reconnected(None).await;
                    return Some(events);
                }
                Err(error) => warn!(attempt, %error, "reconnect failed"),
            }
        }
    }

    async fn give_up(&self) {
        let attempts = self.config.max_reconnect_attempts;
        warn!(attempts, "event stream reconnect attempts exhausted");
        self.metrics.counter(names::SSE_GIVE_UPS, 1);

        let message = format!("event stream lost after {attempts} reconnect attempts");
        for (subscription, _) in self.registry.drain() {
            subscription.notify_error(SyncError::Transport(message.clone())).await;
        }
    }
}

#[async_trait]
impl<A: InboxApi> DeliveryStrategy for SseStrategy<A> {
    async fn subscribe(&self, subscription: Subscription, cancel: CancellationToken) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        let registered = self.inner.registry.insert(subscription, cancel)?;
        let inbox_id = registered.subscription.inbox_id().to_string();

        let mut state = self.inner.state.lock().await;
        let recovered = match self.inner.reopen(&mut state).await {
            Ok(recovered) => recovered,
            Err(error) => {
                if !state.had_previous_connection {
                    drop(state);
                    warn!(%inbox_id, %error, "event stream connection failed");
                    self.inner.registry.remove(&inbox_id);
                    return Err(error.into());
                }
                warn!(%inbox_id, %error, "event stream reopen failed, reconnecting in background");
                self.inner.recover_in_background(&mut state);
                false
            }
        };
        drop(state);

        if recovered {
            info!(%inbox_id, "subscribe replaced a lost event stream");
            self.inner.notify_reconnected(Some(&inbox_id)).await;
        }

        debug!(%inbox_id, "subscribed");
        self.watch_cancellation(registered);
        Ok(())
    }

    async fn unsubscribe(&self, inbox_id: &str) -> Result<()> {
        if self.inner.registry.remove(inbox_id).is_none() {
            return Ok(());
        }
        debug!(%inbox_id, "unsubscribed");

        let mut state = self.inner.state.lock().await;
        if self.inner.registry.is_empty() {
            self.inner.disconnect(&mut state);
            return Ok(());
        }
        if state.epoch.is_none() {
            return Ok(());
        }
        match self.inner.reopen(&mut state).await {
            Ok(true) => {
                drop(state);
                info!(%inbox_id, "unsubscribe replaced a lost event stream");
                self.inner.notify_reconnected(None).await;
            }
            Ok(false) => {}
            Err(error) => {
                warn!(%error, "event stream reopen failed, reconnecting in background");
                self.inner.recover_in_background(&mut state);
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    async fn dispose(&self) {
        self.inner.shutdown.cancel();
        self.inner.registry.clear();
        let mut state = self.inner.state.lock().await;
        self.inner.disconnect(&mut state);
    }

    fn mode(&self) -> DeliveryMode {
        DeliveryMode::Sse
    }
}
