//! Inbox subscriptions and the registry each strategy owns.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::api::EmailEvent;
use crate::error::{Result, SyncError};

type EmailCallback = Arc<dyn Fn(EmailEvent) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ReconnectCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(SyncError) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// A request to receive email notifications for one inbox.
///
/// ```rust,no_run
/// use std::time::Duration;
/// use pqmail_sync::Subscription;
///
/// let subscription = Subscription::new("inbox-hash", "alice@example.test", |event| async move {
///     println!("new email {}", event.email_id);
///     Ok(())
/// })
/// .poll_interval(Duration::from_secs(5))
/// .on_error(|error| async move {
///     eprintln!("subscription failed: {error}");
///     Ok(())
/// });
/// ```
#[derive(Clone)]
pub struct Subscription {
    inbox_id: String,
    email_address: String,
    on_email: EmailCallback,
    on_reconnected: Option<ReconnectCallback>,
    on_error: Option<ErrorCallback>,
    poll_interval: Option<Duration>,
}

impl Subscription {
    /// Create a subscription. `inbox_id` is the inbox hash used in events.
    pub fn new<F, Fut>(inbox_id: impl Into<String>, email_address: impl Into<String>, on_email: F) -> Self
    where
        F: Fn(EmailEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            inbox_id: inbox_id.into(),
            email_address: email_address.into(),
            on_email: Arc::new(move |event| on_email(event).boxed()),
            on_reconnected: None,
            on_error: None,
            poll_interval: None,
        }
    }

    /// Called after the event stream recovers from a lost connection.
    pub fn on_reconnected<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_reconnected = Some(Arc::new(move || callback().boxed()));
        self
    }

    /// Called with background failures that end the subscription.
    pub fn on_error<F, Fut>(mut self, callback: F) -> Self
    where
        F: Fn(SyncError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_error = Some(Arc::new(move |error| callback(error).boxed()));
        self
    }

    /// Polling interval for this inbox; the strategy default when unset.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn inbox_id(&self) -> &str {
        &self.inbox_id
    }

    pub fn email_address(&self) -> &str {
        &self.email_address
    }

    pub fn interval(&self) -> Option<Duration> {
        self.poll_interval
    }

    /// Run the email callback. Failures are logged and isolated.
    pub(crate) async fn deliver(&self, event: EmailEvent) {
        let email_id = event.email_id.clone();
        if let Err(error) = (self.on_email)(event).await {
            warn!(inbox_id = %self.inbox_id, %email_id, %error, "email callback failed");
        }
    }

    pub(crate) async fn notify_reconnected(&self) {
        if let Some(callback) = &self.on_reconnected {
            if let Err(error) = callback().await {
                warn!(inbox_id = %self.inbox_id, %error, "reconnect callback failed");
            }
        }
    }

    pub(crate) async fn notify_error(&self, failure: SyncError) {
        match &self.on_error {
            Some(callback) => {
                if let Err(error) = callback(failure).await {
                    warn!(inbox_id = %self.inbox_id, %error, "error callback failed");
                }
            }
            None => warn!(inbox_id = %self.inbox_id, error = %failure, "subscription failed"),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("inbox_id", &self.inbox_id)
            .field("email_address", &self.email_address)
            .field("poll_interval", &self.poll_interval)
            .field("on_reconnected", &self.on_reconnected.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

struct Entry {
    subscription: Arc<Subscription>,
    /// The caller's token, kept for migration between strategies.
    cancel: CancellationToken,
    /// Cancelled when the entry leaves the registry.
    released: CancellationToken,
}

/// A subscription as held by a registry.
#[derive(Clone)]
pub struct Registered {
    pub subscription: Arc<Subscription>,
    pub cancel: CancellationToken,
    pub released: CancellationToken,
}

/// Subscriptions keyed by inbox id.
///
/// Every mutation takes the write lock, so insert and remove are atomic per
/// key. Removing an entry cancels its `released` token, which ends any task
/// serving it.
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Entry>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Entry>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscription. Fails if its inbox id is already present.
    pub fn insert(&self, subscription: Subscription, cancel: CancellationToken) -> Result<Registered> {
        let mut entries = self.write();
        let inbox_id = subscription.inbox_id().to_string();
        if entries.contains_key(&inbox_id) {
            return Err(SyncError::AlreadySubscribed(inbox_id));
        }

        let entry = Entry {
            subscription: Arc::new(subscription),
            cancel,
            released: CancellationToken::new(),
        };
        let registered = Registered {
            subscription: Arc::clone(&entry.subscription),
            cancel: entry.cancel.clone(),
            released: entry.released.clone(),
        };
        entries.insert(inbox_id, entry);
        Ok(registered)
    }

    /// Remove a subscription, releasing it. Unknown ids return `None`.
    pub fn remove(&self, inbox_id: &str) -> Option<Arc<Subscription>> {
        let entry = self.write().remove(inbox_id)?;
        entry.released.cancel();
        Some(entry.subscription)
    }

    pub fn get(&self, inbox_id: &str) -> Option<Arc<Subscription>> {
        self.read().get(inbox_id).map(|e| Arc::clone(&e.subscription))
    }

    pub fn contains(&self, inbox_id: &str) -> bool {
        self.read().contains_key(inbox_id)
    }

    /// Registered inbox ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn all(&self) -> Vec<Arc<Subscription>> {
        self.read().values().map(|e| Arc::clone(&e.subscription)).collect()
    }

    /// Remove and release every entry, returning subscriptions with their
    /// caller tokens.
    pub fn drain(&self) -> Vec<(Subscription, CancellationToken)> {
        let drained: Vec<Entry> = self.write().drain().map(|(_, entry)| entry).collect();
        drained
            .into_iter()
            .map(|entry| {
                entry.released.cancel();
                let subscription = Arc::try_unwrap(entry.subscription).unwrap_or_else(|shared| (*shared).clone());
                (subscription, entry.cancel)
            })
            .collect()
    }

    /// Remove and release every entry.
    pub fn clear(&self) {
        self.drain();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Wait until the subscription is released or the caller cancels.
///
/// Returns `true` when the caller cancelled while the subscription was still
/// registered.
pub(crate) async fn caller_cancelled(registered: &Registered) -> bool {
    tokio::select! {
        biased;
        _ = registered.released.cancelled() => false,
        _ = registered.cancel.cancelled() => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscription(inbox_id: &str) -> Subscription {
        Subscription::new(inbox_id, format!("{inbox_id}@example.test"), |_| async { Ok(()) })
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let registry = SubscriptionRegistry::new();
        registry.insert(subscription("a"), CancellationToken::new()).unwrap();

        let result = registry.insert(subscription("a"), CancellationToken::new());
        assert!(matches!(result, Err(SyncError::AlreadySubscribed(id)) if id == "a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_releases() {
        let registry = SubscriptionRegistry::new();
        let registered = registry.insert(subscription("a"), CancellationToken::new()).unwrap();

        assert!(!registered.released.is_cancelled());
        assert!(registry.remove("a").is_some());
        assert!(registered.released.is_cancelled());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reinsert_after_remove() {
        let registry = SubscriptionRegistry::new();
        let first = registry.insert(subscription("a"), CancellationToken::new()).unwrap();
        registry.remove("a");
        let second = registry.insert(subscription("a"), CancellationToken::new()).unwrap();

        assert!(first.released.is_cancelled());
        assert!(!second.released.is_cancelled());
    }

    #[test]
    fn test_ids_sorted() {
        let registry = SubscriptionRegistry::new();
        for id in ["c", "a", "b"] {
            registry.insert(subscription(id), CancellationToken::new()).unwrap();
        }
        assert_eq!(registry.ids(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_drain_keeps_caller_tokens() {
        let registry = SubscriptionRegistry::new();
        let cancel = CancellationToken::new();
        let registered = registry.insert(subscription("a"), cancel.clone()).unwrap();

        let drained = registry.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].0.inbox_id(), "a");
        cancel.cancel();
        assert!(drained[0].1.is_cancelled());
        assert!(registered.released.is_cancelled());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_caller_cancelled_distinguishes_release() {
        let registry = SubscriptionRegistry::new();
        let cancel = CancellationToken::new();

        let registered = registry.insert(subscription("a"), cancel.clone()).unwrap();
        cancel.cancel();
        assert!(caller_cancelled(&registered).await);

        let registered = registry.insert(subscription("b"), CancellationToken::new()).unwrap();
        registry.remove("b");
        assert!(!caller_cancelled(&registered).await);
    }

    #[tokio::test]
    async fn test_callback_failures_are_isolated() {
        let subscription = Subscription::new("a", "a@example.test", |_| async {
            Err(anyhow::anyhow!("handler exploded"))
        })
        .on_reconnected(|| async { Err(anyhow::anyhow!("boom")) });

        // neither call panics or propagates
        subscription.notify_reconnected().await;
        subscription.notify_error(SyncError::Transport("gone".into())).await;
    }
}
