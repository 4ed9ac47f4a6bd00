//! The client: decrypting inbox access and real-time delivery.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pqmail_core::{decrypt, EncryptedPayload};
use pqmail_sync::metrics::names;
use pqmail_sync::{
    build_strategy, DeliveryMode, DeliveryStrategy, EmailEvent, EmailRecord, InboxApi,
    NoopMetrics, Subscription, SyncError, SyncMetrics,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::filter::EmailFilter;
use crate::inbox::{Email, EmailMetadata, Inbox};

struct ClientInner<A> {
    api: Arc<A>,
    metrics: Arc<dyn SyncMetrics>,
}

impl<A: InboxApi> ClientInner<A> {
    fn decrypt(&self, inbox: &Inbox, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        let started = Instant::now();
        let outcome = decrypt(payload, inbox.keypair().secret_key(), inbox.server_sig_pk());
        self.metrics.histogram(
            names::DECRYPT_DURATION_MS,
            started.elapsed().as_secs_f64() * 1000.0,
        );

        outcome.map_err(|error| {
            self.metrics.counter(names::DECRYPT_FAILURES, 1);
            if error.is_critical() {
                warn!(inbox = %inbox.email_address(), %error, "payload rejected, possible tampering");
            } else {
                debug!(inbox = %inbox.email_address(), %error, "payload rejected");
            }
            ClientError::Decrypt(error)
        })
    }

    fn open_metadata(&self, inbox: &Inbox, email_id: &str, payload: &EncryptedPayload) -> Result<Email> {
        let metadata: EmailMetadata = serde_json::from_slice(&self.decrypt(inbox, payload)?)?;
        Ok(Email {
            id: email_id.to_string(),
            inbox_id: inbox.inbox_id(),
            metadata,
            parsed: None,
        })
    }

    fn open_record(&self, inbox: &Inbox, record: &EmailRecord) -> Result<Email> {
        let mut email = self.open_metadata(inbox, &record.id, &record.encrypted_metadata)?;
        if let Some(parsed) = &record.encrypted_parsed {
            email.parsed = Some(serde_json::from_slice(&self.decrypt(inbox, parsed)?)?);
        }
        Ok(email)
    }

    fn open_event(&self, inbox: &Inbox, event: &EmailEvent) -> Result<Email> {
        self.open_metadata(inbox, &event.email_id, &event.encrypted_metadata)
    }
}

/// Client for encrypted inboxes.
///
/// Decrypts emails with each inbox's own key and delivers new arrivals through
/// the configured [`DeliveryMode`].
pub struct Client<A: InboxApi> {
    inner: Arc<ClientInner<A>>,
    strategy: Arc<dyn DeliveryStrategy>,
    config: ClientConfig,
}

impl<A: InboxApi> Client<A> {
    /// Create a client with no metrics.
    pub fn new(api: Arc<A>, config: ClientConfig) -> Self {
        Self::with_metrics(api, config, NoopMetrics::shared())
    }

    /// Create a client reporting to `metrics`.
    pub fn with_metrics(api: Arc<A>, config: ClientConfig, metrics: Arc<dyn SyncMetrics>) -> Self {
        let strategy = build_strategy(
            config.delivery_mode,
            Arc::clone(&api),
            config.sync.clone(),
            Arc::clone(&metrics),
        );
        Self {
            inner: Arc::new(ClientInner { api, metrics }),
            strategy,
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decryption
    // ─────────────────────────────────────────────────────────────────────────

    /// Decrypt a payload addressed to `inbox`.
    pub fn decrypt(&self, inbox: &Inbox, payload: &EncryptedPayload) -> Result<Vec<u8>> {
        self.inner.decrypt(inbox, payload)
    }

    /// Decrypt a listing record, including its content when present.
    pub fn open_email(&self, inbox: &Inbox, record: &EmailRecord) -> Result<Email> {
        self.inner.open_record(inbox, record)
    }

    /// Decrypt the metadata carried by an arrival event.
    pub fn open_event(&self, inbox: &Inbox, event: &EmailEvent) -> Result<Email> {
        self.inner.open_event(inbox, event)
    }

    /// Fetch and decrypt every email in the inbox, with content.
    pub async fn list_emails(&self, inbox: &Inbox) -> Result<Vec<Email>> {
        let records = self.inner.api.get_emails(inbox.email_address(), true).await?;
        records
            .iter()
            .map(|record| self.inner.open_record(inbox, record))
            .collect()
    }

    /// Fetch and decrypt one email by id, with content.
    pub async fn get_email(&self, inbox: &Inbox, email_id: &str) -> Result<Option<Email>> {
        let records = self.inner.api.get_emails(inbox.email_address(), true).await?;
        records
            .iter()
            .find(|record| record.id == email_id)
            .map(|record| self.inner.open_record(inbox, record))
            .transpose()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delivery
    // ─────────────────────────────────────────────────────────────────────────

    fn subscription<F, Fut>(&self, inbox: &Inbox, on_email: F) -> Subscription
    where
        F: Fn(EmailEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let subscription = Subscription::new(inbox.inbox_id(), inbox.email_address(), on_email);
        match self.config.poll_interval {
            Some(interval) => subscription.poll_interval(interval),
            None => subscription,
        }
    }

    /// Deliver each new email of `inbox` to `handler`, decrypted.
    ///
    /// Emails that fail to decrypt and terminal delivery failures reach the
    /// handler as errors. Cancelling `cancel` ends the subscription.
    pub async fn subscribe<F, Fut>(&self, inbox: &Inbox, handler: F, cancel: CancellationToken) -> Result<()>
    where
        F: Fn(Result<Email>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let shared_inbox = Arc::new(inbox.clone());

        let on_email = {
            let inner = Arc::clone(&self.inner);
            let handler = Arc::clone(&handler);
            move |event: EmailEvent| (*handler)(inner.open_event(&shared_inbox, &event))
        };
        let on_error = move |error: SyncError| (*handler)(Err(ClientError::Sync(error)));

        let subscription = self.subscription(inbox, on_email).on_error(on_error);
        self.strategy.subscribe(subscription, cancel).await?;
        Ok(())
    }

    /// Stop delivering emails for `inbox`.
    pub async fn unsubscribe(&self, inbox: &Inbox) -> Result<()> {
        self.strategy.unsubscribe(&inbox.inbox_id()).await?;
        Ok(())
    }

    /// Watch `inbox` for new emails.
    ///
    /// Each email id is yielded once. After the event stream recovers from a
    /// lost connection, the listing is fetched again and emails missed while
    /// disconnected are yielded. Dropping the watch ends the subscription.
    pub async fn watch(&self, inbox: &Inbox, cancel: CancellationToken) -> Result<EmailWatch> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let seen = SeenIds::default();
        let sink = Arc::new(WatchSink {
            sender,
            seen: seen.clone(),
        });
        let shared_inbox = Arc::new(inbox.clone());

        let on_email = {
            let inner = Arc::clone(&self.inner);
            let inbox = Arc::clone(&shared_inbox);
            let sink = Arc::clone(&sink);
            move |event: EmailEvent| {
                if sink.seen.insert(&event.email_id) {
                    sink.send(inner.open_event(&inbox, &event));
                }
                async { Ok(()) }
            }
        };
        let on_reconnected = {
            let inner = Arc::clone(&self.inner);
            let inbox = Arc::clone(&shared_inbox);
            let sink = Arc::clone(&sink);
            move || resync(Arc::clone(&inner), Arc::clone(&inbox), Arc::clone(&sink))
        };
        let on_error = {
            let sink = Arc::clone(&sink);
            move |error: SyncError| {
                sink.send(Err(ClientError::Sync(error)));
                async { Ok(()) }
            }
        };

        let watch_cancel = cancel.child_token();
        let subscription = self
            .subscription(inbox, on_email)
            .on_reconnected(on_reconnected)
            .on_error(on_error);
        self.strategy.subscribe(subscription, watch_cancel.clone()).await?;

        Ok(EmailWatch {
            inbox_id: inbox.inbox_id(),
            receiver,
            seen,
            cancel: watch_cancel,
        })
    }

    /// Wait for an email matching `filter`.
    ///
    /// Subscribes first, then checks the emails already in the inbox, then
    /// waits for arrivals. Fails with `Timeout` after `timeout`, or the
    /// configured `wait_timeout` when `None`.
    pub async fn wait_for_email(
        &self,
        inbox: &Inbox,
        filter: &EmailFilter,
        timeout: Option<Duration>,
    ) -> Result<Email> {
        let timeout = timeout.unwrap_or(self.config.wait_timeout);
        let inbox_id = inbox.inbox_id();
        let mut watch = self.watch(inbox, CancellationToken::new()).await?;

        let outcome = tokio::time::timeout(timeout, self.find_email(inbox, filter, &mut watch)).await;
        if let Err(error) = self.strategy.unsubscribe(&inbox_id).await {
            debug!(%inbox_id, %error, "unsubscribe after wait failed");
        }
        drop(watch);

        match outcome {
            Ok(result) => result,
            Err(_) => {
                info!(%inbox_id, timeout_ms = timeout.as_millis() as u64, "no matching email arrived");
                Err(ClientError::Timeout(timeout))
            }
        }
    }

    async fn find_email(&self, inbox: &Inbox, filter: &EmailFilter, watch: &mut EmailWatch) -> Result<Email> {
        for email in self.list_emails(inbox).await? {
            watch.seen.insert(&email.id);
            if filter.matches(&email) {
                return Ok(email);
            }
        }

        while let Some(next) = watch.next().await {
            let email = next?;
            if filter.matches(&email) {
                return self.with_content(inbox, email).await;
            }
        }
        Err(SyncError::Cancelled.into())
    }

    /// Events carry metadata only; fetch the content if the email is listed.
    async fn with_content(&self, inbox: &Inbox, email: Email) -> Result<Email> {
        if email.parsed.is_some() {
            return Ok(email);
        }
        Ok(self.get_email(inbox, &email.id).await?.unwrap_or(email))
    }

    /// Whether the active strategy can currently deliver.
    pub fn is_connected(&self) -> bool {
        self.strategy.is_connected()
    }

    /// The strategy currently delivering events.
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.strategy.mode()
    }

    /// Stop all delivery and drop every subscription.
    pub async fn dispose(&self) {
        self.strategy.dispose().await;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Watch
// ─────────────────────────────────────────────────────────────────────────────

/// Email ids a watch has already yielded.
#[derive(Clone, Default)]
struct SeenIds(Arc<Mutex<HashSet<String>>>);

impl SeenIds {
    /// `true` the first time an id is inserted.
    fn insert(&self, email_id: &str) -> bool {
        let mut seen = self.0.lock().unwrap_or_else(|e| e.into_inner());
        seen.insert(email_id.to_string())
    }
}

/// Sending half of a watch, owned by its subscription callbacks.
struct WatchSink {
    sender: mpsc::UnboundedSender<Result<Email>>,
    seen: SeenIds,
}

impl WatchSink {
    fn send(&self, email: Result<Email>) {
        // the receiver is gone once the watch is dropped
        let _ = self.sender.send(email);
    }
}

async fn resync<A: InboxApi>(
    inner: Arc<ClientInner<A>>,
    inbox: Arc<Inbox>,
    sink: Arc<WatchSink>,
) -> anyhow::Result<()> {
    let records = inner.api.get_emails(inbox.email_address(), false).await?;
    let mut recovered = 0usize;
    for record in &records {
        if sink.seen.insert(&record.id) {
            sink.send(inner.open_record(&inbox, record));
            recovered += 1;
        }
    }
    info!(inbox = %inbox.email_address(), recovered, "resynchronized after reconnect");
    Ok(())
}

/// New emails of one inbox, each id at most once.
pub struct EmailWatch {
    inbox_id: String,
    receiver: mpsc::UnboundedReceiver<Result<Email>>,
    seen: SeenIds,
    cancel: CancellationToken,
}

impl EmailWatch {
    pub fn inbox_id(&self) -> &str {
        &self.inbox_id
    }

    /// The next email, or `None` once the subscription has ended.
    pub async fn next(&mut self) -> Option<Result<Email>> {
        self.receiver.recv().await
    }
}

impl Drop for EmailWatch {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
