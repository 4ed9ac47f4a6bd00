//! Helpers shared by the strategy tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pqmail_core::{Algorithms, EncryptedPayload};
use tokio::sync::mpsc;

use crate::api::{EmailEvent, EmailRecord};
use crate::error::SyncError;
use crate::subscription::Subscription;

pub(crate) fn payload() -> EncryptedPayload {
    EncryptedPayload {
        version: 1,
        algorithms: Algorithms::supported(),
        ct_kem: "AAAA".into(),
        nonce: "AAAA".into(),
        aad: "".into(),
        ciphertext: "AAAA".into(),
        signature: "AAAA".into(),
        server_sig_pk: "AAAA".into(),
    }
}

pub(crate) fn record(id: &str) -> EmailRecord {
    EmailRecord {
        id: id.to_string(),
        encrypted_metadata: payload(),
        encrypted_parsed: None,
    }
}

/// Everything a test subscription reports.
pub(crate) struct Recorder {
    pub events: mpsc::UnboundedReceiver<EmailEvent>,
    pub errors: mpsc::UnboundedReceiver<SyncError>,
    pub reconnects: Arc<AtomicUsize>,
}

impl Recorder {
    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub async fn next_event(&mut self) -> Option<EmailEvent> {
        tokio::time::timeout(Duration::from_secs(600), self.events.recv())
            .await
            .ok()
            .flatten()
    }

    pub async fn next_error(&mut self) -> Option<SyncError> {
        tokio::time::timeout(Duration::from_secs(600), self.errors.recv())
            .await
            .ok()
            .flatten()
    }
}

/// Route `tracing` output through the test harness. Repeated calls are no-ops.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A subscription for inbox `name` (address `name@example.test`) wired to a recorder.
pub(crate) fn recorded(name: &str) -> (Subscription, Recorder) {
    init_tracing();
    let (event_tx, events) = mpsc::unbounded_channel();
    let (error_tx, errors) = mpsc::unbounded_channel();
    let reconnects = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&reconnects);

    let subscription = Subscription::new(name, address(name), move |event| {
        let _ = event_tx.send(event);
        async { Ok(()) }
    })
    .on_reconnected(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    })
    .on_error(move |error| {
        let _ = error_tx.send(error);
        async { Ok(()) }
    });

    (subscription, Recorder { events, errors, reconnects })
}

pub(crate) fn address(name: &str) -> String {
    format!("{name}@example.test")
}

/// Yield to background tasks until `condition` holds, letting paused time advance.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..1000 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
