//! Client configuration.

use std::time::Duration;

use pqmail_sync::{DeliveryMode, SyncConfig};

/// Configuration for the [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Which delivery strategy to run.
    pub delivery_mode: DeliveryMode,
    /// Strategy tuning.
    pub sync: SyncConfig,
    /// Default timeout for `wait_for_email`.
    pub wait_timeout: Duration,
    /// Poll interval applied to every subscription; the polling default when unset.
    pub poll_interval: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Auto,
            sync: SyncConfig::default(),
            wait_timeout: Duration::from_secs(30),
            poll_interval: None,
        }
    }
}
