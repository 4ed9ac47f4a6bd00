//! Configuration for delivery strategies.

use std::time::Duration;

/// Which delivery strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Try SSE, fall back to polling for the rest of the session if the
    /// first connection fails.
    #[default]
    Auto,
    /// Server-sent events only.
    Sse,
    /// Polling only.
    Polling,
}

/// SSE reconnection behavior.
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Base delay for the exponential reconnect backoff.
    pub reconnect_interval: Duration,
    /// Reconnect attempts before giving up with a transport error.
    pub max_reconnect_attempts: u32,
    /// Cap on the backoff, as a multiple of `reconnect_interval`.
    pub max_backoff_multiplier: u32,
    /// Jitter added on top of each delay, as a fraction of it.
    pub jitter_factor: f64,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
            max_reconnect_attempts: 10,
            max_backoff_multiplier: 32,
            jitter_factor: 0.3,
        }
    }
}

/// Polling behavior.
#[derive(Debug, Clone)]
pub struct PollingConfig {
    /// Interval used when a subscription does not set its own.
    pub default_interval: Duration,
    /// Growth factor applied while the inbox hash is unchanged.
    pub backoff_multiplier: f64,
    /// Upper bound for the grown interval.
    pub max_backoff: Duration,
    pub jitter_factor: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(2),
            backoff_multiplier: 1.5,
            max_backoff: Duration::from_secs(30),
            jitter_factor: 0.3,
        }
    }
}

/// Configuration for all strategies.
#[derive(Debug, Clone, Default)]
pub struct SyncConfig {
    pub sse: SseConfig,
    pub polling: PollingConfig,
}
