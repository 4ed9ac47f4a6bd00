//! Observability port.
//!
//! Strategies and the client report counters and durations through
//! [`SyncMetrics`]. Wiring it to a concrete telemetry backend is left to the
//! application; [`NoopMetrics`] discards everything.

use std::sync::Arc;

/// Metric names.
pub mod names {
    pub const SSE_CONNECTS: &str = "sse.connects";
    pub const SSE_RECONNECTS: &str = "sse.reconnects";
    pub const SSE_GIVE_UPS: &str = "sse.give_ups";
    pub const POLL_TICKS: &str = "poll.ticks";
    pub const POLL_ERRORS: &str = "poll.errors";
    pub const AUTO_FALLBACKS: &str = "auto.fallbacks";
    pub const EMAILS_DELIVERED: &str = "emails.delivered";
    pub const EVENTS_INVALID: &str = "events.invalid";
    pub const DECRYPT_FAILURES: &str = "decrypt.failures";
    pub const DECRYPT_DURATION_MS: &str = "decrypt.duration_ms";
}

/// Sink for counters and histograms.
pub trait SyncMetrics: Send + Sync + 'static {
    /// Add `value` to the counter `name`.
    fn counter(&self, name: &'static str, value: u64);

    /// Record one observation of `name`.
    fn histogram(&self, name: &'static str, value: f64);
}

/// Discards all metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl NoopMetrics {
    pub fn shared() -> Arc<dyn SyncMetrics> {
        Arc::new(NoopMetrics)
    }
}

impl SyncMetrics for NoopMetrics {
    fn counter(&self, _name: &'static str, _value: u64) {}

    fn histogram(&self, _name: &'static str, _value: f64) {}
}

/// Records metrics in memory. Used by tests.
pub mod memory {
    use super::SyncMetrics;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    pub struct MemoryMetrics {
        counters: Mutex<HashMap<&'static str, u64>>,
        histograms: Mutex<HashMap<&'static str, Vec<f64>>>,
    }

    impl MemoryMetrics {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn count(&self, name: &str) -> u64 {
            let counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            counters.get(name).copied().unwrap_or(0)
        }

        pub fn observations(&self, name: &str) -> Vec<f64> {
            let histograms = self.histograms.lock().unwrap_or_else(|e| e.into_inner());
            histograms.get(name).cloned().unwrap_or_default()
        }
    }

    impl SyncMetrics for MemoryMetrics {
        fn counter(&self, name: &'static str, value: u64) {
            let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
            *counters.entry(name).or_insert(0) += value;
        }

        fn histogram(&self, name: &'static str, value: f64) {
            let mut histograms = self.histograms.lock().unwrap_or_else(|e| e.into_inner());
            histograms.entry(name).or_default().push(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryMetrics;
    use super::*;

    #[test]
    fn test_memory_metrics_accumulate() {
        let metrics = MemoryMetrics::new();
        metrics.counter(names::SSE_RECONNECTS, 1);
        metrics.counter(names::SSE_RECONNECTS, 2);
        metrics.histogram(names::DECRYPT_DURATION_MS, 1.5);

        assert_eq!(metrics.count(names::SSE_RECONNECTS), 3);
        assert_eq!(metrics.count(names::POLL_TICKS), 0);
        assert_eq!(metrics.observations(names::DECRYPT_DURATION_MS), vec![1.5]);
    }
}
