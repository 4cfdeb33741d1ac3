use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Connection-level options: reconnection backoff and per-handle delivery.
///
/// # Example
///
/// ```rust
/// use park_link::ConnectionOptions;
///
/// let options = ConnectionOptions::default()
///     .with_reconnect_delay_ms(500)
///     .with_max_reconnect_delay_ms(10_000)
///     .with_queue_capacity(256);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Reconnect after an unexpected link loss.
    /// Default: true. Retries are unbounded until `disconnect()`.
    #[serde(default = "default_auto_reconnect")]
    pub auto_reconnect: bool,

    /// Delay before the first reconnection attempt; doubles per failure.
    /// Default: 1000ms
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Ceiling for the backoff delay.
    /// Default: 30000ms
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,

    /// Random spread applied to every backoff delay, as a ratio in `[0, 1]`.
    /// Default: 0.2 (±20%)
    #[serde(default = "default_reconnect_jitter")]
    pub reconnect_jitter: f64,

    /// Bounded queue size of each subscription handle. When full, the
    /// oldest undelivered message is discarded.
    /// Default: 1024
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Ask the broker for a RECEIPT on every SUBSCRIBE.
    /// Default: false
    #[serde(default)]
    pub request_receipts: bool,
}

fn default_auto_reconnect() -> bool {
    true
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30000
}

fn default_reconnect_jitter() -> f64 {
    0.2
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            auto_reconnect: default_auto_reconnect(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            reconnect_jitter: default_reconnect_jitter(),
            queue_capacity: default_queue_capacity(),
            request_receipts: false,
        }
    }
}

impl ConnectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_delay_ms(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    pub fn with_max_reconnect_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_reconnect_delay_ms = max_delay_ms;
        self
    }

    /// Set the jitter ratio. Values outside `[0, 1]` are clamped.
    pub fn with_reconnect_jitter(mut self, jitter: f64) -> Self {
        self.reconnect_jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the per-handle queue capacity (minimum 1).
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_request_receipts(mut self, enabled: bool) -> Self {
        self.request_receipts = enabled;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms.max(self.reconnect_delay_ms))
    }
}
