//! Timeout configuration for the subscription client.
//!
//! Groups every deadline the connection manager enforces: transport open,
//! broker handshake, outbound sends and the heartbeat window.

use std::time::Duration;

/// Timeout configuration for park-link.
///
/// # Examples
///
/// ```rust
/// use park_link::ParkLinkTimeouts;
/// use std::time::Duration;
///
/// // Defaults
/// let timeouts = ParkLinkTimeouts::default();
///
/// // Slow broker behind a proxy
/// let timeouts = ParkLinkTimeouts::builder()
///     .handshake_timeout(Duration::from_secs(20))
///     .heartbeat_interval_secs(30)
///     .build();
///
/// // Local development
/// let timeouts = ParkLinkTimeouts::fast();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ParkLinkTimeouts {
    /// Timeout for opening the transport (TCP + TLS + WebSocket upgrade).
    /// Default: 10 seconds
    pub connection_timeout: Duration,

    /// Maximum wait for CONNECTED after CONNECT was sent.
    /// Default: 10 seconds
    pub handshake_timeout: Duration,

    /// Timeout for handing one frame to the transport.
    /// Default: 10 seconds
    pub send_timeout: Duration,

    /// Interval between outbound heartbeats while connected.
    /// Set to 0 to disable heartbeats and the inbound watchdog.
    /// Default: 10 seconds
    pub heartbeat_interval: Duration,

    /// The link is considered dead after `heartbeat_interval * heartbeat_tolerance`
    /// without any inbound traffic.
    /// Default: 3
    pub heartbeat_tolerance: u32,
}

impl Default for ParkLinkTimeouts {
    fn default() -> Self {
        Self {
            connection_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
            heartbeat_tolerance: 3,
        }
    }
}

impl ParkLinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> ParkLinkTimeoutsBuilder {
        ParkLinkTimeoutsBuilder::new()
    }

    /// Short timeouts for a broker on localhost.
    pub fn fast() -> Self {
        Self {
            connection_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            heartbeat_tolerance: 3,
        }
    }

    /// Long timeouts for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            connection_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_tolerance: 4,
        }
    }

    /// Timeouts for tests: heartbeats disabled, handshake bounded by `handshake_secs`.
    pub fn for_testing(handshake_secs: u64) -> Self {
        Self {
            connection_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(handshake_secs),
            send_timeout: Duration::from_secs(5),
            heartbeat_interval: Duration::ZERO,
            heartbeat_tolerance: 3,
        }
    }

    /// How long the inbound side may stay silent before the link is dropped.
    /// `None` when heartbeats are disabled.
    pub fn watchdog_window(&self) -> Option<Duration> {
        if Self::is_no_timeout(self.heartbeat_interval) {
            return None;
        }
        Some(self.heartbeat_interval.saturating_mul(self.heartbeat_tolerance.max(1)))
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }
}

/// Builder for [`ParkLinkTimeouts`].
#[derive(Debug, Clone)]
pub struct ParkLinkTimeoutsBuilder {
    timeouts: ParkLinkTimeouts,
}

impl ParkLinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: ParkLinkTimeouts::default(),
        }
    }

    /// Set the transport open timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_timeout = timeout;
        self
    }

    /// Set the transport open timeout in seconds.
    pub fn connection_timeout_secs(self, secs: u64) -> Self {
        self.connection_timeout(Duration::from_secs(secs))
    }

    /// Set the CONNECT → CONNECTED timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake_timeout = timeout;
        self
    }

    pub fn handshake_timeout_secs(self, secs: u64) -> Self {
        self.handshake_timeout(Duration::from_secs(secs))
    }

    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.send_timeout = timeout;
        self
    }

    pub fn send_timeout_secs(self, secs: u64) -> Self {
        self.send_timeout(Duration::from_secs(secs))
    }

    /// Set the heartbeat interval. Zero disables heartbeats.
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.timeouts.heartbeat_interval = interval;
        self
    }

    pub fn heartbeat_interval_secs(self, secs: u64) -> Self {
        self.heartbeat_interval(Duration::from_secs(secs))
    }

    /// Set how many silent heartbeat intervals are tolerated.
    pub fn heartbeat_tolerance(mut self, multiplier: u32) -> Self {
        self.timeouts.heartbeat_tolerance = multiplier;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> ParkLinkTimeouts {
        self.timeouts
    }
}
