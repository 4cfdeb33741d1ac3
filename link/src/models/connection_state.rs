//! Link state published by the connection manager.

use std::fmt;
use std::time::Duration;

/// Process-wide description of the broker link.
///
/// Observed through [`ParkLinkClient::state`](crate::ParkLinkClient::state)
/// and [`ParkLinkClient::state_changes`](crate::ParkLinkClient::state_changes).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link and no connect target.
    #[default]
    Disconnected,
    /// Transport open or handshake in flight.
    Connecting,
    /// Handshake completed; subscriptions are live.
    Connected,
    /// Waiting `next_delay` before connection attempt number `attempt`.
    Reconnecting { attempt: u32, next_delay: Duration },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    /// Short lowercase label (`"reconnecting"`), suitable for logs and UIs.
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting { .. } => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Reconnecting {
                attempt,
                next_delay,
            } => write!(
                f,
                "reconnecting (attempt {}, retry in {}ms)",
                attempt,
                next_delay.as_millis()
            ),
            other => f.write_str(other.label()),
        }
    }
}
