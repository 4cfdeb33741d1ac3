//! Transport seam.
//!
//! The connection manager only needs a full-duplex channel of text
//! messages. [`Transport::open`] produces one as a pair of tokio channels:
//! the manager writes encoded frames into [`TransportLink::outbound`] and
//! reads [`TransportEvent`]s from [`TransportLink::inbound`]. Dropping the
//! outbound sender closes the underlying connection.
//!
//! - [`websocket`]: production implementation over tokio-tungstenite

pub mod websocket;

use async_trait::async_trait;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{ParkLinkError, Result};
use crate::event_handlers::DisconnectReason;

pub use websocket::WebSocketTransport;

/// Path the parking broker serves its STOMP-over-WebSocket endpoint on.
pub const DEFAULT_ENDPOINT_PATH: &str = "/ws";

/// Inbound side of an open transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One text message; may hold a partial frame, several frames or
    /// heartbeats.
    Message(String),
    /// The peer closed the connection.
    Closed(DisconnectReason),
    /// The connection failed. No further events follow.
    Error(String),
}

/// An open full-duplex text channel.
#[derive(Debug)]
pub struct TransportLink {
    pub outbound: mpsc::Sender<String>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Opens connections to the broker.
///
/// Implementations must be cheap to call repeatedly: the connection manager
/// calls `open` once per connection attempt.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn open(&self, endpoint: &Url) -> Result<TransportLink>;
}

/// Turn a configured endpoint into the WebSocket URL to dial.
///
/// `http(s)` maps to `ws(s)`. A URL without a path gets
/// [`DEFAULT_ENDPOINT_PATH`]. Credentials, query strings and fragments are
/// rejected: credentials travel in the CONNECT frame.
pub fn resolve_endpoint(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim()).map_err(|e| {
        ParkLinkError::ConfigurationError(format!("Invalid endpoint '{}': {}", raw, e))
    })?;

    let ws_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(ParkLinkError::ConfigurationError(format!(
                "Unsupported endpoint scheme '{}'; expected http(s) or ws(s)",
                other
            )));
        },
    };

    if url.host_str().is_none() {
        return Err(ParkLinkError::ConfigurationError(
            "endpoint must include a host".to_string(),
        ));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ParkLinkError::ConfigurationError(
            "endpoint must not include username/password credentials".to_string(),
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(ParkLinkError::ConfigurationError(
            "endpoint must not include query parameters or fragments".to_string(),
        ));
    }

    url.set_scheme(ws_scheme).map_err(|_| {
        ParkLinkError::ConfigurationError("Failed to set WebSocket URL scheme".to_string())
    })?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(DEFAULT_ENDPOINT_PATH);
    }
    Ok(url)
}
