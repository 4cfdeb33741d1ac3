//! Error types for park-link.

use std::time::Duration;
use thiserror::Error;

/// Result type for park-link operations.
pub type Result<T> = std::result::Result<T, ParkLinkError>;

/// Errors produced by the subscription client.
///
/// Transport-class failures (`TransportError`, `HandshakeTimeout`) are
/// recovered by the connection manager through reconnection and are only
/// surfaced through [`EventHandlers`](crate::EventHandlers). `BrokerError` is
/// the one failure delivered to subscription handles.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParkLinkError {
    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Broker error{}: {message}", on_destination(.destination))]
    BrokerError {
        destination: Option<String>,
        message: String,
        details: Option<String>,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ParkLinkError {
    /// Whether the connection manager retries after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ParkLinkError::TransportError(_)
                | ParkLinkError::HandshakeTimeout(_)
                | ParkLinkError::NotConnected
        )
    }

    /// Build a broker error from the headers and body of an ERROR frame.
    pub fn broker(
        destination: Option<String>,
        message: impl Into<String>,
        details: Option<String>,
    ) -> Self {
        ParkLinkError::BrokerError {
            destination,
            message: message.into(),
            details,
        }
    }
}

fn on_destination(destination: &Option<String>) -> String {
    destination
        .as_deref()
        .map(|d| format!(" on {}", d))
        .unwrap_or_default()
}

impl From<serde_json::Error> for ParkLinkError {
    fn from(err: serde_json::Error) -> Self {
        ParkLinkError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ParkLinkError {
    fn from(err: toml::de::Error) -> Self {
        ParkLinkError::ConfigurationError(format!("Failed to parse config file: {}", err))
    }
}

impl From<url::ParseError> for ParkLinkError {
    fn from(err: url::ParseError) -> Self {
        ParkLinkError::ConfigurationError(format!("Invalid endpoint URL: {}", err))
    }
}
