//! WebSocket transport over tokio-tungstenite.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::{header::SEC_WEBSOCKET_PROTOCOL, HeaderValue},
    protocol::Message,
};
use url::Url;

use super::{Transport, TransportEvent, TransportLink};
use crate::error::{ParkLinkError, Result};
use crate::event_handlers::DisconnectReason;

/// Subprotocol offered during the upgrade.
pub const STOMP_SUBPROTOCOL: &str = "v12.stomp";

/// Maximum inbound message size (16 MiB).
pub(crate) const MAX_WS_MESSAGE_BYTES: usize = 16 << 20;

const OUTBOUND_CHANNEL_CAPACITY: usize = 256;
const INBOUND_CHANNEL_CAPACITY: usize = 1024;

/// Production [`Transport`]: one WebSocket per connection attempt, with a
/// pump task moving messages between the socket and the link channels.
/// WebSocket-level Ping is answered here; the connection manager never sees
/// it.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    subprotocol: Option<String>,
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self {
            subprotocol: Some(STOMP_SUBPROTOCOL.to_string()),
        }
    }
}

impl WebSocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a different subprotocol, or none at all.
    pub fn with_subprotocol(mut self, subprotocol: Option<String>) -> Self {
        self.subprotocol = subprotocol;
        self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, endpoint: &Url) -> Result<TransportLink> {
        log::debug!("[park-link] Opening WebSocket to {}", endpoint);

        let mut request = endpoint.as_str().into_client_request().map_err(|e| {
            ParkLinkError::TransportError(format!("Failed to build WebSocket request: {}", e))
        })?;
        if let Some(protocol) = &self.subprotocol {
            let value = HeaderValue::from_str(protocol).map_err(|e| {
                ParkLinkError::ConfigurationError(format!(
                    "Invalid WebSocket subprotocol '{}': {}",
                    protocol, e
                ))
            })?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        let (ws_stream, _response) = match tokio_tungstenite::connect_async(request).await {
            Ok(ok) => ok,
            Err(tokio_tungstenite::tungstenite::error::Error::Http(response)) => {
                let status = response.status();
                let message = match status.as_u16() {
                    401 => "Unauthorized: WebSocket upgrade rejected".to_string(),
                    403 => "Forbidden: Access to WebSocket denied".to_string(),
                    code => format!("WebSocket HTTP error: {}", code),
                };
                return Err(ParkLinkError::TransportError(message));
            },
            Err(e) => {
                return Err(ParkLinkError::TransportError(format!("Connection failed: {}", e)));
            },
        };

        let (out_tx, mut out_rx) = mpsc::channel::<String>(OUTBOUND_CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(INBOUND_CHANNEL_CAPACITY);
        let (mut sink, mut stream) = ws_stream.split();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    outbound = out_rx.recv() => match outbound {
                        Some(text) => {
                            if let Err(e) = sink.send(Message::Text(text.into())).await {
                                let _ = in_tx
                                    .send(TransportEvent::Error(format!("Send failed: {}", e)))
                                    .await;
                                break;
                            }
                        },
                        None => {
                            let _ = sink.close().await;
                            break;
                        },
                    },
                    inbound = stream.next() => {
                        let event = match inbound {
                            Some(Ok(Message::Text(text))) => {
                                if text.len() > MAX_WS_MESSAGE_BYTES {
                                    log::warn!("[park-link] Text message too large ({} bytes)", text.len());
                                    continue;
                                }
                                TransportEvent::Message(text.to_string())
                            },
                            Some(Ok(Message::Binary(data))) => {
                                if data.len() > MAX_WS_MESSAGE_BYTES {
                                    log::warn!("[park-link] Binary message too large ({} bytes)", data.len());
                                    continue;
                                }
                                match binary_text(data) {
                                    Some(text) => TransportEvent::Message(text),
                                    None => {
                                        log::warn!("[park-link] Dropping non UTF-8 binary message");
                                        continue;
                                    },
                                }
                            },
                            Some(Ok(Message::Ping(payload))) => {
                                let _ = sink.send(Message::Pong(payload)).await;
                                continue;
                            },
                            Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => continue,
                            Some(Ok(Message::Close(frame))) => {
                                let reason = match frame {
                                    Some(f) => DisconnectReason::with_code(f.reason.to_string(), f.code.into()),
                                    None => DisconnectReason::new("Server closed connection"),
                                };
                                let _ = in_tx.send(TransportEvent::Closed(reason)).await;
                                break;
                            },
                            Some(Err(e)) => {
                                let _ = in_tx.send(TransportEvent::Error(e.to_string())).await;
                                break;
                            },
                            None => {
                                let _ = in_tx
                                    .send(TransportEvent::Closed(DisconnectReason::new("WebSocket stream ended")))
                                    .await;
                                break;
                            },
                        };
                        if in_tx.send(event).await.is_err() {
                            let _ = sink.close().await;
                            break;
                        }
                    },
                }
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Brokers may frame STOMP in binary messages; the payload is still text.
fn binary_text(data: Bytes) -> Option<String> {
    String::from_utf8(Vec::from(data)).ok()
}
