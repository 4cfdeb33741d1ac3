//! Messages as delivered to subscription handles.

use serde::{Deserialize, Serialize};

use super::live_event::LiveEvent;
use super::topic::Topic;
use crate::frame::{Frame, HEADER_MESSAGE_ID, HEADER_SUBSCRIPTION};

/// Decoded MESSAGE body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "data", rename_all = "snake_case")]
pub enum MessagePayload {
    /// A recognised parking event.
    Event(LiveEvent),
    /// A JSON body that is not a recognised event. `kind` is the envelope
    /// `type` when there is one.
    Json {
        kind: Option<String>,
        value: serde_json::Value,
    },
    /// A body that is not JSON.
    Text(String),
}

impl MessagePayload {
    /// Decode a MESSAGE body. Never fails: anything unrecognised degrades to
    /// `Json` or `Text`.
    pub fn decode(body: &[u8]) -> Self {
        let value: serde_json::Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(_) => return MessagePayload::Text(String::from_utf8_lossy(body).into_owned()),
        };

        match LiveEvent::deserialize(&value) {
            Ok(event) => MessagePayload::Event(event),
            Err(e) => {
                let kind = value.get("type").and_then(|t| t.as_str()).map(str::to_string);
                if kind.is_some() {
                    log::debug!("[park-link] Envelope {:?} not decoded as a live event: {}", kind, e);
                }
                MessagePayload::Json { kind, value }
            },
        }
    }

    pub fn as_event(&self) -> Option<&LiveEvent> {
        match self {
            MessagePayload::Event(event) => Some(event),
            _ => None,
        }
    }

    /// Envelope type of the payload, if it has one.
    pub fn kind(&self) -> Option<&str> {
        match self {
            MessagePayload::Event(event) => Some(event.kind()),
            MessagePayload::Json { kind, .. } => kind.as_deref(),
            MessagePayload::Text(_) => None,
        }
    }
}

/// One message for one topic, decoded once and fanned out to every handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodedMessage {
    pub topic: Topic,
    /// `subscription` header of the MESSAGE frame.
    pub subscription_id: Option<String>,
    /// `message-id` header of the MESSAGE frame.
    pub message_id: Option<String>,
    pub payload: MessagePayload,
}

impl DecodedMessage {
    pub fn from_frame(topic: Topic, frame: &Frame) -> Self {
        Self {
            topic,
            subscription_id: frame.get_header(HEADER_SUBSCRIPTION).map(str::to_string),
            message_id: frame.get_header(HEADER_MESSAGE_ID).map(str::to_string),
            payload: MessagePayload::decode(frame.body_bytes()),
        }
    }

    pub fn event(&self) -> Option<&LiveEvent> {
        self.payload.as_event()
    }
}
