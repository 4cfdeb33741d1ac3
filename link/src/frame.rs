//! In-memory representation of one wire frame.
//!
//! A [`Frame`] is built once (by the codec on receipt, or by the client
//! before sending) and never mutated afterwards: the builder methods consume
//! `self` and there are no `&mut` accessors.

use std::fmt;

use crate::error::{ParkLinkError, Result};

/// Header carrying the topic of SUBSCRIBE, UNSUBSCRIBE and MESSAGE frames.
pub const HEADER_DESTINATION: &str = "destination";
/// Subscription id on SUBSCRIBE / UNSUBSCRIBE.
pub const HEADER_ID: &str = "id";
/// Subscription id echoed by the broker on MESSAGE frames.
pub const HEADER_SUBSCRIPTION: &str = "subscription";
pub const HEADER_MESSAGE_ID: &str = "message-id";
pub const HEADER_RECEIPT: &str = "receipt";
pub const HEADER_RECEIPT_ID: &str = "receipt-id";
pub const HEADER_CONTENT_LENGTH: &str = "content-length";
pub const HEADER_CONTENT_TYPE: &str = "content-type";
pub const HEADER_HEART_BEAT: &str = "heart-beat";
pub const HEADER_ACCEPT_VERSION: &str = "accept-version";
pub const HEADER_VERSION: &str = "version";
pub const HEADER_HOST: &str = "host";
pub const HEADER_LOGIN: &str = "login";
pub const HEADER_PASSCODE: &str = "passcode";
pub const HEADER_MESSAGE: &str = "message";
pub const HEADER_SERVER: &str = "server";
pub const HEADER_ACK: &str = "ack";

/// Frame command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Message,
    Error,
    Receipt,
    Disconnect,
    /// Keep-alive. Encoded as a bare end-of-line, never as a command line.
    Heartbeat,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Connected => "CONNECTED",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Message => "MESSAGE",
            Command::Error => "ERROR",
            Command::Receipt => "RECEIPT",
            Command::Disconnect => "DISCONNECT",
            Command::Heartbeat => "HEARTBEAT",
        }
    }

    /// Parse a command line. `STOMP` is accepted as a synonym for `CONNECT`.
    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "CONNECTED" => Ok(Command::Connected),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "MESSAGE" => Ok(Command::Message),
            "ERROR" => Ok(Command::Error),
            "RECEIPT" => Ok(Command::Receipt),
            "DISCONNECT" => Ok(Command::Disconnect),
            other => Err(ParkLinkError::ProtocolError(format!(
                "Unknown frame command '{}'",
                other
            ))),
        }
    }

    /// CONNECT and CONNECTED headers are never escaped.
    pub(crate) fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }

    /// Commands that are meaningless without a `destination` header.
    pub fn requires_destination(&self) -> bool {
        matches!(self, Command::Subscribe | Command::Unsubscribe | Command::Message)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One wire unit: command, ordered headers and an optional body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: Command,
    headers: Vec<(String, String)>,
    body: Option<Vec<u8>>,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn heartbeat() -> Self {
        Self::new(Command::Heartbeat)
    }

    /// Append a header. On lookup the first occurrence of a key wins.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        self.body = if body.is_empty() { None } else { Some(body) };
        self
    }

    pub fn subscribe(destination: &str, id: &str) -> Self {
        Self::new(Command::Subscribe)
            .header(HEADER_ID, id)
            .header(HEADER_DESTINATION, destination)
            .header(HEADER_ACK, "auto")
    }

    pub fn unsubscribe(destination: &str, id: &str) -> Self {
        Self::new(Command::Unsubscribe)
            .header(HEADER_ID, id)
            .header(HEADER_DESTINATION, destination)
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn destination(&self) -> Option<&str> {
        self.get_header(HEADER_DESTINATION)
    }

    pub fn subscription(&self) -> Option<&str> {
        self.get_header(HEADER_SUBSCRIPTION)
    }

    pub fn body_bytes(&self) -> &[u8] {
        self.body.as_deref().unwrap_or_default()
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(self.body_bytes()).into_owned()
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Check the headers a frame of this command must carry.
    pub fn validate(&self) -> Result<()> {
        if self.command.requires_destination() && self.destination().is_none() {
            return Err(ParkLinkError::ProtocolError(format!(
                "{} frame without a destination header",
                self.command
            )));
        }
        if matches!(self.command, Command::Subscribe | Command::Unsubscribe)
            && self.get_header(HEADER_ID).is_none()
        {
            return Err(ParkLinkError::ProtocolError(format!(
                "{} frame without an id header",
                self.command
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for (k, v) in &self.headers {
            if k == HEADER_PASSCODE {
                write!(f, " {}:***", k)?;
            } else {
                write!(f, " {}:{}", k, v)?;
            }
        }
        if let Some(body) = &self.body {
            write!(f, " ({} byte body)", body.len())?;
        }
        Ok(())
    }
}
