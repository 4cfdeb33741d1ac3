//! In-memory broker used by the integration tests.
//!
//! [`MockBroker`] implements [`Transport`]: every `open` creates a fresh
//! session whose client frames are decoded and recorded, and which answers
//! CONNECT with CONNECTED unless told otherwise. Tests drive the broker side
//! with `publish`, `send_frame` and `drop_connection`.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use park_link::frame::{
    HEADER_DESTINATION, HEADER_HEART_BEAT, HEADER_ID, HEADER_MESSAGE, HEADER_MESSAGE_ID,
    HEADER_RECEIPT, HEADER_RECEIPT_ID, HEADER_SERVER, HEADER_SUBSCRIPTION, HEADER_VERSION,
};
use park_link::{
    encode_text, Command, ConnectionOptions, ConnectionState, DisconnectReason, Frame,
    FrameDecoder, ParkLinkClient, ParkLinkError, ParkLinkTimeouts, Result, Transport,
    TransportEvent, TransportLink,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, timeout, Instant};
use url::Url;

pub const ENDPOINT: &str = "ws://broker.test/ws";
pub const WAIT: Duration = Duration::from_secs(3);

pub fn init_logger() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

#[derive(Default)]
struct BrokerState {
    /// Number of successful `open` calls.
    sessions: u32,
    /// Number of `open` calls, refused ones included.
    attempts: u32,
    refuse: bool,
    /// Never answer CONNECT.
    silent_handshake: bool,
    /// Answer CONNECT with ERROR.
    reject_connect: bool,
    /// `heart-beat` header sent back in CONNECTED.
    connected_heart_beat: Option<String>,
    /// Answer SUBSCRIBE frames that carry a `receipt` header.
    send_receipts: bool,
    received: Vec<(u32, Frame)>,
    heartbeats: usize,
    current: Option<(u32, mpsc::Sender<TransportEvent>)>,
    next_message_id: u64,
}

/// Scripted broker standing in for the WebSocket transport.
#[derive(Clone, Default)]
pub struct MockBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    pub fn set_silent_handshake(&self, silent: bool) {
        self.state.lock().silent_handshake = silent;
    }

    pub fn set_reject_connect(&self, reject: bool) {
        self.state.lock().reject_connect = reject;
    }

    pub fn set_connected_heart_beat(&self, value: &str) {
        self.state.lock().connected_heart_beat = Some(value.to_string());
    }

    pub fn set_send_receipts(&self, enabled: bool) {
        self.state.lock().send_receipts = enabled;
    }

    pub fn sessions(&self) -> u32 {
        self.state.lock().sessions
    }

    pub fn attempts(&self) -> u32 {
        self.state.lock().attempts
    }

    pub fn heartbeats(&self) -> usize {
        self.state.lock().heartbeats
    }

    /// Every non-heartbeat frame received from the client, in order.
    pub fn frames(&self) -> Vec<Frame> {
        self.state.lock().received.iter().map(|(_, f)| f.clone()).collect()
    }

    pub fn frames_of(&self, command: Command) -> Vec<Frame> {
        self.frames().into_iter().filter(|f| f.command() == command).collect()
    }

    /// Frames of `command` received during session `session` (1-based).
    pub fn session_frames_of(&self, session: u32, command: Command) -> Vec<Frame> {
        self.state
            .lock()
            .received
            .iter()
            .filter(|(s, f)| *s == session && f.command() == command)
            .map(|(_, f)| f.clone())
            .collect()
    }

    pub fn count(&self, command: Command) -> usize {
        self.frames_of(command).len()
    }

    /// Destinations of SUBSCRIBE frames, in order.
    pub fn subscribed(&self) -> Vec<String> {
        self.frames_of(Command::Subscribe)
            .iter()
            .filter_map(|f| f.destination().map(str::to_string))
            .collect()
    }

    /// Destinations of SUBSCRIBE frames sent on session `session`, sorted.
    pub fn session_subscriptions(&self, session: u32) -> Vec<String> {
        let mut topics: Vec<String> = self
            .session_frames_of(session, Command::Subscribe)
            .iter()
            .filter_map(|f| f.destination().map(str::to_string))
            .collect();
        topics.sort();
        topics
    }

    /// Latest subscription id the client used for `destination`.
    pub fn subscription_id(&self, destination: &str) -> Option<String> {
        self.frames_of(Command::Subscribe)
            .iter()
            .rev()
            .find(|f| f.destination() == Some(destination))
            .and_then(|f| f.get_header(HEADER_ID).map(str::to_string))
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().current.is_some()
    }

    /// Deliver raw wire text to the client.
    pub async fn send_raw(&self, text: impl Into<String>) -> bool {
        let sender = self.state.lock().current.as_ref().map(|(_, tx)| tx.clone());
        match sender {
            Some(tx) => tx.send(TransportEvent::Message(text.into())).await.is_ok(),
            None => false,
        }
    }

    pub async fn send_frame(&self, frame: &Frame) -> bool {
        match encode_text(frame) {
            Ok(text) => self.send_raw(text).await,
            Err(_) => false,
        }
    }

    /// Publish a MESSAGE on `destination` with the client's current
    /// subscription id.
    pub async fn publish(&self, destination: &str, body: &str) -> bool {
        let message_id = {
            let mut state = self.state.lock();
            state.next_message_id += 1;
            state.next_message_id
        };
        let mut frame = Frame::new(Command::Message)
            .header(HEADER_DESTINATION, destination)
            .header(HEADER_MESSAGE_ID, format!("msg-{}", message_id))
            .header("content-type", "application/json");
        if let Some(id) = self.subscription_id(destination) {
            frame = frame.header(HEADER_SUBSCRIPTION, id);
        }
        self.send_frame(&frame.body(body)).await
    }

    /// Close the current session from the broker side.
    pub async fn drop_connection(&self) {
        let current = self.state.lock().current.take();
        if let Some((_, tx)) = current {
            let _ = tx
                .send(TransportEvent::Closed(DisconnectReason::with_code(
                    "Broker restarted",
                    1012,
                )))
                .await;
        }
    }

    /// Stop answering without closing: the session goes silent.
    pub fn go_silent(&self) {
        self.state.lock().current = None;
    }

    /// Poll until `condition` holds or `WAIT` elapses.
    pub async fn wait_until(&self, condition: impl Fn(&MockBroker) -> bool) -> bool {
        let deadline = Instant::now() + WAIT;
        loop {
            if condition(self) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(Duration::from_millis(5)).await;
        }
    }

    fn on_client_frame(&self, session: u32, frame: Frame) -> Vec<Frame> {
        let mut state = self.state.lock();
        if frame.command() == Command::Heartbeat {
            state.heartbeats += 1;
            return Vec::new();
        }
        let mut replies = Vec::new();
        match frame.command() {
            Command::Connect if state.reject_connect => {
                replies.push(
                    Frame::new(Command::Error)
                        .header(HEADER_MESSAGE, "Bad credentials")
                        .body("login rejected"),
                );
            },
            Command::Connect if !state.silent_handshake => {
                let mut connected = Frame::new(Command::Connected)
                    .header(HEADER_VERSION, "1.2")
                    .header(HEADER_SERVER, "mock-broker/1.0");
                if let Some(hb) = &state.connected_heart_beat {
                    connected = connected.header(HEADER_HEART_BEAT, hb.as_str());
                }
                replies.push(connected);
            },
            Command::Subscribe if state.send_receipts => {
                if let Some(receipt) = frame.get_header(HEADER_RECEIPT) {
                    replies.push(Frame::new(Command::Receipt).header(HEADER_RECEIPT_ID, receipt));
                }
            },
            _ => {},
        }
        state.received.push((session, frame));
        replies
    }
}

#[async_trait]
impl Transport for MockBroker {
    async fn open(&self, _endpoint: &Url) -> Result<TransportLink> {
        let session = {
            let mut state = self.state.lock();
            state.attempts += 1;
            if state.refuse {
                return Err(ParkLinkError::TransportError("Connection refused".to_string()));
            }
            state.sessions += 1;
            state.sessions
        };

        let (out_tx, mut out_rx) = mpsc::channel::<String>(256);
        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(256);
        self.state.lock().current = Some((session, in_tx.clone()));

        let broker = self.clone();
        tokio::spawn(async move {
            let mut decoder = FrameDecoder::new();
            while let Some(text) = out_rx.recv().await {
                for frame in decoder.push(text.as_bytes()).into_iter().flatten() {
                    for reply in broker.on_client_frame(session, frame) {
                        let still_current = broker
                            .state
                            .lock()
                            .current
                            .as_ref()
                            .is_some_and(|(s, _)| *s == session);
                        if !still_current {
                            continue;
                        }
                        if let Ok(text) = encode_text(&reply) {
                            let _ = in_tx.send(TransportEvent::Message(text)).await;
                        }
                    }
                }
            }
            let mut state = broker.state.lock();
            if state.current.as_ref().is_some_and(|(s, _)| *s == session) {
                state.current = None;
            }
        });

        Ok(TransportLink {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}

/// Timeouts for tests: short handshake, heartbeats off.
pub fn test_timeouts() -> ParkLinkTimeouts {
    ParkLinkTimeouts::builder()
        .connection_timeout(Duration::from_secs(1))
        .handshake_timeout(Duration::from_millis(300))
        .send_timeout(Duration::from_secs(1))
        .heartbeat_interval(Duration::ZERO)
        .build()
}

/// Fast, deterministic reconnection.
pub fn test_options() -> ConnectionOptions {
    ConnectionOptions::new()
        .with_reconnect_delay_ms(20)
        .with_max_reconnect_delay_ms(80)
        .with_reconnect_jitter(0.0)
}

pub fn client_for(broker: &MockBroker) -> ParkLinkClient {
    client_with(broker, test_options(), test_timeouts())
}

pub fn client_with(
    broker: &MockBroker,
    options: ConnectionOptions,
    timeouts: ParkLinkTimeouts,
) -> ParkLinkClient {
    init_logger();
    ParkLinkClient::builder()
        .endpoint(ENDPOINT)
        .connection_options(options)
        .timeouts(timeouts)
        .transport(Arc::new(broker.clone()))
        .build()
        .expect("client builds")
}

/// Connect and wait for the link.
pub async fn connected_client(broker: &MockBroker) -> ParkLinkClient {
    let client = client_for(broker);
    client.connect().await.expect("connect queued");
    client.wait_until_connected(WAIT).await.expect("connected");
    client
}

/// Wait until the state receiver sees `predicate` hold.
pub async fn wait_for_state(
    rx: &mut watch::Receiver<ConnectionState>,
    predicate: impl FnMut(&ConnectionState) -> bool,
) -> ConnectionState {
    timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("state reached in time")
        .expect("connection task alive")
        .clone()
}
