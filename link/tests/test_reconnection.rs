//! Integration tests for the connection lifecycle:
//!
//! - State transitions through connect, link loss and reconnection.
//! - Exponential backoff while the broker refuses connections.
//! - Resubscription of every referenced topic on a new link.
//! - Handshake timeouts, rejected CONNECT and the heartbeat watchdog.
//! - `disconnect()` stops reconnection; a `connect()` while reconnecting
//!   retries immediately.

use std::sync::Arc;
use std::time::Duration;

use park_link::frame::{HEADER_ACCEPT_VERSION, HEADER_HEART_BEAT, HEADER_HOST, HEADER_ID};
use park_link::{
    Command, ConnectionState, Credentials, DisconnectReason, EventHandlers, ParkLinkClient,
    ParkLinkTimeouts, Topic,
};
use parking_lot::Mutex;
use tokio::time::{sleep, timeout};

mod common;
use common::{
    client_with, connected_client, init_logger, test_options, test_timeouts, wait_for_state,
    MockBroker, ENDPOINT, WAIT,
};

// ── shared helpers ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Recorder {
    states: Arc<Mutex<Vec<ConnectionState>>>,
    errors: Arc<Mutex<Vec<String>>>,
    disconnects: Arc<Mutex<Vec<DisconnectReason>>>,
}

impl Recorder {
    fn handlers(&self) -> EventHandlers {
        let states = self.states.clone();
        let errors = self.errors.clone();
        let disconnects = self.disconnects.clone();
        EventHandlers::new()
            .on_state_change(move |state| states.lock().push(state.clone()))
            .on_error(move |error| errors.lock().push(error.message.clone()))
            .on_disconnect(move |reason| disconnects.lock().push(reason))
    }

    fn states(&self) -> Vec<ConnectionState> {
        self.states.lock().clone()
    }

    fn reconnect_delays(&self) -> Vec<(u32, Duration)> {
        self.states()
            .into_iter()
            .filter_map(|s| match s {
                ConnectionState::Reconnecting {
                    attempt,
                    next_delay,
                } => Some((attempt, next_delay)),
                _ => None,
            })
            .collect()
    }

    fn has_error(&self, needle: &str) -> bool {
        self.errors.lock().iter().any(|e| e.contains(needle))
    }
}

fn recorded_client(
    broker: &MockBroker,
    recorder: &Recorder,
    options: park_link::ConnectionOptions,
    timeouts: ParkLinkTimeouts,
) -> ParkLinkClient {
    init_logger();
    ParkLinkClient::builder()
        .endpoint(ENDPOINT)
        .credentials(Credentials::new("operator", "s3cret"))
        .connection_options(options)
        .timeouts(timeouts)
        .event_handlers(recorder.handlers())
        .transport(Arc::new(broker.clone()))
        .build()
        .expect("client builds")
}

// ── lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_connect_frame_and_state_transitions() {
    let broker = MockBroker::new();
    let recorder = Recorder::default();
    let client = recorded_client(&broker, &recorder, test_options(), test_timeouts());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();
    assert_eq!(recorder.states(), vec![ConnectionState::Connecting, ConnectionState::Connected]);

    let connect = &broker.frames_of(Command::Connect)[0];
    assert_eq!(connect.get_header(HEADER_ACCEPT_VERSION), Some("1.2"));
    assert_eq!(connect.get_header(HEADER_HOST), Some("broker.test"));
    assert_eq!(connect.get_header(HEADER_HEART_BEAT), Some("0,0"));
    assert_eq!(connect.get_header("login"), Some("operator"));

    broker.drop_connection().await;
    assert!(broker.wait_until(|b| b.sessions() == 2 && b.is_connected()).await);
    client.wait_until_connected(WAIT).await.unwrap();

    assert_eq!(
        recorder.states(),
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting {
                attempt: 1,
                next_delay: Duration::from_millis(20),
            },
            ConnectionState::Connecting,
            ConnectionState::Connected,
        ]
    );
    let disconnects = recorder.disconnects.lock().clone();
    assert_eq!(disconnects.len(), 1);
    assert_eq!(disconnects[0].code, Some(1012));
}

#[tokio::test]
async fn test_backoff_doubles_up_to_ceiling_while_refused() {
    let broker = MockBroker::new();
    broker.set_refuse(true);
    let recorder = Recorder::default();
    let client = recorded_client(&broker, &recorder, test_options(), test_timeouts());

    client.connect().await.unwrap();
    assert!(broker.wait_until(|b| b.attempts() >= 5).await);
    assert!(recorder.has_error("Connection refused"));

    let delays: Vec<(u32, Duration)> = recorder.reconnect_delays().into_iter().take(4).collect();
    assert_eq!(
        delays,
        vec![
            (1, Duration::from_millis(20)),
            (2, Duration::from_millis(40)),
            (3, Duration::from_millis(80)),
            (4, Duration::from_millis(80)),
        ]
    );

    broker.set_refuse(false);
    client.wait_until_connected(WAIT).await.unwrap();

    // A new link loss starts the schedule from the first attempt again.
    recorder.states.lock().clear();
    broker.drop_connection().await;
    let mut states = client.state_changes();
    wait_for_state(&mut states, |s| s.is_connected()).await;
    assert!(broker.wait_until(|b| b.sessions() == 2).await);
    assert_eq!(recorder.reconnect_delays()[0], (1, Duration::from_millis(20)));
}

#[tokio::test]
async fn test_resubscribes_referenced_topics_after_link_loss() {
    let broker = MockBroker::new();
    let client = connected_client(&broker).await;

    let mut dashboard = client.subscribe(Topic::lot_dashboard(1));
    let _alerts = client.subscribe(Topic::lot_alerts(2));
    let _alerts_again = client.subscribe(Topic::lot_alerts(2));
    let slots = client.subscribe(Topic::lot_slots(3));
    assert!(broker.wait_until(|b| b.count(Command::Subscribe) == 3).await);
    client.release(&slots);
    assert!(broker.wait_until(|b| b.count(Command::Unsubscribe) == 1).await);

    let first_id = broker.subscription_id("/topic/dashboard/1").unwrap();
    broker.drop_connection().await;
    assert!(broker.wait_until(|b| b.session_subscriptions(2).len() == 2).await);
    sleep(Duration::from_millis(50)).await;

    assert_eq!(
        broker.session_subscriptions(2),
        vec!["/topic/alerts/2".to_string(), "/topic/dashboard/1".to_string()]
    );
    assert!(broker.session_frames_of(2, Command::Unsubscribe).is_empty());
    let second_id = broker.subscription_id("/topic/dashboard/1").unwrap();
    assert_ne!(first_id, second_id, "subscription ids are fresh per link");

    assert!(broker.publish("/topic/dashboard/1", r#"{"seq":1}"#).await);
    let message = timeout(WAIT, dashboard.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(message.subscription_id, Some(second_id));

    let subs = client.list_subscriptions();
    assert_eq!(subs.len(), 2);
    assert_eq!(subs[0].topic, Topic::lot_alerts(2));
    assert_eq!(subs[0].ref_count, 2);
}

#[tokio::test]
async fn test_release_during_outage_is_not_replayed() {
    let broker = MockBroker::new();
    let options = test_options().with_reconnect_delay_ms(200).with_max_reconnect_delay_ms(200);
    let client = client_with(&broker, options, test_timeouts());
    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();

    let kept = client.subscribe(Topic::session_entries());
    let released = client.subscribe(Topic::session_exits());
    assert!(broker.wait_until(|b| b.count(Command::Subscribe) == 2).await);

    broker.drop_connection().await;
    let mut states = client.state_changes();
    wait_for_state(&mut states, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;
    client.release(&released);

    assert!(broker.wait_until(|b| b.session_subscriptions(2).len() == 1).await);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(broker.session_subscriptions(2), vec!["/topic/sessions-entry".to_string()]);
    assert_eq!(broker.count(Command::Unsubscribe), 0, "nothing to unsubscribe on a dead link");
    drop(kept);
}

#[tokio::test]
async fn test_disconnect_stops_reconnecting() {
    let broker = MockBroker::new();
    let client = connected_client(&broker).await;
    let _handle = client.subscribe(Topic::reservations());
    assert!(broker.wait_until(|b| b.count(Command::Subscribe) == 1).await);

    client.disconnect().await.unwrap();
    let mut states = client.state_changes();
    wait_for_state(&mut states, |s| *s == ConnectionState::Disconnected).await;
    assert!(broker.wait_until(|b| b.count(Command::Disconnect) == 1).await);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(broker.sessions(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(client.list_subscriptions()[0].is_pending());

    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();
    assert!(broker.wait_until(|b| b.session_subscriptions(2).len() == 1).await);
}

#[tokio::test]
async fn test_connect_while_reconnecting_retries_immediately() {
    let broker = MockBroker::new();
    broker.set_refuse(true);
    let options = test_options()
        .with_reconnect_delay_ms(10_000)
        .with_max_reconnect_delay_ms(10_000);
    let client = client_with(&broker, options, test_timeouts());

    client.connect().await.unwrap();
    let mut states = client.state_changes();
    wait_for_state(&mut states, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;

    broker.set_refuse(false);
    client.connect().await.unwrap();
    client
        .wait_until_connected(Duration::from_secs(1))
        .await
        .expect("connected well before the 10s backoff elapsed");
}

#[tokio::test]
async fn test_no_auto_reconnect_goes_disconnected() {
    let broker = MockBroker::new();
    let options = test_options().with_auto_reconnect(false);
    let client = client_with(&broker, options, test_timeouts());
    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();

    broker.drop_connection().await;
    let mut states = client.state_changes();
    wait_for_state(&mut states, |s| *s == ConnectionState::Disconnected).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(broker.sessions(), 1);
}

// ── handshake ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_handshake_timeout_is_retried() {
    let broker = MockBroker::new();
    broker.set_silent_handshake(true);
    let recorder = Recorder::default();
    let client = recorded_client(&broker, &recorder, test_options(), test_timeouts());

    client.connect().await.unwrap();
    let timed_out = {
        let recorder = recorder.clone();
        move |_: &MockBroker| recorder.has_error("Handshake timed out")
    };
    assert!(broker.wait_until(timed_out).await);
    assert!(matches!(client.state(), ConnectionState::Reconnecting { .. } | ConnectionState::Connecting));

    broker.set_silent_handshake(false);
    client.wait_until_connected(WAIT).await.unwrap();
    assert!(broker.sessions() >= 2);
}

#[tokio::test]
async fn test_rejected_connect_is_retried() {
    let broker = MockBroker::new();
    broker.set_reject_connect(true);
    let recorder = Recorder::default();
    let client = recorded_client(&broker, &recorder, test_options(), test_timeouts());

    client.connect().await.unwrap();
    assert!(broker.wait_until(|b| b.sessions() >= 2).await);
    assert!(recorder.has_error("Broker rejected CONNECT: Bad credentials"));
    assert!(!client.is_connected());

    broker.set_reject_connect(false);
    client.wait_until_connected(WAIT).await.unwrap();
}

// ── heartbeats ───────────────────────────────────────────────────────────────

fn heartbeat_timeouts() -> ParkLinkTimeouts {
    ParkLinkTimeouts::builder()
        .handshake_timeout(Duration::from_millis(300))
        .heartbeat_interval(Duration::from_millis(40))
        .heartbeat_tolerance(2)
        .build()
}

#[tokio::test]
async fn test_watchdog_drops_silent_link() {
    let broker = MockBroker::new();
    broker.set_connected_heart_beat("40,40");
    let recorder = Recorder::default();
    let client = recorded_client(&broker, &recorder, test_options(), heartbeat_timeouts());

    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();
    let connect = &broker.frames_of(Command::Connect)[0];
    assert_eq!(connect.get_header(HEADER_HEART_BEAT), Some("40,40"));

    // The mock broker never sends heartbeats, so the link is declared dead.
    assert!(broker.wait_until(|b| b.sessions() >= 2).await);
    let timed_out = recorder
        .disconnects
        .lock()
        .iter()
        .any(|r| r.message.contains("Heartbeat timeout"));
    assert!(timed_out);
}

#[tokio::test]
async fn test_watchdog_applies_when_broker_announces_no_heartbeats() {
    let broker = MockBroker::new();
    broker.set_connected_heart_beat("0,0");
    let recorder = Recorder::default();
    let client = recorded_client(&broker, &recorder, test_options(), heartbeat_timeouts());

    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();

    assert!(broker.wait_until(|b| b.sessions() >= 2).await);
    let timed_out = recorder
        .disconnects
        .lock()
        .iter()
        .any(|r| r.message.contains("Heartbeat timeout"));
    assert!(timed_out, "a half-open link must still be detected");
}

#[tokio::test]
async fn test_inbound_heartbeats_keep_link_alive() {
    let broker = MockBroker::new();
    broker.set_connected_heart_beat("0,40");
    let client = client_with(&broker, test_options(), heartbeat_timeouts());

    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();
    let _handle = client.subscribe(Topic::lot_dashboard(6));

    for _ in 0..15 {
        sleep(Duration::from_millis(20)).await;
        broker.send_raw("\n").await;
    }
    assert_eq!(broker.sessions(), 1, "traffic within the window keeps the link");
    assert!(client.is_connected());
    assert!(broker.heartbeats() >= 3, "client heartbeats every interval");
    assert_eq!(broker.count(Command::Subscribe), 1);
    assert!(broker.frames_of(Command::Subscribe)[0].get_header(HEADER_ID).is_some());
}

#[tokio::test]
async fn test_no_watchdog_when_heartbeats_disabled() {
    let broker = MockBroker::new();
    broker.set_connected_heart_beat("0,0");
    let client = client_with(&broker, test_options(), test_timeouts());

    client.connect().await.unwrap();
    client.wait_until_connected(WAIT).await.unwrap();

    sleep(Duration::from_millis(250)).await;
    assert_eq!(broker.sessions(), 1);
    assert!(client.is_connected());
    assert_eq!(broker.heartbeats(), 0);
}
