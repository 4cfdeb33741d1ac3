//! Shared broker connection.
//!
//! One background task owns the transport for the whole client. It:
//!
//! - Opens the transport and performs the CONNECT/CONNECTED handshake
//! - Writes frames queued by the subscription registry, dropping those
//!   queued for an earlier link
//! - Sends heartbeats and drops the link when inbound traffic stops
//! - Decodes inbound text and hands frames to the [`MessageRouter`]
//! - Reconnects with exponential backoff until `disconnect()`, and tells the
//!   registry when a link comes up or goes away
//! - Publishes [`ConnectionState`] transitions and lifecycle events

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant as TokioInstant;
use url::Url;

use super::backoff::Backoff;
use super::{ACCEPT_VERSION, FAR_FUTURE};
use crate::codec::{encode_text, FrameDecoder};
use crate::error::{ParkLinkError, Result};
use crate::event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
use crate::frame::{
    Command, Frame, HEADER_ACCEPT_VERSION, HEADER_HEART_BEAT, HEADER_HOST, HEADER_LOGIN,
    HEADER_MESSAGE, HEADER_PASSCODE, HEADER_SERVER, HEADER_VERSION,
};
use crate::models::{ConnectionOptions, ConnectionState, Credentials};
use crate::subscription::{MessageRouter, Outbound, OutboundReceiver, RouteOutcome, SubscriptionRegistry};
use crate::timeouts::ParkLinkTimeouts;
use crate::transport::{Transport, TransportEvent, TransportLink};

// ── Commands ────────────────────────────────────────────────────────────────

/// Commands sent from the public API to the background connection task.
pub(crate) enum ConnCmd {
    Connect {
        endpoint: Url,
        credentials: Credentials,
    },
    Disconnect,
    Shutdown,
}

/// Everything the connection task needs besides its channels.
pub(crate) struct ConnectionContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) registry: Arc<SubscriptionRegistry>,
    pub(crate) timeouts: ParkLinkTimeouts,
    pub(crate) options: ConnectionOptions,
    pub(crate) handlers: EventHandlers,
    pub(crate) state_tx: watch::Sender<ConnectionState>,
}

// ── SharedConnection (public handle) ────────────────────────────────────────

pub(crate) struct SharedConnection {
    cmd_tx: mpsc::Sender<ConnCmd>,
    _task: JoinHandle<()>,
}

impl SharedConnection {
    /// Start the connection task. It stays idle until the first `connect`.
    pub(crate) fn spawn(context: ConnectionContext, outbound_rx: OutboundReceiver) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<ConnCmd>(64);
        let task = tokio::spawn(async move {
            ConnectionTask::new(context).run(cmd_rx, outbound_rx).await;
        });
        Self { cmd_tx, _task: task }
    }

    pub(crate) async fn connect(&self, endpoint: Url, credentials: Credentials) -> Result<()> {
        self.command(ConnCmd::Connect {
            endpoint,
            credentials,
        })
        .await
    }

    pub(crate) async fn disconnect(&self) -> Result<()> {
        self.command(ConnCmd::Disconnect).await
    }

    pub(crate) async fn shutdown(&self) {
        let _ = self.cmd_tx.send(ConnCmd::Shutdown).await;
    }

    async fn command(&self, cmd: ConnCmd) -> Result<()> {
        self.cmd_tx.send(cmd).await.map_err(|_| {
            ParkLinkError::InternalError("Connection task is not running".to_string())
        })
    }
}

impl Drop for SharedConnection {
    fn drop(&mut self) {
        let _ = self.cmd_tx.try_send(ConnCmd::Shutdown);
    }
}

// ── Background connection task ──────────────────────────────────────────────

#[derive(Clone, PartialEq)]
struct Target {
    endpoint: Url,
    credentials: Credentials,
}

struct ActiveLink {
    link: TransportLink,
    decoder: FrameDecoder,
    epoch: u64,
    last_inbound: TokioInstant,
    next_heartbeat: TokioInstant,
    /// Allowed inbound silence; `None` disables the watchdog.
    watchdog: Option<Duration>,
}

struct Established {
    link: TransportLink,
    decoder: FrameDecoder,
    /// Frames that arrived in the same message as CONNECTED.
    leftovers: Vec<Frame>,
    /// Broker's `heart-beat` header: (can send, wants to receive), in ms.
    server_heartbeat: Option<(u64, u64)>,
}

enum LinkStep {
    Watchdog,
    Command(Option<ConnCmd>),
    Outbound(Option<Outbound>),
    Heartbeat,
    Inbound(Option<TransportEvent>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

struct ConnectionTask {
    ctx: ConnectionContext,
    router: MessageRouter,
    backoff: Backoff,
    /// Outbound heartbeat interval; `None` when disabled.
    heartbeat: Option<Duration>,
    target: Option<Target>,
    active: Option<ActiveLink>,
    attempt: u32,
    pending_delay: Option<Duration>,
    next_epoch: u64,
}

impl ConnectionTask {
    fn new(ctx: ConnectionContext) -> Self {
        let heartbeat = (!ParkLinkTimeouts::is_no_timeout(ctx.timeouts.heartbeat_interval))
            .then_some(ctx.timeouts.heartbeat_interval);
        Self {
            router: MessageRouter::new(ctx.registry.clone()),
            backoff: Backoff::from_options(&ctx.options),
            heartbeat,
            target: None,
            active: None,
            attempt: 0,
            pending_delay: None,
            next_epoch: 0,
            ctx,
        }
    }

    async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<ConnCmd>,
        mut outbound_rx: OutboundReceiver,
    ) {
        loop {
            let flow = if self.active.is_some() {
                self.drive_link(&mut cmd_rx, &mut outbound_rx).await
            } else if self.target.is_none() {
                self.idle(&mut cmd_rx, &mut outbound_rx).await
            } else if let Some(delay) = self.pending_delay.take() {
                self.wait_backoff(delay, &mut cmd_rx, &mut outbound_rx).await
            } else {
                self.attempt_connect(&mut cmd_rx).await
            };

            if flow == Flow::Exit {
                self.close_link("Client shut down").await;
                self.set_state(ConnectionState::Disconnected);
                self.ctx.registry.close_all();
                log::debug!("[park-link] Connection task stopped");
                return;
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let changed = self.ctx.state_tx.send_if_modified(|current| {
            if *current != state {
                *current = state.clone();
                true
            } else {
                false
            }
        });
        if changed {
            log::debug!("[park-link] State → {}", state);
            self.ctx.handlers.emit_state_change(&state);
        }
    }

    fn set_target(&mut self, endpoint: Url, credentials: Credentials) {
        self.target = Some(Target {
            endpoint,
            credentials,
        });
        self.attempt = 0;
        self.pending_delay = None;
    }

    fn clear_target(&mut self) {
        self.target = None;
        self.attempt = 0;
        self.pending_delay = None;
        self.set_state(ConnectionState::Disconnected);
    }

    // ── Not connected ───────────────────────────────────────────────────────

    async fn idle(
        &mut self,
        cmd_rx: &mut mpsc::Receiver<ConnCmd>,
        outbound_rx: &mut OutboundReceiver,
    ) -> Flow {
        tokio::select! {
            biased;
            cmd = cmd_rx.recv() => match cmd {
                Some(ConnCmd::Connect { endpoint, credentials }) => {
                    self.set_target(endpoint, credentials);
                    Flow::Continue
                },
                Some(ConnCmd::Disconnect) => {
                    self.clear_target();
                    Flow::Continue
                },
                Some(ConnCmd::Shutdown) | None => Flow::Exit,
            },
            out = outbound_rx.recv() => match out {
                Some(out) => {
                    log::debug!("[park-link] Not connected, discarding {} frame", out.frame.command());
                    Flow::Continue
                },
                None => Flow::Exit,
            },
        }
    }

    async fn wait_backoff(
        &mut self,
        delay: Duration,
        cmd_rx: &mut mpsc::Receiver<ConnCmd>,
        outbound_rx: &mut OutboundReceiver,
    ) -> Flow {
        self.set_state(ConnectionState::Reconnecting {
            attempt: self.attempt,
            next_delay: delay,
        });
        log::info!(
            "[park-link] Attempting reconnection in {}ms (attempt {})",
            delay.as_millis(),
            self.attempt
        );

        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                cmd = cmd_rx.recv() => match cmd {
                    Some(ConnCmd::Connect { endpoint, credentials }) => {
                        log::info!("[park-link] Connect requested, retrying immediately");
                        let attempt = self.attempt;
                        self.set_target(endpoint, credentials);
                        self.attempt = attempt;
                        return Flow::Continue;
                    },
                    Some(ConnCmd::Disconnect) => {
                        self.clear_target();
                        return Flow::Continue;
                    },
                    Some(ConnCmd::Shutdown) | None => return Flow::Exit,
                },
                out = outbound_rx.recv() => match out {
                    Some(out) => {
                        log::debug!("[park-link] Reconnecting, discarding {} frame", out.frame.command());
                    },
                    None => return Flow::Exit,
                },
                _ = &mut sleep => return Flow::Continue,
            }
        }
    }

    async fn attempt_connect(&mut self, cmd_rx: &mut mpsc::Receiver<ConnCmd>) -> Flow {
        let Some(target) = self.target.clone() else {
            return Flow::Continue;
        };
        self.set_state(ConnectionState::Connecting);

        let result = {
            let establishing = establish(&self.ctx, &target.endpoint, &target.credentials);
            tokio::pin!(establishing);
            loop {
                tokio::select! {
                    biased;
                    result = &mut establishing => break Some(result),
                    cmd = cmd_rx.recv() => match cmd {
                        Some(ConnCmd::Connect { endpoint, credentials }) => {
                            if endpoint == target.endpoint && credentials == target.credentials {
                                continue;
                            }
                            self.target = Some(Target { endpoint, credentials });
                            self.attempt = 0;
                            break None;
                        },
                        Some(ConnCmd::Disconnect) => {
                            self.target = None;
                            self.attempt = 0;
                            break None;
                        },
                        Some(ConnCmd::Shutdown) | None => return Flow::Exit,
                    },
                }
            }
        };

        match result {
            None => {
                if self.target.is_none() {
                    self.set_state(ConnectionState::Disconnected);
                }
                Flow::Continue
            },
            Some(Ok(established)) => {
                self.on_established(established, &target.endpoint);
                Flow::Continue
            },
            Some(Err(e)) => {
                log::warn!("[park-link] Connection attempt to {} failed: {}", target.endpoint, e);
                self.ctx.handlers.emit_error(ConnectionError::from(&e));
                if self.ctx.options.auto_reconnect {
                    self.attempt = self.attempt.saturating_add(1);
                    self.pending_delay = Some(self.backoff.delay_for(self.attempt));
                } else {
                    self.clear_target();
                }
                Flow::Continue
            },
        }
    }

    fn on_established(&mut self, established: Established, endpoint: &Url) {
        let Established {
            link,
            decoder,
            leftovers,
            server_heartbeat,
        } = established;

        self.next_epoch += 1;
        let epoch = self.next_epoch;
        let now = TokioInstant::now();
        self.active = Some(ActiveLink {
            link,
            decoder,
            epoch,
            last_inbound: now,
            next_heartbeat: now + self.heartbeat.unwrap_or(FAR_FUTURE),
            watchdog: watchdog_window(&self.ctx.timeouts, server_heartbeat),
        });
        self.attempt = 0;
        self.pending_delay = None;

        let topics = self.ctx.registry.on_connected(epoch);
        log::info!(
            "[park-link] Connected to {} (link {}, {} topic(s) active)",
            endpoint,
            epoch,
            topics
        );
        self.set_state(ConnectionState::Connected);
        self.ctx.handlers.emit_connect();

        for frame in leftovers {
            if let Some(error) = self.dispatch(&frame) {
                self.lose_link(DisconnectReason::new(error.to_string()));
                return;
            }
        }
    }

    // ── Connected ───────────────────────────────────────────────────────────

    async fn drive_link(
        &mut self,
        cmd_rx: &mut mpsc::Receiver<ConnCmd>,
        outbound_rx: &mut OutboundReceiver,
    ) -> Flow {
        let heartbeat_enabled = self.heartbeat.is_some();
        let Some(link) = self.active.as_mut() else {
            return Flow::Continue;
        };
        let watchdog_enabled = link.watchdog.is_some();
        let watchdog_at = link.last_inbound + link.watchdog.unwrap_or(FAR_FUTURE);
        let heartbeat_at = link.next_heartbeat;

        let step = tokio::select! {
            biased;
            _ = tokio::time::sleep_until(watchdog_at), if watchdog_enabled => LinkStep::Watchdog,
            cmd = cmd_rx.recv() => LinkStep::Command(cmd),
            out = outbound_rx.recv() => LinkStep::Outbound(out),
            event = link.link.inbound.recv() => LinkStep::Inbound(event),
            _ = tokio::time::sleep_until(heartbeat_at), if heartbeat_enabled => LinkStep::Heartbeat,
        };

        match step {
            LinkStep::Watchdog => {
                let window = self.active.as_ref().and_then(|l| l.watchdog).unwrap_or_default();
                log::warn!(
                    "[park-link] No inbound traffic for {:?}, treating link as dead",
                    window
                );
                self.lose_link(DisconnectReason::new(format!(
                    "Heartbeat timeout ({:?})",
                    window
                )));
            },
            LinkStep::Command(cmd) => return self.on_command_while_connected(cmd).await,
            LinkStep::Outbound(None) => return Flow::Exit,
            LinkStep::Outbound(Some(out)) => self.write_outbound(out).await,
            LinkStep::Heartbeat => self.send_heartbeat().await,
            LinkStep::Inbound(event) => self.on_transport_event(event),
        }
        Flow::Continue
    }

    async fn on_command_while_connected(&mut self, cmd: Option<ConnCmd>) -> Flow {
        match cmd {
            Some(ConnCmd::Connect {
                endpoint,
                credentials,
            }) => {
                let same = self
                    .target
                    .as_ref()
                    .is_some_and(|t| t.endpoint == endpoint && t.credentials == credentials);
                if same {
                    log::debug!("[park-link] Already connected to {}", endpoint);
                } else {
                    log::info!("[park-link] Switching link to {}", endpoint);
                    self.close_link("Endpoint changed").await;
                    self.set_target(endpoint, credentials);
                }
                Flow::Continue
            },
            Some(ConnCmd::Disconnect) => {
                self.close_link("Client disconnected").await;
                self.clear_target();
                Flow::Continue
            },
            Some(ConnCmd::Shutdown) | None => Flow::Exit,
        }
    }

    /// Write raw wire text to the live link, bounded by the send timeout.
    async fn transmit(&mut self, text: String) -> Result<()> {
        let send_timeout = self.ctx.timeouts.send_timeout;
        let Some(link) = self.active.as_mut() else {
            return Err(ParkLinkError::NotConnected);
        };
        self.ctx.handlers.emit_send(&text);

        let closed = |_| ParkLinkError::TransportError("Transport closed".to_string());
        if ParkLinkTimeouts::is_no_timeout(send_timeout) {
            link.link.outbound.send(text).await.map_err(closed)
        } else {
            match tokio::time::timeout(send_timeout, link.link.outbound.send(text)).await {
                Ok(result) => result.map_err(closed),
                Err(_) => Err(ParkLinkError::TransportError(format!(
                    "Send timed out after {:?}",
                    send_timeout
                ))),
            }
        }
    }

    async fn write_outbound(&mut self, out: Outbound) {
        let Some(link) = self.active.as_ref() else {
            return;
        };
        if out.epoch != link.epoch {
            log::debug!(
                "[park-link] Dropping {} frame queued for link {} (current link {})",
                out.frame.command(),
                out.epoch,
                link.epoch
            );
            return;
        }

        let encoded = out.frame.validate().and_then(|()| encode_text(&out.frame));
        let text = match encoded {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[park-link] Not sending {}: {}", out.frame, e);
                self.ctx.handlers.emit_error(ConnectionError::new(e.to_string(), false));
                return;
            },
        };

        if let Err(e) = self.transmit(text).await {
            self.lose_link(DisconnectReason::new(format!("Send failed: {}", e)));
        }
    }

    async fn send_heartbeat(&mut self) {
        let Some(interval) = self.heartbeat else {
            return;
        };
        if let Some(link) = self.active.as_mut() {
            link.next_heartbeat = TokioInstant::now() + interval;
        }
        if let Err(e) = self.transmit("\n".to_string()).await {
            self.lose_link(DisconnectReason::new(format!("Heartbeat failed: {}", e)));
        }
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        match event {
            Some(TransportEvent::Message(text)) => {
                let Some(link) = self.active.as_mut() else {
                    return;
                };
                link.last_inbound = TokioInstant::now();
                self.ctx.handlers.emit_receive(&text);
                let items = link.decoder.push(text.as_bytes());

                for item in items {
                    match item {
                        Ok(frame) => {
                            if let Some(error) = self.dispatch(&frame) {
                                self.lose_link(DisconnectReason::new(error.to_string()));
                                return;
                            }
                        },
                        Err(e) => {
                            log::warn!("[park-link] Dropping malformed frame: {}", e);
                            self.ctx.handlers.emit_error(ConnectionError::from(&e));
                        },
                    }
                }
            },
            Some(TransportEvent::Closed(reason)) => self.lose_link(reason),
            Some(TransportEvent::Error(message)) => {
                self.ctx
                    .handlers
                    .emit_error(ConnectionError::new(format!("Transport error: {}", message), true));
                self.lose_link(DisconnectReason::new(format!("Transport error: {}", message)));
            },
            None => self.lose_link(DisconnectReason::new("Transport closed")),
        }
    }

    /// Route one inbound frame. Returns the error when the frame makes the
    /// link unusable.
    fn dispatch(&self, frame: &Frame) -> Option<ParkLinkError> {
        match self.router.route(frame) {
            RouteOutcome::ConnectionFailed(error) => {
                self.ctx.handlers.emit_error(ConnectionError::new(error.to_string(), true));
                Some(error)
            },
            RouteOutcome::TopicFailed { topic, handles } => {
                self.ctx.handlers.emit_error(ConnectionError::new(
                    format!("Broker rejected subscription to {} ({} handle(s))", topic, handles),
                    false,
                ));
                None
            },
            _ => None,
        }
    }

    /// Unexpected loss of the live link: schedule a reconnection.
    fn lose_link(&mut self, reason: DisconnectReason) {
        if self.active.take().is_none() {
            return;
        }
        self.ctx.registry.on_disconnected();
        log::warn!("[park-link] Link lost: {}", reason);
        self.ctx.handlers.emit_disconnect(reason);

        if self.ctx.options.auto_reconnect && self.target.is_some() {
            self.attempt = 1;
            let delay = self.backoff.delay_for(self.attempt);
            self.pending_delay = Some(delay);
            self.set_state(ConnectionState::Reconnecting {
                attempt: self.attempt,
                next_delay: delay,
            });
        } else {
            self.clear_target();
        }
    }

    /// Intentional close: send DISCONNECT and drop the transport.
    async fn close_link(&mut self, reason: &str) {
        if self.active.is_none() {
            return;
        }
        if let Ok(text) = encode_text(&Frame::new(Command::Disconnect)) {
            let _ = self.transmit(text).await;
        }
        self.active = None;
        self.ctx.registry.on_disconnected();
        log::info!("[park-link] Link closed: {}", reason);
        self.ctx.handlers.emit_disconnect(DisconnectReason::new(reason));
    }
}

// ── Handshake ───────────────────────────────────────────────────────────────

fn connect_frame(endpoint: &Url, credentials: &Credentials, timeouts: &ParkLinkTimeouts) -> Frame {
    let heartbeat_ms = if ParkLinkTimeouts::is_no_timeout(timeouts.heartbeat_interval) {
        0
    } else {
        timeouts.heartbeat_interval.as_millis()
    };
    let mut frame = Frame::new(Command::Connect)
        .header(HEADER_ACCEPT_VERSION, ACCEPT_VERSION)
        .header(HEADER_HOST, endpoint.host_str().unwrap_or("localhost"))
        .header(HEADER_HEART_BEAT, format!("{0},{0}", heartbeat_ms));
    if let Some(login) = &credentials.login {
        frame = frame.header(HEADER_LOGIN, login.as_str());
    }
    if let Some(passcode) = &credentials.passcode {
        frame = frame.header(HEADER_PASSCODE, passcode.as_str());
    }
    frame
}

fn parse_heart_beat(raw: &str) -> Option<(u64, u64)> {
    let (send, receive) = raw.split_once(',')?;
    Some((send.trim().parse().ok()?, receive.trim().parse().ok()?))
}

/// Inbound silence allowed on a link. The configured window applies even
/// when the broker announces `heart-beat:0,…`; a broker promising slower
/// heartbeats than ours widens it to its interval times the tolerance. Only
/// a zero heartbeat interval on our side turns the watchdog off.
fn watchdog_window(
    timeouts: &ParkLinkTimeouts,
    server_heartbeat: Option<(u64, u64)>,
) -> Option<Duration> {
    let configured = timeouts.watchdog_window()?;
    match server_heartbeat {
        None | Some((0, _)) => Some(configured),
        Some((server_send_ms, _)) => {
            let interval = timeouts
                .heartbeat_interval
                .max(Duration::from_millis(server_send_ms));
            Some(interval.saturating_mul(timeouts.heartbeat_tolerance.max(1)))
        },
    }
}

async fn establish(
    ctx: &ConnectionContext,
    endpoint: &Url,
    credentials: &Credentials,
) -> Result<Established> {
    log::debug!("[park-link] Establishing link to {}", endpoint);
    let timeouts = &ctx.timeouts;

    let open = ctx.transport.open(endpoint);
    let mut link = if ParkLinkTimeouts::is_no_timeout(timeouts.connection_timeout) {
        open.await?
    } else {
        tokio::time::timeout(timeouts.connection_timeout, open)
            .await
            .map_err(|_| {
                ParkLinkError::TransportError(format!(
                    "Connection timeout ({:?})",
                    timeouts.connection_timeout
                ))
            })??
    };

    let connect = connect_frame(endpoint, credentials, timeouts);
    let text = encode_text(&connect)?;
    ctx.handlers.emit_send(&text);
    link.outbound.send(text).await.map_err(|_| {
        ParkLinkError::TransportError("Transport closed before CONNECT was sent".to_string())
    })?;

    let mut decoder = FrameDecoder::new();
    let handshake = await_connected(&mut link, &mut decoder, &ctx.handlers);
    let (connected, leftovers) = if ParkLinkTimeouts::is_no_timeout(timeouts.handshake_timeout) {
        handshake.await?
    } else {
        tokio::time::timeout(timeouts.handshake_timeout, handshake)
            .await
            .map_err(|_| ParkLinkError::HandshakeTimeout(timeouts.handshake_timeout))??
    };

    log::info!(
        "[park-link] Broker handshake complete (version={}, server={}, heart-beat={})",
        connected.get_header(HEADER_VERSION).unwrap_or("-"),
        connected.get_header(HEADER_SERVER).unwrap_or("-"),
        connected.get_header(HEADER_HEART_BEAT).unwrap_or("-"),
    );

    Ok(Established {
        link,
        decoder,
        leftovers,
        server_heartbeat: connected.get_header(HEADER_HEART_BEAT).and_then(parse_heart_beat),
    })
}

async fn await_connected(
    link: &mut TransportLink,
    decoder: &mut FrameDecoder,
    handlers: &EventHandlers,
) -> Result<(Frame, Vec<Frame>)> {
    loop {
        match link.inbound.recv().await {
            Some(TransportEvent::Message(text)) => {
                handlers.emit_receive(&text);
                let mut connected = None;
                let mut leftovers = Vec::new();
                for item in decoder.push(text.as_bytes()) {
                    let frame = match item {
                        Ok(frame) => frame,
                        Err(e) => {
                            log::warn!("[park-link] Malformed frame during handshake: {}", e);
                            continue;
                        },
                    };
                    match frame.command() {
                        Command::Connected if connected.is_none() => connected = Some(frame),
                        Command::Error => {
                            let message = frame
                                .get_header(HEADER_MESSAGE)
                                .map(str::to_string)
                                .unwrap_or_else(|| frame.body_text());
                            return Err(ParkLinkError::TransportError(format!(
                                "Broker rejected CONNECT: {}",
                                message
                            )));
                        },
                        Command::Heartbeat => {},
                        _ if connected.is_some() => leftovers.push(frame),
                        other => {
                            log::debug!("[park-link] Ignoring {} frame before CONNECTED", other)
                        },
                    }
                }
                if let Some(frame) = connected {
                    return Ok((frame, leftovers));
                }
            },
            Some(TransportEvent::Closed(reason)) => {
                return Err(ParkLinkError::TransportError(format!(
                    "Connection closed during handshake: {}",
                    reason
                )));
            },
            Some(TransportEvent::Error(message)) => {
                return Err(ParkLinkError::TransportError(format!(
                    "Transport error during handshake: {}",
                    message
                )));
            },
            None => {
                return Err(ParkLinkError::TransportError(
                    "Transport closed during handshake".to_string(),
                ));
            },
        }
    }
}
