//! Main park-link client with builder pattern.
//!
//! Ties the subscription registry, the message router and the background
//! connection task together behind one object that callers construct and
//! pass around explicitly.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use url::Url;

use crate::connection::{ConnectionContext, SharedConnection};
use crate::error::{ParkLinkError, Result};
use crate::event_handlers::EventHandlers;
use crate::frame::Frame;
use crate::models::{ConnectionOptions, ConnectionState, Credentials, SubscriptionInfo, Topic};
use crate::subscription::{OutboundReceiver, SubscriptionHandle, SubscriptionRegistry};
use crate::timeouts::ParkLinkTimeouts;
use crate::transport::{resolve_endpoint, Transport, WebSocketTransport};

/// Multiplexed topic subscription client.
///
/// Any number of [`SubscriptionHandle`]s share one broker link. Each topic
/// is subscribed on the broker once, however many handles reference it, and
/// is resubscribed automatically after a reconnection.
///
/// # Examples
///
/// ```rust,no_run
/// use park_link::{EventHandlers, ParkLinkClient, Topic};
///
/// # async fn example() -> park_link::Result<()> {
/// let client = ParkLinkClient::builder()
///     .endpoint("http://localhost:8080")
///     .event_handlers(EventHandlers::new().on_connect(|| println!("connected")))
///     .build()?;
///
/// let mut dashboard = client.subscribe(Topic::lot_dashboard(1));
/// client.connect().await?;
///
/// while let Some(item) = dashboard.next().await {
///     println!("{:?}", item?.payload);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ParkLinkClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    endpoint: Option<Url>,
    credentials: Credentials,
    timeouts: ParkLinkTimeouts,
    registry: Arc<SubscriptionRegistry>,
    state_rx: watch::Receiver<ConnectionState>,
    connection: Mutex<ConnectionSlot>,
}

/// The connection task is spawned on the first `connect`, so that `build()`
/// works outside a runtime.
enum ConnectionSlot {
    Idle {
        context: ConnectionContext,
        outbound_rx: OutboundReceiver,
    },
    Running(Arc<SharedConnection>),
    Starting,
}

impl ParkLinkClient {
    /// Create a new client builder.
    pub fn builder() -> ParkLinkClientBuilder {
        ParkLinkClientBuilder::new()
    }

    /// Connect to the configured endpoint.
    ///
    /// Returns once the request is queued; watch [`state_changes`] or use
    /// [`wait_until_connected`] to observe the outcome. Failures are retried
    /// according to the connection options.
    ///
    /// [`state_changes`]: Self::state_changes
    /// [`wait_until_connected`]: Self::wait_until_connected
    pub async fn connect(&self) -> Result<()> {
        let endpoint = self.inner.endpoint.clone().ok_or_else(|| {
            ParkLinkError::ConfigurationError("endpoint is required to connect".into())
        })?;
        self.connection()?
            .connect(endpoint, self.inner.credentials.clone())
            .await
    }

    /// Connect to an explicit endpoint, replacing any current link.
    pub async fn connect_to(&self, endpoint: &str, credentials: Credentials) -> Result<()> {
        let endpoint = resolve_endpoint(endpoint)?;
        self.connection()?.connect(endpoint, credentials).await
    }

    /// Close the link and stop reconnecting. Subscriptions stay registered
    /// and are sent again on the next `connect`.
    pub async fn disconnect(&self) -> Result<()> {
        let running = match &*self.inner.connection.lock() {
            ConnectionSlot::Running(connection) => Some(connection.clone()),
            _ => None,
        };
        match running {
            Some(connection) => connection.disconnect().await,
            None => Ok(()),
        }
    }

    /// Send a caller-built frame on the live link.
    ///
    /// Fails with [`ParkLinkError::NotConnected`] while no link is up.
    /// SUBSCRIBE and UNSUBSCRIBE are owned by the subscription registry
    /// and are rejected here.
    pub fn send(&self, frame: Frame) -> Result<()> {
        use crate::frame::Command;

        if matches!(
            frame.command(),
            Command::Subscribe | Command::Unsubscribe | Command::Connect | Command::Disconnect
        ) {
            return Err(ParkLinkError::ProtocolError(format!(
                "{} frames are managed by the client",
                frame.command()
            )));
        }
        frame.validate()?;
        self.inner.registry.send(frame)
    }

    /// Subscribe to `topic`. Returns immediately whatever the connection
    /// state; messages flow once the link is up.
    pub fn subscribe(&self, topic: Topic) -> SubscriptionHandle {
        self.inner.registry.acquire(topic)
    }

    /// Release a handle. Same as [`SubscriptionHandle::cancel`]; releasing
    /// twice is a no-op.
    pub fn release(&self, handle: &SubscriptionHandle) {
        handle.cancel();
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state_rx.borrow().is_connected()
    }

    /// Receiver that observes every connection state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_rx.clone()
    }

    /// Wait until the link is up, or fail with `timeout` elapsed.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.inner.state_rx.clone();
        let waited = tokio::time::timeout(timeout, rx.wait_for(ConnectionState::is_connected))
            .await
            .map(|r| r.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ParkLinkError::InternalError(
                "Connection task stopped".to_string(),
            )),
            Err(_) => Err(ParkLinkError::TransportError(format!(
                "Not connected after {:?} (state: {})",
                timeout,
                self.state()
            ))),
        }
    }

    /// Snapshot of every referenced topic, sorted by topic.
    pub fn list_subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.inner.registry.snapshot()
    }

    pub fn timeouts(&self) -> &ParkLinkTimeouts {
        &self.inner.timeouts
    }

    pub fn endpoint(&self) -> Option<&Url> {
        self.inner.endpoint.as_ref()
    }

    fn connection(&self) -> Result<Arc<SharedConnection>> {
        let mut slot = self.inner.connection.lock();
        if let ConnectionSlot::Running(connection) = &*slot {
            return Ok(connection.clone());
        }
        match std::mem::replace(&mut *slot, ConnectionSlot::Starting) {
            ConnectionSlot::Idle {
                context,
                outbound_rx,
            } => {
                log::debug!("[park-link] Starting connection task");
                let connection = Arc::new(SharedConnection::spawn(context, outbound_rx));
                *slot = ConnectionSlot::Running(connection.clone());
                Ok(connection)
            },
            other => {
                *slot = other;
                Err(ParkLinkError::InternalError(
                    "Connection task failed to start".to_string(),
                ))
            },
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if !matches!(&*self.connection.lock(), ConnectionSlot::Running(_)) {
            self.registry.close_all();
        }
    }
}

/// Builder for configuring [`ParkLinkClient`] instances.
pub struct ParkLinkClientBuilder {
    endpoint: Option<String>,
    credentials: Credentials,
    timeouts: ParkLinkTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    transport: Option<Arc<dyn Transport>>,
}

impl ParkLinkClientBuilder {
    fn new() -> Self {
        Self {
            endpoint: None,
            credentials: Credentials::anonymous(),
            timeouts: ParkLinkTimeouts::default(),
            connection_options: ConnectionOptions::default(),
            event_handlers: EventHandlers::new(),
            transport: None,
        }
    }

    /// Set the broker endpoint (`ws(s)://` or `http(s)://`).
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Set timeout configuration for the handshake, sends and heartbeats.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use park_link::{ParkLinkClient, ParkLinkTimeouts};
    ///
    /// # fn example() -> park_link::Result<()> {
    /// let client = ParkLinkClient::builder()
    ///     .endpoint("ws://localhost:8080/ws")
    ///     .timeouts(ParkLinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: ParkLinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set reconnection and queueing behavior.
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Replace the WebSocket transport, e.g. with an in-memory broker.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Build the client. Does not connect.
    pub fn build(self) -> Result<ParkLinkClient> {
        let endpoint = self.endpoint.as_deref().map(resolve_endpoint).transpose()?;
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(WebSocketTransport::new()));

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriptionRegistry::new(
            outbound_tx,
            self.connection_options.queue_capacity,
            self.connection_options.request_receipts,
        ));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let context = ConnectionContext {
            transport,
            registry: registry.clone(),
            timeouts: self.timeouts.clone(),
            options: self.connection_options,
            handlers: self.event_handlers,
            state_tx,
        };

        Ok(ParkLinkClient {
            inner: Arc::new(ClientInner {
                endpoint,
                credentials: self.credentials,
                timeouts: self.timeouts,
                registry,
                state_rx,
                connection: Mutex::new(ConnectionSlot::Idle {
                    context,
                    outbound_rx,
                }),
            }),
        })
    }
}
