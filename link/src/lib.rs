//! # park-link
//!
//! Multiplexed topic subscription client for the parking system's live
//! updates.
//!
//! One broker link (STOMP 1.2 frames over a WebSocket) is shared by any
//! number of subscription handles. Each topic is subscribed on the broker
//! once however many handles reference it, unsubscribed when the last
//! handle goes away, and replayed automatically after a reconnection.
//!
//! ## Features
//!
//! - **Reference-counted subscriptions**: one SUBSCRIBE per topic
//! - **Automatic reconnection**: exponential backoff with jitter, heartbeat
//!   watchdog, resubscription on every new link
//! - **Typed events**: MESSAGE bodies decoded once into [`LiveEvent`]s
//! - **Bounded delivery**: each handle has a drop-oldest queue so a slow
//!   consumer never stalls the link
//!
//! ## Example
//!
//! ```rust,no_run
//! use park_link::{EventHandlers, LiveEvent, ParkLinkClient, Topic};
//!
//! # async fn example() -> park_link::Result<()> {
//! let client = ParkLinkClient::builder()
//!     .endpoint("http://localhost:8080")
//!     .event_handlers(
//!         EventHandlers::new()
//!             .on_connect(|| println!("link up"))
//!             .on_disconnect(|reason| println!("link down: {}", reason)),
//!     )
//!     .build()?;
//!
//! let mut dashboard = client.subscribe(Topic::lot_dashboard(1));
//! client.connect().await?;
//!
//! while let Some(item) = dashboard.next().await {
//!     if let Some(LiveEvent::OccupancyUpdate(update)) = item?.event() {
//!         println!("lot {}: {}%", update.parking_lot_id, update.occupancy_percentage);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub(crate) mod connection;
pub mod error;
pub mod event_handlers;
pub mod frame;
pub mod models;
pub mod subscription;
pub mod timeouts;
pub mod transport;

pub use client::{ParkLinkClient, ParkLinkClientBuilder};
pub use codec::{decode_frame, encode_frame, encode_text, FrameDecoder};
pub use config::ParkLinkConfig;
pub use error::{ParkLinkError, Result};
pub use event_handlers::{ConnectionError, DisconnectReason, EventHandlers};
pub use frame::{Command, Frame};
pub use models::{
    ConnectionOptions, ConnectionState, Credentials, DecodedMessage, HighOccupancyAlert,
    LiveEvent, LiveTimestamp, MessagePayload, OccupancyUpdate, ReservationStatus,
    ReservationUpdate, SlotStatus, SlotStatusUpdate, SubscriptionInfo, Topic, VehicleEntered,
    VehicleExited,
};
pub use subscription::{SubscriptionCanceller, SubscriptionHandle};
pub use timeouts::{ParkLinkTimeouts, ParkLinkTimeoutsBuilder};
pub use transport::{resolve_endpoint, Transport, TransportEvent, TransportLink, WebSocketTransport};
