//! Data models for park-link.
//!
//! Connection settings and state, topic names, and the parking event types
//! decoded from MESSAGE bodies.

pub mod connection_options;
pub mod connection_state;
pub mod credentials;
pub mod decoded_message;
pub mod live_event;
pub mod subscription_info;
pub mod timestamp;
pub mod topic;


pub use connection_options::ConnectionOptions;
pub use connection_state::ConnectionState;
pub use credentials::Credentials;
pub use decoded_message::{DecodedMessage, MessagePayload};
pub use live_event::{
    HighOccupancyAlert, LiveEvent, OccupancyUpdate, ReservationStatus, ReservationUpdate,
    SlotStatus, SlotStatusUpdate, VehicleEntered, VehicleExited,
};
pub use subscription_info::SubscriptionInfo;
pub use timestamp::LiveTimestamp;
pub use topic::Topic;
