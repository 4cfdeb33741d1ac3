//! Topic subscriptions multiplexed over one broker link.
//!
//! - [`registry`]: reference counts handles per topic and emits
//!   SUBSCRIBE/UNSUBSCRIBE
//! - [`router`]: dispatches inbound MESSAGE, RECEIPT and ERROR frames
//! - [`handle`]: the caller-facing [`SubscriptionHandle`]

pub(crate) mod handle;
pub(crate) mod registry;
pub(crate) mod router;

pub use handle::{SubscriptionCanceller, SubscriptionHandle};
pub(crate) use registry::{Outbound, OutboundReceiver, SubscriptionRegistry};
pub(crate) use router::{MessageRouter, RouteOutcome};
