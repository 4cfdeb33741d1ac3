//! Broker link management.
//!
//! This module contains:
//! - [`shared`]: the background connection task that owns the transport,
//!   runs the handshake, heartbeats and reconnection, and feeds the router
//! - [`backoff`]: the reconnection delay schedule

pub(crate) mod backoff;
pub(crate) mod shared;

pub(crate) use shared::{ConnectionContext, SharedConnection};

/// A duration far enough in the future (~100 years) to act as "never" for
/// deadline calculations without overflowing `Instant::now() + dur`.
pub(crate) const FAR_FUTURE: std::time::Duration =
    std::time::Duration::from_secs(100 * 365 * 24 * 3600);

/// STOMP protocol version requested in CONNECT.
pub(crate) const ACCEPT_VERSION: &str = "1.2";
