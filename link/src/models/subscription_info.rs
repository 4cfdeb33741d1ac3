//! Subscription metadata exposed to callers.
//!
//! [`SubscriptionInfo`] is a read-only snapshot of one registry entry,
//! useful for debugging, tests, and status pages.

use serde::{Deserialize, Serialize};

use super::topic::Topic;

/// Read-only snapshot of an active topic subscription.
///
/// Returned by [`ParkLinkClient::list_subscriptions()`](crate::ParkLinkClient::list_subscriptions).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    pub topic: Topic,
    /// Id sent in the current link's SUBSCRIBE, or `None` while pending.
    pub subscription_id: Option<String>,
    /// Id confirmed by the broker (RECEIPT or first matching MESSAGE).
    pub broker_subscription_id: Option<String>,
    /// Number of live handles on this topic.
    pub ref_count: usize,
    /// Messages routed to this topic since the entry was created.
    pub delivered_count: u64,
    /// Timestamp (millis since Unix epoch) when the entry was created.
    pub created_at_ms: u64,
    /// Timestamp (millis since Unix epoch) of the last routed message,
    /// or `None` if none arrived yet.
    pub last_message_time_ms: Option<u64>,
}

impl SubscriptionInfo {
    /// Whether a SUBSCRIBE for this topic is waiting for the next connection.
    pub fn is_pending(&self) -> bool {
        self.subscription_id.is_none()
    }
}
