//! Topic names.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ParkLinkError, Result};

/// Opaque, immutable name of a broker message channel.
///
/// Cheap to clone; used as the subscription registry key. The only
/// constraints are the wire-level ones: non-empty and no NUL character.
///
/// The parking broker's well-known channels have constructors:
///
/// ```rust
/// use park_link::Topic;
///
/// assert_eq!(Topic::lot_dashboard(1).as_str(), "/topic/dashboard/1");
/// assert_eq!(Topic::reservations().as_str(), "/topic/reservation");
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Topic(Arc<str>);

impl Topic {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ParkLinkError::InvalidTopic("topic name is empty".to_string()));
        }
        if name.contains('\0') {
            return Err(ParkLinkError::InvalidTopic(format!(
                "topic name contains a NUL character: {:?}",
                name
            )));
        }
        Ok(Self(Arc::from(name)))
    }

    fn well_known(name: String) -> Self {
        Self(Arc::from(name))
    }

    /// Occupancy counters of one lot (`OCCUPANCY_UPDATE`).
    pub fn lot_dashboard(lot_id: i64) -> Self {
        Self::well_known(format!("/topic/dashboard/{}", lot_id))
    }

    /// High-occupancy notices of one lot (`HIGH_OCCUPANCY_ALERT`).
    pub fn lot_alerts(lot_id: i64) -> Self {
        Self::well_known(format!("/topic/alerts/{}", lot_id))
    }

    /// Slot status changes of one lot (`SLOT_STATUS_UPDATE`).
    pub fn lot_slots(lot_id: i64) -> Self {
        Self::well_known(format!("/topic/slots/{}", lot_id))
    }

    /// Vehicle entries across all lots (`SESSION_ENTRY`).
    pub fn session_entries() -> Self {
        Self::well_known("/topic/sessions-entry".to_string())
    }

    /// Vehicle exits across all lots (`SESSION_EXIT`).
    pub fn session_exits() -> Self {
        Self::well_known("/topic/sessions-exit".to_string())
    }

    /// Reservation lifecycle changes (`RESERVATION_UPDATE`).
    pub fn reservations() -> Self {
        Self::well_known("/topic/reservation".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({:?})", &*self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Topic {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Topic {
    type Error = ParkLinkError;

    fn try_from(value: &str) -> Result<Self> {
        Topic::new(value)
    }
}

impl TryFrom<String> for Topic {
    type Error = ParkLinkError;

    fn try_from(value: String) -> Result<Self> {
        Topic::new(value)
    }
}

impl std::str::FromStr for Topic {
    type Err = ParkLinkError;

    fn from_str(s: &str) -> Result<Self> {
        Topic::new(s)
    }
}

impl Serialize for Topic {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Topic::new(raw).map_err(serde::de::Error::custom)
    }
}
