//! Typed parking events carried in the `{ "type", "payload" }` envelope.

use serde::{Deserialize, Serialize};

use super::timestamp::LiveTimestamp;

/// Lot occupancy counters (`OCCUPANCY_UPDATE` on `/topic/dashboard/{lot}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccupancyUpdate {
    pub parking_lot_id: i64,
    pub occupied_slots: i64,
    pub available_slots: i64,
    pub occupancy_percentage: f64,
}

/// Notice that a lot crossed its high-occupancy threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighOccupancyAlert {
    pub parking_lot_id: i64,
    pub message: String,
    pub occupancy_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Occupied,
    Reserved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatusUpdate {
    pub parking_lot_id: i64,
    pub slot_id: i64,
    pub new_status: SlotStatus,
}

/// A vehicle entered a lot and a parking session started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleEntered {
    pub session_id: i64,
    pub vehicle_number: String,
    pub parking_lot_id: i64,
    pub parking_slot_id: i64,
    #[serde(default)]
    pub parking_slot_number: Option<String>,
    #[serde(default)]
    pub parking_lot_name: Option<String>,
    pub entry_time: LiveTimestamp,
}

/// A vehicle left; the session is closed and billed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleExited {
    pub session_id: i64,
    pub vehicle_number: String,
    pub parking_lot_id: i64,
    #[serde(default)]
    pub parking_lot_name: Option<String>,
    pub parking_slot_id: i64,
    pub entry_time: LiveTimestamp,
    #[serde(default)]
    pub exit_time: Option<LiveTimestamp>,
    #[serde(default)]
    pub total_amount: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Completed,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationUpdate {
    pub id: i64,
    pub vehicle_number: String,
    pub parking_slot_id: i64,
    pub parking_lot_id: i64,
    #[serde(default)]
    pub parking_lot_name: Option<String>,
    pub reservation_time: LiveTimestamp,
    #[serde(default)]
    pub expiration_time: Option<LiveTimestamp>,
    pub status: ReservationStatus,
}

/// One recognised parking event.
///
/// Serialized adjacently tagged, which is exactly the broker envelope:
/// `{"type":"OCCUPANCY_UPDATE","payload":{...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveEvent {
    OccupancyUpdate(OccupancyUpdate),
    SessionEntry(VehicleEntered),
    SessionExit(VehicleExited),
    HighOccupancyAlert(HighOccupancyAlert),
    SlotStatusUpdate(SlotStatusUpdate),
    ReservationUpdate(ReservationUpdate),
}

impl LiveEvent {
    /// Envelope `type` string of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            LiveEvent::OccupancyUpdate(_) => "OCCUPANCY_UPDATE",
            LiveEvent::SessionEntry(_) => "SESSION_ENTRY",
            LiveEvent::SessionExit(_) => "SESSION_EXIT",
            LiveEvent::HighOccupancyAlert(_) => "HIGH_OCCUPANCY_ALERT",
            LiveEvent::SlotStatusUpdate(_) => "SLOT_STATUS_UPDATE",
            LiveEvent::ReservationUpdate(_) => "RESERVATION_UPDATE",
        }
    }

    /// Lot the event belongs to.
    pub fn parking_lot_id(&self) -> i64 {
        match self {
            LiveEvent::OccupancyUpdate(e) => e.parking_lot_id,
            LiveEvent::SessionEntry(e) => e.parking_lot_id,
            LiveEvent::SessionExit(e) => e.parking_lot_id,
            LiveEvent::HighOccupancyAlert(e) => e.parking_lot_id,
            LiveEvent::SlotStatusUpdate(e) => e.parking_lot_id,
            LiveEvent::ReservationUpdate(e) => e.parking_lot_id,
        }
    }
}
