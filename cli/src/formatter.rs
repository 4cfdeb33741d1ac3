//! Output formatting for watched messages.

use park_link::{DecodedMessage, LiveEvent, LiveTimestamp, MessagePayload};

/// One output line for `message`: a JSON object, or a short human summary.
pub fn format_message(message: &DecodedMessage, json: bool) -> serde_json::Result<String> {
    if json {
        return serde_json::to_string(message);
    }
    Ok(format!("[{}] {}", message.topic, summarize(&message.payload)))
}

fn summarize(payload: &MessagePayload) -> String {
    match payload {
        MessagePayload::Event(event) => format!("{} {}", event.kind(), describe(event)),
        MessagePayload::Json { kind, value } => match kind {
            Some(kind) => format!("{} {}", kind, value),
            None => value.to_string(),
        },
        MessagePayload::Text(text) => text.clone(),
    }
}

fn describe(event: &LiveEvent) -> String {
    match event {
        LiveEvent::OccupancyUpdate(e) => format!(
            "lot {}: {}/{} occupied ({:.1}%)",
            e.parking_lot_id,
            e.occupied_slots,
            e.occupied_slots + e.available_slots,
            e.occupancy_percentage
        ),
        LiveEvent::HighOccupancyAlert(e) => format!(
            "lot {}: {} ({:.1}%)",
            e.parking_lot_id, e.message, e.occupancy_percentage
        ),
        LiveEvent::SlotStatusUpdate(e) => {
            format!("lot {} slot {}: {:?}", e.parking_lot_id, e.slot_id, e.new_status)
        },
        LiveEvent::SessionEntry(e) => format!(
            "{} entered lot {} slot {} at {}",
            e.vehicle_number,
            e.parking_lot_id,
            e.parking_slot_number.clone().unwrap_or_else(|| e.parking_slot_id.to_string()),
            time(&e.entry_time)
        ),
        LiveEvent::SessionExit(e) => {
            let mut line = format!("{} left lot {}", e.vehicle_number, e.parking_lot_id);
            if let Some(exit) = &e.exit_time {
                line.push_str(&format!(" at {}", time(exit)));
            }
            if let Some(amount) = e.total_amount {
                line.push_str(&format!(", charged {:.2}", amount));
            }
            line
        },
        LiveEvent::ReservationUpdate(e) => format!(
            "reservation {} for {} at lot {}: {:?}",
            e.id, e.vehicle_number, e.parking_lot_id, e.status
        ),
    }
}

fn time(ts: &LiveTimestamp) -> String {
    ts.to_datetime()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "?".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_link::Topic;

    fn message(body: &str) -> DecodedMessage {
        DecodedMessage {
            topic: Topic::lot_dashboard(1),
            subscription_id: Some("sub-0".to_string()),
            message_id: Some("m-1".to_string()),
            payload: MessagePayload::decode(body.as_bytes()),
        }
    }

    #[test]
    fn test_occupancy_summary() {
        let msg = message(
            r#"{"type":"OCCUPANCY_UPDATE","payload":{"parkingLotId":1,"occupiedSlots":45,"availableSlots":55,"occupancyPercentage":45.0}}"#,
        );
        assert_eq!(
            format_message(&msg, false).unwrap(),
            "[/topic/dashboard/1] OCCUPANCY_UPDATE lot 1: 45/100 occupied (45.0%)"
        );
    }

    #[test]
    fn test_session_exit_summary() {
        let msg = message(
            r#"{"type":"SESSION_EXIT","payload":{"sessionId":9,"vehicleNumber":"KA01AB1234","parkingLotId":1,"parkingSlotId":3,"entryTime":"2024-05-01T08:00:00","exitTime":"2024-05-01T10:30:00","totalAmount":60.0}}"#,
        );
        assert_eq!(
            format_message(&msg, false).unwrap(),
            "[/topic/dashboard/1] SESSION_EXIT KA01AB1234 left lot 1 at 2024-05-01 10:30:00, charged 60.00"
        );
    }

    #[test]
    fn test_text_and_json_output() {
        let msg = message("maintenance window at 02:00");
        assert_eq!(
            format_message(&msg, false).unwrap(),
            "[/topic/dashboard/1] maintenance window at 02:00"
        );

        let line = format_message(&msg, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["topic"], "/topic/dashboard/1");
        assert_eq!(value["payload"]["category"], "text");
    }
}
