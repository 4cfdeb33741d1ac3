//! Inbound frame dispatch.
//!
//! Runs on the connection task. MESSAGE bodies are decoded once and fanned
//! out through the registry; ERROR frames become broker errors on the
//! handles they concern.

use std::sync::Arc;

use super::registry::{Delivery, SubscriptionRegistry};
use crate::error::ParkLinkError;
use crate::frame::{Command, Frame, HEADER_MESSAGE, HEADER_RECEIPT_ID};
use crate::models::{DecodedMessage, Topic};

/// What the router did with one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RouteOutcome {
    Delivered { topic: Topic, handles: usize },
    /// MESSAGE for a topic nobody references.
    Dropped,
    /// RECEIPT confirmed the subscription of `topic`.
    Confirmed(Topic),
    /// ERROR naming a topic; its entry was torn down.
    TopicFailed { topic: Topic, handles: usize },
    /// ERROR without a destination; the link is unusable.
    ConnectionFailed(ParkLinkError),
    Ignored,
}

pub(crate) struct MessageRouter {
    registry: Arc<SubscriptionRegistry>,
}

impl MessageRouter {
    pub(crate) fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub(crate) fn route(&self, frame: &Frame) -> RouteOutcome {
        match frame.command() {
            Command::Message => self.route_message(frame),
            Command::Receipt => self.route_receipt(frame),
            Command::Error => self.route_error(frame),
            Command::Heartbeat => RouteOutcome::Ignored,
            other => {
                log::debug!("[park-link] Ignoring unexpected {} frame", other);
                RouteOutcome::Ignored
            },
        }
    }

    fn route_message(&self, frame: &Frame) -> RouteOutcome {
        let topic = match frame.destination() {
            Some(destination) => match Topic::new(destination) {
                Ok(topic) => topic,
                Err(e) => {
                    log::warn!("[park-link] Dropping MESSAGE: {}", e);
                    return RouteOutcome::Dropped;
                },
            },
            None => {
                let by_subscription = frame
                    .subscription()
                    .and_then(|id| self.registry.topic_for_subscription(id));
                match by_subscription {
                    Some(topic) => topic,
                    None => {
                        log::debug!(
                            "[park-link] Dropping MESSAGE without destination (subscription {:?})",
                            frame.subscription()
                        );
                        return RouteOutcome::Dropped;
                    },
                }
            },
        };

        if self.registry.ref_count(topic.as_str()) == 0 {
            log::debug!("[park-link] No subscriber for {}, message dropped", topic);
            return RouteOutcome::Dropped;
        }

        let message = DecodedMessage::from_frame(topic.clone(), frame);
        match self.registry.deliver(message) {
            Delivery::Delivered(handles) => RouteOutcome::Delivered { topic, handles },
            Delivery::NoSubscriber => {
                log::debug!("[park-link] {} released during dispatch, message dropped", topic);
                RouteOutcome::Dropped
            },
        }
    }

    fn route_receipt(&self, frame: &Frame) -> RouteOutcome {
        let Some(receipt_id) = frame.get_header(HEADER_RECEIPT_ID) else {
            log::debug!("[park-link] RECEIPT without receipt-id");
            return RouteOutcome::Ignored;
        };
        match self.registry.confirm_receipt(receipt_id) {
            Some(topic) => {
                log::debug!("[park-link] Broker confirmed {} ({})", topic, receipt_id);
                RouteOutcome::Confirmed(topic)
            },
            None => RouteOutcome::Ignored,
        }
    }

    fn route_error(&self, frame: &Frame) -> RouteOutcome {
        let message = frame.get_header(HEADER_MESSAGE).unwrap_or("broker error").to_string();
        let details = frame.has_body().then(|| frame.body_text());

        // A receipt-id naming one of our SUBSCRIBEs pins the error to its topic.
        let topic = match frame.destination() {
            Some(destination) => Topic::new(destination).ok(),
            None => frame
                .get_header(HEADER_RECEIPT_ID)
                .and_then(|id| self.registry.topic_for_subscription(id)),
        };

        match topic {
            Some(topic) => {
                let error = ParkLinkError::broker(Some(topic.to_string()), message, details);
                log::warn!("[park-link] {}", error);
                let handles = self.registry.fail_topic(&topic, error);
                RouteOutcome::TopicFailed { topic, handles }
            },
            None => {
                let error = ParkLinkError::broker(None, message, details);
                let handles = self.registry.fail_all(error.clone());
                log::warn!("[park-link] Connection-level {} ({} handle(s) ended)", error, handles);
                RouteOutcome::ConnectionFailed(error)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{HEADER_DESTINATION, HEADER_SUBSCRIPTION};
    use crate::models::{LiveEvent, MessagePayload};
    use crate::subscription::registry::OutboundReceiver;
    use tokio::sync::mpsc;

    fn setup() -> (Arc<SubscriptionRegistry>, MessageRouter, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(SubscriptionRegistry::new(tx, 8, false));
        registry.on_connected(1);
        (registry.clone(), MessageRouter::new(registry), rx)
    }

    fn message(destination: &str, body: &str) -> Frame {
        Frame::new(Command::Message)
            .header(HEADER_DESTINATION, destination)
            .header(HEADER_SUBSCRIPTION, "sub-0")
            .body(body)
    }

    #[test]
    fn test_message_routed_by_destination() {
        let (registry, router, _rx) = setup();
        let mut handle = registry.acquire(Topic::lot_dashboard(1));
        let body = r#"{"type":"OCCUPANCY_UPDATE","payload":{"parkingLotId":1,"occupiedSlots":1,"availableSlots":9,"occupancyPercentage":10.0}}"#;

        let outcome = router.route(&message("/topic/dashboard/1", body));
        assert_eq!(
            outcome,
            RouteOutcome::Delivered {
                topic: Topic::lot_dashboard(1),
                handles: 1
            }
        );
        let item = handle.try_next().unwrap().unwrap();
        assert!(matches!(
            item.payload,
            MessagePayload::Event(LiveEvent::OccupancyUpdate(_))
        ));
    }

    #[test]
    fn test_message_for_unreferenced_topic_dropped() {
        let (_registry, router, _rx) = setup();
        assert_eq!(router.route(&message("/topic/dashboard/5", "{}")), RouteOutcome::Dropped);
    }

    #[test]
    fn test_message_without_destination_routed_by_subscription() {
        let (registry, router, _rx) = setup();
        let mut handle = registry.acquire(Topic::lot_slots(2));
        let frame = Frame::new(Command::Message)
            .header(HEADER_SUBSCRIPTION, "sub-0")
            .body("hello");
        assert!(matches!(router.route(&frame), RouteOutcome::Delivered { .. }));
        assert_eq!(
            handle.try_next().unwrap().unwrap().payload,
            MessagePayload::Text("hello".to_string())
        );

        let unknown = Frame::new(Command::Message).header(HEADER_SUBSCRIPTION, "sub-77");
        assert_eq!(router.route(&unknown), RouteOutcome::Dropped);
    }

    #[test]
    fn test_error_with_destination_fails_only_that_topic() {
        let (registry, router, _rx) = setup();
        let mut alerts = registry.acquire(Topic::lot_alerts(1));
        let mut dashboard = registry.acquire(Topic::lot_dashboard(1));

        let error = Frame::new(Command::Error)
            .header(HEADER_DESTINATION, "/topic/alerts/1")
            .header(HEADER_MESSAGE, "access denied");
        assert!(matches!(
            router.route(&error),
            RouteOutcome::TopicFailed { handles: 1, .. }
        ));
        match alerts.try_next() {
            Some(Err(ParkLinkError::BrokerError {
                destination,
                message,
                ..
            })) => {
                assert_eq!(destination.as_deref(), Some("/topic/alerts/1"));
                assert_eq!(message, "access denied");
            },
            other => panic!("expected broker error, got {:?}", other),
        }
        assert!(alerts.is_closed());
        assert!(dashboard.try_next().is_none());
        assert!(!dashboard.is_closed());
    }

    #[test]
    fn test_error_with_receipt_id_targets_subscription() {
        let (registry, router, _rx) = setup();
        let _handle = registry.acquire(Topic::reservations());
        let error = Frame::new(Command::Error)
            .header(HEADER_RECEIPT_ID, "sub-0")
            .header(HEADER_MESSAGE, "no such destination");
        assert!(matches!(
            router.route(&error),
            RouteOutcome::TopicFailed { handles: 1, .. }
        ));
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_error_without_destination_is_connection_level() {
        let (registry, router, _rx) = setup();
        let mut a = registry.acquire(Topic::lot_alerts(1));
        let mut b = registry.acquire(Topic::lot_slots(1));
        let error = Frame::new(Command::Error)
            .header(HEADER_MESSAGE, "session expired")
            .body("details here");

        match router.route(&error) {
            RouteOutcome::ConnectionFailed(ParkLinkError::BrokerError { details, .. }) => {
                assert_eq!(details.as_deref(), Some("details here"));
            },
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(a.try_next().unwrap().is_err());
        assert!(b.try_next().unwrap().is_err());
        assert!(a.try_next().is_none());
        assert!(a.is_closed());
        assert!(b.is_closed());
        assert!(registry.snapshot().is_empty());

        // Nothing is left to replay on the next link.
        registry.on_disconnected();
        assert_eq!(registry.on_connected(2), 0);
    }

    #[test]
    fn test_receipt_confirms_subscription() {
        let (registry, router, _rx) = setup();
        let _handle = registry.acquire(Topic::session_exits());
        let receipt = Frame::new(Command::Receipt).header(HEADER_RECEIPT_ID, "sub-0");
        assert_eq!(
            router.route(&receipt),
            RouteOutcome::Confirmed(Topic::session_exits())
        );
        assert_eq!(router.route(&Frame::heartbeat()), RouteOutcome::Ignored);
    }
}
