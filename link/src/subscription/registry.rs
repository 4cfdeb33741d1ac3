//! Reference-counted topic subscriptions.
//!
//! The registry owns one [`SubscriptionEntry`] per topic that at least one
//! handle references, and is the only component that emits SUBSCRIBE and
//! UNSUBSCRIBE frames. All mutations happen under a single mutex; frames
//! are enqueued on the outbound channel while the lock is held, so the wire
//! order of SUBSCRIBE/UNSUBSCRIBE matches the order of `acquire`/`release`.
//!
//! Every outbound frame is tagged with the link epoch it was built for.
//! The connection manager drops frames from an older epoch, so nothing
//! meant for a dead link leaks onto its replacement.
//!
//! Lock order: registry, then a handle's queue. Handles never call back
//! into the registry while holding their own queue lock.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::handle::{HandleShared, SubscriptionHandle};
use crate::error::{ParkLinkError, Result};
use crate::frame::{Frame, HEADER_RECEIPT};
use crate::models::{DecodedMessage, SubscriptionInfo, Topic};

/// A frame queued for the connection task.
#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) epoch: u64,
    pub(crate) frame: Frame,
}

pub(crate) type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub(crate) type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

#[inline]
fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

struct SubscriptionEntry {
    topic: Topic,
    /// Id sent with SUBSCRIBE on the current link; `None` while pending.
    subscription_id: Option<String>,
    /// Set once the broker acknowledged `subscription_id`.
    broker_subscription_id: Option<String>,
    handles: Vec<Arc<HandleShared>>,
    created_at_ms: u64,
    last_message_time_ms: Option<u64>,
    delivered_count: u64,
}

impl SubscriptionEntry {
    fn new(topic: Topic) -> Self {
        Self {
            topic,
            subscription_id: None,
            broker_subscription_id: None,
            handles: Vec::new(),
            created_at_ms: now_ms(),
            last_message_time_ms: None,
            delivered_count: 0,
        }
    }

    fn snapshot(&self) -> SubscriptionInfo {
        SubscriptionInfo {
            topic: self.topic.clone(),
            subscription_id: self.subscription_id.clone(),
            broker_subscription_id: self.broker_subscription_id.clone(),
            ref_count: self.handles.len(),
            delivered_count: self.delivered_count,
            created_at_ms: self.created_at_ms,
            last_message_time_ms: self.last_message_time_ms,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<Topic, SubscriptionEntry>,
    /// Subscription id on the current link → topic.
    by_subscription_id: HashMap<String, Topic>,
    /// Epoch of the live link, `None` while not connected.
    link_epoch: Option<u64>,
    next_subscription_id: u64,
    next_handle_id: u64,
}

impl RegistryState {
    /// Assign a fresh id to `topic`'s entry and build its SUBSCRIBE.
    fn prepare_subscribe(&mut self, topic: &Topic, request_receipt: bool) -> Option<Frame> {
        let id = format!("sub-{}", self.next_subscription_id);
        let entry = self.entries.get_mut(topic)?;
        self.next_subscription_id += 1;

        entry.subscription_id = Some(id.clone());
        entry.broker_subscription_id = None;

        let mut frame = Frame::subscribe(topic.as_str(), &id);
        if request_receipt {
            frame = frame.header(HEADER_RECEIPT, id.clone());
        }
        self.by_subscription_id.insert(id, topic.clone());
        Some(frame)
    }
}

/// Result of handing an inbound MESSAGE to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Fanned out to this many handles.
    Delivered(usize),
    /// No entry for the topic.
    NoSubscriber,
}

pub(crate) struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    outbound: OutboundSender,
    queue_capacity: usize,
    request_receipts: bool,
}

impl SubscriptionRegistry {
    pub(crate) fn new(outbound: OutboundSender, queue_capacity: usize, request_receipts: bool) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            outbound,
            queue_capacity: queue_capacity.max(1),
            request_receipts,
        }
    }

    fn enqueue(&self, epoch: u64, frame: Frame) {
        if self.outbound.send(Outbound { epoch, frame }).is_err() {
            log::debug!("[park-link] Connection task gone; outbound frame discarded");
        }
    }

    /// Add a handle for `topic`. Only the first handle of a topic produces a
    /// SUBSCRIBE, and only while connected; otherwise the entry waits for
    /// the next [`on_connected`](Self::on_connected).
    pub(crate) fn acquire(self: &Arc<Self>, topic: Topic) -> SubscriptionHandle {
        let mut state = self.state.lock();
        state.next_handle_id += 1;
        let shared = Arc::new(HandleShared::new(
            state.next_handle_id,
            topic.clone(),
            self.queue_capacity,
        ));

        let entry = state
            .entries
            .entry(topic.clone())
            .or_insert_with(|| SubscriptionEntry::new(topic.clone()));
        entry.handles.push(shared.clone());
        let first = entry.handles.len() == 1;

        if first {
            match state.link_epoch {
                Some(epoch) => {
                    if let Some(frame) = state.prepare_subscribe(&topic, self.request_receipts) {
                        log::debug!("[park-link] Subscribing to {}", topic);
                        self.enqueue(epoch, frame);
                    }
                },
                None => log::debug!("[park-link] {} pending until connected", topic),
            }
        }
        drop(state);

        SubscriptionHandle::new(shared, Arc::downgrade(self))
    }

    /// Remove handle `handle_id` from `topic`. Returns `false` when the
    /// handle was already gone, which makes repeated release a no-op.
    pub(crate) fn release(&self, handle_id: u64, topic: &Topic) -> bool {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(topic) else {
            return false;
        };
        let Some(pos) = entry.handles.iter().position(|h| h.id() == handle_id) else {
            return false;
        };
        let handle = entry.handles.remove(pos);
        handle.close();

        if entry.handles.is_empty() {
            if let Some(entry) = state.entries.remove(topic) {
                if let Some(id) = entry.subscription_id {
                    state.by_subscription_id.remove(&id);
                    if let Some(epoch) = state.link_epoch {
                        log::debug!("[park-link] Unsubscribing from {} ({})", topic, id);
                        self.enqueue(epoch, Frame::unsubscribe(topic.as_str(), &id));
                    }
                }
            }
        }
        true
    }

    /// A new link finished its handshake: replay SUBSCRIBE for every
    /// referenced topic with ids fresh for this link. Returns the count.
    pub(crate) fn on_connected(&self, epoch: u64) -> usize {
        let mut state = self.state.lock();
        state.link_epoch = Some(epoch);
        state.by_subscription_id.clear();

        let mut topics: Vec<Topic> = state.entries.keys().cloned().collect();
        topics.sort();
        if !topics.is_empty() {
            log::info!(
                "[park-link] Subscribing {} active topic(s) on new link",
                topics.len()
            );
        }
        for topic in &topics {
            if let Some(frame) = state.prepare_subscribe(topic, self.request_receipts) {
                self.enqueue(epoch, frame);
            }
        }
        topics.len()
    }

    /// The link is gone. Broker-side subscriptions died with it.
    pub(crate) fn on_disconnected(&self) {
        let mut state = self.state.lock();
        state.link_epoch = None;
        state.by_subscription_id.clear();
        for entry in state.entries.values_mut() {
            entry.subscription_id = None;
            entry.broker_subscription_id = None;
        }
    }

    /// Queue a caller-built frame on the live link.
    pub(crate) fn send(&self, frame: Frame) -> Result<()> {
        let epoch = self.state.lock().link_epoch.ok_or(ParkLinkError::NotConnected)?;
        self.outbound
            .send(Outbound { epoch, frame })
            .map_err(|_| ParkLinkError::TransportError("Connection task is not running".to_string()))
    }

    /// Topic currently subscribed under `subscription_id`.
    pub(crate) fn topic_for_subscription(&self, subscription_id: &str) -> Option<Topic> {
        self.state.lock().by_subscription_id.get(subscription_id).cloned()
    }

    /// Fan one decoded message out to every handle on its topic.
    pub(crate) fn deliver(&self, message: DecodedMessage) -> Delivery {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(&message.topic) else {
            return Delivery::NoSubscriber;
        };

        if entry.broker_subscription_id.is_none() {
            if let (Some(sent), Some(seen)) = (&entry.subscription_id, &message.subscription_id) {
                if sent == seen {
                    entry.broker_subscription_id = Some(seen.clone());
                }
            }
        }
        entry.delivered_count += 1;
        entry.last_message_time_ms = Some(now_ms());

        let count = entry.handles.len();
        if let Some((last, rest)) = entry.handles.split_last() {
            for handle in rest {
                handle.push(Ok(message.clone()));
            }
            last.push(Ok(message));
        }
        Delivery::Delivered(count)
    }

    /// RECEIPT for a SUBSCRIBE: confirm the broker id. Returns the topic.
    pub(crate) fn confirm_receipt(&self, receipt_id: &str) -> Option<Topic> {
        let mut state = self.state.lock();
        let topic = state.by_subscription_id.get(receipt_id).cloned()?;
        let entry = state.entries.get_mut(&topic)?;
        if entry.subscription_id.as_deref() == Some(receipt_id) {
            entry.broker_subscription_id = Some(receipt_id.to_string());
        }
        Some(topic)
    }

    /// Terminal broker error for one topic: every handle receives `error`
    /// and ends, and the entry is torn down. Returns the number of handles.
    pub(crate) fn fail_topic(&self, topic: &Topic, error: ParkLinkError) -> usize {
        let mut state = self.state.lock();
        let Some(entry) = state.entries.remove(topic) else {
            return 0;
        };
        if let Some(id) = &entry.subscription_id {
            state.by_subscription_id.remove(id);
            if let Some(epoch) = state.link_epoch {
                self.enqueue(epoch, Frame::unsubscribe(topic.as_str(), id));
            }
        }
        for handle in &entry.handles {
            handle.push_terminal(error.clone());
        }
        entry.handles.len()
    }

    /// Broker error that names no topic: every handle receives `error` and
    /// ends, and every entry is torn down, so nothing is replayed on the next
    /// link. Returns the number of handles.
    pub(crate) fn fail_all(&self, error: ParkLinkError) -> usize {
        let mut state = self.state.lock();
        state.by_subscription_id.clear();
        let mut count = 0;
        for (_, entry) in state.entries.drain() {
            for handle in &entry.handles {
                handle.push_terminal(error.clone());
            }
            count += entry.handles.len();
        }
        count
    }

    /// End every handle's stream; used on client shutdown.
    pub(crate) fn close_all(&self) {
        let state = self.state.lock();
        for handle in state.entries.values().flat_map(|e| e.handles.iter()) {
            handle.close();
        }
    }

    pub(crate) fn snapshot(&self) -> Vec<SubscriptionInfo> {
        let state = self.state.lock();
        let mut infos: Vec<SubscriptionInfo> =
            state.entries.values().map(SubscriptionEntry::snapshot).collect();
        infos.sort_by(|a, b| a.topic.cmp(&b.topic));
        infos
    }

    pub(crate) fn ref_count(&self, topic: &str) -> usize {
        self.state.lock().entries.get(topic).map_or(0, |e| e.handles.len())
    }
}
