//! `SubscriptionHandle` – what a caller holds for one topic subscription.
//!
//! Messages are pushed by the router into a bounded per-handle queue. When
//! the consumer falls behind and the queue is full, the oldest undelivered
//! message is discarded and counted in [`SubscriptionHandle::dropped_count`].
//! The router never waits on a consumer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::registry::SubscriptionRegistry;
use crate::error::{ParkLinkError, Result};
use crate::models::{DecodedMessage, Topic};

struct HandleQueue {
    items: VecDeque<Result<DecodedMessage>>,
    /// No further pushes are accepted; the stream ends once `items` drains.
    terminated: bool,
}

/// State shared between a handle, its canceller and the registry entry.
pub(crate) struct HandleShared {
    id: u64,
    topic: Topic,
    capacity: usize,
    cancelled: AtomicBool,
    queue: Mutex<HandleQueue>,
    notify: Notify,
    dropped: AtomicU64,
}

impl HandleShared {
    pub(crate) fn new(id: u64, topic: Topic, capacity: usize) -> Self {
        Self {
            id,
            topic,
            capacity: capacity.max(1),
            cancelled: AtomicBool::new(false),
            queue: Mutex::new(HandleQueue {
                items: VecDeque::new(),
                terminated: false,
            }),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Queue one item, discarding the oldest when full.
    pub(crate) fn push(&self, item: Result<DecodedMessage>) {
        if self.is_cancelled() {
            return;
        }
        {
            let mut queue = self.queue.lock();
            if queue.terminated {
                return;
            }
            if queue.items.len() >= self.capacity {
                queue.items.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                log::debug!(
                    "[park-link] Handle {} on {} is full, dropped oldest message ({} so far)",
                    self.id,
                    self.topic,
                    dropped
                );
            }
            queue.items.push_back(item);
        }
        self.notify.notify_one();
    }

    /// Queue a final error and end the stream after it.
    pub(crate) fn push_terminal(&self, error: ParkLinkError) {
        if self.is_cancelled() {
            return;
        }
        {
            let mut queue = self.queue.lock();
            if queue.terminated {
                return;
            }
            if queue.items.len() >= self.capacity {
                queue.items.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.items.push_back(Err(error));
            queue.terminated = true;
        }
        self.notify.notify_one();
    }

    /// Stop accepting pushes. Already queued items stay readable unless the
    /// handle was cancelled.
    pub(crate) fn close(&self) {
        self.queue.lock().terminated = true;
        self.notify.notify_one();
    }

    /// Returns `true` on the first call only.
    fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if first {
            let mut queue = self.queue.lock();
            queue.items.clear();
            queue.terminated = true;
        }
        self.notify.notify_one();
        first
    }

    fn try_pop(&self) -> Option<Option<Result<DecodedMessage>>> {
        if self.is_cancelled() {
            return Some(None);
        }
        let mut queue = self.queue.lock();
        match queue.items.pop_front() {
            Some(item) => Some(Some(item)),
            None if queue.terminated => Some(None),
            None => None,
        }
    }

    async fn next(&self) -> Option<Result<DecodedMessage>> {
        loop {
            if let Some(ready) = self.try_pop() {
                return ready;
            }
            self.notify.notified().await;
        }
    }
}

fn cancel_shared(shared: &HandleShared, registry: &Weak<SubscriptionRegistry>) {
    if shared.cancel() {
        if let Some(registry) = registry.upgrade() {
            registry.release(shared.id, &shared.topic);
        }
    }
}

/// A cancellable, push-driven sequence of decoded messages for one topic.
///
/// Obtained from [`ParkLinkClient::subscribe`](crate::ParkLinkClient::subscribe).
/// Each handle sees its topic's messages in broker delivery order. The
/// sequence ends (`None`) after cancellation, after a terminal broker error
/// for the topic, or when the client is dropped. Dropping the handle cancels
/// it.
///
/// # Examples
///
/// ```rust,no_run
/// use park_link::{ParkLinkClient, Topic};
///
/// # async fn example() -> park_link::Result<()> {
/// let client = ParkLinkClient::builder()
///     .endpoint("http://localhost:8080")
///     .build()?;
/// client.connect().await?;
///
/// let mut dashboard = client.subscribe(Topic::lot_dashboard(1));
/// while let Some(message) = dashboard.next().await {
///     match message {
///         Ok(msg) => println!("{:?}", msg.payload),
///         Err(e) => eprintln!("subscription ended: {}", e),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct SubscriptionHandle {
    shared: Arc<HandleShared>,
    registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub(crate) fn new(shared: Arc<HandleShared>, registry: Weak<SubscriptionRegistry>) -> Self {
        Self { shared, registry }
    }

    /// Process-unique id of this handle.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn topic(&self) -> &Topic {
        &self.shared.topic
    }

    /// Receive the next message. `Err` items are broker errors; a terminal
    /// one is followed by `None`.
    pub async fn next(&mut self) -> Option<Result<DecodedMessage>> {
        self.shared.next().await
    }

    /// Non-blocking variant of [`next`](Self::next): `None` when nothing is
    /// queued right now or the handle is finished.
    pub fn try_next(&mut self) -> Option<Result<DecodedMessage>> {
        self.shared.try_pop().flatten()
    }

    /// Cancel the subscription. Safe to call repeatedly; queued messages are
    /// discarded and the next call to `next()` returns `None`.
    pub fn cancel(&self) {
        cancel_shared(&self.shared, &self.registry);
    }

    /// A token that cancels this handle from another task.
    pub fn canceller(&self) -> SubscriptionCanceller {
        SubscriptionCanceller {
            shared: self.shared.clone(),
            registry: self.registry.clone(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    /// Returns `true` once no further messages will be queued.
    pub fn is_closed(&self) -> bool {
        self.shared.is_cancelled() || self.shared.queue.lock().terminated
    }

    /// Messages discarded because this handle's queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Messages currently queued and not yet taken.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().items.len()
    }

    /// Convert into a [`Stream`]. Dropping the stream cancels the handle.
    pub fn into_stream(self) -> impl Stream<Item = Result<DecodedMessage>> + Send + 'static {
        futures_util::stream::unfold(self, |mut handle| async move {
            handle.next().await.map(|item| (item, handle))
        })
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("id", &self.shared.id)
            .field("topic", &self.shared.topic)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        cancel_shared(&self.shared, &self.registry);
    }
}

/// Cancels a [`SubscriptionHandle`] from any task or thread.
#[derive(Clone)]
pub struct SubscriptionCanceller {
    shared: Arc<HandleShared>,
    registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionCanceller {
    pub fn cancel(&self) {
        cancel_shared(&self.shared, &self.registry);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

impl std::fmt::Debug for SubscriptionCanceller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionCanceller")
            .field("handle", &self.shared.id)
            .finish()
    }
}
