use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;
use tracing::trace;

use crate::entry::LogEntry;

/// Handle identifying one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

struct Subscriber {
    id: SubscriberId,
    tx: mpsc::UnboundedSender<LogEntry>,
}

#[derive(Default)]
struct Inner {
    seen: HashSet<u64>,
    history: Vec<LogEntry>,
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// Append-only, de-duplicated log with fan-out to subscribers.
///
/// Entries carrying a sequence number are kept only the first time that
/// number is seen. Unnumbered entries are always kept. Delivery happens
/// under the same lock as the append, so every subscriber receives entries
/// in append order.
#[derive(Default)]
pub struct LogMultiplexer {
    inner: Mutex<Inner>,
}

impl LogMultiplexer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Appends `entry` unless its number was already seen. Returns whether
    /// the entry was recorded.
    pub fn append(&self, entry: LogEntry) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(num) = entry.num
            && !inner.seen.insert(num)
        {
            trace!(num, "duplicate log line dropped");
            return false;
        }

        // Subscribers whose receiver is gone are pruned on the way.
        inner.subscribers.retain(|s| s.tx.send(entry.clone()).is_ok());
        inner.history.push(entry);
        true
    }

    /// Registers a live subscriber. Only entries appended afterwards are
    /// delivered; see [`Self::subscribe_with_history`].
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let mut inner = self.inner.lock().unwrap();
        self.register(&mut inner)
    }

    /// Returns the current history together with a subscription that starts
    /// right after it, so no entry is missed or seen twice.
    pub fn subscribe_with_history(self: &Arc<Self>) -> (Vec<LogEntry>, Subscription) {
        let mut inner = self.inner.lock().unwrap();
        let history = inner.history.clone();
        let sub = self.register(&mut inner);
        (history, sub)
    }

    fn register(self: &Arc<Self>, inner: &mut Inner) -> Subscription {
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        inner.subscribers.push(Subscriber { id, tx });
        Subscription {
            id,
            rx,
            mux: Arc::downgrade(self),
        }
    }

    /// Removes a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner
            .lock()
            .unwrap()
            .subscribers
            .retain(|s| s.id != id);
    }

    /// Snapshot of all recorded entries, oldest first.
    pub fn history(&self) -> Vec<LogEntry> {
        self.inner.lock().unwrap().history.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }
}

/// A live feed of appended entries. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<LogEntry>,
    mux: Weak<LogMultiplexer>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next entry. Returns `None` once the multiplexer is gone.
    pub async fn recv(&mut self) -> Option<LogEntry> {
        self.rx.recv().await
    }

    /// Next entry if one is already queued.
    pub fn try_recv(&mut self) -> Option<LogEntry> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(mux) = self.mux.upgrade() {
            mux.unsubscribe(self.id);
        }
    }
}
