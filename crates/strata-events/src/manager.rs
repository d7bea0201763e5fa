use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use futures::Stream;
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use strata_core::config::SubscriptionSettings;
use strata_core::{Event, Topic};

/// Identifies one subscription within its topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type Table = RwLock<HashMap<Topic, HashMap<SubscriptionId, mpsc::Sender<Event>>>>;

/// Outcome of one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

/// Topic → subscriber table with drop-on-slow delivery.
///
/// Each subscriber receives a topic's events in the order `publish` was
/// called. Writers publish after their transaction commits, so events from
/// one writer follow its commit order, but two writers committing
/// concurrently may publish in either order. Consumers that need the latest
/// state should re-read the entity by id.
///
/// Clone is cheap; all clones share one table.
#[derive(Clone)]
pub struct SubscriptionManager {
    table: Arc<Table>,
    capacity: usize,
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::from_settings(&SubscriptionSettings::default())
    }
}

impl SubscriptionManager {
    pub fn new(capacity: usize) -> Self {
        Self {
            table: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn from_settings(settings: &SubscriptionSettings) -> Self {
        Self::new(settings.capacity)
    }

    /// Register a new subscriber on `topic`.
    pub fn subscribe(&self, topic: Topic) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriptionId::new();
        self.table
            .write()
            .entry(topic)
            .or_default()
            .insert(id, tx);
        tracing::debug!(%topic, subscription = %id, "Subscribed");
        Subscription {
            id,
            topic,
            rx,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Remove a subscriber, closing its channel. Returns whether it existed.
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        remove(&self.table, topic, id)
    }

    /// Offer `event` to every subscriber of its topic without waiting.
    pub fn publish(&self, event: &Event) -> PublishReport {
        let table = self.table.read();
        let mut report = PublishReport::default();
        let Some(subscribers) = table.get(&event.topic) else {
            return report;
        };
        for (id, tx) in subscribers {
            match tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    tracing::debug!(
                        topic = %event.topic,
                        subscription = %id,
                        event_id = %event.id,
                        "Subscriber channel full, event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    tracing::debug!(topic = %event.topic, subscription = %id, "Subscriber gone");
                }
            }
        }
        report
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.table.read().get(&topic).map_or(0, HashMap::len)
    }

    /// Drop every sender; readers observe end of stream.
    pub fn close_all(&self) {
        let mut table = self.table.write();
        let closed: usize = table.values().map(HashMap::len).sum();
        table.clear();
        tracing::info!(closed, "All subscriptions closed");
    }
}

fn remove(table: &Table, topic: Topic, id: SubscriptionId) -> bool {
    let mut table = table.write();
    let Some(subscribers) = table.get_mut(&topic) else {
        return false;
    };
    let existed = subscribers.remove(&id).is_some();
    if subscribers.is_empty() {
        table.remove(&topic);
    }
    if existed {
        tracing::debug!(%topic, subscription = %id, "Unsubscribed");
    }
    existed
}

/// Receiving end of one subscription. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    rx: mpsc::Receiver<Event>,
    table: Weak<Table>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Next event, or `None` once the subscription has been closed.
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = Event> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            remove(&table, self.topic, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use strata_core::{ChangeKind, EntityId, EntityKind};

    use super::*;

    const CREATED: Topic = Topic::new(EntityKind::ObjectNode, ChangeKind::Created);
    const DELETED: Topic = Topic::new(EntityKind::ObjectNode, ChangeKind::Deleted);

    fn event(topic: Topic, id: &str) -> Event {
        Event::new(EntityId::from(id), topic, serde_json::json!({}))
    }

    #[tokio::test]
    async fn delivers_only_to_matching_topic() {
        let manager = SubscriptionManager::new(4);
        let mut created = manager.subscribe(CREATED);
        let mut deleted = manager.subscribe(DELETED);

        let report = manager.publish(&event(CREATED, "A"));
        assert_eq!(report, PublishReport { delivered: 1, dropped: 0 });
        assert_eq!(created.recv().await.unwrap().id, EntityId::from("A"));
        assert!(deleted.try_recv().is_none());
    }

    #[test]
    fn full_channel_drops_without_blocking() {
        let manager = SubscriptionManager::new(1);
        let mut slow = manager.subscribe(CREATED);

        assert_eq!(manager.publish(&event(CREATED, "1")).delivered, 1);
        assert_eq!(manager.publish(&event(CREATED, "2")).dropped, 1);
        assert_eq!(slow.try_recv().unwrap().id, EntityId::from("1"));
        assert!(slow.try_recv().is_none());
    }

    #[test]
    fn drop_unsubscribes() {
        let manager = SubscriptionManager::default();
        let sub = manager.subscribe(CREATED);
        assert_eq!(manager.subscriber_count(CREATED), 1);
        drop(sub);
        assert_eq!(manager.subscriber_count(CREATED), 0);
    }

    #[tokio::test]
    async fn unsubscribe_ends_the_stream() {
        let manager = SubscriptionManager::default();
        let mut sub = manager.subscribe(CREATED);
        assert!(manager.unsubscribe(CREATED, sub.id()));
        assert!(!manager.unsubscribe(CREATED, sub.id()));
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_all_ends_every_stream() {
        let manager = SubscriptionManager::default();
        let mut a = manager.subscribe(CREATED);
        let mut b = manager.subscribe(DELETED);
        manager.close_all();
        assert!(a.recv().await.is_none());
        assert!(b.recv().await.is_none());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let manager = SubscriptionManager::new(0);
        let mut sub = manager.subscribe(CREATED);
        assert_eq!(manager.publish(&event(CREATED, "1")).delivered, 1);
        assert!(sub.try_recv().is_some());
    }
}
