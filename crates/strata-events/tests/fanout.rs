//! Fan-out behaviour under slow and concurrent subscribers.

use std::time::Duration;

use strata_core::{ChangeKind, EntityId, EntityKind, Event, Topic};
use strata_events::SubscriptionManager;

const TOPIC: Topic = Topic::new(EntityKind::ObjectNode, ChangeKind::Updated);

fn event(n: usize) -> Event {
    Event::new(
        EntityId::from(format!("E{n:03}")),
        TOPIC,
        serde_json::json!({ "n": n }),
    )
}

#[tokio::test]
async fn blocked_subscriber_does_not_starve_others() {
    let manager = SubscriptionManager::new(1);
    let mut blocked = manager.subscribe(TOPIC);
    let mut attentive = manager.subscribe(TOPIC);

    let mut received = Vec::new();
    for n in 0..8 {
        let report = manager.publish(&event(n));
        assert_eq!(report.delivered + report.dropped, 2);
        received.push(attentive.recv().await.unwrap().id);
    }

    let expected: Vec<EntityId> = (0..8).map(|n| event(n).id).collect();
    assert_eq!(received, expected);

    // The blocked subscriber kept only the first event.
    assert_eq!(blocked.try_recv().unwrap().id, expected[0]);
    assert!(blocked.try_recv().is_none());
}

#[tokio::test]
async fn delivered_events_keep_publish_order() {
    let manager = SubscriptionManager::new(4);
    let sub = manager.subscribe(TOPIC);

    let publisher = {
        let manager = manager.clone();
        tokio::spawn(async move {
            for n in 0..200 {
                manager.publish(&event(n));
                if n % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            manager.close_all();
        })
    };

    let mut stream = Box::pin(sub.into_stream());
    let mut seen = Vec::new();
    while let Some(ev) = futures::StreamExt::next(&mut stream).await {
        seen.push(ev.id);
    }
    publisher.await.unwrap();

    assert!(!seen.is_empty());
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "events out of order");
}

#[tokio::test]
async fn publish_returns_promptly_with_many_idle_subscribers() {
    let manager = SubscriptionManager::new(1);
    let _subs: Vec<_> = (0..64).map(|_| manager.subscribe(TOPIC)).collect();

    let burst = tokio::time::timeout(Duration::from_secs(1), async {
        for n in 0..1_000 {
            manager.publish(&event(n));
        }
    })
    .await;
    assert!(burst.is_ok());
    assert_eq!(manager.subscriber_count(TOPIC), 64);
}
