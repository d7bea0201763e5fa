//! End-to-end service scenarios against the in-memory store.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use strata_core::config::RequestSettings;
use strata_core::{
    ChangeKind, EntityKind, ErrorKind, NewObjectNode, NewObjectRelationship, PropertyKind,
    PropertyValue, RawProperties, Topic,
};
use strata_events::SubscriptionManager;
use strata_graph::{GraphStore, MemoryStore};
use strata_service::{GraphService, PropertyInputs};

fn setup() -> (GraphService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = GraphService::new(
        store.clone(),
        SubscriptionManager::new(16),
        RequestSettings::default(),
    );
    (service, store)
}

fn account(name: &str, balance: serde_json::Value) -> NewObjectNode {
    NewObjectNode {
        domain: "finance".into(),
        name: name.into(),
        type_name: "ACCOUNT".into(),
        labels: Vec::new(),
        properties: RawProperties::from([("balance".to_string(), balance)]),
    }
}

async fn seed_finance(service: &GraphService) {
    let ctx = service.context();
    service.schema().create_domain(&ctx, "finance").await.unwrap();
    service
        .schema()
        .create_type(
            &ctx,
            "finance",
            "ACCOUNT",
            &PropertyInputs::from([("balance".to_string(), PropertyKind::Float)]),
        )
        .await
        .unwrap();
}

fn label_set(labels: &[&str]) -> BTreeSet<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn account_lifecycle() {
    let (service, _) = setup();
    let ctx = service.context();
    seed_finance(&service).await;

    // Create.
    let alice = service
        .objects()
        .create_object_node(&ctx, &account("alice", json!(100.0)))
        .await
        .unwrap();
    assert_eq!(alice.domain, "FINANCE");
    assert_eq!(alice.labels, label_set(&["_FINANCE", "ACCOUNT"]));
    assert_eq!(alice.properties["balance"], PropertyValue::Float(100.0));

    // Same (domain, name, type) again.
    let err = service
        .objects()
        .create_object_node(&ctx, &account("alice", json!(100.0)))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateNode);

    // Type rename relabels the node in place.
    let account_type = service
        .schema()
        .list_types(&ctx, Some("finance"))
        .await
        .unwrap()
        .remove(0);
    service
        .schema()
        .rename_type(&ctx, &account_type.id, "ledger")
        .await
        .unwrap();
    let relabelled = service
        .objects()
        .get_object_node(&ctx, &alice.id)
        .await
        .unwrap();
    assert_eq!(relabelled.id, alice.id);
    assert_eq!(relabelled.labels, label_set(&["_FINANCE", "LEDGER"]));

    // Relationship, then cascade on endpoint delete.
    service
        .schema()
        .create_relationship_schema(
            &ctx,
            "OWES",
            "finance",
            "LEDGER",
            "LEDGER",
            &PropertyInputs::from([("amount".to_string(), PropertyKind::Float)]),
        )
        .await
        .unwrap();
    let mut bob = account("bob", json!(0.0));
    bob.type_name = "LEDGER".into();
    let bob = service.objects().create_object_node(&ctx, &bob).await.unwrap();

    let owes = service
        .objects()
        .create_object_relationship(
            &ctx,
            &NewObjectRelationship {
                name: "OWES".into(),
                from: alice.id.clone(),
                to: bob.id.clone(),
                properties: RawProperties::from([("amount".to_string(), json!(5))]),
            },
        )
        .await
        .unwrap();
    assert_eq!(owes.properties["amount"], PropertyValue::Float(5.0));

    service
        .objects()
        .delete_object_node(&ctx, &alice.id)
        .await
        .unwrap();
    let err = service
        .objects()
        .get_object_relationship(&ctx, &owes.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRelationship);
}

#[tokio::test]
async fn subscriber_sees_the_create() {
    let (service, _) = setup();
    seed_finance(&service).await;
    let mut sub = service.subscribe(Topic::new(EntityKind::ObjectNode, ChangeKind::Created));

    let ctx = service.context();
    let carol = service
        .objects()
        .create_object_node(&ctx, &account("carol", json!(1.5)))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("event within a second")
        .expect("subscription open");
    assert_eq!(event.id, carol.id);
    assert_eq!(event.topic.to_string(), "object_node.created");
    assert_eq!(event.data["properties"]["name"], json!("carol"));
    assert!(sub.try_recv().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_admit_exactly_one() {
    let (service, store) = setup();
    seed_finance(&service).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let ctx = service.context();
            service
                .objects()
                .create_object_node(&ctx, &account("dave", json!(1.0)))
                .await
        }));
    }

    let mut created = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::DuplicateNode);
                duplicates += 1;
            }
        }
    }
    assert_eq!((created, duplicates), (1, 9));

    let stored = store.nodes(Some("FINANCE"), Some("ACCOUNT")).await.unwrap();
    assert_eq!(stored.len(), 1);
}
