//! Invariants of the service layer: identity, conformance, cascades,
//! event delivery, failure paths.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use strata_core::config::RequestSettings;
use strata_core::{
    ChangeKind, EntityId, EntityKind, ErrorKind, NewObjectNode, NewObjectRelationship,
    PropertyKind, PropertyValue, RawProperties, Topic, TypeSchema,
};
use strata_events::SubscriptionManager;
use strata_graph::MemoryStore;
use strata_service::{GraphService, PropertyInputs};
use tokio_util::sync::CancellationToken;

const NODE_CREATED: Topic = Topic::new(EntityKind::ObjectNode, ChangeKind::Created);

fn setup_with(capacity: usize) -> (GraphService, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = GraphService::new(
        store.clone(),
        SubscriptionManager::new(capacity),
        RequestSettings::default(),
    );
    (service, store)
}

fn setup() -> (GraphService, Arc<MemoryStore>) {
    setup_with(64)
}

async fn person_type(service: &GraphService, domain: &str) -> TypeSchema {
    let ctx = service.context();
    service.schema().create_domain(&ctx, domain).await.unwrap();
    service
        .schema()
        .create_type(
            &ctx,
            domain,
            "PERSON",
            &PropertyInputs::from([("age".to_string(), PropertyKind::Integer)]),
        )
        .await
        .unwrap()
}

fn person(domain: &str, name: &str) -> NewObjectNode {
    NewObjectNode {
        domain: domain.into(),
        name: name.into(),
        type_name: "person".into(),
        ..NewObjectNode::default()
    }
}

#[tokio::test]
async fn names_are_normalised_on_the_way_in() {
    let (service, _) = setup();
    let ctx = service.context();
    let domain = service.schema().create_domain(&ctx, " foo ").await.unwrap();
    assert_eq!(domain.name, "FOO");
    let fetched = service.schema().get_domain(&ctx, &domain.id).await.unwrap();
    assert_eq!(fetched.name, "FOO");

    let err = service.schema().create_domain(&ctx, "Foo").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSchema);

    let err = service.schema().create_domain(&ctx, "no-dash").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidName);
}

#[tokio::test]
async fn node_id_survives_every_edit() {
    let (service, _) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    let objects = service.objects();

    let node = objects.create_object_node(&ctx, &person("HR", "ann")).await.unwrap();
    let id = node.id.clone();

    let renamed = objects.rename_object_node(&ctx, &id, "anne").await.unwrap();
    let labelled = objects
        .add_labels(&ctx, &id, &["manager".into(), "MANAGER".into()])
        .await
        .unwrap();
    let typed = objects
        .set_properties(&ctx, &id, &RawProperties::from([("age".to_string(), json!("41"))]))
        .await
        .unwrap();
    let stripped = objects
        .remove_properties(&ctx, &id, &["age".into()])
        .await
        .unwrap();
    for n in [&renamed, &labelled, &typed, &stripped] {
        assert_eq!(n.id, id);
    }
    assert_eq!(renamed.name, "anne");
    assert!(labelled.labels.contains("MANAGER"));
    assert_eq!(typed.properties["age"], PropertyValue::Integer(41));
    assert!(stripped.properties.is_empty());

    objects.delete_object_node(&ctx, &id).await.unwrap();
    let again = objects.create_object_node(&ctx, &person("HR", "anne")).await.unwrap();
    assert_ne!(again.id, id);
}

#[tokio::test]
async fn undeclared_property_is_accepted_once_declared() {
    let (service, _) = setup();
    let ctx = service.context();
    let person_schema = person_type(&service, "HR").await;

    let mut request = person("HR", "bo");
    request
        .properties
        .insert("email".into(), json!("bo@example.com"));

    let err = service
        .objects()
        .create_object_node(&ctx, &request)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PropertySchemaViolation);

    service
        .schema()
        .add_property(&ctx, &person_schema.id, "email", PropertyKind::String)
        .await
        .unwrap();
    let node = service
        .objects()
        .create_object_node(&ctx, &request)
        .await
        .unwrap();
    assert_eq!(
        node.properties["email"],
        PropertyValue::String("bo@example.com".into())
    );
}

#[tokio::test]
async fn add_property_same_kind_is_a_no_op_and_other_kind_is_refused() {
    let (service, _) = setup();
    let ctx = service.context();
    let schema = person_type(&service, "HR").await;
    let mut updates = service.subscribe(Topic::new(EntityKind::TypeSchema, ChangeKind::Updated));

    let same = service
        .schema()
        .add_property(&ctx, &schema.id, "AGE", PropertyKind::Integer)
        .await
        .unwrap();
    assert_eq!(same.properties, schema.properties);
    assert!(updates.try_recv().is_none());

    let err = service
        .schema()
        .add_property(&ctx, &schema.id, "age", PropertyKind::Float)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PropertySchemaViolation);
}

#[tokio::test]
async fn property_rename_and_removal_reach_nodes() {
    let (service, _) = setup();
    let ctx = service.context();
    let schema = person_type(&service, "HR").await;

    let mut request = person("HR", "cy");
    request.properties.insert("age".into(), json!(30));
    let node = service
        .objects()
        .create_object_node(&ctx, &request)
        .await
        .unwrap();

    service
        .schema()
        .rename_property(&ctx, &schema.id, "age", "years")
        .await
        .unwrap();
    let read = service.objects().get_object_node(&ctx, &node.id).await.unwrap();
    assert_eq!(read.properties["years"], PropertyValue::Integer(30));
    assert!(!read.properties.contains_key("age"));

    let updated = service
        .schema()
        .remove_properties(&ctx, &schema.id, &["years".into()])
        .await
        .unwrap();
    assert!(updated.properties.is_empty());
    let read = service.objects().get_object_node(&ctx, &node.id).await.unwrap();
    assert!(read.properties.is_empty());

    let err = service
        .schema()
        .remove_properties(&ctx, &schema.id, &["years".into()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PropertySchemaViolation);
}

#[tokio::test]
async fn structural_labels_cannot_be_removed() {
    let (service, _) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    let node = service
        .objects()
        .create_object_node(&ctx, &person("HR", "di"))
        .await
        .unwrap();

    let err = service
        .objects()
        .remove_labels(&ctx, &node.id, &["PERSON".into()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservedLabel);

    let err = service
        .objects()
        .remove_labels(&ctx, &node.id, &["_HR".into()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ReservedLabel);

    service
        .objects()
        .add_labels(&ctx, &node.id, &["temp".into()])
        .await
        .unwrap();
    let node = service
        .objects()
        .remove_labels(&ctx, &node.id, &["TEMP".into(), "ABSENT".into()])
        .await
        .unwrap();
    assert_eq!(node.labels.len(), 2);
}

#[tokio::test]
async fn deleting_a_node_takes_all_its_relationships() {
    let (service, _) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    service
        .schema()
        .create_relationship_schema(&ctx, "KNOWS", "HR", "PERSON", "PERSON", &PropertyInputs::new())
        .await
        .unwrap();

    let objects = service.objects();
    let hub = objects.create_object_node(&ctx, &person("HR", "hub")).await.unwrap();
    let mut spokes = Vec::new();
    for name in ["a", "b", "c"] {
        let spoke = objects.create_object_node(&ctx, &person("HR", name)).await.unwrap();
        let (from, to) = if name == "b" {
            (spoke.id.clone(), hub.id.clone())
        } else {
            (hub.id.clone(), spoke.id.clone())
        };
        let rel = objects
            .create_object_relationship(
                &ctx,
                &NewObjectRelationship {
                    name: "knows".into(),
                    from,
                    to,
                    properties: RawProperties::new(),
                },
            )
            .await
            .unwrap();
        spokes.push((spoke, rel));
    }
    assert_eq!(
        objects
            .list_object_relationships(&ctx, Some(&hub.id))
            .await
            .unwrap()
            .len(),
        3
    );

    objects.delete_object_node(&ctx, &hub.id).await.unwrap();
    for (_, rel) in &spokes {
        let err = objects
            .get_object_relationship(&ctx, &rel.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownRelationship);
    }
    assert!(objects
        .list_object_relationships(&ctx, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn relationships_are_checked_against_their_schema() {
    let (service, _) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    person_type(&service, "OPS").await;
    service
        .schema()
        .create_relationship_schema(
            &ctx,
            "REPORTS_TO",
            "HR",
            "PERSON",
            "PERSON",
            &PropertyInputs::from([("since".to_string(), PropertyKind::Integer)]),
        )
        .await
        .unwrap();

    let objects = service.objects();
    let a = objects.create_object_node(&ctx, &person("HR", "a")).await.unwrap();
    let b = objects.create_object_node(&ctx, &person("HR", "b")).await.unwrap();
    let outsider = objects.create_object_node(&ctx, &person("OPS", "x")).await.unwrap();

    let edge = |name: &str, from: &EntityId, to: &EntityId| NewObjectRelationship {
        name: name.into(),
        from: from.clone(),
        to: to.clone(),
        properties: RawProperties::from([("since".to_string(), json!(2020))]),
    };

    let err = objects
        .create_object_relationship(&ctx, &edge("MANAGES", &a.id, &b.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRelationshipSchema);

    let err = objects
        .create_object_relationship(&ctx, &edge("REPORTS_TO", &a.id, &outsider.id))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRelationshipSchema);

    let err = objects
        .create_object_relationship(&ctx, &edge("REPORTS_TO", &a.id, &EntityId::new()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownNode);

    let rel = objects
        .create_object_relationship(&ctx, &edge("REPORTS_TO", &a.id, &b.id))
        .await
        .unwrap();

    let err = objects
        .rename_object_relationship(&ctx, &rel.id, "MANAGES")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRelationshipSchema);

    let updated = objects
        .set_relationship_properties(
            &ctx,
            &rel.id,
            &RawProperties::from([("since".to_string(), json!("2021"))]),
        )
        .await
        .unwrap();
    assert_eq!(updated.id, rel.id);
    assert_eq!(updated.properties["since"], PropertyValue::Integer(2021));

    let stripped = objects
        .remove_relationship_properties(&ctx, &rel.id, &["since".into()])
        .await
        .unwrap();
    assert!(stripped.properties.is_empty());

    objects.delete_object_relationship(&ctx, &rel.id).await.unwrap();
    let err = objects
        .delete_object_relationship(&ctx, &rel.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownRelationship);
}

#[tokio::test]
async fn relationship_schema_lifecycle() {
    let (service, _) = setup();
    let ctx = service.context();
    let person_schema = person_type(&service, "HR").await;
    let schema = service
        .schema()
        .create_relationship_schema(&ctx, "KNOWS", "HR", "PERSON", "PERSON", &PropertyInputs::new())
        .await
        .unwrap();

    let err = service
        .schema()
        .create_relationship_schema(&ctx, "KNOWS", "HR", "PERSON", "PERSON", &PropertyInputs::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateSchema);

    let err = service
        .schema()
        .create_relationship_schema(&ctx, "LIKES", "HR", "PERSON", "ROBOT", &PropertyInputs::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownType);

    let mutated = service
        .schema()
        .mutate_rel_schema_properties(
            &ctx,
            &schema.id,
            &PropertyInputs::from([("weight".to_string(), PropertyKind::Float)]),
            &[],
        )
        .await
        .unwrap();
    assert!(mutated.properties.contains_key("weight"));

    let objects = service.objects();
    let a = objects.create_object_node(&ctx, &person("HR", "a")).await.unwrap();
    let b = objects.create_object_node(&ctx, &person("HR", "b")).await.unwrap();
    let rel = objects
        .create_object_relationship(
            &ctx,
            &NewObjectRelationship {
                name: "KNOWS".into(),
                from: a.id.clone(),
                to: b.id.clone(),
                properties: RawProperties::from([("weight".to_string(), json!(0.5))]),
            },
        )
        .await
        .unwrap();

    let renamed = service
        .schema()
        .rename_relationship_schema(&ctx, &schema.id, "befriends")
        .await
        .unwrap();
    assert_eq!(renamed.id, schema.id);
    assert_eq!(renamed.name, "BEFRIENDS");
    let read = objects.get_object_relationship(&ctx, &rel.id).await.unwrap();
    assert_eq!(read.name, "BEFRIENDS");

    let err = service
        .schema()
        .delete_relationship_schema(&ctx, &schema.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaInUse);

    let err = service
        .schema()
        .delete_type(&ctx, &person_schema.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaInUse);

    service
        .schema()
        .mutate_rel_schema_properties(&ctx, &schema.id, &PropertyInputs::new(), &["weight".into()])
        .await
        .unwrap();
    let read = objects.get_object_relationship(&ctx, &rel.id).await.unwrap();
    assert!(read.properties.is_empty());

    objects.delete_object_relationship(&ctx, &rel.id).await.unwrap();
    service
        .schema()
        .delete_relationship_schema(&ctx, &schema.id)
        .await
        .unwrap();
    let listed = service
        .schema()
        .list_relationship_schemas(&ctx, Some("hr"))
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn relationship_schema_no_op_mutation_publishes_nothing() {
    let (service, _) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    let schema = service
        .schema()
        .create_relationship_schema(
            &ctx,
            "KNOWS",
            "HR",
            "PERSON",
            "PERSON",
            &PropertyInputs::from([("weight".to_string(), PropertyKind::Float)]),
        )
        .await
        .unwrap();
    let mut updates = service.subscribe(Topic::new(
        EntityKind::RelationshipSchema,
        ChangeKind::Updated,
    ));

    let same = service
        .schema()
        .mutate_rel_schema_properties(
            &ctx,
            &schema.id,
            &PropertyInputs::from([("WEIGHT".to_string(), PropertyKind::Float)]),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(same.properties, schema.properties);
    assert!(updates.try_recv().is_none());

    service
        .schema()
        .mutate_rel_schema_properties(
            &ctx,
            &schema.id,
            &PropertyInputs::from([("since".to_string(), PropertyKind::Integer)]),
            &[],
        )
        .await
        .unwrap();
    assert!(updates.try_recv().is_some());
}

#[tokio::test]
async fn domain_delete_refuses_while_nodes_remain_then_cascades() {
    let (service, _) = setup();
    let ctx = service.context();
    let schema = person_type(&service, "HR").await;
    let domain = service
        .schema()
        .list_domains(&ctx)
        .await
        .unwrap()
        .remove(0);
    let node = service
        .objects()
        .create_object_node(&ctx, &person("HR", "e"))
        .await
        .unwrap();

    let err = service.schema().delete_domain(&ctx, &domain.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaInUse);
    let err = service.schema().delete_type(&ctx, &schema.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaInUse);

    service.objects().delete_object_node(&ctx, &node.id).await.unwrap();
    service.schema().delete_domain(&ctx, &domain.id).await.unwrap();

    let err = service.schema().get_type(&ctx, &schema.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnknownType);
    assert!(service.schema().list_types(&ctx, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn domain_rename_moves_nodes_and_keeps_keys() {
    let (service, store) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    let domain = service
        .schema()
        .list_domains(&ctx)
        .await
        .unwrap()
        .remove(0);
    let node = service
        .objects()
        .create_object_node(&ctx, &person("HR", "f"))
        .await
        .unwrap();

    let renamed = service
        .schema()
        .rename_domain(&ctx, &domain.id, "people")
        .await
        .unwrap();
    assert_eq!(renamed.id, domain.id);
    assert!(store.node_keys().contains("_PEOPLE"));

    let moved = service.objects().get_object_node(&ctx, &node.id).await.unwrap();
    assert_eq!(moved.domain, "PEOPLE");
    assert!(moved.labels.contains("_PEOPLE"));
    assert!(!moved.labels.contains("_HR"));

    let err = service
        .objects()
        .create_object_node(&ctx, &person("PEOPLE", "f"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateNode);
}

#[tokio::test]
async fn node_keys_are_requested_once_per_label() {
    let (service, store) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    let after_type = store.node_key_requests();

    for name in ["g", "h", "i"] {
        service
            .objects()
            .create_object_node(&ctx, &person("HR", name))
            .await
            .unwrap();
    }
    assert_eq!(store.node_key_requests(), after_type);

    let mut labelled = person("HR", "j");
    labelled.labels = vec!["contractor".into()];
    service
        .objects()
        .create_object_node(&ctx, &labelled)
        .await
        .unwrap();
    assert_eq!(store.node_key_requests(), after_type + 1);
    assert!(store.node_keys().contains("CONTRACTOR"));
}

#[tokio::test]
async fn sequential_writes_publish_in_order() {
    let (service, _) = setup();
    let ctx = service.context();
    person_type(&service, "HR").await;
    let mut sub = service.subscribe(NODE_CREATED);

    let mut committed = Vec::new();
    for n in 0..20 {
        let node = service
            .objects()
            .create_object_node(&ctx, &person("HR", &format!("p{n}")))
            .await
            .unwrap();
        committed.push(node.id);
    }

    let mut seen = Vec::new();
    while let Some(event) = sub.try_recv() {
        seen.push(event.id);
    }
    assert_eq!(seen, committed);
}

#[tokio::test]
async fn blocked_subscriber_does_not_stall_writers() {
    let (service, _) = setup_with(1);
    let ctx = service.context();
    person_type(&service, "HR").await;
    let mut blocked = service.subscribe(NODE_CREATED);
    let mut attentive = service.subscribe(NODE_CREATED);

    let burst = tokio::time::timeout(Duration::from_secs(2), async {
        let mut ids = Vec::new();
        for n in 0..5 {
            let node = service
                .objects()
                .create_object_node(&ctx, &person("HR", &format!("q{n}")))
                .await
                .unwrap();
            let event = attentive.recv().await.unwrap();
            assert_eq!(event.id, node.id);
            ids.push(node.id);
        }
        ids
    })
    .await
    .expect("writers were not blocked");

    assert_eq!(blocked.try_recv().unwrap().id, burst[0]);
    assert!(blocked.try_recv().is_none());
}

#[tokio::test]
async fn store_outage_is_reported_and_publishes_nothing() {
    let (service, store) = setup();
    person_type(&service, "HR").await;
    let mut sub = service.subscribe(NODE_CREATED);

    store.set_offline(true);
    let err = service
        .objects()
        .create_object_node(&service.context(), &person("HR", "k"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(sub.try_recv().is_none());

    store.set_offline(false);
    service
        .objects()
        .create_object_node(&service.context(), &person("HR", "k"))
        .await
        .unwrap();
    assert!(sub.try_recv().is_some());
}

#[tokio::test]
async fn cancelled_request_changes_and_publishes_nothing() {
    let (service, _) = setup();
    person_type(&service, "HR").await;
    let mut sub = service.subscribe(NODE_CREATED);

    let token = CancellationToken::new();
    token.cancel();
    let ctx = service.context_with(token);
    let err = service
        .objects()
        .create_object_node(&ctx, &person("HR", "l"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(sub.try_recv().is_none());

    let listed = service
        .objects()
        .list_object_nodes(&service.context(), Some("HR"), None)
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn listing_is_ordered_by_domain_type_name() {
    let (service, _) = setup();
    let ctx = service.context();
    person_type(&service, "B").await;
    person_type(&service, "A").await;
    for (domain, name) in [("B", "zed"), ("A", "mia"), ("A", "al"), ("B", "amy")] {
        service
            .objects()
            .create_object_node(&ctx, &person(domain, name))
            .await
            .unwrap();
    }
    let listed: Vec<(String, String)> = service
        .objects()
        .list_object_nodes(&ctx, None, Some("person"))
        .await
        .unwrap()
        .into_iter()
        .map(|n| (n.domain, n.name))
        .collect();
    assert_eq!(
        listed,
        vec![
            ("A".to_string(), "al".to_string()),
            ("A".to_string(), "mia".to_string()),
            ("B".to_string(), "amy".to_string()),
            ("B".to_string(), "zed".to_string()),
        ]
    );
}
