//! GraphQL surface tests against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use async_graphql::Request;
use axum::body::Body;
use axum::http::{Request as HttpRequest, StatusCode};
use futures::StreamExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use strata_core::config::RequestSettings;
use strata_core::Topic;
use strata_events::SubscriptionManager;
use strata_graph::MemoryStore;
use strata_server::{build_router, build_schema, StrataSchema};
use strata_service::GraphService;

fn setup() -> (StrataSchema, GraphService) {
    let service = GraphService::new(
        Arc::new(MemoryStore::new()),
        SubscriptionManager::new(16),
        RequestSettings::default(),
    );
    (build_schema(service.clone()), service)
}

async fn run(schema: &StrataSchema, query: &str) -> Value {
    let resp = schema.execute(Request::new(query)).await;
    assert!(resp.errors.is_empty(), "unexpected errors: {:?}", resp.errors);
    resp.data.into_json().unwrap()
}

async fn seed(schema: &StrataSchema) {
    run(schema, r#"mutation { createDomain(name: "finance") { success } }"#).await;
    let data = run(
        schema,
        r#"mutation {
            createTypeSchema(domain: "finance", name: "account",
                properties: [{key: "balance", type: FLOAT}]) {
                success message data { labels properties }
            }
        }"#,
    )
    .await;
    assert_eq!(data["createTypeSchema"]["success"], json!(true));
    assert_eq!(
        data["createTypeSchema"]["data"]["properties"]["name"],
        json!("ACCOUNT")
    );
}

const CREATE_ALICE: &str = r#"mutation {
    createObjectNode(input: {
        domain: "finance", name: "alice", type: "ACCOUNT",
        labels: ["vip"], properties: {balance: 100.5}
    }) {
        success message kind data { labels properties }
    }
}"#;

#[tokio::test]
async fn create_node_returns_labels_and_properties() {
    let (schema, _) = setup();
    seed(&schema).await;

    let data = run(&schema, CREATE_ALICE).await;
    let created = &data["createObjectNode"];
    assert_eq!(created["success"], json!(true));
    assert_eq!(created["kind"], Value::Null);
    assert_eq!(created["data"]["labels"], json!(["ACCOUNT", "VIP", "_FINANCE"]));
    assert_eq!(created["data"]["properties"]["balance"], json!(100.5));
    assert_eq!(created["data"]["properties"]["domain"], json!("FINANCE"));

    let listed = run(&schema, r#"{ objectNodes(domain: "finance") { properties } }"#).await;
    assert_eq!(listed["objectNodes"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn duplicate_node_is_a_failed_response_not_an_error() {
    let (schema, _) = setup();
    seed(&schema).await;
    run(&schema, CREATE_ALICE).await;

    let data = run(&schema, CREATE_ALICE).await;
    let dup = &data["createObjectNode"];
    assert_eq!(dup["success"], json!(false));
    assert_eq!(dup["kind"], json!("DuplicateNode"));
    assert_eq!(dup["data"], Value::Null);
}

#[tokio::test]
async fn undeclared_property_is_rejected_with_its_kind() {
    let (schema, _) = setup();
    seed(&schema).await;

    let data = run(
        &schema,
        r#"mutation {
            createObjectNode(input: {
                domain: "finance", name: "bob", type: "ACCOUNT",
                properties: {owner: "bob"}
            }) { success kind }
        }"#,
    )
    .await;
    assert_eq!(data["createObjectNode"]["success"], json!(false));
    assert_eq!(data["createObjectNode"]["kind"], json!("PropertySchemaViolation"));
}

#[tokio::test]
async fn query_failures_carry_the_kind_extension() {
    let (schema, _) = setup();
    let resp = schema
        .execute(Request::new(r#"{ objectNode(id: "01NOPE") { labels } }"#))
        .await;
    let body = serde_json::to_value(&resp).unwrap();
    assert_eq!(body["errors"][0]["extensions"]["kind"], json!("UnknownNode"));
}

#[tokio::test]
async fn subscription_receives_created_node() {
    let (schema, service) = setup();
    seed(&schema).await;

    let topic: Topic = "object_node.created".parse().unwrap();
    let mut stream = schema.execute_stream(Request::new(
        r#"subscription { events(topic: "object_node.created") { id topic data } }"#,
    ));

    // The resolver subscribes on first poll.
    for _ in 0..50 {
        if service.events().subscriber_count(topic) > 0 {
            break;
        }
        let _ = tokio::time::timeout(Duration::from_millis(10), stream.next()).await;
    }
    assert_eq!(service.events().subscriber_count(topic), 1);

    let created = run(&schema, CREATE_ALICE).await;
    let id = created["createObjectNode"]["data"]["properties"]["id"].clone();

    let resp = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("event within a second")
        .expect("stream still open");
    assert!(resp.errors.is_empty());
    let event = resp.data.into_json().unwrap();
    assert_eq!(event["events"]["topic"], json!("object_node.created"));
    assert_eq!(event["events"]["id"], id);
    assert_eq!(event["events"]["data"]["properties"]["name"], json!("alice"));

    drop(stream);
    assert_eq!(service.events().subscriber_count(topic), 0);
}

#[tokio::test]
async fn unknown_topic_is_refused() {
    let (schema, _) = setup();
    let mut stream = schema.execute_stream(Request::new(
        r#"subscription { events(topic: "node.exploded") { id } }"#,
    ));
    let resp = stream.next().await.unwrap();
    assert!(!resp.errors.is_empty());
}

#[tokio::test]
async fn health_reports_ok() {
    let (schema, _) = setup();
    let resp = build_router(schema)
        .oneshot(
            HttpRequest::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], json!("ok"));
}

#[tokio::test]
async fn graphql_over_http() {
    let (schema, _) = setup();
    let resp = build_router(schema)
        .oneshot(
            HttpRequest::builder()
                .method("POST")
                .uri("/query")
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"query": "mutation { createDomain(name: \"ops\") { success data { properties } } }"})
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["createDomain"]["success"], json!(true));
    assert_eq!(
        body["data"]["createDomain"]["data"]["properties"]["name"],
        json!("OPS")
    );
}
