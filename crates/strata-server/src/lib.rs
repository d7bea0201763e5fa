//! Strata Server: HTTP and websocket front end.
//!
//! Serves the GraphQL API on `/query`, subscriptions on `/query/ws`, an
//! in-browser IDE on `/playground` and a liveness check on `/health`.

pub mod graphql;

use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQLRequest, GraphQLResponse, GraphQLSubscription};
use axum::extract::State;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

pub use graphql::{build_schema, StrataSchema};

pub const QUERY_PATH: &str = "/query";
pub const SUBSCRIPTION_PATH: &str = "/query/ws";

pub fn build_router(schema: StrataSchema) -> Router {
    Router::new()
        .route(QUERY_PATH, post(graphql_handler))
        .route_service(SUBSCRIPTION_PATH, GraphQLSubscription::new(schema.clone()))
        .route("/playground", get(playground))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(schema)
}

async fn graphql_handler(
    State(schema): State<StrataSchema>,
    req: GraphQLRequest,
) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn playground() -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint(QUERY_PATH)
            .subscription_endpoint(SUBSCRIPTION_PATH)
            .finish(),
    )
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
