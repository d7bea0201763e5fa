//! GraphQL API over the graph service.
//!
//! - [`QueryRoot`]: reads of schema and object entities
//! - [`MutationRoot`]: every write, answered with a [`MutationResponse`]
//! - [`SubscriptionRoot`]: change events per topic over websocket

mod mutation;
mod query;
mod subscription;
mod types;

pub use mutation::MutationRoot;
pub use query::QueryRoot;
pub use subscription::SubscriptionRoot;
pub use types::{Entity, EventPayload, MutationResponse, PropertyType};

use async_graphql::{ErrorExtensions, Schema};

use strata_core::StrataError;
use strata_service::GraphService;

pub type StrataSchema = Schema<QueryRoot, MutationRoot, SubscriptionRoot>;

pub fn build_schema(service: GraphService) -> StrataSchema {
    Schema::build(QueryRoot, MutationRoot, SubscriptionRoot)
        .data(service)
        .finish()
}

/// Query failures carry the error kind as the `kind` extension.
pub(crate) fn gql_error(err: StrataError) -> async_graphql::Error {
    let kind = err.kind().as_str();
    async_graphql::Error::new(err.to_string()).extend_with(|_, ext| ext.set("kind", kind))
}
