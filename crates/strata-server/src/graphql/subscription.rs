use async_graphql::{Context, Result, Subscription};
use futures::{Stream, StreamExt};

use strata_core::Topic;
use strata_service::GraphService;

use super::gql_error;
use super::types::EventPayload;

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Change events on one topic, e.g. `object_node.created`. The stream
    /// ends when the server shuts down; dropping it unsubscribes.
    async fn events(
        &self,
        ctx: &Context<'_>,
        topic: String,
    ) -> Result<impl Stream<Item = EventPayload>> {
        let topic: Topic = topic.parse().map_err(gql_error)?;
        let service = ctx.data::<GraphService>()?;
        let subscription = service.subscribe(topic);
        tracing::info!(%topic, subscription = %subscription.id(), "Client subscribed");
        Ok(subscription.into_stream().map(EventPayload::from))
    }
}
