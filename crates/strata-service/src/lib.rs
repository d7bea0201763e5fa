//! Strata Service: schema registry and object graph operations.
//!
//! Every operation runs inside a [`RequestContext`], goes through the
//! [`GraphStore`](strata_graph::GraphStore) seam as one store transaction,
//! and on success publishes exactly one change event.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use strata_core::config::RequestSettings;
use strata_core::{ChangeKind, Subject, Topic};
use strata_events::{Subscription, SubscriptionManager};
use strata_graph::SharedStore;

mod constraints;
mod context;
mod objects;
mod registry;
pub mod validate;

pub use constraints::ConstraintCache;
pub use context::RequestContext;
pub use objects::ObjectGraph;
pub use registry::SchemaRegistry;
pub use validate::PropertyInputs;

/// Handles shared by the registry and the object graph.
#[derive(Clone)]
pub(crate) struct Shared {
    pub(crate) store: SharedStore,
    pub(crate) events: SubscriptionManager,
    pub(crate) constraints: Arc<ConstraintCache>,
}

impl Shared {
    pub(crate) fn publish<S: Subject>(&self, subject: &S, change: ChangeKind) {
        let event = subject.event(change);
        let report = self.events.publish(&event);
        tracing::debug!(
            topic = %event.topic,
            id = %event.id,
            delivered = report.delivered,
            dropped = report.dropped,
            "Event published"
        );
    }
}

/// Entry point used by the API layer.
#[derive(Clone)]
pub struct GraphService {
    schema: SchemaRegistry,
    objects: ObjectGraph,
    events: SubscriptionManager,
    request: RequestSettings,
}

impl GraphService {
    pub fn new(store: SharedStore, events: SubscriptionManager, request: RequestSettings) -> Self {
        let shared = Shared {
            store,
            events: events.clone(),
            constraints: Arc::new(ConstraintCache::new()),
        };
        let schema = SchemaRegistry::new(shared.clone());
        let objects = ObjectGraph::new(shared, schema.clone());
        Self {
            schema,
            objects,
            events,
            request,
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn objects(&self) -> &ObjectGraph {
        &self.objects
    }

    pub fn events(&self) -> &SubscriptionManager {
        &self.events
    }

    pub fn subscribe(&self, topic: Topic) -> Subscription {
        self.events.subscribe(topic)
    }

    /// A fresh context with the configured deadline.
    pub fn context(&self) -> RequestContext {
        RequestContext::new(self.request.timeout())
    }

    /// A fresh context cancelled together with `cancel`.
    pub fn context_with(&self, cancel: CancellationToken) -> RequestContext {
        RequestContext::with_cancel(cancel, self.request.timeout())
    }
}
