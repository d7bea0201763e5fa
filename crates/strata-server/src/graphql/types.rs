//! GraphQL object and input types.

use std::collections::BTreeMap;

use async_graphql::{Enum, InputObject, Json, SimpleObject, ID};
use chrono::{DateTime, Utc};

use strata_core::{EntityView, Event, RawProperties, StrataError, Subject};
use strata_service::PropertyInputs;

#[derive(Enum, Copy, Clone, Eq, PartialEq)]
#[graphql(remote = "strata_core::PropertyKind")]
pub enum PropertyType {
    String,
    Integer,
    Float,
    Boolean,
}

/// `{labels, properties}` view of one entity.
#[derive(SimpleObject, Clone)]
pub struct Entity {
    pub labels: Vec<String>,
    pub properties: Json<BTreeMap<String, serde_json::Value>>,
}

impl From<EntityView> for Entity {
    fn from(view: EntityView) -> Self {
        Self {
            labels: view.labels,
            properties: Json(view.properties),
        }
    }
}

impl Entity {
    pub fn of<S: Subject>(subject: &S) -> Self {
        subject.view().into()
    }
}

/// Result envelope of every mutation. Failures are values, not errors.
#[derive(SimpleObject)]
pub struct MutationResponse {
    pub success: bool,
    pub message: Option<String>,
    /// Stable error kind when `success` is false.
    pub kind: Option<String>,
    pub data: Option<Entity>,
}

impl MutationResponse {
    pub fn from_result<S: Subject>(result: strata_core::Result<S>, done: &str) -> Self {
        match result {
            Ok(subject) => Self {
                success: true,
                message: Some(done.to_string()),
                kind: None,
                data: Some(Entity::of(&subject)),
            },
            Err(e) => Self::failed(&e),
        }
    }

    pub fn failed(err: &StrataError) -> Self {
        Self {
            success: false,
            message: Some(err.to_string()),
            kind: Some(err.kind().as_str().to_string()),
            data: None,
        }
    }
}

#[derive(InputObject)]
pub struct PropertyDeclInput {
    pub key: String,
    #[graphql(name = "type")]
    pub kind: PropertyType,
}

pub fn declarations(inputs: Option<Vec<PropertyDeclInput>>) -> PropertyInputs {
    inputs
        .unwrap_or_default()
        .into_iter()
        .map(|d| (d.key, d.kind.into()))
        .collect()
}

#[derive(InputObject)]
pub struct ObjectNodeInput {
    pub domain: String,
    pub name: String,
    #[graphql(name = "type")]
    pub type_name: String,
    pub labels: Option<Vec<String>>,
    pub properties: Option<Json<RawProperties>>,
}

#[derive(InputObject)]
pub struct ObjectRelationshipInput {
    pub name: String,
    pub from: ID,
    pub to: ID,
    pub properties: Option<Json<RawProperties>>,
}

/// A change event as delivered on the `events` subscription.
#[derive(SimpleObject)]
pub struct EventPayload {
    pub id: ID,
    pub topic: String,
    pub at: DateTime<Utc>,
    pub data: Json<serde_json::Value>,
}

impl From<Event> for EventPayload {
    fn from(event: Event) -> Self {
        Self {
            id: ID(event.id.0),
            topic: event.topic.to_string(),
            at: event.at,
            data: Json(event.data),
        }
    }
}
