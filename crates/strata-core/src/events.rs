//! Change events published after a store transaction commits.
//!
//! Topics are the fixed product `{entity} x {change}`, rendered as
//! `object_node.created`, `type_schema.deleted`, and so on.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StrataError;
use crate::types::{
    DomainSchema, EntityId, EntityView, ObjectNode, ObjectRelationship, RelationshipSchema,
    TypeSchema,
};

/// Which kind of entity an event is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    ObjectNode,
    ObjectRelationship,
    DomainSchema,
    TypeSchema,
    RelationshipSchema,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        Self::ObjectNode,
        Self::ObjectRelationship,
        Self::DomainSchema,
        Self::TypeSchema,
        Self::RelationshipSchema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectNode => "object_node",
            Self::ObjectRelationship => "object_relationship",
            Self::DomainSchema => "domain_schema",
            Self::TypeSchema => "type_schema",
            Self::RelationshipSchema => "relationship_schema",
        }
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [Self::Created, Self::Updated, Self::Deleted];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

/// A named event channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(into = "String", try_from = "String")]
pub struct Topic {
    pub entity: EntityKind,
    pub change: ChangeKind,
}

impl Topic {
    pub const fn new(entity: EntityKind, change: ChangeKind) -> Self {
        Self { entity, change }
    }

    /// Every valid topic.
    pub fn all() -> impl Iterator<Item = Topic> {
        EntityKind::ALL
            .into_iter()
            .flat_map(|e| ChangeKind::ALL.into_iter().map(move |c| Topic::new(e, c)))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity.as_str(), self.change.as_str())
    }
}

impl FromStr for Topic {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Topic::all()
            .find(|t| t.to_string() == wanted)
            .ok_or_else(|| StrataError::InvalidName {
                value: s.to_string(),
                reason: "not a known topic",
            })
    }
}

impl From<Topic> for String {
    fn from(t: Topic) -> Self {
        t.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = StrataError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A committed change, as delivered to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Id of the entity the event is about.
    pub id: EntityId,
    pub topic: Topic,
    pub at: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(id: EntityId, topic: Topic, data: serde_json::Value) -> Self {
        Self {
            id,
            topic,
            at: Utc::now(),
            data,
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.topic.change
    }
}

/// Entities that can be the subject of an event.
pub trait Subject {
    const KIND: EntityKind;

    fn subject_id(&self) -> &EntityId;

    fn view(&self) -> EntityView;

    fn event(&self, change: ChangeKind) -> Event {
        let data = serde_json::to_value(self.view()).unwrap_or(serde_json::Value::Null);
        Event::new(
            self.subject_id().clone(),
            Topic::new(Self::KIND, change),
            data,
        )
    }
}

macro_rules! subject {
    ($ty:ty, $kind:expr) => {
        impl Subject for $ty {
            const KIND: EntityKind = $kind;

            fn subject_id(&self) -> &EntityId {
                &self.id
            }

            fn view(&self) -> EntityView {
                EntityView::from(self)
            }
        }
    };
}

subject!(DomainSchema, EntityKind::DomainSchema);
subject!(TypeSchema, EntityKind::TypeSchema);
subject!(RelationshipSchema, EntityKind::RelationshipSchema);
subject!(ObjectNode, EntityKind::ObjectNode);
subject!(ObjectRelationship, EntityKind::ObjectRelationship);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifteen_topics_round_trip_through_strings() {
        let topics: Vec<Topic> = Topic::all().collect();
        assert_eq!(topics.len(), 15);
        for t in topics {
            assert_eq!(t.to_string().parse::<Topic>().unwrap(), t);
        }
        assert_eq!(
            "object_node.created".parse::<Topic>().unwrap(),
            Topic::new(EntityKind::ObjectNode, ChangeKind::Created)
        );
        assert!("object_node.renamed".parse::<Topic>().is_err());
    }

    #[test]
    fn event_payload_shape() {
        let domain = DomainSchema::new("FINANCE".into());
        let event = domain.event(ChangeKind::Created);
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["id"], serde_json::json!(domain.id.as_str()));
        assert_eq!(json["topic"], serde_json::json!("domain_schema.created"));
        assert!(json["at"].is_string());
        assert_eq!(json["data"]["properties"]["name"], serde_json::json!("FINANCE"));

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back.topic, event.topic);
        assert_eq!(back.kind(), ChangeKind::Created);
    }
}
