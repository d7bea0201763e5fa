//! strata-core: Shared types, naming rules, configuration, and error handling
//! for the Strata schema-governed graph service.
//!
//! This crate provides the foundational types used across all Strata components:
//! - Schema entities (domains, types, relationship schemas) and object entities
//! - Identifier generation and name/label/property-key normalisation
//! - Change events and their topics
//! - Configuration management
//! - The client-visible error kinds

pub mod config;
pub mod error;
pub mod events;
pub mod naming;
pub mod types;

pub use error::{ErrorKind, Result, StrataError};
pub use events::{ChangeKind, EntityKind, Event, Subject, Topic};
pub use types::{
    DomainSchema, EntityId, EntityView, NewObjectNode, NewObjectRelationship, ObjectNode,
    ObjectRelationship, Properties, PropertyDecl, PropertyDecls, PropertyKind, PropertyValue,
    RawProperties, RelSchemaKey, RelationshipSchema, TypeSchema,
};
