use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Client-visible error for every Strata operation.
///
/// Each variant maps onto exactly one [`ErrorKind`]; the kind name is what
/// clients match on, the message is for humans.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrataError {
    #[error("Invalid name {value:?}: {reason}")]
    InvalidName { value: String, reason: &'static str },

    #[error("Invalid property key {key:?}: {reason}")]
    InvalidPropertyKey { key: String, reason: &'static str },

    #[error("Label {0:?} is reserved")]
    ReservedLabel(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("Unknown relationship schema: {0}")]
    UnknownRelationshipSchema(String),

    #[error("Unknown object node: {0}")]
    UnknownNode(String),

    #[error("Unknown object relationship: {0}")]
    UnknownRelationship(String),

    #[error("Object node {name:?} of type {domain}.{type_name} already exists")]
    DuplicateNode {
        domain: String,
        type_name: String,
        name: String,
    },

    #[error("Schema already exists: {0}")]
    DuplicateSchema(String),

    #[error("Property {key:?} violates schema: {reason}")]
    PropertySchemaViolation { key: String, reason: String },

    #[error("{entity} is still in use: {reason}")]
    SchemaInUse { entity: String, reason: String },

    #[error("Graph store unavailable after {attempts} attempts")]
    StoreUnavailable { attempts: u32 },

    #[error("Request cancelled: {0}")]
    Cancelled(String),

    /// Store detail stays in the server log; the client only sees the id.
    #[error("Internal error (correlation id {correlation_id})")]
    Internal { correlation_id: Uuid, detail: String },
}

pub type Result<T> = std::result::Result<T, StrataError>;

/// Stable, machine-readable error kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidName,
    InvalidPropertyKey,
    ReservedLabel,
    UnknownDomain,
    UnknownType,
    UnknownRelationshipSchema,
    UnknownNode,
    UnknownRelationship,
    DuplicateNode,
    DuplicateSchema,
    PropertySchemaViolation,
    SchemaInUse,
    StoreUnavailable,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidName => "InvalidName",
            Self::InvalidPropertyKey => "InvalidPropertyKey",
            Self::ReservedLabel => "ReservedLabel",
            Self::UnknownDomain => "UnknownDomain",
            Self::UnknownType => "UnknownType",
            Self::UnknownRelationshipSchema => "UnknownRelationshipSchema",
            Self::UnknownNode => "UnknownNode",
            Self::UnknownRelationship => "UnknownRelationship",
            Self::DuplicateNode => "DuplicateNode",
            Self::DuplicateSchema => "DuplicateSchema",
            Self::PropertySchemaViolation => "PropertySchemaViolation",
            Self::SchemaInUse => "SchemaInUse",
            Self::StoreUnavailable => "StoreUnavailable",
            Self::Cancelled => "Cancelled",
            Self::Internal => "Internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StrataError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidName { .. } => ErrorKind::InvalidName,
            Self::InvalidPropertyKey { .. } => ErrorKind::InvalidPropertyKey,
            Self::ReservedLabel(_) => ErrorKind::ReservedLabel,
            Self::UnknownDomain(_) => ErrorKind::UnknownDomain,
            Self::UnknownType(_) => ErrorKind::UnknownType,
            Self::UnknownRelationshipSchema(_) => ErrorKind::UnknownRelationshipSchema,
            Self::UnknownNode(_) => ErrorKind::UnknownNode,
            Self::UnknownRelationship(_) => ErrorKind::UnknownRelationship,
            Self::DuplicateNode { .. } => ErrorKind::DuplicateNode,
            Self::DuplicateSchema(_) => ErrorKind::DuplicateSchema,
            Self::PropertySchemaViolation { .. } => ErrorKind::PropertySchemaViolation,
            Self::SchemaInUse { .. } => ErrorKind::SchemaInUse,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::Cancelled(_) => ErrorKind::Cancelled,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Wrap an unexpected failure, logging its detail under a fresh correlation id.
    pub fn internal(detail: impl fmt::Display) -> Self {
        let correlation_id = Uuid::new_v4();
        let detail = detail.to_string();
        tracing::error!(%correlation_id, %detail, "Internal error");
        Self::Internal {
            correlation_id,
            detail,
        }
    }

    pub fn property(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PropertySchemaViolation {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
