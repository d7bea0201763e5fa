//! Core domain types for the Strata graph.
//!
//! Schema entities (domains, types, relationship schemas) govern object
//! entities (nodes and relationships). All names held here are already
//! normalised; construction from raw input goes through [`crate::naming`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::StrataError;
use crate::naming::domain_label;

// ── Identity ──────────────────────────────────────────────────────

/// Opaque, stable external identifier (128-bit, Crockford base-32).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── Properties ────────────────────────────────────────────────────

/// Primitive kinds a declared property may hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyKind {
    String,
    Integer,
    Float,
    Boolean,
}

impl PropertyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::Boolean => "BOOLEAN",
        }
    }

    /// Interpret a supplied JSON value as this kind.
    ///
    /// Values already of the kind are taken as-is; strings are parsed; integers
    /// widen to FLOAT. Anything else is `None`.
    pub fn coerce(&self, value: &serde_json::Value) -> Option<PropertyValue> {
        use serde_json::Value as J;
        match (self, value) {
            (Self::String, J::String(s)) => Some(PropertyValue::String(s.clone())),
            (Self::Integer, J::Number(n)) => n.as_i64().map(PropertyValue::Integer),
            (Self::Integer, J::String(s)) => s.trim().parse().ok().map(PropertyValue::Integer),
            (Self::Float, J::Number(n)) => n.as_f64().map(PropertyValue::Float),
            (Self::Float, J::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(PropertyValue::Float),
            (Self::Boolean, J::Bool(b)) => Some(PropertyValue::Boolean(*b)),
            (Self::Boolean, J::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(PropertyValue::Boolean(true)),
                "false" => Some(PropertyValue::Boolean(false)),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PropertyKind {
    type Err = StrataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(Self::String),
            "INTEGER" => Ok(Self::Integer),
            "FLOAT" => Ok(Self::Float),
            "BOOLEAN" => Ok(Self::Boolean),
            other => Err(StrataError::property(
                other,
                "property type must be one of STRING, INTEGER, FLOAT, BOOLEAN",
            )),
        }
    }
}

/// A typed property value as stored on nodes and relationships.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PropertyValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Boolean(_) => PropertyKind::Boolean,
            Self::Integer(_) => PropertyKind::Integer,
            Self::Float(_) => PropertyKind::Float,
            Self::String(_) => PropertyKind::String,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Integer(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

/// Declaration of a single property on a type or relationship schema.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyDecl {
    #[serde(rename = "type")]
    pub kind: PropertyKind,
}

impl PropertyDecl {
    pub fn new(kind: PropertyKind) -> Self {
        Self { kind }
    }
}

/// Property declarations keyed by normalised property key.
pub type PropertyDecls = BTreeMap<String, PropertyDecl>;

/// Validated property values keyed by normalised property key.
pub type Properties = BTreeMap<String, PropertyValue>;

/// Unvalidated property input as it arrives from a client.
pub type RawProperties = BTreeMap<String, serde_json::Value>;

// ── Schema entities ───────────────────────────────────────────────

/// Top-level namespace for types and relationship schemas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DomainSchema {
    pub id: EntityId,
    pub name: String,
}

impl DomainSchema {
    pub fn new(name: String) -> Self {
        Self {
            id: EntityId::new(),
            name,
        }
    }
}

/// Declaration of a kind of object node within a domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypeSchema {
    pub id: EntityId,
    pub name: String,
    pub domain: String,
    #[serde(default)]
    pub properties: PropertyDecls,
}

impl TypeSchema {
    pub fn new(domain: String, name: String) -> Self {
        Self {
            id: EntityId::new(),
            name,
            domain,
            properties: PropertyDecls::new(),
        }
    }

    /// `DOMAIN.TYPE`, used in messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.domain, self.name)
    }
}

/// Lookup key for a relationship schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelSchemaKey {
    pub name: String,
    pub domain: String,
    pub from_type: String,
    pub to_type: String,
}

impl fmt::Display for RelSchemaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({} -> {})",
            self.domain, self.name, self.from_type, self.to_type
        )
    }
}

/// Declaration of a directed edge kind between two types of one domain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationshipSchema {
    pub id: EntityId,
    pub name: String,
    pub domain: String,
    pub from_type: String,
    pub to_type: String,
    #[serde(default)]
    pub properties: PropertyDecls,
}

impl RelationshipSchema {
    pub fn new(key: RelSchemaKey, properties: PropertyDecls) -> Self {
        Self {
            id: EntityId::new(),
            name: key.name,
            domain: key.domain,
            from_type: key.from_type,
            to_type: key.to_type,
            properties,
        }
    }

    pub fn key(&self) -> RelSchemaKey {
        RelSchemaKey {
            name: self.name.clone(),
            domain: self.domain.clone(),
            from_type: self.from_type.clone(),
            to_type: self.to_type.clone(),
        }
    }

    pub fn references_type(&self, domain: &str, type_name: &str) -> bool {
        self.domain == domain && (self.from_type == type_name || self.to_type == type_name)
    }
}

// ── Object entities ───────────────────────────────────────────────

/// A schema-conforming node instance.
///
/// `labels` always contains the domain umbrella label and the type label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectNode {
    pub id: EntityId,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub domain: String,
    pub labels: BTreeSet<String>,
    pub properties: Properties,
}

impl ObjectNode {
    pub fn new(
        domain: String,
        type_name: String,
        name: String,
        extra_labels: BTreeSet<String>,
        properties: Properties,
    ) -> Self {
        let mut labels = extra_labels;
        labels.insert(domain_label(&domain));
        labels.insert(type_name.clone());
        Self {
            id: EntityId::new(),
            name,
            type_name,
            domain,
            labels,
            properties,
        }
    }

    /// Labels that cannot be removed: the umbrella and the type label.
    pub fn is_structural_label(&self, label: &str) -> bool {
        label == self.type_name || label == domain_label(&self.domain)
    }
}

/// A schema-conforming directed edge instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectRelationship {
    pub id: EntityId,
    pub name: String,
    pub domain: String,
    pub from: EntityId,
    pub to: EntityId,
    pub properties: Properties,
}

impl ObjectRelationship {
    pub fn new(
        name: String,
        domain: String,
        from: EntityId,
        to: EntityId,
        properties: Properties,
    ) -> Self {
        Self {
            id: EntityId::new(),
            name,
            domain,
            from,
            to,
            properties,
        }
    }

    pub fn touches(&self, node: &EntityId) -> bool {
        &self.from == node || &self.to == node
    }
}

// ── Requests ──────────────────────────────────────────────────────

/// Input for creating an object node, before normalisation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewObjectNode {
    pub domain: String,
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: RawProperties,
}

/// Input for creating an object relationship, before normalisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewObjectRelationship {
    pub name: String,
    pub from: EntityId,
    pub to: EntityId,
    #[serde(default)]
    pub properties: RawProperties,
}

// ── External view ─────────────────────────────────────────────────

/// The `{labels, properties}` shape returned to clients for a single entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityView {
    pub labels: Vec<String>,
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl EntityView {
    fn with_reserved(labels: Vec<String>, reserved: &[(&str, String)]) -> Self {
        let properties = reserved
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::Value::String(v.clone())))
            .collect();
        Self { labels, properties }
    }

    fn extend_values(mut self, props: &Properties) -> Self {
        for (k, v) in props {
            self.properties.insert(k.clone(), v.to_json());
        }
        self
    }

    fn extend_decls(mut self, decls: &PropertyDecls) -> Self {
        for (k, d) in decls {
            self.properties
                .insert(k.clone(), serde_json::Value::String(d.kind.to_string()));
        }
        self
    }
}

impl From<&DomainSchema> for EntityView {
    fn from(d: &DomainSchema) -> Self {
        Self::with_reserved(
            vec!["DomainSchema".to_string()],
            &[("id", d.id.0.clone()), ("name", d.name.clone())],
        )
    }
}

impl From<&TypeSchema> for EntityView {
    fn from(t: &TypeSchema) -> Self {
        Self::with_reserved(
            vec!["TypeSchema".to_string()],
            &[
                ("id", t.id.0.clone()),
                ("name", t.name.clone()),
                ("domain", t.domain.clone()),
            ],
        )
        .extend_decls(&t.properties)
    }
}

impl From<&RelationshipSchema> for EntityView {
    fn from(r: &RelationshipSchema) -> Self {
        Self::with_reserved(
            vec!["RelationshipSchema".to_string()],
            &[
                ("id", r.id.0.clone()),
                ("name", r.name.clone()),
                ("domain", r.domain.clone()),
                ("from_type", r.from_type.clone()),
                ("to_type", r.to_type.clone()),
            ],
        )
        .extend_decls(&r.properties)
    }
}

impl From<&ObjectNode> for EntityView {
    fn from(n: &ObjectNode) -> Self {
        Self::with_reserved(
            n.labels.iter().cloned().collect(),
            &[
                ("id", n.id.0.clone()),
                ("name", n.name.clone()),
                ("type", n.type_name.clone()),
                ("domain", n.domain.clone()),
            ],
        )
        .extend_values(&n.properties)
    }
}

impl From<&ObjectRelationship> for EntityView {
    fn from(r: &ObjectRelationship) -> Self {
        Self::with_reserved(
            vec![r.name.clone()],
            &[
                ("id", r.id.0.clone()),
                ("name", r.name.clone()),
                ("domain", r.domain.clone()),
                ("from", r.from.0.clone()),
                ("to", r.to.0.clone()),
            ],
        )
        .extend_values(&r.properties)
    }
}
