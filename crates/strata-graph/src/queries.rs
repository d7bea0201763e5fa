//! Read-side graph operations and row decoding.
//!
//! Reads go through the same managed transactions as writes, so a read that
//! races a retried write never observes half of it.

use std::collections::BTreeSet;

use neo4rs::{Row, Txn};

use strata_core::naming::RESERVED_KEYS;
use strata_core::{
    DomainSchema, EntityId, ObjectNode, ObjectRelationship, Properties, PropertyDecls,
    PropertyValue, RelSchemaKey, RelationshipSchema, TypeSchema,
};

use crate::client::{fetch_all, fetch_one, txn_work, GraphClient, GraphError};
use crate::cypher::{self, Statement};

fn field<T>(row: &Row, key: &str) -> Result<T, GraphError>
where
    T: for<'de> serde::Deserialize<'de>,
{
    row.get::<T>(key)
        .map_err(|e| GraphError::Serialization(format!("column {key}: {e}")))
}

fn declarations(row: &Row) -> Result<PropertyDecls, GraphError> {
    let raw: String = row.get("properties").unwrap_or_default();
    if raw.is_empty() {
        return Ok(PropertyDecls::new());
    }
    serde_json::from_str(&raw).map_err(|e| GraphError::Serialization(e.to_string()))
}

pub(crate) fn domain_from_row(row: &Row) -> Result<DomainSchema, GraphError> {
    Ok(DomainSchema {
        id: EntityId(field(row, "id")?),
        name: field(row, "name")?,
    })
}

pub(crate) fn type_from_row(row: &Row) -> Result<TypeSchema, GraphError> {
    Ok(TypeSchema {
        id: EntityId(field(row, "id")?),
        name: field(row, "name")?,
        domain: field(row, "domain")?,
        properties: declarations(row)?,
    })
}

pub(crate) fn rel_schema_from_row(row: &Row) -> Result<RelationshipSchema, GraphError> {
    Ok(RelationshipSchema {
        id: EntityId(field(row, "id")?),
        name: field(row, "name")?,
        domain: field(row, "domain")?,
        from_type: field(row, "from_type")?,
        to_type: field(row, "to_type")?,
        properties: declarations(row)?,
    })
}

/// Read a primitive property, trying each stored kind in turn.
macro_rules! read_value {
    ($entity:expr, $key:expr) => {
        if let Ok(i) = $entity.get::<i64>($key) {
            Some(PropertyValue::Integer(i))
        } else if let Ok(f) = $entity.get::<f64>($key) {
            Some(PropertyValue::Float(f))
        } else if let Ok(b) = $entity.get::<bool>($key) {
            Some(PropertyValue::Boolean(b))
        } else if let Ok(s) = $entity.get::<String>($key) {
            Some(PropertyValue::String(s))
        } else {
            None
        }
    };
}

fn user_keys(row: &Row) -> Vec<String> {
    let keys: Vec<String> = row.get("keys").unwrap_or_default();
    keys.into_iter()
        .filter(|k| !RESERVED_KEYS.contains(&k.as_str()))
        .collect()
}

pub(crate) fn node_from_row(row: &Row) -> Result<ObjectNode, GraphError> {
    let node: neo4rs::Node = field(row, "n")?;
    let labels: Vec<String> = field(row, "labels")?;
    let mut properties = Properties::new();
    for key in user_keys(row) {
        if let Some(value) = read_value!(node, key.as_str()) {
            properties.insert(key, value);
        }
    }
    Ok(ObjectNode {
        id: EntityId(node_str(&node, "id")?),
        name: node_str(&node, "name")?,
        type_name: node_str(&node, "type")?,
        domain: node_str(&node, "domain")?,
        labels: labels.into_iter().collect::<BTreeSet<_>>(),
        properties,
    })
}

fn node_str(node: &neo4rs::Node, key: &str) -> Result<String, GraphError> {
    node.get::<String>(key)
        .map_err(|e| GraphError::Serialization(format!("node.{key}: {e}")))
}

pub(crate) fn relationship_from_row(row: &Row) -> Result<ObjectRelationship, GraphError> {
    let rel: neo4rs::Relation = field(row, "r")?;
    let mut properties = Properties::new();
    for key in user_keys(row) {
        if let Some(value) = read_value!(rel, key.as_str()) {
            properties.insert(key, value);
        }
    }
    let id: String = rel
        .get("id")
        .map_err(|e| GraphError::Serialization(format!("relationship.id: {e}")))?;
    let domain: String = rel
        .get("domain")
        .map_err(|e| GraphError::Serialization(format!("relationship.domain: {e}")))?;
    Ok(ObjectRelationship {
        id: EntityId(id),
        name: field(row, "name")?,
        domain,
        from: EntityId(field(row, "from_id")?),
        to: EntityId(field(row, "to_id")?),
        properties,
    })
}

// ── Transaction-scoped lookups ───────────────────────────────────

async fn one<T>(
    txn: &mut Txn,
    stmt: Statement,
    decode: fn(&Row) -> Result<T, GraphError>,
) -> Result<Option<T>, GraphError> {
    fetch_one(txn, stmt).await?.as_ref().map(decode).transpose()
}

async fn many<T>(
    txn: &mut Txn,
    stmt: Statement,
    decode: fn(&Row) -> Result<T, GraphError>,
) -> Result<Vec<T>, GraphError> {
    fetch_all(txn, stmt).await?.iter().map(decode).collect()
}

pub(crate) async fn load_domain(
    txn: &mut Txn,
    id: &EntityId,
) -> Result<Option<DomainSchema>, GraphError> {
    one(txn, cypher::domain_by_id(id), domain_from_row).await
}

pub(crate) async fn load_type(
    txn: &mut Txn,
    id: &EntityId,
) -> Result<Option<TypeSchema>, GraphError> {
    one(txn, cypher::type_by_id(id), type_from_row).await
}

pub(crate) async fn load_rel_schema(
    txn: &mut Txn,
    id: &EntityId,
) -> Result<Option<RelationshipSchema>, GraphError> {
    one(txn, cypher::rel_schema_by_id(id), rel_schema_from_row).await
}

pub(crate) async fn load_node(
    txn: &mut Txn,
    id: &EntityId,
) -> Result<Option<ObjectNode>, GraphError> {
    one(txn, cypher::node_by_id(id), node_from_row).await
}

pub(crate) async fn load_relationship(
    txn: &mut Txn,
    id: &EntityId,
) -> Result<Option<ObjectRelationship>, GraphError> {
    one(txn, cypher::relationship_by_id(id), relationship_from_row).await
}

// Locking reads: the entity stays write-locked until the transaction ends,
// so checks made against it hold for the writes that follow.

pub(crate) async fn lock_type(
    txn: &mut Txn,
    id: &EntityId,
) -> Result<Option<TypeSchema>, GraphError> {
    one(txn, cypher::lock_type(id), type_from_row).await
}

pub(crate) async fn lock_type_named(
    txn: &mut Txn,
    domain: &str,
    name: &str,
) -> Result<Option<TypeSchema>, GraphError> {
    one(txn, cypher::lock_type_by_name(domain, name), type_from_row).await
}

pub(crate) async fn lock_rel_schema(
    txn: &mut Txn,
    stmt: Statement,
) -> Result<Option<RelationshipSchema>, GraphError> {
    one(txn, stmt, rel_schema_from_row).await
}

impl GraphClient {
    // ── Schema lookups ───────────────────────────────────────────

    pub async fn find_domain(&self, id: &EntityId) -> Result<Option<DomainSchema>, GraphError> {
        let id = id.clone();
        self.run_read("domain_by_id", move |txn| {
            let id = id.clone();
            txn_work(async move { load_domain(txn, &id).await })
        })
        .await
    }

    pub async fn find_domain_by_name(
        &self,
        name: &str,
    ) -> Result<Option<DomainSchema>, GraphError> {
        let stmt = cypher::domain_by_name(name);
        self.run_read("domain_by_name", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { one(txn, stmt, domain_from_row).await })
        })
        .await
    }

    pub async fn list_domains(&self) -> Result<Vec<DomainSchema>, GraphError> {
        self.run_read("domains", |txn| {
            txn_work(async move { many(txn, cypher::list_domains(), domain_from_row).await })
        })
        .await
    }

    pub async fn find_type(&self, id: &EntityId) -> Result<Option<TypeSchema>, GraphError> {
        let id = id.clone();
        self.run_read("type_by_id", move |txn| {
            let id = id.clone();
            txn_work(async move { load_type(txn, &id).await })
        })
        .await
    }

    pub async fn find_type_by_name(
        &self,
        domain: &str,
        name: &str,
    ) -> Result<Option<TypeSchema>, GraphError> {
        let stmt = cypher::type_by_name(domain, name);
        self.run_read("type_by_name", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { one(txn, stmt, type_from_row).await })
        })
        .await
    }

    pub async fn list_types(&self, domain: Option<&str>) -> Result<Vec<TypeSchema>, GraphError> {
        let stmt = cypher::list_types(domain);
        self.run_read("types", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { many(txn, stmt, type_from_row).await })
        })
        .await
    }

    pub async fn find_rel_schema(
        &self,
        id: &EntityId,
    ) -> Result<Option<RelationshipSchema>, GraphError> {
        let id = id.clone();
        self.run_read("rel_schema_by_id", move |txn| {
            let id = id.clone();
            txn_work(async move { load_rel_schema(txn, &id).await })
        })
        .await
    }

    pub async fn find_rel_schema_by_key(
        &self,
        key: &RelSchemaKey,
    ) -> Result<Option<RelationshipSchema>, GraphError> {
        let stmt = cypher::rel_schema_by_key(key);
        self.run_read("rel_schema_by_key", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { one(txn, stmt, rel_schema_from_row).await })
        })
        .await
    }

    pub async fn list_rel_schemas(
        &self,
        domain: Option<&str>,
    ) -> Result<Vec<RelationshipSchema>, GraphError> {
        let stmt = cypher::list_rel_schemas(domain);
        self.run_read("rel_schemas", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { many(txn, stmt, rel_schema_from_row).await })
        })
        .await
    }

    // ── Object lookups ───────────────────────────────────────────

    pub async fn find_node(&self, id: &EntityId) -> Result<Option<ObjectNode>, GraphError> {
        let id = id.clone();
        self.run_read("node_by_id", move |txn| {
            let id = id.clone();
            txn_work(async move { load_node(txn, &id).await })
        })
        .await
    }

    pub async fn list_nodes(
        &self,
        domain: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<ObjectNode>, GraphError> {
        let stmt = cypher::list_nodes(domain, type_name)?;
        self.run_read("nodes", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { many(txn, stmt, node_from_row).await })
        })
        .await
    }

    pub async fn find_relationship(
        &self,
        id: &EntityId,
    ) -> Result<Option<ObjectRelationship>, GraphError> {
        let id = id.clone();
        self.run_read("relationship_by_id", move |txn| {
            let id = id.clone();
            txn_work(async move { load_relationship(txn, &id).await })
        })
        .await
    }

    pub async fn list_relationships(
        &self,
        node: Option<&EntityId>,
    ) -> Result<Vec<ObjectRelationship>, GraphError> {
        let stmt = cypher::list_relationships(node);
        self.run_read("relationships", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { many(txn, stmt, relationship_from_row).await })
        })
        .await
    }
}
