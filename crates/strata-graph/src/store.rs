//! The graph store seam.
//!
//! Every method is one store transaction: it either applies completely or
//! not at all. Callers pass already-normalised names; implementations
//! enforce uniqueness, cascades and in-use checks atomically and report
//! them as `StrataError` kinds.

use std::sync::Arc;

use async_trait::async_trait;

use strata_core::{
    DomainSchema, EntityId, ObjectNode, ObjectRelationship, Properties, PropertyDecls,
    RelSchemaKey, RelationshipSchema, Result, StrataError, TypeSchema,
};

/// An edit to the property declarations of a schema.
///
/// The store applies it to the declarations it reads inside the write
/// transaction, so concurrent edits to the same schema compose instead of
/// overwriting each other.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyChange {
    /// Keys to declare. Re-declaring a key with its current kind is a no-op.
    pub added: PropertyDecls,
    /// Keys renamed on the schema and on every instance, `(from, to)`.
    pub renamed: Vec<(String, String)>,
    /// Keys undeclared and stripped from every instance.
    pub removed: Vec<String>,
}

impl PropertyChange {
    pub fn add(decls: PropertyDecls) -> Self {
        Self {
            added: decls,
            ..Self::default()
        }
    }

    pub fn rename(from: &str, to: &str) -> Self {
        Self {
            renamed: vec![(from.to_string(), to.to_string())],
            ..Self::default()
        }
    }

    pub fn remove(keys: Vec<String>) -> Self {
        Self {
            removed: keys,
            ..Self::default()
        }
    }

    /// Apply the change to `decls`, the declarations of `owner`.
    ///
    /// Returns whether anything changed. On error `decls` may be partly
    /// edited and must be discarded.
    pub fn apply(&self, decls: &mut PropertyDecls, owner: &str) -> Result<bool> {
        let mut changed = false;
        for key in &self.removed {
            if self.added.contains_key(key) {
                return Err(StrataError::property(key, "both added and removed"));
            }
            if decls.remove(key).is_none() {
                return Err(StrataError::property(key, format!("not declared on {owner}")));
            }
            changed = true;
        }
        for (from, to) in &self.renamed {
            if from == to {
                return Err(StrataError::property(to, "new key equals the old key"));
            }
            let decl = decls
                .remove(from)
                .ok_or_else(|| StrataError::property(from, format!("not declared on {owner}")))?;
            if decls.contains_key(to) {
                return Err(StrataError::property(to, format!("already declared on {owner}")));
            }
            decls.insert(to.clone(), decl);
            changed = true;
        }
        for (key, decl) in &self.added {
            match decls.get(key).map(|d| d.kind) {
                Some(existing) if existing == decl.kind => {}
                Some(existing) => {
                    return Err(StrataError::property(
                        key,
                        format!("already declared as {existing}"),
                    ))
                }
                None => {
                    decls.insert(key.clone(), *decl);
                    changed = true;
                }
            }
        }
        Ok(changed)
    }
}

/// Check typed values against the declarations of `owner` as they stand now.
pub fn conforms(decls: &PropertyDecls, values: &Properties, owner: &str) -> Result<()> {
    for (key, value) in values {
        match decls.get(key) {
            None => {
                return Err(StrataError::property(key, format!("not declared on {owner}")))
            }
            Some(decl) if decl.kind != value.kind() => {
                return Err(StrataError::property(
                    key,
                    format!("expected {}, got {}", decl.kind, value.kind()),
                ))
            }
            Some(_) => {}
        }
    }
    Ok(())
}

pub type SharedStore = Arc<dyn GraphStore>;

#[async_trait]
pub trait GraphStore: Send + Sync {
    // ── Constraints ──────────────────────────────────────────────

    /// Install `(name, type, domain)` uniqueness for each label. Idempotent.
    async fn ensure_node_keys(&self, labels: &[String]) -> Result<()>;

    // ── Domains ──────────────────────────────────────────────────

    /// Fails with `DuplicateSchema` if the name is taken.
    async fn insert_domain(&self, domain: &DomainSchema) -> Result<()>;

    async fn domain_by_id(&self, id: &EntityId) -> Result<Option<DomainSchema>>;

    async fn domain_by_name(&self, name: &str) -> Result<Option<DomainSchema>>;

    /// All domains ordered by name.
    async fn domains(&self) -> Result<Vec<DomainSchema>>;

    /// Renames the domain and rewrites the `domain` attribute and umbrella
    /// label of every dependent schema and object.
    async fn rename_domain(&self, id: &EntityId, new_name: &str) -> Result<DomainSchema>;

    /// Fails with `SchemaInUse` while object nodes exist in the domain;
    /// otherwise removes the domain with its types and relationship schemas.
    async fn delete_domain(&self, id: &EntityId) -> Result<DomainSchema>;

    // ── Types ────────────────────────────────────────────────────

    /// Fails with `DuplicateSchema` if `(domain, name)` is taken.
    async fn insert_type(&self, schema: &TypeSchema) -> Result<()>;

    async fn type_by_id(&self, id: &EntityId) -> Result<Option<TypeSchema>>;

    async fn type_by_name(&self, domain: &str, name: &str) -> Result<Option<TypeSchema>>;

    /// Types ordered by `(domain, name)`, optionally restricted to one domain.
    async fn types(&self, domain: Option<&str>) -> Result<Vec<TypeSchema>>;

    /// Renames the type, relabels its nodes and rewrites relationship schema
    /// endpoints that reference it.
    async fn rename_type(&self, id: &EntityId, new_name: &str) -> Result<TypeSchema>;

    /// Fails with `SchemaInUse` while nodes or relationship schemas depend on it.
    async fn delete_type(&self, id: &EntityId) -> Result<TypeSchema>;

    /// Applies `change` to the stored declarations and rewrites the nodes of
    /// the type. The flag is `false` when the change was a no-op.
    async fn update_type_properties(
        &self,
        id: &EntityId,
        change: &PropertyChange,
    ) -> Result<(TypeSchema, bool)>;

    // ── Relationship schemas ─────────────────────────────────────

    /// Fails with `DuplicateSchema` if the key is taken.
    async fn insert_rel_schema(&self, schema: &RelationshipSchema) -> Result<()>;

    async fn rel_schema_by_id(&self, id: &EntityId) -> Result<Option<RelationshipSchema>>;

    async fn rel_schema_by_key(&self, key: &RelSchemaKey) -> Result<Option<RelationshipSchema>>;

    /// Relationship schemas ordered by `(domain, name, from_type, to_type)`.
    async fn rel_schemas(&self, domain: Option<&str>) -> Result<Vec<RelationshipSchema>>;

    /// Renames the schema and the relationship type of every instance.
    async fn rename_rel_schema(
        &self,
        id: &EntityId,
        new_name: &str,
    ) -> Result<RelationshipSchema>;

    /// Fails with `SchemaInUse` while relationships use it.
    async fn delete_rel_schema(&self, id: &EntityId) -> Result<RelationshipSchema>;

    async fn update_rel_schema_properties(
        &self,
        id: &EntityId,
        change: &PropertyChange,
    ) -> Result<(RelationshipSchema, bool)>;

    // ── Object nodes ─────────────────────────────────────────────

    /// Fails with `UnknownType` if the node's type is gone,
    /// `PropertySchemaViolation` if a value no longer matches its
    /// declarations and `DuplicateNode` if `(name, type, domain)` is taken.
    async fn insert_node(&self, node: &ObjectNode) -> Result<()>;

    async fn node_by_id(&self, id: &EntityId) -> Result<Option<ObjectNode>>;

    /// Nodes ordered by `(domain, type, name, id)`.
    async fn nodes(&self, domain: Option<&str>, type_name: Option<&str>)
        -> Result<Vec<ObjectNode>>;

    async fn rename_node(&self, id: &EntityId, new_name: &str) -> Result<ObjectNode>;

    /// Removes the node and every relationship touching it.
    async fn delete_node(&self, id: &EntityId) -> Result<ObjectNode>;

    async fn update_node_labels(
        &self,
        id: &EntityId,
        add: &[String],
        remove: &[String],
    ) -> Result<ObjectNode>;

    /// `set` is re-checked against the type's current declarations.
    async fn update_node_properties(
        &self,
        id: &EntityId,
        set: &Properties,
        remove: &[String],
    ) -> Result<ObjectNode>;

    // ── Object relationships ─────────────────────────────────────

    /// Fails with `UnknownNode` if an endpoint vanished and
    /// `UnknownRelationshipSchema` if no schema governs the edge any more.
    async fn insert_relationship(&self, rel: &ObjectRelationship) -> Result<()>;

    async fn relationship_by_id(&self, id: &EntityId) -> Result<Option<ObjectRelationship>>;

    /// Relationships ordered by `(domain, name, id)`, optionally only those
    /// touching `node`.
    async fn relationships(&self, node: Option<&EntityId>) -> Result<Vec<ObjectRelationship>>;

    /// Re-types the relationship, keeping its id, endpoints and properties.
    async fn rename_relationship(
        &self,
        id: &EntityId,
        new_name: &str,
    ) -> Result<ObjectRelationship>;

    async fn delete_relationship(&self, id: &EntityId) -> Result<ObjectRelationship>;

    /// `set` is re-checked against the governing schema's declarations.
    async fn update_relationship_properties(
        &self,
        id: &EntityId,
        set: &Properties,
        remove: &[String],
    ) -> Result<ObjectRelationship>;
}
