//! In-process graph store.
//!
//! Mirrors the Neo4j store contract: every method is atomic under one lock,
//! uniqueness is only enforced for labels whose node key has been installed,
//! and orderings match the Cypher `ORDER BY` clauses.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use strata_core::naming::domain_label;
use strata_core::{
    DomainSchema, EntityId, ObjectNode, ObjectRelationship, Properties, RelSchemaKey,
    RelationshipSchema, Result, StrataError, TypeSchema,
};

use crate::store::{conforms, GraphStore, PropertyChange};

#[derive(Default)]
struct State {
    domains: BTreeMap<EntityId, DomainSchema>,
    types: BTreeMap<EntityId, TypeSchema>,
    rel_schemas: BTreeMap<EntityId, RelationshipSchema>,
    nodes: BTreeMap<EntityId, ObjectNode>,
    relationships: BTreeMap<EntityId, ObjectRelationship>,
    node_keys: BTreeSet<String>,
}

impl State {
    fn domain(&self, id: &EntityId) -> Result<&DomainSchema> {
        self.domains
            .get(id)
            .ok_or_else(|| StrataError::UnknownDomain(id.to_string()))
    }

    fn type_schema(&self, id: &EntityId) -> Result<&TypeSchema> {
        self.types
            .get(id)
            .ok_or_else(|| StrataError::UnknownType(id.to_string()))
    }

    fn rel_schema(&self, id: &EntityId) -> Result<&RelationshipSchema> {
        self.rel_schemas
            .get(id)
            .ok_or_else(|| StrataError::UnknownRelationshipSchema(id.to_string()))
    }

    fn node(&self, id: &EntityId) -> Result<&ObjectNode> {
        self.nodes
            .get(id)
            .ok_or_else(|| StrataError::UnknownNode(id.to_string()))
    }

    fn relationship(&self, id: &EntityId) -> Result<&ObjectRelationship> {
        self.relationships
            .get(id)
            .ok_or_else(|| StrataError::UnknownRelationship(id.to_string()))
    }

    fn type_named(&self, domain: &str, name: &str) -> Result<&TypeSchema> {
        self.types
            .values()
            .find(|t| t.domain == domain && t.name == name)
            .ok_or_else(|| StrataError::UnknownType(format!("{domain}.{name}")))
    }

    /// The schema governing an edge `name` between the two nodes.
    fn governing(
        &self,
        name: &str,
        domain: &str,
        from: &EntityId,
        to: &EntityId,
    ) -> Result<&RelationshipSchema> {
        let key = RelSchemaKey {
            name: name.to_string(),
            domain: domain.to_string(),
            from_type: self.node(from)?.type_name.clone(),
            to_type: self.node(to)?.type_name.clone(),
        };
        self.rel_schemas
            .values()
            .find(|s| s.key() == key)
            .ok_or_else(|| StrataError::UnknownRelationshipSchema(key.to_string()))
    }

    fn has_type(&self, domain: &str, name: &str) -> bool {
        self.types
            .values()
            .any(|t| t.domain == domain && t.name == name)
    }

    /// Would `candidate` violate an installed node key?
    fn node_key_conflict(&self, candidate: &ObjectNode) -> bool {
        let guarded = candidate.labels.iter().any(|l| self.node_keys.contains(l));
        guarded
            && self.nodes.values().any(|n| {
                n.id != candidate.id
                    && n.name == candidate.name
                    && n.type_name == candidate.type_name
                    && n.domain == candidate.domain
            })
    }

    /// Is `rel` an instance of the schema keyed by `key`?
    fn governed_by(&self, rel: &ObjectRelationship, key: &RelSchemaKey) -> bool {
        let endpoint_type = |id: &EntityId| self.nodes.get(id).map(|n| n.type_name.as_str());
        rel.domain == key.domain
            && rel.name == key.name
            && endpoint_type(&rel.from) == Some(key.from_type.as_str())
            && endpoint_type(&rel.to) == Some(key.to_type.as_str())
    }
}

fn rewrite_keys(props: &mut Properties, change: &PropertyChange) {
    for (from, to) in &change.renamed {
        if let Some(value) = props.remove(from) {
            props.insert(to.clone(), value);
        }
    }
    for key in &change.removed {
        props.remove(key);
    }
}

/// Graph store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    offline: AtomicBool,
    node_key_requests: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline every call fails with `StoreUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of `ensure_node_keys` calls that reached the store.
    pub fn node_key_requests(&self) -> usize {
        self.node_key_requests.load(Ordering::SeqCst)
    }

    /// Labels with an installed node key.
    pub fn node_keys(&self) -> BTreeSet<String> {
        self.state.lock().node_keys.clone()
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StrataError::StoreUnavailable { attempts: 1 })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn ensure_node_keys(&self, labels: &[String]) -> Result<()> {
        self.check()?;
        self.node_key_requests.fetch_add(1, Ordering::SeqCst);
        self.state.lock().node_keys.extend(labels.iter().cloned());
        Ok(())
    }

    // ── Domains ──────────────────────────────────────────────────

    async fn insert_domain(&self, domain: &DomainSchema) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        if state.domains.values().any(|d| d.name == domain.name) {
            return Err(StrataError::DuplicateSchema(domain.name.clone()));
        }
        state.domains.insert(domain.id.clone(), domain.clone());
        Ok(())
    }

    async fn domain_by_id(&self, id: &EntityId) -> Result<Option<DomainSchema>> {
        self.check()?;
        Ok(self.state.lock().domains.get(id).cloned())
    }

    async fn domain_by_name(&self, name: &str) -> Result<Option<DomainSchema>> {
        self.check()?;
        let state = self.state.lock();
        Ok(state.domains.values().find(|d| d.name == name).cloned())
    }

    async fn domains(&self) -> Result<Vec<DomainSchema>> {
        self.check()?;
        let mut out: Vec<_> = self.state.lock().domains.values().cloned().collect();
        out.sort_by(|a, b| (&a.name, &a.id).cmp(&(&b.name, &b.id)));
        Ok(out)
    }

    async fn rename_domain(&self, id: &EntityId, new_name: &str) -> Result<DomainSchema> {
        self.check()?;
        let mut state = self.state.lock();
        let old = state.domain(id)?.name.clone();
        if old == new_name {
            return state.domain(id).cloned();
        }
        if state.domains.values().any(|d| d.name == new_name) {
            return Err(StrataError::DuplicateSchema(new_name.to_string()));
        }
        let (old_label, new_label) = (domain_label(&old), domain_label(new_name));

        for t in state.types.values_mut().filter(|t| t.domain == old) {
            t.domain = new_name.to_string();
        }
        for s in state.rel_schemas.values_mut().filter(|s| s.domain == old) {
            s.domain = new_name.to_string();
        }
        for n in state.nodes.values_mut().filter(|n| n.domain == old) {
            n.labels.remove(&old_label);
            n.labels.insert(new_label.clone());
            n.domain = new_name.to_string();
        }
        for r in state.relationships.values_mut().filter(|r| r.domain == old) {
            r.domain = new_name.to_string();
        }
        let domain = state
            .domains
            .get_mut(id)
            .ok_or_else(|| StrataError::UnknownDomain(id.to_string()))?;
        domain.name = new_name.to_string();
        Ok(domain.clone())
    }

    async fn delete_domain(&self, id: &EntityId) -> Result<DomainSchema> {
        self.check()?;
        let mut state = self.state.lock();
        let domain = state.domain(id)?.clone();
        let nodes = state
            .nodes
            .values()
            .filter(|n| n.domain == domain.name)
            .count();
        if nodes > 0 {
            return Err(StrataError::SchemaInUse {
                entity: domain.name.clone(),
                reason: format!("{nodes} object nodes remain in the domain"),
            });
        }
        state.types.retain(|_, t| t.domain != domain.name);
        state.rel_schemas.retain(|_, s| s.domain != domain.name);
        state.domains.remove(id);
        Ok(domain)
    }

    // ── Types ────────────────────────────────────────────────────

    async fn insert_type(&self, schema: &TypeSchema) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        if !state.domains.values().any(|d| d.name == schema.domain) {
            return Err(StrataError::UnknownDomain(schema.domain.clone()));
        }
        if state.has_type(&schema.domain, &schema.name) {
            return Err(StrataError::DuplicateSchema(schema.qualified_name()));
        }
        state.types.insert(schema.id.clone(), schema.clone());
        Ok(())
    }

    async fn type_by_id(&self, id: &EntityId) -> Result<Option<TypeSchema>> {
        self.check()?;
        Ok(self.state.lock().types.get(id).cloned())
    }

    async fn type_by_name(&self, domain: &str, name: &str) -> Result<Option<TypeSchema>> {
        self.check()?;
        let state = self.state.lock();
        Ok(state
            .types
            .values()
            .find(|t| t.domain == domain && t.name == name)
            .cloned())
    }

    async fn types(&self, domain: Option<&str>) -> Result<Vec<TypeSchema>> {
        self.check()?;
        let mut out: Vec<_> = self
            .state
            .lock()
            .types
            .values()
            .filter(|t| domain.map_or(true, |d| t.domain == d))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.domain, &a.name, &a.id).cmp(&(&b.domain, &b.name, &b.id)));
        Ok(out)
    }

    async fn rename_type(&self, id: &EntityId, new_name: &str) -> Result<TypeSchema> {
        self.check()?;
        let mut state = self.state.lock();
        let current = state.type_schema(id)?.clone();
        if current.name == new_name {
            return Ok(current);
        }
        if state.has_type(&current.domain, new_name) {
            return Err(StrataError::DuplicateSchema(format!(
                "{}.{new_name}",
                current.domain
            )));
        }
        let (domain, old) = (current.domain.clone(), current.name.clone());
        for n in state
            .nodes
            .values_mut()
            .filter(|n| n.domain == domain && n.type_name == old)
        {
            n.labels.remove(&old);
            n.labels.insert(new_name.to_string());
            n.type_name = new_name.to_string();
        }
        for s in state.rel_schemas.values_mut().filter(|s| s.domain == domain) {
            if s.from_type == old {
                s.from_type = new_name.to_string();
            }
            if s.to_type == old {
                s.to_type = new_name.to_string();
            }
        }
        let renamed = TypeSchema {
            name: new_name.to_string(),
            ..current
        };
        state.types.insert(id.clone(), renamed.clone());
        Ok(renamed)
    }

    async fn delete_type(&self, id: &EntityId) -> Result<TypeSchema> {
        self.check()?;
        let mut state = self.state.lock();
        let schema = state.type_schema(id)?.clone();
        let nodes = state
            .nodes
            .values()
            .filter(|n| n.domain == schema.domain && n.type_name == schema.name)
            .count();
        if nodes > 0 {
            return Err(StrataError::SchemaInUse {
                entity: schema.qualified_name(),
                reason: format!("{nodes} object nodes have this type"),
            });
        }
        let refs = state
            .rel_schemas
            .values()
            .filter(|s| s.references_type(&schema.domain, &schema.name))
            .count();
        if refs > 0 {
            return Err(StrataError::SchemaInUse {
                entity: schema.qualified_name(),
                reason: format!("{refs} relationship schemas reference this type"),
            });
        }
        state.types.remove(id);
        Ok(schema)
    }

    async fn update_type_properties(
        &self,
        id: &EntityId,
        change: &PropertyChange,
    ) -> Result<(TypeSchema, bool)> {
        self.check()?;
        let mut state = self.state.lock();
        let current = state.type_schema(id)?.clone();
        let mut declarations = current.properties.clone();
        if !change.apply(&mut declarations, &current.qualified_name())? {
            return Ok((current, false));
        }
        for n in state
            .nodes
            .values_mut()
            .filter(|n| n.domain == current.domain && n.type_name == current.name)
        {
            rewrite_keys(&mut n.properties, change);
        }
        let updated = TypeSchema {
            properties: declarations,
            ..current
        };
        state.types.insert(id.clone(), updated.clone());
        Ok((updated, true))
    }

    // ── Relationship schemas ─────────────────────────────────────

    async fn insert_rel_schema(&self, schema: &RelationshipSchema) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        for endpoint in [&schema.from_type, &schema.to_type] {
            if !state.has_type(&schema.domain, endpoint) {
                return Err(StrataError::UnknownType(format!(
                    "{}.{endpoint}",
                    schema.domain
                )));
            }
        }
        let key = schema.key();
        if state.rel_schemas.values().any(|s| s.key() == key) {
            return Err(StrataError::DuplicateSchema(key.to_string()));
        }
        state.rel_schemas.insert(schema.id.clone(), schema.clone());
        Ok(())
    }

    async fn rel_schema_by_id(&self, id: &EntityId) -> Result<Option<RelationshipSchema>> {
        self.check()?;
        Ok(self.state.lock().rel_schemas.get(id).cloned())
    }

    async fn rel_schema_by_key(&self, key: &RelSchemaKey) -> Result<Option<RelationshipSchema>> {
        self.check()?;
        let state = self.state.lock();
        Ok(state.rel_schemas.values().find(|s| &s.key() == key).cloned())
    }

    async fn rel_schemas(&self, domain: Option<&str>) -> Result<Vec<RelationshipSchema>> {
        self.check()?;
        let mut out: Vec<_> = self
            .state
            .lock()
            .rel_schemas
            .values()
            .filter(|s| domain.map_or(true, |d| s.domain == d))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (&a.domain, &a.name, &a.from_type, &a.to_type, &a.id)
                .cmp(&(&b.domain, &b.name, &b.from_type, &b.to_type, &b.id))
        });
        Ok(out)
    }

    async fn rename_rel_schema(
        &self,
        id: &EntityId,
        new_name: &str,
    ) -> Result<RelationshipSchema> {
        self.check()?;
        let mut state = self.state.lock();
        let current = state.rel_schema(id)?.clone();
        if current.name == new_name {
            return Ok(current);
        }
        let old_key = current.key();
        let new_key = RelSchemaKey {
            name: new_name.to_string(),
            ..old_key.clone()
        };
        if state.rel_schemas.values().any(|s| s.key() == new_key) {
            return Err(StrataError::DuplicateSchema(new_key.to_string()));
        }
        let governed: Vec<EntityId> = state
            .relationships
            .values()
            .filter(|r| state.governed_by(r, &old_key))
            .map(|r| r.id.clone())
            .collect();
        for rid in governed {
            if let Some(r) = state.relationships.get_mut(&rid) {
                r.name = new_name.to_string();
            }
        }
        let renamed = RelationshipSchema {
            name: new_name.to_string(),
            ..current
        };
        state.rel_schemas.insert(id.clone(), renamed.clone());
        Ok(renamed)
    }

    async fn delete_rel_schema(&self, id: &EntityId) -> Result<RelationshipSchema> {
        self.check()?;
        let mut state = self.state.lock();
        let schema = state.rel_schema(id)?.clone();
        let key = schema.key();
        let used = state
            .relationships
            .values()
            .filter(|r| state.governed_by(r, &key))
            .count();
        if used > 0 {
            return Err(StrataError::SchemaInUse {
                entity: key.to_string(),
                reason: format!("{used} relationships use this schema"),
            });
        }
        state.rel_schemas.remove(id);
        Ok(schema)
    }

    async fn update_rel_schema_properties(
        &self,
        id: &EntityId,
        change: &PropertyChange,
    ) -> Result<(RelationshipSchema, bool)> {
        self.check()?;
        let mut state = self.state.lock();
        let current = state.rel_schema(id)?.clone();
        let key = current.key();
        let mut declarations = current.properties.clone();
        if !change.apply(&mut declarations, &key.to_string())? {
            return Ok((current, false));
        }
        let governed: Vec<EntityId> = state
            .relationships
            .values()
            .filter(|r| state.governed_by(r, &key))
            .map(|r| r.id.clone())
            .collect();
        for rid in governed {
            if let Some(r) = state.relationships.get_mut(&rid) {
                rewrite_keys(&mut r.properties, change);
            }
        }
        let updated = RelationshipSchema {
            properties: declarations,
            ..current
        };
        state.rel_schemas.insert(id.clone(), updated.clone());
        Ok((updated, true))
    }

    // ── Object nodes ─────────────────────────────────────────────

    async fn insert_node(&self, node: &ObjectNode) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        let schema = state.type_named(&node.domain, &node.type_name)?;
        conforms(&schema.properties, &node.properties, &schema.qualified_name())?;
        if state.node_key_conflict(node) {
            return Err(StrataError::DuplicateNode {
                domain: node.domain.clone(),
                type_name: node.type_name.clone(),
                name: node.name.clone(),
            });
        }
        state.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    async fn node_by_id(&self, id: &EntityId) -> Result<Option<ObjectNode>> {
        self.check()?;
        Ok(self.state.lock().nodes.get(id).cloned())
    }

    async fn nodes(
        &self,
        domain: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<ObjectNode>> {
        self.check()?;
        let mut out: Vec<_> = self
            .state
            .lock()
            .nodes
            .values()
            .filter(|n| domain.map_or(true, |d| n.domain == d))
            .filter(|n| type_name.map_or(true, |t| n.type_name == t))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            (&a.domain, &a.type_name, &a.name, &a.id).cmp(&(&b.domain, &b.type_name, &b.name, &b.id))
        });
        Ok(out)
    }

    async fn rename_node(&self, id: &EntityId, new_name: &str) -> Result<ObjectNode> {
        self.check()?;
        let mut state = self.state.lock();
        let candidate = ObjectNode {
            name: new_name.to_string(),
            ..state.node(id)?.clone()
        };
        if state.node_key_conflict(&candidate) {
            return Err(StrataError::DuplicateNode {
                domain: candidate.domain,
                type_name: candidate.type_name,
                name: candidate.name,
            });
        }
        state.nodes.insert(id.clone(), candidate.clone());
        Ok(candidate)
    }

    async fn delete_node(&self, id: &EntityId) -> Result<ObjectNode> {
        self.check()?;
        let mut state = self.state.lock();
        let node = state.node(id)?.clone();
        state.relationships.retain(|_, r| !r.touches(id));
        state.nodes.remove(id);
        Ok(node)
    }

    async fn update_node_labels(
        &self,
        id: &EntityId,
        add: &[String],
        remove: &[String],
    ) -> Result<ObjectNode> {
        self.check()?;
        let mut state = self.state.lock();
        let mut node = state.node(id)?.clone();
        node.labels.extend(add.iter().cloned());
        for label in remove {
            node.labels.remove(label);
        }
        state.nodes.insert(id.clone(), node.clone());
        Ok(node)
    }

    async fn update_node_properties(
        &self,
        id: &EntityId,
        set: &Properties,
        remove: &[String],
    ) -> Result<ObjectNode> {
        self.check()?;
        let mut state = self.state.lock();
        let mut node = state.node(id)?.clone();
        if !set.is_empty() {
            let schema = state.type_named(&node.domain, &node.type_name)?;
            conforms(&schema.properties, set, &schema.qualified_name())?;
        }
        node.properties
            .extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));
        for key in remove {
            node.properties.remove(key);
        }
        state.nodes.insert(id.clone(), node.clone());
        Ok(node)
    }

    // ── Object relationships ─────────────────────────────────────

    async fn insert_relationship(&self, rel: &ObjectRelationship) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&rel.from) || !state.nodes.contains_key(&rel.to) {
            return Err(StrataError::UnknownNode(format!("{} or {}", rel.from, rel.to)));
        }
        let schema = state.governing(&rel.name, &rel.domain, &rel.from, &rel.to)?;
        conforms(&schema.properties, &rel.properties, &schema.key().to_string())?;
        state.relationships.insert(rel.id.clone(), rel.clone());
        Ok(())
    }

    async fn relationship_by_id(&self, id: &EntityId) -> Result<Option<ObjectRelationship>> {
        self.check()?;
        Ok(self.state.lock().relationships.get(id).cloned())
    }

    async fn relationships(&self, node: Option<&EntityId>) -> Result<Vec<ObjectRelationship>> {
        self.check()?;
        let mut out: Vec<_> = self
            .state
            .lock()
            .relationships
            .values()
            .filter(|r| node.map_or(true, |n| r.touches(n)))
            .cloned()
            .collect();
        out.sort_by(|a, b| (&a.domain, &a.name, &a.id).cmp(&(&b.domain, &b.name, &b.id)));
        Ok(out)
    }

    async fn rename_relationship(
        &self,
        id: &EntityId,
        new_name: &str,
    ) -> Result<ObjectRelationship> {
        self.check()?;
        let mut state = self.state.lock();
        let mut rel = state.relationship(id)?.clone();
        rel.name = new_name.to_string();
        state.relationships.insert(id.clone(), rel.clone());
        Ok(rel)
    }

    async fn delete_relationship(&self, id: &EntityId) -> Result<ObjectRelationship> {
        self.check()?;
        let mut state = self.state.lock();
        let rel = state.relationship(id)?.clone();
        state.relationships.remove(id);
        Ok(rel)
    }

    async fn update_relationship_properties(
        &self,
        id: &EntityId,
        set: &Properties,
        remove: &[String],
    ) -> Result<ObjectRelationship> {
        self.check()?;
        let mut state = self.state.lock();
        let mut rel = state.relationship(id)?.clone();
        if !set.is_empty() {
            let schema = state.governing(&rel.name, &rel.domain, &rel.from, &rel.to)?;
            conforms(&schema.properties, set, &schema.key().to_string())?;
        }
        rel.properties
            .extend(set.iter().map(|(k, v)| (k.clone(), v.clone())));
        for key in remove {
            rel.properties.remove(key);
        }
        state.relationships.insert(id.clone(), rel.clone());
        Ok(rel)
    }
}
