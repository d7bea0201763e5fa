//! Write-side graph operations.
//!
//! Each mutation is one managed transaction. Existence and in-use checks run
//! inside that transaction so they see the same snapshot the write applies
//! to; uniqueness is left to the store constraints and mapped back to the
//! matching duplicate error.

use async_trait::async_trait;

use strata_core::{
    DomainSchema, EntityId, ObjectNode, ObjectRelationship, Properties, RelSchemaKey,
    RelationshipSchema, Result, StrataError, TypeSchema,
};

use crate::client::{count, exec, fetch_one, txn_work, GraphClient};
use crate::cypher;
use crate::queries::{
    load_domain, load_node, load_rel_schema, load_relationship, load_type, lock_rel_schema,
    lock_type, lock_type_named,
};
use crate::store::{conforms, GraphStore, PropertyChange};

fn unknown_domain(id: &EntityId) -> StrataError {
    StrataError::UnknownDomain(id.to_string())
}

fn unknown_type(id: &EntityId) -> StrataError {
    StrataError::UnknownType(id.to_string())
}

fn unknown_rel_schema(id: &EntityId) -> StrataError {
    StrataError::UnknownRelationshipSchema(id.to_string())
}

fn unknown_node(id: &EntityId) -> StrataError {
    StrataError::UnknownNode(id.to_string())
}

fn unknown_relationship(id: &EntityId) -> StrataError {
    StrataError::UnknownRelationship(id.to_string())
}

#[async_trait]
impl GraphStore for GraphClient {
    // ── Constraints ──────────────────────────────────────────────

    async fn ensure_node_keys(&self, labels: &[String]) -> Result<()> {
        let statements = labels
            .iter()
            .map(|l| cypher::node_key(l, self.uniqueness()))
            .collect::<Result<Vec<_>>>()?;
        if statements.is_empty() {
            return Ok(());
        }
        // Schema statements cannot share a transaction with data writes.
        self.run_write("ensure_node_keys", move |txn| {
            let statements = statements.clone();
            txn_work(async move {
                for stmt in statements {
                    exec(txn, stmt).await?;
                }
                Ok(())
            })
        })
        .await?;
        tracing::debug!(?labels, "Node key constraints ensured");
        Ok(())
    }

    // ── Domains ──────────────────────────────────────────────────

    async fn insert_domain(&self, domain: &DomainSchema) -> Result<()> {
        let stmt = cypher::insert_domain(domain);
        let name = domain.name.clone();
        self.run_write("insert_domain", move |txn| {
            let stmt = stmt.clone();
            txn_work(async move { exec(txn, stmt).await })
        })
        .await
        .map_err(|e| e.into_strata_or(|| StrataError::DuplicateSchema(name)))
    }

    async fn domain_by_id(&self, id: &EntityId) -> Result<Option<DomainSchema>> {
        Ok(self.find_domain(id).await?)
    }

    async fn domain_by_name(&self, name: &str) -> Result<Option<DomainSchema>> {
        Ok(self.find_domain_by_name(name).await?)
    }

    async fn domains(&self) -> Result<Vec<DomainSchema>> {
        Ok(self.list_domains().await?)
    }

    async fn rename_domain(&self, id: &EntityId, new_name: &str) -> Result<DomainSchema> {
        let (id, new_name) = (id.clone(), new_name.to_string());
        let conflict = new_name.clone();
        self.run_write("rename_domain", move |txn| {
            let (id, new_name) = (id.clone(), new_name.clone());
            txn_work(async move {
                let current = load_domain(txn, &id)
                    .await?
                    .ok_or_else(|| unknown_domain(&id))?;
                if current.name == new_name {
                    return Ok(current);
                }
                exec(txn, cypher::set_domain_name(&id, &new_name)).await?;
                for stmt in cypher::move_domain(&current.name, &new_name)? {
                    exec(txn, stmt).await?;
                }
                Ok(DomainSchema { id, name: new_name })
            })
        })
        .await
        .map_err(|e| e.into_strata_or(|| StrataError::DuplicateSchema(conflict)))
    }

    async fn delete_domain(&self, id: &EntityId) -> Result<DomainSchema> {
        let id = id.clone();
        Ok(self
            .run_write("delete_domain", move |txn| {
                let id = id.clone();
                txn_work(async move {
                    let domain = load_domain(txn, &id)
                        .await?
                        .ok_or_else(|| unknown_domain(&id))?;
                    let nodes = count(txn, cypher::count_domain_nodes(&domain.name)?).await?;
                    if nodes > 0 {
                        return Err(StrataError::SchemaInUse {
                            entity: domain.name.clone(),
                            reason: format!("{nodes} object nodes remain in the domain"),
                        }
                        .into());
                    }
                    for stmt in cypher::delete_domain(&domain.id, &domain.name) {
                        exec(txn, stmt).await?;
                    }
                    Ok(domain)
                })
            })
            .await?)
    }

    // ── Types ────────────────────────────────────────────────────

    async fn insert_type(&self, schema: &TypeSchema) -> Result<()> {
        let stmt = cypher::insert_type(schema)?;
        let domain = schema.domain.clone();
        let qualified = schema.qualified_name();
        self.run_write("insert_type", move |txn| {
            let (stmt, domain) = (stmt.clone(), domain.clone());
            txn_work(async move {
                match fetch_one(txn, stmt).await? {
                    Some(_) => Ok(()),
                    None => Err(StrataError::UnknownDomain(domain).into()),
                }
            })
        })
        .await
        .map_err(|e| e.into_strata_or(|| StrataError::DuplicateSchema(qualified)))
    }

    async fn type_by_id(&self, id: &EntityId) -> Result<Option<TypeSchema>> {
        Ok(self.find_type(id).await?)
    }

    async fn type_by_name(&self, domain: &str, name: &str) -> Result<Option<TypeSchema>> {
        Ok(self.find_type_by_name(domain, name).await?)
    }

    async fn types(&self, domain: Option<&str>) -> Result<Vec<TypeSchema>> {
        Ok(self.list_types(domain).await?)
    }

    async fn rename_type(&self, id: &EntityId, new_name: &str) -> Result<TypeSchema> {
        let (id, new_name) = (id.clone(), new_name.to_string());
        let conflict = new_name.clone();
        self.run_write("rename_type", move |txn| {
            let (id, new_name) = (id.clone(), new_name.clone());
            txn_work(async move {
                let current = load_type(txn, &id).await?.ok_or_else(|| unknown_type(&id))?;
                if current.name == new_name {
                    return Ok(current);
                }
                exec(txn, cypher::set_type_name(&id, &new_name)).await?;
                for stmt in cypher::retype_nodes(&current.domain, &current.name, &new_name)? {
                    exec(txn, stmt).await?;
                }
                Ok(TypeSchema {
                    name: new_name,
                    ..current
                })
            })
        })
        .await
        .map_err(|e| e.into_strata_or(|| StrataError::DuplicateSchema(conflict)))
    }

    async fn delete_type(&self, id: &EntityId) -> Result<TypeSchema> {
        let id = id.clone();
        Ok(self
            .run_write("delete_type", move |txn| {
                let id = id.clone();
                txn_work(async move {
                    let schema = lock_type(txn, &id).await?.ok_or_else(|| unknown_type(&id))?;
                    let nodes =
                        count(txn, cypher::count_type_nodes(&schema.domain, &schema.name)?).await?;
                    if nodes > 0 {
                        return Err(StrataError::SchemaInUse {
                            entity: schema.qualified_name(),
                            reason: format!("{nodes} object nodes have this type"),
                        }
                        .into());
                    }
                    let refs = count(
                        txn,
                        cypher::count_type_references(&schema.domain, &schema.name),
                    )
                    .await?;
                    if refs > 0 {
                        return Err(StrataError::SchemaInUse {
                            entity: schema.qualified_name(),
                            reason: format!("{refs} relationship schemas reference this type"),
                        }
                        .into());
                    }
                    exec(txn, cypher::delete_type(&id)).await?;
                    Ok(schema)
                })
            })
            .await?)
    }

    async fn update_type_properties(
        &self,
        id: &EntityId,
        change: &PropertyChange,
    ) -> Result<(TypeSchema, bool)> {
        let (id, change) = (id.clone(), change.clone());
        Ok(self
            .run_write("update_type_properties", move |txn| {
                let (id, change) = (id.clone(), change.clone());
                txn_work(async move {
                    let current = lock_type(txn, &id).await?.ok_or_else(|| unknown_type(&id))?;
                    let mut declarations = current.properties.clone();
                    if !change.apply(&mut declarations, &current.qualified_name())? {
                        return Ok((current, false));
                    }
                    exec(txn, cypher::set_type_properties(&id, &declarations)?).await?;
                    for stmt in cypher::rewrite_node_keys(
                        &current.domain,
                        &current.name,
                        &change.renamed,
                        &change.removed,
                    )? {
                        exec(txn, stmt).await?;
                    }
                    Ok((
                        TypeSchema {
                            properties: declarations,
                            ..current
                        },
                        true,
                    ))
                })
            })
            .await?)
    }

    // ── Relationship schemas ─────────────────────────────────────

    async fn insert_rel_schema(&self, schema: &RelationshipSchema) -> Result<()> {
        let stmt = cypher::insert_rel_schema(schema)?;
        let key = schema.key();
        let conflict = key.to_string();
        self.run_write("insert_rel_schema", move |txn| {
            let (stmt, key) = (stmt.clone(), key.clone());
            txn_work(async move {
                match fetch_one(txn, stmt).await? {
                    Some(_) => Ok(()),
                    None => Err(StrataError::UnknownType(format!(
                        "{d}.{} or {d}.{}",
                        key.from_type,
                        key.to_type,
                        d = key.domain
                    ))
                    .into()),
                }
            })
        })
        .await
        .map_err(|e| e.into_strata_or(|| StrataError::DuplicateSchema(conflict)))
    }

    async fn rel_schema_by_id(&self, id: &EntityId) -> Result<Option<RelationshipSchema>> {
        Ok(self.find_rel_schema(id).await?)
    }

    async fn rel_schema_by_key(&self, key: &RelSchemaKey) -> Result<Option<RelationshipSchema>> {
        Ok(self.find_rel_schema_by_key(key).await?)
    }

    async fn rel_schemas(&self, domain: Option<&str>) -> Result<Vec<RelationshipSchema>> {
        Ok(self.list_rel_schemas(domain).await?)
    }

    async fn rename_rel_schema(
        &self,
        id: &EntityId,
        new_name: &str,
    ) -> Result<RelationshipSchema> {
        let (id, new_name) = (id.clone(), new_name.to_string());
        let conflict = new_name.clone();
        self.run_write("rename_rel_schema", move |txn| {
            let (id, new_name) = (id.clone(), new_name.clone());
            txn_work(async move {
                let current = load_rel_schema(txn, &id)
                    .await?
                    .ok_or_else(|| unknown_rel_schema(&id))?;
                if current.name == new_name {
                    return Ok(current);
                }
                exec(txn, cypher::set_rel_schema_name(&id, &new_name)).await?;
                exec(txn, cypher::retype_governed(&current.key(), &new_name)?).await?;
                Ok(RelationshipSchema {
                    name: new_name,
                    ..current
                })
            })
        })
        .await
        .map_err(|e| e.into_strata_or(|| StrataError::DuplicateSchema(conflict)))
    }

    async fn delete_rel_schema(&self, id: &EntityId) -> Result<RelationshipSchema> {
        let id = id.clone();
        Ok(self
            .run_write("delete_rel_schema", move |txn| {
                let id = id.clone();
                txn_work(async move {
                    let schema = lock_rel_schema(txn, cypher::lock_rel_schema(&id))
                        .await?
                        .ok_or_else(|| unknown_rel_schema(&id))?;
                    let used = count(txn, cypher::count_governed(&schema.key())?).await?;
                    if used > 0 {
                        return Err(StrataError::SchemaInUse {
                            entity: schema.key().to_string(),
                            reason: format!("{used} relationships use this schema"),
                        }
                        .into());
                    }
                    exec(txn, cypher::delete_rel_schema(&id)).await?;
                    Ok(schema)
                })
            })
            .await?)
    }

    async fn update_rel_schema_properties(
        &self,
        id: &EntityId,
        change: &PropertyChange,
    ) -> Result<(RelationshipSchema, bool)> {
        let (id, change) = (id.clone(), change.clone());
        Ok(self
            .run_write("update_rel_schema_properties", move |txn| {
                let (id, change) = (id.clone(), change.clone());
                txn_work(async move {
                    let current = lock_rel_schema(txn, cypher::lock_rel_schema(&id))
                        .await?
                        .ok_or_else(|| unknown_rel_schema(&id))?;
                    let mut declarations = current.properties.clone();
                    if !change.apply(&mut declarations, &current.key().to_string())? {
                        return Ok((current, false));
                    }
                    exec(txn, cypher::set_rel_schema_properties(&id, &declarations)?).await?;
                    for stmt in
                        cypher::rewrite_rel_keys(&current.key(), &change.renamed, &change.removed)?
                    {
                        exec(txn, stmt).await?;
                    }
                    Ok((
                        RelationshipSchema {
                            properties: declarations,
                            ..current
                        },
                        true,
                    ))
                })
            })
            .await?)
    }

    // ── Object nodes ─────────────────────────────────────────────

    async fn insert_node(&self, node: &ObjectNode) -> Result<()> {
        let stmt = cypher::insert_node(node)?;
        let duplicate = StrataError::DuplicateNode {
            domain: node.domain.clone(),
            type_name: node.type_name.clone(),
            name: node.name.clone(),
        };
        let (domain, type_name) = (node.domain.clone(), node.type_name.clone());
        let values = node.properties.clone();
        self.run_write("insert_node", move |txn| {
            let (stmt, domain, type_name) = (stmt.clone(), domain.clone(), type_name.clone());
            let values = values.clone();
            txn_work(async move {
                let schema = lock_type_named(txn, &domain, &type_name)
                    .await?
                    .ok_or_else(|| StrataError::UnknownType(format!("{domain}.{type_name}")))?;
                conforms(&schema.properties, &values, &schema.qualified_name())?;
                match fetch_one(txn, stmt).await? {
                    Some(_) => Ok(()),
                    None => Err(StrataError::UnknownType(schema.qualified_name()).into()),
                }
            })
        })
        .await
        .map_err(|e| e.into_strata_or(|| duplicate))
    }

    async fn node_by_id(&self, id: &EntityId) -> Result<Option<ObjectNode>> {
        Ok(self.find_node(id).await?)
    }

    async fn nodes(
        &self,
        domain: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<ObjectNode>> {
        Ok(self.list_nodes(domain, type_name).await?)
    }

    async fn rename_node(&self, id: &EntityId, new_name: &str) -> Result<ObjectNode> {
        // Read first so a conflict can name the colliding identity.
        let current = self
            .find_node(id)
            .await?
            .ok_or_else(|| unknown_node(id))?;
        let duplicate = StrataError::DuplicateNode {
            domain: current.domain.clone(),
            type_name: current.type_name.clone(),
            name: new_name.to_string(),
        };
        let (id, new_name) = (id.clone(), new_name.to_string());
        self.run_write("rename_node", move |txn| {
            let (id, new_name) = (id.clone(), new_name.clone());
            txn_work(async move {
                let current = load_node(txn, &id).await?.ok_or_else(|| unknown_node(&id))?;
                if current.name == new_name {
                    return Ok(current);
                }
                exec(txn, cypher::set_node_name(&id, &new_name)).await?;
                Ok(ObjectNode {
                    name: new_name,
                    ..current
                })
            })
        })
        .await
        .map_err(|e| e.into_strata_or(|| duplicate))
    }

    async fn delete_node(&self, id: &EntityId) -> Result<ObjectNode> {
        let id = id.clone();
        Ok(self
            .run_write("delete_node", move |txn| {
                let id = id.clone();
                txn_work(async move {
                    let node = load_node(txn, &id).await?.ok_or_else(|| unknown_node(&id))?;
                    exec(txn, cypher::delete_node(&id)).await?;
                    Ok(node)
                })
            })
            .await?)
    }

    async fn update_node_labels(
        &self,
        id: &EntityId,
        add: &[String],
        remove: &[String],
    ) -> Result<ObjectNode> {
        let stmt = if add.is_empty() && remove.is_empty() {
            None
        } else {
            Some(cypher::update_node_labels(id, add, remove)?)
        };
        let id = id.clone();
        Ok(self
            .run_write("update_node_labels", move |txn| {
                let (id, stmt) = (id.clone(), stmt.clone());
                txn_work(async move {
                    load_node(txn, &id).await?.ok_or_else(|| unknown_node(&id))?;
                    if let Some(stmt) = stmt {
                        exec(txn, stmt).await?;
                    }
                    Ok(load_node(txn, &id).await?.ok_or_else(|| unknown_node(&id))?)
                })
            })
            .await?)
    }

    async fn update_node_properties(
        &self,
        id: &EntityId,
        set: &Properties,
        remove: &[String],
    ) -> Result<ObjectNode> {
        let stmt = if set.is_empty() && remove.is_empty() {
            None
        } else {
            Some(cypher::update_node_properties(id, set, remove)?)
        };
        let (id, set) = (id.clone(), set.clone());
        Ok(self
            .run_write("update_node_properties", move |txn| {
                let (id, stmt, set) = (id.clone(), stmt.clone(), set.clone());
                txn_work(async move {
                    let node = load_node(txn, &id).await?.ok_or_else(|| unknown_node(&id))?;
                    if !set.is_empty() {
                        let schema = lock_type_named(txn, &node.domain, &node.type_name)
                            .await?
                            .ok_or_else(|| {
                                StrataError::UnknownType(format!("{}.{}", node.domain, node.type_name))
                            })?;
                        conforms(&schema.properties, &set, &schema.qualified_name())?;
                    }
                    if let Some(stmt) = stmt {
                        exec(txn, stmt).await?;
                    }
                    Ok(load_node(txn, &id).await?.ok_or_else(|| unknown_node(&id))?)
                })
            })
            .await?)
    }

    // ── Object relationships ─────────────────────────────────────

    async fn insert_relationship(&self, rel: &ObjectRelationship) -> Result<()> {
        let stmt = cypher::insert_relationship(rel)?;
        let rel = rel.clone();
        Ok(self
            .run_write("insert_relationship", move |txn| {
                let (stmt, rel) = (stmt.clone(), rel.clone());
                txn_work(async move {
                    let from = load_node(txn, &rel.from)
                        .await?
                        .ok_or_else(|| unknown_node(&rel.from))?;
                    let to = load_node(txn, &rel.to)
                        .await?
                        .ok_or_else(|| unknown_node(&rel.to))?;
                    let key = RelSchemaKey {
                        name: rel.name.clone(),
                        domain: rel.domain.clone(),
                        from_type: from.type_name,
                        to_type: to.type_name,
                    };
                    let missing = || StrataError::UnknownRelationshipSchema(key.to_string());
                    let schema = lock_rel_schema(
                        txn,
                        cypher::lock_governing(&rel.name, &rel.domain, &rel.from, &rel.to),
                    )
                    .await?
                    .ok_or_else(missing)?;
                    conforms(&schema.properties, &rel.properties, &key.to_string())?;
                    match fetch_one(txn, stmt).await? {
                        Some(_) => Ok(()),
                        None => Err(missing().into()),
                    }
                })
            })
            .await?)
    }

    async fn relationship_by_id(&self, id: &EntityId) -> Result<Option<ObjectRelationship>> {
        Ok(self.find_relationship(id).await?)
    }

    async fn relationships(&self, node: Option<&EntityId>) -> Result<Vec<ObjectRelationship>> {
        Ok(self.list_relationships(node).await?)
    }

    async fn rename_relationship(
        &self,
        id: &EntityId,
        new_name: &str,
    ) -> Result<ObjectRelationship> {
        let (id, new_name) = (id.clone(), new_name.to_string());
        Ok(self
            .run_write("rename_relationship", move |txn| {
                let (id, new_name) = (id.clone(), new_name.clone());
                txn_work(async move {
                    let current = load_relationship(txn, &id)
                        .await?
                        .ok_or_else(|| unknown_relationship(&id))?;
                    if current.name == new_name {
                        return Ok(current);
                    }
                    exec(txn, cypher::retype_relationship(&id, &new_name)?).await?;
                    Ok(ObjectRelationship {
                        name: new_name,
                        ..current
                    })
                })
            })
            .await?)
    }

    async fn delete_relationship(&self, id: &EntityId) -> Result<ObjectRelationship> {
        let id = id.clone();
        Ok(self
            .run_write("delete_relationship", move |txn| {
                let id = id.clone();
                txn_work(async move {
                    let rel = load_relationship(txn, &id)
                        .await?
                        .ok_or_else(|| unknown_relationship(&id))?;
                    exec(txn, cypher::delete_relationship(&id)).await?;
                    Ok(rel)
                })
            })
            .await?)
    }

    async fn update_relationship_properties(
        &self,
        id: &EntityId,
        set: &Properties,
        remove: &[String],
    ) -> Result<ObjectRelationship> {
        let stmt = if set.is_empty() && remove.is_empty() {
            None
        } else {
            Some(cypher::update_relationship_properties(id, set, remove)?)
        };
        let (id, set) = (id.clone(), set.clone());
        Ok(self
            .run_write("update_relationship_properties", move |txn| {
                let (id, stmt, set) = (id.clone(), stmt.clone(), set.clone());
                txn_work(async move {
                    load_relationship(txn, &id)
                        .await?
                        .ok_or_else(|| unknown_relationship(&id))?;
                    if !set.is_empty() {
                        let schema = lock_rel_schema(txn, cypher::lock_schema_of(&id))
                            .await?
                            .ok_or_else(|| StrataError::UnknownRelationshipSchema(id.to_string()))?;
                        conforms(&schema.properties, &set, &schema.key().to_string())?;
                    }
                    if let Some(stmt) = stmt {
                        exec(txn, stmt).await?;
                    }
                    Ok(load_relationship(txn, &id)
                        .await?
                        .ok_or_else(|| unknown_relationship(&id))?)
                })
            })
            .await?)
    }
}
