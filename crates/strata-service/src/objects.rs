//! Object nodes and object relationships.

use strata_core::naming::{normalize_name, normalize_node_name};
use strata_core::{
    ChangeKind, EntityId, NewObjectNode, NewObjectRelationship, ObjectNode, ObjectRelationship,
    RawProperties, RelSchemaKey, RelationshipSchema, Result, StrataError,
};

use crate::context::RequestContext;
use crate::registry::SchemaRegistry;
use crate::validate;
use crate::Shared;

/// Sole writer of object entities. Every write is checked against the
/// schema graph first.
#[derive(Clone)]
pub struct ObjectGraph {
    shared: Shared,
    schema: SchemaRegistry,
}

impl ObjectGraph {
    pub(crate) fn new(shared: Shared, schema: SchemaRegistry) -> Self {
        Self { shared, schema }
    }

    // ── Nodes ────────────────────────────────────────────────────

    pub async fn create_object_node(
        &self,
        ctx: &RequestContext,
        request: &NewObjectNode,
    ) -> Result<ObjectNode> {
        let node = ctx
            .run("create_object_node", async {
                let domain = normalize_name(&request.domain)?;
                let type_name = normalize_name(&request.type_name)?;
                let name = normalize_node_name(&request.name)?;
                let extra = validate::labels(&request.labels)?;

                let schema = self.schema.type_named(&domain, &type_name).await?;
                let properties =
                    validate::properties(&schema.properties, &request.properties, &schema.qualified_name())?;

                let node = ObjectNode::new(domain, type_name, name, extra, properties);
                let labels: Vec<String> = node.labels.iter().cloned().collect();
                self.schema
                    .ensure_node_keys(&node.domain, &node.type_name, &labels)
                    .await?;
                self.shared.store.insert_node(&node).await?;
                Ok(node)
            })
            .await?;

        self.shared.publish(&node, ChangeKind::Created);
        tracing::info!(
            id = %node.id,
            domain = %node.domain,
            type_name = %node.type_name,
            name = %node.name,
            "Object node created"
        );
        Ok(node)
    }

    pub async fn rename_object_node(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        new_name: &str,
    ) -> Result<ObjectNode> {
        let node = ctx
            .run("rename_object_node", async {
                let new_name = normalize_node_name(new_name)?;
                self.shared.store.rename_node(id, &new_name).await
            })
            .await?;

        self.shared.publish(&node, ChangeKind::Updated);
        tracing::info!(id = %node.id, name = %node.name, "Object node renamed");
        Ok(node)
    }

    /// Deletes the node together with every relationship touching it.
    pub async fn delete_object_node(&self, ctx: &RequestContext, id: &EntityId) -> Result<ObjectNode> {
        let node = ctx
            .run("delete_object_node", self.shared.store.delete_node(id))
            .await?;

        self.shared.publish(&node, ChangeKind::Deleted);
        tracing::info!(id = %node.id, name = %node.name, "Object node deleted");
        Ok(node)
    }

    /// Adds labels; ones already present collapse and an all-duplicate
    /// request changes nothing.
    pub async fn add_labels(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        labels: &[String],
    ) -> Result<ObjectNode> {
        let (node, changed) = ctx
            .run("add_labels", async {
                let requested = validate::labels(labels)?;
                let current = self.node_record(id).await?;
                let added: Vec<String> = requested
                    .into_iter()
                    .filter(|l| !current.labels.contains(l))
                    .collect();
                if added.is_empty() {
                    return Ok((current, false));
                }
                self.schema
                    .ensure_node_keys(&current.domain, &current.type_name, &added)
                    .await?;
                let node = self
                    .shared
                    .store
                    .update_node_labels(id, &added, &[])
                    .await?;
                Ok((node, true))
            })
            .await?;

        if changed {
            self.shared.publish(&node, ChangeKind::Updated);
            tracing::info!(id = %node.id, labels = ?node.labels, "Labels added");
        }
        Ok(node)
    }

    /// Removes labels. The type label and the domain umbrella stay put.
    pub async fn remove_labels(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        labels: &[String],
    ) -> Result<ObjectNode> {
        let (node, changed) = ctx
            .run("remove_labels", async {
                let requested = validate::labels(labels)?;
                let current = self.node_record(id).await?;
                if let Some(structural) = requested.iter().find(|l| current.is_structural_label(l)) {
                    return Err(StrataError::ReservedLabel(structural.clone()));
                }
                let removed: Vec<String> = requested
                    .into_iter()
                    .filter(|l| current.labels.contains(l))
                    .collect();
                if removed.is_empty() {
                    return Ok((current, false));
                }
                let node = self
                    .shared
                    .store
                    .update_node_labels(id, &[], &removed)
                    .await?;
                Ok((node, true))
            })
            .await?;

        if changed {
            self.shared.publish(&node, ChangeKind::Updated);
            tracing::info!(id = %node.id, labels = ?node.labels, "Labels removed");
        }
        Ok(node)
    }

    /// Upserts properties, each checked against the node's type.
    pub async fn set_properties(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        properties: &RawProperties,
    ) -> Result<ObjectNode> {
        let node = ctx
            .run("set_node_properties", async {
                let current = self.node_record(id).await?;
                let schema = self
                    .schema
                    .type_named(&current.domain, &current.type_name)
                    .await?;
                let typed =
                    validate::properties(&schema.properties, properties, &schema.qualified_name())?;
                self.shared
                    .store
                    .update_node_properties(id, &typed, &[])
                    .await
            })
            .await?;

        self.shared.publish(&node, ChangeKind::Updated);
        tracing::info!(id = %node.id, "Object node properties set");
        Ok(node)
    }

    pub async fn remove_properties(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        keys: &[String],
    ) -> Result<ObjectNode> {
        let node = ctx
            .run("remove_node_properties", async {
                let keys = validate::property_keys(keys)?;
                self.shared
                    .store
                    .update_node_properties(id, &Default::default(), &keys)
                    .await
            })
            .await?;

        self.shared.publish(&node, ChangeKind::Updated);
        tracing::info!(id = %node.id, "Object node properties removed");
        Ok(node)
    }

    pub async fn get_object_node(&self, ctx: &RequestContext, id: &EntityId) -> Result<ObjectNode> {
        ctx.run("get_object_node", self.node_record(id)).await
    }

    /// Ordered by `(domain, type, name)`, then id.
    pub async fn list_object_nodes(
        &self,
        ctx: &RequestContext,
        domain: Option<&str>,
        type_name: Option<&str>,
    ) -> Result<Vec<ObjectNode>> {
        ctx.run("list_object_nodes", async {
            let domain = domain.map(normalize_name).transpose()?;
            let type_name = type_name.map(normalize_name).transpose()?;
            self.shared
                .store
                .nodes(domain.as_deref(), type_name.as_deref())
                .await
        })
        .await
    }

    // ── Relationships ────────────────────────────────────────────

    pub async fn create_object_relationship(
        &self,
        ctx: &RequestContext,
        request: &NewObjectRelationship,
    ) -> Result<ObjectRelationship> {
        let rel = ctx
            .run("create_object_relationship", async {
                let name = normalize_name(&request.name)?;
                let schema = self
                    .governing_schema(&name, &request.from, &request.to)
                    .await?;
                let properties = validate::properties(
                    &schema.properties,
                    &request.properties,
                    &schema.key().to_string(),
                )?;
                let rel = ObjectRelationship::new(
                    name,
                    schema.domain,
                    request.from.clone(),
                    request.to.clone(),
                    properties,
                );
                self.shared.store.insert_relationship(&rel).await?;
                Ok(rel)
            })
            .await?;

        self.shared.publish(&rel, ChangeKind::Created);
        tracing::info!(
            id = %rel.id,
            name = %rel.name,
            from = %rel.from,
            to = %rel.to,
            "Object relationship created"
        );
        Ok(rel)
    }

    /// Re-types the relationship; a schema for the new name must exist
    /// between the current endpoint types. Id and properties are kept.
    pub async fn rename_object_relationship(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        new_name: &str,
    ) -> Result<ObjectRelationship> {
        let rel = ctx
            .run("rename_object_relationship", async {
                let new_name = normalize_name(new_name)?;
                let current = self.relationship_record(id).await?;
                let schema = self
                    .governing_schema(&new_name, &current.from, &current.to)
                    .await?;
                if let Some(key) = current.properties.keys().find(|k| !schema.properties.contains_key(*k)) {
                    return Err(StrataError::property(
                        key,
                        format!("not declared on {}", schema.key()),
                    ));
                }
                self.shared
                    .store
                    .rename_relationship(id, &new_name)
                    .await
            })
            .await?;

        self.shared.publish(&rel, ChangeKind::Updated);
        tracing::info!(id = %rel.id, name = %rel.name, "Object relationship renamed");
        Ok(rel)
    }

    pub async fn delete_object_relationship(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
    ) -> Result<ObjectRelationship> {
        let rel = ctx
            .run(
                "delete_object_relationship",
                self.shared.store.delete_relationship(id),
            )
            .await?;

        self.shared.publish(&rel, ChangeKind::Deleted);
        tracing::info!(id = %rel.id, name = %rel.name, "Object relationship deleted");
        Ok(rel)
    }

    pub async fn set_relationship_properties(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        properties: &RawProperties,
    ) -> Result<ObjectRelationship> {
        let rel = ctx
            .run("set_relationship_properties", async {
                let current = self.relationship_record(id).await?;
                let schema = self
                    .governing_schema(&current.name, &current.from, &current.to)
                    .await?;
                let typed = validate::properties(
                    &schema.properties,
                    properties,
                    &schema.key().to_string(),
                )?;
                self.shared
                    .store
                    .update_relationship_properties(id, &typed, &[])
                    .await
            })
            .await?;

        self.shared.publish(&rel, ChangeKind::Updated);
        tracing::info!(id = %rel.id, "Object relationship properties set");
        Ok(rel)
    }

    pub async fn remove_relationship_properties(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        keys: &[String],
    ) -> Result<ObjectRelationship> {
        let rel = ctx
            .run("remove_relationship_properties", async {
                let keys = validate::property_keys(keys)?;
                self.shared
                    .store
                    .update_relationship_properties(id, &Default::default(), &keys)
                    .await
            })
            .await?;

        self.shared.publish(&rel, ChangeKind::Updated);
        tracing::info!(id = %rel.id, "Object relationship properties removed");
        Ok(rel)
    }

    pub async fn get_object_relationship(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
    ) -> Result<ObjectRelationship> {
        ctx.run("get_object_relationship", self.relationship_record(id))
            .await
    }

    /// All relationships, or only those with `node` as an endpoint.
    pub async fn list_object_relationships(
        &self,
        ctx: &RequestContext,
        node: Option<&EntityId>,
    ) -> Result<Vec<ObjectRelationship>> {
        ctx.run(
            "list_object_relationships",
            self.shared.store.relationships(node),
        )
        .await
    }

    // ── Helpers ──────────────────────────────────────────────────

    async fn node_record(&self, id: &EntityId) -> Result<ObjectNode> {
        self.shared
            .store
            .node_by_id(id)
            .await?
            .ok_or_else(|| StrataError::UnknownNode(id.to_string()))
    }

    async fn relationship_record(&self, id: &EntityId) -> Result<ObjectRelationship> {
        self.shared
            .store
            .relationship_by_id(id)
            .await?
            .ok_or_else(|| StrataError::UnknownRelationship(id.to_string()))
    }

    /// The schema an edge `name` from `from` to `to` must satisfy, keyed by
    /// the endpoints' current types.
    async fn governing_schema(
        &self,
        name: &str,
        from: &EntityId,
        to: &EntityId,
    ) -> Result<RelationshipSchema> {
        let from = self.node_record(from).await?;
        let to = self.node_record(to).await?;
        if from.domain != to.domain {
            return Err(StrataError::UnknownRelationshipSchema(format!(
                "{name} cannot join {}.{} to {}.{}: endpoints are in different domains",
                from.domain, from.type_name, to.domain, to.type_name
            )));
        }
        let key = RelSchemaKey {
            name: name.to_string(),
            domain: from.domain,
            from_type: from.type_name,
            to_type: to.type_name,
        };
        self.schema.rel_schema_keyed(&key).await
    }
}
