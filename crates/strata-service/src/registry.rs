//! Domains, types and relationship schemas.

use strata_core::naming::{domain_label, normalize_name, normalize_property_key};
use strata_core::{
    ChangeKind, DomainSchema, EntityId, PropertyDecl, PropertyDecls, PropertyKind, RelSchemaKey,
    RelationshipSchema, Result, StrataError, TypeSchema,
};
use strata_graph::PropertyChange;

use crate::context::RequestContext;
use crate::validate::{self, PropertyInputs};
use crate::Shared;

/// Sole writer of schema entities.
#[derive(Clone)]
pub struct SchemaRegistry {
    shared: Shared,
}

impl SchemaRegistry {
    pub(crate) fn new(shared: Shared) -> Self {
        Self { shared }
    }

    // ── Domains ──────────────────────────────────────────────────

    pub async fn create_domain(&self, ctx: &RequestContext, name: &str) -> Result<DomainSchema> {
        let domain = ctx
            .run("create_domain", async {
                let domain = DomainSchema::new(normalize_name(name)?);
                self.shared.store.insert_domain(&domain).await?;
                Ok(domain)
            })
            .await?;

        self.shared.publish(&domain, ChangeKind::Created);
        tracing::info!(id = %domain.id, name = %domain.name, "Domain created");
        Ok(domain)
    }

    /// Renames the domain; types, relationship schemas and object nodes follow.
    pub async fn rename_domain(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        new_name: &str,
    ) -> Result<DomainSchema> {
        let (old, domain) = ctx
            .run("rename_domain", async {
                let new_name = normalize_name(new_name)?;
                let current = self.domain_record(id).await?;
                if current.name == new_name {
                    return Ok((current.name.clone(), current));
                }
                // Keys for the new umbrella label go in before any node carries it.
                for t in self.shared.store.types(Some(&current.name)).await? {
                    self.shared
                        .constraints
                        .ensure(
                            self.shared.store.as_ref(),
                            &new_name,
                            &t.name,
                            &[domain_label(&new_name), t.name.clone()],
                        )
                        .await?;
                }
                let renamed = self.shared.store.rename_domain(id, &new_name).await?;
                Ok((current.name, renamed))
            })
            .await?;

        if old != domain.name {
            self.shared.constraints.invalidate_domain(&old);
        }
        self.shared.publish(&domain, ChangeKind::Updated);
        tracing::info!(id = %domain.id, from = %old, to = %domain.name, "Domain renamed");
        Ok(domain)
    }

    /// Refused while object nodes remain; otherwise takes its types and
    /// relationship schemas with it.
    pub async fn delete_domain(&self, ctx: &RequestContext, id: &EntityId) -> Result<DomainSchema> {
        let domain = ctx
            .run("delete_domain", self.shared.store.delete_domain(id))
            .await?;

        self.shared.constraints.invalidate_domain(&domain.name);
        self.shared.publish(&domain, ChangeKind::Deleted);
        tracing::info!(id = %domain.id, name = %domain.name, "Domain deleted");
        Ok(domain)
    }

    pub async fn list_domains(&self, ctx: &RequestContext) -> Result<Vec<DomainSchema>> {
        ctx.run("list_domains", self.shared.store.domains()).await
    }

    pub async fn get_domain(&self, ctx: &RequestContext, id: &EntityId) -> Result<DomainSchema> {
        ctx.run("get_domain", self.domain_record(id)).await
    }

    // ── Types ────────────────────────────────────────────────────

    /// Creates `domain.name` and installs its node keys.
    pub async fn create_type(
        &self,
        ctx: &RequestContext,
        domain: &str,
        name: &str,
        properties: &PropertyInputs,
    ) -> Result<TypeSchema> {
        let schema = ctx
            .run("create_type", async {
                let domain = normalize_name(domain)?;
                let name = normalize_name(name)?;
                let declarations = validate::declarations(properties)?;
                if self.shared.store.domain_by_name(&domain).await?.is_none() {
                    return Err(StrataError::UnknownDomain(domain));
                }

                let mut schema = TypeSchema::new(domain, name);
                schema.properties = declarations;
                self.shared
                    .constraints
                    .ensure(
                        self.shared.store.as_ref(),
                        &schema.domain,
                        &schema.name,
                        &[domain_label(&schema.domain), schema.name.clone()],
                    )
                    .await?;
                self.shared.store.insert_type(&schema).await?;
                Ok(schema)
            })
            .await?;

        self.shared.publish(&schema, ChangeKind::Created);
        tracing::info!(id = %schema.id, type_name = %schema.qualified_name(), "Type created");
        Ok(schema)
    }

    /// Renames the type, relabelling its nodes and re-pointing relationship
    /// schemas that reference it.
    pub async fn rename_type(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        new_name: &str,
    ) -> Result<TypeSchema> {
        let (old, schema) = ctx
            .run("rename_type", async {
                let new_name = normalize_name(new_name)?;
                let current = self.type_record(id).await?;
                if current.name == new_name {
                    return Ok((current.name.clone(), current));
                }
                self.shared
                    .constraints
                    .ensure(
                        self.shared.store.as_ref(),
                        &current.domain,
                        &new_name,
                        &[domain_label(&current.domain), new_name.clone()],
                    )
                    .await?;
                let renamed = self.shared.store.rename_type(id, &new_name).await?;
                Ok((current.name, renamed))
            })
            .await?;

        if old != schema.name {
            self.shared.constraints.invalidate_type(&schema.domain, &old);
        }
        self.shared.publish(&schema, ChangeKind::Updated);
        tracing::info!(id = %schema.id, from = %old, to = %schema.name, "Type renamed");
        Ok(schema)
    }

    /// Refused while object nodes or relationship schemas depend on the type.
    pub async fn delete_type(&self, ctx: &RequestContext, id: &EntityId) -> Result<TypeSchema> {
        let schema = ctx
            .run("delete_type", self.shared.store.delete_type(id))
            .await?;

        self.shared
            .constraints
            .invalidate_type(&schema.domain, &schema.name);
        self.shared.publish(&schema, ChangeKind::Deleted);
        tracing::info!(id = %schema.id, type_name = %schema.qualified_name(), "Type deleted");
        Ok(schema)
    }

    pub async fn list_types(
        &self,
        ctx: &RequestContext,
        domain: Option<&str>,
    ) -> Result<Vec<TypeSchema>> {
        ctx.run("list_types", async {
            let domain = domain.map(normalize_name).transpose()?;
            self.shared.store.types(domain.as_deref()).await
        })
        .await
    }

    pub async fn get_type(&self, ctx: &RequestContext, id: &EntityId) -> Result<TypeSchema> {
        ctx.run("get_type", self.type_record(id)).await
    }

    /// Declares `key` on the type. Existing nodes are not back-filled.
    ///
    /// Re-declaring a key with the same kind changes nothing and publishes
    /// nothing; a different kind is a violation.
    pub async fn add_property(
        &self,
        ctx: &RequestContext,
        type_id: &EntityId,
        key: &str,
        kind: PropertyKind,
    ) -> Result<TypeSchema> {
        let (schema, changed) = ctx
            .run("add_property", async {
                let key = normalize_property_key(key)?;
                let change =
                    PropertyChange::add(PropertyDecls::from([(key, PropertyDecl::new(kind))]));
                self.shared
                    .store
                    .update_type_properties(type_id, &change)
                    .await
            })
            .await?;

        if changed {
            self.shared.publish(&schema, ChangeKind::Updated);
            tracing::info!(id = %schema.id, type_name = %schema.qualified_name(), "Property added");
        }
        Ok(schema)
    }

    /// Renames a declared key on the type and on every node of the type.
    pub async fn rename_property(
        &self,
        ctx: &RequestContext,
        type_id: &EntityId,
        old: &str,
        new: &str,
    ) -> Result<TypeSchema> {
        let (schema, _) = ctx
            .run("rename_property", async {
                let old = normalize_property_key(old)?;
                let new = normalize_property_key(new)?;
                self.shared
                    .store
                    .update_type_properties(type_id, &PropertyChange::rename(&old, &new))
                    .await
            })
            .await?;

        self.shared.publish(&schema, ChangeKind::Updated);
        tracing::info!(id = %schema.id, from = old, to = new, "Property renamed");
        Ok(schema)
    }

    /// Drops declarations and strips the values from every node of the type.
    pub async fn remove_properties(
        &self,
        ctx: &RequestContext,
        type_id: &EntityId,
        keys: &[String],
    ) -> Result<TypeSchema> {
        let (schema, _) = ctx
            .run("remove_type_properties", async {
                let keys = validate::property_keys(keys)?;
                self.shared
                    .store
                    .update_type_properties(type_id, &PropertyChange::remove(keys))
                    .await
            })
            .await?;

        self.shared.publish(&schema, ChangeKind::Updated);
        tracing::info!(id = %schema.id, type_name = %schema.qualified_name(), "Properties removed");
        Ok(schema)
    }

    // ── Relationship schemas ─────────────────────────────────────

    pub async fn create_relationship_schema(
        &self,
        ctx: &RequestContext,
        name: &str,
        domain: &str,
        from_type: &str,
        to_type: &str,
        properties: &PropertyInputs,
    ) -> Result<RelationshipSchema> {
        let schema = ctx
            .run("create_relationship_schema", async {
                let key = RelSchemaKey {
                    name: normalize_name(name)?,
                    domain: normalize_name(domain)?,
                    from_type: normalize_name(from_type)?,
                    to_type: normalize_name(to_type)?,
                };
                let declarations = validate::declarations(properties)?;
                if self.shared.store.domain_by_name(&key.domain).await?.is_none() {
                    return Err(StrataError::UnknownDomain(key.domain));
                }
                for endpoint in [&key.from_type, &key.to_type] {
                    if self
                        .shared
                        .store
                        .type_by_name(&key.domain, endpoint)
                        .await?
                        .is_none()
                    {
                        return Err(StrataError::UnknownType(format!(
                            "{}.{endpoint}",
                            key.domain
                        )));
                    }
                }
                let schema = RelationshipSchema::new(key, declarations);
                self.shared.store.insert_rel_schema(&schema).await?;
                Ok(schema)
            })
            .await?;

        self.shared.publish(&schema, ChangeKind::Created);
        tracing::info!(id = %schema.id, key = %schema.key(), "Relationship schema created");
        Ok(schema)
    }

    pub async fn get_relationship_schema(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
    ) -> Result<RelationshipSchema> {
        ctx.run("get_relationship_schema", self.rel_schema_record(id))
            .await
    }

    pub async fn list_relationship_schemas(
        &self,
        ctx: &RequestContext,
        domain: Option<&str>,
    ) -> Result<Vec<RelationshipSchema>> {
        ctx.run("list_relationship_schemas", async {
            let domain = domain.map(normalize_name).transpose()?;
            self.shared.store.rel_schemas(domain.as_deref()).await
        })
        .await
    }

    /// Renames the schema together with every relationship it governs.
    pub async fn rename_relationship_schema(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        new_name: &str,
    ) -> Result<RelationshipSchema> {
        let schema = ctx
            .run("rename_relationship_schema", async {
                let new_name = normalize_name(new_name)?;
                self.shared.store.rename_rel_schema(id, &new_name).await
            })
            .await?;

        self.shared.publish(&schema, ChangeKind::Updated);
        tracing::info!(id = %schema.id, key = %schema.key(), "Relationship schema renamed");
        Ok(schema)
    }

    /// Refused while relationships of this schema exist.
    pub async fn delete_relationship_schema(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
    ) -> Result<RelationshipSchema> {
        let schema = ctx
            .run(
                "delete_relationship_schema",
                self.shared.store.delete_rel_schema(id),
            )
            .await?;

        self.shared.publish(&schema, ChangeKind::Deleted);
        tracing::info!(id = %schema.id, key = %schema.key(), "Relationship schema deleted");
        Ok(schema)
    }

    /// Adds and removes declarations in one step. Removed keys are stripped
    /// from every governed relationship. A request that changes nothing
    /// publishes nothing.
    pub async fn mutate_rel_schema_properties(
        &self,
        ctx: &RequestContext,
        id: &EntityId,
        add: &PropertyInputs,
        remove: &[String],
    ) -> Result<RelationshipSchema> {
        let (schema, changed) = ctx
            .run("mutate_rel_schema_properties", async {
                let change = PropertyChange {
                    added: validate::declarations(add)?,
                    renamed: Vec::new(),
                    removed: validate::property_keys(remove)?,
                };
                self.shared
                    .store
                    .update_rel_schema_properties(id, &change)
                    .await
            })
            .await?;

        if changed {
            self.shared.publish(&schema, ChangeKind::Updated);
            tracing::info!(id = %schema.id, key = %schema.key(), "Relationship schema properties changed");
        }
        Ok(schema)
    }

    // ── Lookups shared with the object graph ─────────────────────

    async fn domain_record(&self, id: &EntityId) -> Result<DomainSchema> {
        self.shared
            .store
            .domain_by_id(id)
            .await?
            .ok_or_else(|| StrataError::UnknownDomain(id.to_string()))
    }

    async fn type_record(&self, id: &EntityId) -> Result<TypeSchema> {
        self.shared
            .store
            .type_by_id(id)
            .await?
            .ok_or_else(|| StrataError::UnknownType(id.to_string()))
    }

    async fn rel_schema_record(&self, id: &EntityId) -> Result<RelationshipSchema> {
        self.shared
            .store
            .rel_schema_by_id(id)
            .await?
            .ok_or_else(|| StrataError::UnknownRelationshipSchema(id.to_string()))
    }

    pub(crate) async fn type_named(&self, domain: &str, name: &str) -> Result<TypeSchema> {
        self.shared
            .store
            .type_by_name(domain, name)
            .await?
            .ok_or_else(|| StrataError::UnknownType(format!("{domain}.{name}")))
    }

    pub(crate) async fn rel_schema_keyed(&self, key: &RelSchemaKey) -> Result<RelationshipSchema> {
        self.shared
            .store
            .rel_schema_by_key(key)
            .await?
            .ok_or_else(|| StrataError::UnknownRelationshipSchema(key.to_string()))
    }

    /// Install node keys for `labels` on behalf of the object graph.
    pub(crate) async fn ensure_node_keys(
        &self,
        domain: &str,
        type_name: &str,
        labels: &[String],
    ) -> Result<()> {
        self.shared
            .constraints
            .ensure(self.shared.store.as_ref(), domain, type_name, labels)
            .await
    }
}
