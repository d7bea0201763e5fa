use async_graphql::{Context, Object, Result, ID};

use strata_core::EntityId;
use strata_service::GraphService;

use super::gql_error;
use super::types::Entity;

pub struct QueryRoot;

fn entity_id(id: &ID) -> EntityId {
    EntityId::from(id.as_str())
}

fn all<S: strata_core::Subject>(items: Vec<S>) -> Vec<Entity> {
    items.iter().map(Entity::of).collect()
}

#[Object]
impl QueryRoot {
    async fn domains(&self, ctx: &Context<'_>) -> Result<Vec<Entity>> {
        let service = ctx.data::<GraphService>()?;
        let domains = service
            .schema()
            .list_domains(&service.context())
            .await
            .map_err(gql_error)?;
        Ok(all(domains))
    }

    async fn domain(&self, ctx: &Context<'_>, id: ID) -> Result<Entity> {
        let service = ctx.data::<GraphService>()?;
        let domain = service
            .schema()
            .get_domain(&service.context(), &entity_id(&id))
            .await
            .map_err(gql_error)?;
        Ok(Entity::of(&domain))
    }

    async fn type_schemas(&self, ctx: &Context<'_>, domain: Option<String>) -> Result<Vec<Entity>> {
        let service = ctx.data::<GraphService>()?;
        let types = service
            .schema()
            .list_types(&service.context(), domain.as_deref())
            .await
            .map_err(gql_error)?;
        Ok(all(types))
    }

    async fn type_schema(&self, ctx: &Context<'_>, id: ID) -> Result<Entity> {
        let service = ctx.data::<GraphService>()?;
        let schema = service
            .schema()
            .get_type(&service.context(), &entity_id(&id))
            .await
            .map_err(gql_error)?;
        Ok(Entity::of(&schema))
    }

    async fn relationship_schemas(
        &self,
        ctx: &Context<'_>,
        domain: Option<String>,
    ) -> Result<Vec<Entity>> {
        let service = ctx.data::<GraphService>()?;
        let schemas = service
            .schema()
            .list_relationship_schemas(&service.context(), domain.as_deref())
            .await
            .map_err(gql_error)?;
        Ok(all(schemas))
    }

    async fn relationship_schema(&self, ctx: &Context<'_>, id: ID) -> Result<Entity> {
        let service = ctx.data::<GraphService>()?;
        let schema = service
            .schema()
            .get_relationship_schema(&service.context(), &entity_id(&id))
            .await
            .map_err(gql_error)?;
        Ok(Entity::of(&schema))
    }

    /// Ordered by domain, type and name, then id.
    async fn object_nodes(
        &self,
        ctx: &Context<'_>,
        domain: Option<String>,
        #[graphql(name = "type")] type_name: Option<String>,
    ) -> Result<Vec<Entity>> {
        let service = ctx.data::<GraphService>()?;
        let nodes = service
            .objects()
            .list_object_nodes(&service.context(), domain.as_deref(), type_name.as_deref())
            .await
            .map_err(gql_error)?;
        Ok(all(nodes))
    }

    async fn object_node(&self, ctx: &Context<'_>, id: ID) -> Result<Entity> {
        let service = ctx.data::<GraphService>()?;
        let node = service
            .objects()
            .get_object_node(&service.context(), &entity_id(&id))
            .await
            .map_err(gql_error)?;
        Ok(Entity::of(&node))
    }

    /// All relationships, or those touching `nodeId`.
    async fn object_relationships(
        &self,
        ctx: &Context<'_>,
        node_id: Option<ID>,
    ) -> Result<Vec<Entity>> {
        let service = ctx.data::<GraphService>()?;
        let node = node_id.as_ref().map(entity_id);
        let rels = service
            .objects()
            .list_object_relationships(&service.context(), node.as_ref())
            .await
            .map_err(gql_error)?;
        Ok(all(rels))
    }

    async fn object_relationship(&self, ctx: &Context<'_>, id: ID) -> Result<Entity> {
        let service = ctx.data::<GraphService>()?;
        let rel = service
            .objects()
            .get_object_relationship(&service.context(), &entity_id(&id))
            .await
            .map_err(gql_error)?;
        Ok(Entity::of(&rel))
    }
}
