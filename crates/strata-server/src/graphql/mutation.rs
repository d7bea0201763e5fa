use async_graphql::{Context, Json, Object, Result, ID};

use strata_core::{EntityId, NewObjectNode, NewObjectRelationship, RawProperties};
use strata_service::GraphService;

use super::types::{
    declarations, MutationResponse, ObjectNodeInput, ObjectRelationshipInput, PropertyDeclInput,
    PropertyType,
};

pub struct MutationRoot;

fn entity_id(id: &ID) -> EntityId {
    EntityId::from(id.as_str())
}

fn raw(properties: Option<Json<RawProperties>>) -> RawProperties {
    properties.map(|p| p.0).unwrap_or_default()
}

#[Object]
impl MutationRoot {
    // ── Domains ──────────────────────────────────────────────────

    async fn create_domain(&self, ctx: &Context<'_>, name: String) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .create_domain(&service.context(), &name)
            .await;
        Ok(MutationResponse::from_result(result, "Domain created"))
    }

    async fn rename_domain(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .rename_domain(&service.context(), &entity_id(&id), &name)
            .await;
        Ok(MutationResponse::from_result(result, "Domain renamed"))
    }

    async fn delete_domain(&self, ctx: &Context<'_>, id: ID) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .delete_domain(&service.context(), &entity_id(&id))
            .await;
        Ok(MutationResponse::from_result(result, "Domain deleted"))
    }

    // ── Types ────────────────────────────────────────────────────

    async fn create_type_schema(
        &self,
        ctx: &Context<'_>,
        domain: String,
        name: String,
        properties: Option<Vec<PropertyDeclInput>>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .create_type(&service.context(), &domain, &name, &declarations(properties))
            .await;
        Ok(MutationResponse::from_result(result, "Type schema created"))
    }

    async fn rename_type_schema(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .rename_type(&service.context(), &entity_id(&id), &name)
            .await;
        Ok(MutationResponse::from_result(result, "Type schema renamed"))
    }

    async fn delete_type_schema(&self, ctx: &Context<'_>, id: ID) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .delete_type(&service.context(), &entity_id(&id))
            .await;
        Ok(MutationResponse::from_result(result, "Type schema deleted"))
    }

    async fn add_property(
        &self,
        ctx: &Context<'_>,
        type_id: ID,
        key: String,
        #[graphql(name = "type")] kind: PropertyType,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .add_property(&service.context(), &entity_id(&type_id), &key, kind.into())
            .await;
        Ok(MutationResponse::from_result(result, "Property declared"))
    }

    async fn rename_property(
        &self,
        ctx: &Context<'_>,
        type_id: ID,
        from: String,
        to: String,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .rename_property(&service.context(), &entity_id(&type_id), &from, &to)
            .await;
        Ok(MutationResponse::from_result(result, "Property renamed"))
    }

    async fn remove_type_properties(
        &self,
        ctx: &Context<'_>,
        type_id: ID,
        keys: Vec<String>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .remove_properties(&service.context(), &entity_id(&type_id), &keys)
            .await;
        Ok(MutationResponse::from_result(result, "Properties removed"))
    }

    // ── Relationship schemas ─────────────────────────────────────

    async fn create_relationship_schema(
        &self,
        ctx: &Context<'_>,
        name: String,
        domain: String,
        from_type: String,
        to_type: String,
        properties: Option<Vec<PropertyDeclInput>>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .create_relationship_schema(
                &service.context(),
                &name,
                &domain,
                &from_type,
                &to_type,
                &declarations(properties),
            )
            .await;
        Ok(MutationResponse::from_result(result, "Relationship schema created"))
    }

    async fn rename_relationship_schema(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .rename_relationship_schema(&service.context(), &entity_id(&id), &name)
            .await;
        Ok(MutationResponse::from_result(result, "Relationship schema renamed"))
    }

    async fn delete_relationship_schema(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .delete_relationship_schema(&service.context(), &entity_id(&id))
            .await;
        Ok(MutationResponse::from_result(result, "Relationship schema deleted"))
    }

    async fn mutate_relationship_schema_properties(
        &self,
        ctx: &Context<'_>,
        id: ID,
        add: Option<Vec<PropertyDeclInput>>,
        remove: Option<Vec<String>>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .schema()
            .mutate_rel_schema_properties(
                &service.context(),
                &entity_id(&id),
                &declarations(add),
                &remove.unwrap_or_default(),
            )
            .await;
        Ok(MutationResponse::from_result(result, "Relationship schema properties changed"))
    }

    // ── Object nodes ─────────────────────────────────────────────

    async fn create_object_node(
        &self,
        ctx: &Context<'_>,
        input: ObjectNodeInput,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let request = NewObjectNode {
            domain: input.domain,
            name: input.name,
            type_name: input.type_name,
            labels: input.labels.unwrap_or_default(),
            properties: raw(input.properties),
        };
        let result = service
            .objects()
            .create_object_node(&service.context(), &request)
            .await;
        Ok(MutationResponse::from_result(result, "Object node created"))
    }

    async fn rename_object_node(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .rename_object_node(&service.context(), &entity_id(&id), &name)
            .await;
        Ok(MutationResponse::from_result(result, "Object node renamed"))
    }

    async fn delete_object_node(&self, ctx: &Context<'_>, id: ID) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .delete_object_node(&service.context(), &entity_id(&id))
            .await;
        Ok(MutationResponse::from_result(result, "Object node deleted"))
    }

    async fn add_labels(
        &self,
        ctx: &Context<'_>,
        id: ID,
        labels: Vec<String>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .add_labels(&service.context(), &entity_id(&id), &labels)
            .await;
        Ok(MutationResponse::from_result(result, "Labels added"))
    }

    async fn remove_labels(
        &self,
        ctx: &Context<'_>,
        id: ID,
        labels: Vec<String>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .remove_labels(&service.context(), &entity_id(&id), &labels)
            .await;
        Ok(MutationResponse::from_result(result, "Labels removed"))
    }

    async fn set_properties(
        &self,
        ctx: &Context<'_>,
        id: ID,
        properties: Json<RawProperties>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .set_properties(&service.context(), &entity_id(&id), &properties.0)
            .await;
        Ok(MutationResponse::from_result(result, "Properties set"))
    }

    async fn remove_properties(
        &self,
        ctx: &Context<'_>,
        id: ID,
        keys: Vec<String>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .remove_properties(&service.context(), &entity_id(&id), &keys)
            .await;
        Ok(MutationResponse::from_result(result, "Properties removed"))
    }

    // ── Object relationships ─────────────────────────────────────

    async fn create_object_relationship(
        &self,
        ctx: &Context<'_>,
        input: ObjectRelationshipInput,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let request = NewObjectRelationship {
            name: input.name,
            from: entity_id(&input.from),
            to: entity_id(&input.to),
            properties: raw(input.properties),
        };
        let result = service
            .objects()
            .create_object_relationship(&service.context(), &request)
            .await;
        Ok(MutationResponse::from_result(result, "Object relationship created"))
    }

    async fn rename_object_relationship(
        &self,
        ctx: &Context<'_>,
        id: ID,
        name: String,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .rename_object_relationship(&service.context(), &entity_id(&id), &name)
            .await;
        Ok(MutationResponse::from_result(result, "Object relationship renamed"))
    }

    async fn delete_object_relationship(
        &self,
        ctx: &Context<'_>,
        id: ID,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .delete_object_relationship(&service.context(), &entity_id(&id))
            .await;
        Ok(MutationResponse::from_result(result, "Object relationship deleted"))
    }

    async fn set_relationship_properties(
        &self,
        ctx: &Context<'_>,
        id: ID,
        properties: Json<RawProperties>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .set_relationship_properties(&service.context(), &entity_id(&id), &properties.0)
            .await;
        Ok(MutationResponse::from_result(result, "Relationship properties set"))
    }

    async fn remove_relationship_properties(
        &self,
        ctx: &Context<'_>,
        id: ID,
        keys: Vec<String>,
    ) -> Result<MutationResponse> {
        let service = ctx.data::<GraphService>()?;
        let result = service
            .objects()
            .remove_relationship_properties(&service.context(), &entity_id(&id), &keys)
            .await;
        Ok(MutationResponse::from_result(result, "Relationship properties removed"))
    }
}
