//! Organization route handlers

use crate::auth::{require_role, Claims, Role};
use crate::error::ApiResult;
use crate::registry::{NewOrganization, Organization, OrganizationChanges};
use crate::response::{ListResponse, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub async fn create_organization(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewOrganization>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Organization>>)> {
    require_role(&claims, Role::Admin)?;

    let organization = state
        .registry
        .create_organization(payload.name, payload.description, &claims.actor())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Organization created successfully.", organization)),
    ))
}

pub async fn list_organizations(
    State(state): State<SharedState>,
    Query(query): Query<OrganizationQuery>,
) -> ApiResult<Json<SuccessResponse<ListResponse<Organization>>>> {
    let organizations = state.registry.list_organizations(query.active_only).await;
    Ok(Json(SuccessResponse::with_data("Organizations retrieved.", organizations.into())))
}

pub async fn get_organization(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<Organization>>> {
    let organization = state.registry.get_organization(id).await?;
    Ok(Json(SuccessResponse::with_data("Organization retrieved.", organization)))
}

pub async fn update_organization(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<OrganizationChanges>,
) -> ApiResult<Json<SuccessResponse<Organization>>> {
    require_role(&claims, Role::Admin)?;

    let organization = state
        .registry
        .update_organization(id, payload, &claims.actor())
        .await?;
    Ok(Json(SuccessResponse::with_data("Organization updated successfully.", organization)))
}
