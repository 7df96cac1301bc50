//! Policy and violation route handlers

use crate::auth::{require_role, Claims, Role};
use crate::error::ApiResult;
use crate::governance::{
    ComplianceLogEntry, NewPolicy, Policy, PolicyChanges, PolicyFilter, PolicyViolation,
    ViolationFilter,
};
use crate::response::{ListResponse, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::debug;

pub async fn create_policy(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewPolicy>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Policy>>)> {
    require_role(&claims, Role::Admin)?;
    debug!("Creating policy: {}", payload.name);

    let policy = state.policies.create_policy(payload, &claims.actor()).await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Policy created successfully.", policy)),
    ))
}

pub async fn list_policies(
    State(state): State<SharedState>,
    Query(filter): Query<PolicyFilter>,
) -> ApiResult<Json<SuccessResponse<ListResponse<Policy>>>> {
    let policies = state.policies.list_policies(&filter).await;
    Ok(Json(SuccessResponse::with_data("Policies retrieved.", policies.into())))
}

pub async fn get_policy(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<Policy>>> {
    let policy = state.policies.get_policy(id).await?;
    Ok(Json(SuccessResponse::with_data("Policy retrieved.", policy)))
}

pub async fn update_policy(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<PolicyChanges>,
) -> ApiResult<Json<SuccessResponse<Policy>>> {
    require_role(&claims, Role::Admin)?;

    let policy = state.policies.update_policy(id, payload, &claims.actor()).await?;
    Ok(Json(SuccessResponse::with_data("Policy updated successfully.", policy)))
}

pub async fn delete_policy(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<()>>> {
    require_role(&claims, Role::Admin)?;

    state.policies.delete_policy(id, &claims.actor()).await?;
    Ok(Json(SuccessResponse::message_only("Policy deleted successfully.")))
}

pub async fn policy_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<ListResponse<ComplianceLogEntry>>>> {
    let entries = state.policies.policy_history(id).await?;
    Ok(Json(SuccessResponse::with_data("Policy history retrieved.", entries.into())))
}

/// Violations, most recent first
pub async fn list_violations(
    State(state): State<SharedState>,
    Query(filter): Query<ViolationFilter>,
) -> ApiResult<Json<SuccessResponse<ListResponse<PolicyViolation>>>> {
    let violations = state.policies.list_violations(&filter).await;
    Ok(Json(SuccessResponse::with_data("Violations retrieved.", violations.into())))
}
