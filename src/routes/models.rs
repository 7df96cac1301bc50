//! Model registry route handlers
//!
//! Models, versions, metrics, and compliance status transitions.

use crate::auth::{require_role, Claims, Role};
use crate::error::{ApiResult, AppError};
use crate::governance::{ComplianceLogEntry, TransitionOutcome, TransitionRequest};
use crate::registry::{
    ComplianceStatus, EvaluationMetric, Model, ModelChanges, ModelFilter, NewMetric, NewModel,
    NewVersion, Version,
};
use crate::response::{ListResponse, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::debug;

// =============================================================================
// REQUEST TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    pub target_status: ComplianceStatus,
    pub approval_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

// =============================================================================
// MODELS
// =============================================================================

/// Register a new model
pub async fn create_model(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<NewModel>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Model>>)> {
    require_role(&claims, Role::Developer)?;
    debug!("Registering model: {}", payload.name);

    let model = state.registry.create_model(payload, &claims.actor()).await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Model registered successfully.", model)),
    ))
}

pub async fn list_models(
    State(state): State<SharedState>,
    Query(filter): Query<ModelFilter>,
) -> ApiResult<Json<SuccessResponse<ListResponse<Model>>>> {
    let models = state.registry.list_models(&filter).await;
    Ok(Json(SuccessResponse::with_data("Models retrieved.", models.into())))
}

pub async fn get_model(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<Model>>> {
    let model = state.registry.get_model(id).await?;
    Ok(Json(SuccessResponse::with_data("Model retrieved.", model)))
}

/// Update descriptive and risk-profile fields
pub async fn update_model(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<ModelChanges>,
) -> ApiResult<Json<SuccessResponse<Model>>> {
    require_role(&claims, Role::Developer)?;

    let model = state.registry.update_model(id, payload, &claims.actor()).await?;
    Ok(Json(SuccessResponse::with_data("Model updated successfully.", model)))
}

pub async fn model_history(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<SuccessResponse<ListResponse<ComplianceLogEntry>>>> {
    let entries = state.registry.model_history(id, query.limit).await?;
    Ok(Json(SuccessResponse::with_data("Model history retrieved.", entries.into())))
}

// =============================================================================
// LIFECYCLE
// =============================================================================

/// Request a compliance status change.
///
/// A policy denial is reported as an error response carrying the recorded
/// violation; the model keeps its status.
pub async fn request_transition(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<i64>,
    Json(payload): Json<TransitionBody>,
) -> ApiResult<Json<SuccessResponse<Model>>> {
    require_role(&claims, Role::Developer)?;
    if payload.target_status == ComplianceStatus::Approved {
        require_role(&claims, Role::Admin)?;
    }

    let request = TransitionRequest {
        model_id: id,
        target: payload.target_status,
        actor: claims.actor(),
        approval_notes: payload.approval_notes,
    };

    match state.lifecycle.request_transition(request).await? {
        TransitionOutcome::Applied(model) => Ok(Json(SuccessResponse::with_data(
            format!("Model moved to {}.", model.compliance_status),
            model,
        ))),
        TransitionOutcome::Denied(violation) => Err(AppError::PolicyDenied(Box::new(violation))),
    }
}

// =============================================================================
// VERSIONS & METRICS
// =============================================================================

pub async fn create_version(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(model_id): Path<i64>,
    Json(payload): Json<NewVersion>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<Version>>)> {
    require_role(&claims, Role::Developer)?;

    let version = state
        .registry
        .create_version(
            model_id,
            payload.version_tag,
            payload.artifact_location,
            &claims.actor(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Version created successfully.", version)),
    ))
}

pub async fn list_versions(
    State(state): State<SharedState>,
    Path(model_id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<ListResponse<Version>>>> {
    let versions = state.registry.list_versions(model_id).await?;
    Ok(Json(SuccessResponse::with_data("Versions retrieved.", versions.into())))
}

pub async fn add_metric(
    State(state): State<SharedState>,
    Extension(claims): Extension<Claims>,
    Path(version_id): Path<i64>,
    Json(payload): Json<NewMetric>,
) -> ApiResult<(StatusCode, Json<SuccessResponse<EvaluationMetric>>)> {
    require_role(&claims, Role::Developer)?;

    let metric = state
        .registry
        .add_metric(version_id, payload.metric_name, payload.value, &claims.actor())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SuccessResponse::with_data("Metric recorded.", metric)),
    ))
}

pub async fn list_metrics(
    State(state): State<SharedState>,
    Path(version_id): Path<i64>,
) -> ApiResult<Json<SuccessResponse<ListResponse<EvaluationMetric>>>> {
    let metrics = state.registry.list_metrics(version_id).await?;
    Ok(Json(SuccessResponse::with_data("Metrics retrieved.", metrics.into())))
}
