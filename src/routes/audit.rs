//! Compliance audit log route handlers

use crate::error::ApiResult;
use crate::governance::{AuditFilter, ChainVerification, ComplianceLogEntry};
use crate::response::{ListResponse, SuccessResponse};
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    Json,
};

/// Audit entries, most recent first
pub async fn list_audit_logs(
    State(state): State<SharedState>,
    Query(filter): Query<AuditFilter>,
) -> ApiResult<Json<SuccessResponse<ListResponse<ComplianceLogEntry>>>> {
    let entries = state.audit.list(&filter).await;
    Ok(Json(SuccessResponse::with_data("Audit log retrieved.", entries.into())))
}

/// Recompute the hash chain
pub async fn verify_audit_chain(
    State(state): State<SharedState>,
) -> ApiResult<Json<SuccessResponse<ChainVerification>>> {
    let result = state.audit.verify_chain().await;
    let message = if result.valid {
        "Audit chain intact."
    } else {
        "Audit chain broken!"
    };
    Ok(Json(SuccessResponse::with_data(message, result)))
}
