//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod audit;
mod models;
mod organizations;
mod policies;

use crate::auth::auth_middleware;
use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    let cors = build_cors_layer(settings);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let middleware_stack = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes(state.clone()))
        .layer(middleware_stack)
        .with_state(state)
}

/// Every route here requires a bearer token
fn api_routes(state: SharedState) -> Router<SharedState> {
    Router::new()
        // Models & lifecycle
        .route("/models", post(models::create_model).get(models::list_models))
        .route("/models/{id}", get(models::get_model).patch(models::update_model))
        .route("/models/{id}/transitions", post(models::request_transition))
        .route("/models/{id}/history", get(models::model_history))
        .route(
            "/models/{id}/versions",
            post(models::create_version).get(models::list_versions),
        )
        .route(
            "/versions/{id}/metrics",
            post(models::add_metric).get(models::list_metrics),
        )
        // Policies & violations
        .route(
            "/policies",
            post(policies::create_policy).get(policies::list_policies),
        )
        .route(
            "/policies/{id}",
            get(policies::get_policy)
                .patch(policies::update_policy)
                .delete(policies::delete_policy),
        )
        .route("/policies/{id}/history", get(policies::policy_history))
        .route("/violations", get(policies::list_violations))
        // Audit log
        .route("/audit-logs", get(audit::list_audit_logs))
        .route("/audit-logs/verify", get(audit::verify_audit_chain))
        // Organizations
        .route(
            "/organizations",
            post(organizations::create_organization).get(organizations::list_organizations),
        )
        .route(
            "/organizations/{id}",
            get(organizations::get_organization).patch(organizations::update_organization),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let methods = [
        Method::GET,
        Method::POST,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT];

    if origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .max_age(Duration::from_secs(3600))
    }
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{issue_token, Role};
    use crate::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    const SECRET: &str = "router-test-secret";

    fn app() -> Router {
        let vars = HashMap::from([("JWT_SECRET".to_string(), SECRET.to_string())]);
        let settings = Settings::from_environment(Some(vars)).unwrap();
        let state = Arc::new(AppState::new(&settings));
        create_router(state, &settings)
    }

    fn token(role: Role) -> String {
        issue_token(SECRET, &format!("{}-user", role), role, 15)
    }

    async fn call(app: &Router, method: &str, uri: &str, role: Option<Role>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(role) = role {
            builder = builder.header("authorization", format!("Bearer {}", token(role)));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let app = app();
        let (status, body) = call(&app, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], json!(true));
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let app = app();
        let (status, body) = call(&app, "GET", "/api/models", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], json!("UNAUTHORIZED"));
    }

    #[tokio::test]
    async fn test_roles_gate_writes() {
        let app = app();
        let model = json!({ "name": "fraud", "owner": "risk" });

        let (status, _) = call(&app, "POST", "/api/models", Some(Role::Viewer), Some(model.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "POST", "/api/models", Some(Role::Developer), Some(model)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["complianceStatus"], json!("draft"));

        let policy = json!({ "name": "gate", "conditionType": "require_evaluation_before_approval" });
        let (status, _) = call(&app, "POST", "/api/policies", Some(Role::Developer), Some(policy)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "GET", "/api/models", Some(Role::Viewer), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["count"], json!(1));
    }

    #[tokio::test]
    async fn test_denied_transition_returns_violation() {
        let app = app();
        let (_, body) = call(
            &app,
            "POST",
            "/api/models",
            Some(Role::Developer),
            Some(json!({ "name": "credit", "owner": "risk", "riskLevel": "high" })),
        )
        .await;
        let model_id = body["data"]["id"].as_i64().unwrap();

        let (status, _) = call(
            &app,
            "POST",
            "/api/policies",
            Some(Role::Admin),
            Some(json!({ "name": "eval-gate", "conditionType": "require_evaluation_before_approval" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let uri = format!("/api/models/{}/transitions", model_id);
        let approve = json!({ "targetStatus": "approved", "approvalNotes": "ship it" });

        let (status, _) = call(&app, "POST", &uri, Some(Role::Developer), Some(approve.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "POST", &uri, Some(Role::Admin), Some(approve)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], json!("POLICY_DENIED"));
        assert_eq!(body["violation"]["policyName"], json!("eval-gate"));

        let (_, body) = call(&app, "GET", "/api/violations", Some(Role::Viewer), None).await;
        assert_eq!(body["data"]["count"], json!(1));

        let (_, body) = call(&app, "GET", &format!("/api/models/{}", model_id), Some(Role::Viewer), None).await;
        assert_eq!(body["data"]["complianceStatus"], json!("draft"));

        let (_, body) = call(&app, "GET", "/api/audit-logs/verify", Some(Role::Viewer), None).await;
        assert_eq!(body["data"]["valid"], json!(true));
    }

    #[tokio::test]
    async fn test_overlong_approval_notes_are_audited() {
        let app = app();
        let (_, body) = call(
            &app,
            "POST",
            "/api/models",
            Some(Role::Developer),
            Some(json!({ "name": "scoring", "owner": "risk" })),
        )
        .await;
        let model_id = body["data"]["id"].as_i64().unwrap();
        let history = format!("/api/models/{}/history", model_id);

        let (_, body) = call(&app, "GET", &history, Some(Role::Viewer), None).await;
        let before = body["data"]["count"].as_u64().unwrap();

        let (status, body) = call(
            &app,
            "POST",
            &format!("/api/models/{}/transitions", model_id),
            Some(Role::Admin),
            Some(json!({ "targetStatus": "approved", "approvalNotes": "x".repeat(2001) })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("VALIDATION_ERROR"));

        let (_, body) = call(&app, "GET", &history, Some(Role::Viewer), None).await;
        assert_eq!(body["data"]["count"].as_u64().unwrap(), before + 1);
        assert_eq!(body["data"]["items"][0]["action"], json!("transition_rejected"));
    }

    #[tokio::test]
    async fn test_illegal_transition_is_bad_request() {
        let app = app();
        let (_, body) = call(
            &app,
            "POST",
            "/api/models",
            Some(Role::Developer),
            Some(json!({ "name": "ocr", "owner": "docs" })),
        )
        .await;
        let uri = format!("/api/models/{}/transitions", body["data"]["id"]);

        let (status, body) = call(
            &app,
            "POST",
            &uri,
            Some(Role::Developer),
            Some(json!({ "targetStatus": "retired" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], json!("VALIDATION_ERROR"));

        let (_, body) = call(
            &app,
            "GET",
            "/api/audit-logs?action=transition_rejected",
            Some(Role::Viewer),
            None,
        )
        .await;
        assert_eq!(body["data"]["count"], json!(1));
    }
}
