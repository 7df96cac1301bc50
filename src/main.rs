//! ModelGov API - AI Model Governance Registry
//!
//! Records AI models and enforces governance policies over their compliance
//! lifecycle. Every requested status change is evaluated against the
//! policies in scope; allowed changes are applied, denied ones produce an
//! immutable violation record, and both leave an entry in the hash-chained
//! compliance audit log.

mod auth;
mod config;
mod error;
mod governance;
mod registry;
mod response;
mod routes;
mod state;
mod store;

use crate::config::Settings;
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    info!("🚀 Starting ModelGov - AI Model Governance Registry...");

    let settings = Settings::load()?;
    info!(
        "📋 Configuration loaded (lock timeout {:?}, list limit {}/{})",
        settings.governance.lock_timeout,
        settings.governance.list_limits.default,
        settings.governance.list_limits.max
    );

    let state = Arc::new(AppState::new(&settings));
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));

    info!("🌐 Server listening on http://{}", addr);
    info!("");
    info!("📚 API Endpoints (bearer token required under /api):");
    info!("   ─── Registry ───");
    info!("   POST  /api/models                   - Register a model");
    info!("   GET   /api/models                   - List models");
    info!("   GET   /api/models/:id               - Get a model");
    info!("   PATCH /api/models/:id               - Update risk profile");
    info!("   GET   /api/models/:id/history       - Model audit trail");
    info!("   POST  /api/models/:id/versions      - Add a version");
    info!("   POST  /api/versions/:id/metrics     - Record a metric");
    info!("");
    info!("   ─── Lifecycle ───");
    info!("   POST  /api/models/:id/transitions   - Request a status change");
    info!("");
    info!("   ─── Governance ───");
    info!("   POST  /api/policies                 - Create policy (Admin only)");
    info!("   GET   /api/policies/:id/history     - Policy audit trail");
    info!("   GET   /api/violations               - List policy violations");
    info!("   GET   /api/audit-logs               - Query the audit log");
    info!("   GET   /api/audit-logs/verify        - Verify the audit hash chain");
    info!("   POST  /api/organizations            - Create organization (Admin only)");
    info!("");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,modelgov_api=debug,tower_http=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .compact(),
        )
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("📴 Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("📴 Received terminate signal, initiating graceful shutdown...");
        },
    }
}
