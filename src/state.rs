//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::Settings;
use crate::governance::{AuditRecorder, LifecycleController, PolicyService};
use crate::registry::RegistryService;
use crate::store::RegistryStore;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Models, versions, metrics, and organizations
    pub registry: RegistryService,

    /// Policy CRUD and violation queries
    pub policies: PolicyService,

    /// Compliance status transitions
    pub lifecycle: LifecycleController,

    /// Compliance audit log
    pub audit: AuditRecorder,

    /// JWT secret key for token verification
    pub jwt_secret: String,
}

impl AppState {
    pub fn new(settings: &Settings) -> Self {
        let governance = &settings.governance;
        let store = Arc::new(RegistryStore::new(governance.store_settings()));
        let audit = AuditRecorder::new(store.clone(), governance.list_limits);

        Self {
            registry: RegistryService::new(store.clone(), audit.clone()),
            policies: PolicyService::new(store.clone(), audit.clone(), governance.list_limits),
            lifecycle: LifecycleController::new(store, audit.clone()),
            audit,
            jwt_secret: settings.auth.jwt_secret.clone(),
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
