//! Policy management
//!
//! Admin-facing policy CRUD and violation queries. Condition type and scope
//! are fixed at creation; only name, description, and the active flag can
//! change afterwards. Deleting a policy leaves a tombstone so existing
//! violations keep a valid reference.

use crate::error::AppError;
use crate::governance::audit::{
    AuditAction, AuditFilter, AuditRecorder, ComplianceLogEntry, EntityType, ListLimits,
    PendingLogEntry,
};
use crate::governance::lifecycle::Actor;
use crate::governance::policy::{
    ConditionType, Policy, PolicyScope, PolicyViolation, ScopeKind, ViolationFilter,
};
use crate::registry::Environment;
use crate::store::{ChangeSet, IdKind, RegistryStore};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

/// A policy to create
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewPolicy {
    #[validate(length(min = 1, max = 255, message = "Policy name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[serde(default)]
    pub scope: ScopeKind,
    pub condition_type: ConditionType,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub organization_id: Option<i64>,
    pub environment: Option<Environment>,
}

fn default_active() -> bool {
    true
}

/// Mutable policy fields
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PolicyChanges {
    #[validate(length(min = 1, max = 255, message = "Policy name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Filters for listing policies
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyFilter {
    pub is_active: Option<bool>,
    pub scope: Option<ScopeKind>,
}

impl PolicyFilter {
    fn matches(&self, policy: &Policy) -> bool {
        !policy.is_deleted()
            && self.is_active.map_or(true, |active| policy.is_active == active)
            && self.scope.map_or(true, |kind| policy.scope.kind() == kind)
    }
}

pub struct PolicyService {
    store: Arc<RegistryStore>,
    audit: AuditRecorder,
    violation_limits: ListLimits,
}

impl PolicyService {
    pub fn new(store: Arc<RegistryStore>, audit: AuditRecorder, violation_limits: ListLimits) -> Self {
        Self {
            store,
            audit,
            violation_limits,
        }
    }

    pub async fn create_policy(&self, input: NewPolicy, actor: &Actor) -> Result<Policy, AppError> {
        input.validate()?;

        let scope = PolicyScope::from_parts(input.scope, input.organization_id, input.environment)
            .map_err(AppError::Validation)?;
        if let Some(org_id) = scope.organization_id() {
            if self.store.get_organization(org_id).await.is_none() {
                return Err(AppError::Validation(format!(
                    "Organization {} does not exist",
                    org_id
                )));
            }
        }
        if self.store.policy_name_taken(&input.name, None).await {
            return Err(AppError::Conflict(format!(
                "Policy with name '{}' already exists",
                input.name
            )));
        }

        let policy = Policy::new(
            self.store.next_id(IdKind::Policy),
            input.name,
            input.description,
            scope,
            input.condition_type,
            input.is_active,
        );

        let mut changes = ChangeSet::default();
        changes.put_policy(policy.clone()).log(PendingLogEntry::new(
            EntityType::Policy,
            policy.id,
            AuditAction::PolicyCreated,
            Some(&actor.user_id),
            json!({
                "name": policy.name,
                "scope": policy.scope,
                "conditionType": policy.condition_type,
                "isActive": policy.is_active,
            }),
        ));
        self.store.commit(changes).await?;

        info!(
            "Created policy {} '{}' ({})",
            policy.id, policy.name, policy.condition_type
        );
        Ok(policy)
    }

    /// A live policy; tombstoned policies are not found
    pub async fn get_policy(&self, id: i64) -> Result<Policy, AppError> {
        self.store
            .get_policy(id)
            .await
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| AppError::NotFound(format!("Policy {} not found", id)))
    }

    /// Live policies ordered by id
    pub async fn list_policies(&self, filter: &PolicyFilter) -> Vec<Policy> {
        self.store
            .policies()
            .await
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect()
    }

    pub async fn update_policy(
        &self,
        id: i64,
        changes: PolicyChanges,
        actor: &Actor,
    ) -> Result<Policy, AppError> {
        changes.validate()?;
        let _catalog = self.store.lock_catalog().await;
        let mut policy = self.get_policy(id).await?;
        let mut changed = Vec::new();

        if let Some(name) = changes.name {
            if name != policy.name {
                if self.store.policy_name_taken(&name, Some(id)).await {
                    return Err(AppError::Conflict(format!(
                        "Policy with name '{}' already exists",
                        name
                    )));
                }
                policy.name = name;
                changed.push("name");
            }
        }
        if let Some(description) = changes.description {
            if policy.description.as_ref() != Some(&description) {
                policy.description = Some(description);
                changed.push("description");
            }
        }
        if let Some(is_active) = changes.is_active {
            if policy.is_active != is_active {
                policy.is_active = is_active;
                changed.push("isActive");
            }
        }

        if changed.is_empty() {
            return Ok(policy);
        }
        policy.updated_at = Some(Utc::now());

        let mut change_set = ChangeSet::default();
        change_set.put_policy(policy.clone()).log(PendingLogEntry::new(
            EntityType::Policy,
            policy.id,
            AuditAction::PolicyUpdated,
            Some(&actor.user_id),
            json!({ "changedFields": changed, "isActive": policy.is_active }),
        ));
        self.store.commit(change_set).await?;

        info!("Updated policy {}: {}", policy.id, changed.join(", "));
        Ok(policy)
    }

    /// Deactivate and tombstone a policy
    pub async fn delete_policy(&self, id: i64, actor: &Actor) -> Result<(), AppError> {
        let _catalog = self.store.lock_catalog().await;
        let mut policy = self.get_policy(id).await?;
        let now = Utc::now();
        policy.is_active = false;
        policy.updated_at = Some(now);
        policy.deleted_at = Some(now);

        let mut changes = ChangeSet::default();
        changes.put_policy(policy.clone()).log(PendingLogEntry::new(
            EntityType::Policy,
            policy.id,
            AuditAction::PolicyDeleted,
            Some(&actor.user_id),
            json!({ "name": policy.name }),
        ));
        self.store.commit(changes).await?;

        info!("Deleted policy {} '{}'", policy.id, policy.name);
        Ok(())
    }

    /// Violations, most recent first
    pub async fn list_violations(&self, filter: &ViolationFilter) -> Vec<PolicyViolation> {
        let limit = self.violation_limits.clamp(filter.limit);
        self.store.violations(filter, limit).await
    }

    /// Audit trail of one policy, most recent first
    pub async fn policy_history(&self, id: i64) -> Result<Vec<ComplianceLogEntry>, AppError> {
        self.store
            .get_policy(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Policy {} not found", id)))?;
        Ok(self
            .audit
            .list(&AuditFilter::for_entity(EntityType::Policy, id))
            .await)
    }
}
