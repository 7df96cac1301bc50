//! Registry service
//!
//! Registration of models, versions, evaluation metrics, and organizations.
//! Every write commits its row together with one audit entry. Writes that
//! touch a model take that model's lock, so they serialize with transitions.

use crate::error::AppError;
use crate::governance::audit::{
    AuditAction, AuditFilter, AuditRecorder, ComplianceLogEntry, EntityType, PendingLogEntry,
};
use crate::governance::Actor;
use crate::registry::{
    EvaluationMetric, Model, ModelChanges, ModelFilter, NewMetric, NewModel, NewOrganization,
    NewVersion, Organization, OrganizationChanges, Version,
};
use crate::store::{ChangeSet, IdKind, RegistryStore};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::info;
use validator::Validate;

pub struct RegistryService {
    store: Arc<RegistryStore>,
    audit: AuditRecorder,
}

impl RegistryService {
    pub fn new(store: Arc<RegistryStore>, audit: AuditRecorder) -> Self {
        Self { store, audit }
    }

    // =========================================================================
    // MODELS
    // =========================================================================

    /// Register a model in `draft`
    pub async fn create_model(&self, input: NewModel, actor: &Actor) -> Result<Model, AppError> {
        input.validate()?;

        if self.store.model_name_taken(&input.name, None).await {
            return Err(AppError::Conflict(format!(
                "Model with name '{}' already exists",
                input.name
            )));
        }

        // Identity fields come from the outer input only
        let profile = ModelChanges {
            name: None,
            owner: None,
            description: None,
            ..input.profile
        };
        if let Some(org_id) = profile.organization_id {
            self.require_active_organization(org_id).await?;
        }

        let mut model = Model::new(
            self.store.next_id(IdKind::Model),
            input.name,
            input.owner,
            input.description,
        );
        profile.apply_to(&mut model);
        model.updated_at = model.created_at;

        let mut changes = ChangeSet::default();
        changes.put_model(model.clone()).log(PendingLogEntry::new(
            EntityType::Model,
            model.id,
            AuditAction::ModelCreated,
            Some(&actor.user_id),
            json!({
                "name": model.name,
                "owner": model.owner,
                "riskLevel": model.risk_level,
                "complianceStatus": model.compliance_status,
            }),
        ));
        self.store.commit(changes).await?;

        info!("Registered model {} '{}'", model.id, model.name);
        Ok(model)
    }

    pub async fn get_model(&self, id: i64) -> Result<Model, AppError> {
        self.store
            .get_model(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Model {} not found", id)))
    }

    pub async fn list_models(&self, filter: &ModelFilter) -> Vec<Model> {
        self.store.list_models(filter).await
    }

    /// Audit trail of one model, most recent first
    pub async fn model_history(
        &self,
        id: i64,
        limit: Option<usize>,
    ) -> Result<Vec<ComplianceLogEntry>, AppError> {
        self.get_model(id).await?;
        let filter = AuditFilter {
            limit,
            ..AuditFilter::for_entity(EntityType::Model, id)
        };
        Ok(self.audit.list(&filter).await)
    }

    /// Change descriptive and risk-profile fields. Status is not touched.
    pub async fn update_model(
        &self,
        id: i64,
        changes: ModelChanges,
        actor: &Actor,
    ) -> Result<Model, AppError> {
        changes.validate()?;
        let _guard = self.store.lock_model(id).await?;

        let mut model = self.get_model(id).await?;
        Self::ensure_not_retired(&model)?;

        if let Some(name) = &changes.name {
            if self.store.model_name_taken(name, Some(id)).await {
                return Err(AppError::Conflict(format!(
                    "Model with name '{}' already exists",
                    name
                )));
            }
        }
        if let Some(org_id) = changes.organization_id {
            if model.organization_id != Some(org_id) {
                self.require_active_organization(org_id).await?;
            }
        }

        let changed = changes.apply_to(&mut model);
        if changed.is_empty() {
            return Ok(model);
        }

        let mut change_set = ChangeSet::default();
        change_set.put_model(model.clone()).log(PendingLogEntry::new(
            EntityType::Model,
            model.id,
            AuditAction::ModelUpdated,
            Some(&actor.user_id),
            json!({ "changedFields": changed }),
        ));
        self.store.commit(change_set).await?;

        info!("Updated model {}: {}", model.id, changed.join(", "));
        Ok(model)
    }

    // =========================================================================
    // VERSIONS
    // =========================================================================

    pub async fn create_version(
        &self,
        model_id: i64,
        version_tag: String,
        artifact_location: Option<String>,
        actor: &Actor,
    ) -> Result<Version, AppError> {
        let input = NewVersion {
            version_tag,
            artifact_location,
        };
        input.validate()?;

        let _guard = self.store.lock_model(model_id).await?;
        let model = self.get_model(model_id).await?;
        Self::ensure_not_retired(&model)?;

        if self.store.version_tag_taken(model_id, &input.version_tag).await {
            return Err(AppError::Validation(format!(
                "Version tag '{}' already exists for model {}",
                input.version_tag, model_id
            )));
        }

        let version = Version {
            id: self.store.next_id(IdKind::Version),
            model_id,
            version_tag: input.version_tag,
            artifact_location: input.artifact_location,
            created_at: Utc::now(),
        };

        let mut changes = ChangeSet::default();
        changes.insert_version(version.clone()).log(PendingLogEntry::new(
            EntityType::Version,
            version.id,
            AuditAction::VersionCreated,
            Some(&actor.user_id),
            json!({
                "modelId": model_id,
                "versionTag": version.version_tag,
                "artifactLocation": version.artifact_location,
            }),
        ));
        self.store.commit(changes).await?;

        info!("Model {} gained version {}", model_id, version.version_tag);
        Ok(version)
    }

    /// Versions of a model, oldest first
    pub async fn list_versions(&self, model_id: i64) -> Result<Vec<Version>, AppError> {
        self.get_model(model_id).await?;
        Ok(self.store.versions_for_model(model_id).await)
    }

    pub async fn get_version(&self, id: i64) -> Result<Version, AppError> {
        self.store
            .get_version(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Version {} not found", id)))
    }

    // =========================================================================
    // METRICS
    // =========================================================================

    pub async fn add_metric(
        &self,
        version_id: i64,
        metric_name: String,
        value: f64,
        actor: &Actor,
    ) -> Result<EvaluationMetric, AppError> {
        let input = NewMetric { metric_name, value };
        input.validate()?;

        let version = self.get_version(version_id).await?;
        let _guard = self.store.lock_model(version.model_id).await?;
        let model = self.get_model(version.model_id).await?;
        Self::ensure_not_retired(&model)?;

        let metric = EvaluationMetric {
            id: self.store.next_id(IdKind::Metric),
            version_id,
            metric_name: input.metric_name,
            value: input.value,
            timestamp: Utc::now(),
        };

        let mut changes = ChangeSet::default();
        changes.insert_metric(metric.clone()).log(PendingLogEntry::new(
            EntityType::EvaluationMetric,
            metric.id,
            AuditAction::MetricAdded,
            Some(&actor.user_id),
            json!({
                "modelId": model.id,
                "versionId": version_id,
                "metricName": metric.metric_name,
                "value": metric.value,
            }),
        ));
        self.store.commit(changes).await?;

        info!(
            "Recorded metric {}={} on version {}",
            metric.metric_name, metric.value, version_id
        );
        Ok(metric)
    }

    pub async fn list_metrics(&self, version_id: i64) -> Result<Vec<EvaluationMetric>, AppError> {
        self.get_version(version_id).await?;
        Ok(self.store.metrics_for_version(version_id).await)
    }

    // =========================================================================
    // ORGANIZATIONS
    // =========================================================================

    pub async fn create_organization(
        &self,
        name: String,
        description: Option<String>,
        actor: &Actor,
    ) -> Result<Organization, AppError> {
        let input = NewOrganization { name, description };
        input.validate()?;

        if self.store.organization_name_taken(&input.name, None).await {
            return Err(AppError::Conflict(format!(
                "Organization with name '{}' already exists",
                input.name
            )));
        }

        let organization = Organization {
            id: self.store.next_id(IdKind::Organization),
            name: input.name,
            description: input.description,
            is_active: true,
            created_at: Utc::now(),
        };

        let mut changes = ChangeSet::default();
        changes
            .put_organization(organization.clone())
            .log(PendingLogEntry::new(
                EntityType::Organization,
                organization.id,
                AuditAction::OrganizationCreated,
                Some(&actor.user_id),
                json!({ "name": organization.name }),
            ));
        self.store.commit(changes).await?;

        info!("Created organization {} '{}'", organization.id, organization.name);
        Ok(organization)
    }

    pub async fn get_organization(&self, id: i64) -> Result<Organization, AppError> {
        self.store
            .get_organization(id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Organization {} not found", id)))
    }

    /// Organizations sorted by name, optionally only active ones
    pub async fn list_organizations(&self, active_only: bool) -> Vec<Organization> {
        self.store
            .organizations()
            .await
            .into_iter()
            .filter(|o| !active_only || o.is_active)
            .collect()
    }

    pub async fn update_organization(
        &self,
        id: i64,
        changes: OrganizationChanges,
        actor: &Actor,
    ) -> Result<Organization, AppError> {
        changes.validate()?;
        let _catalog = self.store.lock_catalog().await;
        let mut organization = self.get_organization(id).await?;
        let mut changed = Vec::new();

        if let Some(name) = changes.name {
            if name != organization.name {
                if self.store.organization_name_taken(&name, Some(id)).await {
                    return Err(AppError::Conflict(format!(
                        "Organization with name '{}' already exists",
                        name
                    )));
                }
                organization.name = name;
                changed.push("name");
            }
        }
        if let Some(description) = changes.description {
            if organization.description.as_ref() != Some(&description) {
                organization.description = Some(description);
                changed.push("description");
            }
        }
        if let Some(is_active) = changes.is_active {
            if organization.is_active != is_active {
                organization.is_active = is_active;
                changed.push("isActive");
            }
        }

        if changed.is_empty() {
            return Ok(organization);
        }

        let mut change_set = ChangeSet::default();
        change_set
            .put_organization(organization.clone())
            .log(PendingLogEntry::new(
                EntityType::Organization,
                organization.id,
                AuditAction::OrganizationUpdated,
                Some(&actor.user_id),
                json!({ "changedFields": changed }),
            ));
        self.store.commit(change_set).await?;

        info!("Updated organization {}: {}", organization.id, changed.join(", "));
        Ok(organization)
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn ensure_not_retired(model: &Model) -> Result<(), AppError> {
        if model.compliance_status.is_terminal() {
            return Err(AppError::Validation(format!(
                "Model {} is {} and can no longer be modified",
                model.id, model.compliance_status
            )));
        }
        Ok(())
    }

    async fn require_active_organization(&self, id: i64) -> Result<(), AppError> {
        match self.store.get_organization(id).await {
            Some(org) if org.is_active => Ok(()),
            Some(_) => Err(AppError::Validation(format!(
                "Organization {} is inactive",
                id
            ))),
            None => Err(AppError::Validation(format!(
                "Organization {} does not exist",
                id
            ))),
        }
    }

    #[cfg(test)]
    fn audit(&self) -> &AuditRecorder {
        &self.audit
    }
}
