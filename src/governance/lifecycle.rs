//! Lifecycle Controller
//!
//! Owns compliance status changes. A transition request is serialized per
//! model, validated against the legal-successor table, checked for approval
//! notes, evaluated against the applicable policies, and then committed
//! together with exactly one audit entry. A denial additionally commits
//! exactly one PolicyViolation and leaves the status untouched.

use crate::error::AppError;
use crate::governance::audit::{AuditAction, AuditRecorder, EntityType, PendingLogEntry};
use crate::governance::evaluator::{Decision, PolicyEvaluator, TransitionContext};
use crate::governance::policy::{PolicyViolation, ViolationDetails};
use crate::governance::scope::ScopeResolver;
use crate::registry::{ComplianceStatus, Model};
use crate::store::{ChangeSet, IdKind, RegistryStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// Action name recorded on violations produced here
pub const CHANGE_STATUS_ACTION: &str = "change_compliance_status";

pub const MAX_APPROVAL_NOTES_CHARS: usize = 2000;

/// The user on whose behalf a request runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub display_name: Option<String>,
}

impl Actor {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
        }
    }

    pub fn is_identified(&self) -> bool {
        !self.user_id.trim().is_empty()
    }
}

/// A requested status change
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub model_id: i64,
    pub target: ComplianceStatus,
    pub actor: Actor,
    pub approval_notes: Option<String>,
}

/// Result of a transition that reached a decision
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied(Model),
    Denied(PolicyViolation),
}

pub struct LifecycleController {
    store: Arc<RegistryStore>,
    audit: AuditRecorder,
    resolver: ScopeResolver,
    evaluator: PolicyEvaluator,
}

impl LifecycleController {
    pub fn new(store: Arc<RegistryStore>, audit: AuditRecorder) -> Self {
        Self {
            store,
            audit,
            resolver: ScopeResolver::new(),
            evaluator: PolicyEvaluator::new(),
        }
    }

    /// Request a compliance status change.
    ///
    /// `Ok(Applied)` and `Ok(Denied)` are both decisions; `Err` is returned
    /// for validation failures, lock contention, and storage faults.
    pub async fn request_transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, AppError> {
        let model_id = request.model_id;

        let _guard = match self.store.lock_model(model_id).await {
            Ok(guard) => guard,
            Err(err @ AppError::ConcurrencyConflict(_)) => {
                self.record_conflict(&request, &err).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let model = self
            .store
            .get_model(model_id)
            .await
            .ok_or_else(|| AppError::NotFound(format!("Model {} not found", model_id)))?;

        if let Err(err) = Self::validate(&model, &request) {
            self.record_rejection(&model, &request, &err).await?;
            return Err(err);
        }

        let has_evaluation_evidence = self.store.model_has_metrics(model_id).await;
        let status_history = self.audit.status_history(model_id).await;
        let policies = self.resolver.resolve(&model, &self.store.policies().await);

        let ctx = TransitionContext {
            model: &model,
            target: request.target,
            has_evaluation_evidence,
            status_history: &status_history,
        };

        match self.evaluator.evaluate(&ctx, &policies) {
            Decision::Allowed => self.apply(model, request).await.map(TransitionOutcome::Applied),
            Decision::Denied { policy, reason } => {
                let violation = PolicyViolation {
                    id: self.store.next_id(IdKind::Violation),
                    policy_id: policy.id,
                    policy_name: policy.name.clone(),
                    model_id: Some(model.id),
                    model_version_id: None,
                    actor: request.actor.user_id.clone(),
                    action: CHANGE_STATUS_ACTION.to_string(),
                    details: ViolationDetails {
                        policy_name: policy.name.clone(),
                        policy_condition: policy.condition_type,
                        current_status: model.compliance_status,
                        attempted_status: request.target,
                        reason,
                    },
                    created_at: Utc::now(),
                };
                self.deny(&model, &request, violation)
                    .await
                    .map(TransitionOutcome::Denied)
            }
        }
    }

    /// Static checks that run before any policy is consulted
    fn validate(model: &Model, request: &TransitionRequest) -> Result<(), AppError> {
        let current = model.compliance_status;

        if current.is_terminal() {
            return Err(AppError::Validation(format!(
                "Model {} is {} and cannot change status",
                model.id, current
            )));
        }
        if !current.can_transition_to(request.target) {
            return Err(AppError::Validation(format!(
                "Illegal transition {} -> {} for model {}",
                current, request.target, model.id
            )));
        }

        let notes_len = request.approval_notes.as_deref().map_or(0, |n| n.chars().count());
        if notes_len > MAX_APPROVAL_NOTES_CHARS {
            return Err(AppError::Validation(format!(
                "Approval notes must be at most {} characters",
                MAX_APPROVAL_NOTES_CHARS
            )));
        }

        if request.target == ComplianceStatus::Approved {
            let notes_present = request
                .approval_notes
                .as_deref()
                .map_or(false, |notes| !notes.trim().is_empty());
            if !notes_present {
                return Err(AppError::Validation(
                    "Approval notes are required when approving a model".to_string(),
                ));
            }
            if !request.actor.is_identified() {
                return Err(AppError::Validation(
                    "An identified approver is required when approving a model".to_string(),
                ));
            }
        }

        Ok(())
    }

    async fn apply(&self, mut model: Model, request: TransitionRequest) -> Result<Model, AppError> {
        let from = model.compliance_status;
        let now = Utc::now();

        model.compliance_status = request.target;
        model.updated_at = now;
        if request.target == ComplianceStatus::Approved {
            model.approved_by = Some(request.actor.user_id.clone());
            model.approved_at = Some(now);
            model.approval_notes = request.approval_notes.map(|notes| notes.trim().to_string());
        }

        let mut changes = ChangeSet::default();
        changes.put_model(model.clone()).log(PendingLogEntry::new(
            EntityType::Model,
            model.id,
            AuditAction::TransitionApplied,
            Some(&request.actor.user_id),
            json!({
                "fromStatus": from,
                "toStatus": request.target,
                "approvalNotes": model.approval_notes,
            }),
        ));
        self.store.commit(changes).await?;

        info!(
            "Model {} moved {} -> {} by {}",
            model.id, from, request.target, request.actor.user_id
        );
        Ok(model)
    }

    async fn deny(
        &self,
        model: &Model,
        request: &TransitionRequest,
        violation: PolicyViolation,
    ) -> Result<PolicyViolation, AppError> {
        let mut changes = ChangeSet::default();
        changes
            .insert_violation(violation.clone())
            .log(PendingLogEntry::new(
                EntityType::Model,
                model.id,
                AuditAction::PolicyViolation,
                Some(&request.actor.user_id),
                json!({
                    "violationId": violation.id,
                    "policyId": violation.policy_id,
                    "policyName": violation.policy_name,
                    "policyCondition": violation.details.policy_condition,
                    "attemptedAction": CHANGE_STATUS_ACTION,
                    "fromStatus": model.compliance_status,
                    "toStatus": request.target,
                    "reason": violation.details.reason,
                    "blocked": true,
                }),
            ));
        self.store.commit(changes).await?;

        warn!(
            "Policy '{}' blocked model {} {} -> {}: {}",
            violation.policy_name,
            model.id,
            model.compliance_status,
            request.target,
            violation.reason()
        );
        Ok(violation)
    }

    async fn record_rejection(
        &self,
        model: &Model,
        request: &TransitionRequest,
        err: &AppError,
    ) -> Result<(), AppError> {
        warn!("Rejected transition for model {}: {}", model.id, err);
        self.audit
            .record(
                EntityType::Model,
                model.id,
                AuditAction::TransitionRejected,
                Some(&request.actor.user_id),
                json!({
                    "fromStatus": model.compliance_status,
                    "toStatus": request.target,
                    "reason": err.to_string(),
                }),
            )
            .await
            .map(|_| ())
    }

    async fn record_conflict(&self, request: &TransitionRequest, err: &AppError) -> Result<(), AppError> {
        self.audit
            .record(
                EntityType::Model,
                request.model_id,
                AuditAction::TransitionConflict,
                Some(&request.actor.user_id),
                json!({
                    "toStatus": request.target,
                    "reason": err.to_string(),
                }),
            )
            .await
            .map(|_| ())
    }
}
