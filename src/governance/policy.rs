//! Governance policies and the violations they produce

use crate::registry::{ComplianceStatus, Environment, Model};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The rule a policy enforces. Immutable once the policy exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    /// At least one version must carry an evaluation metric before approval
    RequireEvaluationBeforeApproval,
    /// High-risk models may not jump from draft straight to approved
    BlockHighRiskWithoutApproval,
    /// High-risk models must have been under review before approval
    RequireReviewForHighRisk,
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConditionType::RequireEvaluationBeforeApproval => "require_evaluation_before_approval",
            ConditionType::BlockHighRiskWithoutApproval => "block_high_risk_without_approval",
            ConditionType::RequireReviewForHighRisk => "require_review_for_high_risk",
        };
        f.write_str(s)
    }
}

/// Breadth over which a policy applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyScope {
    Global,
    #[serde(rename_all = "camelCase")]
    Organization { organization_id: i64 },
    Environment { environment: Environment },
}

impl PolicyScope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            PolicyScope::Global => ScopeKind::Global,
            PolicyScope::Organization { .. } => ScopeKind::Organization,
            PolicyScope::Environment { .. } => ScopeKind::Environment,
        }
    }

    /// Build a scope from its flat request form
    pub fn from_parts(
        kind: ScopeKind,
        organization_id: Option<i64>,
        environment: Option<Environment>,
    ) -> Result<Self, String> {
        match (kind, organization_id, environment) {
            (ScopeKind::Global, None, None) => Ok(PolicyScope::Global),
            (ScopeKind::Global, _, _) => {
                Err("Global policies cannot reference an organization or environment".to_string())
            }
            (ScopeKind::Organization, Some(organization_id), None) => {
                Ok(PolicyScope::Organization { organization_id })
            }
            (ScopeKind::Organization, None, _) => {
                Err("Organization-scoped policies require an organization id".to_string())
            }
            (ScopeKind::Environment, None, Some(environment)) => {
                Ok(PolicyScope::Environment { environment })
            }
            (ScopeKind::Environment, _, None) => {
                Err("Environment-scoped policies require an environment".to_string())
            }
            (_, Some(_), Some(_)) => {
                Err("A policy is scoped to an organization or an environment, not both".to_string())
            }
        }
    }

    pub fn organization_id(&self) -> Option<i64> {
        match self {
            PolicyScope::Organization { organization_id } => Some(*organization_id),
            _ => None,
        }
    }
}

/// Scope discriminant, used by requests and list filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeKind {
    Global,
    Organization,
    Environment,
}

impl Default for ScopeKind {
    fn default() -> Self {
        ScopeKind::Global
    }
}

/// A governance rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub scope: PolicyScope,
    pub condition_type: ConditionType,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Policy {
    pub fn new(
        id: i64,
        name: String,
        description: Option<String>,
        scope: PolicyScope,
        condition_type: ConditionType,
        is_active: bool,
    ) -> Self {
        Self {
            id,
            name,
            description,
            scope,
            condition_type,
            is_active,
            created_at: Utc::now(),
            updated_at: None,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Active and not tombstoned
    pub fn is_enforced(&self) -> bool {
        self.is_active && !self.is_deleted()
    }
}

/// Why a transition was blocked
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationDetails {
    pub policy_name: String,
    pub policy_condition: ConditionType,
    pub current_status: ComplianceStatus,
    pub attempted_status: ComplianceStatus,
    pub reason: String,
}

/// Immutable record of a denied action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyViolation {
    pub id: i64,
    pub policy_id: i64,
    pub policy_name: String,
    pub model_id: Option<i64>,
    pub model_version_id: Option<i64>,
    pub actor: String,
    pub action: String,
    pub details: ViolationDetails,
    pub created_at: DateTime<Utc>,
}

impl PolicyViolation {
    pub fn reason(&self) -> &str {
        &self.details.reason
    }
}

/// Filters for listing violations
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationFilter {
    pub model_id: Option<i64>,
    pub policy_id: Option<i64>,
    pub limit: Option<usize>,
}

impl ViolationFilter {
    pub fn matches(&self, violation: &PolicyViolation) -> bool {
        self.model_id.map_or(true, |id| violation.model_id == Some(id))
            && self.policy_id.map_or(true, |id| violation.policy_id == id)
    }
}

/// Whether a rule covers a given model
pub trait AppliesTo {
    fn applies_to(&self, model: &Model) -> bool;
}

impl AppliesTo for PolicyScope {
    fn applies_to(&self, model: &Model) -> bool {
        match self {
            PolicyScope::Global => true,
            PolicyScope::Organization { organization_id } => {
                model.organization_id == Some(*organization_id)
            }
            PolicyScope::Environment { environment } => model.environment == Some(*environment),
        }
    }
}

impl AppliesTo for Policy {
    fn applies_to(&self, model: &Model) -> bool {
        self.is_enforced() && self.scope.applies_to(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_parts() {
        assert_eq!(
            PolicyScope::from_parts(ScopeKind::Global, None, None),
            Ok(PolicyScope::Global)
        );
        assert_eq!(
            PolicyScope::from_parts(ScopeKind::Organization, Some(7), None),
            Ok(PolicyScope::Organization { organization_id: 7 })
        );
        assert_eq!(
            PolicyScope::from_parts(ScopeKind::Environment, None, Some(Environment::Prod)),
            Ok(PolicyScope::Environment { environment: Environment::Prod })
        );
        assert!(PolicyScope::from_parts(ScopeKind::Organization, None, None).is_err());
        assert!(PolicyScope::from_parts(ScopeKind::Environment, None, None).is_err());
        assert!(PolicyScope::from_parts(ScopeKind::Global, Some(1), None).is_err());
        assert!(PolicyScope::from_parts(ScopeKind::Organization, Some(1), Some(Environment::Dev)).is_err());
    }

    #[test]
    fn test_scope_serialization_is_tagged() {
        let scope = PolicyScope::Organization { organization_id: 3 };
        let json = serde_json::to_value(scope).unwrap();
        assert_eq!(json, serde_json::json!({ "kind": "organization", "organizationId": 3 }));
    }

    #[test]
    fn test_deleted_policy_is_not_enforced() {
        let mut policy = Policy::new(
            1,
            "eval-gate".into(),
            None,
            PolicyScope::Global,
            ConditionType::RequireEvaluationBeforeApproval,
            true,
        );
        assert!(policy.is_enforced());
        policy.deleted_at = Some(Utc::now());
        assert!(!policy.is_enforced());
    }
}
