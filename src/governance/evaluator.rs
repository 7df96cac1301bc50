//! Policy Evaluator
//!
//! A pure decision function: given a proposed status change and the
//! policies that apply to the model, allow it or name the first policy that
//! blocks it. Policies are checked in the order given and evaluation stops
//! at the first failure, so every denial has exactly one cause.

use crate::governance::policy::{ConditionType, Policy};
use crate::registry::{ComplianceStatus, Model};
use tracing::debug;

/// Everything a condition may look at
#[derive(Debug, Clone)]
pub struct TransitionContext<'a> {
    pub model: &'a Model,
    pub target: ComplianceStatus,
    /// At least one version of the model carries a metric
    pub has_evaluation_evidence: bool,
    /// Statuses the model has been moved into, from the audit log
    pub status_history: &'a [ComplianceStatus],
}

impl TransitionContext<'_> {
    pub fn current(&self) -> ComplianceStatus {
        self.model.compliance_status
    }

    fn targets_approval(&self) -> bool {
        self.target == ComplianceStatus::Approved
    }

    fn has_passed_review(&self) -> bool {
        self.status_history.contains(&ComplianceStatus::UnderReview)
    }
}

/// Evaluator verdict
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed,
    Denied { policy: Policy, reason: String },
}

impl ConditionType {
    /// `None` when satisfied, otherwise the reason it is not
    pub fn check(&self, ctx: &TransitionContext<'_>) -> Option<String> {
        match self {
            ConditionType::RequireEvaluationBeforeApproval => {
                if ctx.targets_approval() && !ctx.has_evaluation_evidence {
                    return Some(
                        "Approval requires at least one evaluation metric on a model version"
                            .to_string(),
                    );
                }
                None
            }
            ConditionType::BlockHighRiskWithoutApproval => {
                if ctx.targets_approval()
                    && ctx.model.risk_level.is_high_risk()
                    && ctx.current() == ComplianceStatus::Draft
                {
                    return Some(format!(
                        "A {} risk model cannot move from draft to approved; transition to under_review first",
                        ctx.model.risk_level
                    ));
                }
                None
            }
            ConditionType::RequireReviewForHighRisk => {
                if ctx.targets_approval()
                    && ctx.model.risk_level.is_high_risk()
                    && !ctx.has_passed_review()
                {
                    return Some(format!(
                        "A {} risk model must pass through under_review before approval",
                        ctx.model.risk_level
                    ));
                }
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `policies` in order, stopping at the first failure
    pub fn evaluate(&self, ctx: &TransitionContext<'_>, policies: &[Policy]) -> Decision {
        for policy in policies {
            if let Some(reason) = policy.condition_type.check(ctx) {
                debug!(
                    "Policy {} ({}) denies {} -> {} for model {}",
                    policy.id,
                    policy.condition_type,
                    ctx.current(),
                    ctx.target,
                    ctx.model.id
                );
                return Decision::Denied {
                    policy: policy.clone(),
                    reason,
                };
            }
        }
        Decision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::policy::PolicyScope;
    use crate::registry::RiskLevel;

    fn policy(id: i64, condition_type: ConditionType) -> Policy {
        Policy::new(id, format!("p{}", id), None, PolicyScope::Global, condition_type, true)
    }

    fn model(risk: RiskLevel, status: ComplianceStatus) -> Model {
        let mut model = Model::new(1, "credit-scoring".into(), "risk-team".into(), None);
        model.risk_level = risk;
        model.compliance_status = status;
        model
    }

    fn ctx<'a>(
        model: &'a Model,
        target: ComplianceStatus,
        evidence: bool,
        history: &'a [ComplianceStatus],
    ) -> TransitionContext<'a> {
        TransitionContext {
            model,
            target,
            has_evaluation_evidence: evidence,
            status_history: history,
        }
    }

    fn denied_by(decision: &Decision) -> Option<i64> {
        match decision {
            Decision::Denied { policy, .. } => Some(policy.id),
            Decision::Allowed => None,
        }
    }

    #[test]
    fn test_no_policies_allows() {
        let m = model(RiskLevel::High, ComplianceStatus::Draft);
        let decision = PolicyEvaluator::new().evaluate(&ctx(&m, ComplianceStatus::Approved, false, &[]), &[]);
        assert_eq!(decision, Decision::Allowed);
    }

    #[test]
    fn test_evaluation_required_only_for_approval() {
        let m = model(RiskLevel::Minimal, ComplianceStatus::Draft);
        let policies = [policy(1, ConditionType::RequireEvaluationBeforeApproval)];
        let evaluator = PolicyEvaluator::new();

        let to_review = evaluator.evaluate(&ctx(&m, ComplianceStatus::UnderReview, false, &[]), &policies);
        assert_eq!(to_review, Decision::Allowed);

        let to_approved = evaluator.evaluate(&ctx(&m, ComplianceStatus::Approved, false, &[]), &policies);
        assert_eq!(denied_by(&to_approved), Some(1));

        let with_metrics = evaluator.evaluate(&ctx(&m, ComplianceStatus::Approved, true, &[]), &policies);
        assert_eq!(with_metrics, Decision::Allowed);
    }

    #[test]
    fn test_block_high_risk_only_for_draft_to_approved() {
        let policies = [policy(1, ConditionType::BlockHighRiskWithoutApproval)];
        let evaluator = PolicyEvaluator::new();

        let draft = model(RiskLevel::Unacceptable, ComplianceStatus::Draft);
        assert_eq!(
            denied_by(&evaluator.evaluate(&ctx(&draft, ComplianceStatus::Approved, true, &[]), &policies)),
            Some(1)
        );
        assert_eq!(
            denied_by(&evaluator.evaluate(&ctx(&draft, ComplianceStatus::UnderReview, true, &[]), &policies)),
            None
        );

        let reviewing = model(RiskLevel::High, ComplianceStatus::UnderReview);
        assert_eq!(
            denied_by(&evaluator.evaluate(&ctx(&reviewing, ComplianceStatus::Approved, true, &[]), &policies)),
            None
        );

        let limited = model(RiskLevel::Limited, ComplianceStatus::Draft);
        assert_eq!(
            denied_by(&evaluator.evaluate(&ctx(&limited, ComplianceStatus::Approved, true, &[]), &policies)),
            None
        );
    }

    #[test]
    fn test_review_requirement_reads_history() {
        let policies = [policy(1, ConditionType::RequireReviewForHighRisk)];
        let evaluator = PolicyEvaluator::new();
        let draft = model(RiskLevel::High, ComplianceStatus::Draft);

        assert_eq!(
            denied_by(&evaluator.evaluate(&ctx(&draft, ComplianceStatus::Approved, true, &[]), &policies)),
            Some(1)
        );
        assert_eq!(
            denied_by(&evaluator.evaluate(&ctx(&draft, ComplianceStatus::UnderReview, true, &[]), &policies)),
            None
        );

        let history = [ComplianceStatus::UnderReview];
        assert_eq!(
            denied_by(&evaluator.evaluate(&ctx(&draft, ComplianceStatus::Approved, true, &history), &policies)),
            None
        );
    }

    #[test]
    fn test_short_circuits_on_first_failure() {
        let m = model(RiskLevel::High, ComplianceStatus::Draft);
        let policies = [
            policy(2, ConditionType::RequireEvaluationBeforeApproval),
            policy(5, ConditionType::BlockHighRiskWithoutApproval),
            policy(7, ConditionType::RequireReviewForHighRisk),
        ];
        let evaluator = PolicyEvaluator::new();

        let no_metrics = evaluator.evaluate(&ctx(&m, ComplianceStatus::Approved, false, &[]), &policies);
        assert_eq!(denied_by(&no_metrics), Some(2));

        let with_metrics = evaluator.evaluate(&ctx(&m, ComplianceStatus::Approved, true, &[]), &policies);
        assert_eq!(denied_by(&with_metrics), Some(5));
        if let Decision::Denied { reason, .. } = with_metrics {
            assert!(reason.contains("under_review"));
        }
    }
}
