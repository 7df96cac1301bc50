//! Registry data models
//!
//! Models, versions, evaluation metrics, and organizations.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError};

static VERSION_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^v?\d+\.\d+(\.\d+)?$").expect("version tag pattern"));

/// EU AI Act risk classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Unclassified,
    Minimal,
    Limited,
    High,
    Unacceptable,
}

impl RiskLevel {
    /// High and unacceptable models must pass the review gate
    pub fn is_high_risk(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Unacceptable)
    }
}

impl Default for RiskLevel {
    fn default() -> Self {
        RiskLevel::Unclassified
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Unclassified => "unclassified",
            RiskLevel::Minimal => "minimal",
            RiskLevel::Limited => "limited",
            RiskLevel::High => "high",
            RiskLevel::Unacceptable => "unacceptable",
        };
        f.write_str(s)
    }
}

/// Compliance lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceStatus {
    Draft,
    UnderReview,
    Approved,
    Retired,
}

impl ComplianceStatus {
    /// Statuses a model may move to from this one
    pub fn successors(&self) -> &'static [ComplianceStatus] {
        match self {
            // draft -> approved is statically legal but policy-gated
            ComplianceStatus::Draft => &[ComplianceStatus::UnderReview, ComplianceStatus::Approved],
            ComplianceStatus::UnderReview => &[ComplianceStatus::Approved],
            ComplianceStatus::Approved => &[ComplianceStatus::Retired],
            ComplianceStatus::Retired => &[],
        }
    }

    pub fn can_transition_to(&self, target: ComplianceStatus) -> bool {
        self.successors().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

impl Default for ComplianceStatus {
    fn default() -> Self {
        ComplianceStatus::Draft
    }
}

impl fmt::Display for ComplianceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComplianceStatus::Draft => "draft",
            ComplianceStatus::UnderReview => "under_review",
            ComplianceStatus::Approved => "approved",
            ComplianceStatus::Retired => "retired",
        };
        f.write_str(s)
    }
}

/// Deployment environment tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Test,
    Staging,
    Prod,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Dev => "dev",
            Environment::Test => "test",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        };
        f.write_str(s)
    }
}

/// A registered AI system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub owner: String,
    pub description: Option<String>,
    pub risk_level: RiskLevel,
    pub compliance_status: ComplianceStatus,
    pub domain: Option<String>,
    pub intended_purpose: Option<String>,
    pub data_sources: Option<String>,
    pub oversight_plan: Option<String>,
    pub potential_harm: Option<String>,
    pub organization_id: Option<i64>,
    pub environment: Option<Environment>,
    /// Set only by a successful transition into `approved`
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approval_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// A fresh draft model with an unclassified risk level
    pub fn new(id: i64, name: String, owner: String, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            owner,
            description,
            risk_level: RiskLevel::Unclassified,
            compliance_status: ComplianceStatus::Draft,
            domain: None,
            intended_purpose: None,
            data_sources: None,
            oversight_plan: None,
            potential_harm: None,
            organization_id: None,
            environment: None,
            approved_by: None,
            approved_at: None,
            approval_notes: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Immutable artifact pointer owned by one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: i64,
    pub model_id: i64,
    pub version_tag: String,
    pub artifact_location: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Externally supplied measurement attached to a version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationMetric {
    pub id: i64,
    pub version_id: i64,
    pub metric_name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

/// Tenant that scopes models and policies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Filters for listing models
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelFilter {
    pub organization_id: Option<i64>,
    pub environment: Option<Environment>,
    pub compliance_status: Option<ComplianceStatus>,
    pub risk_level: Option<RiskLevel>,
}

impl ModelFilter {
    pub fn matches(&self, model: &Model) -> bool {
        self.organization_id.map_or(true, |id| model.organization_id == Some(id))
            && self.environment.map_or(true, |env| model.environment == Some(env))
            && self.compliance_status.map_or(true, |s| model.compliance_status == s)
            && self.risk_level.map_or(true, |r| model.risk_level == r)
    }
}

/// Fields a caller may change on a model outside the lifecycle
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ModelChanges {
    #[validate(length(min = 1, max = 255, message = "Model name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 255, message = "Owner must be between 1 and 255 characters"))]
    pub owner: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub risk_level: Option<RiskLevel>,
    #[validate(length(max = 255))]
    pub domain: Option<String>,
    #[validate(length(max = 2000))]
    pub intended_purpose: Option<String>,
    #[validate(length(max = 2000))]
    pub data_sources: Option<String>,
    #[validate(length(max = 2000))]
    pub oversight_plan: Option<String>,
    #[validate(length(max = 2000))]
    pub potential_harm: Option<String>,
    pub organization_id: Option<i64>,
    pub environment: Option<Environment>,
}

impl ModelChanges {
    /// Apply the present fields, returning the names of those that changed
    pub fn apply_to(&self, model: &mut Model) -> Vec<&'static str> {
        let changes = self;
        let mut changed = Vec::new();

        macro_rules! set {
            (opt $field:ident, $name:literal) => {
                if let Some(value) = &changes.$field {
                    if model.$field.as_ref() != Some(value) {
                        model.$field = Some(value.clone());
                        changed.push($name);
                    }
                }
            };
            ($field:ident, $name:literal) => {
                if let Some(value) = &changes.$field {
                    if model.$field != *value {
                        model.$field = value.clone();
                        changed.push($name);
                    }
                }
            };
        }

        set!(name, "name");
        set!(owner, "owner");
        set!(opt description, "description");
        set!(risk_level, "riskLevel");
        set!(opt domain, "domain");
        set!(opt intended_purpose, "intendedPurpose");
        set!(opt data_sources, "dataSources");
        set!(opt oversight_plan, "oversightPlan");
        set!(opt potential_harm, "potentialHarm");
        set!(opt organization_id, "organizationId");
        set!(opt environment, "environment");

        if !changed.is_empty() {
            model.updated_at = Utc::now();
        }
        changed
    }
}

// =============================================================================
// INPUTS
// =============================================================================

/// A model to register
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewModel {
    #[validate(length(min = 1, max = 255, message = "Model name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 255, message = "Owner must be between 1 and 255 characters"))]
    pub owner: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    /// Optional risk profile recorded at registration
    #[serde(flatten)]
    #[validate(nested)]
    pub profile: ModelChanges,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewVersion {
    #[validate(length(min = 1, max = 50, message = "Version tag must be between 1 and 50 characters"))]
    #[validate(custom(function = "validate_version_tag"))]
    pub version_tag: String,
    #[validate(length(max = 500))]
    pub artifact_location: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewMetric {
    #[validate(length(min = 1, max = 100, message = "Metric name must be between 1 and 100 characters"))]
    pub metric_name: String,
    #[validate(custom(function = "validate_finite"))]
    pub value: f64,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewOrganization {
    #[validate(length(min = 1, max = 255, message = "Organization name must be between 1 and 255 characters"))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationChanges {
    #[validate(length(min = 1, max = 255, message = "Organization name must be between 1 and 255 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// `v1.2`, `1.2.3`, `v10.0.1`
fn validate_version_tag(tag: &str) -> Result<(), ValidationError> {
    if !VERSION_TAG.is_match(tag) {
        let mut err = ValidationError::new("invalid_version_tag");
        err.message = Some("Version tag must look like v1.0 or 1.0.0".into());
        return Err(err);
    }
    Ok(())
}

fn validate_finite(value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        let mut err = ValidationError::new("non_finite");
        err.message = Some("Metric value must be a finite number".into());
        return Err(err);
    }
    Ok(())
}
