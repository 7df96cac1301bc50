//! Entity Store
//!
//! In-memory stand-in for the durable governance store. All tables live
//! behind one `RwLock`; writes go through `commit`, which checks every row
//! of a `ChangeSet` before applying any of them, so a change set is written
//! completely or not at all.
//!
//! Per-model serialization is provided by `ModelLocks`.

use crate::error::AppError;
use crate::governance::audit::{AuditFilter, ComplianceLogEntry, PendingLogEntry, GENESIS_HASH};
use crate::governance::{Policy, PolicyViolation, ViolationFilter};
use crate::registry::{EvaluationMetric, Model, ModelFilter, Organization, Version};
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

/// Store tuning
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// How long a request waits for another request on the same model
    pub lock_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(5000),
        }
    }
}

/// Identifier sequences, one per table
#[derive(Debug, Clone, Copy)]
pub enum IdKind {
    Model,
    Version,
    Metric,
    Policy,
    Violation,
    Organization,
}

#[derive(Default)]
struct Sequences {
    model: AtomicI64,
    version: AtomicI64,
    metric: AtomicI64,
    policy: AtomicI64,
    violation: AtomicI64,
    organization: AtomicI64,
}

impl Sequences {
    fn next(&self, kind: IdKind) -> i64 {
        let counter = match kind {
            IdKind::Model => &self.model,
            IdKind::Version => &self.version,
            IdKind::Metric => &self.metric,
            IdKind::Policy => &self.policy,
            IdKind::Violation => &self.violation,
            IdKind::Organization => &self.organization,
        };
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// One mutex per model id; transitions on different models never contend
pub struct ModelLocks {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl ModelLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().map_or(0, |locks| locks.len())
    }

    /// Wait for exclusive access to a model, up to the configured timeout
    pub async fn acquire(&self, model_id: i64) -> Result<OwnedMutexGuard<()>, AppError> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| AppError::Internal("Model lock table poisoned".to_string()))?;
            locks.entry(model_id).or_default().clone()
        };

        tokio::time::timeout(self.timeout, lock.lock_owned())
            .await
            .map_err(|_| {
                warn!("Timed out waiting for lock on model {}", model_id);
                AppError::ConcurrencyConflict(format!(
                    "Model {} is being modified by another request; retry later",
                    model_id
                ))
            })
    }
}

/// Rows to write in one atomic commit
#[derive(Debug, Default)]
pub struct ChangeSet {
    models: Vec<Model>,
    versions: Vec<Version>,
    metrics: Vec<EvaluationMetric>,
    policies: Vec<Policy>,
    organizations: Vec<Organization>,
    violations: Vec<PolicyViolation>,
    log: Vec<PendingLogEntry>,
}

impl ChangeSet {
    /// Insert or replace a model row
    pub fn put_model(&mut self, model: Model) -> &mut Self {
        self.models.push(model);
        self
    }

    pub fn insert_version(&mut self, version: Version) -> &mut Self {
        self.versions.push(version);
        self
    }

    pub fn insert_metric(&mut self, metric: EvaluationMetric) -> &mut Self {
        self.metrics.push(metric);
        self
    }

    /// Insert or replace a policy row
    pub fn put_policy(&mut self, policy: Policy) -> &mut Self {
        self.policies.push(policy);
        self
    }

    /// Insert or replace an organization row
    pub fn put_organization(&mut self, organization: Organization) -> &mut Self {
        self.organizations.push(organization);
        self
    }

    pub fn insert_violation(&mut self, violation: PolicyViolation) -> &mut Self {
        self.violations.push(violation);
        self
    }

    pub fn log(&mut self, entry: PendingLogEntry) -> &mut Self {
        self.log.push(entry);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
            && self.versions.is_empty()
            && self.metrics.is_empty()
            && self.policies.is_empty()
            && self.organizations.is_empty()
            && self.violations.is_empty()
            && self.log.is_empty()
    }
}

/// What a successful commit produced
#[derive(Debug, Default)]
pub struct CommitReceipt {
    pub log_entries: Vec<ComplianceLogEntry>,
}

#[derive(Default)]
struct Tables {
    models: BTreeMap<i64, Model>,
    versions: BTreeMap<i64, Version>,
    metrics: BTreeMap<i64, EvaluationMetric>,
    policies: BTreeMap<i64, Policy>,
    organizations: BTreeMap<i64, Organization>,
    violations: Vec<PolicyViolation>,
    audit_log: Vec<ComplianceLogEntry>,
}

impl Tables {
    /// Reject the change set if any row breaks an invariant
    fn check(&self, changes: &ChangeSet) -> Result<(), AppError> {
        let staged_models: HashMap<i64, &Model> =
            changes.models.iter().map(|m| (m.id, m)).collect();
        let staged_orgs: HashSet<i64> = changes.organizations.iter().map(|o| o.id).collect();
        let staged_versions: HashSet<i64> = changes.versions.iter().map(|v| v.id).collect();
        let staged_policies: HashSet<i64> = changes.policies.iter().map(|p| p.id).collect();

        let model_exists = |id: i64| self.models.contains_key(&id) || staged_models.contains_key(&id);

        for model in &changes.models {
            if self.models.values().any(|m| m.id != model.id && m.name == model.name)
                || changes.models.iter().any(|m| m.id != model.id && m.name == model.name)
            {
                return Err(AppError::Conflict(format!(
                    "Model with name '{}' already exists",
                    model.name
                )));
            }
            if let Some(org_id) = model.organization_id {
                if !self.organizations.contains_key(&org_id) && !staged_orgs.contains(&org_id) {
                    return Err(AppError::Storage(format!(
                        "Model {} references missing organization {}",
                        model.id, org_id
                    )));
                }
            }
        }

        let mut staged_tags = HashSet::new();
        for version in &changes.versions {
            if self.versions.contains_key(&version.id) {
                return Err(AppError::Storage(format!(
                    "Version {} already exists; versions are append-only",
                    version.id
                )));
            }
            if !model_exists(version.model_id) {
                return Err(AppError::Storage(format!(
                    "Version {} references missing model {}",
                    version.id, version.model_id
                )));
            }
            let duplicate = self
                .versions
                .values()
                .any(|v| v.model_id == version.model_id && v.version_tag == version.version_tag);
            if duplicate || !staged_tags.insert((version.model_id, version.version_tag.as_str())) {
                return Err(AppError::Validation(format!(
                    "Version tag '{}' already exists for model {}",
                    version.version_tag, version.model_id
                )));
            }
        }

        for metric in &changes.metrics {
            if self.metrics.contains_key(&metric.id) {
                return Err(AppError::Storage(format!(
                    "Metric {} already exists; metrics are append-only",
                    metric.id
                )));
            }
            if !self.versions.contains_key(&metric.version_id)
                && !staged_versions.contains(&metric.version_id)
            {
                return Err(AppError::Storage(format!(
                    "Metric {} references missing version {}",
                    metric.id, metric.version_id
                )));
            }
        }

        for policy in &changes.policies {
            let taken = |p: &Policy| p.id != policy.id && !p.is_deleted() && p.name == policy.name;
            if !policy.is_deleted()
                && (self.policies.values().any(taken) || changes.policies.iter().any(taken))
            {
                return Err(AppError::Conflict(format!(
                    "Policy with name '{}' already exists",
                    policy.name
                )));
            }
            if let Some(existing) = self.policies.get(&policy.id) {
                if existing.is_deleted() && !policy.is_deleted() {
                    return Err(AppError::Conflict(format!(
                        "Policy {} was deleted and cannot be revived",
                        policy.id
                    )));
                }
                if existing.condition_type != policy.condition_type || existing.scope != policy.scope {
                    return Err(AppError::Storage(format!(
                        "Policy {} condition and scope are immutable",
                        policy.id
                    )));
                }
            }
        }

        for organization in &changes.organizations {
            let taken = |o: &Organization| o.id != organization.id && o.name == organization.name;
            if self.organizations.values().any(taken) || changes.organizations.iter().any(taken) {
                return Err(AppError::Conflict(format!(
                    "Organization with name '{}' already exists",
                    organization.name
                )));
            }
        }

        for violation in &changes.violations {
            if self.violations.iter().any(|v| v.id == violation.id) {
                return Err(AppError::Storage(format!(
                    "Violation {} already exists; violations are immutable",
                    violation.id
                )));
            }
            if !self.policies.contains_key(&violation.policy_id)
                && !staged_policies.contains(&violation.policy_id)
            {
                return Err(AppError::Storage(format!(
                    "Violation {} references missing policy {}",
                    violation.id, violation.policy_id
                )));
            }
            if let Some(model_id) = violation.model_id {
                if !model_exists(model_id) {
                    return Err(AppError::Storage(format!(
                        "Violation {} references missing model {}",
                        violation.id, model_id
                    )));
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, changes: ChangeSet) -> CommitReceipt {
        for model in changes.models {
            self.models.insert(model.id, model);
        }
        for version in changes.versions {
            self.versions.insert(version.id, version);
        }
        for metric in changes.metrics {
            self.metrics.insert(metric.id, metric);
        }
        for policy in changes.policies {
            self.policies.insert(policy.id, policy);
        }
        for organization in changes.organizations {
            self.organizations.insert(organization.id, organization);
        }
        self.violations.extend(changes.violations);

        let mut receipt = CommitReceipt::default();
        for pending in changes.log {
            let (sequence, prev_hash, last_timestamp) = match self.audit_log.last() {
                Some(last) => (last.sequence + 1, last.hash.clone(), Some(last.timestamp)),
                None => (1, GENESIS_HASH.to_string(), None),
            };
            // Timestamps never run backwards along the chain
            let now = Utc::now();
            let timestamp = last_timestamp.map_or(now, |last| last.max(now));

            let entry = ComplianceLogEntry::seal(pending, sequence, timestamp, &prev_hash);
            self.audit_log.push(entry.clone());
            receipt.log_entries.push(entry);
        }
        receipt
    }
}

/// Governance entity store
pub struct RegistryStore {
    tables: RwLock<Tables>,
    sequences: Sequences,
    locks: ModelLocks,
    catalog: AsyncMutex<()>,
}

impl RegistryStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            sequences: Sequences::default(),
            locks: ModelLocks::new(settings.lock_timeout),
            catalog: AsyncMutex::new(()),
        }
    }

    /// Allocate an identifier. Ids of rolled-back commits are not reused.
    pub fn next_id(&self, kind: IdKind) -> i64 {
        self.sequences.next(kind)
    }

    /// Serialize all writers of one model.
    ///
    /// Unknown ids never get a lock entry; models are never deleted, so the
    /// lock table is bounded by the model table.
    pub async fn lock_model(&self, model_id: i64) -> Result<OwnedMutexGuard<()>, AppError> {
        if !self.tables.read().await.models.contains_key(&model_id) {
            return Err(AppError::NotFound(format!("Model {} not found", model_id)));
        }
        self.locks.acquire(model_id).await
    }

    /// Serialize read-modify-write of policies and organizations
    pub async fn lock_catalog(&self) -> MutexGuard<'_, ()> {
        self.catalog.lock().await
    }

    /// Write every row of the change set, or none of them
    pub async fn commit(&self, changes: ChangeSet) -> Result<CommitReceipt, AppError> {
        if changes.is_empty() {
            return Ok(CommitReceipt::default());
        }

        let mut tables = self.tables.write().await;
        tables.check(&changes)?;
        let receipt = tables.apply(changes);

        debug!("Committed change set with {} audit entries", receipt.log_entries.len());
        Ok(receipt)
    }

    // =========================================================================
    // MODELS
    // =========================================================================

    pub async fn get_model(&self, id: i64) -> Option<Model> {
        self.tables.read().await.models.get(&id).cloned()
    }

    pub async fn model_name_taken(&self, name: &str, except: Option<i64>) -> bool {
        let tables = self.tables.read().await;
        tables
            .models
            .values()
            .any(|m| m.name == name && Some(m.id) != except)
    }

    pub async fn list_models(&self, filter: &ModelFilter) -> Vec<Model> {
        let tables = self.tables.read().await;
        tables
            .models
            .values()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect()
    }

    // =========================================================================
    // VERSIONS & METRICS
    // =========================================================================

    pub async fn get_version(&self, id: i64) -> Option<Version> {
        self.tables.read().await.versions.get(&id).cloned()
    }

    pub async fn versions_for_model(&self, model_id: i64) -> Vec<Version> {
        let tables = self.tables.read().await;
        tables
            .versions
            .values()
            .filter(|v| v.model_id == model_id)
            .cloned()
            .collect()
    }

    pub async fn version_tag_taken(&self, model_id: i64, tag: &str) -> bool {
        let tables = self.tables.read().await;
        tables
            .versions
            .values()
            .any(|v| v.model_id == model_id && v.version_tag == tag)
    }

    pub async fn metrics_for_version(&self, version_id: i64) -> Vec<EvaluationMetric> {
        let tables = self.tables.read().await;
        tables
            .metrics
            .values()
            .filter(|m| m.version_id == version_id)
            .cloned()
            .collect()
    }

    /// Whether any version of the model carries at least one metric
    pub async fn model_has_metrics(&self, model_id: i64) -> bool {
        let tables = self.tables.read().await;
        tables.metrics.values().any(|metric| {
            tables
                .versions
                .get(&metric.version_id)
                .map_or(false, |v| v.model_id == model_id)
        })
    }

    // =========================================================================
    // POLICIES & VIOLATIONS
    // =========================================================================

    /// Policy by id, tombstoned ones included
    pub async fn get_policy(&self, id: i64) -> Option<Policy> {
        self.tables.read().await.policies.get(&id).cloned()
    }

    /// Every policy ordered by id, tombstoned ones included
    pub async fn policies(&self) -> Vec<Policy> {
        self.tables.read().await.policies.values().cloned().collect()
    }

    pub async fn policy_name_taken(&self, name: &str, except: Option<i64>) -> bool {
        let tables = self.tables.read().await;
        tables
            .policies
            .values()
            .any(|p| !p.is_deleted() && p.name == name && Some(p.id) != except)
    }

    /// Matching violations, most recent first
    pub async fn violations(&self, filter: &ViolationFilter, limit: usize) -> Vec<PolicyViolation> {
        let tables = self.tables.read().await;
        tables
            .violations
            .iter()
            .rev()
            .filter(|v| filter.matches(v))
            .take(limit)
            .cloned()
            .collect()
    }

    // =========================================================================
    // ORGANIZATIONS
    // =========================================================================

    pub async fn get_organization(&self, id: i64) -> Option<Organization> {
        self.tables.read().await.organizations.get(&id).cloned()
    }

    pub async fn organizations(&self) -> Vec<Organization> {
        let tables = self.tables.read().await;
        let mut organizations: Vec<_> = tables.organizations.values().cloned().collect();
        organizations.sort_by(|a, b| a.name.cmp(&b.name));
        organizations
    }

    pub async fn organization_name_taken(&self, name: &str, except: Option<i64>) -> bool {
        let tables = self.tables.read().await;
        tables
            .organizations
            .values()
            .any(|o| o.name == name && Some(o.id) != except)
    }

    // =========================================================================
    // AUDIT LOG
    // =========================================================================

    /// Matching entries ordered by (timestamp, sequence), most recent first
    pub async fn audit_entries(&self, filter: &AuditFilter, limit: usize) -> Vec<ComplianceLogEntry> {
        let tables = self.tables.read().await;
        // Sealing keeps the log sorted by (timestamp, sequence)
        tables
            .audit_log
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit)
            .cloned()
            .collect()
    }

    /// The full chain in sequence order
    pub async fn audit_chain(&self) -> Vec<ComplianceLogEntry> {
        self.tables.read().await.audit_log.clone()
    }

    #[cfg(test)]
    pub async fn tamper_with_audit_entry(&self, sequence: u64, details: serde_json::Value) {
        let mut tables = self.tables.write().await;
        if let Some(entry) = tables.audit_log.iter_mut().find(|e| e.sequence == sequence) {
            entry.details = details;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governance::audit::{AuditAction, EntityType};
    use crate::governance::{ConditionType, PolicyScope, ViolationDetails};
    use crate::registry::ComplianceStatus;
    use serde_json::json;

    fn store() -> RegistryStore {
        RegistryStore::new(StoreSettings {
            lock_timeout: Duration::from_millis(50),
        })
    }

    fn log_entry(model_id: i64) -> PendingLogEntry {
        PendingLogEntry::new(
            EntityType::Model,
            model_id,
            AuditAction::PolicyViolation,
            Some("alice"),
            json!({}),
        )
    }

    fn violation(id: i64, policy_id: i64, model_id: i64) -> PolicyViolation {
        PolicyViolation {
            id,
            policy_id,
            policy_name: "gate".into(),
            model_id: Some(model_id),
            model_version_id: None,
            actor: "alice".into(),
            action: "change_compliance_status".into(),
            details: ViolationDetails {
                policy_name: "gate".into(),
                policy_condition: ConditionType::RequireEvaluationBeforeApproval,
                current_status: ComplianceStatus::Draft,
                attempted_status: ComplianceStatus::Approved,
                reason: "no metrics".into(),
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sequences_are_per_table() {
        let store = store();
        assert_eq!(store.next_id(IdKind::Model), 1);
        assert_eq!(store.next_id(IdKind::Model), 2);
        assert_eq!(store.next_id(IdKind::Policy), 1);
    }

    #[tokio::test]
    async fn test_commit_is_all_or_nothing() {
        let store = store();
        let model = Model::new(1, "fraud".into(), "risk".into(), None);
        let mut changes = ChangeSet::default();
        changes.put_model(model);
        store.commit(changes).await.unwrap();

        // The violation points at a policy that does not exist
        let mut changes = ChangeSet::default();
        changes
            .insert_violation(violation(1, 42, 1))
            .log(log_entry(1));
        let result = store.commit(changes).await;

        assert!(matches!(result, Err(AppError::Storage(_))));
        assert!(store.violations(&ViolationFilter::default(), 10).await.is_empty());
        assert!(store.audit_chain().await.is_empty());
    }

    #[tokio::test]
    async fn test_commit_writes_violation_with_log() {
        let store = store();
        let mut changes = ChangeSet::default();
        changes
            .put_model(Model::new(1, "fraud".into(), "risk".into(), None))
            .put_policy(Policy::new(
                1,
                "gate".into(),
                None,
                PolicyScope::Global,
                ConditionType::RequireEvaluationBeforeApproval,
                true,
            ));
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::default();
        changes.insert_violation(violation(1, 1, 1)).log(log_entry(1));
        let receipt = store.commit(changes).await.unwrap();

        assert_eq!(receipt.log_entries.len(), 1);
        assert_eq!(store.violations(&ViolationFilter::default(), 10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_version_tag_rejected() {
        let store = store();
        let now = Utc::now();
        let mut changes = ChangeSet::default();
        changes
            .put_model(Model::new(1, "fraud".into(), "risk".into(), None))
            .insert_version(Version {
                id: 1,
                model_id: 1,
                version_tag: "v1.0".into(),
                artifact_location: None,
                created_at: now,
            });
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::default();
        changes.insert_version(Version {
            id: 2,
            model_id: 1,
            version_tag: "v1.0".into(),
            artifact_location: None,
            created_at: now,
        });
        assert!(matches!(store.commit(changes).await, Err(AppError::Validation(_))));
        assert_eq!(store.versions_for_model(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_policy_condition_is_immutable() {
        let store = store();
        let policy = Policy::new(
            1,
            "gate".into(),
            None,
            PolicyScope::Global,
            ConditionType::RequireEvaluationBeforeApproval,
            true,
        );
        let mut changes = ChangeSet::default();
        changes.put_policy(policy.clone());
        store.commit(changes).await.unwrap();

        let mut changed = policy;
        changed.condition_type = ConditionType::RequireReviewForHighRisk;
        let mut changes = ChangeSet::default();
        changes.put_policy(changed);
        assert!(store.commit(changes).await.is_err());
    }

    #[tokio::test]
    async fn test_deleted_policy_cannot_be_revived() {
        let store = store();
        let mut policy = Policy::new(
            1,
            "gate".into(),
            None,
            PolicyScope::Global,
            ConditionType::RequireEvaluationBeforeApproval,
            true,
        );
        let live = policy.clone();
        policy.is_active = false;
        policy.deleted_at = Some(Utc::now());
        let mut changes = ChangeSet::default();
        changes.put_policy(policy);
        store.commit(changes).await.unwrap();

        // A stale live copy written after the tombstone
        let mut changes = ChangeSet::default();
        changes.put_policy(live).log(PendingLogEntry::new(
            EntityType::Policy,
            1,
            AuditAction::PolicyUpdated,
            Some("alice"),
            json!({}),
        ));
        assert!(matches!(store.commit(changes).await, Err(AppError::Conflict(_))));
        assert!(store.get_policy(1).await.unwrap().is_deleted());
        assert!(store.audit_chain().await.is_empty());
    }

    async fn seed_models(store: &RegistryStore, ids: &[i64]) {
        let mut changes = ChangeSet::default();
        for id in ids {
            changes.put_model(Model::new(*id, format!("model-{}", id), "risk".into(), None));
        }
        store.commit(changes).await.unwrap();
    }

    #[tokio::test]
    async fn test_model_lock_times_out() {
        let store = store();
        seed_models(&store, &[7, 8]).await;
        let _held = store.lock_model(7).await.unwrap();

        let result = store.lock_model(7).await;
        assert!(matches!(result, Err(AppError::ConcurrencyConflict(_))));

        // Other models are unaffected
        let _other = tokio_test::assert_ok!(store.lock_model(8).await);
    }

    #[tokio::test]
    async fn test_unknown_models_get_no_lock_entry() {
        let store = store();
        seed_models(&store, &[1]).await;

        for id in 100..1100 {
            let result = store.lock_model(id).await;
            assert!(matches!(result, Err(AppError::NotFound(_))));
        }
        assert_eq!(store.locks.len(), 0);

        let _guard = tokio_test::assert_ok!(store.lock_model(1).await);
        assert_eq!(store.locks.len(), 1);
    }
}
