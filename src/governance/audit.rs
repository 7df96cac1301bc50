//! Audit Recorder
//!
//! Every state-changing operation appends one ComplianceLog entry. Entries
//! are staged into the same `ChangeSet` as the change they describe and are
//! sealed by the store inside the commit, so a state change and its audit
//! record land together or not at all.
//!
//! Sealed entries carry a sequence number and a SHA-256 hash chained to the
//! previous entry. `verify_chain` recomputes the chain.

use crate::error::AppError;
use crate::registry::ComplianceStatus;
use crate::store::{ChangeSet, RegistryStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Hash used as `prev_hash` of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Kind of entity an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Model,
    Version,
    EvaluationMetric,
    Policy,
    Organization,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityType::Model => "model",
            EntityType::Version => "version",
            EntityType::EvaluationMetric => "evaluation_metric",
            EntityType::Policy => "policy",
            EntityType::Organization => "organization",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Registry actions
    ModelCreated,
    ModelUpdated,
    VersionCreated,
    MetricAdded,

    // Organization actions
    OrganizationCreated,
    OrganizationUpdated,

    // Policy actions
    PolicyCreated,
    PolicyUpdated,
    PolicyDeleted,

    // Lifecycle actions
    TransitionApplied,
    TransitionRejected,
    PolicyViolation,
    TransitionConflict,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same spelling as the serialized form
        let value = serde_json::to_value(self).map_err(|_| fmt::Error)?;
        f.write_str(value.as_str().unwrap_or_default())
    }
}

/// An entry staged for commit, not yet sequenced or hashed
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLogEntry {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub details: serde_json::Value,
}

impl PendingLogEntry {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl ToString,
        action: AuditAction,
        actor: Option<&str>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.to_string(),
            action,
            actor: actor.map(str::to_string),
            details,
        }
    }
}

/// Immutable, append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceLogEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action: AuditAction,
    pub actor: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub prev_hash: String,
    pub hash: String,
}

impl ComplianceLogEntry {
    /// Sequence and hash a staged entry onto the end of the chain
    pub fn seal(
        pending: PendingLogEntry,
        sequence: u64,
        timestamp: DateTime<Utc>,
        prev_hash: &str,
    ) -> Self {
        let mut entry = Self {
            id: Uuid::new_v4(),
            sequence,
            entity_type: pending.entity_type,
            entity_id: pending.entity_id,
            action: pending.action,
            actor: pending.actor,
            details: pending.details,
            timestamp,
            prev_hash: prev_hash.to_string(),
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// SHA-256 over every field except `hash` itself
    pub fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.sequence.to_be_bytes());
        hasher.update(self.entity_type.to_string().as_bytes());
        hasher.update(self.entity_id.as_bytes());
        hasher.update(self.action.to_string().as_bytes());
        hasher.update(self.actor.as_deref().unwrap_or("").as_bytes());
        hasher.update(self.details.to_string().as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.prev_hash.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Filters for listing the audit log
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    pub entity_type: Option<EntityType>,
    pub entity_id: Option<String>,
    pub action: Option<AuditAction>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    pub fn for_entity(entity_type: EntityType, entity_id: impl ToString) -> Self {
        Self {
            entity_type: Some(entity_type),
            entity_id: Some(entity_id.to_string()),
            ..Default::default()
        }
    }

    pub fn matches(&self, entry: &ComplianceLogEntry) -> bool {
        self.entity_type.map_or(true, |t| entry.entity_type == t)
            && self.entity_id.as_ref().map_or(true, |id| &entry.entity_id == id)
            && self.action.map_or(true, |a| entry.action == a)
            && self.since.map_or(true, |since| entry.timestamp >= since)
    }
}

/// Outcome of recomputing the hash chain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainVerification {
    pub valid: bool,
    pub entries_checked: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_broken_sequence: Option<u64>,
}

/// Page size bounds for list queries
#[derive(Debug, Clone, Copy)]
pub struct ListLimits {
    pub default: usize,
    pub max: usize,
}

impl ListLimits {
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).min(self.max)
    }
}

impl Default for ListLimits {
    fn default() -> Self {
        Self { default: 100, max: 500 }
    }
}

/// Appends and queries ComplianceLog entries
#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<RegistryStore>,
    limits: ListLimits,
}

impl AuditRecorder {
    pub fn new(store: Arc<RegistryStore>, limits: ListLimits) -> Self {
        Self { store, limits }
    }

    /// Append a single entry in its own commit.
    ///
    /// Fails if the store cannot commit; callers that change state should
    /// stage the entry into their own `ChangeSet` instead.
    pub async fn record(
        &self,
        entity_type: EntityType,
        entity_id: impl ToString,
        action: AuditAction,
        actor: Option<&str>,
        details: serde_json::Value,
    ) -> Result<ComplianceLogEntry, AppError> {
        let mut changes = ChangeSet::default();
        changes.log(PendingLogEntry::new(entity_type, entity_id, action, actor, details));

        let mut sealed = self.store.commit(changes).await?.log_entries;
        sealed
            .pop()
            .ok_or_else(|| AppError::Storage("Audit entry was not sealed".to_string()))
    }

    /// Entries matching the filter, most recent first
    pub async fn list(&self, filter: &AuditFilter) -> Vec<ComplianceLogEntry> {
        let limit = self.limits.clamp(filter.limit);
        let entries = self.store.audit_entries(filter, limit).await;
        debug!("Audit query returned {} entries", entries.len());
        entries
    }

    /// Statuses the model has been moved into, oldest first
    pub async fn status_history(&self, model_id: i64) -> Vec<ComplianceStatus> {
        let filter = AuditFilter {
            action: Some(AuditAction::TransitionApplied),
            ..AuditFilter::for_entity(EntityType::Model, model_id)
        };
        let mut entries = self.store.audit_entries(&filter, usize::MAX).await;
        entries.reverse();

        entries
            .iter()
            .filter_map(|entry| entry.details.get("toStatus"))
            .filter_map(|status| serde_json::from_value(status.clone()).ok())
            .collect()
    }

    /// Recompute every hash and link in the chain
    pub async fn verify_chain(&self) -> ChainVerification {
        let entries = self.store.audit_chain().await;
        let mut prev_hash = GENESIS_HASH.to_string();

        for entry in &entries {
            if entry.prev_hash != prev_hash || entry.compute_hash() != entry.hash {
                warn!("Audit chain broken at sequence {}", entry.sequence);
                return ChainVerification {
                    valid: false,
                    entries_checked: entries.len(),
                    first_broken_sequence: Some(entry.sequence),
                };
            }
            prev_hash = entry.hash.clone();
        }

        ChainVerification {
            valid: true,
            entries_checked: entries.len(),
            first_broken_sequence: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreSettings;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn recorder() -> (Arc<RegistryStore>, AuditRecorder) {
        let store = Arc::new(RegistryStore::new(StoreSettings::default()));
        let audit = AuditRecorder::new(store.clone(), ListLimits { default: 2, max: 3 });
        (store, audit)
    }

    #[test]
    fn test_action_display_matches_serde() {
        assert_eq!(AuditAction::PolicyViolation.to_string(), "policy_violation");
        assert_eq!(AuditAction::TransitionApplied.to_string(), "transition_applied");
    }

    #[test]
    fn test_seal_links_to_previous_hash() {
        let pending = PendingLogEntry::new(
            EntityType::Model,
            1,
            AuditAction::ModelCreated,
            Some("alice"),
            json!({ "name": "fraud" }),
        );
        let first = ComplianceLogEntry::seal(pending.clone(), 1, Utc::now(), GENESIS_HASH);
        let second = ComplianceLogEntry::seal(pending, 2, Utc::now(), &first.hash);

        assert_eq!(first.prev_hash, GENESIS_HASH);
        assert_eq!(second.prev_hash, first.hash);
        assert_eq!(first.hash.len(), 64);
        assert_ne!(first.hash, second.hash);
    }

    #[tokio::test]
    async fn test_record_and_list_most_recent_first() {
        let (_store, audit) = recorder();
        for id in 1..=3 {
            audit
                .record(EntityType::Policy, id, AuditAction::PolicyCreated, None, json!({}))
                .await
                .unwrap();
        }

        let listed = audit.list(&AuditFilter::default()).await;
        let ids: Vec<_> = listed.iter().map(|e| e.entity_id.as_str()).collect();
        // default limit is 2
        assert_eq!(ids, vec!["3", "2"]);

        let all = audit.list(&AuditFilter { limit: Some(50), ..Default::default() }).await;
        assert_eq!(all.len(), 3);

        let one = audit.list(&AuditFilter::for_entity(EntityType::Policy, 2)).await;
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].sequence, 2);
    }

    #[tokio::test]
    async fn test_listing_does_not_mutate() {
        let (_store, audit) = recorder();
        audit
            .record(EntityType::Model, 1, AuditAction::ModelCreated, None, json!({}))
            .await
            .unwrap();

        let before = audit.list(&AuditFilter::default()).await;
        let again = audit.list(&AuditFilter::default()).await;
        assert_eq!(before, again);
        assert!(audit.verify_chain().await.valid);
    }

    #[tokio::test]
    async fn test_verify_chain_detects_tampering() {
        let (store, audit) = recorder();
        for id in 1..=3 {
            audit
                .record(EntityType::Model, id, AuditAction::ModelCreated, None, json!({ "n": id }))
                .await
                .unwrap();
        }
        assert_eq!(
            audit.verify_chain().await,
            ChainVerification { valid: true, entries_checked: 3, first_broken_sequence: None }
        );

        store
            .tamper_with_audit_entry(2, json!({ "n": 99 }))
            .await;

        let result = audit.verify_chain().await;
        assert!(!result.valid);
        assert_eq!(result.first_broken_sequence, Some(2));
    }

    #[tokio::test]
    async fn test_status_history_reads_applied_transitions() {
        let (_store, audit) = recorder();
        audit
            .record(
                EntityType::Model,
                5,
                AuditAction::TransitionApplied,
                Some("alice"),
                json!({ "fromStatus": "draft", "toStatus": "under_review" }),
            )
            .await
            .unwrap();
        audit
            .record(
                EntityType::Model,
                5,
                AuditAction::PolicyViolation,
                Some("alice"),
                json!({ "fromStatus": "under_review", "toStatus": "approved" }),
            )
            .await
            .unwrap();

        assert_eq!(audit.status_history(5).await, vec![ComplianceStatus::UnderReview]);
        assert!(audit.status_history(6).await.is_empty());
    }
}
