//! Governance module - the compliance lifecycle and its policy engine
//!
//! - Policy definitions and scopes
//! - Scope resolution (which policies govern a model)
//! - Policy evaluation (allow or name the blocking policy)
//! - The lifecycle controller that ties them together
//! - The hash-chained compliance audit log

pub mod audit;
pub mod evaluator;
pub mod lifecycle;
pub mod policies;
mod policy;
pub mod scope;

pub use audit::{AuditFilter, AuditRecorder, ChainVerification, ComplianceLogEntry, ListLimits};
pub use lifecycle::{Actor, LifecycleController, TransitionOutcome, TransitionRequest};
pub use policies::{NewPolicy, PolicyChanges, PolicyFilter, PolicyService};
pub use policy::*;
