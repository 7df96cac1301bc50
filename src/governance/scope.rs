//! Scope Resolver
//!
//! Picks the policies that govern a model. Every applicable, active policy is
//! returned; there is no precedence between scopes.

use crate::governance::policy::{AppliesTo, Policy};
use crate::registry::Model;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeResolver;

impl ScopeResolver {
    pub fn new() -> Self {
        Self
    }

    /// Applicable active policies, ordered by policy id ascending
    pub fn resolve(&self, model: &Model, policies: &[Policy]) -> Vec<Policy> {
        let mut applicable: Vec<Policy> = policies
            .iter()
            .filter(|policy| policy.applies_to(model))
            .cloned()
            .collect();
        applicable.sort_by_key(|policy| policy.id);

        debug!(
            "Resolved {} of {} policies for model {}",
            applicable.len(),
            policies.len(),
            model.id
        );
        applicable
    }
}
