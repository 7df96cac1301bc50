//! Authentication and authorization module
//!
//! Bearer JWTs identify the acting user and carry a role. Tokens are issued
//! by an external identity provider; this service only verifies them.

mod jwt;
mod middleware;

pub use jwt::{decode_token, Claims};
#[cfg(test)]
pub use jwt::issue_token;
pub use middleware::{auth_middleware, require_role};

use serde::{Deserialize, Serialize};

/// User roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access to the registry, policies, and audit log
    Viewer,
    /// Can register models, versions, and metrics and request transitions
    Developer,
    /// Can manage policies and organizations and approve models
    Admin,
}

impl Role {
    pub fn can_register(&self) -> bool {
        matches!(self, Role::Developer | Role::Admin)
    }

    pub fn can_govern(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Viewer
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Viewer => write!(f, "viewer"),
            Role::Developer => write!(f, "developer"),
            Role::Admin => write!(f, "admin"),
        }
    }
}
