//! Authentication middleware
//!
//! Extracts and validates JWT tokens from requests.

use crate::auth::{decode_token, Claims, Role};
use crate::error::AppError;
use crate::state::SharedState;
use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Verify the bearer token and attach its claims to the request
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".to_string()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization format".to_string()))?;

    let claims = decode_token(token, &state.jwt_secret)?;

    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}

/// Require specific role
pub fn require_role(claims: &Claims, required: Role) -> Result<(), AppError> {
    let has_permission = match required {
        Role::Viewer => true,
        Role::Developer => claims.role.can_register(),
        Role::Admin => claims.role.can_govern(),
    };

    if !has_permission {
        return Err(AppError::Forbidden(format!(
            "Requires {} role, you have {}",
            required, claims.role
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(role: Role) -> Claims {
        Claims {
            sub: "u".into(),
            name: None,
            role,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn test_role_hierarchy() {
        assert!(require_role(&claims(Role::Viewer), Role::Viewer).is_ok());
        assert!(require_role(&claims(Role::Viewer), Role::Developer).is_err());
        assert!(require_role(&claims(Role::Developer), Role::Developer).is_ok());
        assert!(require_role(&claims(Role::Developer), Role::Admin).is_err());
        assert!(matches!(
            require_role(&claims(Role::Developer), Role::Admin),
            Err(AppError::Forbidden(_))
        ));
        assert!(require_role(&claims(Role::Admin), Role::Developer).is_ok());
    }
}
