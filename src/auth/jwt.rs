//! JWT verification

use crate::auth::Role;
use crate::error::AppError;
use crate::governance::Actor;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// User role
    #[serde(default)]
    pub role: Role,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

impl Claims {
    /// The user recorded on audit entries and violations
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.sub.clone(),
            display_name: self.name.clone(),
        }
    }
}

/// Decode and validate a JWT token
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::Unauthorized("Token expired".to_string())
        }
        jsonwebtoken::errors::ErrorKind::InvalidToken => {
            AppError::Unauthorized("Invalid token".to_string())
        }
        _ => AppError::Unauthorized(format!("Token validation failed: {}", e)),
    })?;

    Ok(token_data.claims)
}

/// Sign a token the way the identity provider does
#[cfg(test)]
pub fn issue_token(secret: &str, sub: &str, role: Role, ttl_minutes: i64) -> String {
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    let now = Utc::now();
    let claims = Claims {
        sub: sub.to_string(),
        name: None,
        role,
        exp: (now + Duration::minutes(ttl_minutes)).timestamp(),
        iat: now.timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .expect("token encodes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let token = issue_token("secret", "user-7", Role::Developer, 15);
        let claims = decode_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-7");
        assert_eq!(claims.role, Role::Developer);
        assert_eq!(claims.actor().user_id, "user-7");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("secret", "user-7", Role::Admin, 15);
        assert!(matches!(
            decode_token(&token, "other"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token("secret", "user-7", Role::Admin, -10);
        match decode_token(&token, "secret") {
            Err(AppError::Unauthorized(msg)) => assert_eq!(msg, "Token expired"),
            other => panic!("expected expiry, got {:?}", other.map(|c| c.sub)),
        }
    }
}
