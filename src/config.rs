//! Application configuration module
//!
//! Settings come from built-in defaults overlaid with environment variables
//! (a `.env` file is loaded first when present).

use crate::governance::ListLimits;
use crate::store::StoreSettings;
use serde::Deserialize;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "modelgov-dev-secret-change-in-production";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0),
            port: 3000,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Bearer token verification
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

/// Governance core tuning
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    pub lock_timeout: Duration,
    pub list_limits: ListLimits,
}

impl GovernanceConfig {
    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            lock_timeout: self.lock_timeout,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub governance: GovernanceConfig,
}

/// Flat view of the environment, one field per variable
#[derive(Debug, Deserialize)]
struct RawSettings {
    host: String,
    port: u16,
    allowed_origins: Option<String>,
    jwt_secret: Option<String>,
    lock_timeout_ms: u64,
    audit_default_limit: usize,
    audit_max_limit: usize,
}

impl Settings {
    /// Load settings from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_environment(None)
    }

    /// Load settings from `vars` instead of the process environment
    pub(crate) fn from_environment(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let server_defaults = ServerConfig::default();
        let limits = ListLimits::default();

        let raw: RawSettings = config::Config::builder()
            .set_default("host", server_defaults.host.to_string())?
            .set_default("port", i64::from(server_defaults.port))?
            .set_default("lock_timeout_ms", 5000_i64)?
            .set_default("audit_default_limit", limits.default as i64)?
            .set_default("audit_max_limit", limits.max as i64)?
            .add_source(config::Environment::default().try_parsing(true).source(vars))
            .build()?
            .try_deserialize()?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawSettings) -> Result<Self, ConfigError> {
        let host = raw
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("HOST '{}' is not an IPv4 address", raw.host)))?;

        if raw.audit_default_limit == 0 || raw.audit_default_limit > raw.audit_max_limit {
            return Err(ConfigError::InvalidValue(format!(
                "AUDIT_DEFAULT_LIMIT must be between 1 and AUDIT_MAX_LIMIT ({})",
                raw.audit_max_limit
            )));
        }

        let allowed_origins = raw
            .allowed_origins
            .map(|s| {
                s.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| CorsConfig::default().allowed_origins);

        let jwt_secret = match raw.jwt_secret.filter(|s| !s.trim().is_empty()) {
            Some(secret) => secret,
            None => {
                warn!("JWT_SECRET not set, using development default (INSECURE - set in production!)");
                DEV_JWT_SECRET.to_string()
            }
        };

        Ok(Self {
            server: ServerConfig {
                host,
                port: raw.port,
            },
            cors: CorsConfig { allowed_origins },
            auth: AuthConfig { jwt_secret },
            governance: GovernanceConfig {
                lock_timeout: Duration::from_millis(raw.lock_timeout_ms),
                list_limits: ListLimits {
                    default: raw.audit_default_limit,
                    max: raw.audit_max_limit,
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_default_server_config() {
        let config = ServerConfig::default();
        assert_eq!(config.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(config.port, 3000);
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = Settings::from_environment(vars(&[])).unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.governance.lock_timeout, Duration::from_millis(5000));
        assert_eq!(settings.governance.list_limits.default, 100);
        assert_eq!(settings.governance.list_limits.max, 500);
        assert_eq!(settings.auth.jwt_secret, DEV_JWT_SECRET);
        assert_eq!(settings.cors.allowed_origins, vec!["http://localhost:3001"]);
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_environment(vars(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example"),
            ("JWT_SECRET", "s3cret"),
            ("LOCK_TIMEOUT_MS", "250"),
            ("AUDIT_DEFAULT_LIMIT", "20"),
            ("AUDIT_MAX_LIMIT", "50"),
        ]))
        .unwrap();

        assert_eq!(settings.server.host, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(settings.server.port, 8080);
        assert_eq!(
            settings.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
        assert_eq!(settings.auth.jwt_secret, "s3cret");
        assert_eq!(settings.governance.lock_timeout, Duration::from_millis(250));
        assert_eq!(settings.governance.list_limits.clamp(None), 20);
        assert_eq!(settings.governance.list_limits.clamp(Some(999)), 50);
    }

    #[test]
    fn test_invalid_values_rejected() {
        tokio_test::assert_err!(Settings::from_environment(vars(&[("HOST", "not-an-ip")])));
        tokio_test::assert_err!(Settings::from_environment(vars(&[
            ("AUDIT_DEFAULT_LIMIT", "600"),
            ("AUDIT_MAX_LIMIT", "500"),
        ])));
    }
}
