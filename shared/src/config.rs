//! Configuration management for the survey engine and its backing services

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub survey: SurveyConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub idle_timeout_seconds: u64,
    pub max_lifetime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: usize,
    pub connection_timeout_seconds: u64,
}

/// Knobs of the participant flow and the reward allocator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    /// Upper bound for device fingerprint derivation before the fallback token is used.
    pub identity_timeout_ms: u64,
    /// Prefix of client-generated redemption codes (`AXE-7QZT`).
    pub redemption_code_prefix: String,
    /// Lifetime of a cached draft answer map.
    pub draft_ttl_seconds: u64,
    /// Profile roles that must pick a role to impersonate before answering.
    pub system_roles: Vec<String>,
    /// Responses submitted by authenticated profiles are flagged as test data.
    pub authenticated_is_test: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            identity_timeout_ms: 2000,
            redemption_code_prefix: "AXE".to_string(),
            draft_ttl_seconds: 7 * 24 * 3600,
            system_roles: vec!["admin".to_string()],
            authenticated_is_test: true,
        }
    }
}

impl SurveyConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        Ok(SurveyConfig {
            identity_timeout_ms: env::var("IDENTITY_TIMEOUT_MS")
                .unwrap_or_else(|_| defaults.identity_timeout_ms.to_string())
                .parse()?,
            redemption_code_prefix: env::var("REDEMPTION_CODE_PREFIX")
                .unwrap_or(defaults.redemption_code_prefix),
            draft_ttl_seconds: env::var("DRAFT_TTL_SECONDS")
                .unwrap_or_else(|_| defaults.draft_ttl_seconds.to_string())
                .parse()?,
            system_roles: env::var("SYSTEM_ROLES")
                .map(|raw| parse_list(&raw))
                .unwrap_or(defaults.system_roles),
            authenticated_is_test: env::var("AUTHENTICATED_IS_TEST")
                .unwrap_or_else(|_| defaults.authenticated_is_test.to_string())
                .parse()?,
        })
    }

    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }

    pub fn is_system_role(&self, role: &str) -> bool {
        self.system_roles.iter().any(|r| r == role)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "postgresql://localhost:5432/axe_survey".to_string()),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()?,
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()?,
                acquire_timeout_seconds: env::var("DATABASE_ACQUIRE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                idle_timeout_seconds: env::var("DATABASE_IDLE_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()?,
                max_lifetime_seconds: env::var("DATABASE_MAX_LIFETIME_SECONDS")
                    .unwrap_or_else(|_| "1800".to_string())
                    .parse()?,
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                pool_size: env::var("REDIS_POOL_SIZE")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()?,
                connection_timeout_seconds: env::var("REDIS_CONNECTION_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
            },
            survey: SurveyConfig::from_env()?,
            app: AppConfig {
                environment: env::var("ENVIRONMENT")
                    .unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "info".to_string()),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.app.environment == "production"
    }
}
