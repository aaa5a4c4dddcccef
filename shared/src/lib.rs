//! Shared infrastructure for the survey engine
//!
//! - Configuration loaded from the environment
//! - PostgreSQL pool setup
//! - Redis pool setup
//! - Infrastructure error type

pub mod cache;
pub mod config;
pub mod database;
pub mod error;

// Re-export commonly used types
pub use cache::create_redis_pool;
pub use config::{Config, DatabaseConfig, RedisConfig, SurveyConfig};
pub use database::DatabaseService;
pub use error::{AppError, Result};
