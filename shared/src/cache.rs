//! Redis connection pool shared by cache-backed services

use crate::{config::RedisConfig, error::AppError, Result};
use deadpool_redis::{Config as PoolConfig, Pool, PoolConfig as PoolSizing, Runtime, Timeouts};
use std::time::Duration;
use tracing::info;

/// Build an async Redis pool and verify it answers a PING.
pub async fn create_redis_pool(config: &RedisConfig) -> Result<Pool> {
    info!("Initializing Redis pool (size {})", config.pool_size);

    let timeout = Duration::from_secs(config.connection_timeout_seconds);
    let mut pool_config = PoolConfig::from_url(config.url.as_str());
    pool_config.pool = Some(PoolSizing {
        max_size: config.pool_size,
        timeouts: Timeouts {
            wait: Some(timeout),
            create: Some(timeout),
            recycle: Some(timeout),
        },
        ..Default::default()
    });

    let pool = pool_config
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| AppError::configuration(format!("Failed to create Redis pool: {}", e)))?;

    let mut conn = pool.get().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;

    info!("Redis pool initialized successfully");
    Ok(pool)
}
