use async_trait::async_trait;
use deadpool_redis::Pool as RedisPool;
use redis::AsyncCommands;
use shared::{Result, SurveyConfig};
use tracing::debug;

use super::DraftCache;
use crate::cache_key;
use crate::domains::survey::models::AnswerMap;

/// Drafts in Redis with a TTL, so abandoned sessions expire on their own.
///
/// A server-side cache is shared by every device, so keys can be scoped to
/// one device: `survey_draft:<slug>:<scope>`.
#[derive(Clone)]
pub struct RedisDraftCache {
    redis_pool: RedisPool,
    ttl_seconds: u64,
    scope: Option<String>,
}

impl RedisDraftCache {
    pub fn new(redis_pool: RedisPool, ttl_seconds: u64) -> Self {
        Self {
            redis_pool,
            ttl_seconds,
            scope: None,
        }
    }

    pub fn from_config(redis_pool: RedisPool, config: &SurveyConfig) -> Self {
        Self::new(redis_pool, config.draft_ttl_seconds)
    }

    /// Same pool, keys namespaced to one device or participant.
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..self.clone()
        }
    }

    fn key(&self, slug: &str) -> String {
        cache_key::survey_draft_for(slug, self.scope.as_deref())
    }
}

#[async_trait]
impl DraftCache for RedisDraftCache {
    async fn load(&self, slug: &str) -> Result<Option<AnswerMap>> {
        let key = self.key(slug);
        let mut conn = self.redis_pool.get().await?;
        let cached: Option<String> = conn.get(&key).await?;

        match cached {
            Some(data) => {
                debug!("Draft cache hit for key: {}", key);
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, slug: &str, answers: &AnswerMap) -> Result<()> {
        let key = self.key(slug);
        let serialized = serde_json::to_string(answers)?;
        let mut conn = self.redis_pool.get().await?;
        let _: () = conn.set_ex(&key, serialized, self.ttl_seconds).await?;
        debug!("Draft cached with key: {} ({} answers)", key, answers.len());
        Ok(())
    }

    async fn clear(&self, slug: &str) -> Result<()> {
        let key = self.key(slug);
        let mut conn = self.redis_pool.get().await?;
        let _: () = conn.del(&key).await?;
        Ok(())
    }
}
