// ============================================================================
// DRAFT CACHE - in-progress answers between sessions
// ============================================================================

pub mod memory;
pub mod redis_cache;

use async_trait::async_trait;
use shared::Result;

use crate::domains::survey::models::AnswerMap;

pub use memory::MemoryDraftCache;
pub use redis_cache::RedisDraftCache;

/// Key-value store for unsubmitted answers, keyed by campaign slug.
///
/// Callers treat every operation as best-effort: a failing cache never blocks
/// a participant.
#[async_trait]
pub trait DraftCache: Send + Sync {
    async fn load(&self, slug: &str) -> Result<Option<AnswerMap>>;
    async fn save(&self, slug: &str, answers: &AnswerMap) -> Result<()>;
    async fn clear(&self, slug: &str) -> Result<()>;
}
