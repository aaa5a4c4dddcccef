use async_trait::async_trait;
use dashmap::DashMap;
use shared::Result;
use std::sync::Arc;

use super::DraftCache;
use crate::cache_key;
use crate::domains::survey::models::AnswerMap;

/// Process-local drafts. Entries live until cleared.
///
/// Scoped handles share one map, so a cleared device leaves nothing behind.
#[derive(Clone, Default)]
pub struct MemoryDraftCache {
    store: Arc<DashMap<String, AnswerMap>>,
    scope: Option<String>,
}

impl MemoryDraftCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle over the same map with keys namespaced to `scope`.
    pub fn scoped(&self, scope: impl Into<String>) -> Self {
        Self {
            store: self.store.clone(),
            scope: Some(scope.into()),
        }
    }

    /// Drafts held across every scope.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn key(&self, slug: &str) -> String {
        cache_key::survey_draft_for(slug, self.scope.as_deref())
    }
}

#[async_trait]
impl DraftCache for MemoryDraftCache {
    async fn load(&self, slug: &str) -> Result<Option<AnswerMap>> {
        Ok(self
            .store
            .get(&self.key(slug))
            .map(|entry| entry.value().clone()))
    }

    async fn save(&self, slug: &str, answers: &AnswerMap) -> Result<()> {
        self.store.insert(self.key(slug), answers.clone());
        Ok(())
    }

    async fn clear(&self, slug: &str) -> Result<()> {
        self.store.remove(&self.key(slug));
        Ok(())
    }
}
