use shared::{create_redis_pool, Config, DatabaseService, SurveyConfig};
use std::sync::Arc;
use tracing::info;

use crate::cache::{DraftCache, MemoryDraftCache, RedisDraftCache};
use crate::db::{MemoryStore, PgSurveyStore, SurveyStore};
use crate::domains::identity::{FingerprintSource, Identity, IdentityResolver};
use crate::domains::rewards::{NoopFileFetcher, RedemptionCodeGenerator, RewardAllocator, RewardFileFetcher};
use crate::domains::survey::{Campaign, FlowController, SessionProfile};

/// Where drafts live. Shared backends are namespaced per device fingerprint so
/// two participants never see each other's answers.
#[derive(Clone)]
enum DraftBackend {
    Memory(MemoryDraftCache),
    Redis(RedisDraftCache),
    /// Already scoped to one device by the host.
    Device(Arc<dyn DraftCache>),
}

impl DraftBackend {
    fn for_identity(&self, identity: &Identity) -> Arc<dyn DraftCache> {
        match self {
            Self::Memory(cache) => Arc::new(cache.scoped(&identity.fingerprint_id)),
            Self::Redis(cache) => Arc::new(cache.scoped(&identity.fingerprint_id)),
            Self::Device(cache) => cache.clone(),
        }
    }
}

/// Shared collaborators for every survey session of a process.
#[derive(Clone)]
pub struct SurveyEngine {
    config: SurveyConfig,
    store: Arc<dyn SurveyStore>,
    drafts: DraftBackend,
    fetcher: Arc<dyn RewardFileFetcher>,
    resolver: IdentityResolver,
}

impl SurveyEngine {
    pub fn new(config: SurveyConfig, store: Arc<dyn SurveyStore>) -> Self {
        Self {
            resolver: IdentityResolver::from_config(&config),
            config,
            store,
            drafts: DraftBackend::Memory(MemoryDraftCache::new()),
            fetcher: Arc::new(NoopFileFetcher),
        }
    }

    /// Everything in process memory; nothing survives a restart.
    pub fn in_memory(config: SurveyConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// PostgreSQL for responses and redemptions, Redis for drafts.
    pub async fn connect(config: &Config) -> shared::Result<Self> {
        let database = DatabaseService::new(&config.database).await?;
        let store = PgSurveyStore::from_service(database);
        store.migrate().await?;

        let redis_pool = create_redis_pool(&config.redis).await?;
        let drafts = RedisDraftCache::from_config(redis_pool, &config.survey);

        info!("Survey engine connected (environment: {})", config.app.environment);
        Ok(Self::new(config.survey.clone(), Arc::new(store)).with_redis_drafts(drafts))
    }

    pub fn with_redis_drafts(mut self, drafts: RedisDraftCache) -> Self {
        self.drafts = DraftBackend::Redis(drafts);
        self
    }

    /// Use a cache that already belongs to a single device.
    pub fn with_device_drafts(mut self, drafts: Arc<dyn DraftCache>) -> Self {
        self.drafts = DraftBackend::Device(drafts);
        self
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn RewardFileFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn SurveyStore> {
        self.store.clone()
    }

    pub fn drafts_for(&self, identity: &Identity) -> Arc<dyn DraftCache> {
        self.drafts.for_identity(identity)
    }

    pub fn allocator(&self) -> RewardAllocator {
        RewardAllocator::new(
            self.store.clone(),
            RedemptionCodeGenerator::from_config(&self.config),
            self.fetcher.clone(),
        )
    }

    pub async fn resolve_identity(
        &self,
        source: &dyn FingerprintSource,
        user_id: Option<String>,
    ) -> Identity {
        self.resolver.resolve(source, user_id).await
    }

    /// A controller for an identity the host already resolved.
    pub fn flow(
        &self,
        campaign: Arc<Campaign>,
        identity: Identity,
        profile: SessionProfile,
    ) -> FlowController {
        let drafts = self.drafts_for(&identity);
        FlowController::new(
            campaign,
            identity,
            profile,
            self.config.clone(),
            self.store.clone(),
            drafts,
            self.allocator(),
        )
    }

    /// Resolve the identity, then build the controller. Call `start()` on it.
    pub async fn begin_session(
        &self,
        campaign: Arc<Campaign>,
        source: &dyn FingerprintSource,
        user_id: Option<String>,
        profile: SessionProfile,
    ) -> FlowController {
        let identity = self.resolve_identity(source, user_id).await;
        self.flow(campaign, identity, profile)
    }
}
