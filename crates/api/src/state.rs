use std::sync::Arc;

use agora_domain::detail::PostDetailService;
use agora_domain::engagement::EngagementService;
use agora_domain::idempotency::{IdempotencyConfig, IdempotencyService, InMemoryIdempotencyStore};
use agora_domain::karma::KarmaLedgerService;
use agora_domain::leaderboard::{LeaderboardQuery, LeaderboardService};
use agora_domain::ports::db::DbAdapter;
use agora_domain::ports::engagement::EngagementRepository;
use agora_domain::ports::idempotency::IdempotencyStore;
use agora_domain::ports::karma::KarmaLedgerRepository;
use agora_domain::ports::threads::ThreadRepository;
use agora_domain::threads::ThreadService;
use agora_infra::config::AppConfig;
use agora_infra::db::{DbConfig, MemoryAdapter, SurrealAdapter, connect};
use agora_infra::idempotency::RedisIdempotencyStore;
use agora_infra::repositories::{InMemoryCommunityStore, SurrealCommunityStore};

const IDEMPOTENCY_PREFIX: &str = "agora:idemp";

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub idempotency: IdempotencyService,
    pub db: Arc<dyn DbAdapter>,
    pub thread_repo: Arc<dyn ThreadRepository>,
    pub engagement_repo: Arc<dyn EngagementRepository>,
    pub karma_repo: Arc<dyn KarmaLedgerRepository>,
}

impl AppState {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let store: Arc<dyn IdempotencyStore> = if config.uses_redis_idempotency() {
            Arc::new(RedisIdempotencyStore::connect(&config.redis_url).await?)
        } else {
            Arc::new(InMemoryIdempotencyStore::new(IDEMPOTENCY_PREFIX))
        };

        if config.uses_surreal() {
            let db_config = DbConfig::from_app_config(&config);
            let client = connect(&db_config).await?;
            let adapter = SurrealAdapter::new(db_config, client.clone());
            adapter.ensure_schema().await?;
            let community = Arc::new(SurrealCommunityStore::with_client(client));
            tracing::info!(backend = adapter.name(), "storage backend ready");
            return Ok(Self::assemble(
                config,
                store,
                Arc::new(adapter),
                community.clone(),
                community.clone(),
                community,
            ));
        }

        tracing::info!(backend = MemoryAdapter.name(), "storage backend ready");
        Ok(Self::with_idempotency_store(config, store))
    }

    /// In-memory storage with the given idempotency store.
    pub fn with_idempotency_store(config: AppConfig, store: Arc<dyn IdempotencyStore>) -> Self {
        let community = Arc::new(InMemoryCommunityStore::new());
        Self::assemble(
            config,
            store,
            Arc::new(MemoryAdapter),
            community.clone(),
            community.clone(),
            community,
        )
    }

    fn assemble(
        config: AppConfig,
        store: Arc<dyn IdempotencyStore>,
        db: Arc<dyn DbAdapter>,
        thread_repo: Arc<dyn ThreadRepository>,
        engagement_repo: Arc<dyn EngagementRepository>,
        karma_repo: Arc<dyn KarmaLedgerRepository>,
    ) -> Self {
        Self {
            config,
            idempotency: IdempotencyService::new(store, IdempotencyConfig::default()),
            db,
            thread_repo,
            engagement_repo,
            karma_repo,
        }
    }

    pub fn threads(&self) -> ThreadService {
        ThreadService::new(self.thread_repo.clone())
    }

    pub fn engagement(&self) -> EngagementService {
        EngagementService::new(self.engagement_repo.clone())
    }

    pub fn karma(&self) -> KarmaLedgerService {
        KarmaLedgerService::new(self.karma_repo.clone())
    }

    pub fn leaderboard(&self) -> LeaderboardService {
        LeaderboardService::new(self.karma_repo.clone())
    }

    pub fn post_details(&self) -> PostDetailService {
        PostDetailService::new(self.threads(), self.engagement())
    }

    pub fn leaderboard_defaults(&self) -> LeaderboardQuery {
        LeaderboardQuery {
            window_hours: self.config.leaderboard_window_hours,
            limit: self.config.leaderboard_limit,
        }
    }
}
