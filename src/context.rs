/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    db,
    error::SkeinResult,
    feed::FeedComposer,
    graph::FollowStore,
    identity::UserStore,
    mailer::Mailer,
    notifications::NotificationEngine,
    rate_limit::RateLimiter,
    realtime::Gateway,
    replies::{ReplyService, ReplyTreeBuilder},
    settings::SettingsStore,
    threads::ThreadService,
    visibility::VisibilityResolver,
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub users: Arc<UserStore>,
    pub settings: Arc<SettingsStore>,
    pub visibility: Arc<VisibilityResolver>,
    pub follows: Arc<FollowStore>,
    pub feed: Arc<FeedComposer>,
    pub threads: Arc<ThreadService>,
    pub replies: Arc<ReplyService>,
    pub tree: Arc<ReplyTreeBuilder>,
    pub notifications: Arc<NotificationEngine>,
    pub gateway: Arc<Gateway>,
    pub mailer: Arc<Mailer>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> SkeinResult<Self> {
        config.validate()?;

        // Create data directory if it doesn't exist
        if !config.storage.data_directory.exists() {
            tokio::fs::create_dir_all(&config.storage.data_directory).await?;
        }

        let pool = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&pool).await?;
        db::test_connection(&pool).await?;

        Self::from_pool(config, pool)
    }

    /// Wire services over an existing pool. Test suites use this with an
    /// in-memory database.
    pub fn from_pool(config: ServerConfig, pool: SqlitePool) -> SkeinResult<Self> {
        let users = Arc::new(UserStore::new(pool.clone()));
        let settings = Arc::new(SettingsStore::new(pool.clone()));
        let visibility = Arc::new(VisibilityResolver::new(pool.clone()));
        let gateway = Arc::new(Gateway::new());
        let mailer = Arc::new(Mailer::new(config.email.clone())?);

        let notifications = Arc::new(NotificationEngine::new(
            pool.clone(),
            Arc::clone(&settings),
            Arc::clone(&users),
            Arc::clone(&gateway),
            Arc::clone(&mailer),
        ));

        let follows = Arc::new(FollowStore::new(
            pool.clone(),
            Arc::clone(&users),
            Arc::clone(&notifications),
        ));

        let feed = Arc::new(FeedComposer::new(
            pool.clone(),
            Arc::clone(&users),
            Arc::clone(&follows),
            Arc::clone(&visibility),
        ));

        let threads = Arc::new(ThreadService::new(
            pool.clone(),
            Arc::clone(&visibility),
            Arc::clone(&notifications),
            Arc::clone(&gateway),
        ));

        let replies = Arc::new(ReplyService::new(
            pool.clone(),
            Arc::clone(&visibility),
            Arc::clone(&notifications),
            Arc::clone(&gateway),
        ));

        let tree = Arc::new(ReplyTreeBuilder::new(
            pool.clone(),
            Arc::clone(&users),
            Arc::clone(&visibility),
            Arc::clone(&notifications),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Ok(Self {
            config: Arc::new(config),
            db: pool,
            users,
            settings,
            visibility,
            follows,
            feed,
            threads,
            replies,
            tree,
            notifications,
            gateway,
            mailer,
            rate_limiter,
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.public_url
    }
}
