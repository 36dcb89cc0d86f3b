//! Heritage - Historic sites administration backend

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use heritage::{
    api::{self, AppState},
    cache::create_cache,
    config::Config,
    db::{
        self,
        repositories::{
            SqlxFavoriteRepository, SqlxFlagRepository, SqlxImageRepository,
            SqlxModificationRepository, SqlxReviewRepository, SqlxRoleRepository,
            SqlxSessionRepository, SqlxSiteRepository, SqlxTagRepository, SqlxUserRepository,
        },
    },
    services::{
        FlagService, GoogleAuthService, ImageService, ReviewService, SiteService, TagService,
        TokenService, UserService,
    },
    storage::LocalStorage,
    views::Views,
};

/// How often expired admin sessions are purged
const SESSION_PURGE_INTERVAL_SECS: u64 = 300;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heritage=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Heritage...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed ({} applied)", applied);

    let report = db::seeds::run_seeds(&pool, &config.seed).await?;
    tracing::info!(
        "Seeds completed: {} roles, {} permissions, {} flags",
        report.roles,
        report.permissions,
        report.flags
    );
    if report.admin_created {
        tracing::info!("Bootstrap administrator created");
    }

    // Initialize cache
    let cache = create_cache(&config.cache).await?;
    tracing::info!("Cache initialized");

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let role_repo = SqlxRoleRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let site_repo = SqlxSiteRepository::boxed(pool.clone());
    let tag_repo = SqlxTagRepository::boxed(pool.clone());
    let image_repo = SqlxImageRepository::boxed(pool.clone());
    let review_repo = SqlxReviewRepository::boxed(pool.clone());
    let modification_repo = SqlxModificationRepository::boxed(pool.clone());
    let favorite_repo = SqlxFavoriteRepository::boxed(pool.clone());
    let flag_repo = SqlxFlagRepository::boxed(pool.clone());

    let storage = LocalStorage::boxed(&config.storage);

    // Initialize services
    let user_service = Arc::new(
        UserService::new(user_repo, role_repo, session_repo)
            .with_session_expiration(config.auth.session_expiration_minutes),
    );
    let site_service = Arc::new(
        SiteService::new(
            site_repo.clone(),
            tag_repo.clone(),
            image_repo.clone(),
            review_repo.clone(),
            modification_repo,
            favorite_repo,
        )
        .with_cache(cache.clone()),
    );
    let tag_service = Arc::new(TagService::new(tag_repo).with_cache(cache.clone()));
    let flag_service = Arc::new(FlagService::new(flag_repo, cache.clone()));
    let image_service = Arc::new(ImageService::new(
        image_repo,
        site_repo.clone(),
        storage,
        config.storage.clone(),
    ));
    let review_service = Arc::new(ReviewService::new(review_repo, site_repo));
    let tokens = Arc::new(TokenService::from_config(&config.auth));
    let google = Arc::new(GoogleAuthService::new(config.google.clone())?);
    if !google.is_enabled() {
        tracing::warn!("Google sign-in is not configured");
    }
    let views = Arc::new(Views::new()?);

    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        user_service: user_service.clone(),
        site_service,
        tag_service,
        flag_service,
        image_service,
        review_service,
        tokens,
        google,
        views,
    };

    // Purge expired admin sessions in the background
    {
        let users = user_service.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(tokio::time::Duration::from_secs(SESSION_PURGE_INTERVAL_SECS));
            loop {
                interval.tick().await;
                match users.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(purged) => tracing::debug!("Purged {} expired sessions", purged),
                    Err(e) => tracing::warn!("Failed to purge expired sessions: {}", e),
                }
            }
        });
    }

    // Build router
    let app = api::build_router(state)?;

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
