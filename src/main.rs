use quickr::{
    app,
    auth::session::SessionManager,
    config::{validate_production_config, AppConfig},
    db,
    middleware::rate_limit::IpRateLimiter,
    repositories::{SqliteInvitationRepository, SqliteUserRepository},
    services::{auth_service::AuthService, email_service::create_mailer},
    AppState,
};

use std::{net::SocketAddr, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quickr=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    validate_production_config(&config)?;
    tracing::info!(environment = %config.environment, "Configuration loaded");

    // Database connection
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Initialize repositories
    let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));
    let invitation_repository = Arc::new(SqliteInvitationRepository::new(pool.clone()));

    // Initialize services
    let mailer = Arc::from(create_mailer(&config.mailer));
    let auth_service = Arc::new(AuthService::new(
        user_repository,
        invitation_repository,
        mailer,
        &config.auth,
    ));

    // Create app state
    let app_state = AppState {
        auth_service,
        session_manager: Arc::new(SessionManager::new(&config.session)),
        rate_limiter: Arc::new(IpRateLimiter::new(config.login_rate_per_minute)),
        config: Arc::new(config.clone()),
    };

    let app = app::build_router(app_state);

    // Start server
    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>()?, config.port));

    tracing::info!("Server running on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
