use portfolio_site::{
    AppState, CognitoProvider, MemoryRepository, MemorySessionStore, OidcSettings,
    PostgresRepository, SessionManager,
    config::{AppConfig, Env},
    create_router,
    oidc::ProviderState,
    repository::RepositoryState,
    session::SessionStoreState,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects the data store and the
/// identity provider, then serves HTTP.
#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    // Fails fast on any missing identity provider setting.
    let config = AppConfig::load();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "portfolio_site=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            Arc::new(PostgresRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, projects are kept in memory");
            Arc::new(MemoryRepository::new())
        }
    };

    let settings = OidcSettings::from_config(&config)
        .unwrap_or_else(|e| panic!("FATAL: {e}"));
    let provider: ProviderState = Arc::new(
        CognitoProvider::new(settings.clone())
            .expect("FATAL: Failed to build the identity provider HTTP client."),
    );
    let store: SessionStoreState = Arc::new(MemorySessionStore::new());
    tracing::info!(authority = %settings.authority, "identity provider configured");

    let app_state = AppState {
        repo,
        sessions: Arc::new(SessionManager::new(store, provider, settings)),
        config: config.clone(),
    };

    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .expect("FATAL: Failed to bind BIND_ADDR.");

    tracing::info!("Listening on {}", config.bind_addr);
    tracing::info!(
        "API Documentation (Swagger UI) available at: http://{}/swagger-ui",
        config.bind_addr
    );

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated.");
}
