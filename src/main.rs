use std::env;
use std::sync::Arc;

use sea_orm::Database;
use sea_orm_migration::MigratorTrait;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tokenflow_backend::config::AppConfig;
use tokenflow_backend::jobs::validation_poller::{
    start_validation_poller_job, PollerConfig, ValidationPoller,
};
use tokenflow_backend::services::credential_store::CredentialStore;
use tokenflow_backend::services::intents::IntentService;
use tokenflow_backend::services::ledger::{HttpLedgerClient, LedgerClient};
use tokenflow_backend::services::signer_locks::SignerLocks;
use tokenflow_backend::services::step_executor::{ExecutorConfig, StepExecutor};
use tokenflow_backend::{router, AppState};

#[tokio::main]
async fn main() {
    // Initialize tracing; LOG_LEVEL feeds the default filter.
    let default_filter = format!(
        "{},sqlx=warn",
        env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_filter)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().expect("Invalid process configuration");

    // Connect to database
    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    tracing::info!("Running migrations...");
    migration::Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    tracing::info!(network = %config.network, "Connecting ledger client");
    let ledger: Arc<dyn LedgerClient> = Arc::new(HttpLedgerClient::new(config.network));

    let credentials = Arc::new(CredentialStore::new(
        db.clone(),
        config.master_key,
        config.issuer_seed.clone(),
        config.secret_cache_ttl,
    ));
    let signer_locks = Arc::new(SignerLocks::new());

    let executor = Arc::new(StepExecutor::new(
        db.clone(),
        ledger.clone(),
        credentials.clone(),
        signer_locks.clone(),
        ExecutorConfig {
            poll_interval: config.validation_poll_interval,
            inline_timeout: config.validation_timeout,
        },
    ));
    let intents = Arc::new(IntentService::new(db.clone(), executor));

    // Background reconciliation of in-flight submissions
    let poller = Arc::new(ValidationPoller::new(
        db.clone(),
        ledger.clone(),
        PollerConfig {
            sweep_interval: config.poller_sweep_interval,
            ..PollerConfig::default()
        },
    ));
    start_validation_poller_job(poller).await;

    let state = AppState {
        db,
        ledger,
        credentials,
        signer_locks,
        intents,
    };

    // Configure CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!("Server listening on {}", listener.local_addr().unwrap());

    axum::serve(listener, app).await.expect("Server failed");
}
