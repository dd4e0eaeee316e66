use dotenvy::dotenv;
use license_core::{
    Clock, SystemClock,
    adapters::{PostgresStore, Stores},
};
use license_server::{AppState, config::Config, create_app};
use rand::{Rng, distr::Alphanumeric};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const GENERATED_PASSWORD_LEN: usize = 24;

#[tokio::main]
async fn main() {
    // Load .env first so RUST_LOG from it reaches the filter.
    dotenv().ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
    }

    info!("Starting license server v{}...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run().await {
        error!("License server stopped: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    let config = Config::from_env()?;

    let stores = match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(
                url,
                config.database_max_connections,
                config.store_timeout,
            )
            .await?;
            info!("Applying database migrations...");
            store.migrate().await?;
            info!("Connected to Postgres");
            Stores::postgres(store)
        }
        None => {
            warn!("DATABASE_URL not set; running on in-memory stores, state is lost on restart");
            Stores::in_memory(config.access_log_capacity)
        }
    };

    if config.legacy_admin_secret.is_some() {
        warn!("LEGACY_ADMIN_SECRET is set; the shared-secret admin fallback is deprecated");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let app_state = AppState::new(
        stores,
        clock,
        config.legacy_admin_secret.clone(),
        config.heartbeat_window,
    );
    bootstrap_creator(&app_state, config.creator_password.clone()).await?;

    let app = create_app(app_state);

    let listener = TcpListener::bind(config.bind_addr).await?;
    info!("License server listening on {}", config.bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("License server shut down");
    Ok(())
}

/// Ensures the creator account exists. A generated password is printed once,
/// only when it was actually stored.
async fn bootstrap_creator(app_state: &AppState, configured: Option<String>) -> Result<(), BoxError> {
    let generated = configured.is_none();
    let password = configured.unwrap_or_else(|| {
        rand::rng()
            .sample_iter(Alphanumeric)
            .take(GENERATED_PASSWORD_LEN)
            .map(char::from)
            .collect()
    });

    if app_state.accounts.bootstrap_creator(&password).await? && generated {
        warn!(
            "Creator account created with generated password {password}; set CREATOR_PASSWORD or store it now, it will not be shown again"
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        // Without a signal handler, run until killed.
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
