use pinvault::{
    admin::StaticCredentials,
    config::AppConfig,
    store,
    vault::Vault,
    web::{self, AppState},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional; values there become PINVAULT_* overrides
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting PinVault v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!(
        "Configuration loaded: pin_size={}, max_expire={}s, max_pin_attempts={}",
        config.vault.pin_size, config.vault.max_expire_secs, config.vault.max_pin_attempts
    );

    let store = store::connect(&config.store)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to store: {}", e))?;

    let vault = Vault::new(store, &config.vault, &config.store.key_prefix);
    let admin = StaticCredentials::new(&config.admin.login, &config.admin.password);
    let app = web::create_router(AppState::new(vault, admin));

    let listener = TcpListener::bind(&config.server.listen).await?;
    info!("Listening on http://{}", config.server.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "pinvault=debug,tower_http=debug".into());

    // LOG_FORMAT=json for log shippers
    if std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
