//! gitdoc waitlist server binary.

use gitdoc_server::config::Config;
use gitdoc_server::{app, AppState};
use gitdoc_store::DocStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gitdoc_server=debug,gitdoc_store=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!(
        owner = %config.store.owner,
        repo = %config.store.repo,
        "Starting gitdoc server on {}:{}",
        config.host,
        config.port
    );
    if config.smtp_endpoint.is_none() {
        tracing::warn!("SMTP_ENDPOINT not set, subscription notifications are disabled");
    }

    let store = DocStore::new(config.store.clone())?;
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(store, config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
