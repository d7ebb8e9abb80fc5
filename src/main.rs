use anyhow::{Context, Result};
use graph_bridge::api::{create_oauth_router, run_state_cleanup, OAuthAppState};
use graph_bridge::config::{load_config, BridgeConfig, SessionBackend};
use graph_bridge::session::{MemorySessionStore, SessionStore, SqliteSessionStore};
use graph_bridge::{AuthOutcome, TokenManager};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "graph_bridge=info".into()),
        )
        .init();

    info!("Graph bridge starting...");

    // TOML file when GRAPH_BRIDGE_CONFIG is set, environment otherwise
    let config = match std::env::var("GRAPH_BRIDGE_CONFIG") {
        Ok(path) => load_config(&path).with_context(|| format!("Failed to load {}", path))?,
        Err(_) => BridgeConfig::from_env(),
    };
    config.validate()?;

    info!(
        tenant = %config.microsoft.tenant_id,
        backend = ?config.session.backend,
        port = config.server.port,
        auth_enabled = config.server.auth_enabled,
        "Configuration loaded"
    );

    let store: Arc<dyn SessionStore> = match config.session.backend {
        SessionBackend::Memory => Arc::new(MemorySessionStore::new()),
        SessionBackend::Sqlite => Arc::new(
            SqliteSessionStore::new(&config.session.database)
                .context("Failed to initialize session store")?,
        ),
    };
    info!("Session store initialized");

    let tokens = Arc::new(TokenManager::from_config(&config, store)?);

    // Log authentication outcomes (payloads stay sealed)
    let mut outcomes = tokens.subscribe();
    tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(AuthOutcome::Succeeded { session, .. }) => {
                    info!(session = %session, "Authentication succeeded");
                }
                Ok(AuthOutcome::Failed { session, .. }) => {
                    warn!(session = ?session, "Authentication failed");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Outcome listener lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let oauth_state = OAuthAppState::from_config(Arc::clone(&tokens), &config);
    let cleanup_handle = tokio::spawn(run_state_cleanup(
        oauth_state.state_manager.clone(),
        config.session.state_cleanup_interval_seconds,
    ));

    let router = create_oauth_router(oauth_state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.port))
        .await
        .context("Failed to bind HTTP port")?;
    info!(port = config.server.port, "HTTP API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    cleanup_handle.abort();
    info!("Graph bridge stopped");

    Ok(())
}
