mod config;

use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use warbler_api::{AppState, AppStateInner};
use warbler_crypto::Credentials;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warbler=debug,warbler_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.uses_dev_secret() {
        warn!("WARBLER_SESSION_SECRET is not set; sessions are signed with the development secret");
    }

    let db = warbler_db::Database::open(&config.db_path)?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        credentials: Credentials::default(),
        session_secret: config.session_secret.clone(),
        session_days: config.session_days,
    });

    let app = warbler_api::router(state).layer(TraceLayer::new_for_http());

    let addr = config.addr()?;
    info!("Warbler listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Could not install SIGTERM handler: {}", e);
                    ctrl_c.await.ok();
                    info!("Received Ctrl+C, shutting down...");
                    return;
                }
            };
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
