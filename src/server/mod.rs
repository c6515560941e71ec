//! HTTP surface of the installer
//!
//! - [`routes`] -- the axum router and handlers
//! - [`session`] -- session cookie middleware

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::error::{InstallerError, Result};
use crate::mcp::auth::manager::AuthManager;

pub mod routes;
pub mod session;

pub use routes::create_router;

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<AuthManager>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(manager: AuthManager, config: Config) -> Self {
        Self {
            manager: Arc::new(manager),
            config: Arc::new(config),
        }
    }

    /// Builds the state, with an in-memory session store, from `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let manager = AuthManager::from_config(&config)?;
        Ok(Self::new(manager, config))
    }
}

/// Binds `server.bind_address` and serves until the process is stopped.
///
/// A background task purges idle sessions and stale transactions.
pub async fn serve(config: Config) -> Result<()> {
    let bind_address = config.server.bind_address.clone();
    let state = AppState::from_config(config)?;

    let purge_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match purge_state.manager.store().purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!("Purged {} expired sessions", removed),
                Err(e) => tracing::warn!("Session purge failed: {:#}", e),
            }
        }
    });

    let listener = TcpListener::bind(&bind_address).await.map_err(|e| {
        InstallerError::Config(format!("Failed to bind {}: {}", bind_address, e))
    })?;
    tracing::info!(
        "Installer listening on {} (redirect URI {})",
        bind_address,
        state.config.redirect_uri()
    );

    axum::serve(listener, create_router(state))
        .await
        .map_err(InstallerError::from)?;
    Ok(())
}
