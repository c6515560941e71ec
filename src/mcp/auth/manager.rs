//! High-level install and authorization manager
//!
//! This module composes discovery, registration, the session store, and the
//! authorization code flow into a single façade used by the HTTP surface and
//! the CLI.
//!
//! - [`AuthManager::discover`] -- streams discovery and registration progress
//!   for a resource address.
//! - [`AuthManager::install`] -- validates and stores a registration the
//!   browser chose to install.
//! - [`AuthManager::begin_authorization`] /
//!   [`AuthManager::complete_authorization`] -- the two halves of the PKCE
//!   authorization code flow.
//! - [`AuthManager::access_token`] -- returns a usable bearer token for an
//!   authorized resource, refreshing it when expired.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use mcp_installer::config::Config;
//! use mcp_installer::mcp::auth::manager::AuthManager;
//!
//! # async fn example() -> mcp_installer::error::Result<()> {
//! let manager = AuthManager::from_config(&Config::default())?;
//! let session = manager.store().create_session().await?;
//! let _url = manager.begin_authorization(&session, "http://localhost:8080").await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use url::Url;

use crate::config::Config;
use crate::error::{InstallerError, Result};
use crate::mcp::auth::flow::{CallbackParams, OAuthFlow};
use crate::mcp::auth::orchestrator::{Discoverer, DiscoveryEvent, ProgressReporter};
use crate::mcp::auth::registration::{ClientInfo, ClientRegistration, Registrar};
use crate::mcp::auth::store::{InMemorySessionStore, SessionId, SessionStore};
use crate::mcp::auth::tokens::TokenSet;

// ---------------------------------------------------------------------------
// AuthStatus
// ---------------------------------------------------------------------------

/// Install and authorization state of one resource in one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub resource: String,
    pub installed: bool,
    pub authorized: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// AuthManager
// ---------------------------------------------------------------------------

/// Coordinator for the install and token lifecycle.
///
/// `AuthManager` owns a shared HTTP client, the [`SessionStore`], a
/// [`Discoverer`], and an [`OAuthFlow`]. It is cheap to share behind an
/// `Arc`; all mutable state lives in the store.
pub struct AuthManager {
    store: Arc<dyn SessionStore>,
    discoverer: Discoverer,
    flow: OAuthFlow,
}

impl AuthManager {
    /// Creates a manager from its parts.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client for every outbound request.
    /// * `store` - Session store for registrations, transactions, and tokens.
    /// * `client_name` - Name sent during dynamic client registration.
    /// * `redirect_uri` - Callback URI registered with every client.
    /// * `timeout` - Registration request timeout.
    pub fn new(
        http: Arc<reqwest::Client>,
        store: Arc<dyn SessionStore>,
        client_name: &str,
        redirect_uri: &str,
        timeout: Duration,
    ) -> Self {
        let registrar = Registrar::new(http.clone(), client_name, redirect_uri, timeout);
        Self {
            discoverer: Discoverer::new(http.clone(), registrar),
            flow: OAuthFlow::new(http, store.clone(), redirect_uri),
            store,
        }
    }

    /// Creates a manager with an [`InMemorySessionStore`] and an HTTP client
    /// configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Http`] if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(InstallerError::from)?;

        let store = Arc::new(InMemorySessionStore::new(
            config.transaction_ttl(),
            config.session_ttl(),
        ));

        Ok(Self::new(
            Arc::new(http),
            store,
            &config.client.client_name,
            &config.redirect_uri(),
            config.request_timeout(),
        ))
    }

    /// The session store shared with the flow
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Starts discovery of `address` and returns its progress stream.
    ///
    /// Nothing is persisted; see [`Discoverer::spawn`].
    pub fn discover(&self, address: &str) -> ReceiverStream<DiscoveryEvent> {
        tracing::info!("Discovering {}", address);
        self.discoverer.spawn(address)
    }

    /// Runs discovery of `address` in the current task.
    pub async fn discover_and_register(
        &self,
        address: &str,
        progress: &ProgressReporter,
    ) -> Result<ClientInfo> {
        self.discoverer.discover_and_register(address, progress).await
    }

    /// Validates an install payload and stores it as the session's
    /// registration for its resource, replacing any earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::Validation`] when the payload is not a
    /// complete, well-formed [`ClientInfo`]. Nothing is stored in that case.
    pub async fn install(
        &self,
        session: &SessionId,
        payload: serde_json::Value,
    ) -> Result<ClientRegistration> {
        let info: ClientInfo = serde_json::from_value(payload)
            .map_err(|e| InstallerError::Validation(e.to_string()))?;
        let registration = ClientRegistration::try_from(info)?;

        self.store
            .save_registration(session, registration.clone())
            .await?;
        tracing::info!(
            "Installed {} ({})",
            registration.resource.display_name,
            registration.resource.resource_id
        );
        Ok(registration)
    }

    /// See [`OAuthFlow::begin_authorization`]
    pub async fn begin_authorization(&self, session: &SessionId, resource: &str) -> Result<Url> {
        self.flow.begin_authorization(session, resource).await
    }

    /// See [`OAuthFlow::complete_authorization`]
    pub async fn complete_authorization(
        &self,
        session: &SessionId,
        params: CallbackParams,
    ) -> Result<(String, TokenSet)> {
        self.flow.complete_authorization(session, params).await
    }

    /// Returns a valid access token for `resource`.
    ///
    /// An expired token is refreshed when a refresh token is available.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::NotAuthorized`] when there is no token set, or it
    ///   is expired without a refresh token
    /// - [`InstallerError::NotFound`] when a refresh is needed but the
    ///   registration is gone
    /// - [`InstallerError::TokenExchange`] when the refresh fails
    pub async fn access_token(&self, session: &SessionId, resource: &str) -> Result<String> {
        let tokens = self
            .store
            .load_token_set(session, resource)
            .await?
            .ok_or_else(|| InstallerError::NotAuthorized(resource.to_string()))?;

        if !tokens.is_expired() {
            return Ok(tokens.access_token);
        }

        if tokens.refresh_token.is_none() {
            return Err(InstallerError::NotAuthorized(resource.to_string()).into());
        }

        let registration = self
            .store
            .load_registration(session, resource)
            .await?
            .ok_or_else(|| InstallerError::NotFound(resource.to_string()))?;

        tracing::debug!("Access token for {} expired, refreshing", resource);
        let refreshed = self.flow.refresh(session, &registration, &tokens).await?;
        Ok(refreshed.access_token)
    }

    /// Reports whether `resource` is installed and authorized in `session`.
    pub async fn status(&self, session: &SessionId, resource: &str) -> Result<AuthStatus> {
        let installed = self
            .store
            .load_registration(session, resource)
            .await?
            .is_some();
        let tokens = self.store.load_token_set(session, resource).await?;

        Ok(AuthStatus {
            resource: resource.to_string(),
            installed,
            authorized: tokens
                .as_ref()
                .is_some_and(|t| !t.is_expired() || t.refresh_token.is_some()),
            expires_at: tokens.and_then(|t| t.expires_at),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
