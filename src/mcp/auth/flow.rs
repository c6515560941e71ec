//! Authorization code flow with PKCE
//!
//! This module drives the two halves of the browser-based OAuth 2.0
//! authorization code flow with PKCE (RFC 7636) and resource indicators
//! (RFC 8707) for an installed resource.
//!
//! # Flow overview
//!
//! 1. [`OAuthFlow::begin_authorization`] loads the session's registration for
//!    the resource, discovers the authorization server endpoints with the
//!    registration's protocol, generates a PKCE pair and a `state` nonce,
//!    stores them as the session's pending transaction, and returns the
//!    authorization URL to redirect the browser to.
//! 2. The authorization server redirects the browser back to the callback.
//! 3. [`OAuthFlow::complete_authorization`] consumes the pending transaction,
//!    exchanges the code for tokens, and stores the token set.
//!
//! # References
//!
//! - RFC 6749 <https://www.rfc-editor.org/rfc/rfc6749>
//! - RFC 7636 PKCE <https://www.rfc-editor.org/rfc/rfc7636>
//! - RFC 8707 Resource Indicators <https://www.rfc-editor.org/rfc/rfc8707>

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use serde::Deserialize;
use url::Url;

use crate::error::{InstallerError, Result};
use crate::mcp::auth::discovery::{fetch_authorization_server_metadata, AuthorizationServerMetadata};
use crate::mcp::auth::pkce;
use crate::mcp::auth::registration::{ClientRegistration, Protocol};
use crate::mcp::auth::store::{PendingAuthorization, SessionId, SessionStore};
use crate::mcp::auth::tokens::{TokenResponse, TokenSet};

// ---------------------------------------------------------------------------
// CallbackParams
// ---------------------------------------------------------------------------

/// Query parameters of the authorization server's redirect back to us.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

// ---------------------------------------------------------------------------
// OAuthFlow
// ---------------------------------------------------------------------------

/// Drives the authorization code flow for installed resources.
///
/// `OAuthFlow` holds no per-request state of its own; the pending
/// transaction and the resulting token set live in the [`SessionStore`].
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use chrono::Duration;
/// use mcp_installer::mcp::auth::flow::OAuthFlow;
/// use mcp_installer::mcp::auth::store::{InMemorySessionStore, SessionStore};
///
/// # async fn example() -> mcp_installer::error::Result<()> {
/// let store = Arc::new(InMemorySessionStore::new(Duration::minutes(10), Duration::hours(24)));
/// let flow = OAuthFlow::new(
///     Arc::new(reqwest::Client::new()),
///     store.clone(),
///     "http://localhost:3000/auth/callback",
/// );
///
/// let session = store.create_session().await?;
/// let url = flow.begin_authorization(&session, "http://localhost:8080").await?;
/// println!("redirect to {}", url);
/// # Ok(())
/// # }
/// ```
pub struct OAuthFlow {
    http: Arc<reqwest::Client>,
    store: Arc<dyn SessionStore>,
    redirect_uri: String,
}

impl OAuthFlow {
    /// Creates a flow that redirects back to `redirect_uri`.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client for all authorization requests.
    /// * `store` - Session store holding registrations, transactions, and
    ///   token sets.
    /// * `redirect_uri` - The callback URI registered with every client.
    pub fn new(
        http: Arc<reqwest::Client>,
        store: Arc<dyn SessionStore>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            http,
            store,
            redirect_uri: redirect_uri.into(),
        }
    }

    /// The callback URI sent as `redirect_uri`
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Starts an authorization for `resource` in `session`.
    ///
    /// Any earlier pending transaction of the session is replaced.
    ///
    /// # Returns
    ///
    /// The authorization endpoint URL to redirect the browser to.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::NotFound`] when the session has no registration
    ///   for `resource`
    /// - [`InstallerError::MetadataFetch`] when the authorization server
    ///   metadata cannot be retrieved
    pub async fn begin_authorization(&self, session: &SessionId, resource: &str) -> Result<Url> {
        let registration = self
            .store
            .load_registration(session, resource)
            .await?
            .ok_or_else(|| InstallerError::NotFound(resource.to_string()))?;

        let server = self.server_metadata(&registration).await.map_err(|e| {
            InstallerError::MetadataFetch {
                url: registration.resource.authorization_server_issuer.clone(),
                reason: format!("{e:#}"),
            }
        })?;

        let pkce = pkce::generate();
        let state = generate_state();
        let url = build_authorization_url(
            &server,
            &registration,
            &self.redirect_uri,
            &pkce.challenge,
            &state,
        )?;

        self.store
            .put_transaction(
                session,
                PendingAuthorization::new(pkce.verifier, resource, state),
            )
            .await?;

        tracing::info!(
            "Starting {} authorization for {} at {}",
            registration.protocol,
            resource,
            server.authorization_endpoint
        );
        Ok(url)
    }

    /// Completes the authorization the session started.
    ///
    /// The pending transaction is consumed by every call, successful or not,
    /// so a replayed callback fails with [`InstallerError::NoTransaction`].
    ///
    /// # Returns
    ///
    /// The resource id and the token set stored for it.
    ///
    /// # Errors
    ///
    /// - [`InstallerError::NoTransaction`] when there is no live transaction
    ///   or `state` does not match it
    /// - [`InstallerError::NotFound`] when the registration has disappeared
    /// - [`InstallerError::TokenExchange`] when the authorization server
    ///   reported an error, no code was returned, or the exchange failed
    pub async fn complete_authorization(
        &self,
        session: &SessionId,
        params: CallbackParams,
    ) -> Result<(String, TokenSet)> {
        let pending = self
            .store
            .take_transaction(session)
            .await?
            .ok_or(InstallerError::NoTransaction)?;

        if params.state.as_deref() != Some(pending.state.as_str()) {
            tracing::warn!("Callback state does not match the pending transaction");
            return Err(InstallerError::NoTransaction.into());
        }

        let resource = pending.resource_id;
        let registration = self
            .store
            .load_registration(session, &resource)
            .await?
            .ok_or_else(|| InstallerError::NotFound(resource.clone()))?;

        if let Some(error) = params.error {
            let detail = match params.error_description {
                Some(description) => format!("{error}: {description}"),
                None => error,
            };
            return Err(InstallerError::TokenExchange(detail).into());
        }

        let code = params
            .code
            .filter(|code| !code.is_empty())
            .ok_or_else(|| {
                InstallerError::TokenExchange("authorization code missing from callback".to_string())
            })?;

        let server = self
            .server_metadata(&registration)
            .await
            .map_err(|e| InstallerError::TokenExchange(format!("{e:#}")))?;

        let tokens = self
            .exchange_code(&server, &registration, &code, &pending.code_verifier)
            .await?;

        self.store
            .save_token_set(session, &resource, tokens.clone())
            .await?;
        tracing::info!("Authorized for {}", resource);
        Ok((resource, tokens))
    }

    /// Exchanges the refresh token of `tokens` for a new token set and stores
    /// it.
    ///
    /// The previous refresh token is kept when the server does not rotate it.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::NotAuthorized`] when `tokens` has no refresh
    /// token and [`InstallerError::TokenExchange`] when the refresh fails.
    pub async fn refresh(
        &self,
        session: &SessionId,
        registration: &ClientRegistration,
        tokens: &TokenSet,
    ) -> Result<TokenSet> {
        let refresh_token = tokens.refresh_token.as_deref().ok_or_else(|| {
            InstallerError::NotAuthorized(registration.resource.resource_id.clone())
        })?;

        let server = self
            .server_metadata(registration)
            .await
            .map_err(|e| InstallerError::TokenExchange(format!("{e:#}")))?;

        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &registration.client_id);
        params.insert("client_secret", &registration.client_secret);
        params.insert("resource", &registration.resource.resource_id);

        let mut refreshed = self.post_token_request(&server, &params).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = tokens.refresh_token.clone();
        }

        self.store
            .save_token_set(session, &registration.resource.resource_id, refreshed.clone())
            .await?;
        tracing::info!("Refreshed token for {}", registration.resource.resource_id);
        Ok(refreshed)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    async fn server_metadata(
        &self,
        registration: &ClientRegistration,
    ) -> Result<AuthorizationServerMetadata> {
        fetch_authorization_server_metadata(
            &self.http,
            &registration.resource.authorization_server_issuer,
            registration.protocol,
        )
        .await
    }

    /// Exchanges an authorization code for tokens at the token endpoint.
    async fn exchange_code(
        &self,
        server: &AuthorizationServerMetadata,
        registration: &ClientRegistration,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenSet> {
        let mut params: HashMap<&str, &str> = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", &self.redirect_uri);
        params.insert("code_verifier", code_verifier);
        params.insert("client_id", &registration.client_id);
        params.insert("client_secret", &registration.client_secret);
        params.insert("resource", &registration.resource.resource_id);

        let tokens = self.post_token_request(server, &params).await?;

        if registration.protocol == Protocol::Oidc && tokens.id_token.is_none() {
            return Err(InstallerError::TokenExchange(
                "id_token expected for an OIDC client".to_string(),
            )
            .into());
        }

        Ok(tokens)
    }

    async fn post_token_request(
        &self,
        server: &AuthorizationServerMetadata,
        params: &HashMap<&str, &str>,
    ) -> Result<TokenSet> {
        let resp = self
            .http
            .post(&server.token_endpoint)
            .form(params)
            .send()
            .await
            .map_err(|e| InstallerError::TokenExchange(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(InstallerError::TokenExchange(format!(
                "token endpoint returned {status}: {body}"
            ))
            .into());
        }

        let raw: TokenResponse = resp.json().await.map_err(|e| {
            InstallerError::TokenExchange(format!("failed to parse token response: {e}"))
        })?;

        raw.into_token_set()
    }
}

// ---------------------------------------------------------------------------
// Utility functions
// ---------------------------------------------------------------------------

/// Generates a random `state` nonce.
///
/// 16 random bytes encoded as base64url without padding.
fn generate_state() -> String {
    use rand::RngCore as _;
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Builds the authorization URL with all required query parameters.
///
/// The resource is sent both as `resource` (RFC 8707) and as `audience`,
/// and scopes are space-joined in negotiated order.
pub fn build_authorization_url(
    server: &AuthorizationServerMetadata,
    registration: &ClientRegistration,
    redirect_uri: &str,
    code_challenge: &str,
    state: &str,
) -> Result<Url> {
    let mut url = Url::parse(&server.authorization_endpoint).map_err(|e| {
        InstallerError::MetadataFetch {
            url: server.issuer.clone(),
            reason: format!("invalid authorization endpoint URL: {e}"),
        }
    })?;

    let resource = registration.resource.resource_id.as_str();
    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", &registration.client_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", &registration.scopes_supported.join(" "))
        .append_pair("state", state)
        .append_pair("code_challenge", code_challenge)
        .append_pair("code_challenge_method", pkce::CHALLENGE_METHOD)
        .append_pair("audience", resource)
        .append_pair("resource", resource);

    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
