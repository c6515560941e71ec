//! Dynamic Client Registration (RFC 7591)
//!
//! The [`Registrar`] registers this client with an authorization server for
//! one [`Protocol`]. It discovers the server's metadata with the protocol's
//! well-known document, POSTs the client metadata to the advertised
//! `registration_endpoint`, and normalizes the response.
//!
//! A registration is turned into a [`ClientRegistration`] once scopes are
//! negotiated, and travels to and from the browser as a [`ClientInfo`].

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{InstallerError, Result};
use crate::mcp::auth::discovery::{
    fetch_authorization_server_metadata, AuthorizationServerMetadata, ResourceDescriptor,
};

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

/// Discovery protocol used to find the authorization server's endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// OpenID Connect Discovery 1.0
    Oidc,
    /// OAuth 2.0 Authorization Server Metadata (RFC 8414)
    Oauth2,
}

impl Protocol {
    /// Wire label, `oidc` or `oauth2`
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Oidc => "oidc",
            Protocol::Oauth2 => "oauth2",
        }
    }

    /// Label used in progress messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Protocol::Oidc => "OIDC",
            Protocol::Oauth2 => "OAuth2",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Client metadata POSTed to the registration endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    pub client_name: String,
    pub redirect_uris: Vec<String>,
    pub grant_types: Vec<String>,
    pub response_types: Vec<String>,
    pub token_endpoint_auth_method: String,
}

impl RegistrationRequest {
    /// Builds the request for a confidential web client using
    /// `client_secret_post` and the authorization code grant.
    pub fn new(client_name: &str, redirect_uri: &str) -> Self {
        Self {
            client_name: client_name.to_string(),
            redirect_uris: vec![redirect_uri.to_string()],
            grant_types: vec![
                "authorization_code".to_string(),
                "refresh_token".to_string(),
            ],
            response_types: vec!["code".to_string()],
            token_endpoint_auth_method: "client_secret_post".to_string(),
        }
    }
}

/// Raw registration endpoint response.
#[derive(Debug, Clone, Deserialize)]
struct RegistrationResponse {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    client_secret_expires_at: Option<u64>,
}

/// A client registered with one authorization server.
#[derive(Debug, Clone)]
pub struct RegisteredClient {
    /// Protocol whose discovery document located the registration endpoint
    pub protocol: Protocol,

    /// Issued client identifier
    pub client_id: String,

    /// Issued client secret, if any
    pub client_secret: Option<String>,

    /// Secret expiry as seconds since the epoch; `0` means it never expires
    pub client_secret_expires_at: u64,

    /// The authorization server metadata used for the registration
    pub server: AuthorizationServerMetadata,
}

// ---------------------------------------------------------------------------
// Registrar
// ---------------------------------------------------------------------------

/// Performs dynamic client registration against an authorization server.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use mcp_installer::mcp::auth::registration::{Protocol, Registrar};
///
/// # async fn example() -> mcp_installer::error::Result<()> {
/// let registrar = Registrar::new(
///     Arc::new(reqwest::Client::new()),
///     "Basic Chat Client",
///     "http://localhost:3000/auth/callback",
///     Duration::from_secs(5),
/// );
/// let client = registrar.register("http://localhost:8081", Protocol::Oidc).await?;
/// println!("client id: {}", client.client_id);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Registrar {
    http: Arc<reqwest::Client>,
    client_name: String,
    redirect_uri: String,
    timeout: Duration,
}

impl Registrar {
    /// Creates a registrar that registers under `client_name` with a single
    /// redirect URI.
    pub fn new(
        http: Arc<reqwest::Client>,
        client_name: impl Into<String>,
        redirect_uri: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            client_name: client_name.into(),
            redirect_uri: redirect_uri.into(),
            timeout,
        }
    }

    /// Registers this client with the authorization server at `issuer`.
    ///
    /// # Arguments
    ///
    /// * `issuer` - Issuer of the authorization server protecting the resource.
    /// * `protocol` - Which discovery document locates the registration
    ///   endpoint.
    ///
    /// # Errors
    ///
    /// Every failure is reported as [`InstallerError::Registration`] tagged
    /// with `protocol`: discovery failure, missing `registration_endpoint`,
    /// non-success status, malformed body, or missing `client_id`. The
    /// registrar never retries.
    pub async fn register(&self, issuer: &str, protocol: Protocol) -> Result<RegisteredClient> {
        self.try_register(issuer, protocol).await.map_err(|e| {
            tracing::debug!("{} registration against {} failed: {:#}", protocol, issuer, e);
            InstallerError::Registration {
                protocol: protocol.to_string(),
                message: format!("{e:#}"),
            }
            .into()
        })
    }

    async fn try_register(&self, issuer: &str, protocol: Protocol) -> Result<RegisteredClient> {
        let server = fetch_authorization_server_metadata(&self.http, issuer, protocol).await?;

        let registration_endpoint = server
            .registration_endpoint
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("no registration_endpoint in server metadata"))?;
        let registration_endpoint = Url::parse(registration_endpoint)
            .map_err(|e| anyhow::anyhow!("invalid registration_endpoint: {}", e))?;

        let body = RegistrationRequest::new(&self.client_name, &self.redirect_uri);
        tracing::debug!(
            "Registering {} at {} ({})",
            self.client_name,
            registration_endpoint,
            protocol
        );

        let resp = self
            .http
            .post(registration_endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("registration request failed: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("registration endpoint returned {}: {}", status, text);
        }

        let raw: RegistrationResponse = resp
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("failed to parse registration response: {}", e))?;

        let client_id = raw
            .client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| anyhow::anyhow!("registration response has no client_id"))?;

        Ok(RegisteredClient {
            protocol,
            client_id,
            client_secret: raw.client_secret,
            client_secret_expires_at: raw.client_secret_expires_at.unwrap_or(0),
            server,
        })
    }
}

// ---------------------------------------------------------------------------
// ClientRegistration / ClientInfo
// ---------------------------------------------------------------------------

/// The stored result of an install: one registration per resource per
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub protocol: Protocol,
    /// Negotiated scopes, ordered and free of duplicates
    pub scopes_supported: Vec<String>,
    pub resource: ResourceDescriptor,
}

/// camelCase wire form of a [`ClientRegistration`].
///
/// This is what the terminal discovery event carries and what the browser
/// sends back to `/auth/install`. Every field is required.
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::registration::ClientInfo;
///
/// let info: ClientInfo = serde_json::from_value(serde_json::json!({
///     "name": "Todo API",
///     "authorizationServer": "http://localhost:8081",
///     "scopesSupported": ["openid", "profile"],
///     "resource": "http://localhost:8080",
///     "clientId": "abc",
///     "clientSecret": "shh",
///     "protocol": "oidc"
/// }))
/// .unwrap();
/// assert_eq!(info.client_id, "abc");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub authorization_server: String,
    pub scopes_supported: Vec<String>,
    pub resource: String,
    pub client_id: String,
    pub client_secret: String,
    pub protocol: Protocol,
}

impl From<&ClientRegistration> for ClientInfo {
    fn from(registration: &ClientRegistration) -> Self {
        Self {
            name: registration.resource.display_name.clone(),
            authorization_server: registration.resource.authorization_server_issuer.clone(),
            scopes_supported: registration.scopes_supported.clone(),
            resource: registration.resource.resource_id.clone(),
            client_id: registration.client_id.clone(),
            client_secret: registration.client_secret.clone(),
            protocol: registration.protocol,
        }
    }
}

/// Checks that `value` is an absolute URL with a host
fn require_absolute_url(field: &str, value: &str) -> Result<()> {
    match Url::parse(value) {
        Ok(url) if !url.cannot_be_a_base() && url.host_str().is_some() => Ok(()),
        _ => Err(InstallerError::Validation(format!(
            "{field} must be an absolute URL, got {value:?}"
        ))
        .into()),
    }
}

impl TryFrom<ClientInfo> for ClientRegistration {
    type Error = anyhow::Error;

    /// Validates an install payload. Fails with
    /// [`InstallerError::Validation`].
    fn try_from(info: ClientInfo) -> Result<Self> {
        require_absolute_url("resource", &info.resource)?;
        require_absolute_url("authorizationServer", &info.authorization_server)?;
        if info.client_id.is_empty() {
            return Err(InstallerError::Validation("clientId must not be empty".to_string()).into());
        }
        if info.client_secret.is_empty() {
            return Err(
                InstallerError::Validation("clientSecret must not be empty".to_string()).into(),
            );
        }

        let mut scopes_supported: Vec<String> = Vec::with_capacity(info.scopes_supported.len());
        for scope in info.scopes_supported {
            if !scopes_supported.contains(&scope) {
                scopes_supported.push(scope);
            }
        }

        Ok(Self {
            client_id: info.client_id,
            client_secret: info.client_secret,
            protocol: info.protocol,
            resource: ResourceDescriptor {
                resource_id: info.resource,
                display_name: info.name,
                authorization_server_issuer: info.authorization_server,
                scopes_supported: Some(scopes_supported.clone()),
            },
            scopes_supported,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
