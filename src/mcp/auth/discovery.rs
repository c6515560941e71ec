//! OAuth 2.0 resource and authorization server discovery
//!
//! This module implements RFC 9728 Protected Resource Metadata discovery and
//! RFC 8414 / OpenID Connect Discovery to locate the authorization server that
//! protects an MCP resource before dynamic client registration runs.
//!
//! # Discovery sequence
//!
//! 1. [`metadata_url`] derives the RFC 9728 well-known URI from the origin of
//!    the resource address.
//! 2. [`discover_resource`] retrieves that document and validates it into a
//!    [`ResourceDescriptor`].
//! 3. The registrar calls [`fetch_authorization_server_metadata`] with the
//!    single authorization server issuer and the protocol being attempted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{InstallerError, Result};
use crate::mcp::auth::registration::Protocol;

/// Well-known path of the protected resource metadata document
const PROTECTED_RESOURCE_PATH: &str = "/.well-known/oauth-protected-resource";

/// Well-known path of the OpenID Connect discovery document
const OPENID_CONFIGURATION_PATH: &str = "/.well-known/openid-configuration";

/// Well-known path of the RFC 8414 authorization server metadata document
const OAUTH_AUTHORIZATION_SERVER_PATH: &str = "/.well-known/oauth-authorization-server";

// ---------------------------------------------------------------------------
// Protected Resource Metadata (RFC 9728)
// ---------------------------------------------------------------------------

/// Metadata document describing a protected OAuth 2.0 resource.
///
/// Retrieved from `<origin>/.well-known/oauth-protected-resource`.
///
/// # References
///
/// - RFC 9728 <https://www.rfc-editor.org/rfc/rfc9728>
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::discovery::ProtectedResourceMetadata;
///
/// let json = r#"{
///     "resource": "http://localhost:8080",
///     "authorization_servers": ["http://localhost:8081"]
/// }"#;
///
/// let meta: ProtectedResourceMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.resource, "http://localhost:8080");
/// assert_eq!(meta.authorization_servers.len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtectedResourceMetadata {
    /// The identifier of the protected resource itself.
    pub resource: String,

    /// Human-readable name of the resource, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    /// Authorization server issuer URIs that protect this resource.
    #[serde(default)]
    pub authorization_servers: Vec<String>,

    /// OAuth scopes supported by this resource, if advertised.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// Supported methods for presenting bearer tokens (e.g. `"header"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_methods_supported: Option<Vec<String>>,

    /// Additional metadata fields not explicitly modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A validated description of a protected resource.
///
/// Produced by [`discover_resource`] and never modified afterwards. The
/// `resource_id` is the address string the caller asked for, byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// The resource address, exactly as requested and as declared by the
    /// resource's metadata.
    pub resource_id: String,

    /// `resource_name` from the metadata, or the resource id.
    pub display_name: String,

    /// Issuer of the one authorization server protecting the resource.
    pub authorization_server_issuer: String,

    /// Scopes the resource advertised, if any.
    pub scopes_supported: Option<Vec<String>>,
}

impl ResourceDescriptor {
    /// Returns true when the resource advertised at least one scope
    pub fn has_scopes(&self) -> bool {
        self.scopes_supported
            .as_ref()
            .is_some_and(|scopes| !scopes.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Authorization Server Metadata (RFC 8414 / OIDC Discovery)
// ---------------------------------------------------------------------------

/// Metadata document describing an OAuth 2.0 / OIDC authorization server.
///
/// # References
///
/// - RFC 8414 <https://www.rfc-editor.org/rfc/rfc8414>
/// - OpenID Connect Discovery 1.0 <https://openid.net/specs/openid-connect-discovery-1_0.html>
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::discovery::AuthorizationServerMetadata;
///
/// let json = r#"{
///     "issuer": "https://auth.example.com",
///     "authorization_endpoint": "https://auth.example.com/authorize",
///     "token_endpoint": "https://auth.example.com/token",
///     "registration_endpoint": "https://auth.example.com/register"
/// }"#;
///
/// let meta: AuthorizationServerMetadata = serde_json::from_str(json).unwrap();
/// assert_eq!(meta.issuer, "https://auth.example.com");
/// assert!(meta.registration_endpoint.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// The issuer identifier URI for this authorization server.
    pub issuer: String,

    /// The URL of the authorization endpoint (RFC 6749 section 3.1).
    pub authorization_endpoint: String,

    /// The URL of the token endpoint (RFC 6749 section 3.2).
    pub token_endpoint: String,

    /// URL of the Dynamic Client Registration endpoint (RFC 7591).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// OAuth scopes the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// `response_type` values the server supports (e.g. `["code"]`).
    #[serde(default)]
    pub response_types_supported: Vec<String>,

    /// `grant_type` values the server supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// PKCE challenge methods the server supports (e.g. `["S256"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Additional server metadata fields not explicitly modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Discovery helpers
// ---------------------------------------------------------------------------

/// Builds the protected resource metadata URL for a resource address.
///
/// Path, query, and fragment of the address are discarded; the document
/// always lives at the root of the resource's origin.
///
/// # Errors
///
/// Returns [`InstallerError::MetadataFetch`] when `resource` is not an
/// absolute URL with a host.
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::discovery::metadata_url;
///
/// let url = metadata_url("http://localhost:8080/mcp?x=1#top").unwrap();
/// assert_eq!(
///     url.as_str(),
///     "http://localhost:8080/.well-known/oauth-protected-resource"
/// );
/// ```
pub fn metadata_url(resource: &str) -> Result<Url> {
    let mut url = Url::parse(resource).map_err(|e| InstallerError::MetadataFetch {
        url: resource.to_string(),
        reason: format!("invalid resource address: {e}"),
    })?;

    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(InstallerError::MetadataFetch {
            url: resource.to_string(),
            reason: "resource address has no host".to_string(),
        }
        .into());
    }

    url.set_path(PROTECTED_RESOURCE_PATH);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// Fetches the RFC 9728 Protected Resource Metadata document for a resource.
///
/// # Arguments
///
/// * `http` - Shared [`reqwest::Client`] used to issue the discovery request.
/// * `resource` - The resource address as entered by the user.
///
/// # Errors
///
/// Returns [`InstallerError::MetadataFetch`] on a transport failure, a
/// non-success status, or a body that is not a metadata document.
pub async fn fetch_protected_resource_metadata(
    http: &reqwest::Client,
    resource: &str,
) -> Result<ProtectedResourceMetadata> {
    let url = metadata_url(resource)?;
    tracing::debug!("Fetching protected resource metadata from {}", url);

    let fetch_error = |reason: String| InstallerError::MetadataFetch {
        url: url.to_string(),
        reason,
    };

    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| fetch_error(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        return Err(fetch_error(
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.as_u16().to_string()),
        )
        .into());
    }

    let meta: ProtectedResourceMetadata = resp
        .json()
        .await
        .map_err(|e| fetch_error(format!("invalid metadata document: {e}")))?;

    Ok(meta)
}

/// Validates a protected resource metadata document against the requested
/// resource address.
///
/// Checks run in a fixed order so the first violated rule is the one
/// reported. A document without scopes is accepted with a warning.
pub(crate) fn validate_resource_metadata(
    resource: &str,
    meta: ProtectedResourceMetadata,
) -> Result<ResourceDescriptor> {
    if meta.resource != resource {
        return Err(InstallerError::ResourceMismatch {
            expected: resource.to_string(),
            actual: meta.resource,
        }
        .into());
    }

    if meta.authorization_servers.is_empty() {
        return Err(InstallerError::UnsupportedResource(
            "no authorization servers found".to_string(),
        )
        .into());
    }

    let has_scopes = meta
        .scopes_supported
        .as_ref()
        .is_some_and(|scopes| !scopes.is_empty());
    if !has_scopes {
        tracing::warn!("No scopes found in resource metadata for {}", resource);
    }

    if meta.authorization_servers.len() > 1 {
        return Err(InstallerError::UnsupportedResource(
            "this client doesn't support multiple authorization servers".to_string(),
        )
        .into());
    }

    let header_supported = meta
        .bearer_methods_supported
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .any(|m| m == "header");
    if !header_supported {
        return Err(InstallerError::UnsupportedResource(
            "this client only supports the 'header' bearer method".to_string(),
        )
        .into());
    }

    let display_name = meta
        .resource_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| resource.to_string());
    let authorization_server_issuer = meta
        .authorization_servers
        .into_iter()
        .next()
        .unwrap_or_default();

    Ok(ResourceDescriptor {
        resource_id: resource.to_string(),
        display_name,
        authorization_server_issuer,
        scopes_supported: meta.scopes_supported,
    })
}

/// Discovers and validates the protected resource at `resource`.
///
/// # Arguments
///
/// * `http` - Shared [`reqwest::Client`].
/// * `resource` - The resource address; it must equal the `resource` field of
///   the fetched document exactly.
///
/// # Returns
///
/// A [`ResourceDescriptor`] naming the single authorization server.
///
/// # Errors
///
/// - [`InstallerError::MetadataFetch`] when the document cannot be retrieved
/// - [`InstallerError::ResourceMismatch`] when the document names another
///   resource
/// - [`InstallerError::UnsupportedResource`] when there is not exactly one
///   authorization server or the `header` bearer method is not supported
///
/// # Examples
///
/// ```no_run
/// use mcp_installer::mcp::auth::discovery::discover_resource;
///
/// # async fn example() -> mcp_installer::error::Result<()> {
/// let http = reqwest::Client::new();
/// let descriptor = discover_resource(&http, "http://localhost:8080").await?;
/// println!("auth server: {}", descriptor.authorization_server_issuer);
/// # Ok(())
/// # }
/// ```
pub async fn discover_resource(http: &reqwest::Client, resource: &str) -> Result<ResourceDescriptor> {
    let meta = fetch_protected_resource_metadata(http, resource).await?;
    let descriptor = validate_resource_metadata(resource, meta)?;
    tracing::info!(
        "Discovered resource {} protected by {}",
        descriptor.resource_id,
        descriptor.authorization_server_issuer
    );
    Ok(descriptor)
}

/// Builds the well-known authorization server metadata URL for `protocol`.
///
/// - `Oidc` appends the discovery path to the issuer:
///   `<issuer>/.well-known/openid-configuration`
/// - `Oauth2` inserts it between origin and issuer path (RFC 8414 section 3.1):
///   `<origin>/.well-known/oauth-authorization-server<issuer path>`
pub fn authorization_server_metadata_url(issuer: &Url, protocol: Protocol) -> Url {
    let path = issuer.path().trim_end_matches('/');
    let well_known_path = match protocol {
        Protocol::Oidc => format!("{}{}", path, OPENID_CONFIGURATION_PATH),
        Protocol::Oauth2 => format!("{}{}", OAUTH_AUTHORIZATION_SERVER_PATH, path),
    };

    let mut url = issuer.clone();
    url.set_path(&well_known_path);
    url.set_query(None);
    url.set_fragment(None);
    url
}

/// Compares two issuer identifiers ignoring a trailing slash
fn issuers_match(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Fetches the authorization server metadata document for one protocol.
///
/// # Arguments
///
/// * `http` - Shared [`reqwest::Client`].
/// * `issuer` - The issuer URI from the protected resource metadata.
/// * `protocol` - Which discovery document to request.
///
/// # Errors
///
/// Returns an `anyhow::Error` describing the failure: an invalid issuer, a
/// transport failure, a non-success status, an unparseable body, or an
/// `issuer` in the document that differs from the requested one. Callers
/// wrap it in the error class appropriate to their step.
///
/// # Examples
///
/// ```no_run
/// use mcp_installer::mcp::auth::discovery::fetch_authorization_server_metadata;
/// use mcp_installer::mcp::auth::registration::Protocol;
///
/// # async fn example() -> mcp_installer::error::Result<()> {
/// let http = reqwest::Client::new();
/// let meta =
///     fetch_authorization_server_metadata(&http, "https://auth.example.com", Protocol::Oidc)
///         .await?;
/// println!("token endpoint: {}", meta.token_endpoint);
/// # Ok(())
/// # }
/// ```
pub async fn fetch_authorization_server_metadata(
    http: &reqwest::Client,
    issuer: &str,
    protocol: Protocol,
) -> Result<AuthorizationServerMetadata> {
    let issuer_url = Url::parse(issuer)
        .map_err(|e| anyhow::anyhow!("invalid issuer {}: {}", issuer, e))?;
    let url = authorization_server_metadata_url(&issuer_url, protocol);
    tracing::debug!("Fetching {} authorization server metadata from {}", protocol, url);

    let resp = http
        .get(url.clone())
        .send()
        .await
        .map_err(|e| anyhow::anyhow!("metadata request to {} failed: {}", url, e))?;

    if !resp.status().is_success() {
        anyhow::bail!("metadata endpoint {} returned {}", url, resp.status());
    }

    let meta: AuthorizationServerMetadata = resp
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("failed to parse authorization server metadata: {}", e))?;

    if !issuers_match(&meta.issuer, issuer) {
        anyhow::bail!(
            "issuer mismatch: expected {}, metadata declares {}",
            issuer,
            meta.issuer
        );
    }

    Ok(meta)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
