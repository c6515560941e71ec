//! Scope negotiation
//!
//! Picks the scopes an authorization request asks for from what the resource
//! and the authorization server advertise.

use crate::error::{InstallerError, Result};
use crate::mcp::auth::registration::Protocol;

/// Scopes prepended for OIDC when the advertised set lacks `openid`
const OIDC_BASE_SCOPES: [&str; 2] = ["openid", "profile"];

/// Negotiates the scopes to request for a registration.
///
/// The resource's scopes win when present and non-empty, else the
/// authorization server's. An empty list counts as absent. For
/// [`Protocol::Oidc`] a set lacking `openid` becomes
/// `["openid", "profile", ...scopes]` with duplicates removed, keeping the
/// first occurrence. [`Protocol::Oauth2`] scopes are returned unchanged.
///
/// # Errors
///
/// Returns [`InstallerError::ScopeResolution`] when neither side advertises
/// any scope.
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::registration::Protocol;
/// use mcp_installer::mcp::auth::scopes::negotiate_scopes;
///
/// let resource = vec!["todos:read".to_string()];
/// let scopes = negotiate_scopes(Some(&resource), None, Protocol::Oidc).unwrap();
/// assert_eq!(scopes, vec!["openid", "profile", "todos:read"]);
///
/// let scopes = negotiate_scopes(Some(&resource), None, Protocol::Oauth2).unwrap();
/// assert_eq!(scopes, vec!["todos:read"]);
/// ```
pub fn negotiate_scopes(
    resource_scopes: Option<&[String]>,
    server_scopes: Option<&[String]>,
    protocol: Protocol,
) -> Result<Vec<String>> {
    fn non_empty(scopes: Option<&[String]>) -> Option<&[String]> {
        scopes.filter(|s| !s.is_empty())
    }

    let base = non_empty(resource_scopes)
        .or_else(|| non_empty(server_scopes))
        .ok_or(InstallerError::ScopeResolution)?;

    let needs_openid = protocol == Protocol::Oidc && !base.iter().any(|s| s == "openid");

    let candidates = needs_openid
        .then_some(OIDC_BASE_SCOPES.as_slice())
        .unwrap_or_default()
        .iter()
        .map(|s| s.to_string())
        .chain(base.iter().cloned());

    let mut scopes: Vec<String> = Vec::with_capacity(base.len() + 2);
    for scope in candidates {
        if !scopes.contains(&scope) {
            scopes.push(scope);
        }
    }
    Ok(scopes)
}
