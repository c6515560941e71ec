//! Token sets issued by the authorization server
//!
//! A [`TokenSet`] is what the session keeps per resource after a successful
//! authorization code exchange or refresh. [`TokenResponse`] is the raw token
//! endpoint body it is built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{InstallerError, Result};

/// Seconds before `expires_at` at which a token already counts as expired
const EXPIRY_BUFFER_SECONDS: i64 = 60;

// ---------------------------------------------------------------------------
// TokenSet
// ---------------------------------------------------------------------------

/// Tokens granted for one resource in one session.
///
/// The `expires_at` field is an absolute UTC timestamp computed from the
/// `expires_in` seconds returned by the server, so expiry can be decided
/// without a server round-trip.
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::tokens::TokenSet;
///
/// let tokens = TokenSet {
///     access_token: "my_access_token".to_string(),
///     token_type: "Bearer".to_string(),
///     refresh_token: None,
///     id_token: None,
///     expires_at: None,
///     scope: None,
/// };
///
/// // A token with no expiry is never considered expired.
/// assert!(!tokens.is_expired());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSet {
    /// The access token string issued by the authorization server.
    pub access_token: String,

    /// The token type, typically `"Bearer"`.
    pub token_type: String,

    /// Refresh token usable to obtain a new access token without another
    /// browser round-trip.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// OIDC ID token. Present whenever the registration protocol is OIDC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// UTC timestamp at which the access token expires. `None` means the
    /// server did not say.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// Space-separated scopes granted by the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Returns `true` when the access token is expired or about to expire.
    ///
    /// A 60-second buffer is applied so that callers have time to refresh
    /// before the resource server rejects the token. Tokens with no
    /// `expires_at` are considered valid.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{Duration, Utc};
    /// use mcp_installer::mcp::auth::tokens::TokenSet;
    ///
    /// let tokens = TokenSet {
    ///     access_token: "tok".to_string(),
    ///     token_type: "Bearer".to_string(),
    ///     refresh_token: None,
    ///     id_token: None,
    ///     expires_at: Some(Utc::now() + Duration::seconds(30)),
    ///     scope: None,
    /// };
    /// assert!(tokens.is_expired());
    /// ```
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                Utc::now() >= expires_at - chrono::Duration::seconds(EXPIRY_BUFFER_SECONDS)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TokenResponse
// ---------------------------------------------------------------------------

/// Raw JSON body of a successful token endpoint response.
///
/// `access_token` is optional here so that a body without one surfaces as
/// [`InstallerError::TokenExchange`] instead of a parse error.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Converts the raw response into a [`TokenSet`].
    ///
    /// `expires_in` seconds are converted to an absolute UTC `expires_at`
    /// timestamp. A missing `token_type` defaults to `Bearer`.
    ///
    /// # Errors
    ///
    /// Returns [`InstallerError::TokenExchange`] when there is no access
    /// token in the response.
    pub fn into_token_set(self) -> Result<TokenSet> {
        let access_token = self
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                InstallerError::TokenExchange("no access token in response".to_string())
            })?;

        // Out-of-range lifetimes are treated as unknown.
        let expires_at = self.expires_in.and_then(|secs| {
            let lifetime = chrono::Duration::try_seconds(i64::try_from(secs).ok()?)?;
            Utc::now().checked_add_signed(lifetime)
        });

        Ok(TokenSet {
            access_token,
            token_type: self.token_type.unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: self.refresh_token,
            id_token: self.id_token,
            expires_at,
            scope: self.scope,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
