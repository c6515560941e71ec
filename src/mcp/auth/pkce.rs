//! PKCE S256 verifier and challenge generation
//!
//! This module implements the Proof Key for Code Exchange (PKCE) extension
//! to OAuth 2.0 as defined in RFC 7636, using only the `S256` challenge
//! method.
//!
//! # How PKCE is used here
//!
//! 1. `/auth/start` generates a verifier and keeps it server-side in the
//!    caller's pending authorization transaction.
//! 2. The authorization URL carries `code_challenge` and
//!    `code_challenge_method=S256`.
//! 3. `/auth/callback` sends the stored verifier as `code_verifier` to the
//!    token endpoint, which recomputes the challenge.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use base64::Engine as _;
use sha2::{Digest, Sha256};

/// The only challenge method this client sends
pub const CHALLENGE_METHOD: &str = "S256";

// ---------------------------------------------------------------------------
// PkceChallenge
// ---------------------------------------------------------------------------

/// A PKCE S256 pair consisting of a verifier and its derived challenge.
///
/// Created by [`generate`] and consumed by
/// [`OAuthFlow`](super::flow::OAuthFlow).
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::pkce::generate;
///
/// let pkce = generate();
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_ne!(pkce.verifier, pkce.challenge);
/// ```
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// 32 random bytes, base64url-encoded without padding (43 characters).
    /// Sent to the token endpoint as `code_verifier`.
    pub verifier: String,

    /// base64url (no padding) of the SHA-256 digest of [`Self::verifier`].
    /// Sent to the authorization endpoint as `code_challenge`.
    pub challenge: String,
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates a fresh PKCE S256 pair.
///
/// The verifier is 32 cryptographically random bytes encoded as base64url
/// without padding. The challenge is derived with [`challenge_for`].
pub fn generate() -> PkceChallenge {
    use rand::RngCore as _;

    let mut random_bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut random_bytes);

    let verifier = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes);
    let challenge = challenge_for(&verifier);

    PkceChallenge {
        verifier,
        challenge,
    }
}

/// Computes the S256 code challenge for a verifier.
///
/// `BASE64URL(SHA256(ASCII(code_verifier)))` per RFC 7636 section 4.2.
///
/// # Examples
///
/// ```
/// use mcp_installer::mcp::auth::pkce::challenge_for;
///
/// assert_eq!(
///     challenge_for("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
///     "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
/// );
/// ```
pub fn challenge_for(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
