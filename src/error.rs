//! Error types for mcp-installer
//!
//! This module defines the error taxonomy for resource discovery, client
//! registration, and the authorization code flow, using `thiserror` for
//! ergonomic error handling.

use thiserror::Error;

/// Main error type for mcp-installer operations
///
/// Each variant corresponds to one failure class of the install and
/// authorization pipeline. Callers that need to branch on the class (for
/// example to pick an HTTP status) downcast the `anyhow::Error` carried by
/// [`Result`] back to this type.
#[derive(Error, Debug)]
pub enum InstallerError {
    /// The protected resource metadata document could not be retrieved
    #[error("Failed to fetch metadata from {url}: {reason}")]
    MetadataFetch {
        /// The metadata URL that was requested
        url: String,
        /// Status text or transport error
        reason: String,
    },

    /// The metadata document describes a different resource than requested
    #[error("Resource does not match metadata in origin: expected {expected}, got {actual}")]
    ResourceMismatch {
        /// The resource address the caller asked for
        expected: String,
        /// The `resource` value declared by the metadata document
        actual: String,
    },

    /// The resource requires something this client cannot do
    #[error("Unsupported resource: {0}")]
    UnsupportedResource(String),

    /// Dynamic client registration failed for one protocol
    #[error("{protocol} registration failed: {message}")]
    Registration {
        /// Protocol label (`oidc` or `oauth2`)
        protocol: String,
        /// What went wrong
        message: String,
    },

    /// Neither the resource nor the authorization server advertised scopes
    #[error("Could not establish which scopes to use")]
    ScopeResolution,

    /// Registration succeeded but no client secret was issued
    #[error("Client secret was not provided in the registration metadata")]
    MissingCredential,

    /// No stored registration for the resource in this session
    #[error("No registration found for resource: {0}")]
    NotFound(String),

    /// No pending authorization transaction (missing, expired, or consumed)
    #[error("Invalid transaction: there was no code_verifier")]
    NoTransaction,

    /// The authorization server rejected the code exchange or refresh
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// No usable token set for the resource in this session
    #[error("Not authorized for resource: {0}")]
    NotAuthorized(String),

    /// Malformed install payload or request input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl InstallerError {
    /// Stable snake_case code for this error class
    ///
    /// Used in the terminal event of a failed discovery stream and in API
    /// error bodies so that clients do not have to parse messages.
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_installer::error::InstallerError;
    ///
    /// assert_eq!(InstallerError::NoTransaction.kind(), "no_transaction");
    /// assert_eq!(InstallerError::ScopeResolution.kind(), "scope_resolution");
    /// ```
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MetadataFetch { .. } => "metadata_fetch",
            Self::ResourceMismatch { .. } => "resource_mismatch",
            Self::UnsupportedResource(_) => "unsupported_resource",
            Self::Registration { .. } => "registration",
            Self::ScopeResolution => "scope_resolution",
            Self::MissingCredential => "missing_credential",
            Self::NotFound(_) => "not_found",
            Self::NoTransaction => "no_transaction",
            Self::TokenExchange(_) => "token_exchange",
            Self::NotAuthorized(_) => "not_authorized",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Yaml(_) => "yaml",
            Self::Http(_) => "http",
        }
    }
}

/// Returns the error class code of an `anyhow::Error`
///
/// Errors that did not originate as an [`InstallerError`] report
/// `"internal"`.
pub fn error_kind(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<InstallerError>()
        .map(InstallerError::kind)
        .unwrap_or("internal")
}

/// Result type alias for mcp-installer operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
