//! Configuration management for mcp-installer
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{InstallerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Main configuration structure for mcp-installer
///
/// This structure holds everything the installer needs: where the HTTP
/// surface listens, how the client presents itself to authorization
/// servers, how sessions are kept, and which MCP servers are offered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// OAuth client identity and outbound request settings
    #[serde(default)]
    pub client: ClientConfig,
    /// Session cookie and lifetime settings
    #[serde(default)]
    pub session: SessionConfig,
    /// Known MCP servers offered for installation
    #[serde(default = "default_catalog")]
    pub catalog: Vec<CatalogEntry>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Externally visible base URL of this server; the redirect URI is built
    /// from it
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Where the browser lands after a completed authorization
    #[serde(default = "default_home_path")]
    pub home_path: String,
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_home_path() -> String {
    "/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: default_public_url(),
            home_path: default_home_path(),
        }
    }
}

/// OAuth client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// `client_name` sent during dynamic client registration
    #[serde(default = "default_client_name")]
    pub client_name: String,

    /// Path of the authorization callback, appended to `server.public_url`
    #[serde(default = "default_callback_path")]
    pub callback_path: String,

    /// Timeout for outbound requests to resources and authorization servers
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_client_name() -> String {
    "Basic Chat Client".to_string()
}

fn default_callback_path() -> String {
    "/auth/callback".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    5
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: default_client_name(),
            callback_path: default_callback_path(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Add the `Secure` attribute to the session cookie
    #[serde(default)]
    pub secure_cookie: bool,

    /// Lifetime of a pending authorization transaction
    #[serde(default = "default_transaction_ttl_seconds")]
    pub transaction_ttl_seconds: u64,

    /// Idle lifetime of a session
    #[serde(default = "default_session_ttl_seconds")]
    pub session_ttl_seconds: u64,
}

/// Upper bound for both session TTLs (one year)
pub const MAX_TTL_SECONDS: u64 = 365 * 86_400;

fn default_cookie_name() -> String {
    "chat_session".to_string()
}

fn default_transaction_ttl_seconds() -> u64 {
    600
}

fn default_session_ttl_seconds() -> u64 {
    86_400
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secure_cookie: false,
            transaction_ttl_seconds: default_transaction_ttl_seconds(),
            session_ttl_seconds: default_session_ttl_seconds(),
        }
    }
}

/// A known MCP server the chat client can install
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Display name
    pub name: String,
    /// Resource address to discover
    pub address: String,
}

fn default_catalog() -> Vec<CatalogEntry> {
    vec![CatalogEntry {
        name: "Todo API".to_string(),
        address: "http://localhost:8080".to_string(),
    }]
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load configuration from file, environment variables, and CLI
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line arguments
    ///
    /// # Returns
    ///
    /// Returns the merged configuration. A missing file is not an error;
    /// defaults are used instead.
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default_config()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            client: ClientConfig::default(),
            session: SessionConfig::default(),
            catalog: default_catalog(),
        }
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| InstallerError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| InstallerError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(bind_address) = std::env::var("MCP_INSTALLER_BIND_ADDRESS") {
            self.server.bind_address = bind_address;
        }

        if let Ok(public_url) = std::env::var("MCP_INSTALLER_PUBLIC_URL") {
            self.server.public_url = public_url;
        }

        if let Ok(client_name) = std::env::var("MCP_INSTALLER_CLIENT_NAME") {
            self.client.client_name = client_name;
        }

        if let Ok(timeout) = std::env::var("MCP_INSTALLER_REQUEST_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.client.request_timeout_seconds = value;
            } else {
                tracing::warn!("Invalid MCP_INSTALLER_REQUEST_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(secure) = std::env::var("MCP_INSTALLER_SECURE_COOKIE") {
            match secure.parse::<bool>() {
                Ok(v) => self.session.secure_cookie = v,
                Err(_) => {
                    tracing::warn!("Invalid value for MCP_INSTALLER_SECURE_COOKIE: {}", secure)
                }
            }
        }

        if let Ok(ttl) = std::env::var("MCP_INSTALLER_TRANSACTION_TTL_SECONDS") {
            if let Ok(value) = ttl.parse() {
                self.session.transaction_ttl_seconds = value;
            } else {
                tracing::warn!("Invalid MCP_INSTALLER_TRANSACTION_TTL_SECONDS: {}", ttl);
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let crate::cli::Commands::Serve {
            bind: Some(bind_address),
        } = &cli.command
        {
            tracing::debug!("Using bind address override: {}", bind_address);
            self.server.bind_address = bind_address.clone();
        }
    }

    /// Redirect URI registered with every authorization server
    ///
    /// # Examples
    ///
    /// ```
    /// use mcp_installer::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.redirect_uri(), "http://localhost:3000/auth/callback");
    /// ```
    pub fn redirect_uri(&self) -> String {
        format!(
            "{}{}",
            self.server.public_url.trim_end_matches('/'),
            self.client.callback_path
        )
    }

    /// Outbound request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.client.request_timeout_seconds)
    }

    /// Lifetime of a pending authorization, capped at [`MAX_TTL_SECONDS`]
    pub fn transaction_ttl(&self) -> chrono::Duration {
        capped_ttl(self.session.transaction_ttl_seconds)
    }

    /// Idle lifetime of a session, capped at [`MAX_TTL_SECONDS`]
    pub fn session_ttl(&self) -> chrono::Duration {
        capped_ttl(self.session.session_ttl_seconds)
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Returns
    ///
    /// Returns Ok if configuration is valid
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(InstallerError::Config(format!(
                "server.bind_address is not a socket address: {}",
                self.server.bind_address
            ))
            .into());
        }

        if Url::parse(&self.server.public_url).is_err() {
            return Err(InstallerError::Config(format!(
                "server.public_url is not a URL: {}",
                self.server.public_url
            ))
            .into());
        }

        if !self.server.home_path.starts_with('/') {
            return Err(
                InstallerError::Config("server.home_path must start with '/'".to_string()).into(),
            );
        }

        if self.client.client_name.trim().is_empty() {
            return Err(
                InstallerError::Config("client.client_name cannot be empty".to_string()).into(),
            );
        }

        if !self.client.callback_path.starts_with('/') {
            return Err(InstallerError::Config(
                "client.callback_path must start with '/'".to_string(),
            )
            .into());
        }

        if self.client.request_timeout_seconds == 0 {
            return Err(InstallerError::Config(
                "client.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.session.cookie_name.is_empty()
            || !self
                .session
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(InstallerError::Config(format!(
                "session.cookie_name is not a valid cookie name: {:?}",
                self.session.cookie_name
            ))
            .into());
        }

        if self.session.transaction_ttl_seconds == 0 {
            return Err(InstallerError::Config(
                "session.transaction_ttl_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        for (name, value) in [
            ("transaction_ttl_seconds", self.session.transaction_ttl_seconds),
            ("session_ttl_seconds", self.session.session_ttl_seconds),
        ] {
            if value > MAX_TTL_SECONDS {
                return Err(InstallerError::Config(format!(
                    "session.{} must be at most {} seconds",
                    name, MAX_TTL_SECONDS
                ))
                .into());
            }
        }

        if self.session.session_ttl_seconds < self.session.transaction_ttl_seconds {
            return Err(InstallerError::Config(
                "session.session_ttl_seconds must not be shorter than transaction_ttl_seconds"
                    .to_string(),
            )
            .into());
        }

        for entry in &self.catalog {
            if Url::parse(&entry.address).is_err() {
                return Err(InstallerError::Config(format!(
                    "catalog entry {} has an invalid address: {}",
                    entry.name, entry.address
                ))
                .into());
            }
        }

        Ok(())
    }
}

fn capped_ttl(seconds: u64) -> chrono::Duration {
    // MAX_TTL_SECONDS fits in i64
    chrono::Duration::seconds(seconds.min(MAX_TTL_SECONDS) as i64)
}
