//! mcp-installer - OAuth installer for MCP servers
//!
//! This library lets a chat client install OAuth-protected MCP servers:
//! it discovers a resource's authorization server, registers a client
//! dynamically, and runs the PKCE authorization code flow on behalf of a
//! browser session.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `mcp::auth`: discovery, registration, scope negotiation, the session
//!   store, and the authorization code flow
//! - `server`: the axum HTTP surface and session cookie handling
//! - `commands`: CLI command handlers
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use mcp_installer::{AuthManager, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let manager = AuthManager::from_config(&config)?;
//!     let _events = manager.discover("http://localhost:8080");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod mcp;
pub mod server;

// Re-export commonly used types
pub use config::Config;
pub use error::{InstallerError, Result};
pub use mcp::auth::manager::AuthManager;
pub use server::{create_router, AppState};

#[cfg(test)]
pub mod test_utils;
