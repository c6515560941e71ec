//! Command-line interface definition for mcp-installer
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for serving the installer and for one-shot discovery.

use clap::{Parser, Subcommand};

/// mcp-installer - Install OAuth-protected MCP servers into a chat client
///
/// Discovers a protected MCP resource, registers a client with its
/// authorization server, and runs the PKCE authorization code flow.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcp-installer")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for mcp-installer
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the install and authorization HTTP endpoints
    Serve {
        /// Address to bind, overriding `server.bind_address`
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Discover and register with a resource, printing progress as NDJSON
    Discover {
        /// Address of the protected MCP resource
        address: String,
    },
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            command: Commands::Serve { bind: None },
        }
    }
}
