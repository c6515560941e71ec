/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

- `serve`    - Run the install and authorization HTTP server
- `discover` - Discover and register with one resource, printing progress
*/

use crate::config::Config;
use crate::error::Result;

// Serve command handler
pub mod serve {
    //! Runs the HTTP surface until the process is stopped.

    use super::*;

    /// Start the installer server
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration (consumed)
    pub async fn run_serve(config: Config) -> Result<()> {
        tracing::info!(
            "Starting installer for client {:?}",
            config.client.client_name
        );
        crate::server::serve(config).await
    }
}

// Discover command handler
pub mod discover {
    //! One-shot discovery and registration.
    //!
    //! Prints each progress event as one JSON line on stdout, the same lines
    //! `POST /auth/discover` streams. Nothing is stored.

    use super::*;
    use crate::mcp::auth::manager::AuthManager;
    use futures::StreamExt;
    use std::io::Write;

    /// Discover `address` and register a client with its authorization server
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `address` - Address of the protected resource
    ///
    /// # Errors
    ///
    /// Returns an error when discovery fails; the failure event has already
    /// been printed.
    pub async fn run_discover(config: Config, address: String) -> Result<()> {
        let manager = AuthManager::from_config(&config)?;
        let mut events = manager.discover(&address);
        let mut failure = None;

        let stdout = std::io::stdout();
        while let Some(event) = events.next().await {
            let line = serde_json::to_string(&event)?;
            {
                let mut out = stdout.lock();
                writeln!(out, "{}", line)?;
                out.flush()?;
            }
            if event.error.is_some() {
                failure = Some(event.message);
            }
        }

        match failure {
            Some(message) => Err(anyhow::anyhow!(message)),
            None => Ok(()),
        }
    }
}
