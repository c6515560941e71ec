//! mcp-installer - OAuth installer for MCP servers
//!
#![doc = "mcp-installer - OAuth installer for MCP servers"]
#![doc = "Main entry point for the mcp-installer application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mcp_installer::cli::{Cli, Commands};
use mcp_installer::commands;
use mcp_installer::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Serve { .. } => {
            tracing::info!("Starting serve mode");
            commands::serve::run_serve(config).await?;
            Ok(())
        }
        Commands::Discover { address } => {
            tracing::info!("Starting discovery of {}", address);
            commands::discover::run_discover(config, address).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// Logs go to stderr so that `discover` output on stdout stays NDJSON.
fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        "mcp_installer=debug,tower_http=debug"
    } else {
        "mcp_installer=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
