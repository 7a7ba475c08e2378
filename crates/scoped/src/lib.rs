//! # Scoped - Scope Replication Server
//!
//! Hosts a [`scope_server::ScopeServer`] behind a WebSocket transport and populates it
//! with a sample world of colored cubes. This crate handles CLI parsing, configuration
//! loading, logging and the application lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! scoped
//!
//! # Specify custom configuration
//! scoped --config world.toml
//!
//! # Override specific settings
//! scoped --bind 0.0.0.0:8080 --log-level debug --json-logs
//! ```
//!
//! ## Configuration
//!
//! The server loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! SIGINT and SIGTERM (Ctrl+C on Windows) unload the world, close every connection and
//! stop the server. A second signal exits immediately.

use tracing::error;

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod requests;
pub mod sample;
pub mod shutdown;
pub mod signals;
pub mod transport;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the server until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging comes first; a broken file is reported again by Application::new.
    let config = AppConfig::load_from_file(&args.config_path).await.unwrap_or_default();
    let mut logging = config.logging.clone();
    if let Some(level) = &args.log_level {
        logging.level = level.clone();
    }
    logging::setup_logging(&logging, args.json_logs)?;

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ Failed to create application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("❌ Application error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
