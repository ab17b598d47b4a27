//! # Realm Server - Main Entry Point
//!
//! Hosts one world shard per configured map. This entry point handles CLI
//! parsing, configuration loading, logging setup and the application
//! lifecycle.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (writes realm.toml when missing)
//! realm
//!
//! # Specify custom configuration
//! realm --config production.toml
//!
//! # Verbose, structured logs
//! realm --log-level debug --json-logs
//! ```
//!
//! ## Signal Handling
//!
//! The first SIGINT (Ctrl+C) or SIGTERM saves every online character, stops
//! every shard after its current tick and disposes it. A second signal exits
//! immediately.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

pub use app::Application;
pub use cli::CliArgs;
pub use config::{AppConfig, LoggingSettings};

/// Runs the realm server process.
///
/// 1. Command-line argument parsing
/// 2. Configuration loading and logging setup
/// 3. Application creation and execution
///
/// Startup or runtime failures are logged and end the process with exit
/// code 1.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging needs the configured level before the application is built.
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    app::apply_overrides(&mut config, &args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}
