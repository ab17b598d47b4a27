//! Main application logic and lifecycle management.
//!
//! This module contains the `Application` struct that builds the realm host
//! from configuration, runs it, and shuts it down on a termination signal.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use realm_server::RealmServer;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Main application struct.
///
/// Owns the loaded configuration and the realm host with every configured
/// map already registered (but not started).
pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
    /// Realm host instance
    server: Arc<RealmServer>,
}

impl Application {
    /// Creates a new application instance.
    ///
    /// # Process
    ///
    /// 1. Load configuration from file (creating default if missing)
    /// 2. Apply command-line argument overrides
    /// 3. Validate merged configuration
    /// 4. Display startup banner
    /// 5. Create the realm host and one shard per configured map
    ///
    /// # Returns
    ///
    /// A configured `Application` ready to run, or an error if
    /// initialization failed.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let server = RealmServer::new(config.server.clone());
        let created = server.create_shards(&config.maps)?;
        info!(
            "🗺️ {} map(s) configured with {} spawn entries | Config: {}",
            created,
            config.spawn_entry_count(),
            args.config_path.display()
        );

        Ok(Self {
            config,
            server: Arc::new(server),
        })
    }

    pub fn server(&self) -> &Arc<RealmServer> {
        &self.server
    }

    /// Runs the realm host until a termination signal arrives, then shuts
    /// every shard down.
    ///
    /// # Returns
    ///
    /// `Ok(())` after a clean shutdown, or the host error that ended the run.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting realm server");
        self.log_configuration_summary();

        let mut server_handle = {
            let server = Arc::clone(&self.server);
            tokio::spawn(async move { server.run().await })
        };

        info!("✅ Realm server is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let finished_early = tokio::select! {
            signal = wait_for_shutdown_signal() => {
                signal?;
                None
            }
            result = &mut server_handle => Some(result),
        };
        if let Some(result) = finished_early {
            return match result {
                Ok(Ok(())) => {
                    warn!("⚠️ Realm host stopped without a shutdown signal");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("❌ Realm host error: {}", e);
                    Err(e.into())
                }
                Err(e) => {
                    error!("❌ Realm host task failed: {}", e);
                    Err(e.into())
                }
            };
        }

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }

            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        self.server.shutdown();
        let grace = Duration::from_millis(self.config.server.shutdown_timeout_ms.saturating_mul(2));
        match tokio::time::timeout(grace, server_handle).await {
            Ok(Ok(Ok(()))) => info!("✅ Realm host shut down cleanly"),
            Ok(Ok(Err(e))) => {
                error!("❌ Realm host error: {}", e);
                return Err(e.into());
            }
            Ok(Err(e)) => {
                error!("❌ Realm host task failed: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                warn!("⏰ Realm host did not finish within {:?}", grace);
            }
        }

        let stats = self.server.stats();
        info!("📊 Final Statistics:");
        info!("  - Shards still hosted: {}", stats.shards.len());
        info!("  - Characters online: {}", stats.total_characters);
        info!("👋 Realm server shutdown complete");
        Ok(())
    }

    /// Logs the configuration summary at startup.
    fn log_configuration_summary(&self) {
        let shard = &self.config.server.default_shard;
        info!("📋 Configuration Summary:");
        info!("  ⏱️ Default tick: {}ms", shard.update_delay_ms);
        info!(
            "  🌐 Environment push every {} tick(s), broadcast range {}",
            shard.character_update_environment_ticks, shard.broadcast_range
        );
        info!(
            "  💾 Autosave every {}s, status every {}s",
            self.config.server.autosave_interval_secs, self.config.server.status_interval_secs
        );
        for map in &self.config.maps {
            let b = &map.bounds;
            info!(
                "  🗺️ {} '{}': {:.0}x{:.0}x{:.0} units, {} spawn pool(s)",
                map.id,
                map.name,
                b.max_x - b.min_x,
                b.max_y - b.min_y,
                b.max_z - b.min_z,
                map.spawn_pools.len()
            );
        }
    }
}

/// Applies command-line overrides on top of the file configuration.
pub(crate) fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}
