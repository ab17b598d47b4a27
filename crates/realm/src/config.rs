//! Configuration management for the realm server.
//!
//! This module handles loading and validation of the TOML configuration file
//! and its conversion into the host and map definitions `realm_server` uses.

use realm_core::{MapId, RegionBounds, SpawnPoolTemplate};
use realm_server::{MapDefinition, ServerConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Application configuration loaded from TOML file.
///
/// Holds the host settings, logging settings and one entry per hosted map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Realm host settings, including the default shard settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Maps hosted by this process
    #[serde(default)]
    pub maps: Vec<MapDefinition>,
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingSettings::default(),
            maps: vec![
                MapDefinition::new(MapId(0), "Eastern Kingdoms"),
                MapDefinition::new(MapId(1), "Kalimdor"),
            ],
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// `path` and the default configuration is returned.
    ///
    /// # Returns
    ///
    /// The loaded or default configuration, or an error if reading, parsing
    /// or writing the default failed.
    pub async fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("📝 Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the configuration is valid, or an error string describing
    /// the first issue found.
    pub fn validate(&self) -> Result<(), String> {
        self.server.validate().map_err(|e| format!("server: {e}"))?;

        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {VALID_LOG_LEVELS:?}",
                &self.logging.level
            ));
        }

        if self.maps.is_empty() {
            return Err("At least one map must be configured".to_string());
        }
        let mut ids = HashSet::new();
        for map in &self.maps {
            if !ids.insert(map.id) {
                return Err(format!("Map id {} is configured more than once", map.id.0));
            }
            validate_map(map).map_err(|e| format!("map {} ('{}'): {e}", map.id.0, map.name))?;
        }
        Ok(())
    }

    /// Total number of spawn entries over every map.
    pub fn spawn_entry_count(&self) -> usize {
        self.maps
            .iter()
            .flat_map(|m| &m.spawn_pools)
            .map(|p| p.entries.len())
            .sum()
    }
}

fn validate_map(map: &MapDefinition) -> Result<(), String> {
    if map.name.trim().is_empty() {
        return Err("name cannot be empty".to_string());
    }
    validate_bounds(&map.bounds)?;
    if let Some(shard) = &map.shard {
        shard.validate()?;
    }

    let mut pool_ids = HashSet::new();
    for pool in &map.spawn_pools {
        if !pool_ids.insert(pool.pool_id) {
            return Err(format!("spawn pool {} is defined more than once", pool.pool_id));
        }
        validate_pool(pool, &map.bounds)?;
    }
    Ok(())
}

fn validate_bounds(bounds: &RegionBounds) -> Result<(), String> {
    if bounds.min_x >= bounds.max_x {
        return Err("bounds min_x must be less than max_x".to_string());
    }
    if bounds.min_y >= bounds.max_y {
        return Err("bounds min_y must be less than max_y".to_string());
    }
    if bounds.min_z >= bounds.max_z {
        return Err("bounds min_z must be less than max_z".to_string());
    }
    Ok(())
}

fn validate_pool(pool: &SpawnPoolTemplate, bounds: &RegionBounds) -> Result<(), String> {
    for entry in &pool.entries {
        if !(0.0..=1.0).contains(&entry.probability) {
            return Err(format!(
                "spawn {} in pool {}: probability {} is outside [0, 1]",
                entry.spawn_id, pool.pool_id, entry.probability
            ));
        }
        if !bounds.contains(&entry.position.point) {
            let p = entry.position.point;
            return Err(format!(
                "spawn {} in pool {}: ({}, {}, {}) is outside the map bounds",
                entry.spawn_id, pool.pool_id, p.x, p.y, p.z
            ));
        }
    }
    Ok(())
}
