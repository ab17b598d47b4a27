//! Host configuration types and defaults.
//!
//! This module contains the realm host configuration and the map definitions
//! each hosted shard is built from.

use realm_core::{MapId, RegionBounds, ShardConfig, SpawnPoolTemplate};
use serde::{Deserialize, Serialize};

/// Configuration structure for the realm host.
///
/// Holds the shard defaults every map inherits plus the cadence of the
/// host's own housekeeping (status log, autosave, shutdown grace period).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Shard settings used by maps that do not override them
    #[serde(default)]
    pub default_shard: ShardConfig,

    /// Seconds between two status log lines (0 to disable)
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,

    /// Seconds between two saves of every online character (0 to disable)
    #[serde(default = "default_autosave_interval_secs")]
    pub autosave_interval_secs: u64,

    /// How long shutdown waits for shards to finish their last tick
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_status_interval_secs() -> u64 {
    60
}

fn default_autosave_interval_secs() -> u64 {
    300
}

fn default_shutdown_timeout_ms() -> u64 {
    5_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_shard: ShardConfig::default(),
            status_interval_secs: default_status_interval_secs(),
            autosave_interval_secs: default_autosave_interval_secs(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl ServerConfig {
    /// Validates the host configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if valid, otherwise a readable message.
    pub fn validate(&self) -> Result<(), String> {
        self.default_shard
            .validate()
            .map_err(|e| format!("default_shard: {e}"))?;
        if self.shutdown_timeout_ms == 0 {
            return Err("shutdown_timeout_ms must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// One hosted map: identity, extent and spawn content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDefinition {
    pub id: MapId,
    pub name: String,
    #[serde(default)]
    pub bounds: RegionBounds,
    /// Replaces the host's default shard settings for this map
    #[serde(default)]
    pub shard: Option<ShardConfig>,
    #[serde(default)]
    pub spawn_pools: Vec<SpawnPoolTemplate>,
}

impl MapDefinition {
    pub fn new(id: MapId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            bounds: RegionBounds::default(),
            shard: None,
            spawn_pools: Vec::new(),
        }
    }

    /// Shard settings for this map, falling back to `defaults`.
    pub fn shard_config(&self, defaults: &ShardConfig) -> ShardConfig {
        self.shard.clone().unwrap_or_else(|| defaults.clone())
    }
}
