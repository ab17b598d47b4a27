//! Per-shard configuration.
//!
//! A [`ShardConfig`] is handed to a shard when it is built and lives exactly as
//! long as the shard. Every field has a serde default so partial TOML tables
//! deserialize cleanly.

use crate::types::UpdatePriority;
use serde::{Deserialize, Serialize};

fn default_update_delay_ms() -> u64 {
    120
}

fn default_environment_ticks() -> u32 {
    // Roughly once per second at the default update delay.
    (1000 / default_update_delay_ms()) as u32
}

fn default_partition_threshold() -> f32 {
    128.0
}

fn default_broadcast_range() -> f32 {
    100.0
}

fn default_true() -> bool {
    true
}

fn default_slow_tick_warn_ms() -> u64 {
    1000
}

fn default_corpse_decay_ms() -> u64 {
    60_000
}

fn default_loot_lifetime_ms() -> u64 {
    600_000
}

/// Minimum milliseconds between two updates of one object, per priority tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityMillis {
    #[serde(default = "PriorityMillis::default_inactive")]
    pub inactive: u64,
    #[serde(default = "PriorityMillis::default_background")]
    pub background: u64,
    #[serde(default = "PriorityMillis::default_very_low")]
    pub very_low: u64,
    #[serde(default = "PriorityMillis::default_low")]
    pub low: u64,
    #[serde(default = "PriorityMillis::default_active")]
    pub active: u64,
    #[serde(default)]
    pub high: u64,
}

impl PriorityMillis {
    fn default_inactive() -> u64 {
        10_000
    }
    fn default_background() -> u64 {
        3_000
    }
    fn default_very_low() -> u64 {
        1_000
    }
    fn default_low() -> u64 {
        600
    }
    fn default_active() -> u64 {
        300
    }

    /// Returns the update floor for `priority`.
    pub fn floor(&self, priority: UpdatePriority) -> u64 {
        match priority {
            UpdatePriority::Inactive => self.inactive,
            UpdatePriority::Background => self.background,
            UpdatePriority::VeryLow => self.very_low,
            UpdatePriority::Low => self.low,
            UpdatePriority::Active => self.active,
            UpdatePriority::High => self.high,
        }
    }
}

impl Default for PriorityMillis {
    fn default() -> Self {
        Self {
            inactive: Self::default_inactive(),
            background: Self::default_background(),
            very_low: Self::default_very_low(),
            low: Self::default_low(),
            active: Self::default_active(),
            high: 0,
        }
    }
}

/// Configuration for one shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardConfig {
    /// Target delay between two ticks in milliseconds
    #[serde(default = "default_update_delay_ms")]
    pub update_delay_ms: u64,
    /// Environment updates are pushed to characters every this many ticks
    #[serde(default = "default_environment_ticks")]
    pub character_update_environment_ticks: u32,
    /// Per-tier update floors
    #[serde(default)]
    pub priority_millis: PriorityMillis,
    /// Whether objects in areas without characters are still updated
    /// (at the Inactive tier)
    #[serde(default)]
    pub update_inactive_areas: bool,
    /// Space partition leaves are split until their edge is at most this long
    #[serde(default = "default_partition_threshold")]
    pub partition_threshold: f32,
    /// Radius used for environment pushes and area sends
    #[serde(default = "default_broadcast_range")]
    pub broadcast_range: f32,
    /// Spawn every configured pool when the shard first starts
    #[serde(default = "default_true")]
    pub auto_spawn: bool,
    /// Whether spawn points schedule respawns
    #[serde(default = "default_true")]
    pub spawn_points_enabled: bool,
    /// Average tick time above which a warning is logged
    #[serde(default = "default_slow_tick_warn_ms")]
    pub slow_tick_warn_ms: u64,
    /// Time a dead NPC stays in the world before it is deleted
    #[serde(default = "default_corpse_decay_ms")]
    pub corpse_decay_ms: u64,
    /// Dropped loot older than this is swept from the loot grid
    #[serde(default = "default_loot_lifetime_ms")]
    pub loot_lifetime_ms: u64,
    /// Seed for spawn probability rolls; entropy-seeded when absent
    #[serde(default)]
    pub rng_seed: Option<u64>,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            update_delay_ms: default_update_delay_ms(),
            character_update_environment_ticks: default_environment_ticks(),
            priority_millis: PriorityMillis::default(),
            update_inactive_areas: false,
            partition_threshold: default_partition_threshold(),
            broadcast_range: default_broadcast_range(),
            auto_spawn: true,
            spawn_points_enabled: true,
            slow_tick_warn_ms: default_slow_tick_warn_ms(),
            corpse_decay_ms: default_corpse_decay_ms(),
            loot_lifetime_ms: default_loot_lifetime_ms(),
            rng_seed: None,
        }
    }
}

impl ShardConfig {
    /// Validates the configuration.
    ///
    /// # Returns
    ///
    /// `Ok(())` if valid, otherwise a message naming the offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.update_delay_ms == 0 {
            return Err("update_delay_ms must be greater than 0".to_string());
        }
        if self.character_update_environment_ticks == 0 {
            return Err("character_update_environment_ticks must be greater than 0".to_string());
        }
        if !(self.partition_threshold.is_finite() && self.partition_threshold > 0.0) {
            return Err(format!(
                "partition_threshold must be a positive number, got {}",
                self.partition_threshold
            ));
        }
        if !(self.broadcast_range.is_finite() && self.broadcast_range >= 0.0) {
            return Err(format!(
                "broadcast_range must be a non-negative number, got {}",
                self.broadcast_range
            ));
        }
        Ok(())
    }
}
