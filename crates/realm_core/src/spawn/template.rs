//! Immutable spawn content handed to shards at construction.
use crate::types::{Phase, Position, UpdatePriority};
use serde::{Deserialize, Serialize};

fn default_level() -> u8 {
    1
}

fn default_max_health() -> u32 {
    100
}

fn default_probability() -> f32 {
    1.0
}

fn default_respawn_delay_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

fn default_game_object_priority() -> UpdatePriority {
    UpdatePriority::Background
}

/// Creature template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcTemplate {
    pub entry_id: u32,
    pub name: String,
    #[serde(default = "default_level")]
    pub level: u8,
    #[serde(default = "default_max_health")]
    pub max_health: u32,
    /// Spirit healers are indexed separately for resurrection lookups
    #[serde(default)]
    pub spirit_healer: bool,
    #[serde(default)]
    pub priority: UpdatePriority,
    /// Item ids dropped for the looter on death
    #[serde(default)]
    pub loot: Vec<u32>,
    /// Name of the brain to attach, resolved by the shard's brain factory
    #[serde(default)]
    pub brain: Option<String>,
}

impl NpcTemplate {
    pub fn new(entry_id: u32, name: impl Into<String>) -> Self {
        Self {
            entry_id,
            name: name.into(),
            level: default_level(),
            max_health: default_max_health(),
            spirit_healer: false,
            priority: UpdatePriority::default(),
            loot: Vec::new(),
            brain: None,
        }
    }
}

/// Static object template (chests, doors, herbs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameObjectTemplate {
    pub entry_id: u32,
    pub name: String,
    #[serde(default = "default_game_object_priority")]
    pub priority: UpdatePriority,
}

impl GameObjectTemplate {
    pub fn new(entry_id: u32, name: impl Into<String>) -> Self {
        Self {
            entry_id,
            name: name.into(),
            priority: default_game_object_priority(),
        }
    }
}

/// What a spawn entry creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SpawnKind {
    Npc(NpcTemplate),
    GameObject(GameObjectTemplate),
}

/// One spawn location inside a pool template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnEntry {
    pub spawn_id: u32,
    pub kind: SpawnKind,
    pub position: Position,
    #[serde(default)]
    pub phase: Phase,
    /// Chance in `[0, 1]` that a spawn attempt produces an entity
    #[serde(default = "default_probability")]
    pub probability: f32,
    #[serde(default = "default_respawn_delay_ms")]
    pub respawn_delay_ms: u64,
    #[serde(default)]
    pub equipment_id: Option<u32>,
    /// Spawn immediately when the pool is added
    #[serde(default = "default_true")]
    pub auto_spawn: bool,
}

/// Template of a spawn pool: a list of entries spawned and respawned together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnPoolTemplate {
    pub pool_id: u32,
    #[serde(default)]
    pub entries: Vec<SpawnEntry>,
}
