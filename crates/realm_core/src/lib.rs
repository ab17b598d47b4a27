//! # Realm Core
//!
//! The shard simulation core of the realm server. A shard (map) is one bounded
//! region of world space with its own update loop; many shards run side by
//! side, but inside one shard at most one thread executes shard logic at any
//! instant.
//!
//! ## Core Features
//!
//! - **Single-writer shards**: an atomic thread claim plus a `!Send`
//!   [`ShardContext`] handle make shard state reachable only from the thread
//!   that owns the shard right now
//! - **Message queue**: lock-free multi-producer queue of deferred actions,
//!   drained once per tick before any object update
//! - **Priority-tiered updates**: each object is updated at most once per its
//!   tier's millisecond floor
//! - **Space partition**: pre-split quadtree answering area queries with phase
//!   filtering
//! - **Spawn pools**: spawn points with respawn timers and probability rolls
//!
//! ## Quick Start Example
//!
//! ```rust,no_run
//! use realm_core::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ShardError> {
//!     let shard = Shard::builder(MapId(0), "Eastern Kingdoms").build()?;
//!     shard.start()?;
//!
//!     let wolf = WorldObject::npc(
//!         Arc::new(NpcTemplate::new(299, "Young Wolf")),
//!         Position::new(100.0, 100.0, 0.0),
//!     );
//!     shard.add_object_later(wolf);
//!
//!     let count = tokio::task::spawn_blocking({
//!         let shard = Arc::clone(&shard);
//!         move || shard.wait_one_tick().map(|_| shard.stats().objects)
//!     })
//!     .await
//!     .unwrap_or(Ok(0))?;
//!     println!("objects: {count}");
//!     Ok(())
//! }
//! ```
//!
//! ## Tick Order
//!
//! 1. Claim the shard (skip when another thread holds it)
//! 2. Drain the message queue
//! 3. Advance updatables (timers, respawns, waiters, hooks)
//! 4. Update every due object, then apply the moves, deaths and deletions
//!    they requested
//! 5. Every N ticks, push environment updates to characters

pub mod config;
pub mod entity;
pub mod error;
pub mod loot;
pub mod pause;
pub mod persistence;
pub mod queue;
pub mod shard;
pub mod spatial;
pub mod spawn;
pub mod types;
pub mod updatable;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::{PriorityMillis, ShardConfig};
pub use entity::{
    Aura, Brain, BrainAction, Character, CharacterHandle, CharacterInfo, EntityKind, ObjectMut,
    ObjectSnapshot, PeriodicEffect, Session, Unit, WorldObject,
};
pub use error::{SessionError, ShardError, UpdateError};
pub use loot::{LootGrid, LootItem, LootSlot};
pub use pause::WorldPause;
pub use persistence::{NoopPersistence, Persistence};
pub use queue::{Message, MessageQueue};
pub use shard::{
    BrainFactory, EnvironmentUpdate, Shard, ShardBuilder, ShardContext, ShardState, ShardStats, TickOutcome,
    TickReport,
};
pub use spatial::{LeafId, ProximityView, Shape, SpacePartition, SpatialEntry};
pub use spawn::{
    GameObjectTemplate, NpcTemplate, PoolId, SpawnEntry, SpawnKind, SpawnPool, SpawnPoolTemplate, SpawnRef,
};
pub use types::*;
pub use updatable::{TimerControl, UpdatableId, UpdateHook};
pub use utils::{current_timestamp, Clock, ManualClock, SystemClock};
