//! Spawn pools and spawn points.
//!
//! A pool instantiates one [`SpawnPoint`] per template entry. Each point holds
//! at most one active spawnling; the spawnling carries a [`SpawnRef`] back to
//! its point. Both references are always cleared together, so a point never
//! believes it owns an entity that no longer points back at it.
//!
//! This module keeps the bookkeeping; creating and removing the entities is
//! done by the shard context, which owns the entity table.

mod template;

pub use template::{GameObjectTemplate, NpcTemplate, SpawnEntry, SpawnKind, SpawnPoolTemplate};

use crate::types::EntityId;
use crate::updatable::UpdatableId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Identifier of an active spawn pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PoolId(pub u32);

impl std::fmt::Display for PoolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Back-reference from a spawnling to its spawn point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpawnRef {
    pub pool: PoolId,
    pub point: usize,
}

/// A fixed location managing one recurring entity.
#[derive(Debug)]
pub struct SpawnPoint {
    pub(crate) entry: Arc<SpawnEntry>,
    pub(crate) active_spawnling: Option<EntityId>,
    pub(crate) respawn_timer: Option<UpdatableId>,
}

impl SpawnPoint {
    fn new(entry: SpawnEntry) -> Self {
        Self {
            entry: Arc::new(entry),
            active_spawnling: None,
            respawn_timer: None,
        }
    }

    pub fn entry(&self) -> &SpawnEntry {
        &self.entry
    }

    pub fn active_spawnling(&self) -> Option<EntityId> {
        self.active_spawnling
    }

    pub fn is_respawn_pending(&self) -> bool {
        self.respawn_timer.is_some()
    }
}

/// A pool template bound to a shard.
#[derive(Debug)]
pub struct SpawnPool {
    pub(crate) id: PoolId,
    pub(crate) points: Vec<SpawnPoint>,
}

impl SpawnPool {
    pub(crate) fn from_template(template: &SpawnPoolTemplate) -> Self {
        Self {
            id: PoolId(template.pool_id),
            points: template.entries.iter().cloned().map(SpawnPoint::new).collect(),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    pub fn points(&self) -> &[SpawnPoint] {
        &self.points
    }

    /// Number of points currently holding a spawnling.
    pub fn active_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.active_spawnling.is_some())
            .count()
    }
}

/// Active pools of one shard.
#[derive(Debug)]
pub(crate) struct SpawnRegistry {
    pools: HashMap<PoolId, SpawnPool>,
    pub(crate) enabled: bool,
}

impl SpawnRegistry {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            pools: HashMap::new(),
            enabled,
        }
    }

    pub(crate) fn contains(&self, pool: PoolId) -> bool {
        self.pools.contains_key(&pool)
    }

    pub(crate) fn insert(&mut self, pool: SpawnPool) {
        self.pools.insert(pool.id, pool);
    }

    pub(crate) fn remove(&mut self, pool: PoolId) -> Option<SpawnPool> {
        self.pools.remove(&pool)
    }

    pub(crate) fn get(&self, pool: PoolId) -> Option<&SpawnPool> {
        self.pools.get(&pool)
    }

    pub(crate) fn point(&self, at: SpawnRef) -> Option<&SpawnPoint> {
        self.pools.get(&at.pool)?.points.get(at.point)
    }

    pub(crate) fn point_mut(&mut self, at: SpawnRef) -> Option<&mut SpawnPoint> {
        self.pools.get_mut(&at.pool)?.points.get_mut(at.point)
    }

    pub(crate) fn pool_ids(&self) -> Vec<PoolId> {
        self.pools.keys().copied().collect()
    }

    /// Every spawn point reference across all pools.
    pub(crate) fn all_points(&self) -> Vec<SpawnRef> {
        self.pools
            .values()
            .flat_map(|pool| {
                (0..pool.points.len()).map(move |point| SpawnRef {
                    pool: pool.id,
                    point,
                })
            })
            .collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pools.len()
    }

    pub(crate) fn clear(&mut self) {
        self.pools.clear();
    }
}
