//! Spawn pool operations on the shard context.

use super::ShardContext;
use crate::entity::{EntityKind, WorldObject};
use crate::error::ShardError;
use crate::spawn::{PoolId, SpawnKind, SpawnPool, SpawnPoolTemplate, SpawnPoint, SpawnRef};
use crate::types::{EntityId, Vec3};
use crate::updatable::Updatable;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl ShardContext<'_> {
    /// Binds a pool template to this shard and spawns its auto-spawn entries.
    pub fn add_pool_now(&mut self, template: &SpawnPoolTemplate) -> Result<PoolId, ShardError> {
        let pool = SpawnPool::from_template(template);
        let id = pool.id();
        if self.world.spawns.contains(id) {
            warn!("⚠️ Spawn pool {} is already active on shard '{}'", id, self.shard().name);
            return Err(ShardError::DuplicatePool(id.0));
        }
        let auto: Vec<usize> = pool
            .points()
            .iter()
            .enumerate()
            .filter(|(_, point)| point.entry().auto_spawn)
            .map(|(index, _)| index)
            .collect();
        let points = pool.points().len();
        self.world.spawns.insert(pool);

        let mut spawned = 0;
        for point in auto {
            if let Ok(Some(_)) = self.spawn_point_now(SpawnRef { pool: id, point }) {
                spawned += 1;
            }
        }
        info!(
            "🌱 Spawn pool {} added to shard '{}' ({} points, {} spawned)",
            id,
            self.shard().name,
            points,
            spawned
        );
        Ok(id)
    }

    /// Removes a pool, its pending respawns and every active spawnling.
    ///
    /// # Returns
    ///
    /// False when the pool is not active; removing twice is harmless.
    pub fn remove_pool_now(&mut self, id: PoolId) -> bool {
        let Some(pool) = self.world.spawns.remove(id) else {
            debug!("Spawn pool {} is not active on shard '{}'", id, self.shard().name);
            return false;
        };

        let mut spawnlings = Vec::new();
        for point in pool.points {
            if let Some(timer) = point.respawn_timer {
                self.world.updatables.unregister(timer);
            }
            if let Some(spawnling) = point.active_spawnling {
                spawnlings.push(spawnling);
            }
        }
        for spawnling in &spawnlings {
            if let Some(object) = self.world.entities.get_mut(spawnling) {
                match &mut object.kind {
                    EntityKind::Npc(npc) => npc.spawn_ref = None,
                    EntityKind::GameObject(go) => go.spawn_ref = None,
                    EntityKind::Character(_) => {}
                }
            }
        }
        for spawnling in spawnlings {
            if let Err(e) = self.remove_object(spawnling) {
                debug!("Spawnling {} of {} was already gone: {}", spawnling, id, e);
            }
        }
        info!("🍂 Spawn pool {} removed from shard '{}'", id, self.shard().name);
        true
    }

    /// Attempts to spawn the entity of one spawn point.
    ///
    /// A failed probability roll or a refused add re-arms the point's
    /// respawn timer.
    ///
    /// # Returns
    ///
    /// The new spawnling's id, `None` when the point is occupied or the roll
    /// failed.
    pub fn spawn_point_now(&mut self, at: SpawnRef) -> Result<Option<EntityId>, ShardError> {
        let point = self
            .world
            .spawns
            .point_mut(at)
            .ok_or(ShardError::UnknownPool(at.pool.0))?;
        if point.active_spawnling.is_some() {
            return Ok(None);
        }
        point.respawn_timer = None;
        let entry = Arc::clone(&point.entry);

        let roll: f32 = self.world.rng.gen();
        if roll >= entry.probability {
            debug!("🎲 Spawn {} of {} skipped by probability roll", entry.spawn_id, at.pool);
            self.schedule_respawn(at);
            return Ok(None);
        }

        let mut object = match &entry.kind {
            SpawnKind::Npc(template) => {
                let mut object = WorldObject::npc(Arc::new(template.clone()), entry.position);
                if let EntityKind::Npc(npc) = &mut object.kind {
                    npc.spawn_ref = Some(at);
                }
                object
            }
            SpawnKind::GameObject(template) => {
                let mut object = WorldObject::game_object(Arc::new(template.clone()), entry.position);
                if let EntityKind::GameObject(go) = &mut object.kind {
                    go.spawn_ref = Some(at);
                }
                object
            }
        };
        object = object.with_phase(entry.phase);

        let id = match self.add_object_now(object) {
            Ok(id) => id,
            Err(e) => {
                warn!(
                    "⚠️ Spawn {} of {} failed, retrying after its respawn delay: {}",
                    entry.spawn_id, at.pool, e
                );
                self.schedule_respawn(at);
                return Err(e);
            }
        };
        if let Some(point) = self.world.spawns.point_mut(at) {
            point.active_spawnling = Some(id);
        }
        Ok(Some(id))
    }

    /// Respawn entry point used by the respawn updatable.
    pub(crate) fn respawn_spawn_point(&mut self, pool: PoolId, point: usize) -> Result<(), ShardError> {
        let at = SpawnRef { pool, point };
        if let Some(point) = self.world.spawns.point_mut(at) {
            point.respawn_timer = None;
        } else {
            return Ok(());
        }
        if let Some(id) = self.spawn_point_now(at)? {
            debug!("🔄 Respawned {} at {} point {}", id, pool, at.point);
        }
        Ok(())
    }

    /// Starts the respawn countdown of a point, unless respawns are disabled
    /// or a countdown is already running.
    pub(crate) fn schedule_respawn(&mut self, at: SpawnRef) {
        if !self.world.spawns.enabled {
            return;
        }
        let Some(point) = self.world.spawns.point(at) else {
            return;
        };
        if point.active_spawnling.is_some()
            || point
                .respawn_timer
                .is_some_and(|timer| self.world.updatables.contains(timer))
        {
            return;
        }
        let remaining_ms = point.entry.respawn_delay_ms;
        let now = self.now_ms();
        let timer = self.world.updatables.register(
            Updatable::Respawn {
                pool: at.pool,
                point: at.point,
                remaining_ms,
            },
            now,
        );
        if let Some(point) = self.world.spawns.point_mut(at) {
            point.respawn_timer = Some(timer);
        }
    }

    /// Tells a spawn point its spawnling died or left, clearing the forward
    /// reference and arming the respawn timer.
    pub fn signal_spawnling_died(&mut self, at: SpawnRef, spawnling: EntityId) {
        let Some(point) = self.world.spawns.point_mut(at) else {
            return;
        };
        if point.active_spawnling != Some(spawnling) {
            return;
        }
        point.active_spawnling = None;
        self.schedule_respawn(at);
    }

    /// Immediately respawns every empty spawn point within `radius`.
    ///
    /// # Returns
    ///
    /// Number of entities spawned.
    pub fn respawn_in_radius(&mut self, center: Vec3, radius: f32) -> usize {
        let radius_sq = radius * radius;
        let targets: Vec<SpawnRef> = self
            .world
            .spawns
            .all_points()
            .into_iter()
            .filter(|at| {
                self.world.spawns.point(*at).is_some_and(|p| {
                    p.active_spawnling.is_none() && p.entry.position.distance_sq(&center) <= radius_sq
                })
            })
            .collect();

        let mut spawned = 0;
        for at in targets {
            if let Some(timer) = self.world.spawns.point_mut(at).and_then(|p| p.respawn_timer.take()) {
                self.world.updatables.unregister(timer);
            }
            match self.spawn_point_now(at) {
                Ok(Some(_)) => spawned += 1,
                Ok(None) => {}
                Err(e) => warn!("⚠️ Respawn at {} point {} failed: {}", at.pool, at.point, e),
            }
        }
        spawned
    }

    /// Enables or disables respawning. Disabling cancels pending respawns;
    /// enabling arms a respawn for every empty point.
    pub fn set_spawn_points_enabled(&mut self, enabled: bool) {
        if self.world.spawns.enabled == enabled {
            return;
        }
        self.world.spawns.enabled = enabled;
        for at in self.world.spawns.all_points() {
            if enabled {
                self.schedule_respawn(at);
            } else if let Some(timer) = self.world.spawns.point_mut(at).and_then(|p| p.respawn_timer.take()) {
                self.world.updatables.unregister(timer);
            }
        }
        info!(
            "🌱 Spawn points {} on shard '{}'",
            if enabled { "enabled" } else { "disabled" },
            self.shard().name
        );
    }

    /// Adds every pool the shard was configured with. Runs at most once.
    ///
    /// # Returns
    ///
    /// Number of pools added.
    pub fn spawn_map(&mut self) -> usize {
        if self.world.map_spawned {
            return 0;
        }
        self.world.map_spawned = true;
        let templates = self.shard().pool_templates.clone();
        templates
            .iter()
            .filter(|template| self.add_pool_now(template).is_ok())
            .count()
    }

    pub fn pool(&self, id: PoolId) -> Option<&SpawnPool> {
        self.world.spawns.get(id)
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.world.spawns.pool_ids()
    }

    pub fn spawn_point(&self, at: SpawnRef) -> Option<&SpawnPoint> {
        self.world.spawns.point(at)
    }
}
