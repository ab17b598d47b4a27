//! The shard context handle and everything that requires it.

use super::{Shard, World};
use crate::entity::{CharacterHandle, EntityKind, ObjectMut, WorldObject};
use crate::error::ShardError;
use crate::loot::{LootGrid, LootItem, LootSlot};
use crate::spatial::{LeafId, Shape, SpatialEntry};
use crate::types::{EntityId, FactionGroup, Locale, MapId, ObjectType, ObjectTypeMask, Phase, Position, Vec3};
use crate::updatable::{Timer, Updatable, UpdatableId, UpdateHook};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Exclusive access to a shard's state.
///
/// Only obtainable by the thread that claimed the shard (the tick loop, a
/// message, an updatable, or [`Shard::with_context`]). The handle is neither
/// `Send` nor `Sync`, so it cannot leave that thread.
pub struct ShardContext<'a> {
    shard: &'a Shard,
    pub(crate) world: &'a mut World,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ShardContext<'a> {
    pub(crate) fn enter(shard: &'a Shard, world: &'a mut World) -> Result<Self, ShardError> {
        shard.ensure_context("enter shard context")?;
        Ok(Self {
            shard,
            world,
            _not_send: PhantomData,
        })
    }

    pub fn shard(&self) -> &'a Shard {
        self.shard
    }

    pub fn map_id(&self) -> MapId {
        self.shard.map_id
    }

    pub fn now_ms(&self) -> u64 {
        self.shard.clock.now_millis()
    }

    /// Number of ticks this shard has executed.
    pub fn tick_count(&self) -> u64 {
        self.world.tick_count
    }

    /// One-time start-up work queued by [`Shard::start`].
    pub(crate) fn initialize(&mut self) {
        if self.world.initialized {
            return;
        }
        self.world.initialized = true;
        if self.shard.config.auto_spawn {
            self.spawn_map();
        }
        let lifetime = self.shard.config.loot_lifetime_ms;
        self.call_periodically(lifetime.max(1), move |ctx| {
            let cutoff = ctx.now_ms().saturating_sub(lifetime);
            let cleared = ctx.world.loot.clear_older_than(cutoff);
            if cleared > 0 {
                debug!("🧹 Swept {} expired loot items on shard '{}'", cleared, ctx.shard.name);
            }
        });
    }

    // ------------------------------------------------------------------
    // Add / remove
    // ------------------------------------------------------------------

    /// Places an object in the entity table and the space partition.
    ///
    /// # Returns
    ///
    /// The object's id, or an error when it is deleted, already present,
    /// outside the shard bounds, or no map slot is free. Nothing changes on
    /// failure.
    pub fn add_object_now(&mut self, object: WorldObject) -> Result<EntityId, ShardError> {
        let id = object.id();
        if object.is_deleted() {
            warn!("⚠️ Refusing to add deleted object {} to shard '{}'", id, self.shard.name);
            return Err(ShardError::DeletedObject(id));
        }
        let point = object.position().point;
        if !self.world.partition.contains_point(&point) {
            warn!(
                "⚠️ Refusing to add {} to shard '{}': ({}, {}, {}) is out of bounds",
                id, self.shard.name, point.x, point.y, point.z
            );
            return Err(ShardError::OutOfBounds(point));
        }

        let World {
            entities,
            partition,
            ..
        } = &mut *self.world;
        let stored = entities.insert(object).map_err(|e| {
            warn!("⚠️ Adding {} to shard '{}' failed: {}", id, self.shard.name, e);
            e
        })?;
        let leaf = match partition.add_object(stored.spatial_entry()) {
            Ok(leaf) => leaf,
            Err(e) => {
                entities.remove(&id);
                return Err(e);
            }
        };
        stored.node = Some(leaf);
        stored.last_update_ms = None;
        stored.dirty = true;

        if let EntityKind::Npc(npc) = &mut stored.kind {
            if npc.brain.is_none() && npc.template.brain.is_some() {
                if let Some(factory) = &self.shard.brain_factory {
                    if let Some(brain) = factory(&npc.template) {
                        npc.set_brain(brain);
                    }
                }
            }
        }
        if let EntityKind::Character(character) = &stored.kind {
            let handle = CharacterHandle::new(id, Arc::clone(stored.name()), self.shard.map_id, character);
            self.shard.online.insert(id, handle);
        }
        debug!("➕ {} '{}' added to shard '{}'", stored.object_type(), stored.name(), self.shard.name);
        Ok(id)
    }

    /// Takes an object out of the shard, clearing its spawn point link.
    ///
    /// The returned object is detached and may be added to another shard.
    pub fn remove_object_now(&mut self, id: EntityId) -> Result<WorldObject, ShardError> {
        self.shard.ensure_not_updating("remove_object_now")?;
        if !self.world.entities.contains(&id) {
            return Err(ShardError::UnknownObject(id));
        }

        let spawn_ref = match self.world.entities.get_mut(&id).map(|o| &mut o.kind) {
            Some(EntityKind::Npc(npc)) => npc.spawn_ref.take(),
            Some(EntityKind::GameObject(go)) => go.spawn_ref.take(),
            _ => None,
        };
        if let Some(at) = spawn_ref {
            self.signal_spawnling_died(at, id);
        }

        let mut object = self
            .world
            .entities
            .remove(&id)
            .ok_or(ShardError::UnknownObject(id))?;
        if let Some(leaf) = object.node.take() {
            self.world.partition.remove_object(id, leaf);
        }
        object.last_update_ms = None;
        self.shard.online.remove(&id);
        debug!("➖ {} '{}' removed from shard '{}'", object.object_type(), object.name(), self.shard.name);
        Ok(object)
    }

    /// Removes an object and marks it deleted so it can never be re-added.
    pub fn delete_object_now(&mut self, id: EntityId) -> Result<WorldObject, ShardError> {
        let mut object = self.remove_object_now(id)?;
        object.deleted = true;
        if let EntityKind::Npc(npc) = &mut object.kind {
            npc.stop_brain();
        }
        Ok(object)
    }

    /// Adds now, or later when the object update pass is in progress.
    pub fn add_object(&mut self, object: WorldObject) -> Result<EntityId, ShardError> {
        if self.shard.is_updating() {
            let id = object.id();
            self.shard.add_object_later(object);
            return Ok(id);
        }
        self.add_object_now(object)
    }

    /// Deletes now, or later when the object update pass is in progress.
    pub fn remove_object(&mut self, id: EntityId) -> Result<(), ShardError> {
        if self.shard.is_updating() {
            self.shard.remove_object_later(id);
            return Ok(());
        }
        self.delete_object_now(id).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Placement
    // ------------------------------------------------------------------

    /// Moves an object, keeping its position and partition leaf in agreement.
    ///
    /// Points outside the shard bounds are refused and leave the object
    /// where it was.
    pub fn move_object(&mut self, id: EntityId, position: Position) -> Result<LeafId, ShardError> {
        let World {
            entities,
            partition,
            ..
        } = &mut *self.world;
        let object = entities.get_mut(&id).ok_or(ShardError::UnknownObject(id))?;
        let from = object.node.ok_or(ShardError::UnknownObject(id))?;
        let leaf = partition.move_object(id, from, position.point)?;
        object.node = Some(leaf);
        object.set_position(position);
        Ok(leaf)
    }

    pub fn set_phase(&mut self, id: EntityId, phase: Phase) -> Result<(), ShardError> {
        let World {
            entities,
            partition,
            ..
        } = &mut *self.world;
        let object = entities.get_mut(&id).ok_or(ShardError::UnknownObject(id))?;
        if let Some(leaf) = object.node {
            partition.set_phase(id, leaf, phase);
        }
        object.set_phase(phase);
        Ok(())
    }

    /// Teleporting objects are skipped by the object update pass.
    pub fn set_teleporting(&mut self, id: EntityId, teleporting: bool) -> Result<(), ShardError> {
        let object = self
            .world
            .entities
            .get_mut(&id)
            .ok_or(ShardError::UnknownObject(id))?;
        object.teleporting = teleporting;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lookups and queries
    // ------------------------------------------------------------------

    pub fn get_object(&self, id: &EntityId) -> Option<&WorldObject> {
        self.world.entities.get(id)
    }

    /// Mutable handle to a stored object; see [`ObjectMut`] for what it allows.
    pub fn get_object_mut(&mut self, id: &EntityId) -> Option<ObjectMut<'_>> {
        self.world.entities.get_mut(id).map(ObjectMut::new)
    }

    pub fn object_by_map_slot(&self, slot: u16) -> Option<&WorldObject> {
        self.world.entities.by_map_slot(slot)
    }

    pub fn object_count(&self) -> usize {
        self.world.entities.len()
    }

    /// Ids of every object, safe to iterate while mutating the shard.
    pub fn copy_objects(&self) -> Vec<EntityId> {
        self.world.entities.ids()
    }

    pub fn is_point_in_map(&self, point: &Vec3) -> bool {
        self.world.partition.contains_point(point)
    }

    /// Whether any character is in the partition leaf holding `point`.
    pub fn is_area_active(&self, point: &Vec3) -> bool {
        self.world
            .partition
            .leaf_from_point(point)
            .is_some_and(|leaf| self.world.partition.is_leaf_active(leaf))
    }

    pub fn leaf_from_point(&self, point: &Vec3) -> Option<LeafId> {
        self.world.partition.leaf_from_point(point)
    }

    pub fn leaf_contains(&self, leaf: LeafId, id: EntityId) -> bool {
        self.world.partition.leaf_contains(leaf, id)
    }

    pub fn objects_in_radius(
        &self,
        center: Vec3,
        radius: f32,
        filter: ObjectTypeMask,
        phase: Phase,
    ) -> Vec<SpatialEntry> {
        self.world
            .partition
            .entities_in_area(&Shape::sphere(center, radius), filter, phase, usize::MAX)
    }

    pub fn objects_in_box(&self, min: Vec3, max: Vec3, filter: ObjectTypeMask, phase: Phase) -> Vec<SpatialEntry> {
        self.world
            .partition
            .entities_in_area(&Shape::aabb(min, max), filter, phase, usize::MAX)
    }

    /// Visits objects inside `shape` until `predicate` returns false.
    ///
    /// # Returns
    ///
    /// False when the walk was cut short.
    pub fn iterate_objects<F>(&self, shape: &Shape, phase: Phase, predicate: F) -> bool
    where
        F: FnMut(&SpatialEntry) -> bool,
    {
        self.world.partition.iterate(shape, phase, predicate)
    }

    fn nearest_by<F>(&self, center: Vec3, phase: Phase, kind: ObjectType, matches: F) -> Option<EntityId>
    where
        F: Fn(&SpatialEntry) -> bool,
    {
        self.world
            .entities
            .iter()
            .filter(|o| o.object_type() == kind && o.phase().overlaps(phase) && o.is_in_world())
            .map(|o| o.spatial_entry())
            .filter(|entry| matches(entry))
            .min_by(|a, b| a.point.distance_sq(&center).total_cmp(&b.point.distance_sq(&center)))
            .map(|entry| entry.id)
    }

    /// Closest spirit healer visible in `phase`, at any distance.
    pub fn nearest_spirit_healer(&self, center: Vec3, phase: Phase) -> Option<EntityId> {
        self.world
            .entities
            .spirit_healer_ids()
            .filter_map(|id| self.world.entities.get(id))
            .filter(|o| o.phase().overlaps(phase))
            .min_by(|a, b| {
                a.position()
                    .distance_sq(&center)
                    .total_cmp(&b.position().distance_sq(&center))
            })
            .map(|o| o.id())
    }

    /// Closest NPC with template `entry_id`.
    pub fn nearest_npc(&self, center: Vec3, phase: Phase, entry_id: u32) -> Option<EntityId> {
        self.nearest_by(center, phase, ObjectType::Npc, |e| e.entry_id == entry_id)
    }

    /// Closest game object with template `entry_id`.
    pub fn nearest_game_object(&self, center: Vec3, phase: Phase, entry_id: u32) -> Option<EntityId> {
        self.nearest_by(center, phase, ObjectType::GameObject, |e| e.entry_id == entry_id)
    }

    // ------------------------------------------------------------------
    // Characters
    // ------------------------------------------------------------------

    pub fn characters(&self) -> Vec<EntityId> {
        self.world.entities.character_ids().copied().collect()
    }

    pub fn characters_by_locale(&self, locale: Locale) -> Vec<EntityId> {
        self.world.entities.characters_by_locale(locale).copied().collect()
    }

    pub fn character_count(&self) -> usize {
        self.world.entities.character_count()
    }

    pub fn alliance_players(&self) -> usize {
        self.world.entities.alliance_players()
    }

    pub fn horde_players(&self) -> usize {
        self.world.entities.horde_players()
    }

    /// Calls `f` for every character in the shard.
    pub fn call_on_all_characters<F>(&mut self, mut f: F)
    where
        F: FnMut(ObjectMut<'_>),
    {
        for id in self.characters() {
            if let Some(object) = self.world.entities.get_mut(&id) {
                f(ObjectMut::new(object));
            }
        }
    }

    /// Calls `f` for every NPC in the shard.
    pub fn call_on_all_npcs<F>(&mut self, mut f: F)
    where
        F: FnMut(ObjectMut<'_>),
    {
        for object in self.world.entities.iter_mut() {
            if object.object_type() == ObjectType::Npc {
                f(ObjectMut::new(object));
            }
        }
    }

    /// Moves a character to another faction, updating the faction head
    /// counts and its online-list entry.
    pub fn set_character_faction(&mut self, id: EntityId, faction: FactionGroup) -> Result<(), ShardError> {
        if !self.world.entities.set_character_faction(&id, faction) {
            return Err(ShardError::UnknownObject(id));
        }
        if let Some(mut handle) = self.shard.online.get_mut(&id) {
            handle.faction = faction;
        }
        if let Some(object) = self.world.entities.get_mut(&id) {
            object.mark_dirty();
        }
        Ok(())
    }

    /// Moves a character to another locale, updating the per-locale index
    /// and its online-list entry.
    pub fn set_character_locale(&mut self, id: EntityId, locale: Locale) -> Result<(), ShardError> {
        if !self.world.entities.set_character_locale(&id, locale) {
            return Err(ShardError::UnknownObject(id));
        }
        if let Some(mut handle) = self.shard.online.get_mut(&id) {
            handle.locale = locale;
        }
        Ok(())
    }

    /// Sends a packet to one character.
    ///
    /// # Returns
    ///
    /// False when `id` is not a character here or the session refused it.
    pub fn send(&self, id: &EntityId, packet: &[u8]) -> bool {
        let Some(character) = self.world.entities.get(id).and_then(|o| o.as_character()) else {
            return false;
        };
        match character.send(packet) {
            Ok(()) => true,
            Err(e) => {
                debug!("📪 Send to {} failed: {}", id, e);
                false
            }
        }
    }

    /// Sends a packet to every character within broadcast range of `center`.
    ///
    /// # Returns
    ///
    /// Number of successful deliveries.
    pub fn send_to_area(&self, center: Vec3, phase: Phase, packet: &[u8]) -> usize {
        self.objects_in_radius(
            center,
            self.shard.config.broadcast_range,
            ObjectTypeMask::CHARACTERS,
            phase,
        )
        .iter()
        .filter(|entry| self.send(&entry.id, packet))
        .count()
    }

    // ------------------------------------------------------------------
    // Updatables
    // ------------------------------------------------------------------

    pub(crate) fn register_updatable(&mut self, updatable: Updatable) -> UpdatableId {
        let now = self.now_ms();
        self.world.updatables.register(updatable, now)
    }

    /// Runs `action` once after `delay_ms` of shard time.
    pub fn call_delayed<F>(&mut self, delay_ms: u64, action: F) -> UpdatableId
    where
        F: FnOnce(&mut ShardContext<'_>) + Send + 'static,
    {
        let mut action = Some(action);
        let timer = Timer::once(
            delay_ms,
            Box::new(move |ctx: &mut ShardContext<'_>| {
                if let Some(action) = action.take() {
                    action(ctx);
                }
            }),
        );
        self.register_updatable(Updatable::Timer(timer))
    }

    /// Runs `action` every `interval_ms` of shard time until unregistered.
    pub fn call_periodically<F>(&mut self, interval_ms: u64, action: F) -> UpdatableId
    where
        F: FnMut(&mut ShardContext<'_>) + Send + 'static,
    {
        self.register_updatable(Updatable::Timer(Timer::periodic(interval_ms, Box::new(action))))
    }

    pub fn register_hook(&mut self, hook: Box<dyn UpdateHook>) -> UpdatableId {
        self.register_updatable(Updatable::Hook(hook))
    }

    /// Cancels an updatable. Stale ids are ignored.
    pub fn unregister_updatable(&mut self, id: UpdatableId) -> bool {
        self.world.updatables.unregister(id)
    }

    pub fn is_updatable_registered(&self, id: UpdatableId) -> bool {
        self.world.updatables.contains(id)
    }

    pub fn updatable_count(&self) -> usize {
        self.world.updatables.len()
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    /// Saves an object through the persistence collaborator.
    pub fn save_now(&self, id: EntityId) -> bool {
        match self.world.entities.get(&id) {
            Some(object) => self.shard.persistence.save_now(object),
            None => false,
        }
    }

    /// Saves a character, removes it from the shard and kicks its session.
    pub fn logout_now(&mut self, id: EntityId, reason: &str) -> Result<(), ShardError> {
        if !self.save_now(id) {
            warn!("💾 Save of {} failed during logout from shard '{}'", id, self.shard.name);
        }
        let object = self.remove_object_now(id)?;
        if let Some(character) = object.as_character() {
            character.session().kick(reason);
            info!("👋 '{}' logged out of shard '{}': {}", object.name(), self.shard.name, reason);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Loot
    // ------------------------------------------------------------------

    pub fn loot(&self) -> &LootGrid {
        &self.world.loot
    }

    /// Loot grid cell covering a world point.
    pub fn loot_cell_of(&self, point: &Vec3) -> Option<LootSlot> {
        LootGrid::cell_of(point, &self.shard.bounds)
    }

    pub fn pick_up_loot(&mut self, slot: LootSlot, picker: EntityId) -> Option<LootItem> {
        self.world.loot.try_pick_up(slot, picker)
    }

    pub fn clear_loot_slot(&mut self, slot: LootSlot) -> Option<LootItem> {
        self.world.loot.clear_slot(slot)
    }
}
