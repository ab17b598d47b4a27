//! # World Objects
//!
//! Everything placed in a shard is a [`WorldObject`]: shared placement and
//! scheduling state plus an [`EntityKind`] variant carrying what is specific to
//! characters, NPCs and game objects. Behaviour that differs per kind is
//! dispatched with `match` rather than through overridable hooks.
//!
//! Placement fields (position, partition leaf, map slot) are only written by
//! the owning shard, so the position of an object in the world always agrees
//! with the partition leaf it is stored in. Objects stored in a shard are
//! handed out mutably only as an [`ObjectMut`], which cannot replace the
//! object or touch anything the shard indexes.

mod character;
mod npc;
pub(crate) mod table;
mod unit;

pub use character::{Character, CharacterHandle, CharacterInfo, Session};
pub use npc::{Brain, BrainAction, GameObject, Npc};
pub use table::{EntityTable, SlotAllocator, MAP_SLOT_CAPACITY};
pub use unit::{Aura, AuraTick, DamageLog, PeriodicEffect, ThreatTable, Unit};

use crate::error::UpdateError;
use crate::spatial::{LeafId, ProximityView, SpatialEntry};
use crate::spawn::{GameObjectTemplate, NpcTemplate};
use crate::types::{EntityId, ObjectType, Phase, Position, UpdatePriority};
use serde::Serialize;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// First value handed out by [`next_unique_world_id`].
pub const FIRST_UNIQUE_WORLD_ID: u64 = 200_000;

static NEXT_UNIQUE_WORLD_ID: AtomicU64 = AtomicU64::new(FIRST_UNIQUE_WORLD_ID);

/// Process-wide, strictly increasing secondary id assigned on every add.
pub(crate) fn next_unique_world_id() -> u64 {
    NEXT_UNIQUE_WORLD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Kind-specific state of a world object.
pub enum EntityKind {
    Character(Character),
    Npc(Npc),
    GameObject(GameObject),
}

impl std::fmt::Debug for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Character(c) => f.debug_tuple("Character").field(c).finish(),
            EntityKind::Npc(n) => f.debug_tuple("Npc").field(n).finish(),
            EntityKind::GameObject(g) => f.debug_tuple("GameObject").field(g).finish(),
        }
    }
}

/// An entity placed in a shard.
#[derive(Debug)]
pub struct WorldObject {
    id: EntityId,
    name: Arc<str>,
    position: Position,
    phase: Phase,
    /// Scheduling tier used when the object's area is active
    priority: UpdatePriority,
    pub(crate) kind: EntityKind,
    pub(crate) unique_id: Option<u64>,
    pub(crate) map_slot: Option<u16>,
    pub(crate) node: Option<LeafId>,
    pub(crate) last_update_ms: Option<u64>,
    pub(crate) teleporting: bool,
    pub(crate) deleted: bool,
    pub(crate) dirty: bool,
}

impl WorldObject {
    fn with_kind(name: Arc<str>, position: Position, priority: UpdatePriority, kind: EntityKind) -> Self {
        Self {
            id: EntityId::new(),
            name,
            position,
            phase: Phase::DEFAULT,
            priority,
            kind,
            unique_id: None,
            map_slot: None,
            node: None,
            last_update_ms: None,
            teleporting: false,
            deleted: false,
            dirty: true,
        }
    }

    /// Creates a player character bound to `session`.
    pub fn character(info: CharacterInfo, session: Arc<dyn Session>, position: Position) -> Self {
        let name: Arc<str> = Arc::from(info.name.as_str());
        Self::with_kind(
            name,
            position,
            UpdatePriority::High,
            EntityKind::Character(Character::new(&info, session)),
        )
    }

    /// Creates an NPC from its template.
    pub fn npc(template: Arc<NpcTemplate>, position: Position) -> Self {
        let name: Arc<str> = Arc::from(template.name.as_str());
        let priority = template.priority;
        Self::with_kind(name, position, priority, EntityKind::Npc(Npc::new(template)))
    }

    /// Creates a game object from its template.
    pub fn game_object(template: Arc<GameObjectTemplate>, position: Position) -> Self {
        let name: Arc<str> = Arc::from(template.name.as_str());
        let priority = template.priority;
        Self::with_kind(
            name,
            position,
            priority,
            EntityKind::GameObject(GameObject::new(template)),
        )
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = phase;
        self
    }

    pub fn with_priority(mut self, priority: UpdatePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn priority(&self) -> UpdatePriority {
        self.priority
    }

    /// Name shared with the online-character list.
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Secondary id assigned when the object was added to a shard.
    pub fn unique_id(&self) -> Option<u64> {
        self.unique_id
    }

    /// 16-bit protocol slot, held by NPCs and game objects while in a shard.
    pub fn map_slot(&self) -> Option<u16> {
        self.map_slot
    }

    /// Partition leaf currently holding the object.
    pub fn node(&self) -> Option<LeafId> {
        self.node
    }

    pub fn last_update_ms(&self) -> Option<u64> {
        self.last_update_ms
    }

    pub fn is_in_world(&self) -> bool {
        self.node.is_some()
    }

    pub fn is_teleporting(&self) -> bool {
        self.teleporting
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Flags the object for the next environment push.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn object_type(&self) -> ObjectType {
        match self.kind {
            EntityKind::Character(_) => ObjectType::Character,
            EntityKind::Npc(_) => ObjectType::Npc,
            EntityKind::GameObject(_) => ObjectType::GameObject,
        }
    }

    /// Template entry of NPCs and game objects, 0 for characters.
    pub fn entry_id(&self) -> u32 {
        match &self.kind {
            EntityKind::Character(_) => 0,
            EntityKind::Npc(npc) => npc.template.entry_id,
            EntityKind::GameObject(go) => go.template.entry_id,
        }
    }

    pub fn as_unit(&self) -> Option<&Unit> {
        match &self.kind {
            EntityKind::Character(c) => Some(&c.unit),
            EntityKind::Npc(n) => Some(&n.unit),
            EntityKind::GameObject(_) => None,
        }
    }

    pub(crate) fn as_unit_mut(&mut self) -> Option<&mut Unit> {
        match &mut self.kind {
            EntityKind::Character(c) => Some(&mut c.unit),
            EntityKind::Npc(n) => Some(&mut n.unit),
            EntityKind::GameObject(_) => None,
        }
    }

    pub fn as_character(&self) -> Option<&Character> {
        match &self.kind {
            EntityKind::Character(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_npc(&self) -> Option<&Npc> {
        match &self.kind {
            EntityKind::Npc(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn as_npc_mut(&mut self) -> Option<&mut Npc> {
        match &mut self.kind {
            EntityKind::Npc(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_spirit_healer(&self) -> bool {
        self.as_npc().is_some_and(|npc| npc.template.spirit_healer)
    }

    pub(crate) fn set_position(&mut self, position: Position) {
        self.position = position;
        self.dirty = true;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.dirty = true;
    }

    pub(crate) fn spatial_entry(&self) -> SpatialEntry {
        SpatialEntry {
            id: self.id,
            point: self.position.point,
            phase: self.phase,
            kind: self.object_type(),
            entry_id: self.entry_id(),
        }
    }

    /// Serializable view pushed to clients.
    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            id: self.id,
            unique_id: self.unique_id,
            map_slot: self.map_slot,
            kind: self.object_type(),
            entry_id: self.entry_id(),
            name: self.name.to_string(),
            position: self.position,
            phase: self.phase,
            health: self.as_unit().map(|u| u.health()),
        }
    }

    /// Per-tick update of the object itself.
    ///
    /// Runs auras, corpse decay and the NPC brain. Structural changes (moves,
    /// deletion, death handling) are reported back to the shard rather than
    /// applied here.
    pub(crate) fn update(&mut self, view: &ProximityView<'_>, delta_ms: u64) -> Result<ObjectUpdate, UpdateError> {
        let mut outcome = ObjectUpdate::default();

        if let Some(unit) = self.as_unit_mut() {
            if !unit.auras.is_empty() {
                let was_alive = unit.is_alive();
                let tick = unit.update_auras(delta_ms);
                outcome.died = was_alive && tick.killed;
                if tick.expired > 0 || tick.killed {
                    self.dirty = true;
                }
            }
        }

        let EntityKind::Npc(npc) = &mut self.kind else {
            return Ok(outcome);
        };

        if let Some(remaining) = npc.decay_remaining_ms.as_mut() {
            *remaining = remaining.saturating_sub(delta_ms);
            outcome.decayed = *remaining == 0;
            return Ok(outcome);
        }

        if outcome.died || !npc.brain_running || !npc.unit.is_alive() {
            return Ok(outcome);
        }
        let Some(mut brain) = npc.brain.take() else {
            return Ok(outcome);
        };
        let result = brain.update(self, view, delta_ms);
        if let EntityKind::Npc(npc) = &mut self.kind {
            npc.brain = Some(brain);
        }
        match result? {
            BrainAction::Idle => {}
            BrainAction::MoveTo(target) => outcome.move_to = Some(target),
            BrainAction::Despawn => outcome.despawn = true,
        }
        Ok(outcome)
    }
}

/// Mutable handle to an object stored in a shard.
///
/// Reads go through [`Deref`]. Writes are limited to the brain, the update
/// tier and the dirty flag; health changes go through the context's combat
/// operations so deaths are always handled. The object itself can't be
/// swapped out through it.
pub struct ObjectMut<'a> {
    object: &'a mut WorldObject,
}

impl<'a> ObjectMut<'a> {
    pub(crate) fn new(object: &'a mut WorldObject) -> Self {
        Self { object }
    }

    /// Attaches and starts a brain.
    ///
    /// # Returns
    ///
    /// False when the object is not an NPC.
    pub fn set_brain(&mut self, brain: Box<dyn Brain>) -> bool {
        match self.object.as_npc_mut() {
            Some(npc) => {
                npc.set_brain(brain);
                true
            }
            None => false,
        }
    }

    /// Halts the brain of an NPC; the brain stays attached.
    pub fn stop_brain(&mut self) -> bool {
        match self.object.as_npc_mut() {
            Some(npc) => {
                npc.stop_brain();
                true
            }
            None => false,
        }
    }

    pub fn set_priority(&mut self, priority: UpdatePriority) {
        self.object.priority = priority;
    }

    pub fn mark_dirty(&mut self) {
        self.object.dirty = true;
    }
}

impl Deref for ObjectMut<'_> {
    type Target = WorldObject;

    fn deref(&self) -> &WorldObject {
        self.object
    }
}

/// Structural changes requested by an object update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub(crate) struct ObjectUpdate {
    pub move_to: Option<Position>,
    pub despawn: bool,
    pub died: bool,
    pub decayed: bool,
}

/// Client-facing state of one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectSnapshot {
    pub id: EntityId,
    pub unique_id: Option<u64>,
    pub map_slot: Option<u16>,
    pub kind: ObjectType,
    pub entry_id: u32,
    pub name: String,
    pub position: Position,
    pub phase: Phase,
    pub health: Option<u32>,
}
