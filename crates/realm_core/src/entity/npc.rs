//! NPCs, their brains, and static game objects.
use super::{Unit, WorldObject};
use crate::error::UpdateError;
use crate::spatial::ProximityView;
use crate::spawn::{GameObjectTemplate, NpcTemplate, SpawnRef};
use crate::types::Position;
use std::sync::Arc;

/// What a brain asks the shard to do after thinking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrainAction {
    Idle,
    MoveTo(Position),
    Despawn,
}

/// AI state machine driving an NPC.
///
/// Brains only read the world; any change they want is returned as a
/// [`BrainAction`] and applied by the shard after the update.
pub trait Brain: Send {
    fn update(
        &mut self,
        me: &WorldObject,
        nearby: &ProximityView<'_>,
        delta_ms: u64,
    ) -> Result<BrainAction, UpdateError>;
}

/// AI-controlled creature tied to an optional spawn point.
pub struct Npc {
    pub unit: Unit,
    pub(crate) template: Arc<NpcTemplate>,
    pub(crate) brain: Option<Box<dyn Brain>>,
    pub(crate) brain_running: bool,
    pub(crate) spawn_ref: Option<SpawnRef>,
    pub(crate) decay_remaining_ms: Option<u64>,
}

impl Npc {
    pub(crate) fn new(template: Arc<NpcTemplate>) -> Self {
        Self {
            unit: Unit::new(template.level, template.max_health),
            template,
            brain: None,
            brain_running: false,
            spawn_ref: None,
            decay_remaining_ms: None,
        }
    }

    pub fn template(&self) -> &Arc<NpcTemplate> {
        &self.template
    }

    /// Attaches a brain and starts it.
    pub fn set_brain(&mut self, brain: Box<dyn Brain>) {
        self.brain = Some(brain);
        self.brain_running = true;
    }

    pub fn has_brain(&self) -> bool {
        self.brain.is_some()
    }

    pub fn is_brain_running(&self) -> bool {
        self.brain_running
    }

    pub fn stop_brain(&mut self) {
        self.brain_running = false;
    }

    /// Spawn point this NPC is the active spawnling of.
    pub fn spawn_ref(&self) -> Option<SpawnRef> {
        self.spawn_ref
    }

    /// Whether the corpse is waiting to decay.
    pub fn is_decaying(&self) -> bool {
        self.decay_remaining_ms.is_some()
    }
}

impl std::fmt::Debug for Npc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Npc")
            .field("entry_id", &self.template.entry_id)
            .field("unit", &self.unit)
            .field("has_brain", &self.brain.is_some())
            .field("brain_running", &self.brain_running)
            .field("spawn_ref", &self.spawn_ref)
            .field("decay_remaining_ms", &self.decay_remaining_ms)
            .finish()
    }
}

/// Static world object.
#[derive(Debug)]
pub struct GameObject {
    pub template: Arc<GameObjectTemplate>,
    pub(crate) spawn_ref: Option<SpawnRef>,
}

impl GameObject {
    pub(crate) fn new(template: Arc<GameObjectTemplate>) -> Self {
        Self {
            template,
            spawn_ref: None,
        }
    }

    pub fn spawn_ref(&self) -> Option<SpawnRef> {
        self.spawn_ref
    }
}
