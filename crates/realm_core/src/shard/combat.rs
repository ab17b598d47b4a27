//! Unit combat on the shard context: damage, healing, auras and death.

use super::ShardContext;
use crate::entity::{Aura, EntityKind};
use crate::error::ShardError;
use crate::loot::LootGrid;
use crate::types::EntityId;
use tracing::{debug, info, warn};

impl ShardContext<'_> {
    /// Applies damage from `attacker` to `target`, handling the death if the
    /// blow was fatal.
    ///
    /// # Returns
    ///
    /// True when the target died from this hit.
    pub fn deal_damage(&mut self, attacker: Option<EntityId>, target: EntityId, amount: u32) -> Result<bool, ShardError> {
        let object = self
            .world
            .entities
            .get_mut(&target)
            .ok_or(ShardError::UnknownObject(target))?;
        let Some(unit) = object.as_unit_mut() else {
            return Ok(false);
        };
        if !unit.is_alive() {
            return Ok(false);
        }
        let killed = unit.apply_damage(attacker, amount);
        object.mark_dirty();
        if killed {
            self.handle_death(target);
        }
        Ok(killed)
    }

    pub fn heal(&mut self, target: EntityId, amount: u32) -> Result<(), ShardError> {
        let object = self
            .world
            .entities
            .get_mut(&target)
            .ok_or(ShardError::UnknownObject(target))?;
        if let Some(unit) = object.as_unit_mut() {
            unit.heal(amount);
            object.mark_dirty();
        }
        Ok(())
    }

    pub fn add_aura(&mut self, target: EntityId, aura: Aura) -> Result<(), ShardError> {
        let object = self
            .world
            .entities
            .get_mut(&target)
            .ok_or(ShardError::UnknownObject(target))?;
        if let Some(unit) = object.as_unit_mut() {
            unit.add_aura(aura);
            object.mark_dirty();
        }
        Ok(())
    }

    /// Death bookkeeping for a unit whose health just reached zero.
    ///
    /// For an NPC: the brain stops, the looter is the top damager (if any),
    /// template loot is dropped for the looter, the spawn point is released
    /// and the corpse starts decaying.
    ///
    /// # Returns
    ///
    /// The looter, if anyone damaged the NPC.
    pub(crate) fn handle_death(&mut self, id: EntityId) -> Option<EntityId> {
        let shard = self.shard();
        let decay_ms = shard.config.corpse_decay_ms;
        let object = self.world.entities.get_mut(&id)?;
        let position = object.position().point;
        let name = object.name().clone();

        let (looter, loot, spawn_ref) = match &mut object.kind {
            EntityKind::Npc(npc) => {
                npc.stop_brain();
                npc.unit.threat.clear();
                let looter = npc.unit.damage_log.take_top_damager();
                npc.decay_remaining_ms = Some(decay_ms);
                (looter, npc.template.loot.clone(), npc.spawn_ref.take())
            }
            EntityKind::Character(_) => {
                info!("💀 Character '{}' died on shard '{}'", name, shard.name);
                return None;
            }
            EntityKind::GameObject(_) => return None,
        };
        object.mark_dirty();

        if !loot.is_empty() {
            let now = self.now_ms();
            let dropped = LootGrid::cell_of(&position, &shard.bounds)
                .and_then(|origin| self.world.loot.drop_items(origin, &loot, looter, now));
            match dropped {
                Some(slots) => debug!("💰 '{}' dropped {} items", name, slots.len()),
                None => warn!("⚠️ No room in the loot grid for the drop of '{}'", name),
            }
        }
        if let Some(at) = spawn_ref {
            self.signal_spawnling_died(at, id);
        }
        debug!("💀 '{}' died, looter: {:?}", name, looter);
        looter
    }
}
