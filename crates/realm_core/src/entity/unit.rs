//! Combat state shared by characters and NPCs.
use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Repeating health change applied by an aura.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodicEffect {
    pub interval_ms: u64,
    /// Negative values damage, positive values heal
    pub health_delta: i32,
    #[serde(skip)]
    elapsed_ms: u64,
}

impl PeriodicEffect {
    pub fn new(interval_ms: u64, health_delta: i32) -> Self {
        Self {
            interval_ms,
            health_delta,
            elapsed_ms: 0,
        }
    }
}

/// A timed or permanent effect on a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aura {
    pub spell_id: u32,
    /// `None` for auras that last until removed
    pub remaining_ms: Option<u64>,
    pub caster: Option<EntityId>,
    pub periodic: Option<PeriodicEffect>,
}

impl Aura {
    pub fn timed(spell_id: u32, duration_ms: u64) -> Self {
        Self {
            spell_id,
            remaining_ms: Some(duration_ms),
            caster: None,
            periodic: None,
        }
    }

    pub fn permanent(spell_id: u32) -> Self {
        Self {
            spell_id,
            remaining_ms: None,
            caster: None,
            periodic: None,
        }
    }

    pub fn with_periodic(mut self, effect: PeriodicEffect, caster: Option<EntityId>) -> Self {
        self.periodic = Some(effect);
        self.caster = caster;
        self
    }
}

/// Accumulated threat per attacker.
#[derive(Debug, Clone, Default)]
pub struct ThreatTable {
    entries: HashMap<EntityId, f32>,
}

impl ThreatTable {
    pub fn add(&mut self, attacker: EntityId, amount: f32) {
        *self.entries.entry(attacker).or_insert(0.0) += amount;
    }

    pub fn remove(&mut self, attacker: &EntityId) {
        self.entries.remove(attacker);
    }

    pub fn get(&self, attacker: &EntityId) -> f32 {
        self.entries.get(attacker).copied().unwrap_or(0.0)
    }

    /// Attacker holding the most threat.
    pub fn top(&self) -> Option<EntityId> {
        self.entries
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(id, _)| *id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Damage dealt per attacker, in first-hit order.
#[derive(Debug, Clone, Default)]
pub struct DamageLog {
    entries: Vec<(EntityId, u64)>,
}

impl DamageLog {
    pub fn record(&mut self, attacker: EntityId, amount: u32) {
        match self.entries.iter_mut().find(|(id, _)| *id == attacker) {
            Some((_, total)) => *total += u64::from(amount),
            None => self.entries.push((attacker, u64::from(amount))),
        }
    }

    pub fn total_from(&self, attacker: &EntityId) -> u64 {
        self.entries
            .iter()
            .find(|(id, _)| id == attacker)
            .map(|(_, total)| *total)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attacker with the highest total; the earliest attacker wins ties.
    pub fn top_damager(&self) -> Option<EntityId> {
        let mut best: Option<(EntityId, u64)> = None;
        for &(id, total) in &self.entries {
            if best.map_or(true, |(_, b)| total > b) {
                best = Some((id, total));
            }
        }
        best.map(|(id, _)| id)
    }

    /// Returns the top damager and clears the log.
    pub fn take_top_damager(&mut self) -> Option<EntityId> {
        if self.entries.is_empty() {
            return None;
        }
        let top = self.top_damager();
        self.entries.clear();
        top
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Result of advancing a unit's auras.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuraTick {
    pub expired: usize,
    pub killed: bool,
}

/// Health, level and combat bookkeeping of a living entity.
#[derive(Debug, Clone)]
pub struct Unit {
    pub level: u8,
    health: u32,
    max_health: u32,
    pub auras: Vec<Aura>,
    pub threat: ThreatTable,
    pub damage_log: DamageLog,
}

impl Unit {
    pub fn new(level: u8, max_health: u32) -> Self {
        let max_health = max_health.max(1);
        Self {
            level,
            health: max_health,
            max_health,
            auras: Vec::new(),
            threat: ThreatTable::default(),
            damage_log: DamageLog::default(),
        }
    }

    pub fn health(&self) -> u32 {
        self.health
    }

    pub fn max_health(&self) -> u32 {
        self.max_health
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }

    /// Applies damage and records it against `attacker`.
    ///
    /// # Returns
    ///
    /// True when this hit killed the unit.
    pub fn apply_damage(&mut self, attacker: Option<EntityId>, amount: u32) -> bool {
        if !self.is_alive() || amount == 0 {
            return false;
        }
        let dealt = amount.min(self.health);
        self.health -= dealt;
        if let Some(attacker) = attacker {
            self.damage_log.record(attacker, dealt);
            self.threat.add(attacker, dealt as f32);
        }
        self.health == 0
    }

    /// Heals a living unit, capped at max health.
    pub fn heal(&mut self, amount: u32) {
        if self.is_alive() {
            self.health = self.health.saturating_add(amount).min(self.max_health);
        }
    }

    /// Brings a dead unit back with full health and clean combat state.
    pub fn revive(&mut self) {
        self.health = self.max_health;
        self.auras.clear();
        self.threat.clear();
        self.damage_log.clear();
    }

    /// Adds an aura, replacing an existing one with the same spell id.
    pub fn add_aura(&mut self, aura: Aura) {
        self.remove_aura(aura.spell_id);
        self.auras.push(aura);
    }

    pub fn remove_aura(&mut self, spell_id: u32) -> bool {
        let before = self.auras.len();
        self.auras.retain(|a| a.spell_id != spell_id);
        before != self.auras.len()
    }

    pub fn has_aura(&self, spell_id: u32) -> bool {
        self.auras.iter().any(|a| a.spell_id == spell_id)
    }

    /// Advances every aura by `delta_ms`, applying periodic effects and
    /// dropping expired auras.
    pub fn update_auras(&mut self, delta_ms: u64) -> AuraTick {
        let mut tick = AuraTick::default();
        let mut effects: Vec<(Option<EntityId>, i32)> = Vec::new();

        for aura in &mut self.auras {
            // Effects only run for time the aura actually existed.
            let active_ms = aura.remaining_ms.map_or(delta_ms, |r| r.min(delta_ms));
            if let Some(effect) = aura.periodic.as_mut() {
                if effect.interval_ms > 0 {
                    effect.elapsed_ms += active_ms;
                    while effect.elapsed_ms >= effect.interval_ms {
                        effect.elapsed_ms -= effect.interval_ms;
                        effects.push((aura.caster, effect.health_delta));
                    }
                }
            }
            if let Some(remaining) = aura.remaining_ms.as_mut() {
                *remaining = remaining.saturating_sub(delta_ms);
            }
        }

        let before = self.auras.len();
        self.auras.retain(|a| a.remaining_ms != Some(0));
        tick.expired = before - self.auras.len();

        for (caster, delta) in effects {
            if delta < 0 {
                if self.apply_damage(caster, delta.unsigned_abs()) {
                    tick.killed = true;
                }
            } else {
                self.heal(delta as u32);
            }
        }
        tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lethal_damage_reports_death_once() {
        let mut unit = Unit::new(10, 50);
        let attacker = EntityId::new();
        assert!(!unit.apply_damage(Some(attacker), 30));
        assert!(unit.apply_damage(Some(attacker), 30));
        assert!(!unit.is_alive());
        assert!(!unit.apply_damage(Some(attacker), 5));
        assert_eq!(unit.damage_log.total_from(&attacker), 50);
    }

    #[test]
    fn empty_damage_log_has_no_looter() {
        let mut log = DamageLog::default();
        assert_eq!(log.take_top_damager(), None);
    }

    #[test]
    fn top_damager_prefers_highest_then_earliest() {
        let (a, b, c) = (EntityId::new(), EntityId::new(), EntityId::new());
        let mut log = DamageLog::default();
        log.record(a, 10);
        log.record(b, 25);
        log.record(c, 25);
        log.record(a, 5);
        assert_eq!(log.top_damager(), Some(b));
        assert_eq!(log.take_top_damager(), Some(b));
        assert!(log.is_empty());
    }

    #[test]
    fn periodic_aura_ticks_and_expires() {
        let mut unit = Unit::new(1, 100);
        let caster = EntityId::new();
        unit.add_aura(Aura::timed(7, 3_000).with_periodic(PeriodicEffect::new(1_000, -10), Some(caster)));

        let tick = unit.update_auras(2_500);
        assert_eq!(unit.health(), 80);
        assert_eq!(tick.expired, 0);

        let tick = unit.update_auras(1_000);
        assert_eq!(unit.health(), 70);
        assert_eq!(tick.expired, 1);
        assert!(unit.auras.is_empty());
        assert_eq!(unit.threat.top(), Some(caster));
    }

    #[test]
    fn periodic_damage_can_kill() {
        let mut unit = Unit::new(1, 15);
        unit.add_aura(Aura::permanent(3).with_periodic(PeriodicEffect::new(100, -10), None));
        assert!(unit.update_auras(250).killed);
        assert_eq!(unit.health(), 0);
    }
}
