use super::support::*;
use crate::entity::{Aura, PeriodicEffect, WorldObject};
use crate::loot::{LootSlot, LOOT_GRID_SIZE};
use crate::spawn::NpcTemplate;
use crate::types::Position;
use crate::utils::ManualClock;
use std::sync::Arc;

fn looted_npc(position: Position) -> WorldObject {
    let template = NpcTemplate {
        loot: vec![2589, 2589, 4865],
        max_health: 50,
        ..NpcTemplate::new(38, "Defias Thug")
    };
    WorldObject::npc(Arc::new(template), position)
}

#[test]
fn death_drops_loot_owned_by_the_top_damager() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let position = Position::new(400.0, 400.0, 0.0);
    let (rogue, _) = character("Valeera", Position::new(402.0, 400.0, 0.0));
    let (warrior, _) = character("Garona", Position::new(398.0, 400.0, 0.0));
    let thug = looted_npc(position);
    let (rogue_id, warrior_id, thug_id) = (rogue.id(), warrior.id(), thug.id());

    shard
        .with_context(|ctx| {
            ctx.add_object_now(rogue).unwrap();
            ctx.add_object_now(warrior).unwrap();
            ctx.add_object_now(thug).unwrap();

            assert!(!ctx.deal_damage(Some(warrior_id), thug_id, 10).unwrap());
            assert!(ctx.deal_damage(Some(rogue_id), thug_id, 40).unwrap());
            assert_eq!(ctx.loot().occupied(), 3);

            let origin = ctx.loot_cell_of(&position.point).unwrap();
            assert!(ctx.pick_up_loot(origin, warrior_id).is_none());
            let item = ctx.pick_up_loot(origin, rogue_id).unwrap();
            assert_eq!(item.item_id, 2589);
            assert_eq!(item.owner, Some(rogue_id));
            assert_eq!(ctx.loot().occupied(), 2);

            let npc = ctx.get_object(&thug_id).unwrap().as_npc().unwrap();
            assert!(!npc.is_brain_running());
            assert!(npc.is_decaying());
            assert!(npc.unit.threat.is_empty());
        })
        .unwrap();
}

#[test]
fn death_without_damagers_leaves_loot_unowned() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let position = Position::new(800.0, 800.0, 0.0);
    let thug = looted_npc(position);
    let id = thug.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(thug).unwrap();
            assert!(ctx.deal_damage(None, id, 1_000).unwrap());
            let origin = ctx.loot_cell_of(&position.point).unwrap();
            assert_eq!(ctx.loot().get(origin).unwrap().owner, None);
            assert!(ctx.clear_loot_slot(origin).is_some());
            assert_eq!(ctx.loot().occupied(), 2);
        })
        .unwrap();
}

#[test]
fn out_of_grid_slots_cannot_reach_dropped_loot() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let position = Position::new(600.0, 600.0, 0.0);
    let (looter, _) = character("Mathias", Position::new(601.0, 600.0, 0.0));
    let thug = looted_npc(position);
    let (looter_id, thug_id) = (looter.id(), thug.id());

    shard
        .with_context(|ctx| {
            ctx.add_object_now(looter).unwrap();
            ctx.add_object_now(thug).unwrap();
            assert!(ctx.deal_damage(None, thug_id, 1_000).unwrap());
            assert_eq!(ctx.loot().occupied(), 3);

            let origin = ctx.loot_cell_of(&position.point).unwrap();
            assert!(origin.y > 0);
            // Row-major neighbour of the origin if x were allowed to wrap.
            let wrapped = LootSlot {
                x: origin.x + LOOT_GRID_SIZE,
                y: origin.y - 1,
            };
            assert!(ctx.pick_up_loot(wrapped, looter_id).is_none());
            assert!(ctx.clear_loot_slot(wrapped).is_none());
            assert!(ctx.loot().get(wrapped).is_none());
            assert_eq!(ctx.loot().occupied(), 3);
            assert!(ctx.pick_up_loot(origin, looter_id).is_some());
        })
        .unwrap();
}

#[test]
fn damage_to_dead_or_unknown_targets_is_harmless() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let thug = looted_npc(Position::new(5.0, 5.0, 0.0));
    let id = thug.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(thug).unwrap();
            assert!(ctx.deal_damage(None, id, 1_000).unwrap());
            assert!(!ctx.deal_damage(None, id, 1_000).unwrap());
            assert_eq!(ctx.loot().occupied(), 3);
            assert!(ctx.deal_damage(None, crate::EntityId::new(), 5).is_err());
        })
        .unwrap();
}

#[test]
fn periodic_aura_kills_and_the_corpse_decays() {
    let clock = ManualClock::new(0);
    let mut config = test_config();
    config.update_inactive_areas = true;
    config.corpse_decay_ms = 20_000;
    let shard = manual_shard(&clock, config);
    let thug = looted_npc(Position::new(1500.0, 1500.0, 0.0));
    let id = thug.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(thug).unwrap();
            let poison = Aura::permanent(744).with_periodic(PeriodicEffect::new(1_000, -25), None);
            ctx.add_aura(id, poison).unwrap();
        })
        .unwrap();

    // First update establishes the object's timestamp.
    shard.tick();
    // Inactive tier: next update after 10s, two poison ticks kill 50 health.
    clock.advance(10_000);
    shard.tick();
    let decaying = shard
        .with_context(|ctx| {
            let object = ctx.get_object(&id).unwrap();
            (object.as_unit().unwrap().is_alive(), object.as_npc().unwrap().is_decaying())
        })
        .unwrap();
    assert_eq!(decaying, (false, true));
    assert_eq!(shard.with_context(|ctx| ctx.loot().occupied()).unwrap(), 3);

    clock.advance(10_000);
    shard.tick();
    assert!(shard.with_context(|ctx| ctx.get_object(&id).is_some()).unwrap());

    clock.advance(10_000);
    shard.tick();
    assert!(shard.with_context(|ctx| ctx.get_object(&id).is_none()).unwrap());
}

#[test]
fn heal_is_capped_at_max_health() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let thug = looted_npc(Position::new(5.0, 5.0, 0.0));
    let id = thug.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(thug).unwrap();
            ctx.deal_damage(None, id, 30).unwrap();
            ctx.heal(id, 500).unwrap();
            assert_eq!(ctx.get_object(&id).unwrap().as_unit().unwrap().health(), 50);
        })
        .unwrap();
}
