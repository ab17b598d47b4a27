use super::support::*;
use crate::entity::{CharacterInfo, WorldObject};
use crate::error::ShardError;
use crate::shard::ShardState;
use crate::spawn::NpcTemplate;
use crate::spatial::Shape;
use crate::types::{FactionGroup, Locale, MapId, ObjectTypeMask, Phase, Position, Vec3};
use crate::utils::ManualClock;
use crate::Shard;
use std::sync::Arc;

#[test]
fn move_round_trip_keeps_leaf_and_position_in_agreement() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let object = npc(1, Position::new(100.0, 100.0, 0.0));
    let id = object.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(object).unwrap();
            let old_leaf = ctx.get_object(&id).unwrap().node().unwrap();

            let destination = Position::new(3000.0, 2500.0, 4.0);
            let new_leaf = ctx.move_object(id, destination).unwrap();

            assert_eq!(ctx.leaf_from_point(&destination.point), Some(new_leaf));
            assert!(ctx.leaf_contains(new_leaf, id));
            assert!(!ctx.leaf_contains(old_leaf, id));
            assert_eq!(*ctx.get_object(&id).unwrap().position(), destination);
        })
        .unwrap();
}

#[test]
fn moves_outside_the_bounds_are_refused() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let start = Position::new(100.0, 100.0, 0.0);
    let object = npc(1, start);
    let id = object.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(object).unwrap();
            let err = ctx.move_object(id, Position::new(-5.0, 100.0, 0.0)).unwrap_err();
            assert!(matches!(err, ShardError::OutOfBounds(_)));
            assert_eq!(*ctx.get_object(&id).unwrap().position(), start);
            assert!(!ctx.is_point_in_map(&Vec3::new(5000.0, 0.0, 0.0)));
        })
        .unwrap();
}

#[test]
fn adds_outside_the_bounds_or_of_deleted_objects_fail() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    shard
        .with_context(|ctx| {
            let outside = npc(1, Position::new(9000.0, 0.0, 0.0));
            assert!(matches!(ctx.add_object_now(outside), Err(ShardError::OutOfBounds(_))));

            let object = npc(1, Position::new(10.0, 10.0, 0.0));
            let id = ctx.add_object_now(object).unwrap();
            let deleted = ctx.delete_object_now(id).unwrap();
            assert!(deleted.is_deleted());
            assert_eq!(ctx.add_object_now(deleted).unwrap_err(), ShardError::DeletedObject(id));
            assert_eq!(ctx.object_count(), 0);
        })
        .unwrap();
}

#[test]
fn map_slots_and_unique_ids_are_assigned_on_add() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    shard
        .with_context(|ctx| {
            let a = ctx.add_object_now(npc(1, Position::new(1.0, 1.0, 0.0))).unwrap();
            let b = ctx.add_object_now(npc(2, Position::new(2.0, 2.0, 0.0))).unwrap();
            let (player, _session) = character("Anduin", Position::new(3.0, 3.0, 0.0));
            let p = ctx.add_object_now(player).unwrap();

            let slot_a = ctx.get_object(&a).unwrap().map_slot().unwrap();
            let slot_b = ctx.get_object(&b).unwrap().map_slot().unwrap();
            assert_ne!(slot_a, slot_b);
            assert_eq!(ctx.object_by_map_slot(slot_b).map(|o| o.id()), Some(b));
            assert_eq!(ctx.get_object(&p).unwrap().map_slot(), None);

            let ua = ctx.get_object(&a).unwrap().unique_id().unwrap();
            let ub = ctx.get_object(&b).unwrap().unique_id().unwrap();
            assert!(ub > ua);

            let removed = ctx.remove_object_now(a).unwrap();
            assert_eq!(removed.map_slot(), None);
            assert!(ctx.object_by_map_slot(slot_a).is_none());
        })
        .unwrap();
}

#[test]
fn character_indices_follow_adds_and_removes() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let session = Arc::new(RecordingSession::default());
    let orc = WorldObject::character(
        CharacterInfo::new("Garrosh")
            .with_faction(FactionGroup::Horde)
            .with_locale(Locale::Russian),
        session.clone(),
        Position::new(10.0, 10.0, 0.0),
    );
    let (human, _) = character("Varian", Position::new(20.0, 20.0, 0.0));
    let orc_id = orc.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(orc).unwrap();
            ctx.add_object_now(human).unwrap();
            assert_eq!(ctx.character_count(), 2);
            assert_eq!(ctx.horde_players(), 1);
            assert_eq!(ctx.alliance_players(), 1);
            assert_eq!(ctx.characters_by_locale(Locale::Russian), vec![orc_id]);

            ctx.logout_now(orc_id, "server shutdown").unwrap();
            assert_eq!(ctx.horde_players(), 0);
            assert!(ctx.characters_by_locale(Locale::Russian).is_empty());
        })
        .unwrap();

    assert_eq!(shard.online_count(), 1);
    assert_eq!(session.kicks.lock().unwrap().as_slice(), ["server shutdown".to_string()]);
}

#[test]
fn spatial_queries_filter_by_kind_phase_and_shape() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let healer_template = Arc::new(NpcTemplate {
        spirit_healer: true,
        ..NpcTemplate::new(6491, "Spirit Healer")
    });

    shard
        .with_context(|ctx| {
            let near = ctx.add_object_now(npc(10, Position::new(105.0, 100.0, 0.0))).unwrap();
            let far = ctx.add_object_now(npc(10, Position::new(160.0, 100.0, 0.0))).unwrap();
            let hidden = ctx
                .add_object_now(npc(10, Position::new(101.0, 100.0, 0.0)).with_phase(Phase(2)))
                .unwrap();
            let healer = ctx
                .add_object_now(WorldObject::npc(healer_template, Position::new(900.0, 900.0, 0.0)))
                .unwrap();
            let (player, _) = character("Tyrande", Position::new(100.0, 100.0, 0.0));
            ctx.add_object_now(player).unwrap();

            let center = Vec3::new(100.0, 100.0, 0.0);
            let npcs = ctx.objects_in_radius(center, 20.0, ObjectTypeMask::NPCS, Phase::DEFAULT);
            assert_eq!(npcs.len(), 1);
            assert_eq!(npcs[0].id, near);

            let all_phases = ctx.objects_in_radius(center, 20.0, ObjectTypeMask::NPCS, Phase::ALL);
            assert!(all_phases.iter().any(|e| e.id == hidden));

            let boxed = ctx.objects_in_box(
                Vec3::new(150.0, 90.0, -10.0),
                Vec3::new(170.0, 110.0, 10.0),
                ObjectTypeMask::ALL,
                Phase::DEFAULT,
            );
            assert_eq!(boxed.iter().map(|e| e.id).collect::<Vec<_>>(), vec![far]);

            assert_eq!(ctx.nearest_npc(center, Phase::DEFAULT, 10), Some(near));
            assert_eq!(ctx.nearest_npc(center, Phase::DEFAULT, 99), None);
            assert_eq!(ctx.nearest_spirit_healer(center, Phase::DEFAULT), Some(healer));

            let mut visited = 0;
            let completed = ctx.iterate_objects(&Shape::sphere(center, 100.0), Phase::DEFAULT, |_| {
                visited += 1;
                visited < 2
            });
            assert!(!completed);
            assert_eq!(visited, 2);

            assert_eq!(ctx.copy_objects().len(), 5);
        })
        .unwrap();
}

#[test]
fn sends_reach_characters_by_id_area_and_map() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let (near, near_session) = character("Malfurion", Position::new(100.0, 100.0, 0.0));
    let (far, far_session) = character("Illidan", Position::new(2000.0, 2000.0, 0.0));
    let near_id = near.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(near).unwrap();
            ctx.add_object_now(far).unwrap();
            assert!(ctx.send(&near_id, b"whisper"));
            assert_eq!(ctx.send_to_area(Vec3::new(110.0, 100.0, 0.0), Phase::DEFAULT, b"yell"), 1);
        })
        .unwrap();

    assert_eq!(shard.send_to_map(b"announcement"), 2);
    assert_eq!(near_session.sent_count(), 3);
    assert_eq!(far_session.sent_count(), 1);

    let names: Vec<String> = shard
        .online_characters()
        .iter()
        .map(|c| c.name.to_string())
        .collect();
    assert_eq!(names.len(), 2);
    assert!(names.contains(&"Illidan".to_string()));
    assert!(shard.online_characters().iter().all(|c| c.map == MapId(1)));
}

#[test]
fn execute_in_context_runs_immediately_on_an_idle_shard() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let object = npc(1, Position::new(5.0, 5.0, 0.0));
    let id = object.id();

    let ran_now = shard.execute_in_context(move |ctx| {
        ctx.add_object_now(object).unwrap();
    });
    assert!(ran_now);
    assert_eq!(shard.message_backlog(), 0);
    assert!(shard.with_context(|ctx| ctx.get_object(&id).is_some()).unwrap());

    shard.remove_object(id);
    assert_eq!(shard.stats().objects, 0);
}

#[test]
fn execute_in_context_from_inside_the_context_enqueues() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let ran_now = shard
        .with_context(|ctx| ctx.shard().execute_in_context(|_| {}))
        .unwrap();
    assert!(!ran_now);
    assert_eq!(shard.message_backlog(), 1);
}

#[test]
fn reentrant_and_foreign_context_entry_is_refused() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());

    let nested = shard
        .with_context(|ctx| ctx.shard().with_context(|_| ()))
        .unwrap();
    assert_eq!(nested, Err(ShardError::ReentrantContext("test-map".into())));

    let err = shard.ensure_context("remove_object_now").unwrap_err();
    assert!(matches!(err, ShardError::ContextViolation { .. }));
}

#[test]
fn waiting_from_the_shard_thread_is_a_violation() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let result = shard
        .with_context(|ctx| ctx.shard().add_message_and_wait(|_| {}))
        .unwrap();
    assert!(matches!(result, Err(ShardError::NoContextViolation { .. })));
    assert_eq!(shard.state(), ShardState::Stopped);
}

#[test]
fn waiting_on_an_unscheduled_shard_fails_fast() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    assert_eq!(
        shard.wait_one_tick(),
        Err(ShardError::NotRunning("test-map".into()))
    );
}

#[test]
fn faction_and_locale_changes_keep_character_indices_consistent() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let (defector, _session) = character("Jaina", Position::new(10.0, 10.0, 0.0));
    let id = defector.id();

    shard
        .with_context(|ctx| {
            ctx.add_object_now(defector).unwrap();
            assert_eq!((ctx.alliance_players(), ctx.horde_players()), (1, 0));

            ctx.set_character_faction(id, FactionGroup::Horde).unwrap();
            ctx.set_character_locale(id, Locale::German).unwrap();
            assert_eq!((ctx.alliance_players(), ctx.horde_players()), (0, 1));
            assert!(ctx.characters_by_locale(Locale::English).is_empty());
            assert_eq!(ctx.characters_by_locale(Locale::German), vec![id]);
            let character = ctx.get_object(&id).unwrap().as_character().unwrap();
            assert_eq!(character.faction(), FactionGroup::Horde);

            // The handle only reaches unindexed state.
            let mut handle = ctx.get_object_mut(&id).unwrap();
            handle.set_priority(crate::types::UpdatePriority::Low);
            assert_eq!(handle.priority(), crate::types::UpdatePriority::Low);
        })
        .unwrap();

    let online = shard.online_characters();
    assert_eq!(online[0].faction, FactionGroup::Horde);
    assert_eq!(online[0].locale, Locale::German);

    shard
        .with_context(|ctx| {
            ctx.remove_object_now(id).unwrap();
            assert_eq!((ctx.alliance_players(), ctx.horde_players()), (0, 0));
            assert!(ctx.characters_by_locale(Locale::German).is_empty());
        })
        .unwrap();
}

#[test]
fn faction_changes_are_refused_for_non_characters() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    let boar = npc(1, Position::new(10.0, 10.0, 0.0));
    let id = boar.id();
    shard
        .with_context(|ctx| {
            ctx.add_object_now(boar).unwrap();
            assert_eq!(
                ctx.set_character_faction(id, FactionGroup::Horde),
                Err(ShardError::UnknownObject(id))
            );
            assert_eq!(
                ctx.set_character_locale(id, Locale::French),
                Err(ShardError::UnknownObject(id))
            );
            assert_eq!((ctx.alliance_players(), ctx.horde_players()), (0, 0));
        })
        .unwrap();
}

#[test]
fn transfer_moves_an_object_between_shards() {
    let clock = ManualClock::new(0);
    let source = manual_shard(&clock, test_config());
    let target = Shard::builder(MapId(2), "target-map")
        .config(test_config())
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    let (player, _session) = character("Khadgar", Position::new(10.0, 10.0, 0.0));
    let id = player.id();
    source.add_object_later(player);
    source.tick();
    assert_eq!(source.online_count(), 1);

    let arrival = Position::new(1234.0, 567.0, 8.0);
    source.transfer_object_later(id, target.clone(), arrival);
    source.tick();
    assert_eq!(source.online_count(), 0);
    assert_eq!(target.message_backlog(), 1);

    target.tick();
    let (position, teleporting) = target
        .with_context(|ctx| {
            let object = ctx.get_object(&id).unwrap();
            (*object.position(), object.is_teleporting())
        })
        .unwrap();
    assert_eq!(position, arrival);
    assert!(!teleporting);
    assert_eq!(target.online_characters()[0].map, MapId(2));
}

#[test]
fn transfer_to_a_disposed_shard_leaves_the_object_in_place() {
    let clock = ManualClock::new(0);
    let source = manual_shard(&clock, test_config());
    let target = Shard::builder(MapId(2), "gone-map")
        .config(test_config())
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    target.dispose().unwrap();
    let (player, session) = character("Medivh", Position::new(10.0, 10.0, 0.0));
    let id = player.id();
    source.add_object_later(player);
    source.tick();

    source.transfer_object_later(id, target, Position::new(50.0, 50.0, 0.0));
    source.tick();
    assert_eq!(source.online_count(), 1);
    let position = source
        .with_context(|ctx| *ctx.get_object(&id).unwrap().position())
        .unwrap();
    assert_eq!(position, Position::new(10.0, 10.0, 0.0));
    assert_eq!(session.kick_count(), 0);
}

#[test]
fn character_in_flight_when_the_target_is_disposed_is_kicked() {
    let clock = ManualClock::new(0);
    let source = manual_shard(&clock, test_config());
    let target = Shard::builder(MapId(2), "closing-map")
        .config(test_config())
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap();
    let (player, session) = character("Antonidas", Position::new(10.0, 10.0, 0.0));
    let id = player.id();
    source.add_object_later(player);
    source.tick();

    source.transfer_object_later(id, target.clone(), Position::new(50.0, 50.0, 0.0));
    source.tick();
    assert_eq!(target.message_backlog(), 1);
    assert_eq!(session.kick_count(), 0);

    target.dispose().unwrap();
    assert_eq!(source.online_count(), 0);
    assert_eq!(session.kick_count(), 1);
}

#[test]
fn dispose_drops_everything_and_refuses_further_work() {
    let clock = ManualClock::new(0);
    let shard = manual_shard(&clock, test_config());
    shard.add_object_later(npc(1, Position::new(1.0, 1.0, 0.0)));
    shard.tick();
    shard.add_object_later(npc(2, Position::new(2.0, 2.0, 0.0)));

    shard.dispose().unwrap();
    assert_eq!(shard.state(), ShardState::Disposed);
    assert_eq!(shard.message_backlog(), 0);
    assert_eq!(shard.stats().objects, 0);
    assert_eq!(shard.tick(), crate::TickOutcome::Disposed);
    assert!(matches!(shard.with_context(|_| ()), Err(ShardError::Disposed(_))));

    shard.add_object_later(npc(3, Position::new(3.0, 3.0, 0.0)));
    assert_eq!(shard.message_backlog(), 0);
}
