//! One execution of the shard update loop.
//!
//! A tick claims the shard, drains the message queue, advances updatables,
//! updates every due object and periodically pushes environment updates to
//! characters. Nothing a tick runs may unwind past [`Shard::tick`]: messages,
//! updatables, object updates and client pushes are each contained, and the
//! whole tick sits behind a final catch-all.

use super::{ContextClaim, Shard, ShardContext, World};
use crate::entity::{EntityKind, ObjectSnapshot};
use crate::error::ShardError;
use crate::spatial::{ProximityView, Shape};
use crate::types::{EntityId, MapId, ObjectType, ObjectTypeMask, Position, UpdatePriority};
use crate::updatable::TimerControl;
use crate::utils::panic_message;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

/// What happened when [`Shard::tick`] was called.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    Executed(TickReport),
    /// Another thread holds the shard context; nothing was touched.
    Skipped,
    Disposed,
    /// The tick was cut short by a context violation or a panic outside any
    /// contained item.
    Aborted(String),
}

/// Work done by one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    pub tick: u64,
    pub messages: usize,
    pub updatables: usize,
    pub objects_updated: usize,
    pub environment_pushed: usize,
    pub duration_ms: f64,
}

/// Payload pushed to a character with the dirty objects around it.
#[derive(Debug, Clone, Serialize)]
pub struct EnvironmentUpdate {
    pub map: MapId,
    pub tick: u64,
    pub objects: Vec<ObjectSnapshot>,
}

impl Shard {
    /// Runs one tick on the calling thread.
    ///
    /// Safe to call from any thread at any time: when another thread holds
    /// the shard context the call returns [`TickOutcome::Skipped`] without
    /// touching shard state.
    pub fn tick(&self) -> TickOutcome {
        if self.is_disposed() {
            return TickOutcome::Disposed;
        }
        let Some(claim) = ContextClaim::acquire(&self.current_thread) else {
            trace!("⏭️ Tick of shard '{}' skipped: context is held", self.name);
            return TickOutcome::Skipped;
        };

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut world = self.lock_world();
            let report = self.run_tick(&mut world);
            self.refresh_counters(&world);
            report
        }));
        self.updating.store(false, Ordering::Release);
        drop(claim);

        match result {
            Ok(Ok(mut report)) => {
                report.duration_ms = started.elapsed().as_secs_f64() * 1000.0;
                self.record_tick(report.duration_ms, report.objects_updated);
                TickOutcome::Executed(report)
            }
            Ok(Err(e)) => TickOutcome::Aborted(e.to_string()),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!("💥 Tick of shard '{}' panicked: {}", self.name, message);
                TickOutcome::Aborted(message)
            }
        }
    }

    fn run_tick(&self, world: &mut World) -> Result<TickReport, ShardError> {
        let now = self.clock.now_millis();
        let delta = world.last_tick_ms.map_or(0, |last| now.saturating_sub(last));
        world.last_tick_ms = Some(now);
        world.tick_count += 1;
        let tick = world.tick_count;

        let mut ctx = ShardContext::enter(self, world)?;
        let messages = ctx.drain_messages();
        let updatables = ctx.run_updatables(now, delta);
        let objects_updated = ctx.update_objects(now);
        let environment_pushed = if tick % u64::from(self.config.character_update_environment_ticks) == 0 {
            ctx.push_environment(tick)
        } else {
            0
        };

        Ok(TickReport {
            tick,
            messages,
            updatables,
            objects_updated,
            environment_pushed,
            duration_ms: 0.0,
        })
    }

    fn record_tick(&self, duration_ms: f64, objects_updated: usize) {
        let ticks = self.counters.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        let previous = f64::from_bits(self.counters.avg_tick_ms_bits.load(Ordering::Relaxed));
        let average = if ticks == 1 {
            duration_ms
        } else {
            (previous * 9.0 + duration_ms) / 10.0
        };
        self.counters
            .avg_tick_ms_bits
            .store(average.to_bits(), Ordering::Relaxed);
        self.counters
            .updated_last_tick
            .store(objects_updated, Ordering::Relaxed);

        if average > self.config.slow_tick_warn_ms as f64 {
            warn!(
                "🐢 Shard '{}' is ticking slowly: {:.1}ms average over a {}ms target",
                self.name, average, self.config.update_delay_ms
            );
        }
    }
}

impl ShardContext<'_> {
    /// Executes the messages queued before the drain began.
    pub(crate) fn drain_messages(&mut self) -> usize {
        let shard = self.shard();
        let mut executed = 0;
        for message in shard.messages.drain_snapshot() {
            let label = message.label();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| message.run(self))) {
                error!(
                    "💥 Message '{}' on shard '{}' panicked: {}",
                    label,
                    shard.name,
                    panic_message(payload.as_ref())
                );
            }
            shard.messages.mark_executed();
            executed += 1;
        }
        executed
    }

    /// Advances every updatable registered before this phase began.
    ///
    /// An updatable registered during this tick's drain is only credited with
    /// the time since its registration, not the whole tick delta.
    pub(crate) fn run_updatables(&mut self, now_ms: u64, delta_ms: u64) -> usize {
        let shard = self.shard();
        let mut ran = 0;
        for id in self.world.updatables.live_ids() {
            let delta_ms = self.world.updatables.delta_for(id, now_ms, delta_ms);
            let Some(mut updatable) = self.world.updatables.begin_run(id) else {
                continue;
            };
            let kind = updatable.kind();
            let result = panic::catch_unwind(AssertUnwindSafe(|| updatable.update(self, delta_ms)));
            ran += 1;
            let keep = match result {
                Ok(Ok(TimerControl::Continue)) => Some(updatable),
                Ok(Ok(TimerControl::Finished)) => None,
                Ok(Err(e)) => {
                    warn!(
                        "⚠️ {} updatable on shard '{}' failed and was unregistered: {}",
                        kind, shard.name, e
                    );
                    None
                }
                Err(payload) => {
                    warn!(
                        "⚠️ {} updatable on shard '{}' panicked and was unregistered: {}",
                        kind,
                        shard.name,
                        panic_message(payload.as_ref())
                    );
                    None
                }
            };
            self.world.updatables.end_run(id, keep);
        }
        ran
    }

    /// Updates every object whose tier floor has elapsed.
    ///
    /// Structural changes requested by objects (moves, deaths, despawns) and
    /// the fail-safes for failed objects are applied once the pass is over.
    pub(crate) fn update_objects(&mut self, now_ms: u64) -> usize {
        let shard = self.shard();
        let config = &shard.config;
        let mut moves: Vec<(EntityId, Position)> = Vec::new();
        let mut deaths = Vec::new();
        let mut deletes = Vec::new();
        let mut failures: Vec<(EntityId, String)> = Vec::new();
        let mut updated = 0;

        shard.updating.store(true, Ordering::Release);
        {
            let World {
                entities,
                partition,
                ..
            } = &mut *self.world;
            let view = ProximityView::new(partition);

            for id in entities.ids() {
                let Some(object) = entities.get_mut(&id) else {
                    continue;
                };
                if object.teleporting || object.deleted {
                    continue;
                }
                let Some(leaf) = object.node else {
                    continue;
                };
                let priority = if partition.is_leaf_active(leaf) {
                    object.priority()
                } else if config.update_inactive_areas {
                    UpdatePriority::Inactive
                } else {
                    continue;
                };
                let delta_ms = match object.last_update_ms {
                    None => 0,
                    Some(last) => {
                        let elapsed = now_ms.saturating_sub(last);
                        if elapsed < config.priority_millis.floor(priority) {
                            continue;
                        }
                        elapsed
                    }
                };
                object.last_update_ms = Some(now_ms);
                updated += 1;

                match panic::catch_unwind(AssertUnwindSafe(|| object.update(&view, delta_ms))) {
                    Ok(Ok(outcome)) => {
                        if let Some(target) = outcome.move_to {
                            moves.push((id, target));
                        }
                        if outcome.died {
                            deaths.push(id);
                        }
                        if outcome.despawn || outcome.decayed {
                            deletes.push(id);
                        }
                    }
                    Ok(Err(e)) => failures.push((id, e.to_string())),
                    Err(payload) => {
                        failures.push((id, format!("panicked: {}", panic_message(payload.as_ref()))))
                    }
                }
            }
        }
        shard.updating.store(false, Ordering::Release);

        for (id, target) in moves {
            if let Err(e) = self.move_object(id, target) {
                debug!("🚫 Move of {} on shard '{}' refused: {}", id, shard.name, e);
            }
        }
        for id in deaths {
            self.handle_death(id);
        }
        for (id, reason) in failures {
            self.apply_update_failsafe(id, &reason);
        }
        for id in deletes {
            if let Err(e) = self.delete_object_now(id) {
                debug!("Deleting {} on shard '{}': {}", id, shard.name, e);
            }
        }
        updated
    }

    /// A failed character is logged out; any other object is deleted.
    fn apply_update_failsafe(&mut self, id: EntityId, reason: &str) {
        let shard = self.shard();
        let Some(object) = self.world.entities.get_mut(&id) else {
            return;
        };
        match &mut object.kind {
            EntityKind::Character(_) => {
                error!(
                    "❌ Update of character '{}' on shard '{}' failed: {} - logging out",
                    object.name(),
                    shard.name,
                    reason
                );
                shard.logout_later(id, "internal error");
            }
            EntityKind::Npc(npc) => {
                npc.stop_brain();
                error!(
                    "❌ Update of npc '{}' on shard '{}' failed: {} - deleting",
                    object.name(),
                    shard.name,
                    reason
                );
                if let Err(e) = self.delete_object_now(id) {
                    debug!("Deleting failed npc {}: {}", id, e);
                }
            }
            EntityKind::GameObject(_) => {
                error!(
                    "❌ Update of game object '{}' on shard '{}' failed: {} - deleting",
                    object.name(),
                    shard.name,
                    reason
                );
                if let Err(e) = self.delete_object_now(id) {
                    debug!("Deleting failed game object {}: {}", id, e);
                }
            }
        }
    }

    /// Sends every character the dirty objects within broadcast range, then
    /// clears the dirty flags.
    ///
    /// # Returns
    ///
    /// Number of characters that received an update.
    pub(crate) fn push_environment(&mut self, tick: u64) -> usize {
        let shard = self.shard();
        let range = shard.config.broadcast_range;
        let mut pushed = 0;
        let mut failed = Vec::new();

        for id in self.characters() {
            let Some(object) = self.world.entities.get(&id) else {
                continue;
            };
            let Some(character) = object.as_character() else {
                continue;
            };
            let shape = Shape::sphere(object.position().point, range);
            let objects: Vec<ObjectSnapshot> = self
                .world
                .partition
                .entities_in_area(&shape, ObjectTypeMask::ALL, object.phase(), usize::MAX)
                .iter()
                .filter_map(|entry| self.world.entities.get(&entry.id))
                .filter(|other| other.is_dirty())
                .map(|other| other.snapshot())
                .collect();
            if objects.is_empty() {
                continue;
            }

            let update = EnvironmentUpdate {
                map: shard.map_id,
                tick,
                objects,
            };
            let payload = match serde_json::to_vec(&update) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("⚠️ Environment update for {} could not be encoded: {}", id, e);
                    continue;
                }
            };
            match panic::catch_unwind(AssertUnwindSafe(|| character.send(&payload))) {
                Ok(Ok(())) => pushed += 1,
                Ok(Err(e)) => debug!("📪 Environment push to '{}' failed: {}", object.name(), e),
                Err(panic_payload) => {
                    error!(
                        "💥 Environment push to '{}' panicked: {}",
                        object.name(),
                        panic_message(panic_payload.as_ref())
                    );
                    failed.push(id);
                }
            }
        }

        for object in self.world.entities.iter_mut() {
            object.dirty = false;
        }
        for id in failed {
            if self.world.entities.get(&id).map(|o| o.object_type()) == Some(ObjectType::Character) {
                shard.logout_later(id, "internal error");
            }
        }
        pushed
    }
}
