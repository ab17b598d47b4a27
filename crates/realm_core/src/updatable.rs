//! Registry of time-driven objects advanced once per tick.
//!
//! Updatables live in an arena indexed by [`UpdatableId`]. An id carries the
//! generation of its slot, so a stale id held by a closure or a spawn point can
//! never cancel an unrelated updatable that later reused the slot.
//!
//! During the updatable phase each entry is taken out of its slot while it
//! runs. That lets it receive the full [`ShardContext`] (and register or cancel
//! other updatables, including itself) without aliasing the registry.

use crate::error::UpdateError;
use crate::shard::ShardContext;
use crate::spawn::PoolId;

/// Handle to a registered updatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UpdatableId {
    index: u32,
    generation: u32,
}

/// What an updatable wants after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerControl {
    Continue,
    Finished,
}

/// Extension point for custom periodic work.
pub trait UpdateHook: Send {
    fn update(&mut self, ctx: &mut ShardContext<'_>, delta_ms: u64) -> Result<TimerControl, UpdateError>;
}

pub(crate) type TimerAction = Box<dyn FnMut(&mut ShardContext<'_>) + Send + 'static>;

/// One-shot or periodic closure timer.
pub(crate) struct Timer {
    delay_ms: u64,
    elapsed_ms: u64,
    periodic: bool,
    action: TimerAction,
}

impl Timer {
    pub(crate) fn once(delay_ms: u64, action: TimerAction) -> Self {
        Self {
            delay_ms,
            elapsed_ms: 0,
            periodic: false,
            action,
        }
    }

    pub(crate) fn periodic(interval_ms: u64, action: TimerAction) -> Self {
        Self {
            delay_ms: interval_ms,
            elapsed_ms: 0,
            periodic: true,
            action,
        }
    }

    fn update(&mut self, ctx: &mut ShardContext<'_>, delta_ms: u64) -> TimerControl {
        self.elapsed_ms = self.elapsed_ms.saturating_add(delta_ms);
        if self.elapsed_ms < self.delay_ms {
            return TimerControl::Continue;
        }
        (self.action)(ctx);
        if self.periodic {
            // Overruns fire once and carry the remainder, never a burst.
            self.elapsed_ms = if self.delay_ms == 0 {
                0
            } else {
                (self.elapsed_ms - self.delay_ms) % self.delay_ms
            };
            TimerControl::Continue
        } else {
            TimerControl::Finished
        }
    }
}

/// Signals a waiter that its queued action has run.
pub(crate) enum Completion {
    Blocking(crossbeam::channel::Sender<()>),
    Async(tokio::sync::oneshot::Sender<()>),
}

impl Completion {
    pub(crate) fn complete(self) {
        match self {
            Completion::Blocking(tx) => {
                let _ = tx.send(());
            }
            Completion::Async(tx) => {
                let _ = tx.send(());
            }
        }
    }
}

/// Closed set of updatable kinds.
pub(crate) enum Updatable {
    Timer(Timer),
    /// Counts down a spawn point's respawn delay.
    Respawn {
        pool: PoolId,
        point: usize,
        remaining_ms: u64,
    },
    /// Keeps a waiter's slot alive for one updatable phase, then releases it.
    KeepAlive(Option<Completion>),
    Hook(Box<dyn UpdateHook>),
}

impl Updatable {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Updatable::Timer(_) => "timer",
            Updatable::Respawn { .. } => "respawn",
            Updatable::KeepAlive(_) => "keep-alive",
            Updatable::Hook(_) => "hook",
        }
    }

    pub(crate) fn update(
        &mut self,
        ctx: &mut ShardContext<'_>,
        delta_ms: u64,
    ) -> Result<TimerControl, UpdateError> {
        match self {
            Updatable::Timer(timer) => Ok(timer.update(ctx, delta_ms)),
            Updatable::Respawn {
                pool,
                point,
                remaining_ms,
            } => {
                *remaining_ms = remaining_ms.saturating_sub(delta_ms);
                if *remaining_ms > 0 {
                    return Ok(TimerControl::Continue);
                }
                ctx.respawn_spawn_point(*pool, *point)?;
                Ok(TimerControl::Finished)
            }
            Updatable::KeepAlive(completion) => {
                if let Some(completion) = completion.take() {
                    completion.complete();
                }
                Ok(TimerControl::Finished)
            }
            Updatable::Hook(hook) => hook.update(ctx, delta_ms),
        }
    }
}

enum SlotState {
    Vacant,
    Occupied(Updatable),
    Running { cancelled: bool },
}

struct Slot {
    generation: u32,
    /// Shard time of the registration that filled the slot
    registered_ms: u64,
    state: SlotState,
}

/// Generational arena of updatables.
#[derive(Default)]
pub(crate) struct UpdatableRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl UpdatableRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    /// Registers an updatable at shard time `now_ms`. Its first run is only
    /// credited with the time elapsed since then.
    pub(crate) fn register(&mut self, updatable: Updatable, now_ms: u64) -> UpdatableId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.registered_ms = now_ms;
            slot.state = SlotState::Occupied(updatable);
            return UpdatableId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            registered_ms: now_ms,
            state: SlotState::Occupied(updatable),
        });
        UpdatableId {
            index,
            generation: 0,
        }
    }

    /// Unregisters `id`. An updatable that is currently running is cancelled
    /// and released when its run returns.
    ///
    /// Returns false when the id is stale or already released.
    pub(crate) fn unregister(&mut self, id: UpdatableId) -> bool {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return false;
        };
        if slot.generation != id.generation {
            return false;
        }
        match &mut slot.state {
            SlotState::Vacant => false,
            SlotState::Running { cancelled } => {
                let was_live = !*cancelled;
                *cancelled = true;
                was_live
            }
            SlotState::Occupied(_) => {
                self.vacate(id.index);
                true
            }
        }
    }

    pub(crate) fn contains(&self, id: UpdatableId) -> bool {
        self.slots.get(id.index as usize).is_some_and(|slot| {
            slot.generation == id.generation
                && match slot.state {
                    SlotState::Vacant => false,
                    SlotState::Occupied(_) => true,
                    SlotState::Running { cancelled } => !cancelled,
                }
        })
    }

    /// Delta an updatable may consume this tick: the tick's delta, capped at
    /// the time elapsed since it was registered.
    pub(crate) fn delta_for(&self, id: UpdatableId, now_ms: u64, delta_ms: u64) -> u64 {
        match self.slots.get(id.index as usize) {
            Some(slot) if slot.generation == id.generation => {
                delta_ms.min(now_ms.saturating_sub(slot.registered_ms))
            }
            _ => delta_ms,
        }
    }

    /// Ids of every updatable registered right now.
    pub(crate) fn live_ids(&self) -> Vec<UpdatableId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot.state, SlotState::Occupied(_)))
            .map(|(index, slot)| UpdatableId {
                index: index as u32,
                generation: slot.generation,
            })
            .collect()
    }

    /// Takes the updatable out of its slot for running.
    pub(crate) fn begin_run(&mut self, id: UpdatableId) -> Option<Updatable> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        match std::mem::replace(&mut slot.state, SlotState::Running { cancelled: false }) {
            SlotState::Occupied(updatable) => Some(updatable),
            other => {
                slot.state = other;
                None
            }
        }
    }

    /// Puts a run updatable back, or releases its slot when `keep` is `None`
    /// or it was cancelled while running.
    pub(crate) fn end_run(&mut self, id: UpdatableId, keep: Option<Updatable>) {
        let Some(slot) = self.slots.get_mut(id.index as usize) else {
            return;
        };
        if slot.generation != id.generation {
            return;
        }
        let cancelled = match slot.state {
            SlotState::Running { cancelled } => cancelled,
            _ => return,
        };
        match keep {
            Some(updatable) if !cancelled => slot.state = SlotState::Occupied(updatable),
            _ => self.vacate(id.index),
        }
    }

    /// Drops every updatable. Pending keep-alives release their waiters.
    pub(crate) fn clear(&mut self) {
        for slot in &mut self.slots {
            if let SlotState::Occupied(Updatable::KeepAlive(Some(completion))) =
                std::mem::replace(&mut slot.state, SlotState::Vacant)
            {
                completion.complete();
            }
        }
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }

    fn vacate(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        slot.state = SlotState::Vacant;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.live -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep_alive() -> Updatable {
        Updatable::KeepAlive(None)
    }

    #[test]
    fn stale_ids_do_not_touch_reused_slots() {
        let mut registry = UpdatableRegistry::new();
        let first = registry.register(keep_alive(), 0);
        assert!(registry.unregister(first));
        let second = registry.register(keep_alive(), 0);
        assert_ne!(first, second);
        assert!(!registry.unregister(first));
        assert!(registry.contains(second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn cancel_while_running_releases_on_end() {
        let mut registry = UpdatableRegistry::new();
        let id = registry.register(keep_alive(), 0);
        let taken = registry.begin_run(id).unwrap();
        assert!(registry.unregister(id));
        assert!(!registry.contains(id));
        registry.end_run(id, Some(taken));
        assert_eq!(registry.len(), 0);
        assert!(registry.live_ids().is_empty());
    }

    #[test]
    fn finished_updatables_are_released() {
        let mut registry = UpdatableRegistry::new();
        let keep = registry.register(keep_alive(), 0);
        let done = registry.register(keep_alive(), 0);
        let u = registry.begin_run(keep).unwrap();
        registry.end_run(keep, Some(u));
        let _ = registry.begin_run(done).unwrap();
        registry.end_run(done, None);
        assert_eq!(registry.live_ids(), vec![keep]);
    }

    #[test]
    fn first_delta_is_capped_at_time_since_registration() {
        let mut registry = UpdatableRegistry::new();
        let old = registry.register(keep_alive(), 0);
        let fresh = registry.register(keep_alive(), 1_000);
        assert_eq!(registry.delta_for(old, 1_000, 1_000), 1_000);
        assert_eq!(registry.delta_for(fresh, 1_000, 1_000), 0);
        assert_eq!(registry.delta_for(fresh, 1_120, 120), 120);

        assert!(registry.unregister(fresh));
        let reused = registry.register(keep_alive(), 1_100);
        assert_eq!(registry.delta_for(reused, 1_120, 120), 20);
        assert_eq!(registry.delta_for(fresh, 1_120, 120), 120);
    }

    #[test]
    fn clear_releases_waiters() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let mut registry = UpdatableRegistry::new();
        registry.register(Updatable::KeepAlive(Some(Completion::Blocking(tx))), 0);
        registry.clear();
        assert!(rx.try_recv().is_ok());
        assert_eq!(registry.len(), 0);
    }
}
