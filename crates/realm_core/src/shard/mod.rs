//! # Shard
//!
//! A shard (map) is one simulated region of world space with its own object
//! set, space partition, message queue, updatables and spawn pools.
//!
//! ## Concurrency model
//!
//! At most one thread executes shard logic at any instant. A thread enters
//! the shard context by compare-and-swapping its thread token into
//! `current_thread`; only then does it lock the world and receive a
//! [`ShardContext`], which is `!Send` and therefore cannot escape that thread.
//! Every other thread interacts with the shard by pushing [`Message`]s or by
//! using the explicitly thread-safe accessors on [`Shard`] (online character
//! list, statistics, later-operations).
//!
//! ## Lifecycle
//!
//! `Stopped → Starting → Running → Stopping → Stopped`, plus a terminal
//! `Disposed` state reachable only from `Stopped`. While running, a tokio task
//! schedules [`Shard::tick`] on the blocking pool every `update_delay_ms`,
//! minus the time the previous tick took.

mod combat;
mod context;
mod spawning;
mod tick;
mod wait;

pub use context::ShardContext;
pub use tick::{EnvironmentUpdate, TickOutcome, TickReport};

use crate::config::ShardConfig;
use crate::entity::{Brain, CharacterHandle, EntityTable, WorldObject};
use crate::error::ShardError;
use crate::loot::LootGrid;
use crate::pause::WorldPause;
use crate::persistence::{NoopPersistence, Persistence};
use crate::queue::{Message, MessageQueue};
use crate::spatial::SpacePartition;
use crate::spawn::{NpcTemplate, PoolId, SpawnPoolTemplate, SpawnRegistry};
use crate::types::{EntityId, MapId, Position, RegionBounds};
use crate::updatable::{UpdatableId, UpdatableRegistry, UpdateHook};
use crate::utils::{panic_message, Clock, SystemClock};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Creates a brain for an NPC template, or `None` for brainless NPCs.
pub type BrainFactory = Arc<dyn Fn(&NpcTemplate) -> Option<Box<dyn Brain>> + Send + Sync>;

// ============================================================================
// Thread identity
// ============================================================================

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Non-zero token identifying the calling thread.
fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// RAII claim on a shard's `current_thread` slot.
struct ContextClaim<'a> {
    slot: &'a AtomicU64,
}

impl<'a> ContextClaim<'a> {
    fn acquire(slot: &'a AtomicU64) -> Option<Self> {
        slot.compare_exchange(0, current_thread_token(), Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { slot })
    }
}

impl Drop for ContextClaim<'_> {
    fn drop(&mut self) {
        self.slot.store(0, Ordering::Release);
    }
}

// ============================================================================
// State
// ============================================================================

/// Lifecycle state of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum ShardState {
    Stopped = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Disposed = 4,
}

impl ShardState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ShardState::Starting,
            2 => ShardState::Running,
            3 => ShardState::Stopping,
            4 => ShardState::Disposed,
            _ => ShardState::Stopped,
        }
    }
}

/// Everything only the context holder may touch.
pub(crate) struct World {
    pub(crate) entities: EntityTable,
    pub(crate) partition: SpacePartition,
    pub(crate) updatables: UpdatableRegistry,
    pub(crate) spawns: SpawnRegistry,
    pub(crate) loot: LootGrid,
    pub(crate) rng: StdRng,
    pub(crate) tick_count: u64,
    pub(crate) last_tick_ms: Option<u64>,
    pub(crate) initialized: bool,
    pub(crate) map_spawned: bool,
}

impl World {
    fn new(config: &ShardConfig, bounds: &RegionBounds) -> Self {
        let rng = match config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            entities: EntityTable::new(),
            partition: SpacePartition::new(bounds.clone(), config.partition_threshold),
            updatables: UpdatableRegistry::new(),
            spawns: SpawnRegistry::new(config.spawn_points_enabled),
            loot: LootGrid::new(),
            rng,
            tick_count: 0,
            last_tick_ms: None,
            initialized: false,
            map_spawned: false,
        }
    }

    fn clear(&mut self) {
        self.updatables.clear();
        self.spawns.clear();
        self.entities = EntityTable::new();
        self.partition.clear();
        self.loot = LootGrid::new();
    }
}

/// Point-in-time statistics of one shard.
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    pub map_id: MapId,
    pub name: String,
    pub state: ShardState,
    pub tick_count: u64,
    pub objects: usize,
    pub characters: usize,
    pub message_backlog: usize,
    pub updatables: usize,
    pub spawn_pools: usize,
    /// 9:1 weighted moving average of tick duration
    pub avg_tick_ms: f64,
    pub objects_updated_last_tick: usize,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    avg_tick_ms_bits: AtomicU64,
    objects: AtomicUsize,
    updated_last_tick: AtomicUsize,
    updatables: AtomicUsize,
    pools: AtomicUsize,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Shard`].
pub struct ShardBuilder {
    map_id: MapId,
    name: String,
    config: ShardConfig,
    bounds: RegionBounds,
    clock: Arc<dyn Clock>,
    pause: WorldPause,
    persistence: Arc<dyn Persistence>,
    brain_factory: Option<BrainFactory>,
    pools: Vec<Arc<SpawnPoolTemplate>>,
}

impl ShardBuilder {
    pub fn config(mut self, config: ShardConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bounds(mut self, bounds: RegionBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Shares a world pause flag, normally the host's.
    pub fn pause(mut self, pause: WorldPause) -> Self {
        self.pause = pause;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn brain_factory(mut self, factory: BrainFactory) -> Self {
        self.brain_factory = Some(factory);
        self
    }

    /// Pool templates spawned by [`ShardContext::spawn_map`].
    pub fn spawn_pools(mut self, pools: impl IntoIterator<Item = SpawnPoolTemplate>) -> Self {
        self.pools = pools.into_iter().map(Arc::new).collect();
        self
    }

    pub fn build(self) -> Result<Arc<Shard>, ShardError> {
        self.config.validate().map_err(ShardError::InvalidConfig)?;
        let b = &self.bounds;
        if !(b.min_x < b.max_x && b.min_y < b.max_y && b.min_z <= b.max_z) {
            return Err(ShardError::InvalidConfig(format!(
                "bounds of shard '{}' are empty or inverted",
                self.name
            )));
        }
        let world = World::new(&self.config, &self.bounds);
        Ok(Arc::new(Shard {
            map_id: self.map_id,
            name: self.name,
            config: self.config,
            bounds: self.bounds,
            clock: self.clock,
            pause: self.pause,
            persistence: self.persistence,
            brain_factory: self.brain_factory,
            pool_templates: self.pools,
            state: AtomicU8::new(ShardState::Stopped as u8),
            current_thread: AtomicU64::new(0),
            updating: AtomicBool::new(false),
            dispose_requested: AtomicBool::new(false),
            messages: MessageQueue::new(),
            world: Mutex::new(world),
            online: DashMap::new(),
            counters: Counters::default(),
        }))
    }
}

// ============================================================================
// Shard
// ============================================================================

/// One simulated region of world space.
pub struct Shard {
    map_id: MapId,
    name: String,
    config: ShardConfig,
    bounds: RegionBounds,
    clock: Arc<dyn Clock>,
    pause: WorldPause,
    persistence: Arc<dyn Persistence>,
    brain_factory: Option<BrainFactory>,
    pool_templates: Vec<Arc<SpawnPoolTemplate>>,
    state: AtomicU8,
    current_thread: AtomicU64,
    updating: AtomicBool,
    dispose_requested: AtomicBool,
    messages: MessageQueue,
    world: Mutex<World>,
    online: DashMap<EntityId, CharacterHandle>,
    counters: Counters,
}

impl std::fmt::Debug for Shard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shard")
            .field("map_id", &self.map_id)
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

impl Shard {
    /// Starts building a shard with default configuration, bounds and a
    /// system clock.
    pub fn builder(map_id: MapId, name: impl Into<String>) -> ShardBuilder {
        ShardBuilder {
            map_id,
            name: name.into(),
            config: ShardConfig::default(),
            bounds: RegionBounds::default(),
            clock: Arc::new(SystemClock::new()),
            pause: WorldPause::new(),
            persistence: Arc::new(NoopPersistence),
            brain_factory: None,
            pools: Vec::new(),
        }
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ShardConfig {
        &self.config
    }

    pub fn bounds(&self) -> &RegionBounds {
        &self.bounds
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn state(&self) -> ShardState {
        ShardState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ShardState::Running
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == ShardState::Disposed
    }

    /// Whether the tick loop currently owns the shard's scheduling.
    pub fn is_scheduled(&self) -> bool {
        matches!(
            self.state(),
            ShardState::Starting | ShardState::Running | ShardState::Stopping
        )
    }

    /// Whether the calling thread holds the shard context.
    pub fn is_in_context(&self) -> bool {
        self.current_thread.load(Ordering::Acquire) == current_thread_token()
    }

    /// Whether the object update pass is in progress.
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    fn transition(&self, from: ShardState, to: ShardState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn lock_world(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(|poisoned| {
            warn!("🩹 Shard '{}' world lock was poisoned; recovering", self.name);
            poisoned.into_inner()
        })
    }

    // ------------------------------------------------------------------
    // Context checks
    // ------------------------------------------------------------------

    /// Fails, stopping the shard, unless the caller holds the shard context.
    pub fn ensure_context(&self, operation: &'static str) -> Result<(), ShardError> {
        if self.is_in_context() {
            return Ok(());
        }
        error!(
            "🚨 Shard '{}': {} called outside the shard context - stopping shard",
            self.name, operation
        );
        self.stop();
        Err(ShardError::ContextViolation {
            shard: self.name.clone(),
            operation,
        })
    }

    /// Fails, stopping the shard, when the caller holds the shard context.
    pub fn ensure_no_context(&self, operation: &'static str) -> Result<(), ShardError> {
        if !self.is_in_context() {
            return Ok(());
        }
        error!(
            "🚨 Shard '{}': {} called from inside the shard context - stopping shard",
            self.name, operation
        );
        self.stop();
        Err(ShardError::NoContextViolation {
            shard: self.name.clone(),
            operation,
        })
    }

    /// Fails, stopping the shard, while objects are being updated.
    pub fn ensure_not_updating(&self, operation: &'static str) -> Result<(), ShardError> {
        if !self.is_updating() {
            return Ok(());
        }
        error!(
            "🚨 Shard '{}': {} called during the object update pass - stopping shard",
            self.name, operation
        );
        self.stop();
        Err(ShardError::UpdatingViolation {
            shard: self.name.clone(),
            operation,
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts the tick loop on the current tokio runtime.
    ///
    /// Starting a running shard is a no-op. Starting while the world is
    /// paused fails with [`ShardError::WorldPaused`].
    pub fn start(self: &Arc<Self>) -> Result<(), ShardError> {
        loop {
            match self.state() {
                ShardState::Running | ShardState::Starting => return Ok(()),
                ShardState::Disposed => return Err(ShardError::Disposed(self.name.clone())),
                _ => {}
            }
            if self.pause.is_paused() {
                error!("⛔ Refusing to start shard '{}' while the world is paused", self.name);
                return Err(ShardError::WorldPaused(self.name.clone()));
            }
            if self.transition(ShardState::Stopping, ShardState::Running) {
                self.dispose_requested.store(false, Ordering::Release);
                info!("🔁 Shard '{}' resumed before its loop exited", self.name);
                return Ok(());
            }
            let handle = tokio::runtime::Handle::try_current()
                .map_err(|_| ShardError::NoRuntime(self.name.clone()))?;
            if !self.transition(ShardState::Stopped, ShardState::Starting) {
                continue;
            }

            self.post("initialize", |ctx| ctx.initialize());
            if self.launch(&handle) {
                info!(
                    "🚀 Shard '{}' ({}) started, tick every {}ms",
                    self.name, self.map_id, self.config.update_delay_ms
                );
            }
            return Ok(());
        }
    }

    /// Publishes `Running` for a shard in `Starting` and spawns its loop.
    ///
    /// A stop that arrived while starting wins: no loop is spawned and the
    /// shard settles in `Stopped`, or `Disposed` when disposal was requested.
    ///
    /// # Returns
    ///
    /// True when the loop was spawned.
    fn launch(self: &Arc<Self>, handle: &tokio::runtime::Handle) -> bool {
        if !self.transition(ShardState::Starting, ShardState::Running) {
            info!("⏹️ Shard '{}' was stopped while starting", self.name);
            self.finish_stopping();
            return false;
        }
        handle.spawn(Self::run_loop(Arc::downgrade(self)));
        true
    }

    async fn run_loop(weak: Weak<Shard>) {
        let mut delay = Duration::ZERO;
        loop {
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            let Some(shard) = weak.upgrade() else {
                return;
            };
            if shard.state() != ShardState::Running {
                shard.finish_stopping();
                return;
            }

            let started = Instant::now();
            let ticking = Arc::clone(&shard);
            if let Err(e) = tokio::task::spawn_blocking(move || ticking.tick()).await {
                error!("💥 Tick task of shard '{}' failed: {}", shard.name, e);
            }
            if shard.state() != ShardState::Running {
                shard.finish_stopping();
                return;
            }
            let target = Duration::from_millis(shard.config.update_delay_ms);
            delay = target.saturating_sub(started.elapsed());
        }
    }

    fn finish_stopping(&self) {
        if self.transition(ShardState::Stopping, ShardState::Stopped) {
            info!("🛑 Shard '{}' stopped", self.name);
            if self.dispose_requested.load(Ordering::Acquire) {
                self.dispose_stopped();
            }
        }
    }

    /// Asks the tick loop to stop after its current tick.
    pub fn stop(&self) {
        if self.transition(ShardState::Running, ShardState::Stopping)
            || self.transition(ShardState::Starting, ShardState::Stopping)
        {
            info!("⏹️ Stopping shard '{}'", self.name);
        }
    }

    /// Disposes the shard: queued messages are dropped (their waiters are
    /// released with an error) and every object is removed.
    ///
    /// A shard that is still scheduled is stopped first and disposed once its
    /// loop exits.
    pub fn dispose(&self) -> Result<(), ShardError> {
        self.ensure_no_context("dispose")?;
        match self.state() {
            ShardState::Disposed => Ok(()),
            ShardState::Stopped => {
                self.dispose_stopped();
                Ok(())
            }
            _ => {
                self.dispose_requested.store(true, Ordering::Release);
                self.stop();
                Ok(())
            }
        }
    }

    fn dispose_stopped(&self) {
        if !self.transition(ShardState::Stopped, ShardState::Disposed) {
            return;
        }
        let dropped = self.messages.clear();
        let objects = {
            let mut world = self.lock_world();
            let objects = world.entities.len();
            world.clear();
            objects
        };
        self.online.clear();
        self.counters.objects.store(0, Ordering::Relaxed);
        info!(
            "🗑️ Shard '{}' disposed ({} objects removed, {} queued messages dropped)",
            self.name, objects, dropped
        );
    }

    // ------------------------------------------------------------------
    // Context entry
    // ------------------------------------------------------------------

    /// Runs `f` inside the shard context on the calling thread.
    ///
    /// Fails when another thread holds the context or the caller already
    /// holds it. Prefer messages while the shard is running; a direct entry
    /// makes a concurrent tick skip.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut ShardContext<'_>) -> R) -> Result<R, ShardError> {
        if self.is_disposed() {
            return Err(ShardError::Disposed(self.name.clone()));
        }
        if self.is_in_context() {
            return Err(ShardError::ReentrantContext(self.name.clone()));
        }
        let _claim = ContextClaim::acquire(&self.current_thread)
            .ok_or_else(|| ShardError::ContextBusy(self.name.clone()))?;
        let mut world = self.lock_world();
        let result = {
            let mut ctx = ShardContext::enter(self, &mut world)?;
            f(&mut ctx)
        };
        self.refresh_counters(&world);
        Ok(result)
    }

    /// Runs `action` right away when the shard is not scheduled and the
    /// context is free; enqueues it otherwise.
    ///
    /// # Returns
    ///
    /// True when the action ran immediately.
    pub fn execute_in_context<F>(&self, action: F) -> bool
    where
        F: FnOnce(&mut ShardContext<'_>) + Send + 'static,
    {
        if !self.is_scheduled() && !self.is_disposed() && !self.is_in_context() {
            if let Some(_claim) = ContextClaim::acquire(&self.current_thread) {
                let mut world = self.lock_world();
                if let Ok(mut ctx) = ShardContext::enter(self, &mut world) {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| action(&mut ctx))) {
                        error!(
                            "💥 Immediate action on shard '{}' panicked: {}",
                            self.name,
                            panic_message(payload.as_ref())
                        );
                    }
                }
                self.refresh_counters(&world);
                return true;
            }
        }
        self.post("execute_in_context", action);
        false
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    /// Enqueues a message. Safe from any thread; never blocks. Messages sent
    /// to a disposed shard are dropped.
    pub fn add_message(&self, message: Message) {
        if self.is_disposed() {
            debug!("📭 Dropping message '{}' for disposed shard '{}'", message.label(), self.name);
            return;
        }
        self.messages.push(message);
    }

    /// Enqueues a closure as a message.
    pub fn post<F>(&self, label: &'static str, action: F)
    where
        F: FnOnce(&mut ShardContext<'_>) + Send + 'static,
    {
        self.add_message(Message::new(label, action));
    }

    pub fn message_backlog(&self) -> usize {
        self.messages.len()
    }

    // ------------------------------------------------------------------
    // Later operations (thread-safe)
    // ------------------------------------------------------------------

    /// Adds an object during the next message drain.
    pub fn add_object_later(&self, object: WorldObject) {
        self.post("add_object", move |ctx| {
            if let Err(e) = ctx.add_object_now(object) {
                warn!("⚠️ Deferred add on shard '{}' failed: {}", ctx.shard().name, e);
            }
        });
    }

    /// Removes and deletes an object during the next message drain.
    pub fn remove_object_later(&self, id: EntityId) {
        self.post("remove_object", move |ctx| {
            if let Err(e) = ctx.delete_object_now(id) {
                debug!("Deferred removal on shard '{}': {}", ctx.shard().name, e);
            }
        });
    }

    /// Adds an object now when the context is free, otherwise later.
    pub fn add_object(&self, object: WorldObject) {
        self.execute_in_context(move |ctx| {
            if let Err(e) = ctx.add_object(object) {
                warn!("⚠️ Add on shard '{}' failed: {}", ctx.shard().name, e);
            }
        });
    }

    /// Removes an object now when the context is free, otherwise later.
    pub fn remove_object(&self, id: EntityId) {
        self.execute_in_context(move |ctx| {
            if let Err(e) = ctx.remove_object(id) {
                debug!("Removal on shard '{}': {}", ctx.shard().name, e);
            }
        });
    }

    /// Moves an object to another shard.
    ///
    /// The object is removed on this shard's thread, marked teleporting while
    /// in flight, and added on the target's thread at `position`.
    ///
    /// A disposed target refuses the transfer and the object stays where it
    /// is. If the target is disposed while the object is in flight, a
    /// character's session is kicked so the player can log back in.
    pub fn transfer_object_later(&self, id: EntityId, target: Arc<Shard>, position: Position) {
        self.post("transfer_object", move |ctx| {
            if target.is_disposed() {
                warn!(
                    "⚠️ Transfer of {} from shard '{}' refused: target '{}' is disposed",
                    id,
                    ctx.shard().name,
                    target.name
                );
                return;
            }
            let mut object = match ctx.remove_object_now(id) {
                Ok(object) => object,
                Err(e) => {
                    warn!("⚠️ Transfer of {} from shard '{}' failed: {}", id, ctx.shard().name, e);
                    return;
                }
            };
            object.teleporting = true;
            object.set_position(position);
            let from = ctx.shard().name.clone();
            let mut in_flight = InFlight {
                object: Some(object),
                from: from.clone(),
                to: target.name.clone(),
            };
            target.post("receive_transfer", move |ctx| {
                let Some(mut object) = in_flight.object.take() else {
                    return;
                };
                object.teleporting = false;
                let character = object.as_character().map(|c| Arc::clone(c.session()));
                match ctx.add_object_now(object) {
                    Ok(id) => debug!("🌀 {} arrived on shard '{}' from '{}'", id, ctx.shard().name, from),
                    Err(e) => {
                        error!("❌ Transfer into shard '{}' failed: {}", ctx.shard().name, e);
                        if let Some(session) = character {
                            session.kick("transfer failed");
                        }
                    }
                }
            });
        });
    }

    pub fn add_pool_later(&self, template: SpawnPoolTemplate) {
        self.post("add_pool", move |ctx| {
            if let Err(e) = ctx.add_pool_now(&template) {
                warn!("⚠️ Adding spawn pool on shard '{}' failed: {}", ctx.shard().name, e);
            }
        });
    }

    pub fn remove_pool_later(&self, pool: PoolId) {
        self.post("remove_pool", move |ctx| {
            ctx.remove_pool_now(pool);
        });
    }

    /// Registers a custom updatable during the next message drain.
    pub fn register_updatable_later(&self, hook: Box<dyn UpdateHook>) {
        self.post("register_updatable", move |ctx| {
            ctx.register_hook(hook);
        });
    }

    pub fn unregister_updatable_later(&self, id: UpdatableId) {
        self.post("unregister_updatable", move |ctx| {
            ctx.unregister_updatable(id);
        });
    }

    /// Runs `action` once after `delay_ms`, counted from the next drain.
    pub fn call_delayed<F>(&self, delay_ms: u64, action: F)
    where
        F: FnOnce(&mut ShardContext<'_>) + Send + 'static,
    {
        self.post("call_delayed", move |ctx| {
            ctx.call_delayed(delay_ms, action);
        });
    }

    /// Runs `action` every `interval_ms`, counted from the next drain.
    pub fn call_periodically<F>(&self, interval_ms: u64, action: F)
    where
        F: FnMut(&mut ShardContext<'_>) + Send + 'static,
    {
        self.post("call_periodically", move |ctx| {
            ctx.call_periodically(interval_ms, action);
        });
    }

    /// Saves an object from inside the next drain.
    pub fn save_later(&self, id: EntityId) {
        self.post("save", move |ctx| {
            if !ctx.save_now(id) {
                warn!("💾 Saving {} on shard '{}' failed", id, ctx.shard().name);
            }
        });
    }

    /// Saves, kicks and removes a character during the next drain.
    pub fn logout_later(&self, id: EntityId, reason: impl Into<String>) {
        let reason = reason.into();
        self.post("logout", move |ctx| {
            if let Err(e) = ctx.logout_now(id, &reason) {
                debug!("Logout on shard '{}': {}", ctx.shard().name, e);
            }
        });
    }

    // ------------------------------------------------------------------
    // Thread-safe accessors
    // ------------------------------------------------------------------

    /// Snapshot of the characters currently in this shard.
    pub fn online_characters(&self) -> Vec<CharacterHandle> {
        self.online.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    /// Sends a packet to every character in the shard.
    ///
    /// # Returns
    ///
    /// Number of successful deliveries.
    pub fn send_to_map(&self, packet: &[u8]) -> usize {
        self.online
            .iter()
            .filter(|entry| entry.value().send(packet).is_ok())
            .count()
    }

    pub fn stats(&self) -> ShardStats {
        ShardStats {
            map_id: self.map_id,
            name: self.name.clone(),
            state: self.state(),
            tick_count: self.counters.ticks.load(Ordering::Relaxed),
            objects: self.counters.objects.load(Ordering::Relaxed),
            characters: self.online.len(),
            message_backlog: self.messages.len(),
            updatables: self.counters.updatables.load(Ordering::Relaxed),
            spawn_pools: self.counters.pools.load(Ordering::Relaxed),
            avg_tick_ms: f64::from_bits(self.counters.avg_tick_ms_bits.load(Ordering::Relaxed)),
            objects_updated_last_tick: self.counters.updated_last_tick.load(Ordering::Relaxed),
        }
    }

    fn refresh_counters(&self, world: &World) {
        self.counters.objects.store(world.entities.len(), Ordering::Relaxed);
        self.counters.updatables.store(world.updatables.len(), Ordering::Relaxed);
        self.counters.pools.store(world.spawns.len(), Ordering::Relaxed);
    }
}

/// An object travelling between shards.
///
/// Dropped undelivered, for example with the queue of a target disposed
/// mid-flight, it kicks the character's session.
struct InFlight {
    object: Option<WorldObject>,
    from: String,
    to: String,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };
        warn!(
            "📭 {} never arrived on shard '{}' from '{}'",
            object.id(),
            self.to,
            self.from
        );
        if let Some(character) = object.as_character() {
            character.session().kick("transfer target unavailable");
        }
    }
}
