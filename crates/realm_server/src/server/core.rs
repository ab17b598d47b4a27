//! Core realm host implementation.
//!
//! This module contains the `RealmServer` struct: the registry of hosted
//! shards and every operation that spans more than one of them.

use crate::{
    config::{MapDefinition, ServerConfig},
    error::ServerError,
};
use dashmap::DashMap;
use realm_core::{
    BrainFactory, Clock, EntityId, MapId, NoopPersistence, Persistence, Position, Shard, ShardStats,
    SystemClock, WorldPause,
};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Aggregated statistics over every hosted shard.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStats {
    pub paused: bool,
    pub shards: Vec<ShardStats>,
    pub total_objects: usize,
    pub total_characters: usize,
    pub total_message_backlog: usize,
}

/// The realm host.
///
/// `RealmServer` owns every shard of the process together with the state
/// they share: the world pause flag, the clock and the persistence
/// collaborator. It never touches a shard's world directly; cross-shard work
/// goes through each shard's message queue or its thread-safe accessors.
pub struct RealmServer {
    /// Host configuration settings
    config: ServerConfig,

    /// Hosted shards keyed by map id
    shards: DashMap<MapId, Arc<Shard>>,

    /// Shared world pause flag
    pause: WorldPause,

    clock: Arc<dyn Clock>,
    persistence: Arc<dyn Persistence>,
    brain_factory: Option<BrainFactory>,

    /// Channel for coordinating host shutdown
    shutdown_sender: broadcast::Sender<()>,
    shutdown_requested: AtomicBool,
}

impl RealmServer {
    /// Creates a host with no shards, the system clock and no-op persistence.
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_sender, _) = broadcast::channel(1);
        Self {
            config,
            shards: DashMap::new(),
            pause: WorldPause::new(),
            clock: Arc::new(SystemClock::new()),
            persistence: Arc::new(NoopPersistence),
            brain_factory: None,
            shutdown_sender,
            shutdown_requested: AtomicBool::new(false),
        }
    }

    /// Replaces the clock handed to shards created afterwards.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replaces the persistence handed to shards created afterwards.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_brain_factory(mut self, factory: BrainFactory) -> Self {
        self.brain_factory = Some(factory);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Builds and registers the shard for `map`.
    ///
    /// The shard is not started. A map id can only be hosted once.
    ///
    /// # Returns
    ///
    /// The new shard, or [`ServerError::Config`] for a duplicate id and
    /// [`ServerError::Shard`] when the shard rejects its configuration.
    pub fn create_shard(&self, map: &MapDefinition) -> Result<Arc<Shard>, ServerError> {
        if self.shards.contains_key(&map.id) {
            return Err(ServerError::Config(format!(
                "{} ('{}') is already hosted",
                map.id, map.name
            )));
        }

        let mut builder = Shard::builder(map.id, map.name.clone())
            .config(map.shard_config(&self.config.default_shard))
            .bounds(map.bounds.clone())
            .clock(Arc::clone(&self.clock))
            .pause(self.pause.clone())
            .persistence(Arc::clone(&self.persistence))
            .spawn_pools(map.spawn_pools.iter().cloned());
        if let Some(factory) = &self.brain_factory {
            builder = builder.brain_factory(Arc::clone(factory));
        }
        let shard = builder.build()?;

        match self.shards.entry(map.id) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ServerError::Config(format!(
                "{} ('{}') is already hosted",
                map.id, map.name
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::clone(&shard));
                info!(
                    "🗺️ Hosting '{}' ({}) with {} spawn pool(s)",
                    map.name,
                    map.id,
                    map.spawn_pools.len()
                );
                Ok(shard)
            }
        }
    }

    /// Creates a shard for every definition, stopping at the first failure.
    pub fn create_shards<'a>(
        &self,
        maps: impl IntoIterator<Item = &'a MapDefinition>,
    ) -> Result<usize, ServerError> {
        let mut created = 0;
        for map in maps {
            self.create_shard(map)?;
            created += 1;
        }
        Ok(created)
    }

    pub fn get_shard(&self, map_id: MapId) -> Option<Arc<Shard>> {
        self.shards.get(&map_id).map(|entry| Arc::clone(entry.value()))
    }

    /// Map ids of every hosted shard, sorted.
    pub fn map_ids(&self) -> Vec<MapId> {
        let mut ids: Vec<MapId> = self.shards.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn all_shards(&self) -> Vec<Arc<Shard>> {
        self.shards.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Unregisters a shard and disposes it.
    ///
    /// A running shard is stopped first and disposed once its loop exits.
    pub fn dispose_shard(&self, map_id: MapId) -> Result<(), ServerError> {
        let (_, shard) = self
            .shards
            .remove(&map_id)
            .ok_or(ServerError::UnknownMap(map_id))?;
        shard.dispose()?;
        info!("🗑️ '{}' ({}) is no longer hosted", shard.name(), map_id);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts every hosted shard on the current tokio runtime.
    ///
    /// # Returns
    ///
    /// Number of shards running afterwards, or the first shard error
    /// (for example [`realm_core::ShardError::WorldPaused`]).
    pub fn start_all(&self) -> Result<usize, ServerError> {
        let shards = self.all_shards();
        for shard in &shards {
            shard.start()?;
        }
        Ok(shards.iter().filter(|s| s.is_running()).count())
    }

    /// Asks every shard to stop after its current tick.
    pub fn stop_all(&self) {
        for shard in self.all_shards() {
            shard.stop();
        }
    }

    /// Pauses the world: no shard can be started until [`Self::resume`].
    pub fn pause(&self) {
        self.pause.pause();
    }

    pub fn resume(&self) {
        self.pause.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    // ------------------------------------------------------------------
    // Cross-shard operations
    // ------------------------------------------------------------------

    /// Moves an object from one hosted shard to another.
    ///
    /// Both shards must be hosted; the move itself runs on the shards'
    /// own threads during their next drains.
    pub fn transfer(
        &self,
        id: EntityId,
        from: MapId,
        to: MapId,
        position: Position,
    ) -> Result<(), ServerError> {
        let source = self.get_shard(from).ok_or(ServerError::UnknownMap(from))?;
        let target = self.get_shard(to).ok_or(ServerError::UnknownMap(to))?;
        if !target.bounds().contains(&position.point) {
            return Err(ServerError::Shard(realm_core::ShardError::OutOfBounds(position.point)));
        }
        debug!("🌀 Transferring {} from {} to {}", id, from, to);
        source.transfer_object_later(id, target, position);
        Ok(())
    }

    /// Sends a packet to every online character of every shard.
    ///
    /// # Returns
    ///
    /// Number of successful deliveries.
    pub fn broadcast(&self, packet: &[u8]) -> usize {
        self.all_shards().iter().map(|shard| shard.send_to_map(packet)).sum()
    }

    pub fn online_count(&self) -> usize {
        self.all_shards().iter().map(|shard| shard.online_count()).sum()
    }

    /// Queues a save of every online character on its shard.
    ///
    /// # Returns
    ///
    /// Number of saves queued.
    pub fn save_all(&self) -> usize {
        let mut queued = 0;
        for shard in self.all_shards() {
            if shard.is_disposed() {
                continue;
            }
            for character in shard.online_characters() {
                shard.save_later(character.id);
                queued += 1;
            }
        }
        if queued > 0 {
            info!("💾 Queued saves for {} character(s)", queued);
        }
        queued
    }

    pub fn stats(&self) -> ServerStats {
        let mut shards: Vec<ShardStats> = self.all_shards().iter().map(|s| s.stats()).collect();
        shards.sort_by_key(|s| s.map_id);
        ServerStats {
            paused: self.is_paused(),
            total_objects: shards.iter().map(|s| s.objects).sum(),
            total_characters: shards.iter().map(|s| s.characters).sum(),
            total_message_backlog: shards.iter().map(|s| s.message_backlog).sum(),
            shards,
        }
    }

    // ------------------------------------------------------------------
    // Run loop
    // ------------------------------------------------------------------

    /// Starts every shard and runs the host's housekeeping until
    /// [`Self::shutdown`] is called, then shuts everything down.
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut shutdown_receiver = self.shutdown_sender.subscribe();

        let running = self.start_all()?;
        info!(
            "🚀 Realm host running {} shard(s) on {} CPU core(s)",
            running,
            num_cpus::get()
        );

        let mut status = housekeeping_interval(self.config.status_interval_secs);
        let mut autosave = housekeeping_interval(self.config.autosave_interval_secs);

        while !self.shutdown_requested.load(Ordering::Acquire) {
            tokio::select! {
                _ = tick_or_park(&mut status) => self.log_status(),
                _ = tick_or_park(&mut autosave) => {
                    self.save_all();
                }
                _ = shutdown_receiver.recv() => {
                    info!("🛑 Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown_shards().await
    }

    /// Requests [`Self::run`] to shut the host down.
    pub fn shutdown(&self) {
        info!("🛑 Shutting down realm host...");
        self.shutdown_requested.store(true, Ordering::Release);
        let _ = self.shutdown_sender.send(());
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Saves every character, lets running shards drain those saves, then
    /// stops and disposes every shard.
    pub async fn shutdown_shards(&self) -> Result<(), ServerError> {
        info!("🧹 Performing realm host cleanup...");
        let deadline = Duration::from_millis(self.config.shutdown_timeout_ms);
        let shards = self.all_shards();

        if self.save_all() > 0 {
            let drains = shards
                .iter()
                .filter(|s| s.is_running())
                .map(|s| s.wait_one_tick_async());
            match tokio::time::timeout(deadline, futures::future::join_all(drains)).await {
                Ok(results) => {
                    for e in results.into_iter().filter_map(Result::err) {
                        warn!("⚠️ Final save drain failed: {}", e);
                    }
                }
                Err(_) => warn!("⚠️ Final saves did not drain within {:?}", deadline),
            }
        }

        self.stop_all();
        let started = Instant::now();
        while shards.iter().any(|s| s.is_scheduled()) {
            if started.elapsed() >= deadline {
                let stuck: Vec<&str> = shards
                    .iter()
                    .filter(|s| s.is_scheduled())
                    .map(|s| s.name())
                    .collect();
                error!("❌ Shards still ticking after {:?}: {:?}", deadline, stuck);
                return Err(ServerError::Internal(format!(
                    "{} shard(s) did not stop within {:?}",
                    stuck.len(),
                    deadline
                )));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for shard in &shards {
            shard.dispose()?;
        }
        self.shards.clear();
        info!("✅ Realm host cleanup completed");
        Ok(())
    }

    fn log_status(&self) {
        let stats = self.stats();
        info!(
            "📊 {} shard(s), {} character(s) online, {} object(s), {} queued message(s){}",
            stats.shards.len(),
            stats.total_characters,
            stats.total_objects,
            stats.total_message_backlog,
            if stats.paused { ", world paused" } else { "" }
        );
        for shard in &stats.shards {
            match serde_json::to_string(shard) {
                Ok(json) => debug!("📈 {}", json),
                Err(e) => warn!("⚠️ Could not serialize stats of '{}': {}", shard.name, e),
            }
        }
    }
}

fn housekeeping_interval(secs: u64) -> Option<tokio::time::Interval> {
    (secs > 0).then(|| {
        let period = Duration::from_secs(secs);
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        timer.reset();
        timer
    })
}

/// Waits for the next tick of `timer`, or forever when it is disabled.
async fn tick_or_park(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
