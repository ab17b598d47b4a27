//! Shared fixtures for shard tests.

use crate::entity::{Brain, BrainAction, CharacterInfo, Session, WorldObject};
use crate::error::{SessionError, UpdateError};
use crate::shard::{Shard, TickOutcome, TickReport};
use crate::spatial::ProximityView;
use crate::spawn::NpcTemplate;
use crate::types::{MapId, Position};
use crate::utils::ManualClock;
use crate::ShardConfig;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Session recording everything sent to it.
#[derive(Debug, Default)]
pub struct RecordingSession {
    pub sent: Mutex<Vec<Vec<u8>>>,
    pub kicks: Mutex<Vec<String>>,
    pub panic_on_send: AtomicBool,
}

impl RecordingSession {
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }

    pub fn kick_count(&self) -> usize {
        self.kicks.lock().unwrap().len()
    }
}

impl Session for RecordingSession {
    fn send(&self, packet: &[u8]) -> Result<(), SessionError> {
        if self.panic_on_send.load(Ordering::SeqCst) {
            panic!("socket buffer corrupted");
        }
        self.sent.lock().unwrap().push(packet.to_vec());
        Ok(())
    }

    fn kick(&self, reason: &str) {
        self.kicks.lock().unwrap().push(reason.to_string());
    }
}

/// Brain counting how often it ran, optionally failing or moving.
pub struct CountingBrain {
    pub runs: Arc<AtomicUsize>,
    pub fail: bool,
    pub move_to: Option<Position>,
}

impl CountingBrain {
    pub fn new(runs: Arc<AtomicUsize>) -> Self {
        Self {
            runs,
            fail: false,
            move_to: None,
        }
    }
}

impl Brain for CountingBrain {
    fn update(
        &mut self,
        _me: &WorldObject,
        _nearby: &ProximityView<'_>,
        _delta_ms: u64,
    ) -> Result<BrainAction, UpdateError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(UpdateError::failed("brain lost its mind"));
        }
        Ok(self.move_to.map_or(BrainAction::Idle, BrainAction::MoveTo))
    }
}

/// Deterministic configuration: no auto spawn, seeded rolls.
pub fn test_config() -> ShardConfig {
    ShardConfig {
        auto_spawn: false,
        rng_seed: Some(7),
        ..ShardConfig::default()
    }
}

pub fn manual_shard(clock: &ManualClock, config: ShardConfig) -> Arc<Shard> {
    Shard::builder(MapId(1), "test-map")
        .config(config)
        .clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

pub fn character(name: &str, position: Position) -> (WorldObject, Arc<RecordingSession>) {
    let session = Arc::new(RecordingSession::default());
    let object = WorldObject::character(CharacterInfo::new(name), session.clone(), position);
    (object, session)
}

pub fn npc(entry_id: u32, position: Position) -> WorldObject {
    WorldObject::npc(Arc::new(NpcTemplate::new(entry_id, "Defias Bandit")), position)
}

pub fn npc_with_brain(position: Position, brain: CountingBrain) -> WorldObject {
    let mut object = npc(1, position);
    if let Some(npc) = object.as_npc_mut() {
        npc.set_brain(Box::new(brain));
    }
    object
}

pub fn executed(outcome: TickOutcome) -> TickReport {
    match outcome {
        TickOutcome::Executed(report) => report,
        other => panic!("expected an executed tick, got {other:?}"),
    }
}
