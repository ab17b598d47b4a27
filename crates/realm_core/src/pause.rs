//! World pause coordination.
//!
//! A single pause flag is shared by every shard hosted in one process. While
//! it is set no shard may be started; shards that are already running keep
//! ticking until they are stopped explicitly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared world pause flag.
#[derive(Debug, Clone, Default)]
pub struct WorldPause {
    paused: Arc<AtomicBool>,
}

impl WorldPause {
    /// Creates a new, unpaused flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true while the world is paused.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pauses the world. Subsequent shard starts are refused.
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::AcqRel) {
            info!("⏸️ World paused - shard starts are refused");
        }
    }

    /// Resumes the world.
    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::AcqRel) {
            info!("▶️ World resumed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_the_same_flag() {
        let pause = WorldPause::new();
        let observer = pause.clone();
        assert!(!observer.is_paused());
        pause.pause();
        assert!(observer.is_paused());
        pause.pause();
        observer.resume();
        assert!(!pause.is_paused());
    }
}
