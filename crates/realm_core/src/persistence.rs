//! Persistence hook.
//!
//! The shard never talks to storage directly. It hands objects to a
//! [`Persistence`] implementation from inside queued messages, never during
//! the object update pass.

use crate::entity::WorldObject;

/// Storage collaborator.
pub trait Persistence: Send + Sync + std::fmt::Debug {
    /// Saves the object synchronously, returning whether it succeeded.
    fn save_now(&self, object: &WorldObject) -> bool;
}

/// Persistence that accepts every save and stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPersistence;

impl Persistence for NoopPersistence {
    fn save_now(&self, _object: &WorldObject) -> bool {
        true
    }
}
