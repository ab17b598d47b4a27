//! Error types for shard operations.
//!
//! [`ShardError`] covers everything a caller of the shard API can observe:
//! context violations, lifecycle refusals and capacity or lookup failures.
//! [`UpdateError`] is what a single updatable, brain or object update reports;
//! the tick loop contains it and applies the fail-safe for that item.

use crate::types::{EntityId, Vec3};

/// Enumeration of shard-level errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ShardError {
    /// Shard-thread-only code ran without holding the shard context.
    /// The shard is stopped before this is returned.
    #[error("Context violation on shard '{shard}': {operation} requires the shard context")]
    ContextViolation { shard: String, operation: &'static str },

    /// A blocking operation ran on the thread that holds the shard context.
    /// The shard is stopped before this is returned.
    #[error("Context violation on shard '{shard}': {operation} must not run inside the shard context")]
    NoContextViolation { shard: String, operation: &'static str },

    /// An immediate add or remove was attempted while objects are being updated.
    #[error("Shard '{shard}' is updating objects; {operation} must be deferred")]
    UpdatingViolation { shard: String, operation: &'static str },

    /// The shard context is claimed by another thread.
    #[error("Shard '{0}' context is held by another thread")]
    ContextBusy(String),

    /// The calling thread already holds the shard context.
    #[error("Shard '{0}' context is already held by the calling thread")]
    ReentrantContext(String),

    #[error("World is paused; shard '{0}' cannot be started")]
    WorldPaused(String),

    #[error("Invalid shard configuration: {0}")]
    InvalidConfig(String),

    #[error("Shard '{0}' is disposed")]
    Disposed(String),

    #[error("Shard '{0}' is not running")]
    NotRunning(String),

    #[error("No async runtime available to schedule shard '{0}'")]
    NoRuntime(String),

    #[error("Point ({}, {}, {}) is outside the shard bounds", .0.x, .0.y, .0.z)]
    OutOfBounds(Vec3),

    #[error("Unknown object {0}")]
    UnknownObject(EntityId),

    #[error("Object {0} is already present in the shard")]
    DuplicateObject(EntityId),

    /// Every 16-bit map slot is in use.
    #[error("Map slot allocator exhausted ({0} slots in use)")]
    SlotsExhausted(usize),

    #[error("Object {0} has been deleted")]
    DeletedObject(EntityId),

    #[error("Unknown spawn pool {0}")]
    UnknownPool(u32),

    #[error("Spawn pool {0} is already active")]
    DuplicatePool(u32),

    /// The shard dropped the queued action before it ran.
    #[error("Wait cancelled: shard '{0}' dropped the queued action")]
    WaitCancelled(String),
}

/// Failure of a single updatable, brain, or object update.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),
}

impl UpdateError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<ShardError> for UpdateError {
    fn from(err: ShardError) -> Self {
        Self::Failed(err.to_string())
    }
}

/// Failure to deliver data to a client session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Session closed")]
    Closed,

    #[error("Send failed: {0}")]
    Send(String),
}
