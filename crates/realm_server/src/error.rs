//! Error types for the realm host.
//!
//! Shard failures are wrapped as they are; everything the host itself can
//! refuse is categorized here.

use realm_core::{MapId, ShardError};

/// Enumeration of possible host errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ServerError {
    /// A hosted shard refused the operation
    #[error("Shard error: {0}")]
    Shard(#[from] ShardError),

    /// Invalid host or map configuration, including duplicate map ids
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No shard hosts {0}")]
    UnknownMap(MapId),

    /// Internal host errors such as a shard failing to shut down in time
    #[error("Internal error: {0}")]
    Internal(String),
}
