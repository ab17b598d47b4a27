//! # Realm Server - Multi-Shard Host
//!
//! Hosts every world shard of one process. Each shard simulates one map on
//! its own tick loop (see `realm_core`); the host owns what they share and
//! what spans several of them.
//!
//! ## Responsibilities
//!
//! * **Shard registry** - One shard per map id, built from a [`MapDefinition`]
//! * **World pause** - While paused no shard may be started
//! * **Lifecycle** - Start, stop and dispose all shards or a single one
//! * **Cross-shard transfer** - Objects leave one shard and arrive on another
//!   through both shards' message queues
//! * **Global broadcast** - Uses each shard's thread-safe character list
//! * **Save-all** - Queues a save of every online character on its shard
//!
//! ## Usage
//!
//! ```rust,no_run
//! use realm_server::{MapDefinition, RealmServer, ServerConfig};
//! use realm_core::MapId;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let server = RealmServer::new(ServerConfig::default());
//! server.create_shard(&MapDefinition::new(MapId(0), "Eastern Kingdoms"))?;
//! server.create_shard(&MapDefinition::new(MapId(1), "Kalimdor"))?;
//!
//! // Runs until `server.shutdown()` is called from elsewhere.
//! server.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! The registry is a `DashMap`; every host operation works on cloned
//! `Arc<Shard>` handles and only uses shard APIs that are safe from any
//! thread (messages, online lists, statistics).

pub use config::{MapDefinition, ServerConfig};
pub use error::ServerError;
pub use server::{RealmServer, ServerStats};

pub mod config;
pub mod error;
pub mod server;

#[cfg(test)]
mod tests;
