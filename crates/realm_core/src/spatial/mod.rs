//! Spatial partitioning and proximity queries.
//!
//! A shard's volume is pre-split into a quadtree of axis-aligned leaves over
//! the X/Y plane. Every placed object lives in exactly one leaf; the leaf id is
//! stored on the object so moves and removals never search the tree.

mod partition;
mod query;

pub use partition::{LeafId, SpacePartition};
pub use query::{ProximityView, Shape};

use crate::types::{EntityId, ObjectType, Phase, Vec3};
use serde::{Deserialize, Serialize};

/// What the partition knows about an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialEntry {
    pub id: EntityId,
    pub point: Vec3,
    pub phase: Phase,
    pub kind: ObjectType,
    /// Template entry of NPCs and game objects, 0 for characters
    pub entry_id: u32,
}

/// Statistics for the space partition
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartitionStats {
    /// Number of leaves
    pub leaves: usize,
    /// Leaves containing at least one character
    pub active_leaves: usize,
    /// Number of objects tracked
    pub objects_tracked: usize,
    /// Largest number of objects in one leaf
    pub max_leaf_population: usize,
}
