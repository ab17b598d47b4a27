//! # Core Type Definitions
//!
//! This module contains the fundamental types used throughout the realm core.
//! These types provide the building blocks for world representation, entity
//! identity and spatial organization.
//!
//! ## Key Types
//!
//! - [`EntityId`] - Unique identifier for every object placed in a shard
//! - [`MapId`] - Identifier of a shard (map) template
//! - [`Vec3`] / [`Position`] - 3D coordinates, with orientation for placed objects
//! - [`Phase`] - Visibility mask that lets parallel realities share one partition
//! - [`UpdatePriority`] - Throttling tier for per-object updates
//! - [`RegionBounds`] - Spatial boundaries of a shard

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Identity
// ============================================================================

/// Unique identifier for an object placed in a shard.
///
/// A wrapper around UUID so entity ids cannot be confused with map ids,
/// pool ids or the 16-bit map slots used for protocol-level addressing.
///
/// # Examples
///
/// ```rust
/// use realm_core::EntityId;
///
/// let id = EntityId::new();
/// let parsed: EntityId = id.to_string().parse()?;
/// assert_eq!(id, parsed);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub Uuid);

impl EntityId {
    /// Creates a new random entity ID using UUID v4.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::str::FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a map template. Several shards may share a map id when
/// instances are created on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MapId(pub u32);

impl std::fmt::Display for MapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "map#{}", self.0)
    }
}

// ============================================================================
// Geometry
// ============================================================================

/// 3D vector with single precision components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared euclidean distance to `other`.
    pub fn distance_sq(&self, other: &Vec3) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    pub fn distance(&self, other: &Vec3) -> f32 {
        self.distance_sq(other).sqrt()
    }
}

/// Placement of an object: a point plus the facing angle in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub point: Vec3,
    #[serde(default)]
    pub orientation: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            point: Vec3::new(x, y, z),
            orientation: 0.0,
        }
    }

    pub fn with_orientation(mut self, orientation: f32) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn distance_sq(&self, other: &Vec3) -> f32 {
        self.point.distance_sq(other)
    }
}

impl From<Vec3> for Position {
    fn from(point: Vec3) -> Self {
        Self {
            point,
            orientation: 0.0,
        }
    }
}

/// Spatial bounds of a shard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBounds {
    pub min_x: f32,
    pub max_x: f32,
    pub min_y: f32,
    pub max_y: f32,
    pub min_z: f32,
    pub max_z: f32,
}

impl Default for RegionBounds {
    fn default() -> Self {
        Self {
            min_x: 0.0,
            max_x: 4096.0,
            min_y: 0.0,
            max_y: 4096.0,
            min_z: -512.0,
            max_z: 512.0,
        }
    }
}

impl RegionBounds {
    /// Whether `point` lies inside the bounds, faces included.
    pub fn contains(&self, point: &Vec3) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
            && point.z >= self.min_z
            && point.z <= self.max_z
    }
}

// ============================================================================
// Visibility & classification
// ============================================================================

/// Phase mask. Two objects can see each other when their masks intersect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Phase(pub u32);

impl Phase {
    pub const DEFAULT: Phase = Phase(1);
    pub const ALL: Phase = Phase(u32::MAX);

    #[inline]
    pub fn overlaps(self, other: Phase) -> bool {
        self.0 & other.0 != 0
    }
}

impl Default for Phase {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Closed set of object kinds placed in a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Character,
    Npc,
    GameObject,
}

impl ObjectType {
    const fn bit(self) -> u8 {
        match self {
            ObjectType::Character => 0b001,
            ObjectType::Npc => 0b010,
            ObjectType::GameObject => 0b100,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ObjectType::Character => "character",
            ObjectType::Npc => "npc",
            ObjectType::GameObject => "game object",
        })
    }
}

/// Filter over [`ObjectType`]s used by area queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectTypeMask(u8);

impl ObjectTypeMask {
    pub const NONE: ObjectTypeMask = ObjectTypeMask(0);
    pub const ALL: ObjectTypeMask = ObjectTypeMask(0b111);
    pub const CHARACTERS: ObjectTypeMask = ObjectTypeMask(ObjectType::Character.bit());
    pub const NPCS: ObjectTypeMask = ObjectTypeMask(ObjectType::Npc.bit());
    pub const GAME_OBJECTS: ObjectTypeMask = ObjectTypeMask(ObjectType::GameObject.bit());
    pub const UNITS: ObjectTypeMask =
        ObjectTypeMask(ObjectType::Character.bit() | ObjectType::Npc.bit());

    #[inline]
    pub fn contains(self, kind: ObjectType) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn with(self, kind: ObjectType) -> Self {
        Self(self.0 | kind.bit())
    }
}

impl Default for ObjectTypeMask {
    fn default() -> Self {
        Self::ALL
    }
}

impl From<ObjectType> for ObjectTypeMask {
    fn from(kind: ObjectType) -> Self {
        Self(kind.bit())
    }
}

/// Throttling tier for per-object updates. Each tier maps to a minimum
/// number of milliseconds between two updates of the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UpdatePriority {
    Inactive,
    Background,
    VeryLow,
    Low,
    Active,
    High,
}

impl UpdatePriority {
    pub const ALL: [UpdatePriority; 6] = [
        UpdatePriority::Inactive,
        UpdatePriority::Background,
        UpdatePriority::VeryLow,
        UpdatePriority::Low,
        UpdatePriority::Active,
        UpdatePriority::High,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl Default for UpdatePriority {
    fn default() -> Self {
        UpdatePriority::Active
    }
}

/// Client locale, used to keep per-locale character lists for localized broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Locale {
    #[default]
    English,
    Arabic,
    Russian,
    German,
    French,
}

/// Faction side of a player character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FactionGroup {
    #[default]
    Alliance,
    Horde,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_masks_intersect() {
        assert!(Phase(0b011).overlaps(Phase(0b010)));
        assert!(!Phase(0b001).overlaps(Phase(0b010)));
        assert!(Phase::ALL.overlaps(Phase::DEFAULT));
    }

    #[test]
    fn type_mask_filters_kinds() {
        assert!(ObjectTypeMask::UNITS.contains(ObjectType::Npc));
        assert!(ObjectTypeMask::UNITS.contains(ObjectType::Character));
        assert!(!ObjectTypeMask::UNITS.contains(ObjectType::GameObject));
        assert!(ObjectTypeMask::NONE.with(ObjectType::GameObject).contains(ObjectType::GameObject));
    }

    #[test]
    fn priorities_index_in_declaration_order() {
        for (i, priority) in UpdatePriority::ALL.iter().enumerate() {
            assert_eq!(priority.index(), i);
        }
    }
}
