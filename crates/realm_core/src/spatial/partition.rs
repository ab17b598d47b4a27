/// Space partition: a pre-split quadtree over the shard bounds
use super::{PartitionStats, Shape, SpatialEntry};
use crate::error::ShardError;
use crate::types::{EntityId, ObjectType, ObjectTypeMask, Phase, RegionBounds, Vec3};
use smallvec::SmallVec;

/// Depth cap so a tiny threshold on a huge map cannot explode the tree.
const MAX_DEPTH: u32 = 8;

/// Index of a partition leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeafId(u32);

#[derive(Debug, Clone, Copy)]
struct Rect {
    min_x: f32,
    min_y: f32,
    max_x: f32,
    max_y: f32,
}

impl Rect {
    fn width(&self) -> f32 {
        self.max_x - self.min_x
    }

    fn height(&self) -> f32 {
        self.max_y - self.min_y
    }

    fn mid(&self) -> (f32, f32) {
        (
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// Children in south-west, south-east, north-west, north-east order.
    fn quarters(&self) -> [Rect; 4] {
        let (mx, my) = self.mid();
        [
            Rect { min_x: self.min_x, min_y: self.min_y, max_x: mx, max_y: my },
            Rect { min_x: mx, min_y: self.min_y, max_x: self.max_x, max_y: my },
            Rect { min_x: self.min_x, min_y: my, max_x: mx, max_y: self.max_y },
            Rect { min_x: mx, min_y: my, max_x: self.max_x, max_y: self.max_y },
        ]
    }
}

#[derive(Debug)]
enum Node {
    Branch { rect: Rect, children: [u32; 4] },
    Leaf { rect: Rect, leaf: u32 },
}

#[derive(Debug, Default)]
struct Leaf {
    entries: SmallVec<[SpatialEntry; 8]>,
    characters: u32,
}

/// Recursive spatial subdivision of one shard.
///
/// The tree shape is fixed at construction: nodes are split until both edges
/// of every leaf are at most the configured threshold. Objects are assigned to
/// the single leaf whose half-open rectangle contains their X/Y position (the
/// maximum edges of the bounds belong to the last leaf on that side).
#[derive(Debug)]
pub struct SpacePartition {
    bounds: RegionBounds,
    nodes: Vec<Node>,
    leaves: Vec<Leaf>,
    len: usize,
}

impl SpacePartition {
    /// Creates a partition over `bounds`, splitting until leaf edges are at
    /// most `threshold` long.
    pub fn new(bounds: RegionBounds, threshold: f32) -> Self {
        let mut partition = Self {
            bounds: bounds.clone(),
            nodes: Vec::new(),
            leaves: Vec::new(),
            len: 0,
        };
        let root = Rect {
            min_x: bounds.min_x,
            min_y: bounds.min_y,
            max_x: bounds.max_x,
            max_y: bounds.max_y,
        };
        partition.build(root, threshold.max(f32::EPSILON), 0);
        partition
    }

    fn build(&mut self, rect: Rect, threshold: f32, depth: u32) -> u32 {
        let index = self.nodes.len() as u32;
        if depth >= MAX_DEPTH || (rect.width() <= threshold && rect.height() <= threshold) {
            let leaf = self.leaves.len() as u32;
            self.leaves.push(Leaf::default());
            self.nodes.push(Node::Leaf { rect, leaf });
            return index;
        }
        // Placeholder so children get the following indices.
        self.nodes.push(Node::Leaf { rect, leaf: u32::MAX });
        let quarters = rect.quarters();
        let mut children = [0u32; 4];
        for (slot, quarter) in children.iter_mut().zip(quarters) {
            *slot = self.build(quarter, threshold, depth + 1);
        }
        self.nodes[index as usize] = Node::Branch { rect, children };
        index
    }

    pub fn bounds(&self) -> &RegionBounds {
        &self.bounds
    }

    /// Whether `point` is inside the partitioned volume.
    pub fn contains_point(&self, point: &Vec3) -> bool {
        self.bounds.contains(point)
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    /// Number of objects tracked.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the leaf that owns `point`, or `None` outside the bounds.
    pub fn leaf_from_point(&self, point: &Vec3) -> Option<LeafId> {
        if !self.contains_point(point) {
            return None;
        }
        let mut node = 0usize;
        loop {
            match &self.nodes[node] {
                Node::Leaf { leaf, .. } => return Some(LeafId(*leaf)),
                Node::Branch { rect, children } => {
                    let (mx, my) = rect.mid();
                    let east = (point.x >= mx) as usize;
                    let north = (point.y >= my) as usize;
                    node = children[east | (north << 1)] as usize;
                }
            }
        }
    }

    /// Inserts an object into the leaf owning its position.
    ///
    /// # Returns
    ///
    /// The leaf the object was placed in, or [`ShardError::OutOfBounds`].
    pub fn add_object(&mut self, entry: SpatialEntry) -> Result<LeafId, ShardError> {
        let leaf_id = self
            .leaf_from_point(&entry.point)
            .ok_or(ShardError::OutOfBounds(entry.point))?;
        let leaf = &mut self.leaves[leaf_id.0 as usize];
        if entry.kind == ObjectType::Character {
            leaf.characters += 1;
        }
        leaf.entries.push(entry);
        self.len += 1;
        Ok(leaf_id)
    }

    /// Removes an object from `leaf`.
    pub fn remove_object(&mut self, id: EntityId, leaf: LeafId) -> Option<SpatialEntry> {
        let leaf = self.leaves.get_mut(leaf.0 as usize)?;
        let index = leaf.entries.iter().position(|e| e.id == id)?;
        let entry = leaf.entries.swap_remove(index);
        if entry.kind == ObjectType::Character {
            leaf.characters = leaf.characters.saturating_sub(1);
        }
        self.len -= 1;
        Some(entry)
    }

    /// Moves an object to `point`, changing leaves when needed.
    ///
    /// Nothing changes when `point` is outside the bounds or the object is
    /// not in `from`.
    pub fn move_object(&mut self, id: EntityId, from: LeafId, point: Vec3) -> Result<LeafId, ShardError> {
        let target = self.leaf_from_point(&point).ok_or(ShardError::OutOfBounds(point))?;
        if target == from {
            let entry = self
                .leaves
                .get_mut(from.0 as usize)
                .and_then(|leaf| leaf.entries.iter_mut().find(|e| e.id == id))
                .ok_or(ShardError::UnknownObject(id))?;
            entry.point = point;
            return Ok(from);
        }
        let mut entry = self
            .remove_object(id, from)
            .ok_or(ShardError::UnknownObject(id))?;
        entry.point = point;
        self.add_object(entry)
    }

    /// Changes the phase recorded for an object.
    pub fn set_phase(&mut self, id: EntityId, leaf: LeafId, phase: Phase) -> bool {
        match self
            .leaves
            .get_mut(leaf.0 as usize)
            .and_then(|leaf| leaf.entries.iter_mut().find(|e| e.id == id))
        {
            Some(entry) => {
                entry.phase = phase;
                true
            }
            None => false,
        }
    }

    /// Whether `leaf` holds `id`.
    pub fn leaf_contains(&self, leaf: LeafId, id: EntityId) -> bool {
        self.leaves
            .get(leaf.0 as usize)
            .is_some_and(|leaf| leaf.entries.iter().any(|e| e.id == id))
    }

    /// A leaf is active while at least one character is inside it.
    pub fn is_leaf_active(&self, leaf: LeafId) -> bool {
        self.leaves
            .get(leaf.0 as usize)
            .is_some_and(|leaf| leaf.characters > 0)
    }

    /// Collects up to `limit` objects inside `shape` that match `filter` and
    /// are visible in `phase`.
    pub fn entities_in_area(
        &self,
        shape: &Shape,
        filter: ObjectTypeMask,
        phase: Phase,
        limit: usize,
    ) -> Vec<SpatialEntry> {
        let mut found = Vec::new();
        if limit == 0 {
            return found;
        }
        self.iterate(shape, phase, |entry| {
            if filter.contains(entry.kind) {
                found.push(*entry);
            }
            found.len() < limit
        });
        found
    }

    /// Calls `predicate` for every object inside `shape` visible in `phase`
    /// until it returns false.
    ///
    /// # Returns
    ///
    /// False when iteration was cut short by the predicate.
    pub fn iterate<F>(&self, shape: &Shape, phase: Phase, mut predicate: F) -> bool
    where
        F: FnMut(&SpatialEntry) -> bool,
    {
        let mut stack: SmallVec<[u32; 32]> = SmallVec::new();
        stack.push(0);
        while let Some(node) = stack.pop() {
            match &self.nodes[node as usize] {
                Node::Branch { rect, children } => {
                    if shape.touches_rect(rect.min_x, rect.min_y, rect.max_x, rect.max_y) {
                        stack.extend(children.iter().copied());
                    }
                }
                Node::Leaf { rect, leaf } => {
                    if !shape.touches_rect(rect.min_x, rect.min_y, rect.max_x, rect.max_y) {
                        continue;
                    }
                    for entry in &self.leaves[*leaf as usize].entries {
                        if entry.phase.overlaps(phase)
                            && shape.contains(&entry.point)
                            && !predicate(entry)
                        {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }

    /// Drops every object.
    pub fn clear(&mut self) {
        for leaf in &mut self.leaves {
            leaf.entries.clear();
            leaf.characters = 0;
        }
        self.len = 0;
    }

    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            leaves: self.leaves.len(),
            active_leaves: self.leaves.iter().filter(|l| l.characters > 0).count(),
            objects_tracked: self.len,
            max_leaf_population: self.leaves.iter().map(|l| l.entries.len()).max().unwrap_or(0),
        }
    }
}
