//! Shard-local loot placement grid.
//!
//! Dropped items occupy cells of a fixed 500×500 grid laid over the shard
//! bounds. Items dropped together are spread over free cells spiralling out
//! from the drop point.

use crate::types::{EntityId, RegionBounds, Vec3};
use serde::Serialize;

/// Cells per grid edge.
pub const LOOT_GRID_SIZE: u16 = 500;

/// Furthest ring searched for free cells around a drop point.
pub const MAX_LOOT_OFFSET: i32 = 10;

/// Grid coordinates of a loot cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LootSlot {
    pub x: u16,
    pub y: u16,
}

/// An item lying on the ground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LootItem {
    pub item_id: u32,
    /// Only this character may pick the item up; `None` means anyone
    pub owner: Option<EntityId>,
    pub dropped_at_ms: u64,
}

/// Fixed-size loot grid.
#[derive(Debug)]
pub struct LootGrid {
    cells: Vec<Option<LootItem>>,
    occupied: usize,
}

impl Default for LootGrid {
    fn default() -> Self {
        Self::new()
    }
}

impl LootGrid {
    pub fn new() -> Self {
        let edge = LOOT_GRID_SIZE as usize;
        Self {
            cells: vec![None; edge * edge],
            occupied: 0,
        }
    }

    /// Cell index of `slot`, or `None` when it lies outside the grid.
    fn index(slot: LootSlot) -> Option<usize> {
        if slot.x >= LOOT_GRID_SIZE || slot.y >= LOOT_GRID_SIZE {
            return None;
        }
        Some(slot.y as usize * LOOT_GRID_SIZE as usize + slot.x as usize)
    }

    pub fn contains(slot: LootSlot) -> bool {
        Self::index(slot).is_some()
    }

    fn slot_at(x: i32, y: i32) -> Option<LootSlot> {
        let edge = i32::from(LOOT_GRID_SIZE);
        if (0..edge).contains(&x) && (0..edge).contains(&y) {
            Some(LootSlot {
                x: x as u16,
                y: y as u16,
            })
        } else {
            None
        }
    }

    /// Maps a world point onto the grid cell covering it.
    pub fn cell_of(point: &Vec3, bounds: &RegionBounds) -> Option<LootSlot> {
        let width = bounds.max_x - bounds.min_x;
        let height = bounds.max_y - bounds.min_y;
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        let fx = (point.x - bounds.min_x) / width;
        let fy = (point.y - bounds.min_y) / height;
        if !(0.0..=1.0).contains(&fx) || !(0.0..=1.0).contains(&fy) {
            return None;
        }
        let last = i32::from(LOOT_GRID_SIZE) - 1;
        let edge = f32::from(LOOT_GRID_SIZE);
        let x = ((fx * edge) as i32).min(last);
        let y = ((fy * edge) as i32).min(last);
        Self::slot_at(x, y)
    }

    pub fn get(&self, slot: LootSlot) -> Option<&LootItem> {
        Self::index(slot)
            .and_then(|index| self.cells.get(index))
            .and_then(|cell| cell.as_ref())
    }

    /// Whether `slot` is inside the grid and empty.
    pub fn is_free(&self, slot: LootSlot) -> bool {
        Self::contains(slot) && self.get(slot).is_none()
    }

    pub fn occupied(&self) -> usize {
        self.occupied
    }

    /// Finds `count` free cells around `origin`.
    ///
    /// The origin is tried first, then rings at increasing offsets up to
    /// [`MAX_LOOT_OFFSET`]. Cells outside the grid are skipped.
    ///
    /// # Returns
    ///
    /// `None` when `origin` is outside the grid or fewer than `count` free
    /// cells exist in range.
    pub fn find_free_slots(&self, count: usize, origin: LootSlot) -> Option<Vec<LootSlot>> {
        if !Self::contains(origin) {
            return None;
        }
        let mut found = Vec::with_capacity(count);
        if count == 0 {
            return Some(found);
        }
        if self.is_free(origin) {
            found.push(origin);
        }
        let (ox, oy) = (i32::from(origin.x), i32::from(origin.y));
        let mut offset = 1;
        while found.len() < count && offset <= MAX_LOOT_OFFSET {
            let ring = [
                (ox + offset, oy),
                (ox - offset, oy),
                (ox + offset, oy + offset),
                (ox - offset, oy + offset),
                (ox + offset, oy - offset),
                (ox - offset, oy - offset),
                (ox, oy + offset),
                (ox, oy - offset),
            ];
            for (x, y) in ring {
                if found.len() == count {
                    break;
                }
                if let Some(slot) = Self::slot_at(x, y) {
                    if self.is_free(slot) {
                        found.push(slot);
                    }
                }
            }
            offset += 1;
        }
        (found.len() == count).then_some(found)
    }

    /// Drops `items` around `origin`, all-or-nothing.
    pub fn drop_items(
        &mut self,
        origin: LootSlot,
        items: &[u32],
        owner: Option<EntityId>,
        now_ms: u64,
    ) -> Option<Vec<LootSlot>> {
        let slots = self.find_free_slots(items.len(), origin)?;
        for (slot, &item_id) in slots.iter().zip(items) {
            let Some(cell) = Self::index(*slot).and_then(|index| self.cells.get_mut(index)) else {
                continue;
            };
            *cell = Some(LootItem {
                item_id,
                owner,
                dropped_at_ms: now_ms,
            });
            self.occupied += 1;
        }
        Some(slots)
    }

    /// Takes the item at `slot` if `picker` may have it.
    pub fn try_pick_up(&mut self, slot: LootSlot, picker: EntityId) -> Option<LootItem> {
        let cell = self.cells.get_mut(Self::index(slot)?)?;
        let allowed = cell
            .as_ref()
            .is_some_and(|item| item.owner.map_or(true, |owner| owner == picker));
        if !allowed {
            return None;
        }
        self.occupied -= 1;
        cell.take()
    }

    /// Empties a cell regardless of ownership.
    pub fn clear_slot(&mut self, slot: LootSlot) -> Option<LootItem> {
        let item = self.cells.get_mut(Self::index(slot)?)?.take();
        if item.is_some() {
            self.occupied -= 1;
        }
        item
    }

    /// Removes items dropped before `cutoff_ms`, returning how many were cleared.
    pub fn clear_older_than(&mut self, cutoff_ms: u64) -> usize {
        let mut cleared = 0;
        for cell in &mut self.cells {
            if cell.as_ref().is_some_and(|item| item.dropped_at_ms < cutoff_ms) {
                *cell = None;
                cleared += 1;
            }
        }
        self.occupied -= cleared;
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spirals_out_from_occupied_origin() {
        let mut grid = LootGrid::new();
        let origin = LootSlot { x: 100, y: 100 };
        grid.drop_items(origin, &[1], None, 0).unwrap();

        let slots = grid.find_free_slots(3, origin).unwrap();
        assert_eq!(
            slots,
            vec![
                LootSlot { x: 101, y: 100 },
                LootSlot { x: 99, y: 100 },
                LootSlot { x: 101, y: 101 },
            ]
        );
    }

    #[test]
    fn corner_drops_skip_cells_outside_the_grid() {
        let grid = LootGrid::new();
        let slots = grid.find_free_slots(4, LootSlot { x: 0, y: 0 }).unwrap();
        assert_eq!(slots[0], LootSlot { x: 0, y: 0 });
        assert_eq!(slots[1], LootSlot { x: 1, y: 0 });
        assert_eq!(slots[2], LootSlot { x: 1, y: 1 });
        assert_eq!(slots[3], LootSlot { x: 0, y: 1 });
    }

    #[test]
    fn full_neighbourhood_fails_without_partial_drop() {
        let mut grid = LootGrid::new();
        let origin = LootSlot { x: 250, y: 250 };
        // Origin plus eight directions for ten rings.
        let capacity = 1 + 8 * MAX_LOOT_OFFSET as usize;
        assert!(grid.drop_items(origin, &vec![5; capacity], None, 0).is_some());
        assert!(grid.drop_items(origin, &[6], None, 0).is_none());
        assert_eq!(grid.occupied(), capacity);
    }

    #[test]
    fn owned_items_are_reserved() {
        let mut grid = LootGrid::new();
        let owner = EntityId::new();
        let stranger = EntityId::new();
        let slots = grid.drop_items(LootSlot { x: 3, y: 3 }, &[77], Some(owner), 0).unwrap();
        assert!(grid.try_pick_up(slots[0], stranger).is_none());
        assert_eq!(grid.try_pick_up(slots[0], owner).map(|i| i.item_id), Some(77));
        assert!(grid.clear_slot(slots[0]).is_none());
        assert_eq!(grid.occupied(), 0);
    }

    #[test]
    fn world_points_map_onto_cells() {
        let bounds = RegionBounds {
            min_x: 0.0,
            max_x: 1000.0,
            min_y: 0.0,
            max_y: 1000.0,
            min_z: 0.0,
            max_z: 0.0,
        };
        assert_eq!(
            LootGrid::cell_of(&Vec3::new(1000.0, 0.0, 0.0), &bounds),
            Some(LootSlot { x: 499, y: 0 })
        );
        assert_eq!(
            LootGrid::cell_of(&Vec3::new(10.0, 10.0, 0.0), &bounds),
            Some(LootSlot { x: 5, y: 5 })
        );
        assert!(LootGrid::cell_of(&Vec3::new(-1.0, 10.0, 0.0), &bounds).is_none());
    }

    #[test]
    fn out_of_grid_slots_never_alias_other_cells() {
        let mut grid = LootGrid::new();
        let picker = EntityId::new();
        grid.drop_items(LootSlot { x: 100, y: 1 }, &[42], None, 0).unwrap();

        // x = 600 on row 0 would land on (100, 1) if rows wrapped.
        let outside = LootSlot { x: 600, y: 0 };
        assert!(!LootGrid::contains(outside));
        assert!(grid.get(outside).is_none());
        assert!(!grid.is_free(outside));
        assert!(grid.try_pick_up(outside, picker).is_none());
        assert!(grid.clear_slot(outside).is_none());
        assert!(grid.try_pick_up(LootSlot { x: 0, y: 500 }, picker).is_none());
        assert!(grid.find_free_slots(1, outside).is_none());
        assert!(grid.drop_items(outside, &[7], None, 0).is_none());

        assert_eq!(grid.occupied(), 1);
        assert_eq!(grid.get(LootSlot { x: 100, y: 1 }).map(|i| i.item_id), Some(42));
    }

    #[test]
    fn stale_loot_is_cleared() {
        let mut grid = LootGrid::new();
        grid.drop_items(LootSlot { x: 9, y: 9 }, &[1, 2], None, 100).unwrap();
        grid.drop_items(LootSlot { x: 90, y: 90 }, &[3], None, 900).unwrap();
        assert_eq!(grid.clear_older_than(500), 2);
        assert_eq!(grid.occupied(), 1);
    }
}
