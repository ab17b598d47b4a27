//! Identity-keyed object storage with derived indices.
use super::{next_unique_world_id, EntityKind, WorldObject};
use crate::error::ShardError;
use crate::types::{EntityId, FactionGroup, Locale};
use std::collections::{HashMap, HashSet, VecDeque};

/// Number of 16-bit map slots a shard can hand out.
pub const MAP_SLOT_CAPACITY: usize = 65_535;

/// Allocator for the reusable 16-bit map slots.
///
/// Fresh slots are handed out in ascending order first; released slots are
/// reused in release order once every fresh slot has been used. Both paths
/// are O(1). When every slot is in use allocation fails.
#[derive(Debug, Default)]
pub struct SlotAllocator {
    next_fresh: u32,
    released: VecDeque<u16>,
    in_use: usize,
}

impl SlotAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Option<u16> {
        let slot = if (self.next_fresh as usize) < MAP_SLOT_CAPACITY {
            let slot = self.next_fresh as u16;
            self.next_fresh += 1;
            slot
        } else {
            self.released.pop_front()?
        };
        self.in_use += 1;
        Some(slot)
    }

    pub fn release(&mut self, slot: u16) {
        self.released.push_back(slot);
        self.in_use = self.in_use.saturating_sub(1);
    }

    pub fn in_use(&self) -> usize {
        self.in_use
    }
}

/// Primary object map plus the side indices kept in lock-step with it.
#[derive(Debug, Default)]
pub struct EntityTable {
    objects: HashMap<EntityId, WorldObject>,
    characters: HashSet<EntityId>,
    by_locale: HashMap<Locale, HashSet<EntityId>>,
    spirit_healers: HashSet<EntityId>,
    alliance_players: usize,
    horde_players: usize,
    by_slot: HashMap<u16, EntityId>,
    slots: SlotAllocator,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an object, assigning its unique id and, for NPCs and game
    /// objects, a map slot. Nothing is modified on failure.
    pub(crate) fn insert(&mut self, mut object: WorldObject) -> Result<&mut WorldObject, ShardError> {
        let id = object.id();
        if self.objects.contains_key(&id) {
            return Err(ShardError::DuplicateObject(id));
        }

        let slot = match object.kind {
            EntityKind::Character(_) => None,
            EntityKind::Npc(_) | EntityKind::GameObject(_) => Some(
                self.slots
                    .allocate()
                    .ok_or(ShardError::SlotsExhausted(self.slots.in_use()))?,
            ),
        };

        object.unique_id = Some(next_unique_world_id());
        object.map_slot = slot;
        if let Some(slot) = slot {
            self.by_slot.insert(slot, id);
        }

        match &object.kind {
            EntityKind::Character(character) => {
                self.characters.insert(id);
                self.by_locale.entry(character.locale).or_default().insert(id);
                match character.faction {
                    FactionGroup::Alliance => self.alliance_players += 1,
                    FactionGroup::Horde => self.horde_players += 1,
                }
            }
            EntityKind::Npc(npc) if npc.template.spirit_healer => {
                self.spirit_healers.insert(id);
            }
            _ => {}
        }

        Ok(self.objects.entry(id).or_insert(object))
    }

    /// Removes an object, releasing its map slot and index entries.
    pub fn remove(&mut self, id: &EntityId) -> Option<WorldObject> {
        let mut object = self.objects.remove(id)?;

        if let Some(slot) = object.map_slot.take() {
            self.by_slot.remove(&slot);
            self.slots.release(slot);
        }

        match &object.kind {
            EntityKind::Character(character) => {
                self.characters.remove(id);
                if let Some(set) = self.by_locale.get_mut(&character.locale) {
                    set.remove(id);
                    if set.is_empty() {
                        self.by_locale.remove(&character.locale);
                    }
                }
                match character.faction {
                    FactionGroup::Alliance => {
                        self.alliance_players = self.alliance_players.saturating_sub(1)
                    }
                    FactionGroup::Horde => self.horde_players = self.horde_players.saturating_sub(1),
                }
            }
            EntityKind::Npc(_) => {
                self.spirit_healers.remove(id);
            }
            EntityKind::GameObject(_) => {}
        }
        Some(object)
    }

    pub fn get(&self, id: &EntityId) -> Option<&WorldObject> {
        self.objects.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &EntityId) -> Option<&mut WorldObject> {
        self.objects.get_mut(id)
    }

    /// Moves a character to another faction, keeping the head counts right.
    ///
    /// # Returns
    ///
    /// False when `id` is not a stored character.
    pub(crate) fn set_character_faction(&mut self, id: &EntityId, faction: FactionGroup) -> bool {
        let Some(EntityKind::Character(character)) = self.objects.get_mut(id).map(|o| &mut o.kind) else {
            return false;
        };
        if character.faction == faction {
            return true;
        }
        match character.faction {
            FactionGroup::Alliance => self.alliance_players = self.alliance_players.saturating_sub(1),
            FactionGroup::Horde => self.horde_players = self.horde_players.saturating_sub(1),
        }
        match faction {
            FactionGroup::Alliance => self.alliance_players += 1,
            FactionGroup::Horde => self.horde_players += 1,
        }
        character.faction = faction;
        true
    }

    /// Moves a character to another locale bucket.
    ///
    /// # Returns
    ///
    /// False when `id` is not a stored character.
    pub(crate) fn set_character_locale(&mut self, id: &EntityId, locale: Locale) -> bool {
        let Some(EntityKind::Character(character)) = self.objects.get_mut(id).map(|o| &mut o.kind) else {
            return false;
        };
        let previous = std::mem::replace(&mut character.locale, locale);
        if previous == locale {
            return true;
        }
        if let Some(set) = self.by_locale.get_mut(&previous) {
            set.remove(id);
            if set.is_empty() {
                self.by_locale.remove(&previous);
            }
        }
        self.by_locale.entry(locale).or_default().insert(*id);
        true
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.objects.contains_key(id)
    }

    pub fn by_map_slot(&self, slot: u16) -> Option<&WorldObject> {
        self.by_slot.get(&slot).and_then(|id| self.objects.get(id))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.objects.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WorldObject> {
        self.objects.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut WorldObject> {
        self.objects.values_mut()
    }

    pub fn character_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.characters.iter()
    }

    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    pub fn characters_by_locale(&self, locale: Locale) -> impl Iterator<Item = &EntityId> {
        self.by_locale.get(&locale).into_iter().flatten()
    }

    pub fn spirit_healer_ids(&self) -> impl Iterator<Item = &EntityId> {
        self.spirit_healers.iter()
    }

    pub fn alliance_players(&self) -> usize {
        self.alliance_players
    }

    pub fn horde_players(&self) -> usize {
        self.horde_players
    }

    pub fn slots_in_use(&self) -> usize {
        self.slots.in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CharacterInfo, Session};
    use crate::error::SessionError;
    use crate::spawn::NpcTemplate;
    use crate::types::Position;
    use std::sync::Arc;

    #[derive(Debug)]
    struct NullSession;

    impl Session for NullSession {
        fn send(&self, _packet: &[u8]) -> Result<(), SessionError> {
            Ok(())
        }
        fn kick(&self, _reason: &str) {}
    }

    #[test]
    fn released_slots_are_reused_after_fresh_ones_in_release_order() {
        let mut slots = SlotAllocator::new();
        let a = slots.allocate().unwrap();
        let b = slots.allocate().unwrap();
        assert_eq!((a, b), (0, 1));
        slots.release(b);
        slots.release(a);
        assert_eq!(slots.allocate(), Some(2));

        let mut full = SlotAllocator::new();
        for _ in 0..MAP_SLOT_CAPACITY {
            assert!(full.allocate().is_some());
        }
        assert_eq!(full.allocate(), None);
        full.release(40);
        full.release(7);
        assert_eq!(full.allocate(), Some(40));
        assert_eq!(full.allocate(), Some(7));
        assert_eq!(full.allocate(), None);
    }

    #[test]
    fn indices_follow_insert_and_remove() {
        let mut table = EntityTable::new();
        let chr = WorldObject::character(
            CharacterInfo::new("Ayla")
                .with_locale(Locale::Arabic)
                .with_faction(FactionGroup::Horde),
            Arc::new(NullSession),
            Position::new(0.0, 0.0, 0.0),
        );
        let chr_id = chr.id();
        let mut healer_template = NpcTemplate::new(6491, "Spirit Healer");
        healer_template.spirit_healer = true;
        let healer = WorldObject::npc(Arc::new(healer_template), Position::new(1.0, 1.0, 0.0));
        let healer_id = healer.id();

        let inserted = table.insert(chr).unwrap();
        assert!(inserted.map_slot().is_none());
        assert!(inserted.unique_id().is_some());
        let slot = table.insert(healer).unwrap().map_slot().unwrap();

        assert_eq!(table.character_count(), 1);
        assert_eq!(table.horde_players(), 1);
        assert_eq!(table.characters_by_locale(Locale::Arabic).count(), 1);
        assert_eq!(table.spirit_healer_ids().count(), 1);
        assert_eq!(table.by_map_slot(slot).map(|o| o.id()), Some(healer_id));

        table.remove(&chr_id).unwrap();
        table.remove(&healer_id).unwrap();
        assert_eq!(table.horde_players(), 0);
        assert_eq!(table.characters_by_locale(Locale::Arabic).count(), 0);
        assert_eq!(table.spirit_healer_ids().count(), 0);
        assert!(table.by_map_slot(slot).is_none());
        assert_eq!(table.slots_in_use(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn duplicate_insert_leaves_table_untouched() {
        let mut table = EntityTable::new();
        let template = Arc::new(NpcTemplate::new(1, "Boar"));
        let npc = WorldObject::npc(template.clone(), Position::new(0.0, 0.0, 0.0));
        let id = npc.id();
        table.insert(npc).unwrap();

        let mut twin = WorldObject::npc(template, Position::new(0.0, 0.0, 0.0));
        twin.id = id;
        assert_eq!(table.insert(twin).unwrap_err(), ShardError::DuplicateObject(id));
        assert_eq!(table.len(), 1);
        assert_eq!(table.slots_in_use(), 1);
    }
}
