//! Items lying on the ground of one map.

use std::collections::{BTreeMap, HashMap};

use realm_core::types::{GroundItem, Position};

/// Everything on the ground of one map, in a stable order for persistence.
pub type GroundItemSnapshot = BTreeMap<Position, Vec<GroundItem>>;

/// The tile already holds the maximum number of items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("tile ({x}, {y}) already holds {limit} items")]
pub struct TileFull {
    pub x: u16,
    pub y: u16,
    pub limit: usize,
}

/// Tile → bounded item list. No tile ever maps to an empty list.
///
/// Items taken with [`GroundItemIndex::hold`] keep their place under the
/// cap until they are restored or released, so a caller that has to give
/// an item back can always do so.
#[derive(Debug, Clone)]
pub struct GroundItemIndex {
    tiles: HashMap<Position, Vec<GroundItem>>,
    held: HashMap<Position, usize>,
    max_items_per_tile: usize,
}

impl GroundItemIndex {
    pub fn new(max_items_per_tile: usize) -> Self {
        Self {
            tiles: HashMap::new(),
            held: HashMap::new(),
            max_items_per_tile,
        }
    }

    pub fn max_items_per_tile(&self) -> usize {
        self.max_items_per_tile
    }

    /// Append `item` to the tile, refusing once the tile is full.
    pub fn add(&mut self, position: Position, item: GroundItem) -> Result<(), TileFull> {
        let held = self.held_at(position);
        let list = self.tiles.entry(position).or_default();
        if list.len() + held >= self.max_items_per_tile {
            if list.is_empty() {
                // Zero cap, or every slot is held.
                self.tiles.remove(&position);
            }
            return Err(TileFull {
                x: position.x,
                y: position.y,
                limit: self.max_items_per_tile,
            });
        }
        list.push(item);
        Ok(())
    }

    /// Remove the item at `index`; the tile's key goes away with its last
    /// item.
    pub fn remove(&mut self, position: Position, index: usize) -> Option<GroundItem> {
        let list = self.tiles.get_mut(&position)?;
        if index >= list.len() {
            return None;
        }
        let item = list.remove(index);
        if list.is_empty() {
            self.tiles.remove(&position);
        }
        Some(item)
    }

    /// Remove the item at `index` but keep its slot reserved.
    pub fn hold(&mut self, position: Position, index: usize) -> Option<GroundItem> {
        let item = self.remove(position, index)?;
        *self.held.entry(position).or_default() += 1;
        Some(item)
    }

    /// Put a held item back on top of its tile. Never refused.
    pub fn restore(&mut self, position: Position, item: GroundItem) {
        self.release(position);
        self.tiles.entry(position).or_default().insert(0, item);
    }

    /// Give up a held slot once its item has gone elsewhere.
    pub fn release(&mut self, position: Position) {
        if let Some(count) = self.held.get_mut(&position) {
            *count -= 1;
            if *count == 0 {
                self.held.remove(&position);
            }
        }
    }

    fn held_at(&self, position: Position) -> usize {
        self.held.get(&position).copied().unwrap_or(0)
    }

    pub fn get(&self, position: Position) -> &[GroundItem] {
        self.tiles.get(&position).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of tiles holding at least one item.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Number of items across all tiles.
    pub fn item_count(&self) -> usize {
        self.tiles.values().map(Vec::len).sum()
    }

    /// Drop every item; returns how many tiles were cleared.
    pub fn clear(&mut self) -> usize {
        let cleared = self.tiles.len();
        self.tiles.clear();
        cleared
    }

    pub fn snapshot(&self) -> GroundItemSnapshot {
        self.tiles
            .iter()
            .map(|(pos, items)| (*pos, items.clone()))
            .collect()
    }

    /// Replace the contents with `snapshot`. Empty lists are skipped and
    /// lists longer than the cap are truncated.
    pub fn replace_all(&mut self, snapshot: GroundItemSnapshot) -> usize {
        self.tiles.clear();
        for (position, mut items) in snapshot {
            if items.is_empty() {
                continue;
            }
            let room = self
                .max_items_per_tile
                .saturating_sub(self.held_at(position));
            if items.len() > room {
                log::warn!(
                    "Ground tile ({}, {}) loaded with {} items; keeping {}",
                    position.x,
                    position.y,
                    items.len(),
                    room
                );
                items.truncate(room);
            }
            if !items.is_empty() {
                self.tiles.insert(position, items);
            }
        }
        self.tiles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_core::types::ItemStack;

    fn item(id: u16) -> GroundItem {
        GroundItem::new(ItemStack::new(id, 1).unwrap(), 100 + id as u32)
    }

    fn pos(x: u16, y: u16) -> Position {
        Position { x, y }
    }

    /// With a cap of two the third item is rejected and the first two stay.
    #[test]
    fn cap_rejects_excess() {
        let mut index = GroundItemIndex::new(2);
        assert!(index.add(pos(5, 5), item(1)).is_ok());
        assert!(index.add(pos(5, 5), item(2)).is_ok());
        let err = index.add(pos(5, 5), item(3)).unwrap_err();
        assert_eq!(err.limit, 2);
        assert_eq!(index.get(pos(5, 5)), &[item(1), item(2)]);
    }

    #[test]
    fn remove_out_of_range_is_none() {
        let mut index = GroundItemIndex::new(4);
        assert_eq!(index.remove(pos(1, 1), 0), None);
        index.add(pos(1, 1), item(1)).unwrap();
        assert_eq!(index.remove(pos(1, 1), 3), None);
        assert_eq!(index.item_count(), 1);
    }

    /// Taking the last item deletes the tile key.
    #[test]
    fn removing_last_item_drops_key() {
        let mut index = GroundItemIndex::new(4);
        index.add(pos(2, 2), item(9)).unwrap();
        assert_eq!(index.tile_count(), 1);
        assert_eq!(index.remove(pos(2, 2), 0), Some(item(9)));
        assert_eq!(index.tile_count(), 0);
        assert!(index.get(pos(2, 2)).is_empty());
    }

    #[test]
    fn clear_reports_tiles() {
        let mut index = GroundItemIndex::new(4);
        index.add(pos(1, 1), item(1)).unwrap();
        index.add(pos(1, 1), item(2)).unwrap();
        index.add(pos(3, 1), item(3)).unwrap();
        assert_eq!(index.clear(), 2);
        assert_eq!(index.item_count(), 0);
    }

    /// A zero cap refuses everything without leaving an empty entry.
    #[test]
    fn zero_cap_leaves_no_empty_entry() {
        let mut index = GroundItemIndex::new(0);
        assert!(index.add(pos(1, 1), item(1)).is_err());
        assert_eq!(index.tile_count(), 0);
    }

    #[test]
    fn replace_all_truncates_and_skips_empty() {
        let mut index = GroundItemIndex::new(2);
        let mut snapshot = GroundItemSnapshot::new();
        snapshot.insert(pos(1, 1), vec![item(1), item(2), item(3)]);
        snapshot.insert(pos(2, 2), vec![]);
        assert_eq!(index.replace_all(snapshot), 1);
        assert_eq!(index.get(pos(1, 1)).len(), 2);
        assert_eq!(index.snapshot().len(), 1);
    }

    /// A held item keeps its slot, so it can go back even after the tile
    /// filled up behind it.
    #[test]
    fn held_slot_survives_a_full_tile() {
        let mut index = GroundItemIndex::new(2);
        index.add(pos(4, 4), item(1)).unwrap();
        index.add(pos(4, 4), item(2)).unwrap();

        assert_eq!(index.hold(pos(4, 4), 0), Some(item(1)));
        assert!(index.add(pos(4, 4), item(3)).is_err());
        assert_eq!(index.get(pos(4, 4)), &[item(2)]);

        index.restore(pos(4, 4), item(1));
        assert_eq!(index.get(pos(4, 4)), &[item(1), item(2)]);
        assert!(index.add(pos(4, 4), item(3)).is_err());
    }

    /// Releasing a held slot frees it for new items.
    #[test]
    fn release_frees_the_slot() {
        let mut index = GroundItemIndex::new(1);
        index.add(pos(6, 6), item(1)).unwrap();
        assert_eq!(index.hold(pos(6, 6), 0), Some(item(1)));
        assert_eq!(index.tile_count(), 0);
        assert!(index.add(pos(6, 6), item(2)).is_err());

        index.release(pos(6, 6));
        assert!(index.add(pos(6, 6), item(2)).is_ok());
    }
}
