//! Which living entity stands on which tile of one map.

use std::collections::HashMap;

use realm_core::types::{Occupant, Position};

/// Tile → occupant for a single map. At most one occupant per tile; an
/// absent entry means no player or NPC stands there.
#[derive(Debug, Default, Clone)]
pub struct OccupationTable {
    tiles: HashMap<Position, Occupant>,
}

impl OccupationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, position: Position) -> Option<Occupant> {
        self.tiles.get(&position).copied()
    }

    pub fn is_occupied(&self, position: Position) -> bool {
        self.tiles.contains_key(&position)
    }

    /// Move `occupant` from `old` (if it is still recorded there) to `new`.
    ///
    /// The destination is written unconditionally; callers check it first.
    pub fn relocate(&mut self, occupant: Occupant, old: Option<Position>, new: Position) {
        if let Some(old) = old {
            self.vacate(old, occupant);
        }
        self.tiles.insert(new, occupant);
    }

    /// Remove `occupant` from `position`. Leaves the tile alone if someone
    /// else is recorded there.
    pub fn vacate(&mut self, position: Position, occupant: Occupant) -> bool {
        if self.tiles.get(&position) == Some(&occupant) {
            self.tiles.remove(&position);
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Position, Occupant)> + '_ {
        self.tiles.iter().map(|(p, o)| (*p, *o))
    }
}
