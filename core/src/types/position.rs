use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_TILE, MIN_TILE};

/// A tile coordinate within one map. Coordinates are 1-based.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub struct Position {
    pub x: u16,
    pub y: u16,
}

impl Position {
    /// Build a position, rejecting the zero coordinate on either axis.
    pub fn new(x: u16, y: u16) -> Option<Self> {
        if x < MIN_TILE || y < MIN_TILE {
            return None;
        }
        Some(Self { x, y })
    }

    /// Whether the position lies inside the fixed movement bounds
    /// `[MIN_TILE, MAX_TILE]` on both axes.
    pub fn in_bounds(&self) -> bool {
        (MIN_TILE..=MAX_TILE).contains(&self.x) && (MIN_TILE..=MAX_TILE).contains(&self.y)
    }

    /// Chebyshev distance; two tiles touching diagonally are 1 apart.
    pub fn distance(&self, other: Position) -> u16 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// The neighbouring tile in `heading`, or `None` when that would leave
    /// the coordinate space.
    pub fn step(&self, heading: Heading) -> Option<Position> {
        let (dx, dy) = heading.delta();
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        Position::new(x, y)
    }

    /// Heading that moves one step from `self` toward `target`, preferring
    /// the axis with the larger gap. `None` when already there.
    pub fn heading_to(&self, target: Position) -> Option<Heading> {
        let dx = target.x as i32 - self.x as i32;
        let dy = target.y as i32 - self.y as i32;
        if dx == 0 && dy == 0 {
            return None;
        }
        if dx.abs() >= dy.abs() {
            Some(if dx > 0 { Heading::East } else { Heading::West })
        } else {
            Some(if dy > 0 { Heading::South } else { Heading::North })
        }
    }
}

/// Fully qualified tile address: map id plus position.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Encode, Decode,
)]
pub struct TileKey {
    pub map: u16,
    pub x: u16,
    pub y: u16,
}

impl TileKey {
    pub fn new(map: u16, x: u16, y: u16) -> Self {
        Self { map, x, y }
    }

    pub fn at(map: u16, position: Position) -> Self {
        Self {
            map,
            x: position.x,
            y: position.y,
        }
    }

    pub fn position(&self) -> Position {
        Position {
            x: self.x,
            y: self.y,
        }
    }
}

/// Facing direction. Wire values follow the client's numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
#[repr(u8)]
pub enum Heading {
    North = 1,
    East = 2,
    South = 3,
    West = 4,
}

impl Heading {
    pub const ALL: [Heading; 4] = [Heading::North, Heading::East, Heading::South, Heading::West];

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Heading::North),
            2 => Some(Heading::East),
            3 => Some(Heading::South),
            4 => Some(Heading::West),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Tile offset for one step; north is toward smaller `y`.
    pub fn delta(self) -> (i16, i16) {
        match self {
            Heading::North => (0, -1),
            Heading::East => (1, 0),
            Heading::South => (0, 1),
            Heading::West => (-1, 0),
        }
    }
}
