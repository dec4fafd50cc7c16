//! Value types shared across the server: tile addressing, items and
//! occupants.

mod item;
mod occupant;
mod position;

pub use item::{GroundItem, ItemStack};
pub use occupant::{Occupant, OccupantParseError};
pub use position::{Heading, Position, TileKey};
