//! Bit-per-tile spatial index.
//!
//! Each map keeps one [`TileBitmap`] per terrain category; a 100×100 map
//! costs 1,250 bytes per category regardless of how many tiles are set.

mod bitmap;
mod index;

pub use bitmap::{Coord, TileBitmap, Tiles};
pub use index::{MapBitmaps, ResourceKind, SpatialIndex};
