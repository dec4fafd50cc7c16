//! Constants shared by the server and anything speaking its protocol.

// =============================================================================
// World geometry
// =============================================================================

/// Standard map width in tiles. Maps may be larger; never assume smaller.
pub const MAP_WIDTH: u16 = 100;
/// Standard map height in tiles.
pub const MAP_HEIGHT: u16 = 100;

/// Smallest valid tile coordinate (coordinates are 1-based).
pub const MIN_TILE: u16 = 1;
/// Largest coordinate accepted by movement checks.
pub const MAX_TILE: u16 = 100;
/// Largest coordinate a map resource record may use. Records beyond it are
/// discarded at load time so bitmap sizes stay bounded.
pub const MAX_MAP_DIMENSION: u16 = 1024;

// =============================================================================
// Timing
// =============================================================================

/// Ticks per second the scheduler targets by default.
pub const TICKS: u32 = 20;
/// Default tick period in milliseconds.
pub const TICK_MS: u64 = 1_000 / TICKS as u64;

// =============================================================================
// Ground items
// =============================================================================

/// Default cap on items stacked on one tile.
pub const MAX_ITEMS_PER_TILE: usize = 10;

// =============================================================================
// Protocol limits
// =============================================================================

/// Largest accepted frame body (opcode + payload) in bytes.
pub const MAX_FRAME_LEN: usize = 1024;
/// Size of the little-endian frame length prefix.
pub const FRAME_HEADER_LEN: usize = 2;

// =============================================================================
// Player stats
// =============================================================================

pub const MAX_HUNGER: u16 = 100;
pub const MAX_THIRST: u16 = 100;
pub const DEFAULT_MAX_STAMINA: u16 = 100;
pub const DEFAULT_MAX_HP: u16 = 30;

/// Stamina spent on one unit of work at a resource tile.
pub const WORK_STAMINA_COST: u16 = 2;

// =============================================================================
// Players
// =============================================================================

/// Inventory slots per character.
pub const INVENTORY_SLOTS: u8 = 40;
/// Chebyshev distance within which movement is broadcast to other players.
pub const VIEW_DISTANCE: u16 = 12;
/// Outbound messages buffered per connection before new ones are dropped.
pub const OUTBOUND_QUEUE_LEN: usize = 256;
