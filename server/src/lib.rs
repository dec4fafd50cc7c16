//! World server library.
//!
//! The `tilerealm-server` binary wires these modules together; integration
//! tests and benchmarks drive them directly.

/// Bit-per-tile terrain index.
///
/// [`spatial::TileBitmap`] stores one category of one map;
/// [`spatial::SpatialIndex`] answers blocked/water/walkable/resource queries
/// across all maps.
pub mod spatial;

/// Map source files and the JSON cache built from them.
///
/// [`map_cache::MapCacheLoader::load_or_build`] returns the consolidated
/// [`map_cache::MapResources`], rebuilding from source when any file changed.
pub mod map_cache;

/// Tile → occupant table of one map.
pub mod occupation;

/// Items lying on tiles, capped per tile.
pub mod ground_items;

/// Per-map occupation and ground items behind one lock each, composed with
/// the spatial index.
pub mod map_manager;

/// Ground item persistence seam and the in-memory store.
pub mod repository;

/// Bounded queue plus worker task that writes ground item snapshots.
pub mod background_saver;

/// KeyDB connection and login ticket consumption.
pub mod keydb;

/// KeyDB-backed ground item store.
pub mod keydb_store;

/// Item definitions and the ground graphic of each item id.
pub mod items;

/// Online players, NPCs, and the [`world::World`] that owns them with the
/// maps.
pub mod world;

/// Per-connection session state and the authenticator seam.
pub mod session;

/// Inventory seam used by item tasks.
pub mod inventory;

/// Outbound message routing to connection queues.
pub mod network_manager;

/// Per-tick effects run by the scheduler.
pub mod effects;

/// Timing and failure counters for the tick pipeline.
pub mod profiling;

/// Fixed-period tick scheduler.
pub mod game_loop;

/// One task per client opcode, and [`tasks::dispatch`].
pub mod tasks;

/// Length-prefixed framing of the game socket.
pub mod frame;

/// TCP accept loop and per-connection reader/writer.
pub mod server;

/// `REALM_*` environment settings.
pub mod config;
