//! The single source of truth for "who and what is where".
//!
//! `MapManager` composes the read-mostly [`SpatialIndex`] with the live
//! per-map state: the occupation table and the ground items. Each map's live
//! state sits behind its own `Mutex`, so a check-then-act sequence such as
//! [`MapManager::try_move`] cannot interleave with another mutation of the
//! same map. The lock is never held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use realm_core::types::{GroundItem, Occupant, Position};

use crate::background_saver::SaveQueue;
use crate::ground_items::GroundItemIndex;
use crate::map_cache::MapResources;
use crate::occupation::OccupationTable;
use crate::repository::{GroundItemRepository, StoreError};
use crate::spatial::{ResourceKind, SpatialIndex};

/// Live state of one map. Both tables share one lock.
#[derive(Debug)]
pub struct MapState {
    pub occupants: OccupationTable,
    pub ground: GroundItemIndex,
}

impl MapState {
    fn new(max_items_per_tile: usize) -> Self {
        Self {
            occupants: OccupationTable::new(),
            ground: GroundItemIndex::new(max_items_per_tile),
        }
    }
}

/// Optional ground-item persistence: the repository for reloads and the
/// queue that carries snapshots to the background saver.
struct Persistence {
    repository: Arc<dyn GroundItemRepository>,
    queue: SaveQueue,
    timeout: Duration,
}

pub struct MapManager {
    spatial: RwLock<Arc<SpatialIndex>>,
    resources: RwLock<Arc<MapResources>>,
    maps: RwLock<HashMap<u16, Arc<Mutex<MapState>>>>,
    max_items_per_tile: usize,
    persistence: Option<Persistence>,
}

impl MapManager {
    pub fn new(resources: MapResources, max_items_per_tile: usize) -> Self {
        let spatial = SpatialIndex::from_resources(&resources);
        Self {
            spatial: RwLock::new(Arc::new(spatial)),
            resources: RwLock::new(Arc::new(resources)),
            maps: RwLock::new(HashMap::new()),
            max_items_per_tile,
            persistence: None,
        }
    }

    /// Attach ground-item persistence.
    ///
    /// # Arguments
    ///
    /// * `repository` - Source for [`MapManager::load_ground_items`].
    /// * `queue` - Producer side of the background saver.
    /// * `timeout` - Upper bound for a repository read.
    pub fn with_persistence(
        mut self,
        repository: Arc<dyn GroundItemRepository>,
        queue: SaveQueue,
        timeout: Duration,
    ) -> Self {
        self.persistence = Some(Persistence {
            repository,
            queue,
            timeout,
        });
        self
    }

    pub fn max_items_per_tile(&self) -> usize {
        self.max_items_per_tile
    }

    /// Current spatial index. Cheap to clone; unaffected by a later reload.
    pub fn spatial(&self) -> Arc<SpatialIndex> {
        Arc::clone(&self.spatial.read().unwrap_or_else(|e| e.into_inner()))
    }

    fn resources(&self) -> Arc<MapResources> {
        Arc::clone(&self.resources.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Swap in freshly loaded static map data. Live occupation and ground
    /// items are kept.
    pub fn reload(&self, resources: MapResources) {
        let spatial = SpatialIndex::from_resources(&resources);
        log::info!("Reloading spatial index: {} maps", spatial.map_count());
        *self.spatial.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(spatial);
        *self.resources.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(resources);
    }

    pub fn log_memory_usage(&self) {
        self.spatial().log_memory_usage(&self.resources());
    }

    /// Ids of every map present in the static data.
    pub fn map_ids(&self) -> Vec<u16> {
        let mut ids: Vec<u16> = self.spatial().map_ids().collect();
        ids.sort_unstable();
        ids
    }

    /// Live state of `map_id` if anything has touched it yet. Read paths
    /// use this so lookups on unknown ids never grow the table.
    fn existing_map_state(&self, map_id: u16) -> Option<Arc<Mutex<MapState>>> {
        self.maps
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&map_id)
            .map(Arc::clone)
    }

    /// Live state of `map_id`, created on first write.
    fn map_state(&self, map_id: u16) -> Arc<Mutex<MapState>> {
        if let Some(state) = self.existing_map_state(map_id) {
            return state;
        }

        let mut maps = self.maps.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            maps.entry(map_id)
                .or_insert_with(|| Arc::new(Mutex::new(MapState::new(self.max_items_per_tile)))),
        )
    }

    fn lock(state: &Mutex<MapState>) -> MutexGuard<'_, MapState> {
        state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` against a read-only view of one map's live state.
    pub fn inspect_map<R>(&self, map_id: u16, f: impl FnOnce(&MapState) -> R) -> R {
        match self.existing_map_state(map_id) {
            Some(state) => f(&Self::lock(&state)),
            None => f(&MapState::new(self.max_items_per_tile)),
        }
    }

    /// Number of maps with live state.
    pub fn live_map_count(&self) -> usize {
        self.maps.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    // -----------------------------------------------------------------------
    //  Terrain
    // -----------------------------------------------------------------------

    pub fn is_blocked(&self, map_id: u16, x: u16, y: u16) -> bool {
        self.spatial().is_blocked(map_id, x, y)
    }

    pub fn is_water(&self, map_id: u16, x: u16, y: u16) -> bool {
        self.spatial().is_water(map_id, x, y)
    }

    pub fn is_walkable(&self, map_id: u16, x: u16, y: u16) -> bool {
        self.spatial().is_walkable(map_id, x, y)
    }

    pub fn has_resource(&self, map_id: u16, x: u16, y: u16) -> Option<ResourceKind> {
        self.spatial().has_resource(map_id, x, y)
    }

    pub fn sign_at(&self, map_id: u16, x: u16, y: u16) -> Option<u32> {
        self.resources().sign_at(map_id, x, y)
    }

    pub fn door_at(&self, map_id: u16, x: u16, y: u16) -> Option<u32> {
        self.resources().door_at(map_id, x, y)
    }

    // -----------------------------------------------------------------------
    //  Occupation
    // -----------------------------------------------------------------------

    /// Static part of [`MapManager::can_move_to`]: bounds, then terrain.
    fn terrain_allows(&self, map_id: u16, x: u16, y: u16) -> bool {
        let in_bounds = Position::new(x, y).is_some_and(|p| p.in_bounds());
        in_bounds && !self.spatial().is_blocked(map_id, x, y)
    }

    /// Whether a living entity may enter `(map_id, x, y)`.
    ///
    /// Checks, in order: the `[1, 100]` bounds, the blocked bitmap, the
    /// occupation table. Pure read.
    pub fn can_move_to(&self, map_id: u16, x: u16, y: u16) -> bool {
        if !self.terrain_allows(map_id, x, y) {
            return false;
        }
        let Some(state) = self.existing_map_state(map_id) else {
            return true;
        };
        let guard = Self::lock(&state);
        !guard.occupants.is_occupied(Position { x, y })
    }

    /// Record `user_id` at `new`, clearing `old` if it still holds them.
    ///
    /// Does not re-validate the destination; pair it with
    /// [`MapManager::can_move_to`] or use [`MapManager::try_move`].
    pub fn update_player_tile(
        &self,
        user_id: u32,
        map_id: u16,
        old: Option<Position>,
        new: Position,
    ) {
        self.relocate(Occupant::Player(user_id), map_id, old, new);
    }

    /// NPC counterpart of [`MapManager::update_player_tile`].
    pub fn update_npc_tile(&self, npc_id: u32, map_id: u16, old: Option<Position>, new: Position) {
        self.relocate(Occupant::Npc(npc_id), map_id, old, new);
    }

    fn relocate(&self, occupant: Occupant, map_id: u16, old: Option<Position>, new: Position) {
        let state = self.map_state(map_id);
        Self::lock(&state).occupants.relocate(occupant, old, new);
    }

    /// Check and move under one lock acquisition.
    ///
    /// # Returns
    ///
    /// * `true` if `occupant` now stands on `new`.
    /// * `false` if the destination is out of bounds, blocked or taken.
    pub fn try_move(
        &self,
        occupant: Occupant,
        map_id: u16,
        old: Option<Position>,
        new: Position,
    ) -> bool {
        if !self.terrain_allows(map_id, new.x, new.y) {
            return false;
        }
        let state = self.map_state(map_id);
        let mut guard = Self::lock(&state);
        if guard.occupants.is_occupied(new) {
            return false;
        }
        guard.occupants.relocate(occupant, old, new);
        true
    }

    /// Take `occupant` off the map, e.g. on logout or death.
    pub fn remove_occupant(&self, map_id: u16, position: Position, occupant: Occupant) -> bool {
        let removed = self
            .existing_map_state(map_id)
            .is_some_and(|state| Self::lock(&state).occupants.vacate(position, occupant));
        if !removed {
            log::debug!(
                "{occupant} was not recorded at map {map_id} ({}, {})",
                position.x,
                position.y
            );
        }
        removed
    }

    pub fn get_tile_occupant(&self, map_id: u16, x: u16, y: u16) -> Option<Occupant> {
        let state = self.existing_map_state(map_id)?;
        let guard = Self::lock(&state);
        guard.occupants.get(Position { x, y })
    }

    // -----------------------------------------------------------------------
    //  Ground items
    // -----------------------------------------------------------------------

    fn persist(&self, map_id: u16, state: &MapState) {
        if let Some(persistence) = &self.persistence {
            persistence
                .queue
                .enqueue_ground_items(map_id, state.ground.snapshot());
        }
    }

    /// Drop `item` on a tile.
    ///
    /// # Returns
    ///
    /// * `true` if the item now lies on the tile.
    /// * `false` if the tile is outside the map or already full.
    pub fn add_ground_item(&self, map_id: u16, x: u16, y: u16, item: GroundItem) -> bool {
        let Some(position) = Position::new(x, y).filter(Position::in_bounds) else {
            log::warn!("Refusing ground item outside the map: map {map_id} ({x}, {y})");
            return false;
        };

        let state = self.map_state(map_id);
        let mut guard = Self::lock(&state);
        match guard.ground.add(position, item) {
            Ok(()) => {
                self.persist(map_id, &guard);
                true
            }
            Err(full) => {
                log::warn!("Ground item rejected on map {map_id}: {full}");
                false
            }
        }
    }

    /// Take an item off a tile; `index` defaults to the first one.
    pub fn remove_ground_item(
        &self,
        map_id: u16,
        x: u16,
        y: u16,
        index: Option<usize>,
    ) -> Option<GroundItem> {
        let state = self.existing_map_state(map_id)?;
        let mut guard = Self::lock(&state);
        let removed = guard
            .ground
            .remove(Position { x, y }, index.unwrap_or(0))?;
        self.persist(map_id, &guard);
        Some(removed)
    }

    /// Take the top item off a tile while keeping its slot, for callers
    /// that may need to return it after an `.await`. Follow up with
    /// [`MapManager::restore_ground_item`] or
    /// [`MapManager::release_ground_item`].
    pub fn take_ground_item(&self, map_id: u16, x: u16, y: u16) -> Option<GroundItem> {
        let state = self.existing_map_state(map_id)?;
        let mut guard = Self::lock(&state);
        let taken = guard.ground.hold(Position { x, y }, 0)?;
        self.persist(map_id, &guard);
        Some(taken)
    }

    /// Return an item taken with [`MapManager::take_ground_item`] to the
    /// top of its tile. The held slot guarantees room.
    pub fn restore_ground_item(&self, map_id: u16, x: u16, y: u16, item: GroundItem) {
        let state = self.map_state(map_id);
        let mut guard = Self::lock(&state);
        guard.ground.restore(Position { x, y }, item);
        self.persist(map_id, &guard);
    }

    /// Free the slot of a taken item that found a new home.
    pub fn release_ground_item(&self, map_id: u16, x: u16, y: u16) {
        if let Some(state) = self.existing_map_state(map_id) {
            Self::lock(&state).ground.release(Position { x, y });
        }
    }

    pub fn get_ground_items(&self, map_id: u16, x: u16, y: u16) -> Vec<GroundItem> {
        match self.existing_map_state(map_id) {
            Some(state) => Self::lock(&state).ground.get(Position { x, y }).to_vec(),
            None => Vec::new(),
        }
    }

    /// Number of tiles on `map_id` that hold at least one item.
    pub fn get_ground_items_count(&self, map_id: u16) -> usize {
        self.existing_map_state(map_id)
            .map_or(0, |state| Self::lock(&state).ground.tile_count())
    }

    /// Remove everything lying on `map_id`; returns the number of tiles
    /// cleared.
    pub fn clear_ground_items(&self, map_id: u16) -> usize {
        let Some(state) = self.existing_map_state(map_id) else {
            return 0;
        };
        let mut guard = Self::lock(&state);
        let cleared = guard.ground.clear();
        if cleared > 0 {
            log::info!("Cleared ground items from {cleared} tiles on map {map_id}");
            self.persist(map_id, &guard);
        }
        cleared
    }

    /// Replace `map_id`'s ground items with the stored copy.
    ///
    /// The repository read happens without any lock held; the result is
    /// swapped in afterwards. Callers must not mutate the same map's ground
    /// items while this runs.
    ///
    /// # Returns
    ///
    /// * `Ok(n)` with the number of tiles loaded (0 without persistence).
    /// * `Err` if the repository failed or timed out; nothing is changed.
    pub async fn load_ground_items(&self, map_id: u16) -> Result<usize, StoreError> {
        let Some(persistence) = &self.persistence else {
            return Ok(0);
        };

        let snapshot = tokio::time::timeout(
            persistence.timeout,
            persistence.repository.load_ground_items(map_id),
        )
        .await
        .map_err(|_| StoreError::Timeout(persistence.timeout))??;

        let state = self.map_state(map_id);
        let tiles = Self::lock(&state).ground.replace_all(snapshot);
        log::debug!("Loaded ground items for {tiles} tiles on map {map_id}");
        Ok(tiles)
    }
}

// ---------------------------------------------------------------------------
//  Unit Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_saver;
    use crate::map_cache::MapResourceSet;
    use crate::repository::MemoryGroundItemStore;
    use realm_core::types::ItemStack;

    fn resources() -> MapResources {
        let mut set = MapResourceSet::default();
        set.blocked.insert((10, 10));
        set.trees.insert((12, 12));
        set.blocked.insert((12, 12));
        set.water.insert((20, 20));
        set.signs.insert((30, 30), 77);
        let mut resources = MapResources::default();
        resources.maps.insert(1, set);
        resources
    }

    fn item(id: u16) -> GroundItem {
        GroundItem::new(ItemStack::new(id, 1).unwrap(), 1000 + id as u32)
    }

    fn pos(x: u16, y: u16) -> Position {
        Position { x, y }
    }

    /// Out of bounds, blocked and occupied tiles all refuse entry.
    #[test]
    fn can_move_to_checks_bounds_terrain_and_occupants() {
        let manager = MapManager::new(resources(), 10);
        assert!(!manager.can_move_to(1, 0, 5));
        assert!(!manager.can_move_to(1, 5, 101));
        assert!(!manager.can_move_to(1, 10, 10));
        assert!(!manager.can_move_to(1, 12, 12));

        manager.update_npc_tile(4, 1, None, pos(15, 15));
        assert!(!manager.can_move_to(1, 15, 15));

        // Water is not implicitly blocked.
        assert!(manager.can_move_to(1, 20, 20));
        assert!(manager.can_move_to(1, 50, 50));
    }

    /// Unindexed maps are walkable but still bounded.
    #[test]
    fn unknown_map_is_open() {
        let manager = MapManager::new(resources(), 10);
        assert!(manager.can_move_to(9, 10, 10));
        assert!(!manager.can_move_to(9, 0, 10));
    }

    /// A taken item goes back even if the tile filled in the meantime.
    #[test]
    fn taken_item_is_restored_to_a_full_tile() {
        let manager = MapManager::new(resources(), 2);
        assert!(manager.add_ground_item(1, 5, 5, item(1)));
        assert!(manager.add_ground_item(1, 5, 5, item(2)));

        assert_eq!(manager.take_ground_item(1, 5, 5), Some(item(1)));
        assert!(!manager.add_ground_item(1, 5, 5, item(3)));
        manager.restore_ground_item(1, 5, 5, item(1));
        assert_eq!(manager.get_ground_items(1, 5, 5), vec![item(1), item(2)]);

        assert_eq!(manager.take_ground_item(1, 5, 5), Some(item(1)));
        manager.release_ground_item(1, 5, 5);
        assert!(manager.add_ground_item(1, 5, 5, item(3)));
        assert_eq!(manager.get_ground_items(1, 5, 5), vec![item(2), item(3)]);
    }

    /// Lookups on maps nobody has written to leave the live table alone.
    #[test]
    fn reads_do_not_create_map_state() {
        let manager = MapManager::new(resources(), 10);
        assert!(manager.can_move_to(500, 5, 5));
        assert_eq!(manager.get_tile_occupant(501, 5, 5), None);
        assert!(manager.get_ground_items(502, 5, 5).is_empty());
        assert_eq!(manager.get_ground_items_count(503), 0);
        assert!(manager.remove_ground_item(504, 5, 5, None).is_none());
        assert!(!manager.remove_occupant(505, pos(5, 5), Occupant::Npc(1)));
        assert_eq!(manager.clear_ground_items(506), 0);
        assert_eq!(manager.inspect_map(507, |state| state.occupants.len()), 0);
        assert_eq!(manager.live_map_count(), 0);

        assert!(manager.add_ground_item(1, 5, 5, item(3)));
        assert_eq!(manager.live_map_count(), 1);
    }

    #[test]
    fn update_player_tile_moves_occupant() {
        let manager = MapManager::new(resources(), 10);
        manager.update_player_tile(7, 1, None, pos(49, 50));
        assert!(manager.can_move_to(1, 50, 50));
        manager.update_player_tile(7, 1, Some(pos(49, 50)), pos(50, 50));

        assert_eq!(manager.get_tile_occupant(1, 50, 50), Some(Occupant::Player(7)));
        assert_eq!(manager.get_tile_occupant(1, 49, 50), None);
    }

    /// `try_move` refuses an occupied destination and leaves both parties put.
    #[test]
    fn try_move_refuses_taken_tile() {
        let manager = MapManager::new(resources(), 10);
        manager.update_npc_tile(1, 1, None, pos(40, 40));
        manager.update_player_tile(2, 1, None, pos(41, 40));

        assert!(!manager.try_move(Occupant::Player(2), 1, Some(pos(41, 40)), pos(40, 40)));
        assert_eq!(manager.get_tile_occupant(1, 41, 40), Some(Occupant::Player(2)));
        assert!(manager.try_move(Occupant::Player(2), 1, Some(pos(41, 40)), pos(41, 41)));
        assert_eq!(manager.get_tile_occupant(1, 41, 40), None);
    }

    #[test]
    fn remove_occupant_only_clears_matching_entry() {
        let manager = MapManager::new(resources(), 10);
        manager.update_player_tile(3, 1, None, pos(5, 5));
        assert!(!manager.remove_occupant(1, pos(5, 5), Occupant::Npc(3)));
        assert!(manager.remove_occupant(1, pos(5, 5), Occupant::Player(3)));
        assert_eq!(manager.get_tile_occupant(1, 5, 5), None);
    }

    /// Cap of two: the third drop is refused and the first two stay.
    #[test]
    fn ground_items_respect_cap() {
        let manager = MapManager::new(resources(), 2);
        assert!(manager.add_ground_item(1, 8, 8, item(1)));
        assert!(manager.add_ground_item(1, 8, 8, item(2)));
        assert!(!manager.add_ground_item(1, 8, 8, item(3)));
        assert_eq!(manager.get_ground_items(1, 8, 8), vec![item(1), item(2)]);
    }

    #[test]
    fn remove_ground_item_defaults_to_first() {
        let manager = MapManager::new(resources(), 4);
        assert_eq!(manager.remove_ground_item(1, 8, 8, None), None);
        manager.add_ground_item(1, 8, 8, item(1));
        manager.add_ground_item(1, 8, 8, item(2));
        assert_eq!(manager.remove_ground_item(1, 8, 8, Some(5)), None);
        assert_eq!(manager.remove_ground_item(1, 8, 8, None), Some(item(1)));
        assert_eq!(manager.get_ground_items_count(1), 1);
        assert_eq!(manager.remove_ground_item(1, 8, 8, None), Some(item(2)));
        assert_eq!(manager.get_ground_items_count(1), 0);
    }

    #[test]
    fn add_ground_item_rejects_out_of_bounds() {
        let manager = MapManager::new(resources(), 4);
        assert!(!manager.add_ground_item(1, 0, 8, item(1)));
        assert!(!manager.add_ground_item(1, 8, 101, item(1)));
    }

    #[test]
    fn clear_ground_items_counts_tiles() {
        let manager = MapManager::new(resources(), 4);
        manager.add_ground_item(1, 1, 1, item(1));
        manager.add_ground_item(1, 1, 1, item(2));
        manager.add_ground_item(1, 2, 1, item(3));
        manager.add_ground_item(2, 2, 1, item(4));
        assert_eq!(manager.clear_ground_items(1), 2);
        assert_eq!(manager.get_ground_items_count(1), 0);
        assert_eq!(manager.get_ground_items_count(2), 1);
    }

    #[test]
    fn signs_and_resources_come_from_static_data() {
        let manager = MapManager::new(resources(), 4);
        assert_eq!(manager.sign_at(1, 30, 30), Some(77));
        assert_eq!(manager.door_at(1, 30, 30), None);
        assert_eq!(manager.has_resource(1, 12, 12), Some(ResourceKind::Tree));
        assert!(manager.is_water(1, 20, 20));
    }

    /// Reload swaps terrain but keeps live occupants.
    #[test]
    fn reload_keeps_live_state() {
        let manager = MapManager::new(resources(), 4);
        manager.update_player_tile(1, 1, None, pos(60, 60));
        manager.reload(MapResources::default());
        assert!(manager.can_move_to(1, 10, 10));
        assert_eq!(manager.get_tile_occupant(1, 60, 60), Some(Occupant::Player(1)));
    }

    /// Mutations reach the repository through the saver and reload restores
    /// them into a fresh manager.
    #[tokio::test]
    async fn ground_items_persist_and_reload() {
        let store = Arc::new(MemoryGroundItemStore::new());
        let mut saver = background_saver::spawn(store.clone(), 16, Duration::from_secs(1));
        let manager = MapManager::new(resources(), 4).with_persistence(
            store.clone(),
            saver.queue(),
            Duration::from_secs(1),
        );

        manager.add_ground_item(1, 3, 3, item(1));
        manager.add_ground_item(1, 4, 3, item(2));
        manager.remove_ground_item(1, 4, 3, None);
        saver.flush().await.unwrap();
        assert_eq!(store.save_count(), 3);

        let fresh = MapManager::new(resources(), 4).with_persistence(
            store.clone(),
            saver.queue(),
            Duration::from_secs(1),
        );
        assert_eq!(fresh.load_ground_items(1).await.unwrap(), 1);
        assert_eq!(fresh.get_ground_items(1, 3, 3), vec![item(1)]);
        saver.shutdown().await;
    }

    /// Without persistence, loading is a no-op.
    #[tokio::test]
    async fn load_without_persistence_is_empty() {
        let manager = MapManager::new(resources(), 4);
        assert_eq!(manager.load_ground_items(1).await.unwrap(), 0);
    }

    /// A failing backend never rolls back the in-memory mutation.
    #[tokio::test]
    async fn failed_save_keeps_mutation() {
        let store = Arc::new(MemoryGroundItemStore::failing());
        let mut saver = background_saver::spawn(store.clone(), 16, Duration::from_secs(1));
        let manager = MapManager::new(resources(), 4).with_persistence(
            store,
            saver.queue(),
            Duration::from_secs(1),
        );

        assert!(manager.add_ground_item(1, 3, 3, item(1)));
        saver.flush().await.unwrap();
        assert_eq!(saver.counters().failed, 1);
        assert_eq!(manager.get_ground_items(1, 3, 3), vec![item(1)]);
        saver.shutdown().await;
    }
}
