use std::collections::HashMap;

use realm_core::constants::{MAP_HEIGHT, MAP_WIDTH, MAX_MAP_DIMENSION};

use super::bitmap::TileBitmap;
use crate::map_cache::{MapResourceSet, MapResources};

/// Workable terrain, in lookup priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Tree,
    Mine,
    Anvil,
    Forge,
}

impl ResourceKind {
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Tree => "tree",
            ResourceKind::Mine => "mine",
            ResourceKind::Anvil => "anvil",
            ResourceKind::Forge => "forge",
        }
    }
}

/// Every category bitmap for one map.
#[derive(Debug, Clone)]
pub struct MapBitmaps {
    pub blocked: TileBitmap,
    pub water: TileBitmap,
    pub tree: TileBitmap,
    pub mine: TileBitmap,
    pub anvil: TileBitmap,
    pub forge: TileBitmap,
}

impl MapBitmaps {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            blocked: TileBitmap::new(width, height),
            water: TileBitmap::new(width, height),
            tree: TileBitmap::new(width, height),
            mine: TileBitmap::new(width, height),
            anvil: TileBitmap::new(width, height),
            forge: TileBitmap::new(width, height),
        }
    }

    /// Build from a resource set. The grid is at least 100×100 and grows to
    /// the largest coordinate present, capped at [`MAX_MAP_DIMENSION`].
    pub fn from_resources(set: &MapResourceSet) -> Self {
        let (max_x, max_y) = set.extent();
        let width = max_x.clamp(MAP_WIDTH, MAX_MAP_DIMENSION);
        let height = max_y.clamp(MAP_HEIGHT, MAX_MAP_DIMENSION);

        let mut bitmaps = Self::new(width, height);
        for &(x, y) in &set.blocked {
            bitmaps.blocked.set(x, y);
        }
        for &(x, y) in &set.water {
            bitmaps.water.set(x, y);
        }
        // Workable terrain always blocks movement.
        for (coords, target) in [
            (&set.trees, &mut bitmaps.tree),
            (&set.mines, &mut bitmaps.mine),
            (&set.anvils, &mut bitmaps.anvil),
            (&set.forges, &mut bitmaps.forge),
        ] {
            for &(x, y) in coords {
                target.set(x, y);
                bitmaps.blocked.set(x, y);
            }
        }
        bitmaps
    }

    pub fn width(&self) -> u16 {
        self.blocked.width()
    }

    pub fn height(&self) -> u16 {
        self.blocked.height()
    }

    pub fn resource_at(&self, x: u16, y: u16) -> Option<ResourceKind> {
        if self.tree.get(x, y) {
            Some(ResourceKind::Tree)
        } else if self.mine.get(x, y) {
            Some(ResourceKind::Mine)
        } else if self.anvil.get(x, y) {
            Some(ResourceKind::Anvil)
        } else if self.forge.get(x, y) {
            Some(ResourceKind::Forge)
        } else {
            None
        }
    }

    /// Sum of every category's byte array.
    pub fn memory_bytes(&self) -> usize {
        self.blocked.memory_bytes()
            + self.water.memory_bytes()
            + self.tree.memory_bytes()
            + self.mine.memory_bytes()
            + self.anvil.memory_bytes()
            + self.forge.memory_bytes()
    }
}

/// O(1) terrain queries across all loaded maps.
///
/// Read-only once built; shared between tasks and effects without locking.
#[derive(Debug, Clone, Default)]
pub struct SpatialIndex {
    maps: HashMap<u16, MapBitmaps>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources(resources: &MapResources) -> Self {
        let maps = resources
            .maps
            .iter()
            .map(|(&map_id, set)| (map_id, MapBitmaps::from_resources(set)))
            .collect();
        Self { maps }
    }

    pub fn insert_map(&mut self, map_id: u16, bitmaps: MapBitmaps) {
        self.maps.insert(map_id, bitmaps);
    }

    pub fn map(&self, map_id: u16) -> Option<&MapBitmaps> {
        self.maps.get(&map_id)
    }

    pub fn contains_map(&self, map_id: u16) -> bool {
        self.maps.contains_key(&map_id)
    }

    pub fn map_ids(&self) -> impl Iterator<Item = u16> + '_ {
        self.maps.keys().copied()
    }

    pub fn map_count(&self) -> usize {
        self.maps.len()
    }

    /// Unknown maps are never blocked.
    pub fn is_blocked(&self, map_id: u16, x: u16, y: u16) -> bool {
        self.maps
            .get(&map_id)
            .is_some_and(|m| m.blocked.get(x, y))
    }

    pub fn is_water(&self, map_id: u16, x: u16, y: u16) -> bool {
        self.maps.get(&map_id).is_some_and(|m| m.water.get(x, y))
    }

    /// Unknown maps answer `true` so players are never trapped on a map
    /// that failed to index.
    pub fn is_walkable(&self, map_id: u16, x: u16, y: u16) -> bool {
        match self.maps.get(&map_id) {
            Some(m) => !m.blocked.get(x, y),
            None => true,
        }
    }

    /// First matching category in the order tree → mine → anvil → forge.
    pub fn has_resource(&self, map_id: u16, x: u16, y: u16) -> Option<ResourceKind> {
        self.maps.get(&map_id)?.resource_at(x, y)
    }

    /// Total bytes held by every bitmap of every map.
    pub fn memory_bytes(&self) -> usize {
        self.maps.values().map(MapBitmaps::memory_bytes).sum()
    }

    /// Log how much the index occupies against a coordinate-set estimate.
    pub fn log_memory_usage(&self, resources: &MapResources) {
        // A set entry costs roughly a boxed tuple plus hashing overhead.
        const SET_ENTRY_BYTES: usize = 64;
        let set_bytes: usize = resources
            .maps
            .values()
            .map(|set| set.tile_count() * SET_ENTRY_BYTES)
            .sum();
        log::info!(
            "Spatial index: {} maps in {} bytes ({} bytes as coordinate sets)",
            self.map_count(),
            self.memory_bytes(),
            set_bytes
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_set() -> MapResourceSet {
        MapResourceSet {
            blocked: BTreeSet::from([(10, 10)]),
            water: BTreeSet::from([(20, 20)]),
            trees: BTreeSet::from([(30, 30)]),
            mines: BTreeSet::from([(31, 30)]),
            anvils: BTreeSet::from([(32, 30)]),
            forges: BTreeSet::from([(33, 30)]),
            ..Default::default()
        }
    }

    fn sample_index() -> SpatialIndex {
        let mut resources = MapResources::default();
        resources.maps.insert(1, sample_set());
        SpatialIndex::from_resources(&resources)
    }

    #[test]
    fn blocked_and_water_lookups() {
        let index = sample_index();
        assert!(index.is_blocked(1, 10, 10));
        assert!(!index.is_blocked(1, 11, 10));
        assert!(index.is_water(1, 20, 20));
        // Water is flagged on its own and does not block.
        assert!(!index.is_blocked(1, 20, 20));
        assert!(index.is_walkable(1, 20, 20));
    }

    /// Resource tiles are implicitly blocked.
    #[test]
    fn resources_block_movement() {
        let index = sample_index();
        for x in 30..=33 {
            assert!(index.is_blocked(1, x, 30));
            assert!(!index.is_walkable(1, x, 30));
        }
    }

    #[test]
    fn has_resource_reports_category() {
        let index = sample_index();
        assert_eq!(index.has_resource(1, 30, 30), Some(ResourceKind::Tree));
        assert_eq!(index.has_resource(1, 31, 30), Some(ResourceKind::Mine));
        assert_eq!(index.has_resource(1, 32, 30), Some(ResourceKind::Anvil));
        assert_eq!(index.has_resource(1, 33, 30), Some(ResourceKind::Forge));
        assert_eq!(index.has_resource(1, 34, 30), None);
        assert_eq!(index.has_resource(9, 30, 30), None);
    }

    /// A tile marked both tree and mine reports the tree first.
    #[test]
    fn has_resource_priority() {
        let mut bitmaps = MapBitmaps::new(100, 100);
        bitmaps.mine.set(5, 5);
        bitmaps.forge.set(5, 5);
        bitmaps.tree.set(5, 5);
        let mut index = SpatialIndex::new();
        index.insert_map(2, bitmaps);
        assert_eq!(index.has_resource(2, 5, 5), Some(ResourceKind::Tree));
    }

    /// Maps that were never indexed are walkable everywhere.
    #[test]
    fn unknown_map_fails_open() {
        let index = sample_index();
        assert!(index.is_walkable(77, 50, 50));
        assert!(!index.is_blocked(77, 50, 50));
        assert!(!index.is_water(77, 50, 50));
    }

    #[test]
    fn memory_is_sum_of_categories() {
        let index = sample_index();
        assert_eq!(index.memory_bytes(), 6 * 1250);
    }

    /// Coordinates beyond 100 widen the map instead of being dropped.
    #[test]
    fn oversized_maps_are_tolerated() {
        let set = MapResourceSet {
            blocked: BTreeSet::from([(150, 120)]),
            ..Default::default()
        };
        let bitmaps = MapBitmaps::from_resources(&set);
        assert_eq!(bitmaps.width(), 150);
        assert_eq!(bitmaps.height(), 120);
        assert!(bitmaps.blocked.get(150, 120));
    }

    /// A stray huge coordinate cannot inflate the grid past the cap.
    #[test]
    fn grid_size_is_capped() {
        let set = MapResourceSet {
            blocked: BTreeSet::from([(5, 5)]),
            doors: BTreeMap::from([((u16::MAX, u16::MAX), 1)]),
            ..Default::default()
        };
        let bitmaps = MapBitmaps::from_resources(&set);
        assert_eq!(bitmaps.width(), MAX_MAP_DIMENSION);
        assert_eq!(bitmaps.height(), MAX_MAP_DIMENSION);
        assert!(bitmaps.blocked.get(5, 5));
    }
}
