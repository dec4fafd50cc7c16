//! Everything the simulation mutates: the maps plus the players and NPCs
//! standing on them.
//!
//! Lock order is registry → map. A registry lock may be held while calling
//! into the [`MapManager`]; never the other way round.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use realm_core::constants::{
    DEFAULT_MAX_HP, DEFAULT_MAX_STAMINA, MAX_HUNGER, MAX_THIRST,
};
use realm_core::types::{Heading, Occupant, Position, TileKey};
use serde::Deserialize;

use crate::items::ItemCatalog;
use crate::map_manager::MapManager;

/// How far from the requested tile a login or spawn may be pushed.
const PLACEMENT_RADIUS: u16 = 5;

const DEFAULT_WANDER_RADIUS: u16 = 4;

// ---------------------------------------------------------------------------
//  Players
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub user_id: u32,
    pub name: String,
    pub position: TileKey,
    pub heading: Heading,
    pub hp: u16,
    pub max_hp: u16,
    pub stamina: u16,
    pub max_stamina: u16,
    pub hunger: u16,
    pub thirst: u16,
    pub gold: u32,
}

impl Player {
    pub fn new(user_id: u32, name: impl Into<String>, position: TileKey) -> Self {
        Self {
            user_id,
            name: name.into(),
            position,
            heading: Heading::South,
            hp: DEFAULT_MAX_HP,
            max_hp: DEFAULT_MAX_HP,
            stamina: DEFAULT_MAX_STAMINA,
            max_stamina: DEFAULT_MAX_STAMINA,
            hunger: MAX_HUNGER,
            thirst: MAX_THIRST,
            gold: 0,
        }
    }
}

/// Online players keyed by user id.
#[derive(Debug, Default)]
pub struct PlayerRegistry {
    players: RwLock<HashMap<u32, Player>>,
}

impl PlayerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, player: Player) {
        self.players
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(player.user_id, player);
    }

    pub fn remove(&self, user_id: u32) -> Option<Player> {
        self.players
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&user_id)
    }

    pub fn get(&self, user_id: u32) -> Option<Player> {
        self.players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&user_id)
            .cloned()
    }

    pub fn contains(&self, user_id: u32) -> bool {
        self.players
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&user_id)
    }

    pub fn len(&self) -> usize {
        self.players.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run `f` on one player while holding the registry write lock.
    pub fn with_player_mut<R>(&self, user_id: u32, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        let mut players = self.players.write().unwrap_or_else(|e| e.into_inner());
        players.get_mut(&user_id).map(f)
    }

    /// Run `f` on every player, in ascending user id order.
    pub fn for_each_mut(&self, mut f: impl FnMut(&mut Player)) -> usize {
        let mut players = self.players.write().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<u32> = players.keys().copied().collect();
        ids.sort_unstable();
        for id in &ids {
            if let Some(player) = players.get_mut(id) {
                f(player);
            }
        }
        ids.len()
    }

    /// `(user_id, position)` of every player on `map`.
    pub fn positions_on_map(&self, map: u16) -> Vec<(u32, Position)> {
        let players = self.players.read().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<(u32, Position)> = players
            .values()
            .filter(|p| p.position.map == map)
            .map(|p| (p.user_id, p.position.position()))
            .collect();
        found.sort_unstable_by_key(|(id, _)| *id);
        found
    }

    /// Every player's position, grouped by map.
    pub fn positions_by_map(&self) -> HashMap<u16, Vec<(u32, Position)>> {
        let players = self.players.read().unwrap_or_else(|e| e.into_inner());
        let mut by_map: HashMap<u16, Vec<(u32, Position)>> = HashMap::new();
        for p in players.values() {
            by_map
                .entry(p.position.map)
                .or_default()
                .push((p.user_id, p.position.position()));
        }
        by_map
    }

    /// Users on the same map as `center` within `range` tiles, `except`
    /// excluded.
    pub fn nearby(&self, center: TileKey, range: u16, except: Option<u32>) -> Vec<u32> {
        let origin = center.position();
        self.positions_on_map(center.map)
            .into_iter()
            .filter(|(id, pos)| Some(*id) != except && origin.distance(*pos) <= range)
            .map(|(id, _)| id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
//  NPCs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Npc {
    pub id: u32,
    pub template: u32,
    pub position: TileKey,
    pub heading: Heading,
    pub hostile: bool,
    pub home: Position,
    pub wander_radius: u16,
}

/// One entry of the spawn file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NpcSpawn {
    pub npc: u32,
    pub map: u16,
    pub x: u16,
    pub y: u16,
    #[serde(default)]
    pub hostile: bool,
    #[serde(default = "default_wander_radius")]
    pub wander_radius: u16,
}

fn default_wander_radius() -> u16 {
    DEFAULT_WANDER_RADIUS
}

/// Read the spawn list. A missing file means no NPCs.
pub fn load_npc_spawns(path: &Path) -> Result<Vec<NpcSpawn>, String> {
    if !path.exists() {
        log::info!("No NPC spawn file at {}; starting without NPCs", path.display());
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("Failed to parse {}: {e}", path.display()))
}

/// NPC instances keyed by instance id. Iteration is in id order.
#[derive(Debug)]
pub struct NpcRegistry {
    npcs: Mutex<BTreeMap<u32, Npc>>,
    next_id: AtomicU32,
}

impl Default for NpcRegistry {
    fn default() -> Self {
        Self {
            npcs: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(1),
        }
    }
}

impl NpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access to every NPC. Hold it only for in-memory work.
    pub fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, Npc>> {
        self.npcs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, id: u32) -> Option<Npc> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Place a new NPC on the nearest free tile to the spawn point.
    pub fn spawn(&self, maps: &MapManager, spawn: &NpcSpawn) -> Option<u32> {
        let Some(requested) = Position::new(spawn.x, spawn.y) else {
            log::warn!("NPC spawn {} has invalid position ({}, {})", spawn.npc, spawn.x, spawn.y);
            return None;
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut npcs = self.lock();
        let Some(position) = place_near(maps, Occupant::Npc(id), spawn.map, requested) else {
            log::warn!(
                "No free tile for NPC template {} near map {} ({}, {})",
                spawn.npc,
                spawn.map,
                spawn.x,
                spawn.y
            );
            return None;
        };

        npcs.insert(
            id,
            Npc {
                id,
                template: spawn.npc,
                position: TileKey::at(spawn.map, position),
                heading: Heading::South,
                hostile: spawn.hostile,
                home: position,
                wander_radius: spawn.wander_radius,
            },
        );
        Some(id)
    }

    pub fn despawn(&self, maps: &MapManager, id: u32) -> Option<Npc> {
        let npc = self.lock().remove(&id)?;
        maps.remove_occupant(npc.position.map, npc.position.position(), Occupant::Npc(id));
        Some(npc)
    }
}

/// Claim the free tile closest to `requested`, searching rings of growing
/// Chebyshev radius. The claim is atomic per tile.
fn place_near(
    maps: &MapManager,
    occupant: Occupant,
    map: u16,
    requested: Position,
) -> Option<Position> {
    for radius in 0..=PLACEMENT_RADIUS {
        let r = radius as i32;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx.abs().max(dy.abs()) != r {
                    continue;
                }
                let x = requested.x as i32 + dx;
                let y = requested.y as i32 + dy;
                let (Ok(x), Ok(y)) = (u16::try_from(x), u16::try_from(y)) else {
                    continue;
                };
                let Some(candidate) = Position::new(x, y) else {
                    continue;
                };
                if maps.try_move(occupant, map, None, candidate) {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
//  World
// ---------------------------------------------------------------------------

pub struct World {
    pub maps: MapManager,
    pub players: PlayerRegistry,
    pub npcs: NpcRegistry,
    pub items: ItemCatalog,
}

impl World {
    pub fn new(maps: MapManager) -> Self {
        Self {
            maps,
            players: PlayerRegistry::new(),
            npcs: NpcRegistry::new(),
            items: ItemCatalog::new(),
        }
    }

    pub fn with_items(mut self, items: ItemCatalog) -> Self {
        self.items = items;
        self
    }

    /// Spawn every entry; returns how many were placed.
    pub fn spawn_npcs(&self, spawns: &[NpcSpawn]) -> usize {
        let placed = spawns
            .iter()
            .filter(|spawn| self.npcs.spawn(&self.maps, spawn).is_some())
            .count();
        log::info!("Spawned {placed} of {} NPCs", spawns.len());
        placed
    }

    /// Put `user_id` into the world near `start`.
    ///
    /// # Returns
    ///
    /// * `Some(tile)` where the player now stands.
    /// * `None` if every tile around `start` is taken.
    pub fn enter_player(&self, user_id: u32, name: &str, start: TileKey) -> Option<TileKey> {
        if self.leave_player(user_id).is_some() {
            log::warn!("User {user_id} entered while still in the world; old entry removed");
        }

        let requested = Position::new(start.x, start.y)?;
        let position = place_near(&self.maps, Occupant::Player(user_id), start.map, requested)?;
        let tile = TileKey::at(start.map, position);
        self.players.insert(Player::new(user_id, name, tile));
        log::info!("User {user_id} entered map {} at ({}, {})", tile.map, tile.x, tile.y);
        Some(tile)
    }

    /// Take `user_id` off the map and out of the registry.
    pub fn leave_player(&self, user_id: u32) -> Option<Player> {
        let player = self.players.remove(user_id)?;
        self.maps.remove_occupant(
            player.position.map,
            player.position.position(),
            Occupant::Player(user_id),
        );
        Some(player)
    }
}

// ---------------------------------------------------------------------------
//  Unit Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map_cache::{MapResourceSet, MapResources};

    fn world() -> World {
        let mut set = MapResourceSet::default();
        set.blocked.insert((20, 20));
        let mut resources = MapResources::default();
        resources.maps.insert(1, set);
        World::new(MapManager::new(resources, 10))
    }

    fn temp_path(prefix: &str) -> std::path::PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{prefix}_{}_{nanos}.json", std::process::id()))
    }

    #[test]
    fn enter_player_occupies_start_tile() {
        let world = world();
        let tile = world.enter_player(7, "Ada", TileKey::new(1, 50, 50)).unwrap();
        assert_eq!(tile, TileKey::new(1, 50, 50));
        assert_eq!(world.maps.get_tile_occupant(1, 50, 50), Some(Occupant::Player(7)));
        assert_eq!(world.players.get(7).unwrap().name, "Ada");
    }

    /// A taken or blocked start tile pushes the player to a neighbour.
    #[test]
    fn enter_player_avoids_taken_tiles() {
        let world = world();
        world.enter_player(1, "a", TileKey::new(1, 20, 21)).unwrap();
        let tile = world.enter_player(2, "b", TileKey::new(1, 20, 20)).unwrap();
        assert_eq!(tile.position().distance(Position { x: 20, y: 20 }), 1);
        assert_ne!(tile, TileKey::new(1, 20, 21));
    }

    #[test]
    fn leave_player_frees_tile() {
        let world = world();
        world.enter_player(3, "c", TileKey::new(1, 10, 10)).unwrap();
        assert!(world.leave_player(3).is_some());
        assert_eq!(world.maps.get_tile_occupant(1, 10, 10), None);
        assert!(world.players.is_empty());
    }

    #[test]
    fn spawn_npcs_places_each_on_its_own_tile() {
        let world = world();
        let spawns = vec![
            NpcSpawn {
                npc: 100,
                map: 1,
                x: 30,
                y: 30,
                hostile: true,
                wander_radius: 2,
            },
            NpcSpawn {
                npc: 101,
                map: 1,
                x: 30,
                y: 30,
                hostile: false,
                wander_radius: 2,
            },
        ];
        assert_eq!(world.spawn_npcs(&spawns), 2);
        let npcs = world.npcs.lock();
        let tiles: Vec<TileKey> = npcs.values().map(|n| n.position).collect();
        assert_ne!(tiles[0], tiles[1]);
        for npc in npcs.values() {
            assert_eq!(
                world.maps.get_tile_occupant(1, npc.position.x, npc.position.y),
                Some(Occupant::Npc(npc.id))
            );
        }
    }

    #[test]
    fn despawn_frees_tile() {
        let world = world();
        let id = world
            .npcs
            .spawn(
                &world.maps,
                &NpcSpawn {
                    npc: 1,
                    map: 1,
                    x: 5,
                    y: 5,
                    hostile: false,
                    wander_radius: 1,
                },
            )
            .unwrap();
        assert!(world.npcs.despawn(&world.maps, id).is_some());
        assert_eq!(world.maps.get_tile_occupant(1, 5, 5), None);
    }

    #[test]
    fn nearby_filters_by_map_and_range() {
        let registry = PlayerRegistry::new();
        registry.insert(Player::new(1, "a", TileKey::new(1, 10, 10)));
        registry.insert(Player::new(2, "b", TileKey::new(1, 13, 10)));
        registry.insert(Player::new(3, "c", TileKey::new(1, 30, 30)));
        registry.insert(Player::new(4, "d", TileKey::new(2, 10, 10)));

        assert_eq!(registry.nearby(TileKey::new(1, 10, 10), 5, Some(1)), vec![2]);
    }

    /// Missing fields take defaults; a missing file means no spawns.
    #[test]
    fn spawn_file_parsing() {
        let path = temp_path("npc_spawns");
        std::fs::write(&path, r#"[{"npc": 5, "map": 1, "x": 3, "y": 4}]"#).unwrap();
        let spawns = load_npc_spawns(&path).unwrap();
        assert_eq!(spawns.len(), 1);
        assert!(!spawns[0].hostile);
        assert_eq!(spawns[0].wander_radius, DEFAULT_WANDER_RADIUS);
        std::fs::remove_file(&path).unwrap();

        assert!(load_npc_spawns(&path).unwrap().is_empty());
    }

    #[test]
    fn malformed_spawn_file_is_an_error() {
        let path = temp_path("npc_spawns_bad");
        std::fs::write(&path, "[{").unwrap();
        assert!(load_npc_spawns(&path).is_err());
        std::fs::remove_file(&path).unwrap();
    }
}
