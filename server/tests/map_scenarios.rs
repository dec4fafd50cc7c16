//! Map manager scenarios driven through the public API.

use realm_core::types::{GroundItem, ItemStack, Occupant, Position};
use tilerealm_server::map_cache::{MapResourceSet, MapResources};
use tilerealm_server::map_manager::MapManager;

fn manager(max_items_per_tile: usize) -> MapManager {
    let mut set = MapResourceSet::default();
    set.blocked.insert((10, 10));
    set.water.insert((10, 10));
    set.trees.insert((30, 30));
    set.blocked.insert((30, 30));
    let mut resources = MapResources::default();
    resources.maps.insert(1, set);
    MapManager::new(resources, max_items_per_tile)
}

fn coin(quantity: u16) -> GroundItem {
    GroundItem::new(ItemStack::new(1, quantity).unwrap(), 1)
}

/// User 7 steps from (49,50) onto a free tile (50,50).
#[test]
fn player_moves_onto_free_tile() {
    let maps = manager(10);
    let old = Position::new(49, 50).unwrap();
    let new = Position::new(50, 50).unwrap();
    maps.update_player_tile(7, 1, None, old);

    assert!(maps.can_move_to(1, 50, 50));
    maps.update_player_tile(7, 1, Some(old), new);

    assert_eq!(maps.get_tile_occupant(1, 50, 50), Some(Occupant::Player(7)));
    assert_eq!(maps.get_tile_occupant(1, 50, 50).unwrap().to_string(), "player:7");
    assert_eq!(maps.get_tile_occupant(1, 49, 50), None);
    assert!(!maps.can_move_to(1, 50, 50));
}

#[test]
fn movement_is_refused_off_map_blocked_or_occupied() {
    let maps = manager(10);
    maps.update_npc_tile(3, 1, None, Position::new(20, 20).unwrap());

    assert!(!maps.can_move_to(1, 0, 5));
    assert!(!maps.can_move_to(1, 101, 5));
    assert!(!maps.can_move_to(1, 5, 101));
    assert!(!maps.can_move_to(1, 10, 10));
    assert!(!maps.can_move_to(1, 20, 20));
    assert!(maps.can_move_to(1, 21, 20));
    assert!(maps.can_move_to(1, 100, 100));
}

/// Maps without static data are open ground.
#[test]
fn unknown_map_is_walkable() {
    let maps = manager(10);
    assert!(maps.is_walkable(99, 10, 10));
    assert!(!maps.is_blocked(99, 10, 10));
    assert!(maps.can_move_to(99, 10, 10));
}

#[test]
fn terrain_queries() {
    let maps = manager(10);
    assert!(maps.is_water(1, 10, 10));
    assert!(!maps.is_walkable(1, 10, 10));
    assert!(maps.has_resource(1, 30, 30).is_some());
    assert!(maps.has_resource(1, 31, 30).is_none());
}

/// With a cap of two the third item is refused.
#[test]
fn ground_items_are_capped_per_tile() {
    let maps = manager(2);
    assert!(maps.add_ground_item(1, 5, 5, coin(1)));
    assert!(maps.add_ground_item(1, 5, 5, coin(2)));
    assert!(!maps.add_ground_item(1, 5, 5, coin(3)));

    let items = maps.get_ground_items(1, 5, 5);
    assert_eq!(items, vec![coin(1), coin(2)]);
}

#[test]
fn removing_the_last_item_drops_the_tile() {
    let maps = manager(10);
    maps.add_ground_item(1, 5, 5, coin(1));
    maps.add_ground_item(1, 6, 5, coin(1));
    assert_eq!(maps.get_ground_items_count(1), 2);

    assert_eq!(maps.remove_ground_item(1, 5, 5, None), Some(coin(1)));
    assert_eq!(maps.get_ground_items_count(1), 1);
    assert_eq!(maps.remove_ground_item(1, 5, 5, None), None);
    assert_eq!(maps.remove_ground_item(1, 6, 5, Some(4)), None);
    assert_eq!(maps.remove_ground_item(1, 77, 77, None), None);
}
