//! Ground items written by the background saver survive a restart.

use std::sync::Arc;
use std::time::Duration;

use realm_core::types::{GroundItem, ItemStack, Position};
use tilerealm_server::background_saver;
use tilerealm_server::map_cache::MapResources;
use tilerealm_server::map_manager::MapManager;
use tilerealm_server::repository::{GroundItemRepository, MemoryGroundItemStore};

const TIMEOUT: Duration = Duration::from_millis(500);

fn item(item_id: u16, quantity: u16) -> GroundItem {
    GroundItem::new(ItemStack::new(item_id, quantity).unwrap(), item_id as u32)
}

fn persistent_maps(
    store: &Arc<MemoryGroundItemStore>,
    saver: &background_saver::BackgroundSaver,
) -> MapManager {
    let repository: Arc<dyn GroundItemRepository> = store.clone();
    MapManager::new(MapResources::default(), 10).with_persistence(repository, saver.queue(), TIMEOUT)
}

#[tokio::test]
async fn saved_items_reload_into_a_new_manager() {
    let store = Arc::new(MemoryGroundItemStore::new());
    let mut saver = background_saver::spawn(store.clone(), 16, TIMEOUT);

    let maps = persistent_maps(&store, &saver);
    assert!(maps.add_ground_item(1, 5, 5, item(10, 3)));
    assert!(maps.add_ground_item(1, 5, 5, item(11, 1)));
    assert!(maps.add_ground_item(1, 9, 2, item(12, 7)));
    assert!(maps.remove_ground_item(1, 9, 2, None).is_some());
    saver.flush().await.unwrap();

    let stored = store.stored(1).unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored.get(&Position::new(5, 5).unwrap()),
        Some(&vec![item(10, 3), item(11, 1)])
    );

    let restarted = persistent_maps(&store, &saver);
    assert_eq!(restarted.load_ground_items(1).await.unwrap(), 1);
    assert_eq!(
        restarted.get_ground_items(1, 5, 5),
        vec![item(10, 3), item(11, 1)]
    );
    assert!(restarted.get_ground_items(1, 9, 2).is_empty());

    saver.shutdown().await;
    assert_eq!(saver.counters().failed, 0);
}

/// Save failures are counted and never reach the mutating caller.
#[tokio::test]
async fn failed_saves_are_counted() {
    let store = Arc::new(MemoryGroundItemStore::failing());
    let mut saver = background_saver::spawn(store.clone(), 16, TIMEOUT);
    let maps = persistent_maps(&store, &saver);

    assert!(maps.add_ground_item(2, 1, 1, item(10, 1)));
    assert!(maps.add_ground_item(2, 1, 2, item(10, 1)));
    saver.flush().await.unwrap();

    assert_eq!(saver.failed_saves(), 2);
    assert_eq!(store.save_count(), 0);
    assert_eq!(maps.get_ground_items_count(2), 2);
    saver.shutdown().await;
}

/// Without persistence, loading is a no-op.
#[tokio::test]
async fn load_without_persistence_is_empty() {
    let maps = MapManager::new(MapResources::default(), 10);
    assert_eq!(maps.load_ground_items(1).await.unwrap(), 0);
}
