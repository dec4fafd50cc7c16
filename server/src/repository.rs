//! Persistence seam for ground items.
//!
//! The map manager never talks to a database directly. It is handed an
//! implementation of [`GroundItemRepository`] at start-up: KeyDB in
//! production ([`crate::keydb_store::KeyDbGroundItemStore`]) or
//! [`MemoryGroundItemStore`] in tests and when persistence is disabled.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ground_items::GroundItemSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("store is not connected")]
    Disconnected,
}

#[async_trait]
pub trait GroundItemRepository: Send + Sync {
    /// Replace the stored ground items of `map_id` with `items`.
    async fn save_ground_items(
        &self,
        map_id: u16,
        items: &GroundItemSnapshot,
    ) -> Result<(), StoreError>;

    /// Stored ground items of `map_id`; empty when nothing was saved.
    async fn load_ground_items(&self, map_id: u16) -> Result<GroundItemSnapshot, StoreError>;
}

/// In-process repository. Optionally fails every save, for exercising error
/// paths.
#[derive(Debug, Default)]
pub struct MemoryGroundItemStore {
    maps: Mutex<HashMap<u16, GroundItemSnapshot>>,
    fail_saves: bool,
    saves: Mutex<u64>,
}

impl MemoryGroundItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_saves: true,
            ..Self::default()
        }
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        *self.saves.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stored(&self, map_id: u16) -> Option<GroundItemSnapshot> {
        self.maps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&map_id)
            .cloned()
    }
}

#[async_trait]
impl GroundItemRepository for MemoryGroundItemStore {
    async fn save_ground_items(
        &self,
        map_id: u16,
        items: &GroundItemSnapshot,
    ) -> Result<(), StoreError> {
        if self.fail_saves {
            return Err(StoreError::Backend("memory store configured to fail".into()));
        }
        self.maps
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(map_id, items.clone());
        *self.saves.lock().unwrap_or_else(|e| e.into_inner()) += 1;
        Ok(())
    }

    async fn load_ground_items(&self, map_id: u16) -> Result<GroundItemSnapshot, StoreError> {
        Ok(self.stored(map_id).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use realm_core::types::{GroundItem, ItemStack, Position};

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryGroundItemStore::new();
        let mut snapshot = GroundItemSnapshot::new();
        snapshot.insert(
            Position { x: 4, y: 4 },
            vec![GroundItem::new(ItemStack::new(12, 3).unwrap(), 500)],
        );

        store.save_ground_items(3, &snapshot).await.unwrap();
        assert_eq!(store.load_ground_items(3).await.unwrap(), snapshot);
        assert!(store.load_ground_items(4).await.unwrap().is_empty());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn failing_store_reports_errors() {
        let store = MemoryGroundItemStore::failing();
        let result = store.save_ground_items(1, &GroundItemSnapshot::new()).await;
        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(store.save_count(), 0);
    }
}
