//! Item definitions: what an item id looks like on the ground.
//!
//! Definitions live in a JSON array next to the other data files:
//!
//! ```text
//! [{"id": 50, "name": "Iron Ore", "graphic": 1050}]
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// Drawn for items that have no definition.
pub const UNKNOWN_ITEM_GRAPHIC: u32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemDefinition {
    pub id: u16,
    #[serde(default)]
    pub name: String,
    pub graphic: u32,
}

/// Item id → definition.
#[derive(Debug, Clone, Default)]
pub struct ItemCatalog {
    items: HashMap<u16, ItemDefinition>,
}

impl ItemCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later definitions of the same id replace earlier ones.
    pub fn from_definitions(definitions: impl IntoIterator<Item = ItemDefinition>) -> Self {
        let mut items = HashMap::new();
        for definition in definitions {
            if let Some(previous) = items.insert(definition.id, definition) {
                log::warn!("Item {} defined twice; keeping the later one", previous.id);
            }
        }
        Self { items }
    }

    pub fn get(&self, item_id: u16) -> Option<&ItemDefinition> {
        self.items.get(&item_id)
    }

    /// Ground graphic of `item_id`, or [`UNKNOWN_ITEM_GRAPHIC`].
    pub fn graphic(&self, item_id: u16) -> u32 {
        match self.items.get(&item_id) {
            Some(definition) => definition.graphic,
            None => {
                log::warn!("No definition for item {item_id}; drawing it as unknown");
                UNKNOWN_ITEM_GRAPHIC
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read the item definitions. A missing file means an empty catalog.
pub fn load_item_catalog(path: &Path) -> Result<ItemCatalog, String> {
    if !path.exists() {
        log::info!("No item definitions at {}", path.display());
        return Ok(ItemCatalog::new());
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let definitions: Vec<ItemDefinition> = serde_json::from_str(&text)
        .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?;
    let catalog = ItemCatalog::from_definitions(definitions);
    log::info!("Loaded {} item definitions", catalog.len());
    Ok(catalog)
}
