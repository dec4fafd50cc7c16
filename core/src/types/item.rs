use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// An item id together with a strictly positive quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct ItemStack {
    item_id: u16,
    quantity: u16,
}

impl ItemStack {
    /// Returns `None` for the empty item id `0` or a zero quantity.
    pub fn new(item_id: u16, quantity: u16) -> Option<Self> {
        if item_id == 0 || quantity == 0 {
            return None;
        }
        Some(Self { item_id, quantity })
    }

    pub fn item_id(&self) -> u16 {
        self.item_id
    }

    pub fn quantity(&self) -> u16 {
        self.quantity
    }

    /// Split `amount` off this stack. Returns the detached part and the
    /// remainder (if any).
    pub fn split(self, amount: u16) -> (Option<ItemStack>, Option<ItemStack>) {
        let taken = amount.min(self.quantity);
        (
            ItemStack::new(self.item_id, taken),
            ItemStack::new(self.item_id, self.quantity - taken),
        )
    }
}

/// An item lying on a map tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Encode, Decode)]
pub struct GroundItem {
    pub stack: ItemStack,
    /// Graphic index the client draws for this object.
    pub graphic: u32,
}

impl GroundItem {
    pub fn new(stack: ItemStack, graphic: u32) -> Self {
        Self { stack, graphic }
    }
}
