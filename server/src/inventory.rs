//! Inventory seam.
//!
//! Inventory rules (weights, equipment, banks) live outside the world core.
//! Tasks only need to take a stack out of a slot and give one back, which is
//! what [`InventoryService`] offers. [`MemoryInventory`] is a plain slot
//! array per user.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use realm_core::constants::INVENTORY_SLOTS;
use realm_core::types::ItemStack;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    #[error("slot {0} is empty")]
    EmptySlot(u8),
    #[error("slot {0} does not exist")]
    InvalidSlot(u8),
    #[error("slot holds {available}, asked for {requested}")]
    NotEnough { available: u16, requested: u16 },
    #[error("inventory is full")]
    Full,
    #[error("inventory unavailable: {0}")]
    Unavailable(String),
}

/// Result of a change to one slot: where, and what is left there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotChange {
    pub slot: u8,
    pub remaining: Option<ItemStack>,
}

#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Remove `amount` from `slot`. `amount` 0 takes the whole stack.
    async fn take_from_slot(
        &self,
        user_id: u32,
        slot: u8,
        amount: u16,
    ) -> Result<(ItemStack, SlotChange), InventoryError>;

    /// Put `stack` into the inventory, merging with a stack of the same
    /// item when it fits.
    async fn give(&self, user_id: u32, stack: ItemStack) -> Result<SlotChange, InventoryError>;
}

type Slots = Vec<Option<ItemStack>>;

#[derive(Debug, Default)]
pub struct MemoryInventory {
    users: Mutex<HashMap<u32, Slots>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slot(&self, user_id: u32, slot: u8) -> Option<ItemStack> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get(&user_id)?.get(slot as usize).copied().flatten()
    }

    /// Overwrite one slot; used to seed test characters.
    pub fn set_slot(&self, user_id: u32, slot: u8, stack: Option<ItemStack>) {
        if slot >= INVENTORY_SLOTS {
            return;
        }
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let slots = users.entry(user_id).or_insert_with(empty_slots);
        slots[slot as usize] = stack;
    }
}

fn empty_slots() -> Slots {
    vec![None; INVENTORY_SLOTS as usize]
}

#[async_trait]
impl InventoryService for MemoryInventory {
    async fn take_from_slot(
        &self,
        user_id: u32,
        slot: u8,
        amount: u16,
    ) -> Result<(ItemStack, SlotChange), InventoryError> {
        if slot >= INVENTORY_SLOTS {
            return Err(InventoryError::InvalidSlot(slot));
        }
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let slots = users.entry(user_id).or_insert_with(empty_slots);
        let stack = slots[slot as usize].ok_or(InventoryError::EmptySlot(slot))?;

        let amount = if amount == 0 { stack.quantity() } else { amount };
        if amount > stack.quantity() {
            return Err(InventoryError::NotEnough {
                available: stack.quantity(),
                requested: amount,
            });
        }

        let (taken, remaining) = stack.split(amount);
        let taken = taken.ok_or(InventoryError::EmptySlot(slot))?;
        slots[slot as usize] = remaining;
        Ok((taken, SlotChange { slot, remaining }))
    }

    async fn give(&self, user_id: u32, stack: ItemStack) -> Result<SlotChange, InventoryError> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let slots = users.entry(user_id).or_insert_with(empty_slots);

        let merge = slots.iter().position(|s| {
            s.is_some_and(|held| {
                held.item_id() == stack.item_id()
                    && held.quantity().checked_add(stack.quantity()).is_some()
            })
        });
        if let Some(index) = merge {
            let merged = slots[index].and_then(|held| {
                ItemStack::new(held.item_id(), held.quantity() + stack.quantity())
            });
            slots[index] = merged;
            return Ok(SlotChange {
                slot: index as u8,
                remaining: merged,
            });
        }

        let index = slots
            .iter()
            .position(Option::is_none)
            .ok_or(InventoryError::Full)?;
        slots[index] = Some(stack);
        Ok(SlotChange {
            slot: index as u8,
            remaining: Some(stack),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(id: u16, qty: u16) -> ItemStack {
        ItemStack::new(id, qty).unwrap()
    }

    #[tokio::test]
    async fn take_part_of_a_stack() {
        let inv = MemoryInventory::new();
        inv.set_slot(1, 3, Some(stack(50, 10)));

        let (taken, change) = inv.take_from_slot(1, 3, 4).await.unwrap();
        assert_eq!(taken, stack(50, 4));
        assert_eq!(change.remaining, Some(stack(50, 6)));
        assert_eq!(inv.slot(1, 3), Some(stack(50, 6)));
    }

    /// Amount zero takes everything and empties the slot.
    #[tokio::test]
    async fn take_whole_stack() {
        let inv = MemoryInventory::new();
        inv.set_slot(1, 0, Some(stack(50, 2)));
        let (taken, change) = inv.take_from_slot(1, 0, 0).await.unwrap();
        assert_eq!(taken, stack(50, 2));
        assert_eq!(change.remaining, None);
        assert_eq!(inv.slot(1, 0), None);
    }

    #[tokio::test]
    async fn take_errors() {
        let inv = MemoryInventory::new();
        inv.set_slot(1, 0, Some(stack(50, 2)));
        assert_eq!(
            inv.take_from_slot(1, 1, 1).await,
            Err(InventoryError::EmptySlot(1))
        );
        assert_eq!(
            inv.take_from_slot(1, INVENTORY_SLOTS, 1).await,
            Err(InventoryError::InvalidSlot(INVENTORY_SLOTS))
        );
        assert!(matches!(
            inv.take_from_slot(1, 0, 3).await,
            Err(InventoryError::NotEnough { .. })
        ));
    }

    /// Giving merges into an existing stack of the same item.
    #[tokio::test]
    async fn give_merges_then_fills_empty_slot() {
        let inv = MemoryInventory::new();
        inv.set_slot(1, 5, Some(stack(7, 1)));

        let change = inv.give(1, stack(7, 2)).await.unwrap();
        assert_eq!(change.slot, 5);
        assert_eq!(inv.slot(1, 5), Some(stack(7, 3)));

        let change = inv.give(1, stack(8, 1)).await.unwrap();
        assert_eq!(change.slot, 0);
    }

    #[tokio::test]
    async fn give_to_full_inventory_fails() {
        let inv = MemoryInventory::new();
        for slot in 0..INVENTORY_SLOTS {
            inv.set_slot(1, slot, Some(stack(1, u16::MAX)));
        }
        assert_eq!(inv.give(1, stack(2, 1)).await, Err(InventoryError::Full));
    }
}
