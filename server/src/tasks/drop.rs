//! `DROP`: put part of an inventory stack on the player's tile.

use async_trait::async_trait;
use realm_core::byte_operations::ByteReader;
use realm_core::protocol::{ClientOpcode, ServerMessage};
use realm_core::types::GroundItem;

use super::{Collaborator, Task, TaskContext, TaskError};
use crate::inventory::{InventoryError, SlotChange};
use crate::session::Session;

pub struct DropTask;

/// Client message for an inventory slot after a change.
pub(super) fn slot_message(change: SlotChange) -> ServerMessage {
    match change.remaining {
        Some(stack) => ServerMessage::InventorySlot {
            slot: change.slot,
            item_id: stack.item_id(),
            quantity: stack.quantity(),
        },
        None => ServerMessage::InventorySlot {
            slot: change.slot,
            item_id: 0,
            quantity: 0,
        },
    }
}

#[async_trait]
impl Task for DropTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::Drop
    }

    fn collaborators(&self) -> &'static [Collaborator] {
        &[Collaborator::Sender, Collaborator::Inventory]
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        payload: &[u8],
    ) -> Result<(), TaskError> {
        let mut reader = ByteReader::new(payload);
        let (Some(slot), Some(amount)) = (reader.read_u8(), reader.read_u16()) else {
            return Err(TaskError::Malformed {
                opcode: ClientOpcode::Drop,
                reason: "missing slot or amount".to_string(),
            });
        };

        let player = ctx.player(session)?;
        let tile = player.position;
        let maps = &ctx.world.maps;
        if maps.get_ground_items(tile.map, tile.x, tile.y).len() >= maps.max_items_per_tile() {
            return ctx.tell(session, "The ground here is full.");
        }

        let inventory = ctx.inventory()?;
        let taken = ctx
            .bounded(
                "inventory take",
                inventory.take_from_slot(player.user_id, slot, amount),
            )
            .await?;
        let (stack, change) = match taken {
            Ok(taken) => taken,
            Err(InventoryError::Unavailable(e)) => return Err(TaskError::Collaborator(e)),
            Err(InventoryError::NotEnough { .. }) => {
                return ctx.tell(session, "You do not have that many.")
            }
            Err(_) => return ctx.tell(session, "You have nothing there to drop."),
        };

        let item = GroundItem::new(stack, ctx.world.items.graphic(stack.item_id()));
        if !maps.add_ground_item(tile.map, tile.x, tile.y, item) {
            // Someone filled the tile since the check; hand the stack back.
            let lost = |reason: &dyn std::fmt::Display| {
                log::error!(
                    "Lost {}x item {} of user {}: {reason}",
                    stack.quantity(),
                    stack.item_id(),
                    player.user_id
                );
            };
            match ctx
                .bounded("inventory give", inventory.give(player.user_id, stack))
                .await
            {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => lost(&e),
                Err(timeout) => {
                    lost(&timeout);
                    return Err(timeout);
                }
            }
            return ctx.tell(session, "The ground here is full.");
        }

        ctx.reply(session, slot_message(change))?;
        ctx.broadcast(
            tile,
            None,
            &ServerMessage::ObjectCreate {
                x: tile.x,
                y: tile.y,
                graphic: item.graphic,
            },
        )?;
        Ok(())
    }
}
