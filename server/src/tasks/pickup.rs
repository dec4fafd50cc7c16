//! `PICKUP`: take the top item from the player's tile.

use async_trait::async_trait;
use realm_core::protocol::{ClientOpcode, ServerMessage};

use super::drop::slot_message;
use super::{Collaborator, Task, TaskContext, TaskError};
use crate::inventory::InventoryError;
use crate::session::Session;

pub struct PickUpTask;

#[async_trait]
impl Task for PickUpTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::PickUp
    }

    fn collaborators(&self) -> &'static [Collaborator] {
        &[Collaborator::Sender, Collaborator::Inventory]
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        _payload: &[u8],
    ) -> Result<(), TaskError> {
        let player = ctx.player(session)?;
        let tile = player.position;
        let maps = &ctx.world.maps;

        // The slot stays held until the inventory answers.
        let Some(item) = maps.take_ground_item(tile.map, tile.x, tile.y) else {
            return ctx.tell(session, "There is nothing here.");
        };

        let given = ctx
            .bounded(
                "inventory give",
                ctx.inventory()?.give(player.user_id, item.stack),
            )
            .await;
        let change = match given {
            Ok(Ok(change)) => {
                maps.release_ground_item(tile.map, tile.x, tile.y);
                change
            }
            Ok(Err(e)) => {
                maps.restore_ground_item(tile.map, tile.x, tile.y, item);
                return match e {
                    InventoryError::Full => ctx.tell(session, "You cannot carry any more."),
                    other => Err(TaskError::Collaborator(other.to_string())),
                };
            }
            Err(timeout) => {
                maps.restore_ground_item(tile.map, tile.x, tile.y, item);
                return Err(timeout);
            }
        };

        ctx.reply(session, slot_message(change))?;
        let remaining = maps.get_ground_items(tile.map, tile.x, tile.y);
        let update = match remaining.first() {
            Some(top) => ServerMessage::ObjectCreate {
                x: tile.x,
                y: tile.y,
                graphic: top.graphic,
            },
            None => ServerMessage::ObjectDelete { x: tile.x, y: tile.y },
        };
        ctx.broadcast(tile, None, &update)?;
        Ok(())
    }
}
