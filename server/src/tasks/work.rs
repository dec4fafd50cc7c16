//! `WORK`: gather from an adjacent resource tile.

use async_trait::async_trait;
use realm_core::constants::WORK_STAMINA_COST;
use realm_core::protocol::{ClientOpcode, ServerMessage};
use realm_core::types::{ItemStack, Position};

use super::drop::slot_message;
use super::{read_xy, Collaborator, Task, TaskContext, TaskError};
use crate::inventory::InventoryError;
use crate::session::Session;
use crate::spatial::ResourceKind;

/// Item handed out for chopping a tree.
pub const LOG_ITEM: u16 = 101;
/// Item handed out for working a mine.
pub const ORE_ITEM: u16 = 102;

pub struct WorkTask;

fn yield_of(kind: ResourceKind) -> Option<ItemStack> {
    match kind {
        ResourceKind::Tree => ItemStack::new(LOG_ITEM, 1),
        ResourceKind::Mine => ItemStack::new(ORE_ITEM, 1),
        ResourceKind::Anvil | ResourceKind::Forge => None,
    }
}

#[async_trait]
impl Task for WorkTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::Work
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
        let (x, y) = read_xy(ClientOpcode::Work, payload)?;
        let player = ctx.player(session)?;
        let here = player.position;

        let Some(target) = Position::new(x, y) else {
            return ctx.tell(session, "There is nothing here to work.");
        };
        if here.position().distance(target) > 1 {
            return ctx.tell(session, "You are too far away.");
        }
        let Some(kind) = ctx.world.maps.has_resource(here.map, x, y) else {
            return ctx.tell(session, "There is nothing here to work.");
        };
        let Some(stack) = yield_of(kind) else {
            return ctx.tell(session, &format!("You need materials to use the {}.", kind.name()));
        };
        if player.stamina < WORK_STAMINA_COST {
            return ctx.tell(session, "You are too exhausted.");
        }

        let given = ctx
            .bounded("inventory give", ctx.inventory()?.give(player.user_id, stack))
            .await?;
        let change = match given {
            Ok(change) => change,
            Err(InventoryError::Full) => return ctx.tell(session, "You cannot carry any more."),
            Err(e) => return Err(TaskError::Collaborator(e.to_string())),
        };

        let heading = here.position().heading_to(target);
        let stamina = ctx
            .world
            .players
            .with_player_mut(player.user_id, |p| {
                p.stamina = p.stamina.saturating_sub(WORK_STAMINA_COST);
                if let Some(heading) = heading {
                    p.heading = heading;
                }
                (p.stamina, p.max_stamina)
            })
            .ok_or(TaskError::NotInWorld(player.user_id))?;

        ctx.reply(
            session,
            ServerMessage::UpdateStamina {
                stamina: stamina.0,
                max_stamina: stamina.1,
            },
        )?;
        ctx.reply(session, slot_message(change))?;
        ctx.tell(session, &format!("You work the {}.", kind.name()))
    }
}
