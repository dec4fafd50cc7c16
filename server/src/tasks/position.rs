//! `REQUEST_POSITION`: resend where the server has the player.

use async_trait::async_trait;
use realm_core::protocol::{ClientOpcode, ServerMessage};

use super::{Task, TaskContext, TaskError};
use crate::session::Session;

pub struct PositionTask;

#[async_trait]
impl Task for PositionTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::RequestPosition
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        _payload: &[u8],
    ) -> Result<(), TaskError> {
        let tile = ctx.player(session)?.position;
        ctx.reply(session, ServerMessage::PositionUpdate { x: tile.x, y: tile.y })
    }
}
