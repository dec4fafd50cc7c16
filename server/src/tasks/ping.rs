//! `PING`: keep-alive, answered before or after login.

use async_trait::async_trait;
use realm_core::protocol::{ClientOpcode, ServerMessage};

use super::{Task, TaskContext, TaskError};
use crate::session::Session;

pub struct PingTask;

#[async_trait]
impl Task for PingTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::Ping
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        _payload: &[u8],
    ) -> Result<(), TaskError> {
        ctx.reply(session, ServerMessage::Pong)
    }
}
