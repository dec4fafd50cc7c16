//! `CHANGE_HEADING`: turn without moving.

use async_trait::async_trait;
use realm_core::protocol::{ClientOpcode, ServerMessage};
use realm_core::types::Occupant;

use super::walk::read_heading;
use super::{Task, TaskContext, TaskError};
use crate::session::Session;

pub struct HeadingTask;

#[async_trait]
impl Task for HeadingTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::ChangeHeading
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        payload: &[u8],
    ) -> Result<(), TaskError> {
        let heading = read_heading(ClientOpcode::ChangeHeading, payload)?;
        let player = ctx.player(session)?;
        if player.heading == heading {
            return Ok(());
        }

        ctx.world
            .players
            .with_player_mut(player.user_id, |p| p.heading = heading);
        ctx.broadcast(
            player.position,
            Some(player.user_id),
            &ServerMessage::CharacterHeading {
                entity: Occupant::Player(player.user_id),
                heading,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::dispatch;
    use crate::tasks::test_support::{harness, logged_in};
    use realm_core::types::Heading;

    #[tokio::test]
    async fn turning_is_seen_by_neighbours() {
        let h = harness();
        let mut session = logged_in(&h, 1, 10, 10);
        let _watcher = logged_in(&h, 2, 10, 14);

        dispatch(
            &h.ctx,
            &mut session,
            ClientOpcode::ChangeHeading as u8,
            &[Heading::West.as_u8()],
        )
        .await
        .unwrap();

        assert_eq!(h.ctx.world.players.get(1).unwrap().heading, Heading::West);
        assert_eq!(
            h.sender.take(2),
            vec![ServerMessage::CharacterHeading {
                entity: Occupant::Player(1),
                heading: Heading::West
            }]
        );
        assert!(h.sender.take(1).is_empty());
    }

    /// Facing the current heading again sends nothing.
    #[tokio::test]
    async fn same_heading_is_a_no_op() {
        let h = harness();
        let mut session = logged_in(&h, 1, 10, 10);
        let _watcher = logged_in(&h, 2, 10, 14);
        let current = h.ctx.world.players.get(1).unwrap().heading;

        dispatch(
            &h.ctx,
            &mut session,
            ClientOpcode::ChangeHeading as u8,
            &[current.as_u8()],
        )
        .await
        .unwrap();
        assert!(h.sender.sent().is_empty());
    }
}
