//! `WALK`: one step in a heading.

use async_trait::async_trait;
use realm_core::protocol::{ClientOpcode, ServerMessage};
use realm_core::types::{Heading, Occupant, TileKey};

use super::{Task, TaskContext, TaskError};
use crate::session::Session;

pub struct WalkTask;

/// Read the heading byte every movement packet starts with.
pub(super) fn read_heading(opcode: ClientOpcode, payload: &[u8]) -> Result<Heading, TaskError> {
    let raw = payload.first().copied().unwrap_or(0);
    Heading::from_u8(raw).ok_or_else(|| TaskError::Malformed {
        opcode,
        reason: format!("invalid heading {raw}"),
    })
}

#[async_trait]
impl Task for WalkTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::Walk
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        payload: &[u8],
    ) -> Result<(), TaskError> {
        let heading = read_heading(ClientOpcode::Walk, payload)?;
        let player = ctx.player(session)?;
        let from = player.position;
        let user_id = player.user_id;

        let moved_to = from
            .position()
            .step(heading)
            .filter(|to| {
                ctx.world
                    .maps
                    .try_move(Occupant::Player(user_id), from.map, Some(from.position()), *to)
            })
            .map(|to| TileKey::at(from.map, to));

        let Some(to) = moved_to else {
            ctx.world.players.with_player_mut(user_id, |p| p.heading = heading);
            // Snap the client back to where the server has it.
            return ctx.reply(session, ServerMessage::PositionUpdate { x: from.x, y: from.y });
        };

        ctx.world.players.with_player_mut(user_id, |p| {
            p.position = to;
            p.heading = heading;
        });
        ctx.reply(session, ServerMessage::PositionUpdate { x: to.x, y: to.y })?;
        ctx.broadcast(
            to,
            Some(user_id),
            &ServerMessage::CharacterMove {
                entity: Occupant::Player(user_id),
                x: to.x,
                y: to.y,
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_manager::Recipient;
    use crate::tasks::dispatch;
    use crate::tasks::test_support::{harness, logged_in};

    async fn walk(h: &crate::tasks::test_support::Harness, session: &mut Session, heading: Heading) {
        dispatch(&h.ctx, session, ClientOpcode::Walk as u8, &[heading.as_u8()])
            .await
            .unwrap();
    }

    /// A free step moves the occupant entry and tells both sides.
    #[tokio::test]
    async fn walk_moves_player() {
        let h = harness();
        let mut session = logged_in(&h, 1, 10, 10);
        let _watcher = logged_in(&h, 2, 15, 10);

        walk(&h, &mut session, Heading::East).await;

        let maps = &h.ctx.world.maps;
        assert_eq!(maps.get_tile_occupant(1, 11, 10), Some(Occupant::Player(1)));
        assert_eq!(maps.get_tile_occupant(1, 10, 10), None);
        assert_eq!(h.ctx.world.players.get(1).unwrap().position, TileKey::new(1, 11, 10));
        assert_eq!(
            h.sender.take_for(Recipient::Connection(1)),
            vec![ServerMessage::PositionUpdate { x: 11, y: 10 }]
        );
        assert_eq!(
            h.sender.take(2),
            vec![ServerMessage::CharacterMove {
                entity: Occupant::Player(1),
                x: 11,
                y: 10
            }]
        );
    }

    /// Walking into a blocked tile leaves the player in place.
    #[tokio::test]
    async fn blocked_step_snaps_back() {
        let h = harness();
        let mut session = logged_in(&h, 1, 11, 10);
        walk(&h, &mut session, Heading::South).await;

        let player = h.ctx.world.players.get(1).unwrap();
        assert_eq!(player.position, TileKey::new(1, 11, 10));
        assert_eq!(player.heading, Heading::South);
        assert_eq!(
            h.sender.take_for(Recipient::Connection(1)),
            vec![ServerMessage::PositionUpdate { x: 11, y: 10 }]
        );
    }

    /// Two players never share a tile.
    #[tokio::test]
    async fn occupied_tile_is_refused() {
        let h = harness();
        let mut session = logged_in(&h, 1, 10, 10);
        let _other = logged_in(&h, 2, 10, 9);
        walk(&h, &mut session, Heading::North).await;
        assert_eq!(
            h.ctx.world.maps.get_tile_occupant(1, 10, 9),
            Some(Occupant::Player(2))
        );
        assert_eq!(h.ctx.world.players.get(1).unwrap().position, TileKey::new(1, 10, 10));
    }

    #[tokio::test]
    async fn invalid_heading_is_malformed() {
        let h = harness();
        let mut session = logged_in(&h, 1, 10, 10);
        let result = dispatch(&h.ctx, &mut session, ClientOpcode::Walk as u8, &[9]).await;
        assert!(matches!(result, Err(TaskError::Malformed { .. })));
    }
}
