//! `LOGIN`: trade a one-shot ticket for a place in the world.

use async_trait::async_trait;
use realm_core::byte_operations::ByteReader;
use realm_core::protocol::{ClientOpcode, ServerMessage};
use realm_core::types::Occupant;

use super::{Collaborator, Task, TaskContext, TaskError};
use crate::session::Session;

pub struct LoginTask;

#[async_trait]
impl Task for LoginTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::Login
    }

    fn collaborators(&self) -> &'static [Collaborator] {
        &[Collaborator::Sender, Collaborator::Authenticator]
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        payload: &[u8],
    ) -> Result<(), TaskError> {
        let ticket = ByteReader::new(payload)
            .read_u64()
            .ok_or_else(|| TaskError::Malformed {
                opcode: ClientOpcode::Login,
                reason: "missing ticket".to_string(),
            })?;

        if let Some(user_id) = session.user_id {
            log::warn!(
                "Connection {} sent a second login while logged in as user {user_id}",
                session.connection_id
            );
            return Ok(());
        }

        let consumed = ctx
            .bounded("login ticket", ctx.authenticator()?.consume_ticket(ticket))
            .await?
            .map_err(TaskError::Collaborator)?;
        let Some(user_id) = consumed else {
            log::warn!(
                "Connection {}: rejected login ticket",
                session.connection_id
            );
            return Ok(());
        };

        let Some(tile) = ctx
            .world
            .enter_player(user_id, &format!("player{user_id}"), ctx.start)
        else {
            log::warn!("No free tile near the start position for user {user_id}");
            return ctx.tell(session, "The world is crowded here. Please try again later.");
        };

        session.user_id = Some(user_id);
        let sender = ctx.sender()?;
        sender.bind_user(session.connection_id, user_id);

        sender.send(
            user_id,
            ServerMessage::LoginOk {
                user_id,
                map: tile.map,
                x: tile.x,
                y: tile.y,
            },
        );
        if let Some(player) = ctx.world.players.get(user_id) {
            sender.send(
                user_id,
                ServerMessage::UpdateStamina {
                    stamina: player.stamina,
                    max_stamina: player.max_stamina,
                },
            );
            sender.send(
                user_id,
                ServerMessage::UpdateHungerThirst {
                    hunger: player.hunger,
                    thirst: player.thirst,
                },
            );
            sender.send(user_id, ServerMessage::UpdateGold { gold: player.gold });
        }

        ctx.broadcast(
            tile,
            Some(user_id),
            &ServerMessage::CharacterMove {
                entity: Occupant::Player(user_id),
                x: tile.x,
                y: tile.y,
            },
        )?;
        log::info!("User {user_id} logged in on connection {}", session.connection_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_manager::Recipient;
    use crate::tasks::dispatch;
    use crate::tasks::test_support::{harness, logged_in};
    use realm_core::types::TileKey;

    fn login_payload(ticket: u64) -> Vec<u8> {
        ticket.to_le_bytes().to_vec()
    }

    /// A valid ticket places the player at the start tile.
    #[tokio::test]
    async fn valid_ticket_logs_in() {
        let h = harness();
        h.auth.issue(555, 7);
        let mut session = Session::new(3);

        dispatch(&h.ctx, &mut session, ClientOpcode::Login as u8, &login_payload(555))
            .await
            .unwrap();

        assert_eq!(session.user_id, Some(7));
        assert_eq!(h.sender.bound_user(3), Some(7));
        assert_eq!(
            h.ctx.world.maps.get_tile_occupant(1, 10, 10),
            Some(Occupant::Player(7))
        );
        let sent = h.sender.take(7);
        assert_eq!(
            sent[0],
            ServerMessage::LoginOk {
                user_id: 7,
                map: 1,
                x: 10,
                y: 10
            }
        );
        assert_eq!(sent.len(), 4);
    }

    /// Bad tickets leave the session logged out and say nothing.
    #[tokio::test]
    async fn unknown_ticket_is_ignored() {
        let h = harness();
        let mut session = Session::new(3);
        dispatch(&h.ctx, &mut session, ClientOpcode::Login as u8, &login_payload(1))
            .await
            .unwrap();
        assert!(!session.is_authenticated());
        assert!(h.sender.sent().is_empty());
        assert!(h.ctx.world.players.is_empty());
    }

    /// Tickets are single use.
    #[tokio::test]
    async fn ticket_cannot_be_replayed() {
        let h = harness();
        h.auth.issue(42, 8);
        let mut first = Session::new(1);
        let mut second = Session::new(2);
        dispatch(&h.ctx, &mut first, ClientOpcode::Login as u8, &login_payload(42))
            .await
            .unwrap();
        dispatch(&h.ctx, &mut second, ClientOpcode::Login as u8, &login_payload(42))
            .await
            .unwrap();
        assert_eq!(first.user_id, Some(8));
        assert_eq!(second.user_id, None);
    }

    /// Players already nearby see the newcomer appear.
    #[tokio::test]
    async fn nearby_players_see_the_newcomer() {
        let h = harness();
        let _watcher = logged_in(&h, 1, 13, 13);
        h.auth.issue(77, 2);
        let mut session = Session::new(20);
        dispatch(&h.ctx, &mut session, ClientOpcode::Login as u8, &login_payload(77))
            .await
            .unwrap();

        let tile = h.ctx.world.players.get(2).unwrap().position;
        assert_eq!(tile, TileKey::new(1, 10, 10));
        assert_eq!(
            h.sender.take(1),
            vec![ServerMessage::CharacterMove {
                entity: Occupant::Player(2),
                x: 10,
                y: 10
            }]
        );
        assert!(h.sender.take_for(Recipient::Connection(20)).is_empty());
    }

    /// Logging in again hands the player to the new connection; the old
    /// session can no longer act for them.
    #[tokio::test]
    async fn relogin_retires_the_old_session() {
        let h = harness();
        h.auth.issue(1, 7);
        h.auth.issue(2, 7);
        let mut old = Session::new(1);
        let mut new = Session::new(2);
        dispatch(&h.ctx, &mut old, ClientOpcode::Login as u8, &login_payload(1))
            .await
            .unwrap();
        dispatch(&h.ctx, &mut new, ClientOpcode::Login as u8, &login_payload(2))
            .await
            .unwrap();
        assert_eq!(h.sender.bound_user(2), Some(7));
        assert_eq!(h.sender.bound_user(1), None);
        h.sender.take_for(Recipient::Connection(1));
        h.sender.take_for(Recipient::Connection(2));

        let result = dispatch(&h.ctx, &mut old, ClientOpcode::Walk as u8, &[2]).await;
        assert!(matches!(result, Err(TaskError::Superseded(7))));
        assert_eq!(old.user_id, None);
        assert_eq!(
            h.ctx.world.players.get(7).unwrap().position,
            TileKey::new(1, 10, 10)
        );
        assert!(h.sender.take_for(Recipient::Connection(1)).is_empty());

        dispatch(&h.ctx, &mut new, ClientOpcode::Walk as u8, &[2])
            .await
            .unwrap();
        assert_eq!(
            h.ctx.world.players.get(7).unwrap().position,
            TileKey::new(1, 11, 10)
        );
    }
}
