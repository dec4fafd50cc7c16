//! `LOOK`: describe a tile in view.

use async_trait::async_trait;
use realm_core::constants::VIEW_DISTANCE;
use realm_core::protocol::ClientOpcode;
use realm_core::types::{Occupant, Position};

use super::{read_xy, Task, TaskContext, TaskError};
use crate::session::Session;

pub struct LookTask;

impl LookTask {
    /// Console lines for whatever stands or lies on a tile.
    fn describe(ctx: &TaskContext, map: u16, x: u16, y: u16) -> Vec<String> {
        let maps = &ctx.world.maps;
        let mut lines = Vec::new();

        match maps.get_tile_occupant(map, x, y) {
            Some(Occupant::Player(id)) => match ctx.world.players.get(id) {
                Some(player) => lines.push(format!("You see {}.", player.name)),
                None => lines.push("You see someone.".to_string()),
            },
            Some(Occupant::Npc(_)) => lines.push("You see a creature.".to_string()),
            None => {}
        }
        if let Some(kind) = maps.has_resource(map, x, y) {
            lines.push(format!("You see a {}.", kind.name()));
        }
        if maps.sign_at(map, x, y).is_some() {
            lines.push("You see a sign.".to_string());
        }
        if maps.door_at(map, x, y).is_some() {
            lines.push("You see a door.".to_string());
        }
        if maps.is_water(map, x, y) {
            lines.push("You see water.".to_string());
        }
        match maps.get_ground_items(map, x, y).len() {
            0 => {}
            1 => lines.push("There is an item on the ground.".to_string()),
            n => lines.push(format!("There are {n} items on the ground.")),
        }
        lines
    }
}

#[async_trait]
impl Task for LookTask {
    fn opcode(&self) -> ClientOpcode {
        ClientOpcode::Look
    }

    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        payload: &[u8],
    ) -> Result<(), TaskError> {
        let (x, y) = read_xy(ClientOpcode::Look, payload)?;
        let player = ctx.player(session)?;
        let here = player.position;

        let Some(target) = Position::new(x, y).filter(Position::in_bounds) else {
            return ctx.tell(session, "There is nothing here.");
        };
        if here.position().distance(target) > VIEW_DISTANCE {
            return ctx.tell(session, "You are too far away.");
        }

        let lines = Self::describe(ctx, here.map, x, y);
        if lines.is_empty() {
            return ctx.tell(session, "There is nothing here.");
        }
        for line in &lines {
            ctx.tell(session, line)?;
        }
        Ok(())
    }
}
