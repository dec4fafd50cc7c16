//! Hunger and thirst decay.

use realm_core::protocol::ServerMessage;

use super::{Effect, EffectContext};

/// Lowers hunger and thirst of every online player by `amount` every
/// `interval` ticks, never below zero.
#[derive(Debug, Clone)]
pub struct HungerThirstEffect {
    pub interval: u64,
    pub amount: u16,
}

impl Default for HungerThirstEffect {
    fn default() -> Self {
        // One step per minute at 20 ticks per second.
        Self {
            interval: 20 * 60,
            amount: 10,
        }
    }
}

impl Effect for HungerThirstEffect {
    fn name(&self) -> &'static str {
        "hunger_thirst"
    }

    fn apply(&self, ctx: &EffectContext<'_>) -> Result<usize, String> {
        if !ctx.every(self.interval) {
            return Ok(0);
        }

        let mut updates = Vec::new();
        let processed = ctx.world.players.for_each_mut(|player| {
            player.hunger = player.hunger.saturating_sub(self.amount);
            player.thirst = player.thirst.saturating_sub(self.amount);
            updates.push((player.user_id, player.hunger, player.thirst));
        });

        for (user_id, hunger, thirst) in updates {
            ctx.sender
                .send(user_id, ServerMessage::UpdateHungerThirst { hunger, thirst });
        }
        Ok(processed)
    }
}
