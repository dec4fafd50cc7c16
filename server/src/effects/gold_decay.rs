//! Gold decay above a threshold.

use realm_core::protocol::ServerMessage;

use super::{Effect, EffectContext};

/// Every `interval` ticks a player holding more than `threshold` gold loses
/// `percent` of the excess (at least one coin).
#[derive(Debug, Clone)]
pub struct GoldDecayEffect {
    pub interval: u64,
    pub threshold: u32,
    pub percent: u32,
}

impl Default for GoldDecayEffect {
    fn default() -> Self {
        // Hourly at 20 ticks per second.
        Self {
            interval: 20 * 60 * 60,
            threshold: 100_000,
            percent: 1,
        }
    }
}

impl GoldDecayEffect {
    fn loss(&self, gold: u32) -> u32 {
        let excess = gold.saturating_sub(self.threshold);
        if excess == 0 {
            return 0;
        }
        let loss = (excess as u64 * self.percent as u64 / 100) as u32;
        loss.clamp(1, excess)
    }
}

impl Effect for GoldDecayEffect {
    fn name(&self) -> &'static str {
        "gold_decay"
    }

    fn apply(&self, ctx: &EffectContext<'_>) -> Result<usize, String> {
        if !ctx.every(self.interval) {
            return Ok(0);
        }

        let mut updates = Vec::new();
        ctx.world.players.for_each_mut(|player| {
            let loss = self.loss(player.gold);
            if loss > 0 {
                player.gold -= loss;
                updates.push((player.user_id, player.gold));
            }
        });

        let processed = updates.len();
        for (user_id, gold) in updates {
            ctx.sender.send(user_id, ServerMessage::UpdateGold { gold });
        }
        Ok(processed)
    }
}
