//! Stamina regeneration for fed and watered players.

use realm_core::protocol::ServerMessage;

use super::{Effect, EffectContext};

#[derive(Debug, Clone)]
pub struct StaminaRegenEffect {
    pub interval: u64,
    /// Share of max stamina regained per step, in percent.
    pub percent: u16,
}

impl Default for StaminaRegenEffect {
    fn default() -> Self {
        Self {
            interval: 20,
            percent: 5,
        }
    }
}

impl StaminaRegenEffect {
    fn step(&self, max_stamina: u16) -> u16 {
        let step = (max_stamina as u32 * self.percent as u32 / 100) as u16;
        step.max(1)
    }
}

impl Effect for StaminaRegenEffect {
    fn name(&self) -> &'static str {
        "stamina_regen"
    }

    fn apply(&self, ctx: &EffectContext<'_>) -> Result<usize, String> {
        if !ctx.every(self.interval) {
            return Ok(0);
        }

        let mut updates = Vec::new();
        ctx.world.players.for_each_mut(|player| {
            if player.hunger == 0 || player.thirst == 0 {
                return;
            }
            if player.stamina >= player.max_stamina {
                return;
            }
            player.stamina = player
                .stamina
                .saturating_add(self.step(player.max_stamina))
                .min(player.max_stamina);
            updates.push((player.user_id, player.stamina, player.max_stamina));
        });

        let processed = updates.len();
        for (user_id, stamina, max_stamina) in updates {
            ctx.sender.send(
                user_id,
                ServerMessage::UpdateStamina {
                    stamina,
                    max_stamina,
                },
            );
        }
        Ok(processed)
    }
}
