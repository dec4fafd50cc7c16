//! Periodic world mutations run by the tick scheduler.
//!
//! An effect is a named unit of work called once per tick. It reads and
//! mutates the [`World`] and may notify players through the
//! [`MessageSender`]. Effects are synchronous and never hold a lock across a
//! suspension point.

pub mod gold_decay;
pub mod hunger_thirst;
pub mod npc_ai;
pub mod stamina_regen;

pub use gold_decay::GoldDecayEffect;
pub use hunger_thirst::HungerThirstEffect;
pub use npc_ai::NpcAiEffect;
pub use stamina_regen::StaminaRegenEffect;

use std::sync::Arc;

use crate::network_manager::MessageSender;
use crate::world::World;

/// What an effect sees during one tick.
pub struct EffectContext<'a> {
    /// Ticks since the scheduler started, starting at 1.
    pub tick: u64,
    pub world: &'a World,
    pub sender: &'a dyn MessageSender,
}

impl EffectContext<'_> {
    /// Whether an effect with period `interval` runs this tick.
    pub fn every(&self, interval: u64) -> bool {
        interval <= 1 || self.tick % interval == 0
    }
}

pub trait Effect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run once. `Ok` carries how many entities were processed.
    fn apply(&self, ctx: &EffectContext<'_>) -> Result<usize, String>;
}

/// The production pipeline, in execution order. Regeneration depends on
/// hunger and thirst having been updated first.
pub fn default_pipeline() -> Vec<Arc<dyn Effect>> {
    vec![
        Arc::new(NpcAiEffect::default()),
        Arc::new(HungerThirstEffect::default()),
        Arc::new(StaminaRegenEffect::default()),
        Arc::new(GoldDecayEffect::default()),
    ]
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_manager::RecordingSender;

    #[test]
    fn every_selects_multiples() {
        let world = test_support::world_with_players(&[]);
        let sender = RecordingSender::new();
        let at = |tick| EffectContext {
            tick,
            world: &world,
            sender: &sender,
        };
        assert!(at(10).every(5));
        assert!(!at(11).every(5));
        assert!(at(11).every(1));
        assert!(at(11).every(0));
    }

    #[test]
    fn pipeline_order() {
        let names: Vec<&str> = default_pipeline().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["npc_ai", "hunger_thirst", "stamina_regen", "gold_decay"]);
    }
}
