//! NPC movement: hostile NPCs chase, the rest wander near home.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use realm_core::constants::VIEW_DISTANCE;
use realm_core::protocol::ServerMessage;
use realm_core::types::{Heading, Occupant, Position, TileKey};

use super::{Effect, EffectContext};
use crate::world::Npc;

pub const AGGRO_RANGE: u16 = 6;

/// Chance per tick that an idle NPC takes a step.
const WANDER_CHANCE: f64 = 0.25;

pub struct NpcAiEffect {
    pub interval: u64,
    rng: Mutex<StdRng>,
}

impl Default for NpcAiEffect {
    fn default() -> Self {
        Self {
            interval: 10,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

/// What one NPC did this pass, reported to nearby players afterwards.
enum Action {
    Moved(TileKey),
    Turned(TileKey, Heading),
}

impl NpcAiEffect {
    /// Deterministic variant for tests.
    pub fn with_seed(interval: u64, seed: u64) -> Self {
        Self {
            interval,
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn nearest_player(npc: &Npc, players: &[(u32, Position)]) -> Option<Position> {
        let here = npc.position.position();
        players
            .iter()
            .map(|(_, pos)| *pos)
            .filter(|pos| here.distance(*pos) <= AGGRO_RANGE)
            .min_by_key(|pos| here.distance(*pos))
    }

    /// Step toward `target`, trying the other axis when the direct step is
    /// blocked. Standing next to the target only turns to face it.
    fn chase(ctx: &EffectContext<'_>, npc: &mut Npc, target: Position) -> Option<Action> {
        let here = npc.position.position();
        let heading = here.heading_to(target)?;

        if here.distance(target) <= 1 {
            if npc.heading == heading {
                return None;
            }
            npc.heading = heading;
            return Some(Action::Turned(npc.position, heading));
        }

        let mut candidates = vec![heading];
        let (dx, dy) = (
            target.x as i32 - here.x as i32,
            target.y as i32 - here.y as i32,
        );
        let alternate = match heading {
            Heading::East | Heading::West if dy != 0 => {
                Some(if dy > 0 { Heading::South } else { Heading::North })
            }
            Heading::North | Heading::South if dx != 0 => {
                Some(if dx > 0 { Heading::East } else { Heading::West })
            }
            _ => None,
        };
        candidates.extend(alternate);

        candidates
            .into_iter()
            .find_map(|heading| Self::step(ctx, npc, heading, None))
    }

    fn wander(&self, ctx: &EffectContext<'_>, npc: &mut Npc) -> Option<Action> {
        let radius = npc.wander_radius;
        let heading = {
            let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
            if !rng.gen_bool(WANDER_CHANCE) {
                return None;
            }
            Heading::ALL[rng.gen_range(0..Heading::ALL.len())]
        };
        Self::step(ctx, npc, heading, Some(radius))
    }

    fn step(
        ctx: &EffectContext<'_>,
        npc: &mut Npc,
        heading: Heading,
        leash: Option<u16>,
    ) -> Option<Action> {
        let from = npc.position.position();
        let to = from.step(heading)?;
        if leash.is_some_and(|radius| npc.home.distance(to) > radius) {
            return None;
        }
        let moved = ctx
            .world
            .maps
            .try_move(Occupant::Npc(npc.id), npc.position.map, Some(from), to);
        if !moved {
            return None;
        }
        npc.position = TileKey::at(npc.position.map, to);
        npc.heading = heading;
        Some(Action::Moved(npc.position))
    }

    fn notify(ctx: &EffectContext<'_>, npc_id: u32, action: Action) {
        let (tile, message) = match action {
            Action::Moved(tile) => (
                tile,
                ServerMessage::CharacterMove {
                    entity: Occupant::Npc(npc_id),
                    x: tile.x,
                    y: tile.y,
                },
            ),
            Action::Turned(tile, heading) => (
                tile,
                ServerMessage::CharacterHeading {
                    entity: Occupant::Npc(npc_id),
                    heading,
                },
            ),
        };
        for user_id in ctx.world.players.nearby(tile, VIEW_DISTANCE, None) {
            ctx.sender.send(user_id, message.clone());
        }
    }
}

impl Effect for NpcAiEffect {
    fn name(&self) -> &'static str {
        "npc_ai"
    }

    fn apply(&self, ctx: &EffectContext<'_>) -> Result<usize, String> {
        if !ctx.every(self.interval) {
            return Ok(0);
        }

        // Player positions are read before the NPC lock is taken.
        let players_by_map = ctx.world.players.positions_by_map();
        let mut actions = Vec::new();
        let processed;
        {
            let mut npcs = ctx.world.npcs.lock();
            processed = npcs.len();
            for npc in npcs.values_mut() {
                let target = if npc.hostile {
                    players_by_map
                        .get(&npc.position.map)
                        .and_then(|players| Self::nearest_player(npc, players))
                } else {
                    None
                };
                let action = match target {
                    Some(target) => Self::chase(ctx, npc, target),
                    None => self.wander(ctx, npc),
                };
                if let Some(action) = action {
                    actions.push((npc.id, action));
                }
            }
        }

        for (npc_id, action) in actions {
            Self::notify(ctx, npc_id, action);
        }
        Ok(processed)
    }
}
