use std::fmt;
use std::str::FromStr;

/// The living entity standing on a tile.
///
/// Rendered as `player:<user_id>` or `npc:<instance_id>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occupant {
    Player(u32),
    Npc(u32),
}

impl Occupant {
    pub fn is_player(&self) -> bool {
        matches!(self, Occupant::Player(_))
    }

    pub fn is_npc(&self) -> bool {
        matches!(self, Occupant::Npc(_))
    }
}

impl fmt::Display for Occupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Occupant::Player(id) => write!(f, "player:{id}"),
            Occupant::Npc(id) => write!(f, "npc:{id}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid occupant tag: {0:?}")]
pub struct OccupantParseError(pub String);

impl FromStr for Occupant {
    type Err = OccupantParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| OccupantParseError(s.to_string()))?;
        let id: u32 = id.parse().map_err(|_| OccupantParseError(s.to_string()))?;
        match kind {
            "player" => Ok(Occupant::Player(id)),
            "npc" => Ok(Occupant::Npc(id)),
            _ => Err(OccupantParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_type_tag() {
        assert_eq!(Occupant::Player(7).to_string(), "player:7");
        assert_eq!(Occupant::Npc(42).to_string(), "npc:42");
    }

    #[test]
    fn parse_accepts_tags() {
        assert_eq!("player:7".parse::<Occupant>(), Ok(Occupant::Player(7)));
        assert_eq!("npc:3".parse::<Occupant>(), Ok(Occupant::Npc(3)));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("monster:1".parse::<Occupant>().is_err());
        assert!("player:".parse::<Occupant>().is_err());
        assert!("player7".parse::<Occupant>().is_err());
    }
}
