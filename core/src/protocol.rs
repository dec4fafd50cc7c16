//! Wire protocol: client opcodes and server messages.
//!
//! Every frame body starts with a one-byte opcode. The fields that follow are
//! fixed-width little-endian integers whose layout is decided entirely by the
//! opcode; strings are a `u16` length followed by UTF-8 bytes.

use crate::byte_operations::{ByteReader, ByteWriter};
use crate::types::{Heading, Occupant};

/// Packets a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientOpcode {
    /// `ticket: u64`
    Login = 1,
    /// `heading: u8`
    Walk = 2,
    /// `heading: u8`
    ChangeHeading = 3,
    /// `slot: u8, amount: u16`
    Drop = 4,
    PickUp = 5,
    /// `x: u8, y: u8`
    Work = 6,
    /// `x: u8, y: u8`
    Look = 7,
    RequestPosition = 8,
    Ping = 9,
}

impl ClientOpcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(ClientOpcode::Login),
            2 => Some(ClientOpcode::Walk),
            3 => Some(ClientOpcode::ChangeHeading),
            4 => Some(ClientOpcode::Drop),
            5 => Some(ClientOpcode::PickUp),
            6 => Some(ClientOpcode::Work),
            7 => Some(ClientOpcode::Look),
            8 => Some(ClientOpcode::RequestPosition),
            9 => Some(ClientOpcode::Ping),
            _ => None,
        }
    }

    /// Minimum payload length (opcode excluded).
    pub fn min_payload(self) -> usize {
        match self {
            ClientOpcode::Login => 8,
            ClientOpcode::Walk | ClientOpcode::ChangeHeading => 1,
            ClientOpcode::Drop => 3,
            ClientOpcode::Work | ClientOpcode::Look => 2,
            ClientOpcode::PickUp | ClientOpcode::RequestPosition | ClientOpcode::Ping => 0,
        }
    }

    /// Whether the session must be logged in before this packet is honoured.
    pub fn requires_auth(self) -> bool {
        !matches!(self, ClientOpcode::Login | ClientOpcode::Ping)
    }
}

/// Console text colour hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConsoleFont {
    Info = 0,
    Warning = 1,
    Fight = 2,
    Server = 3,
}

impl ConsoleFont {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ConsoleFont::Info),
            1 => Some(ConsoleFont::Warning),
            2 => Some(ConsoleFont::Fight),
            3 => Some(ConsoleFont::Server),
            _ => None,
        }
    }
}

/// Server → client opcodes.
pub mod server_opcode {
    pub const LOGIN_OK: u8 = 1;
    pub const CONSOLE_MESSAGE: u8 = 2;
    pub const POSITION_UPDATE: u8 = 3;
    pub const CHARACTER_MOVE: u8 = 4;
    pub const CHARACTER_HEADING: u8 = 5;
    pub const OBJECT_CREATE: u8 = 6;
    pub const OBJECT_DELETE: u8 = 7;
    pub const UPDATE_STAMINA: u8 = 8;
    pub const UPDATE_HUNGER_THIRST: u8 = 9;
    pub const UPDATE_GOLD: u8 = 10;
    pub const INVENTORY_SLOT: u8 = 11;
    pub const PONG: u8 = 12;
}

const ENTITY_PLAYER: u8 = 1;
const ENTITY_NPC: u8 = 2;

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    LoginOk {
        user_id: u32,
        map: u16,
        x: u16,
        y: u16,
    },
    ConsoleMessage {
        font: ConsoleFont,
        text: String,
    },
    PositionUpdate {
        x: u16,
        y: u16,
    },
    CharacterMove {
        entity: Occupant,
        x: u16,
        y: u16,
    },
    CharacterHeading {
        entity: Occupant,
        heading: Heading,
    },
    ObjectCreate {
        x: u16,
        y: u16,
        graphic: u32,
    },
    ObjectDelete {
        x: u16,
        y: u16,
    },
    UpdateStamina {
        stamina: u16,
        max_stamina: u16,
    },
    UpdateHungerThirst {
        hunger: u16,
        thirst: u16,
    },
    UpdateGold {
        gold: u32,
    },
    InventorySlot {
        slot: u8,
        item_id: u16,
        quantity: u16,
    },
    Pong,
}

impl ServerMessage {
    /// Shorthand for an informational console line.
    pub fn console(text: impl Into<String>) -> Self {
        ServerMessage::ConsoleMessage {
            font: ConsoleFont::Info,
            text: text.into(),
        }
    }

    pub fn opcode(&self) -> u8 {
        use server_opcode::*;
        match self {
            ServerMessage::LoginOk { .. } => LOGIN_OK,
            ServerMessage::ConsoleMessage { .. } => CONSOLE_MESSAGE,
            ServerMessage::PositionUpdate { .. } => POSITION_UPDATE,
            ServerMessage::CharacterMove { .. } => CHARACTER_MOVE,
            ServerMessage::CharacterHeading { .. } => CHARACTER_HEADING,
            ServerMessage::ObjectCreate { .. } => OBJECT_CREATE,
            ServerMessage::ObjectDelete { .. } => OBJECT_DELETE,
            ServerMessage::UpdateStamina { .. } => UPDATE_STAMINA,
            ServerMessage::UpdateHungerThirst { .. } => UPDATE_HUNGER_THIRST,
            ServerMessage::UpdateGold { .. } => UPDATE_GOLD,
            ServerMessage::InventorySlot { .. } => INVENTORY_SLOT,
            ServerMessage::Pong => PONG,
        }
    }

    /// Encode as a frame body: opcode followed by the fields.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ByteWriter::with_capacity(16);
        w.put_u8(self.opcode());
        match self {
            ServerMessage::LoginOk { user_id, map, x, y } => {
                w.put_u32(*user_id).put_u16(*map).put_u16(*x).put_u16(*y);
            }
            ServerMessage::ConsoleMessage { font, text } => {
                w.put_u8(*font as u8).put_string(text);
            }
            ServerMessage::PositionUpdate { x, y } | ServerMessage::ObjectDelete { x, y } => {
                w.put_u16(*x).put_u16(*y);
            }
            ServerMessage::CharacterMove { entity, x, y } => {
                put_entity(&mut w, entity);
                w.put_u16(*x).put_u16(*y);
            }
            ServerMessage::CharacterHeading { entity, heading } => {
                put_entity(&mut w, entity);
                w.put_u8(heading.as_u8());
            }
            ServerMessage::ObjectCreate { x, y, graphic } => {
                w.put_u16(*x).put_u16(*y).put_u32(*graphic);
            }
            ServerMessage::UpdateStamina {
                stamina,
                max_stamina,
            } => {
                w.put_u16(*stamina).put_u16(*max_stamina);
            }
            ServerMessage::UpdateHungerThirst { hunger, thirst } => {
                w.put_u16(*hunger).put_u16(*thirst);
            }
            ServerMessage::UpdateGold { gold } => {
                w.put_u32(*gold);
            }
            ServerMessage::InventorySlot {
                slot,
                item_id,
                quantity,
            } => {
                w.put_u8(*slot).put_u16(*item_id).put_u16(*quantity);
            }
            ServerMessage::Pong => {}
        }
        w.into_vec()
    }

    /// Decode a frame body produced by [`ServerMessage::encode`].
    ///
    /// Used by clients and test harnesses; returns `None` for unknown
    /// opcodes or truncated bodies.
    pub fn decode(body: &[u8]) -> Option<Self> {
        use server_opcode::*;
        let mut r = ByteReader::new(body);
        let message = match r.read_u8()? {
            LOGIN_OK => ServerMessage::LoginOk {
                user_id: r.read_u32()?,
                map: r.read_u16()?,
                x: r.read_u16()?,
                y: r.read_u16()?,
            },
            CONSOLE_MESSAGE => ServerMessage::ConsoleMessage {
                font: ConsoleFont::from_u8(r.read_u8()?)?,
                text: r.read_string()?,
            },
            POSITION_UPDATE => ServerMessage::PositionUpdate {
                x: r.read_u16()?,
                y: r.read_u16()?,
            },
            CHARACTER_MOVE => ServerMessage::CharacterMove {
                entity: read_entity(&mut r)?,
                x: r.read_u16()?,
                y: r.read_u16()?,
            },
            CHARACTER_HEADING => ServerMessage::CharacterHeading {
                entity: read_entity(&mut r)?,
                heading: Heading::from_u8(r.read_u8()?)?,
            },
            OBJECT_CREATE => ServerMessage::ObjectCreate {
                x: r.read_u16()?,
                y: r.read_u16()?,
                graphic: r.read_u32()?,
            },
            OBJECT_DELETE => ServerMessage::ObjectDelete {
                x: r.read_u16()?,
                y: r.read_u16()?,
            },
            UPDATE_STAMINA => ServerMessage::UpdateStamina {
                stamina: r.read_u16()?,
                max_stamina: r.read_u16()?,
            },
            UPDATE_HUNGER_THIRST => ServerMessage::UpdateHungerThirst {
                hunger: r.read_u16()?,
                thirst: r.read_u16()?,
            },
            UPDATE_GOLD => ServerMessage::UpdateGold {
                gold: r.read_u32()?,
            },
            INVENTORY_SLOT => ServerMessage::InventorySlot {
                slot: r.read_u8()?,
                item_id: r.read_u16()?,
                quantity: r.read_u16()?,
            },
            PONG => ServerMessage::Pong,
            _ => return None,
        };
        Some(message)
    }
}

fn put_entity(w: &mut ByteWriter, entity: &Occupant) {
    match entity {
        Occupant::Player(id) => w.put_u8(ENTITY_PLAYER).put_u32(*id),
        Occupant::Npc(id) => w.put_u8(ENTITY_NPC).put_u32(*id),
    };
}

fn read_entity(r: &mut ByteReader<'_>) -> Option<Occupant> {
    match r.read_u8()? {
        ENTITY_PLAYER => Some(Occupant::Player(r.read_u32()?)),
        ENTITY_NPC => Some(Occupant::Npc(r.read_u32()?)),
        _ => None,
    }
}
