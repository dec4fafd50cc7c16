//! Packet-driven tasks.
//!
//! One inbound packet runs exactly one [`Task`]. [`dispatch`] looks the task
//! up by opcode and applies the same checks to every packet before the task
//! body sees it:
//!
//! 1. the payload is at least [`ClientOpcode::min_payload`] bytes long,
//! 2. the session is logged in, unless the opcode is allowed before login,
//! 3. every collaborator the task needs is configured.
//!
//! A packet failing a check is logged and dropped; the connection stays open
//! and the client is told nothing. Rule violations inside a task body (too
//! far away, ground full) are answered with a console line instead.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use realm_core::byte_operations::ByteReader;
use realm_core::constants::VIEW_DISTANCE;
use realm_core::protocol::{ClientOpcode, ServerMessage};
use realm_core::types::TileKey;

use crate::inventory::InventoryService;
use crate::network_manager::MessageSender;
use crate::session::{Session, SessionAuthenticator};
use crate::world::{Player, World};

pub mod drop;
pub mod heading;
pub mod login;
pub mod look;
pub mod pickup;
pub mod ping;
pub mod position;
pub mod walk;
pub mod work;

/// Injected services a task may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Sender,
    Authenticator,
    Inventory,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Collaborator::Sender => "message sender",
            Collaborator::Authenticator => "session authenticator",
            Collaborator::Inventory => "inventory service",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("unknown opcode {0}")]
    UnknownOpcode(u8),
    #[error("{opcode:?} needs {expected} payload bytes, got {actual}")]
    ShortPayload {
        opcode: ClientOpcode,
        expected: usize,
        actual: usize,
    },
    #[error("{0:?} sent before login")]
    Unauthenticated(ClientOpcode),
    #[error("{0} is not configured")]
    MissingCollaborator(Collaborator),
    #[error("malformed {opcode:?}: {reason}")]
    Malformed {
        opcode: ClientOpcode,
        reason: String,
    },
    #[error("user {0} is not in the world")]
    NotInWorld(u32),
    #[error("collaborator failed: {0}")]
    Collaborator(String),
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
    #[error("user {0} logged in on another connection")]
    Superseded(u32),
}

/// Everything tasks share across connections.
#[derive(Clone)]
pub struct TaskContext {
    pub world: Arc<World>,
    pub sender: Option<Arc<dyn MessageSender>>,
    pub authenticator: Option<Arc<dyn SessionAuthenticator>>,
    pub inventory: Option<Arc<dyn InventoryService>>,
    /// Where players enter the world.
    pub start: TileKey,
    /// Upper bound on any single collaborator call.
    pub timeout: Duration,
}

impl TaskContext {
    pub fn new(world: Arc<World>, start: TileKey, timeout: Duration) -> Self {
        Self {
            world,
            sender: None,
            authenticator: None,
            inventory: None,
            start,
            timeout,
        }
    }

    pub fn with_sender(mut self, sender: Arc<dyn MessageSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_inventory(mut self, inventory: Arc<dyn InventoryService>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    fn has(&self, collaborator: Collaborator) -> bool {
        match collaborator {
            Collaborator::Sender => self.sender.is_some(),
            Collaborator::Authenticator => self.authenticator.is_some(),
            Collaborator::Inventory => self.inventory.is_some(),
        }
    }

    pub fn sender(&self) -> Result<&dyn MessageSender, TaskError> {
        self.sender
            .as_deref()
            .ok_or(TaskError::MissingCollaborator(Collaborator::Sender))
    }

    pub fn authenticator(&self) -> Result<&dyn SessionAuthenticator, TaskError> {
        self.authenticator
            .as_deref()
            .ok_or(TaskError::MissingCollaborator(Collaborator::Authenticator))
    }

    pub fn inventory(&self) -> Result<&dyn InventoryService, TaskError> {
        self.inventory
            .as_deref()
            .ok_or(TaskError::MissingCollaborator(Collaborator::Inventory))
    }

    /// Await a collaborator call for at most [`TaskContext::timeout`].
    pub async fn bounded<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = T>,
    ) -> Result<T, TaskError> {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| TaskError::Timeout {
                what,
                after: self.timeout,
            })
    }

    /// Snapshot of the session's player.
    pub fn player(&self, session: &Session) -> Result<Player, TaskError> {
        let user_id = session.user_id.ok_or(TaskError::NotInWorld(0))?;
        self.world
            .players
            .get(user_id)
            .ok_or(TaskError::NotInWorld(user_id))
    }

    /// Answer the connection that sent the packet.
    pub fn reply(&self, session: &Session, message: ServerMessage) -> Result<(), TaskError> {
        self.sender()?
            .send_to_connection(session.connection_id, message);
        Ok(())
    }

    pub fn tell(&self, session: &Session, text: &str) -> Result<(), TaskError> {
        self.reply(session, ServerMessage::console(text))
    }

    /// Send `message` to every player who can see `tile`, `except` excluded.
    pub fn broadcast(
        &self,
        tile: TileKey,
        except: Option<u32>,
        message: &ServerMessage,
    ) -> Result<usize, TaskError> {
        let sender = self.sender()?;
        let viewers = self.world.players.nearby(tile, VIEW_DISTANCE, except);
        for user_id in &viewers {
            sender.send(*user_id, message.clone());
        }
        Ok(viewers.len())
    }
}

/// Read the `x: u8, y: u8` target shared by several packets.
pub(crate) fn read_xy(opcode: ClientOpcode, payload: &[u8]) -> Result<(u16, u16), TaskError> {
    let mut reader = ByteReader::new(payload);
    match (reader.read_u8(), reader.read_u8()) {
        (Some(x), Some(y)) => Ok((x as u16, y as u16)),
        _ => Err(TaskError::Malformed {
            opcode,
            reason: "missing coordinates".to_string(),
        }),
    }
}

/// Handler for one client opcode.
#[async_trait]
pub trait Task: Send + Sync {
    fn opcode(&self) -> ClientOpcode;

    /// Collaborators that must be configured before [`Task::execute`] runs.
    fn collaborators(&self) -> &'static [Collaborator] {
        &[Collaborator::Sender]
    }

    /// Run the task. `payload` is at least [`ClientOpcode::min_payload`]
    /// bytes long and excludes the opcode byte.
    async fn execute(
        &self,
        ctx: &TaskContext,
        session: &mut Session,
        payload: &[u8],
    ) -> Result<(), TaskError>;
}

pub fn task_for(opcode: ClientOpcode) -> &'static dyn Task {
    match opcode {
        ClientOpcode::Login => &login::LoginTask,
        ClientOpcode::Walk => &walk::WalkTask,
        ClientOpcode::ChangeHeading => &heading::HeadingTask,
        ClientOpcode::Drop => &drop::DropTask,
        ClientOpcode::PickUp => &pickup::PickUpTask,
        ClientOpcode::Work => &work::WorkTask,
        ClientOpcode::Look => &look::LookTask,
        ClientOpcode::RequestPosition => &position::PositionTask,
        ClientOpcode::Ping => &ping::PingTask,
    }
}

/// Validate and run one packet.
///
/// # Arguments
///
/// * `ctx` - Shared services.
/// * `session` - State of the connection the packet arrived on.
/// * `opcode` - First byte of the frame body.
/// * `payload` - The rest of the frame body.
///
/// # Returns
///
/// * `Ok(())` once the task ran, including when it answered with a console
///   message.
/// * `Err(_)` if the packet was dropped. The error is already logged.
pub async fn dispatch(
    ctx: &TaskContext,
    session: &mut Session,
    opcode: u8,
    payload: &[u8],
) -> Result<(), TaskError> {
    let Some(client_opcode) = ClientOpcode::from_u8(opcode) else {
        log::warn!(
            "Connection {}: unknown opcode {opcode}, {} bytes dropped",
            session.connection_id,
            payload.len()
        );
        return Err(TaskError::UnknownOpcode(opcode));
    };
    let task = task_for(client_opcode);

    let expected = client_opcode.min_payload();
    if payload.len() < expected {
        log::warn!(
            "Connection {}: short {client_opcode:?} payload ({} < {expected})",
            session.connection_id,
            payload.len()
        );
        return Err(TaskError::ShortPayload {
            opcode: client_opcode,
            expected,
            actual: payload.len(),
        });
    }

    if client_opcode.requires_auth() && !session.is_authenticated() {
        log::warn!(
            "Connection {}: {client_opcode:?} before login",
            session.connection_id
        );
        return Err(TaskError::Unauthenticated(client_opcode));
    }

    if let Some(user_id) = session.user_id.filter(|_| client_opcode.requires_auth()) {
        let current = match ctx.sender() {
            Ok(sender) => sender.bound_connection(user_id),
            Err(e) => {
                log::error!("Cannot run {client_opcode:?}: {e}");
                return Err(e);
            }
        };
        if current != Some(session.connection_id) {
            log::warn!(
                "Connection {}: {client_opcode:?} for user {user_id}, who now plays on {current:?}",
                session.connection_id
            );
            session.user_id = None;
            return Err(TaskError::Superseded(user_id));
        }
    }

    if let Some(missing) = task
        .collaborators()
        .iter()
        .find(|collaborator| !ctx.has(**collaborator))
    {
        log::error!("Cannot run {client_opcode:?}: {missing} is not configured");
        return Err(TaskError::MissingCollaborator(*missing));
    }

    let result = task.execute(ctx, session, payload).await;
    if let Err(e) = &result {
        match e {
            TaskError::Collaborator(_)
            | TaskError::Timeout { .. }
            | TaskError::MissingCollaborator(_) => {
                log::error!("Connection {}: {client_opcode:?} failed: {e}", session.connection_id)
            }
            _ => log::warn!("Connection {}: {client_opcode:?} dropped: {e}", session.connection_id),
        }
    }
    result
}

// ---------------------------------------------------------------------------
//  Test helpers
// ---------------------------------------------------------------------------
