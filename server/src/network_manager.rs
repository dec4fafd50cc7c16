//! Outbound message routing.
//!
//! Tasks and effects never touch sockets. They hand a [`ServerMessage`] to a
//! [`MessageSender`]; the [`NetworkManager`] implementation pushes it onto the
//! bounded queue of the recipient's connection, which the connection's writer
//! drains. Messages can be addressed to a logged-in user or, before login, to
//! the raw connection.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use realm_core::protocol::ServerMessage;
use tokio::sync::mpsc;

/// One send call per logical notification.
pub trait MessageSender: Send + Sync {
    /// Queue `message` for `user_id`.
    ///
    /// # Returns
    ///
    /// * `true` if the message was queued.
    /// * `false` if the user is offline or their queue is full.
    fn send(&self, user_id: u32, message: ServerMessage) -> bool;

    /// Queue `message` on a connection whether or not it is logged in.
    fn send_to_connection(&self, connection_id: u64, message: ServerMessage) -> bool;

    /// Route messages for `user_id` to `connection_id` from now on.
    fn bind_user(&self, connection_id: u64, user_id: u32) -> bool;

    /// The connection `user_id` is currently bound to.
    fn bound_connection(&self, user_id: u32) -> Option<u64>;
}

#[derive(Default)]
struct Routes {
    connections: HashMap<u64, mpsc::Sender<ServerMessage>>,
    users: HashMap<u32, u64>,
}

/// Outbound queues of every open connection.
#[derive(Default)]
pub struct NetworkManager {
    routes: RwLock<Routes>,
}

impl NetworkManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_connection(&self, connection_id: u64, queue: mpsc::Sender<ServerMessage>) {
        self.routes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .connections
            .insert(connection_id, queue);
    }

    /// Forget a closed connection.
    ///
    /// # Returns
    ///
    /// * The user still bound to this connection, if any. A user who has
    ///   since logged in elsewhere is not returned.
    pub fn unregister_connection(&self, connection_id: u64) -> Option<u32> {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        routes.connections.remove(&connection_id);
        let user = routes
            .users
            .iter()
            .find(|(_, bound)| **bound == connection_id)
            .map(|(user, _)| *user)?;
        routes.users.remove(&user);
        Some(user)
    }

    pub fn is_online(&self, user_id: u32) -> bool {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .users
            .contains_key(&user_id)
    }

    pub fn connection_count(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .connections
            .len()
    }

    fn push(queue: &mpsc::Sender<ServerMessage>, connection_id: u64, message: ServerMessage) -> bool {
        match queue.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Outbound queue full on connection {connection_id}; message dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl MessageSender for NetworkManager {
    fn send(&self, user_id: u32, message: ServerMessage) -> bool {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        let Some((connection_id, queue)) = routes
            .users
            .get(&user_id)
            .and_then(|id| routes.connections.get(id).map(|q| (*id, q)))
        else {
            log::trace!("Dropping message for offline user {user_id}");
            return false;
        };
        Self::push(queue, connection_id, message)
    }

    fn send_to_connection(&self, connection_id: u64, message: ServerMessage) -> bool {
        let routes = self.routes.read().unwrap_or_else(|e| e.into_inner());
        match routes.connections.get(&connection_id) {
            Some(queue) => Self::push(queue, connection_id, message),
            None => false,
        }
    }

    fn bind_user(&self, connection_id: u64, user_id: u32) -> bool {
        let mut routes = self.routes.write().unwrap_or_else(|e| e.into_inner());
        if !routes.connections.contains_key(&connection_id) {
            return false;
        }
        if let Some(previous) = routes.users.insert(user_id, connection_id) {
            if previous != connection_id {
                log::warn!("User {user_id} moved from connection {previous} to {connection_id}");
            }
        }
        true
    }

    fn bound_connection(&self, user_id: u32) -> Option<u64> {
        self.routes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .users
            .get(&user_id)
            .copied()
    }
}

/// Who a recorded message was addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    User(u32),
    Connection(u64),
}

/// Sender that remembers everything it was given. Used by tests.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(Recipient, ServerMessage)>>,
    bindings: Mutex<HashMap<u64, u32>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<(Recipient, ServerMessage)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Messages for `recipient`, removing them from the record.
    pub fn take_for(&self, recipient: Recipient) -> Vec<ServerMessage> {
        let mut sent = self.sent.lock().unwrap_or_else(|e| e.into_inner());
        let (mine, rest): (Vec<_>, Vec<_>) = sent.drain(..).partition(|(to, _)| *to == recipient);
        *sent = rest;
        mine.into_iter().map(|(_, m)| m).collect()
    }

    /// Shorthand for [`RecordingSender::take_for`] a user.
    pub fn take(&self, user_id: u32) -> Vec<ServerMessage> {
        self.take_for(Recipient::User(user_id))
    }

    pub fn bound_user(&self, connection_id: u64) -> Option<u32> {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&connection_id)
            .copied()
    }

    fn record(&self, to: Recipient, message: ServerMessage) -> bool {
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to, message));
        true
    }
}

impl MessageSender for RecordingSender {
    fn send(&self, user_id: u32, message: ServerMessage) -> bool {
        self.record(Recipient::User(user_id), message)
    }

    fn send_to_connection(&self, connection_id: u64, message: ServerMessage) -> bool {
        self.record(Recipient::Connection(connection_id), message)
    }

    fn bind_user(&self, connection_id: u64, user_id: u32) -> bool {
        let mut bindings = self.bindings.lock().unwrap_or_else(|e| e.into_inner());
        bindings.retain(|_, bound| *bound != user_id);
        bindings.insert(connection_id, user_id);
        true
    }

    fn bound_connection(&self, user_id: u32) -> Option<u64> {
        self.bindings
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|(_, bound)| **bound == user_id)
            .map(|(connection_id, _)| *connection_id)
    }
}
