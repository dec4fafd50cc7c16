//! Per-connection session state and the login-ticket seam.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

/// What the server knows about one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub connection_id: u64,
    /// Set once a login ticket was accepted.
    pub user_id: Option<u32>,
}

impl Session {
    pub fn new(connection_id: u64) -> Self {
        Self {
            connection_id,
            user_id: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// Turns a one-shot login ticket into a user id.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// Consume `ticket`. `Ok(None)` for unknown or already used tickets.
    async fn consume_ticket(&self, ticket: u64) -> Result<Option<u32>, String>;
}

/// Ticket table held in memory; used in tests and when KeyDB is disabled.
#[derive(Debug, Default)]
pub struct MemoryTicketAuthenticator {
    tickets: Mutex<HashMap<u64, u32>>,
}

impl MemoryTicketAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self, ticket: u64, user_id: u32) {
        self.tickets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(ticket, user_id);
    }
}

#[async_trait]
impl SessionAuthenticator for MemoryTicketAuthenticator {
    async fn consume_ticket(&self, ticket: u64) -> Result<Option<u32>, String> {
        if ticket == 0 {
            return Ok(None);
        }
        Ok(self
            .tickets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&ticket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A ticket works exactly once.
    #[tokio::test]
    async fn tickets_are_single_use() {
        let auth = MemoryTicketAuthenticator::new();
        auth.issue(99, 7);
        assert_eq!(auth.consume_ticket(99).await.unwrap(), Some(7));
        assert_eq!(auth.consume_ticket(99).await.unwrap(), None);
    }

    #[tokio::test]
    async fn zero_ticket_is_rejected() {
        let auth = MemoryTicketAuthenticator::new();
        auth.issue(0, 1);
        assert_eq!(auth.consume_ticket(0).await.unwrap(), None);
    }
}
