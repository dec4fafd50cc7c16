//! KeyDB connection lifecycle and login tickets.
//!
//! The connection is owned by `main`: it calls [`KeyDb::connect`] at start-up,
//! hands `Arc<KeyDb>` to whoever needs it and calls [`KeyDb::disconnect`] on
//! the way out. There is no process-wide client.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use crate::repository::StoreError;
use crate::session::SessionAuthenticator;

const MAX_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(6);

pub struct KeyDb {
    url: String,
    con: RwLock<Option<MultiplexedConnection>>,
}

impl KeyDb {
    /// Open a multiplexed connection, retrying a few times while KeyDB
    /// comes up.
    pub async fn connect(url: &str) -> Result<Self, String> {
        Self::connect_with_retry(url, MAX_RETRIES, RETRY_DELAY).await
    }

    pub async fn connect_with_retry(
        url: &str,
        retries: u32,
        delay: Duration,
    ) -> Result<Self, String> {
        let client = redis::Client::open(url)
            .map_err(|err| format!("Failed to open KeyDB client: {err}"))?;

        let mut last_error = String::new();
        for attempt in 0..=retries {
            match client.get_multiplexed_async_connection().await {
                Ok(con) => {
                    log::info!("Connected to KeyDB at {url}");
                    return Ok(Self {
                        url: url.to_string(),
                        con: RwLock::new(Some(con)),
                    });
                }
                Err(err) => {
                    last_error = err.to_string();
                    if attempt < retries {
                        log::warn!(
                            "Failed to connect to KeyDB (attempt {}/{}), retrying in {}s",
                            attempt + 1,
                            retries + 1,
                            delay.as_secs()
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(format!("Failed to connect to KeyDB: {last_error}"))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_connected(&self) -> bool {
        self.con
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// A handle onto the shared connection.
    pub fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.con
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(StoreError::Disconnected)
    }

    /// Drop the connection. Later calls fail with
    /// [`StoreError::Disconnected`].
    pub fn disconnect(&self) {
        if self
            .con
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .is_some()
        {
            log::info!("Disconnected from KeyDB");
        }
    }
}

pub fn login_ticket_key(ticket: u64) -> String {
    format!("game_login_ticket:{ticket}")
}

/// Parse the value stored under a login ticket.
fn parse_ticket_value(raw: &str) -> Result<u32, String> {
    raw.trim()
        .parse::<u32>()
        .map_err(|_| "Invalid login ticket value".to_string())
}

/// Login tickets written by the account service.
pub struct KeyDbSessionAuthenticator {
    keydb: Arc<KeyDb>,
}

impl KeyDbSessionAuthenticator {
    pub fn new(keydb: Arc<KeyDb>) -> Self {
        Self { keydb }
    }
}

#[async_trait]
impl SessionAuthenticator for KeyDbSessionAuthenticator {
    async fn consume_ticket(&self, ticket: u64) -> Result<Option<u32>, String> {
        if ticket == 0 {
            return Ok(None);
        }

        let mut con = self.keydb.connection().map_err(|e| e.to_string())?;

        // Use Lua to atomically get and delete the ticket.
        let script = "local v = redis.call('GET', KEYS[1]); if v then redis.call('DEL', KEYS[1]); end; return v";

        let value: Option<String> = redis::cmd("EVAL")
            .arg(script)
            .arg(1)
            .arg(login_ticket_key(ticket))
            .query_async(&mut con)
            .await
            .map_err(|err| format!("Failed to consume login ticket: {err}"))?;

        value.as_deref().map(parse_ticket_value).transpose()
    }
}
