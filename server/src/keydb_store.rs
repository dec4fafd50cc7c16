//! KeyDB-backed ground item persistence.
//!
//! Each map's ground items are stored as one bincode-encoded blob, so a save
//! is a single `SET` and a reload a single `GET`.
//!
//! Key schema:
//! - `game:ground:{map_id}`: bincode `BTreeMap<Position, Vec<GroundItem>>`
//! - `game:meta:ground_version`: schema version integer

use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::ground_items::GroundItemSnapshot;
use crate::keydb::KeyDb;
use crate::repository::{GroundItemRepository, StoreError};

/// Current schema version written to `game:meta:ground_version`.
const SCHEMA_VERSION: u32 = 1;

const VERSION_KEY: &str = "game:meta:ground_version";

pub fn ground_key(map_id: u16) -> String {
    format!("game:ground:{map_id}")
}

/// Encode a snapshot via bincode.
fn encode(snapshot: &GroundItemSnapshot) -> Result<Vec<u8>, StoreError> {
    bincode::encode_to_vec(snapshot, bincode::config::standard())
        .map_err(|e| StoreError::Encode(e.to_string()))
}

/// Decode a snapshot; the whole blob must be consumed.
fn decode(bytes: &[u8]) -> Result<GroundItemSnapshot, StoreError> {
    let (snapshot, consumed): (GroundItemSnapshot, usize) =
        bincode::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| StoreError::Decode(e.to_string()))?;
    if consumed != bytes.len() {
        return Err(StoreError::Decode(format!(
            "{} trailing bytes after ground item blob",
            bytes.len() - consumed
        )));
    }
    Ok(snapshot)
}

fn backend(context: &str, err: redis::RedisError) -> StoreError {
    StoreError::Backend(format!("KeyDB {context}: {err}"))
}

pub struct KeyDbGroundItemStore {
    keydb: Arc<KeyDb>,
}

impl KeyDbGroundItemStore {
    pub fn new(keydb: Arc<KeyDb>) -> Self {
        Self { keydb }
    }

    /// Stamp the schema version on an empty database, refuse a different
    /// one.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        let mut con = self.keydb.connection()?;
        let stored: Option<u32> = con
            .get(VERSION_KEY)
            .await
            .map_err(|e| backend("GET version", e))?;

        match stored {
            None => {
                let _: () = con
                    .set(VERSION_KEY, SCHEMA_VERSION)
                    .await
                    .map_err(|e| backend("SET version", e))?;
                log::info!("Initialised ground item schema v{SCHEMA_VERSION}");
                Ok(())
            }
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => Err(StoreError::Decode(format!(
                "Unsupported ground item schema version {v} (expected {SCHEMA_VERSION})"
            ))),
        }
    }
}

#[async_trait]
impl GroundItemRepository for KeyDbGroundItemStore {
    async fn save_ground_items(
        &self,
        map_id: u16,
        items: &GroundItemSnapshot,
    ) -> Result<(), StoreError> {
        let mut con = self.keydb.connection()?;
        let key = ground_key(map_id);

        if items.is_empty() {
            let _: () = con.del(&key).await.map_err(|e| backend("DEL", e))?;
            return Ok(());
        }

        let bytes = encode(items)?;
        let _: () = con.set(&key, bytes).await.map_err(|e| backend("SET", e))?;
        Ok(())
    }

    async fn load_ground_items(&self, map_id: u16) -> Result<GroundItemSnapshot, StoreError> {
        let mut con = self.keydb.connection()?;
        let bytes: Option<Vec<u8>> = con
            .get(ground_key(map_id))
            .await
            .map_err(|e| backend("GET", e))?;

        match bytes {
            Some(bytes) if !bytes.is_empty() => decode(&bytes),
            _ => Ok(GroundItemSnapshot::new()),
        }
    }
}
