//! Key-value store access and the `POST /api/redis` route.
//!
//! [`RedisStore`] talks to Redis through a [`ConnectionManager`], which
//! reconnects on its own and is cheap to clone per call. [`MemoryStore`] is
//! the stand-in used when no `REDIS_URL` is configured, and in tests.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde_json::json;
use tracing::error;

use crate::error::{HandlerError, HandlerResult};
use crate::response::Response;

/// Key read by `POST /api/redis`.
pub const ITEM_KEY: &str = "item";

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Round-trips to the store. Used by the health report.
    async fn ping(&self) -> Result<(), KvError>;
}

// ── Redis ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Opens a managed connection to `redis_url`
    /// (`redis://[[user:]password@]host[:port][/db]`, `rediss://` for TLS).
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

// ── In-memory ────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn ping(&self) -> Result<(), KvError> {
        Ok(())
    }
}

// ── Route ────────────────────────────────────────────────────────────────────

/// `POST /api/redis` → `{ "result": <value under "item" or null> }`.
pub async fn read_item(store: Arc<dyn KeyValueStore>) -> HandlerResult {
    match store.get(ITEM_KEY).await {
        Ok(value) => Ok(Response::json(&json!({ "result": value }))),
        Err(e) => {
            error!(key = ITEM_KEY, "key-value read failed: {e}");
            Err(HandlerError::Internal("Failed to read from store".to_owned()))
        }
    }
}
