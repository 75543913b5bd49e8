//! Single-use record storage.
//!
//! The submit-time guard bridges two HTTP requests (render and submit), so
//! its single-use records are the only state that must survive across
//! requests and be visible to every instance behind a load balancer. The
//! production backend is Redis with per-key expire-after-write.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use redis::AsyncCommands;
use tokio::sync::RwLock;

use palisade_common::GateError;

/// Keyed store with per-key TTL and explicit removal.
pub trait SingleUseStore: Send + Sync {
    /// Write a record that expires `ttl_secs` after the write
    fn put(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> impl Future<Output = Result<(), GateError>> + Send;

    /// Read a record if present and not expired
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, GateError>> + Send;

    /// Delete a record (no-op when absent)
    fn remove(&self, key: &str) -> impl Future<Output = Result<(), GateError>> + Send;
}

/// Redis-backed store, shared across server instances.
#[derive(Clone)]
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }
}

impl SingleUseStore for RedisStore {
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), GateError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .map_err(|e| GateError::Store(e.to_string()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, GateError> {
        let mut conn = self.conn.clone();
        conn.get(key)
            .await
            .map_err(|e| GateError::Store(e.to_string()))
    }

    async fn remove(&self, key: &str) -> Result<(), GateError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| GateError::Store(e.to_string()))
    }
}

/// In-process store with lazy expiry. Suitable for single-instance
/// deployments and for the test suite; not shared across processes.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<String, (String, i64)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SingleUseStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), GateError> {
        let expires_at = chrono::Utc::now().timestamp() + ttl_secs as i64;
        self.inner
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, GateError> {
        let now = chrono::Utc::now().timestamp();
        let mut map = self.inner.write().await;
        match map.get(key) {
            Some((_, expires_at)) if *expires_at <= now => {
                map.remove(key);
                Ok(None)
            }
            Some((value, _)) => Ok(Some(value.clone())),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> Result<(), GateError> {
        self.inner.write().await.remove(key);
        Ok(())
    }
}
