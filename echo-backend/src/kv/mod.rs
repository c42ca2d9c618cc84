//! Durable key/value store abstraction
//!
//! The tracker persists processed-mention records through this trait. Three
//! backends are available, selected by the `ECHO_STORE` environment variable:
//!
//! - `sqlite` (default): local file, TTL enforced on read
//! - `redis`: native key expiry, shared between replicas
//! - `memory`: process-local, lost on restart

mod memory;
mod redis_store;
mod sqlite;

pub use memory::MemoryKvStore;
pub use redis_store::RedisKvStore;
pub use sqlite::SqliteKvStore;

use crate::config::{Config, StoreBackend};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Trait for key/value backends
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Get a value by key. Expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a key, replacing any previous value. `ttl = None` never expires.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Set a key only if it is absent (or expired). Returns true if this call wrote it.
    /// The check and the write are a single atomic step.
    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError>;

    /// List live keys starting with `prefix`. Order is unspecified.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// Delete a key. Returns true if the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Check the backend is reachable
    async fn ping(&self) -> bool;

    /// Backend name for logging and status
    fn backend_name(&self) -> &'static str;
}

/// Create the store configured by `ECHO_STORE`
pub async fn create_kv_store(config: &Config) -> Result<Arc<dyn KvStore>, String> {
    log::info!("Initializing {} key/value store", config.store_backend.as_ref());

    let store: Arc<dyn KvStore> = match config.store_backend {
        StoreBackend::Sqlite => {
            log::info!("Opening store database at {}", config.database_url);
            Arc::new(
                SqliteKvStore::open(&config.database_url)
                    .map_err(|e| format!("Failed to open {}: {}", config.database_url, e))?,
            )
        }
        StoreBackend::Redis => Arc::new(RedisKvStore::new(&config.redis_url)?),
        StoreBackend::Memory => {
            log::warn!("Using in-memory store - processed mentions are forgotten on restart");
            Arc::new(MemoryKvStore::new())
        }
    };

    if !store.ping().await {
        return Err(format!("{} store is not reachable", store.backend_name()));
    }

    Ok(store)
}
