//! Persisted key-value primitive — the sole communication surface between
//! execution contexts of one logical session.
//!
//! Last-write-wins, eventually visible across contexts. No transactional
//! guarantees; the channel layers a fencing seq on top.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Backend-agnostic persisted key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Write a value (last write wins).
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Remove a key. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}
