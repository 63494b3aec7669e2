// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Key-value store for small per-run values.
//!
//! Implementations prefix every key with `kv:` so they never collide with
//! event streams living in the same backend. Callers pass bare keys such as
//! `{run_id}/token`.

use async_trait::async_trait;
use thiserror::Error;

mod memory;
mod redis;

pub use memory::MemoryKvStore;
pub use self::redis::RedisKvStore;

/// Prefix applied to every key by the implementations.
pub const KEY_PREFIX: &str = "kv:";

/// Full backend key for a caller's key.
pub fn namespaced(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}

/// Errors from key-value operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KvError {
    /// The key has no value.
    #[error("{0}: not found")]
    KeyNotFound(String),

    /// The stored value is not a valid counter.
    #[error("{key}: not an integer: {value}")]
    NotAnInteger {
        /// Key holding the value.
        key: String,
        /// Offending value.
        value: String,
    },

    /// Backend failure.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

impl KvError {
    /// True when the key was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::KeyNotFound(_))
    }
}

/// Result type for key-value operations.
pub type Result<T> = std::result::Result<T, KvError>;

/// Small string values keyed by run-scoped paths.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` to `value`.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Read `key`. Fails with [`KvError::KeyNotFound`] when absent.
    async fn get(&self, key: &str) -> Result<String>;

    /// Remove `key`. Removing a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Atomically add `delta` to the integer at `key`, treating a missing key
    /// as zero. Returns the new value.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64>;
}
