// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory key-value store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{KvError, KvStore, Result, namespaced};

/// Key-value store keeping everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Caller-level keys starting with `prefix`, sorted.
    pub async fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let full = namespaced(prefix);
        let mut keys: Vec<String> = self
            .values
            .lock()
            .await
            .keys()
            .filter(|k| k.starts_with(&full))
            .map(|k| k[super::KEY_PREFIX.len()..].to_string())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .await
            .insert(namespaced(key), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<String> {
        self.values
            .lock()
            .await
            .get(&namespaced(key))
            .cloned()
            .ok_or_else(|| KvError::KeyNotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.values.lock().await.remove(&namespaced(key));
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let mut values = self.values.lock().await;
        let entry = values.entry(namespaced(key)).or_insert_with(|| "0".to_string());
        let current: i64 = entry.parse().map_err(|_| KvError::NotAnInteger {
            key: key.to_string(),
            value: entry.clone(),
        })?;
        let next = current + delta;
        *entry = next.to_string();
        Ok(next)
    }
}
