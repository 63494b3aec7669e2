// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory blob store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use super::{BlobSource, BlobStore, BlobStoreError, BlobStream, Result};

/// Blob store keeping everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, Bytes>>>,
}

impl MemoryBlobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths currently stored, sorted.
    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.lock().await.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Raw contents of a blob, if present.
    pub async fn contents(&self, path: &str) -> Option<Bytes> {
        self.blobs.lock().await.get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, source: BlobSource, size: u64) -> Result<()> {
        let data = match source {
            BlobSource::File(file) => Bytes::from(tokio::fs::read(&file).await?),
            BlobSource::Bytes(bytes) => bytes,
        };
        if data.len() as u64 != size {
            return Err(BlobStoreError::Backend(format!(
                "{}: expected {} bytes, got {}",
                path,
                size,
                data.len()
            )));
        }
        self.blobs.lock().await.insert(path.to_string(), data);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<BlobStream> {
        let data = self
            .blobs
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(path.to_string()))?;
        Ok(Box::pin(futures::stream::once(async move { Ok(data) })))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.blobs.lock().await.remove(path);
        Ok(())
    }
}
