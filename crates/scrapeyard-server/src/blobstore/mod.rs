// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Blob store: opaque byte containers keyed by path.
//!
//! Bucket and credentials are bound when a store is constructed, never per call.
//!
//! | Implementation | Backend |
//! |----------------|---------|
//! | [`S3BlobStore`] | Any S3-compatible object store (MinIO in a cluster) |
//! | [`MemoryBlobStore`] | Process memory, for tests and embedding |

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

mod memory;
mod s3;

pub use memory::MemoryBlobStore;
pub use s3::S3BlobStore;

/// A streamed blob body. Dropping it closes the underlying read.
pub type BlobStream = BoxStream<'static, io::Result<Bytes>>;

/// Errors from blob store operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BlobStoreError {
    /// Nothing is stored at the path.
    #[error("{0}: not found")]
    NotFound(String),

    /// The backend rejected or failed the request.
    #[error("blob store backend error: {0}")]
    Backend(String),

    /// Reading the upload source failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BlobStoreError {
    /// True when the error means the blob does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BlobStoreError::NotFound(_))
    }
}

/// Result type for blob store operations.
pub type Result<T> = std::result::Result<T, BlobStoreError>;

/// Where the bytes of an upload come from.
#[derive(Debug, Clone)]
pub enum BlobSource {
    /// A local file, typically a spooled request body.
    File(PathBuf),
    /// Bytes already in memory.
    Bytes(Bytes),
}

/// Storage for run blobs.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `size` bytes from `source` at `path`, replacing any previous blob.
    async fn put(&self, path: &str, source: BlobSource, size: u64) -> Result<()>;

    /// Stream the blob at `path`. Fails with [`BlobStoreError::NotFound`] when absent.
    async fn get(&self, path: &str) -> Result<BlobStream>;

    /// Remove the blob at `path`. Removing a missing blob succeeds.
    async fn delete(&self, path: &str) -> Result<()>;
}
