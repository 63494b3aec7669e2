// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-run append-only event streams.
//!
//! Each run owns one stream keyed by its id. Appending assigns an id of the
//! form `{millis}-{seq}`; ids are strictly increasing within a stream. Readers
//! keep their own cursor and pass the last id they saw; `"0"` reads from the
//! beginning.

use async_trait::async_trait;
use scrapeyard_protocol::Event;
use thiserror::Error;

mod memory;
mod redis;

pub use memory::MemoryEventStream;
pub use self::redis::RedisEventStream;

/// Errors from stream operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StreamError {
    /// A cursor was not a valid stream id.
    #[error("invalid stream id: {0}")]
    InvalidId(String),

    /// A stored entry could not be decoded.
    #[error("malformed stream entry {id}: {reason}")]
    MalformedEntry {
        /// Id of the entry.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Event (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend failure.
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Result type for stream operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// Durable, ordered, multi-reader event log per run.
#[async_trait]
pub trait EventStream: Send + Sync {
    /// Append `event` to the run's stream and return it with its assigned id.
    async fn add(&self, run_id: &str, event: Event) -> Result<Event>;

    /// Wait for the first event whose id is strictly greater than `after_id`
    /// and return it.
    async fn get(&self, run_id: &str, after_id: &str) -> Result<Event>;

    /// Drop the run's stream.
    async fn delete(&self, run_id: &str) -> Result<()>;
}

/// Parse a stream id. Accepts `ms-seq` and a bare `ms` (sequence zero).
pub fn parse_stream_id(id: &str) -> Result<(u64, u64)> {
    let invalid = || StreamError::InvalidId(id.to_string());
    let (ms, seq) = match id.split_once('-') {
        Some((ms, seq)) => (ms, seq),
        None => (id, "0"),
    };
    let ms = ms.parse().map_err(|_| invalid())?;
    let seq = seq.parse().map_err(|_| invalid())?;
    Ok((ms, seq))
}
