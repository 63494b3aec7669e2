// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Redis Streams implementation.
//!
//! Events are stored as a single `json` field per entry under the bare run id.
//! Blocking reads would stall every other command pipelined on a shared
//! connection, so reads use dedicated connections from a small pool.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamReadOptions, StreamReadReply};
use scrapeyard_protocol::Event;
use tokio::sync::Mutex;
use tracing::trace;

use super::{EventStream, Result, StreamError};
use crate::config::RedisConfig;

/// Field holding the serialized event in each stream entry.
const JSON_FIELD: &str = "json";

/// How long a single XREAD blocks before the read loop re-issues it.
const BLOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle reader connections kept for reuse.
const MAX_IDLE_READERS: usize = 16;

/// Event stream backed by Redis Streams.
#[derive(Clone)]
pub struct RedisEventStream {
    client: redis::Client,
    conn: ConnectionManager,
    readers: Arc<Mutex<Vec<MultiplexedConnection>>>,
}

impl RedisEventStream {
    /// Connect to Redis.
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url().as_str())?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self {
            client,
            conn,
            readers: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn reader(&self) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.readers.lock().await.pop() {
            return Ok(conn);
        }
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    async fn release(&self, conn: MultiplexedConnection) {
        let mut readers = self.readers.lock().await;
        if readers.len() < MAX_IDLE_READERS {
            readers.push(conn);
        }
    }
}

#[async_trait]
impl EventStream for RedisEventStream {
    async fn add(&self, run_id: &str, event: Event) -> Result<Event> {
        let json = serde_json::to_string(&event)?;
        let mut conn = self.conn.clone();
        let id: String = conn.xadd(run_id, "*", &[(JSON_FIELD, json)]).await?;
        Ok(event.with_id(id))
    }

    async fn get(&self, run_id: &str, after_id: &str) -> Result<Event> {
        super::parse_stream_id(after_id)?;
        let options = StreamReadOptions::default()
            .count(1)
            .block(BLOCK_TIMEOUT.as_millis() as usize);

        loop {
            let mut conn = self.reader().await?;
            // A failed read may leave the connection mid-reply; it is dropped, not released.
            let reply: Option<StreamReadReply> = conn
                .xread_options(&[run_id], &[after_id], &options)
                .await?;
            self.release(conn).await;

            let Some(entry) = reply
                .and_then(|r| r.keys.into_iter().next())
                .and_then(|k| k.ids.into_iter().next())
            else {
                trace!(run_id, after_id, "No new event yet");
                continue;
            };

            let json: String =
                entry
                    .get(JSON_FIELD)
                    .ok_or_else(|| StreamError::MalformedEntry {
                        id: entry.id.clone(),
                        reason: format!("missing {} field", JSON_FIELD),
                    })?;
            let event: Event = serde_json::from_str(&json)?;
            return Ok(event.with_id(entry.id));
        }
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(run_id).await?;
        Ok(())
    }
}
