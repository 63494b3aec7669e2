// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory event stream.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use scrapeyard_protocol::Event;
use tokio::sync::{Mutex, Notify};

use super::{EventStream, Result, parse_stream_id};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<String, Vec<((u64, u64), Event)>>,
    next_seq: u64,
}

/// Event stream keeping everything in process memory.
///
/// Ids are `{n}-0` with `n` counting up across all runs, so they are strictly
/// increasing within each run.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventStream {
    inner: Arc<Mutex<Inner>>,
    appended: Arc<Notify>,
}

impl MemoryEventStream {
    /// Create an empty stream store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event currently stored for `run_id`, in order.
    pub async fn events(&self, run_id: &str) -> Vec<Event> {
        self.inner
            .lock()
            .await
            .streams
            .get(run_id)
            .map(|s| s.iter().map(|(_, e)| e.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl EventStream for MemoryEventStream {
    async fn add(&self, run_id: &str, event: Event) -> Result<Event> {
        let mut inner = self.inner.lock().await;
        inner.next_seq += 1;
        let key = (inner.next_seq, 0);
        let event = event.with_id(format!("{}-0", inner.next_seq));
        inner
            .streams
            .entry(run_id.to_string())
            .or_default()
            .push((key, event.clone()));
        drop(inner);
        self.appended.notify_waiters();
        Ok(event)
    }

    async fn get(&self, run_id: &str, after_id: &str) -> Result<Event> {
        let after = parse_stream_id(after_id)?;
        loop {
            let notified = self.appended.notified();
            tokio::pin!(notified);
            // Register before checking so an append between check and await is not missed.
            notified.as_mut().enable();

            {
                let inner = self.inner.lock().await;
                if let Some(event) = inner
                    .streams
                    .get(run_id)
                    .and_then(|s| s.iter().find(|(key, _)| *key > after))
                    .map(|(_, e)| e.clone())
                {
                    return Ok(event);
                }
            }

            notified.await;
        }
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        self.inner.lock().await.streams.remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use scrapeyard_protocol::Stage;
    use std::time::Duration;

    #[tokio::test]
    async fn test_ids_increase_per_run() {
        let stream = MemoryEventStream::new();
        let a = stream.add("run", Event::first("run", Utc::now())).await.unwrap();
        stream.add("other", Event::first("other", Utc::now())).await.unwrap();
        let b = stream
            .add("run", Event::start("run", Utc::now(), Stage::Build))
            .await
            .unwrap();

        let a = parse_stream_id(a.id.as_deref().unwrap()).unwrap();
        let b = parse_stream_id(b.id.as_deref().unwrap()).unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_get_from_beginning_and_after() {
        let stream = MemoryEventStream::new();
        let first = stream.add("run", Event::first("run", Utc::now())).await.unwrap();
        stream.add("run", Event::last("run", Utc::now())).await.unwrap();

        let got = stream.get("run", "0").await.unwrap();
        assert_eq!(got, first);

        let next = stream.get("run", first.id.as_deref().unwrap()).await.unwrap();
        assert!(next.is_last());
    }

    #[tokio::test]
    async fn test_get_blocks_until_append() {
        let stream = MemoryEventStream::new();
        let reader = {
            let stream = stream.clone();
            tokio::spawn(async move { stream.get("run", "0").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!reader.is_finished());

        stream.add("run", Event::last("run", Utc::now())).await.unwrap();
        let event = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(event.is_last());
    }

    #[tokio::test]
    async fn test_delete_drops_events() {
        let stream = MemoryEventStream::new();
        stream.add("run", Event::last("run", Utc::now())).await.unwrap();
        stream.delete("run").await.unwrap();
        assert!(stream.events("run").await.is_empty());
    }
}
