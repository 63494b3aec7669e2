// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resumable iteration over a run's events.

use std::sync::Arc;

use futures::Stream;
use scrapeyard_protocol::Event;

use crate::error::Result;
use crate::stream::EventStream;

/// Cursor over a run's event stream.
///
/// Each call to [`EventIterator::next`] blocks until an event newer than the
/// cursor exists. [`EventIterator::more`] turns false once `last` has been
/// returned. Starting the cursor at the id of the `last` event blocks forever.
pub struct EventIterator {
    stream: Arc<dyn EventStream>,
    run_id: String,
    last_id: String,
    more: bool,
}

impl EventIterator {
    pub(crate) fn new(stream: Arc<dyn EventStream>, run_id: &str, last_id: &str) -> Self {
        Self {
            stream,
            run_id: run_id.to_string(),
            last_id: last_id.to_string(),
            more: true,
        }
    }

    /// True until the `last` event has been returned.
    pub fn more(&self) -> bool {
        self.more
    }

    /// Id of the most recently returned event, or the starting cursor.
    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    /// Wait for and return the next event.
    pub async fn next(&mut self) -> Result<Event> {
        let event = self.stream.get(&self.run_id, &self.last_id).await?;
        if let Some(id) = &event.id {
            self.last_id = id.clone();
        }
        self.more = !event.is_last();
        Ok(event)
    }

    /// Turn the iterator into a stream that ends after `last` or the first error.
    pub fn into_stream(mut self) -> impl Stream<Item = Result<Event>> + Send + 'static {
        async_stream::try_stream! {
            while self.more() {
                let event = self.next().await?;
                yield event;
            }
        }
    }
}
