// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scrapeyard Protocol - wire types shared by the server, client and wrapper
//!
//! Everything in this crate crosses the HTTP API as JSON, so every type has an
//! explicit serde representation.
//!
//! # Event shape
//!
//! ```text
//! {"id":"1-0","run_id":"abc","time":"2000-01-02T03:45:00Z","type":"start","data":{"stage":"build"}}
//! ```
//!
//! | `type` | `data` |
//! |--------|--------|
//! | `first` | `{}` |
//! | `start` | `{"stage": "build" \| "execute"}` |
//! | `finish` | `{"stage": …, "exit_data": {"exit_code": …, "usage": {…}}}` |
//! | `log` | `{"stage": …, "stream": "stdout" \| "stderr" \| "interr", "text": …}` |
//! | `last` | `{}` |
//!
//! # Modules
//!
//! - [`event`]: Run events and their typed payloads
//! - [`types`]: Runs, start options and exit data
//! - [`env`]: One-line CSV encoding of environment variables for the wrapper argv

#![deny(missing_docs)]

/// Run events and their typed payloads.
pub mod event;

/// Runs, start options and exit data.
pub mod types;

/// CSV encoding of environment variables passed to the wrapper.
pub mod env;

pub use env::EnvCsvError;
pub use event::{Event, EventData, EventError, LogStream, Stage};
pub use types::{
    ApiUsage, Callback, EnvVariable, ExitData, ExitDataStage, Run, StartRunOptions, Usage,
};
