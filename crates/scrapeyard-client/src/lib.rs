// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scrapeyard Client
//!
//! HTTP client for the scrapeyard run API, used by the in-container wrapper
//! and by anything else that drives runs.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use futures::TryStreamExt;
//! use scrapeyard_client::{Client, ClientConfig};
//! use scrapeyard_protocol::StartRunOptions;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::new(ClientConfig::new().with_server_url("http://localhost:8080"))?;
//!
//! let run = client.create_run().await?;
//! run.put_app_from_directory(Path::new("./my-scraper"), &[]).await?;
//! run.start(&StartRunOptions::default()).await?;
//!
//! let events = run.get_events("").await?;
//! futures::pin_mut!(events);
//! while let Some(event) = events.try_next().await? {
//!     println!("{}", event.kind());
//! }
//!
//! let exit_data = run.get_exit_data().await?;
//! println!("finished: {}", exit_data.finished);
//! run.delete().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;

pub use client::{Client, RunClient};
pub use config::{ClientConfig, DEFAULT_SERVER_URL};
pub use error::{ClientError, Result};
