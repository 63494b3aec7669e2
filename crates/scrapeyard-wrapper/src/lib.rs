// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scrapeyard Wrapper - the agent inside every run container
//!
//! The job dispatcher starts one wrapper per run. It talks to the scrapeyard
//! API with the run's bearer token, exactly like any other client:
//!
//! 1. Download the app and the build cache.
//! 2. Build the app, streaming its output as `log` events.
//! 3. Upload the build cache.
//! 4. If the build succeeded, run the app and upload its output file.
//! 5. Send `last`.
//!
//! When something goes wrong that is not the scraper's fault, the wrapper
//! sends an `interr` log event and exits non-zero so the scheduler restarts it.
//!
//! # Modules
//!
//! - [`args`]: Command line and environment configuration
//! - [`stage`]: Running one stage and streaming its output
//! - [`usage`]: Network, CPU and memory accounting per stage
//! - [`wrapper`]: The run state machine

#![deny(missing_docs)]

/// Command line and environment configuration.
pub mod args;

/// Error types.
pub mod error;

/// Running one stage and streaming its output.
pub mod stage;

/// Network, CPU and memory accounting per stage.
pub mod usage;

/// The run state machine.
pub mod wrapper;

pub use args::{Args, WrapperOptions};
pub use error::{Result, WrapperError};
pub use wrapper::{INTERNAL_ERROR_TEXT, PROCFILE, RunOutcome, Wrapper, report_internal_error};
