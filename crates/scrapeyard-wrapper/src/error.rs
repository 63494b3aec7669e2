// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the wrapper.

use thiserror::Error;

/// Result type using WrapperError.
pub type Result<T> = std::result::Result<T, WrapperError>;

/// Failures that abort the run and ask the scheduler for a restart.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WrapperError {
    /// A call to the scrapeyard API failed.
    #[error("api error: {0}")]
    Client(#[from] scrapeyard_client::ClientError),

    /// Local filesystem or pipe I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stage command could not be parsed or started.
    #[error("command '{command}': {reason}")]
    Command {
        /// The command line as configured.
        command: String,
        /// What went wrong.
        reason: String,
    },

    /// The `--env` record could not be decoded.
    #[error("invalid environment: {0}")]
    Env(#[from] scrapeyard_protocol::EnvCsvError),

    /// A worker task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
