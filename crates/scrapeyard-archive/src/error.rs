// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for scrapeyard-archive.

use thiserror::Error;

/// Archive errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ArchiveError {
    /// The archive is malformed or breaks the path policy.
    #[error("archive format: {0}")]
    Format(String),

    /// Reading or writing the local filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Walking a directory tree failed.
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}

impl ArchiveError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ArchiveError::Format(msg.into())
    }

    /// True when the archive itself was rejected, as opposed to a local I/O failure.
    pub fn is_format(&self) -> bool {
        matches!(self, ArchiveError::Format(_))
    }
}

/// Result type for archive operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;
