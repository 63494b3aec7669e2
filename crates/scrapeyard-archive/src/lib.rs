// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scrapeyard Archive - gzip-compressed tar archives of app code and build caches
//!
//! Archives cross the API in both directions: clients upload app code, the
//! wrapper downloads it, and build caches go back and forth between runs. Every
//! archive must satisfy the same policy:
//!
//! - entries are directories, regular files or symbolic links
//! - entry paths are relative and never climb out with `..`
//! - symbolic link targets are relative
//!
//! | Operation | Description |
//! |-----------|-------------|
//! | [`validate`] | Read a whole archive and check it against the policy |
//! | [`extract`] | Validate and materialize an archive into a directory |
//! | [`create`] | Build an archive from a directory, relativizing absolute links |
//!
//! All functions are blocking. Async callers run them on
//! `tokio::task::spawn_blocking`.

#![deny(missing_docs)]

/// Archive error types.
pub mod error;

/// Reading archives: validation and extraction.
pub mod read;

/// Writing archives from a directory tree.
pub mod write;

pub use error::{ArchiveError, Result};
pub use read::{extract, validate};
pub use write::{create, create_to_writer};
