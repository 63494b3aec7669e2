// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for scrapeyard-server.

use thiserror::Error;

use crate::blobstore::BlobStoreError;
use crate::jobdispatcher::JobDispatcherError;
use crate::kvstore::KvError;
use crate::stream::StreamError;

/// Orchestrator errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Blob store operation failed.
    #[error("Blob store error: {0}")]
    BlobStore(BlobStoreError),

    /// Key-value store operation failed.
    #[error("Key-value store error: {0}")]
    Kv(KvError),

    /// Event stream operation failed.
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// Job dispatcher failed.
    #[error("Job dispatcher error: {0}")]
    JobDispatcher(#[from] JobDispatcherError),

    /// An uploaded archive failed validation.
    #[error("archive format")]
    ArchiveFormat,

    /// Reading or writing an archive failed for a reason other than its format.
    #[error("Archive error: {0}")]
    Archive(scrapeyard_archive::ArchiveError),

    /// A blob, key or run does not exist.
    #[error("{0}: not found")]
    NotFound(String),

    /// A run was started before its app was uploaded.
    #[error("app needs to be uploaded before starting a run")]
    AppNotAvailable,

    /// The requested deadline exceeds the server's ceiling.
    #[error("max_run_time should not be larger than {0}")]
    MaxRunTimeTooLarge(u64),

    /// The environment could not be encoded for the wrapper.
    #[error("Environment encoding error: {0}")]
    Env(#[from] scrapeyard_protocol::EnvCsvError),

    /// Every callback attempt failed.
    #[error("callback to {url} failed after {attempts} attempts")]
    CallbackFailed {
        /// Callback URL.
        url: String,
        /// Attempts made.
        attempts: u32,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors meaning something does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Kv(e) => e.is_not_found(),
            Error::BlobStore(e) => e.is_not_found(),
            _ => false,
        }
    }
}

impl From<BlobStoreError> for Error {
    fn from(err: BlobStoreError) -> Self {
        match err {
            BlobStoreError::NotFound(path) => Error::NotFound(path),
            other => Error::BlobStore(other),
        }
    }
}

impl From<KvError> for Error {
    fn from(err: KvError) -> Self {
        match err {
            KvError::KeyNotFound(key) => Error::NotFound(key),
            other => Error::Kv(other),
        }
    }
}

impl From<scrapeyard_archive::ArchiveError> for Error {
    fn from(err: scrapeyard_archive::ArchiveError) -> Self {
        if err.is_format() {
            Error::ArchiveFormat
        } else {
            Error::Archive(err)
        }
    }
}

/// Result type using the orchestrator [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_conversions() {
        let err: Error = BlobStoreError::NotFound("run/app.tgz".to_string()).into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "run/app.tgz: not found");

        let err: Error = KvError::KeyNotFound("run/token".to_string()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::AppNotAvailable.to_string(),
            "app needs to be uploaded before starting a run"
        );
        assert_eq!(Error::ArchiveFormat.to_string(), "archive format");
        assert_eq!(
            Error::MaxRunTimeTooLarge(86400).to_string(),
            "max_run_time should not be larger than 86400"
        );
    }
}
