// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for the API client.

use std::time::Duration;

use crate::error::{ClientError, Result};

/// Server URL used when none is configured.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";

/// Configuration for the [`Client`](crate::Client).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the scrapeyard server, without a trailing slash.
    pub server_url: String,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Timeout for requests with small bodies. Archive transfers and event
    /// streams are not limited.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SCRAPEYARD_SERVER_URL`: Server URL (default: "http://localhost:8080")
    /// - `SCRAPEYARD_CONNECT_TIMEOUT_MS`: Connection timeout in milliseconds (default: 10000)
    /// - `SCRAPEYARD_REQUEST_TIMEOUT_MS`: Request timeout in milliseconds (default: 30000)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Create a configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |name: &str, default: u64| -> Result<Duration> {
            match lookup(name) {
                Some(v) => v
                    .parse()
                    .map(Duration::from_millis)
                    .map_err(|e| ClientError::Config(format!("invalid {}: {}", name, e))),
                None => Ok(Duration::from_millis(default)),
            }
        };

        let server_url =
            lookup("SCRAPEYARD_SERVER_URL").unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        Ok(Self::new()
            .with_server_url(server_url)
            .with_connect_timeout(millis("SCRAPEYARD_CONNECT_TIMEOUT_MS", 10_000)?)
            .with_request_timeout(millis("SCRAPEYARD_REQUEST_TIMEOUT_MS", 30_000)?))
    }

    /// Set the server URL.
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
