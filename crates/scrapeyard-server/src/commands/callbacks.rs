// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Callback delivery with retries.

use std::time::Duration;

use rand::Rng;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retry schedule for callback POSTs.
///
/// The delay before retry `n` (1-based) is `base_delay * 2^(n-1)` capped at
/// `max_delay`, then scaled by a random factor in `[0.5, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Upper bound of the delay before retry number `retry` (1-based).
    pub fn max_delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn jittered_delay(&self, retry: u32) -> Duration {
        let ceiling = self.max_delay_for(retry);
        ceiling.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
    }
}

/// Posts events to run callback URLs.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    http: reqwest::Client,
    policy: RetryPolicy,
}

impl Default for CallbackClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new(), RetryPolicy::default())
    }
}

impl CallbackClient {
    /// Create a client with an explicit HTTP client and retry policy.
    pub fn new(http: reqwest::Client, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    /// The retry policy in use.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// POST `body` as JSON to `url`, retrying failures and non-2xx answers.
    ///
    /// Returns the body size on success. When every attempt fails the result
    /// is [`Error::CallbackFailed`].
    pub async fn post(&self, url: &str, body: Vec<u8>) -> Result<u64> {
        let size = body.len() as u64;
        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                tokio::time::sleep(self.policy.jittered_delay(attempt - 1)).await;
            }

            let result = self
                .http
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url, attempt, size, "Callback delivered");
                    return Ok(size);
                }
                Ok(resp) => {
                    warn!(url, attempt, status = %resp.status(), "Callback rejected");
                }
                Err(e) => {
                    warn!(url, attempt, error = %e, "Callback request failed");
                }
            }
        }

        Err(Error::CallbackFailed {
            url: url.to_string(),
            attempts: max_attempts,
        })
    }
}
