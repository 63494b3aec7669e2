// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runs, start options and exit data.

use serde::{Deserialize, Serialize};

/// What a client receives when it creates a run, and what it needs to drive it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Opaque run identifier.
    pub id: String,
    /// Per-run bearer token. Only returned at creation.
    pub token: String,
}

/// Body of `POST /runs/{id}/start`.
///
/// Missing fields take their zero value, so `{}` is a valid body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartRunOptions {
    /// Path, relative to the app directory, of the file uploaded as the run's output.
    pub output: String,
    /// Where every event of the run is posted.
    pub callback: Callback,
    /// Environment variables for build and execute.
    pub env: Vec<EnvVariable>,
    /// Deadline in seconds. Zero means the server's ceiling.
    pub max_run_time: u64,
    /// Memory request and limit in bytes. Zero means the server's default.
    pub memory: u64,
}

/// A callback endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Callback {
    /// URL receiving `POST`ed events. Empty disables callbacks.
    pub url: String,
}

/// A single environment variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVariable {
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

impl EnvVariable {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Resource usage of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    /// Peak resident set size in bytes.
    #[serde(default)]
    pub max_rss: u64,
    /// Bytes received by the container during the stage.
    #[serde(default)]
    pub network_in: u64,
    /// Bytes sent by the container during the stage, excluding event traffic.
    #[serde(default)]
    pub network_out: u64,
    /// Elapsed seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wall_time: Option<f64>,
    /// User plus system CPU seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_time: Option<f64>,
}

/// Exit code and usage of one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitDataStage {
    /// Process exit code, reported verbatim.
    pub exit_code: i32,
    /// Resources consumed.
    #[serde(default)]
    pub usage: Usage,
}

/// Bytes spent on API and callback traffic for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiUsage {
    /// Bytes received from external clients.
    pub network_in: u64,
    /// Bytes sent to external clients and callbacks.
    pub network_out: u64,
}

/// Aggregated exit data returned by `GET /runs/{id}/exit-data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitData {
    /// Present once the build stage has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<ExitDataStage>,
    /// Present once the execute stage has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute: Option<ExitDataStage>,
    /// API traffic accounting.
    #[serde(default)]
    pub api: ApiUsage,
    /// True once the `last` event has been recorded.
    #[serde(default)]
    pub finished: bool,
}
