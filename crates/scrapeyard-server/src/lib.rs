// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scrapeyard Server - Run Lifecycle Orchestration
//!
//! This crate provides the HTTP API through which clients upload scrapers,
//! start runs, follow their events, and collect output and exit data.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                 Clients and in-container wrappers                     │
//! └──────────────────────────────────────────────────────────────────────┘
//!                                   │ HTTP (bearer per run)
//!                                   ▼
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                    scrapeyard-server (This Crate)                     │
//! │  ┌──────────┐   ┌───────────────────────────────────────────────┐    │
//! │  │   api    │──▶│            commands::Orchestrator              │    │
//! │  └──────────┘   └───────────────────────────────────────────────┘    │
//! │                    │            │            │             │          │
//! │              ┌─────▼────┐ ┌─────▼────┐ ┌─────▼────┐ ┌──────▼──────┐  │
//! │              │blobstore │ │ kvstore  │ │  stream  │ │jobdispatcher│  │
//! │              └─────┬────┘ └─────┬────┘ └─────┬────┘ └──────┬──────┘  │
//! └────────────────────┼────────────┼────────────┼─────────────┼─────────┘
//!                      ▼            └─────┬──────┘             ▼
//!                S3-compatible          Redis              Kubernetes
//! ```
//!
//! All run state lives in the backends; the server itself is stateless.
//!
//! # Configuration
//!
//! See [`config::Config`] for the environment variables read by the binary.

#![deny(missing_docs)]

/// HTTP routes, authentication, and traffic accounting.
pub mod api;

/// Blob storage for app, cache, and output archives.
pub mod blobstore;

/// Run lifecycle operations over the backends.
pub mod commands;

/// Server configuration loaded from environment variables.
pub mod config;

/// Error types for run operations.
pub mod error;

/// Container job creation and teardown.
pub mod jobdispatcher;

/// Namespaced key-value storage.
pub mod kvstore;

/// Embeddable runtime serving the HTTP API.
pub mod runtime;

/// Per-run append-only event streams.
pub mod stream;

pub use commands::Orchestrator;
pub use config::Config;
pub use error::Error;
