// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API.
//!
//! | Method | Path | Auth |
//! |--------|------|------|
//! | GET | `/` | none |
//! | POST | `/runs` | none |
//! | GET/PUT | `/runs/{id}/app`, `/runs/{id}/cache`, `/runs/{id}/output` | bearer |
//! | GET | `/runs/{id}/exit-data` | bearer |
//! | POST | `/runs/{id}/start` | bearer |
//! | GET/POST | `/runs/{id}/events` | bearer |
//! | DELETE | `/runs/{id}` | bearer |

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

use crate::commands::Orchestrator;

pub mod auth;
pub mod error;
pub mod handlers;
pub mod traffic;

pub use error::ApiError;

/// State shared by all handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Run operations.
    pub orchestrator: Arc<Orchestrator>,
}

impl ApiState {
    /// Wrap an orchestrator.
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }
}

/// Build the full API router.
pub fn router(state: ApiState) -> Router {
    let runs = Router::new()
        .route("/runs/{id}", delete(handlers::delete_run))
        .route(
            "/runs/{id}/app",
            get(handlers::get_app).put(handlers::put_app),
        )
        .route(
            "/runs/{id}/cache",
            get(handlers::get_cache).put(handlers::put_cache),
        )
        .route(
            "/runs/{id}/output",
            get(handlers::get_output).put(handlers::put_output),
        )
        .route("/runs/{id}/exit-data", get(handlers::get_exit_data))
        .route("/runs/{id}/start", post(handlers::start_run))
        .route(
            "/runs/{id}/events",
            get(handlers::get_events).post(handlers::create_event),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::authenticate));

    Router::new()
        .route("/", get(handlers::hello))
        .route("/runs", post(handlers::create_run))
        .merge(runs)
        .layer(from_fn_with_state(state.clone(), traffic::track_traffic))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
