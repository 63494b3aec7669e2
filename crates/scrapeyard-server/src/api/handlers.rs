// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route handlers. Each one is a thin shim over an [`Orchestrator`] call.
//!
//! [`Orchestrator`]: crate::commands::Orchestrator

use std::io;

use axum::Json;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use futures::{StreamExt, TryStreamExt};
use scrapeyard_protocol::{Event, ExitData, Run, StartRunOptions};
use serde::Deserialize;
use tracing::warn;

use super::ApiState;
use super::error::ApiError;
use crate::blobstore::BlobStream;
use crate::commands::BodyStream;
use crate::stream::parse_stream_id;

type ApiResult<T> = std::result::Result<T, ApiError>;

const BAD_JSON: &str = "JSON in body not correctly formatted";

fn body_stream(body: Body) -> BodyStream {
    body.into_data_stream().map_err(io::Error::other).boxed()
}

fn blob_response(content_type: &'static str, blob: BlobStream) -> Response {
    ([(CONTENT_TYPE, content_type)], Body::from_stream(blob)).into_response()
}

/// GET /
pub async fn hello() -> impl IntoResponse {
    (
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        "Hello from Scrapeyard!\n",
    )
}

/// POST /runs
pub async fn create_run(State(state): State<ApiState>) -> ApiResult<Json<Run>> {
    let run = state.orchestrator.create_run().await?;
    Ok(Json(run))
}

/// GET /runs/{id}/app
pub async fn get_app(State(state): State<ApiState>, Path(id): Path<String>) -> ApiResult<Response> {
    let blob = state.orchestrator.get_app(&id).await?;
    Ok(blob_response("application/gzip", blob))
}

/// PUT /runs/{id}/app
pub async fn put_app(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<()> {
    state.orchestrator.put_app(&id, body_stream(body)).await?;
    Ok(())
}

/// GET /runs/{id}/cache
pub async fn get_cache(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let blob = state.orchestrator.get_cache(&id).await?;
    Ok(blob_response("application/gzip", blob))
}

/// PUT /runs/{id}/cache
pub async fn put_cache(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<()> {
    state.orchestrator.put_cache(&id, body_stream(body)).await?;
    Ok(())
}

/// GET /runs/{id}/output
pub async fn get_output(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let blob = state.orchestrator.get_output(&id).await?;
    Ok(blob_response("application/octet-stream", blob))
}

/// PUT /runs/{id}/output
pub async fn put_output(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Body,
) -> ApiResult<()> {
    state.orchestrator.put_output(&id, body_stream(body)).await?;
    Ok(())
}

/// GET /runs/{id}/exit-data
pub async fn get_exit_data(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ExitData>> {
    let exit_data = state.orchestrator.get_exit_data(&id).await?;
    Ok(Json(exit_data))
}

/// POST /runs/{id}/start
pub async fn start_run(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<()> {
    let options: StartRunOptions =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request(BAD_JSON))?;
    state.orchestrator.start_run(&id, options).await?;
    Ok(())
}

/// Query of `GET /runs/{id}/events`.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Resume after this event id. Empty or absent starts from the beginning.
    pub last_id: Option<String>,
}

/// GET /runs/{id}/events
///
/// Streams one JSON event per line until the `last` event. A malformed
/// `last_id` is rejected up front; a backend error ends the stream early
/// since the status line has already been sent.
pub async fn get_events(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Response {
    let last_id = query
        .last_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| "0".to_string());
    if parse_stream_id(&last_id).is_err() {
        return ApiError::bad_request(format!("invalid last_id: {}", last_id)).into_response();
    }
    let run_id = id.clone();

    let lines = state
        .orchestrator
        .get_events(&id, &last_id)
        .into_stream()
        .map(move |result| {
            let event = result.map_err(|e| {
                warn!(run_id = %run_id, error = %e, "Event stream interrupted");
                io::Error::other(e)
            })?;
            let mut line = serde_json::to_vec(&event).map_err(io::Error::other)?;
            line.push(b'\n');
            Ok::<_, io::Error>(Bytes::from(line))
        });

    (
        [(CONTENT_TYPE, "application/ld+json")],
        Body::from_stream(lines),
    )
        .into_response()
}

/// POST /runs/{id}/events
pub async fn create_event(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<()> {
    let event: Event =
        serde_json::from_slice(&body).map_err(|_| ApiError::bad_request(BAD_JSON))?;
    state.orchestrator.create_event(&id, event).await?;
    Ok(())
}

/// DELETE /runs/{id}
pub async fn delete_run(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<()> {
    state.orchestrator.delete_run(&id).await?;
    Ok(())
}
