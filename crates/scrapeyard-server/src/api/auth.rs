// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-run bearer token authentication.

use axum::extract::{Path, Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use super::ApiState;
use super::error::ApiError;

const BEARER_PREFIX: &str = "Bearer ";

/// Marks a response as belonging to an authenticated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedRun(pub String);

/// Extract the bearer token from the `Authorization` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| ApiError::forbidden("expected Authorization header with bearer token"))
}

/// Reject requests whose bearer token does not match the run's token.
pub async fn authenticate(
    State(state): State<ApiState>,
    Path(run_id): Path<String>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = bearer_token(request.headers())?;

    let expected = match state.orchestrator.get_token(&run_id).await {
        Ok(token) => token,
        Err(e) if e.is_not_found() => {
            return Err(ApiError::not_found(format!("run {}: not found", run_id)));
        }
        Err(e) => return Err(e.into()),
    };

    if !bool::from(presented.as_bytes().ct_eq(expected.as_bytes())) {
        return Err(ApiError::forbidden(
            "Authorization header has incorrect bearer token",
        ));
    }

    let mut response = next.run(request).await;
    response.extensions_mut().insert(AuthenticatedRun(run_id));
    Ok(response)
}
