// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP error mapping.
//!
//! Every non-2xx answer carries `{"error": <message>}` as
//! `application/json; charset=utf-8`.

use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::{debug, error};

use crate::error::Error;

/// Message sent in place of the cause of every internal error.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Error answered by an API handler.
#[derive(Debug)]
pub enum ApiError {
    /// 400
    BadRequest(String),
    /// 403
    Forbidden(String),
    /// 404
    NotFound(String),
    /// 500. The message is logged, never sent.
    Internal(String),
}

impl ApiError {
    /// Shorthand for [`ApiError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Shorthand for [`ApiError::Forbidden`].
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Shorthand for [`ApiError::NotFound`].
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Shorthand for [`ApiError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// HTTP status of this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::ArchiveFormat | Error::AppNotAvailable | Error::MaxRunTimeTooLarge(_) => {
                Self::BadRequest(err.to_string())
            }
            e if e.is_not_found() => Self::NotFound(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::Internal(cause) => {
                error!(error = %cause, "Internal server error");
                INTERNAL_ERROR_MESSAGE.to_string()
            }
            Self::BadRequest(m) | Self::Forbidden(m) | Self::NotFound(m) => {
                debug!(status = status.as_u16(), error = %m, "Request failed");
                m
            }
        };

        let body = serde_json::json!({ "error": message }).to_string();
        let mut response = (status, body).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    }
}
