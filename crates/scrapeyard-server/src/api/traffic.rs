// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Request logging and API traffic accounting.
//!
//! Peers are classified as internal (RFC 1918 / RFC 4193 addresses) or
//! external. For authenticated run requests from external peers the request
//! and response body bytes are added to the run's API counters once the
//! response body is done.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;
use futures::TryStreamExt;
use tracing::{info, warn};

use super::ApiState;
use super::auth::AuthenticatedRun;
use crate::commands::Orchestrator;

/// True for RFC 1918 IPv4 and RFC 4193 IPv6 addresses.
pub fn is_private(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private(IpAddr::V4(v4)),
            None => v6.octets()[0] & 0xfe == 0xfc,
        },
    }
}

fn peer_label(external: Option<bool>) -> &'static str {
    match external {
        Some(true) => "external",
        Some(false) => "internal",
        None => "?",
    }
}

/// Records a run's traffic when dropped.
struct TrafficGuard {
    orchestrator: Arc<Orchestrator>,
    run_id: String,
    bytes_in: Arc<AtomicU64>,
    bytes_out: AtomicU64,
}

impl Drop for TrafficGuard {
    fn drop(&mut self) {
        let network_in = self.bytes_in.load(Ordering::Relaxed);
        let network_out = self.bytes_out.load(Ordering::Relaxed);
        if network_in == 0 && network_out == 0 {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let orchestrator = self.orchestrator.clone();
        let run_id = std::mem::take(&mut self.run_id);
        handle.spawn(async move {
            if let Err(e) = orchestrator
                .record_traffic(&run_id, true, network_in, network_out)
                .await
            {
                warn!(run_id = %run_id, error = %e, "Failed to record API traffic");
            }
        });
    }
}

/// Log every request and account external traffic of authenticated runs.
pub async fn track_traffic(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let external = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| !is_private(addr.ip()));
    info!(
        peer = peer_label(external),
        method = %request.method(),
        uri = %request.uri(),
        "Request"
    );

    // Deleting a run removes its counters; recording afterwards would resurrect them.
    let count = external == Some(true) && request.method() != Method::DELETE;
    if !count {
        return next.run(request).await;
    }

    let bytes_in = Arc::new(AtomicU64::new(0));
    let (parts, body) = request.into_parts();
    let counter = bytes_in.clone();
    let body = Body::from_stream(body.into_data_stream().inspect_ok(move |chunk| {
        counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }));
    let response = next.run(Request::from_parts(parts, body)).await;

    let Some(AuthenticatedRun(run_id)) = response.extensions().get::<AuthenticatedRun>().cloned()
    else {
        return response;
    };

    let guard = TrafficGuard {
        orchestrator: state.orchestrator.clone(),
        run_id,
        bytes_in,
        bytes_out: AtomicU64::new(0),
    };
    let (parts, body) = response.into_parts();
    let body = Body::from_stream(body.into_data_stream().inspect_ok(move |chunk| {
        guard
            .bytes_out
            .fetch_add(chunk.len() as u64, Ordering::Relaxed);
    }));
    Response::from_parts(parts, body)
}
