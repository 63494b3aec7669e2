// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for scrapeyard-server tests.
//!
//! Provides a TestContext wiring an orchestrator to in-memory backends.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::BodyExt;
use tower::ServiceExt;

use scrapeyard_server::api::{self, ApiState};
use scrapeyard_server::blobstore::MemoryBlobStore;
use scrapeyard_server::commands::{BodyStream, CallbackClient, Orchestrator, RetryPolicy, RunSettings};
use scrapeyard_server::jobdispatcher::MockJobDispatcher;
use scrapeyard_server::kvstore::MemoryKvStore;
use scrapeyard_server::stream::MemoryEventStream;

/// Orchestrator over in-memory backends, with handles to inspect each one.
pub struct TestContext {
    pub orchestrator: Arc<Orchestrator>,
    pub blob_store: Arc<MemoryBlobStore>,
    pub kv: Arc<MemoryKvStore>,
    pub stream: Arc<MemoryEventStream>,
    pub jobs: Arc<MockJobDispatcher>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::with_dispatcher(MockJobDispatcher::new())
    }

    pub fn with_dispatcher(jobs: MockJobDispatcher) -> Self {
        let blob_store = Arc::new(MemoryBlobStore::new());
        let kv = Arc::new(MemoryKvStore::new());
        let stream = Arc::new(MemoryEventStream::new());
        let jobs = Arc::new(jobs);

        let settings = RunSettings {
            image: "scrapeyard/runner:test".to_string(),
            max_run_time: 3600,
            ..RunSettings::default()
        };
        let orchestrator = Orchestrator::new(
            blob_store.clone(),
            kv.clone(),
            stream.clone(),
            jobs.clone(),
            settings,
        )
        .with_callback_client(fast_callback_client());

        Self {
            orchestrator: Arc::new(orchestrator),
            blob_store,
            kv,
            stream,
            jobs,
        }
    }

    pub fn router(&self) -> Router {
        api::router(ApiState::new(self.orchestrator.clone()))
    }

    /// Send one request through a fresh router.
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }
}

/// Callback client retrying quickly so exhaustion tests finish fast.
pub fn fast_callback_client() -> CallbackClient {
    CallbackClient::new(
        reqwest::Client::new(),
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        },
    )
}

/// Gzip-compressed tar holding the given files.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o755);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, name, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Tar whose single entry has an absolute name, which validation rejects.
pub fn tar_gz_with_absolute_path() -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    let contents = b"root:x:0:0::/root:/bin/sh\n";
    header.set_size(contents.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(tar::EntryType::Regular);
    // Written through the raw name field; the builder refuses absolute paths.
    let name = b"/etc/passwd";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_cksum();

    let mut raw = Vec::new();
    raw.extend_from_slice(header.as_bytes());
    raw.extend_from_slice(contents);
    raw.resize(512 + 512, 0);
    raw.extend_from_slice(&[0u8; 1024]);

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&raw).unwrap();
    encoder.finish().unwrap()
}

/// The hello-world scraper app.
pub fn hello_world_app() -> Vec<u8> {
    tar_gz(&[
        ("Procfile", b"scraper: /bin/start.sh\n"),
        ("bin/start.sh", b"#!/bin/sh\necho \"Hello World!\"\n"),
    ])
}

/// A body stream yielding `data` in small chunks.
pub fn body_stream(data: Vec<u8>) -> BodyStream {
    let chunks: Vec<std::io::Result<Bytes>> = data
        .chunks(7)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    futures::stream::iter(chunks).boxed()
}

/// Collect a response body.
pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Collect a blob stream.
pub async fn collect_blob(
    mut blob: futures::stream::BoxStream<'static, std::io::Result<Bytes>>,
) -> Vec<u8> {
    let mut out = Vec::new();
    while let Some(chunk) = blob.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}
