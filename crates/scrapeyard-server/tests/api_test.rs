// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API tests driving the router with `tower::ServiceExt::oneshot`.

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{Method, Request, StatusCode};
use chrono::Utc;
use scrapeyard_protocol::{Event, ExitDataStage, Run, Stage, Usage};

use common::*;

fn request(method: Method, uri: &str, token: Option<&str>, body: Body) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(body).unwrap()
}

fn from_peer(mut request: Request<Body>, peer: &str) -> Request<Body> {
    let addr: SocketAddr = peer.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

async fn create_run(ctx: &TestContext) -> Run {
    let response = ctx
        .send(request(Method::POST, "/runs", None, Body::empty()))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    serde_json::from_value(body_json(response).await).unwrap()
}

async fn put_app(ctx: &TestContext, run: &Run, app: Vec<u8>) -> StatusCode {
    ctx.send(request(
        Method::PUT,
        &format!("/runs/{}/app", run.id),
        Some(&run.token),
        Body::from(app),
    ))
    .await
    .status()
}

fn start_body() -> Body {
    Body::from(
        r#"{"output":"","env":[],"callback":{"url":""},"max_run_time":3600,"memory":536870912}"#,
    )
}

// ============================================================================
// Health and run creation
// ============================================================================

#[tokio::test]
async fn test_hello() {
    let ctx = TestContext::new();
    let response = ctx.send(request(Method::GET, "/", None, Body::empty())).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()[CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(&body_bytes(response).await[..], b"Hello from Scrapeyard!\n");
}

#[tokio::test]
async fn test_create_run_returns_id_and_token() {
    let ctx = TestContext::new();
    let response = ctx
        .send(request(Method::POST, "/runs", None, Body::empty()))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
    let run: Run = serde_json::from_value(body_json(response).await).unwrap();
    assert!(!run.id.is_empty());
    assert_eq!(run.token.len(), 32);
    assert!(ctx.orchestrator.is_run_created(&run.id).await.unwrap());
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_wrong_token_is_forbidden() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/app", run.id),
            Some("wrong"),
            Body::empty(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/json; charset=utf-8"
    );
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "Authorization header has incorrect bearer token"})
    );
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let ctx = TestContext::new();
    let response = ctx
        .send(request(
            Method::GET,
            "/runs/ghost/app",
            Some("anything"),
            Body::empty(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "run ghost: not found"})
    );
}

#[tokio::test]
async fn test_missing_bearer_is_forbidden() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/exit-data", run.id),
            None,
            Body::empty(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "expected Authorization header with bearer token"})
    );
}

// ============================================================================
// Archives and output
// ============================================================================

#[tokio::test]
async fn test_app_round_trip() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    let app = hello_world_app();

    assert_eq!(put_app(&ctx, &run, app.clone()).await, StatusCode::OK);

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/app", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/gzip");
    assert_eq!(body_bytes(response).await.to_vec(), app);
}

#[tokio::test]
async fn test_bad_archive_is_rejected_and_not_stored() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let response = ctx
        .send(request(
            Method::PUT,
            &format!("/runs/{}/app", run.id),
            Some(&run.token),
            Body::from(tar_gz_with_absolute_path()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "archive format"})
    );

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/app", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cache_not_found_before_upload() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/cache", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let cache = tar_gz(&[("layers/env", b"PATH=/app/bin\n")]);
    let response = ctx
        .send(request(
            Method::PUT,
            &format!("/runs/{}/cache", run.id),
            Some(&run.token),
            Body::from(cache.clone()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/cache", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await.to_vec(), cache);
}

#[tokio::test]
async fn test_output_is_opaque() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    // Not an archive; output is stored as-is.
    let output = b"id,name\n1,scrapeyard\n".to_vec();
    let response = ctx
        .send(request(
            Method::PUT,
            &format!("/runs/{}/output", run.id),
            Some(&run.token),
            Body::from(output.clone()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/output", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/octet-stream"
    );
    assert_eq!(body_bytes(response).await.to_vec(), output);
}

// ============================================================================
// Start
// ============================================================================

#[tokio::test]
async fn test_start_before_app_upload() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let response = ctx
        .send(request(
            Method::POST,
            &format!("/runs/{}/start", run.id),
            Some(&run.token),
            start_body(),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "app needs to be uploaded before starting a run"})
    );
    assert_eq!(ctx.jobs.job_count().await, 0);
}

#[tokio::test]
async fn test_start_with_bad_json() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    assert_eq!(put_app(&ctx, &run, hello_world_app()).await, StatusCode::OK);

    let response = ctx
        .send(request(
            Method::POST,
            &format!("/runs/{}/start", run.id),
            Some(&run.token),
            Body::from("{not json"),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "JSON in body not correctly formatted"})
    );
}

#[tokio::test]
async fn test_start_dispatches_job() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    assert_eq!(put_app(&ctx, &run, hello_world_app()).await, StatusCode::OK);

    let response = ctx
        .send(request(
            Method::POST,
            &format!("/runs/{}/start", run.id),
            Some(&run.token),
            start_body(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let job = ctx.jobs.job(&run.id).await.unwrap();
    assert_eq!(job.spec.memory, 536_870_912);
    assert_eq!(job.spec.max_run_time, 3600);
    assert_eq!(
        job.spec.command,
        vec!["/bin/wrapper", run.id.as_str(), "--output", ""]
    );
}

#[tokio::test]
async fn test_start_rejects_excessive_max_run_time() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    assert_eq!(put_app(&ctx, &run, hello_world_app()).await, StatusCode::OK);

    let response = ctx
        .send(request(
            Method::POST,
            &format!("/runs/{}/start", run.id),
            Some(&run.token),
            Body::from(r#"{"max_run_time":7200}"#),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"error": "max_run_time should not be larger than 3600"})
    );
}

// ============================================================================
// Events
// ============================================================================

async fn post_event(ctx: &TestContext, run: &Run, event: &Event) -> StatusCode {
    ctx.send(request(
        Method::POST,
        &format!("/runs/{}/events", run.id),
        Some(&run.token),
        Body::from(serde_json::to_vec(event).unwrap()),
    ))
    .await
    .status()
}

fn parse_lines(bytes: &[u8]) -> Vec<Event> {
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_slice(line).unwrap())
        .collect()
}

#[tokio::test]
async fn test_event_stream_until_last() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    let now = Utc::now();

    let events = [
        Event::start(&run.id, now, Stage::Build),
        Event::finish(
            &run.id,
            now,
            Stage::Build,
            ExitDataStage {
                exit_code: 0,
                usage: Usage::default(),
            },
        ),
        Event::last(&run.id, now),
    ];
    for event in &events {
        assert_eq!(post_event(&ctx, &run, event).await, StatusCode::OK);
    }

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/events", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_TYPE], "application/ld+json");

    let received = parse_lines(&body_bytes(response).await);
    assert_eq!(received.len(), 3);
    assert_eq!(
        received.iter().map(|e| e.kind()).collect::<Vec<_>>(),
        vec!["start", "finish", "last"]
    );
    assert!(received.iter().all(|e| e.id.is_some()));
}

#[tokio::test]
async fn test_event_stream_resumes_after_last_id() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    let now = Utc::now();

    for i in 0..5 {
        let event = Event::log(
            &run.id,
            now,
            Some(Stage::Execute),
            scrapeyard_protocol::LogStream::Stdout,
            format!("line {}", i),
        );
        assert_eq!(post_event(&ctx, &run, &event).await, StatusCode::OK);
    }
    assert_eq!(
        post_event(&ctx, &run, &Event::last(&run.id, now)).await,
        StatusCode::OK
    );

    let all = ctx.stream.events(&run.id).await;
    let resume_from = all[2].id.clone().unwrap();

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/events?last_id={}", run.id, resume_from),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    let received = parse_lines(&body_bytes(response).await);

    let expected_ids: Vec<_> = all[3..].iter().map(|e| e.id.clone()).collect();
    let received_ids: Vec<_> = received.iter().map(|e| e.id.clone()).collect();
    assert_eq!(received_ids, expected_ids);
    assert!(received.last().unwrap().is_last());
}

#[tokio::test]
async fn test_event_stream_rejects_malformed_last_id() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/events?last_id=abc", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers()[CONTENT_TYPE],
        "application/json; charset=utf-8"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid last_id: abc");
}

#[tokio::test]
async fn test_create_event_with_bad_json() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let response = ctx
        .send(request(
            Method::POST,
            &format!("/runs/{}/events", run.id),
            Some(&run.token),
            Body::from(r#"{"type":"nonsense"}"#),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// ============================================================================
// Exit data and deletion
// ============================================================================

#[tokio::test]
async fn test_exit_data_reflects_events() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    let now = Utc::now();

    let finish = Event::finish(
        &run.id,
        now,
        Stage::Build,
        ExitDataStage {
            exit_code: 3,
            usage: Usage {
                max_rss: 1024,
                network_in: 10,
                network_out: 20,
                ..Usage::default()
            },
        },
    );
    assert_eq!(post_event(&ctx, &run, &finish).await, StatusCode::OK);
    assert_eq!(
        post_event(&ctx, &run, &Event::last(&run.id, now)).await,
        StatusCode::OK
    );

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/exit-data", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let exit_data = body_json(response).await;
    assert_eq!(exit_data["build"]["exit_code"], 3);
    assert_eq!(exit_data["build"]["usage"]["max_rss"], 1024);
    assert!(exit_data.get("execute").is_none());
    assert_eq!(exit_data["finished"], true);
}

#[tokio::test]
async fn test_delete_run_removes_everything() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    assert_eq!(put_app(&ctx, &run, hello_world_app()).await, StatusCode::OK);
    assert_eq!(
        ctx.send(request(
            Method::POST,
            &format!("/runs/{}/start", run.id),
            Some(&run.token),
            start_body(),
        ))
        .await
        .status(),
        StatusCode::OK
    );

    let response = ctx
        .send(request(
            Method::DELETE,
            &format!("/runs/{}", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert!(!ctx.orchestrator.is_run_created(&run.id).await.unwrap());
    assert!(ctx.blob_store.paths().await.is_empty());
    assert!(
        ctx.kv
            .keys_with_prefix(&format!("kv:{}/", run.id))
            .await
            .is_empty()
    );
    assert!(ctx.jobs.job(&run.id).await.unwrap().deleted);

    let response = ctx
        .send(request(
            Method::GET,
            &format!("/runs/{}/app", run.id),
            Some(&run.token),
            Body::empty(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Traffic accounting
// ============================================================================

async fn wait_for_api_usage(ctx: &TestContext, run: &Run) -> (u64, u64) {
    for _ in 0..50 {
        let exit_data = ctx.orchestrator.get_exit_data(&run.id).await.unwrap();
        if exit_data.api.network_in > 0 || exit_data.api.network_out > 0 {
            return (exit_data.api.network_in, exit_data.api.network_out);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    (0, 0)
}

#[tokio::test]
async fn test_external_traffic_is_recorded() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;
    let output = vec![b'x'; 1000];

    let put = from_peer(
        request(
            Method::PUT,
            &format!("/runs/{}/output", run.id),
            Some(&run.token),
            Body::from(output.clone()),
        ),
        "203.0.113.9:40000",
    );
    assert_eq!(ctx.send(put).await.status(), StatusCode::OK);
    let (network_in, _) = wait_for_api_usage(&ctx, &run).await;
    assert_eq!(network_in, 1000);

    let get = from_peer(
        request(
            Method::GET,
            &format!("/runs/{}/output", run.id),
            Some(&run.token),
            Body::empty(),
        ),
        "203.0.113.9:40000",
    );
    let response = ctx.send(get).await;
    assert_eq!(body_bytes(response).await.len(), 1000);

    let mut network_out = 0;
    for _ in 0..50 {
        network_out = ctx
            .orchestrator
            .get_exit_data(&run.id)
            .await
            .unwrap()
            .api
            .network_out;
        if network_out > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(network_out, 1000);
}

#[tokio::test]
async fn test_internal_traffic_is_not_recorded() {
    let ctx = TestContext::new();
    let run = create_run(&ctx).await;

    let put = from_peer(
        request(
            Method::PUT,
            &format!("/runs/{}/output", run.id),
            Some(&run.token),
            Body::from(vec![b'x'; 1000]),
        ),
        "10.0.0.7:40000",
    );
    assert_eq!(ctx.send(put).await.status(), StatusCode::OK);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let exit_data = ctx.orchestrator.get_exit_data(&run.id).await.unwrap();
    assert_eq!(exit_data.api.network_in, 0);
    assert_eq!(exit_data.api.network_out, 0);
}
