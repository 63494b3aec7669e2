// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client tests against a wiremock server.

use futures::TryStreamExt;
use scrapeyard_client::{Client, ClientConfig, ClientError, RunClient};
use scrapeyard_protocol::{Event, Run, Stage, StartRunOptions};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> Client {
    Client::new(ClientConfig::new().with_server_url(server.uri())).unwrap()
}

fn run(server: &MockServer) -> RunClient {
    client(server).run(Run {
        id: "abc".to_string(),
        token: "secret".to_string(),
    })
}

// ============================================================================
// Runs
// ============================================================================

#[tokio::test]
async fn test_create_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runs"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"id": "abc", "token": "secret"})),
        )
        .mount(&server)
        .await;

    let run = client(&server).create_run().await.unwrap();
    assert_eq!(run.id(), "abc");
    assert_eq!(run.token(), "secret");
}

#[tokio::test]
async fn test_hello() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello from Scrapeyard!\n"))
        .mount(&server)
        .await;

    assert_eq!(
        client(&server).hello().await.unwrap(),
        "Hello from Scrapeyard!\n"
    );
}

#[tokio::test]
async fn test_start_sends_options_with_bearer() {
    let server = MockServer::start().await;
    let options = StartRunOptions {
        output: "out.json".to_string(),
        max_run_time: 60,
        ..StartRunOptions::default()
    };
    Mock::given(method("POST"))
        .and(path("/runs/abc/start"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(&options))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    run(&server).start(&options).await.unwrap();
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_error_envelope_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runs/abc/start"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            serde_json::json!({"error": "app needs to be uploaded before starting a run"}),
        ))
        .mount(&server)
        .await;

    let err = run(&server)
        .start(&StartRunOptions::default())
        .await
        .unwrap_err();
    match err {
        ClientError::Server { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "app needs to be uploaded before starting a run");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/runs/abc/output"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(serde_json::json!({"error": "abc/output: not found"})),
        )
        .mount(&server)
        .await;

    let err = run(&server).get_output().await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.status(), Some(404));
}

// ============================================================================
// Archives and output
// ============================================================================

#[tokio::test]
async fn test_cache_to_directory_tolerates_missing_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/runs/abc/cache"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    assert!(!run(&server).get_cache_to_directory(dir.path()).await.unwrap());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_app_directory_round_trip() {
    let server = MockServer::start().await;
    let src = tempfile::tempdir().unwrap();
    std::fs::write(src.path().join("Procfile"), "scraper: ./run.sh\n").unwrap();
    std::fs::write(src.path().join("run.sh"), "echo hi\n").unwrap();
    std::fs::create_dir(src.path().join("output")).unwrap();
    std::fs::write(src.path().join("output/stale"), "old").unwrap();

    Mock::given(method("PUT"))
        .and(path("/runs/abc/app"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    run(&server)
        .put_app_from_directory(src.path(), &["output"])
        .await
        .unwrap();

    let uploaded = server.received_requests().await.unwrap()[0].body.clone();
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/runs/abc/app"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(uploaded))
        .mount(&server)
        .await;

    let dest = tempfile::tempdir().unwrap();
    run(&server).get_app_to_directory(dest.path()).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(dest.path().join("Procfile")).unwrap(),
        "scraper: ./run.sh\n"
    );
    assert!(dest.path().join("run.sh").exists());
    assert!(!dest.path().join("output").exists());
}

#[tokio::test]
async fn test_put_output_from_missing_file_is_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let uploaded = run(&server)
        .put_output_from_file(&dir.path().join("missing"))
        .await
        .unwrap();
    assert!(!uploaded);
}

#[tokio::test]
async fn test_output_file_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/runs/abc/output"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/runs/abc/output"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"result".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("data.json");
    std::fs::write(&source, "[1,2,3]").unwrap();
    assert!(run(&server).put_output_from_file(&source).await.unwrap());

    let received = server.received_requests().await.unwrap();
    assert_eq!(received[0].body, b"[1,2,3]");

    let dest = dir.path().join("downloaded");
    run(&server).get_output_to_file(&dest).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), b"result");
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_create_event_returns_bytes_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/runs/abc/events"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let sent = run(&server).create_start_event(Stage::Build).await.unwrap();

    let received = server.received_requests().await.unwrap();
    assert_eq!(sent, received[0].body.len() as u64);
    let event: Event = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(event.run_id, "abc");
    assert_eq!(event.kind(), "start");
}

#[tokio::test]
async fn test_get_events_stops_after_last() {
    let server = MockServer::start().await;
    let body = concat!(
        r#"{"id":"5-0","run_id":"abc","time":"2025-01-01T00:00:00Z","type":"start","data":{"stage":"execute"}}"#,
        "\n",
        r#"{"id":"6-0","run_id":"abc","time":"2025-01-01T00:00:01Z","type":"last","data":{}}"#,
        "\n",
    );
    Mock::given(method("GET"))
        .and(path("/runs/abc/events"))
        .and(query_param("last_id", "4-0"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/ld+json")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let events: Vec<Event> = run(&server)
        .get_events("4-0")
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id.as_deref(), Some("5-0"));
    assert!(events[1].is_last());
}
