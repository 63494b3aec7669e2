// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the scrapeyard HTTP API.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use scrapeyard_protocol::{
    Event, ExitData, ExitDataStage, LogStream, Run, Stage, StartRunOptions,
};
use serde::Deserialize;
use tokio_util::io::{StreamReader, SyncIoBridge};
use tracing::{debug, instrument};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Body of every non-2xx answer.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Client for a scrapeyard server.
///
/// Cloning is cheap; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    config: ClientConfig,
}

impl Client {
    /// Create a client with the given configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self { http, config })
    }

    /// Create a client from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.server_url, path)
    }

    /// Send a request, turning non-2xx answers into [`ClientError::Server`].
    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.trim().to_string());
        debug!(status = status.as_u16(), %message, "Server returned an error");
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    /// The server's greeting.
    pub async fn hello(&self) -> Result<String> {
        let request = self
            .http
            .get(self.url("/"))
            .timeout(self.config.request_timeout);
        Ok(self.send(request).await?.text().await?)
    }

    /// Create a run and return a handle carrying its token.
    #[instrument(skip(self))]
    pub async fn create_run(&self) -> Result<RunClient> {
        let request = self
            .http
            .post(self.url("/runs"))
            .timeout(self.config.request_timeout);
        let run: Run = self.send(request).await?.json().await?;
        debug!(run_id = %run.id, "Run created");
        Ok(self.run(run))
    }

    /// A handle for an existing run.
    pub fn run(&self, run: Run) -> RunClient {
        RunClient {
            client: self.clone(),
            run,
        }
    }
}

/// Operations on one run, authenticated with its bearer token.
#[derive(Debug, Clone)]
pub struct RunClient {
    client: Client,
    run: Run,
}

impl RunClient {
    /// Run id.
    pub fn id(&self) -> &str {
        &self.run.id
    }

    /// Run token.
    pub fn token(&self) -> &str {
        &self.run.token
    }

    fn request(&self, method: Method, suffix: &str) -> RequestBuilder {
        let path = format!("/runs/{}{}", self.run.id, suffix);
        self.client
            .http
            .request(method, self.client.url(&path))
            .header(AUTHORIZATION, format!("Bearer {}", self.run.token))
    }

    fn timed(&self, method: Method, suffix: &str) -> RequestBuilder {
        self.request(method, suffix)
            .timeout(self.client.config.request_timeout)
    }

    async fn get_bytes(&self, suffix: &str) -> Result<Bytes> {
        let response = self.client.send(self.request(Method::GET, suffix)).await?;
        Ok(response.bytes().await?)
    }

    async fn get_archive_to_directory(&self, suffix: &str, dir: &Path) -> Result<()> {
        let response = self.client.send(self.request(Method::GET, suffix)).await?;
        let body = response.bytes_stream().map_err(io::Error::other).boxed();
        extract_stream_to(body, dir).await
    }

    async fn put_bytes(&self, suffix: &str, body: impl Into<reqwest::Body>) -> Result<()> {
        self.client
            .send(self.request(Method::PUT, suffix).body(body))
            .await?;
        Ok(())
    }

    // =========================================================================
    // App
    // =========================================================================

    /// Download the app archive.
    pub async fn get_app(&self) -> Result<Bytes> {
        self.get_bytes("/app").await
    }

    /// Upload an app archive.
    pub async fn put_app(&self, archive: impl Into<reqwest::Body>) -> Result<()> {
        self.put_bytes("/app", archive).await
    }

    /// Download the app archive and extract it into `dir` as it arrives.
    pub async fn get_app_to_directory(&self, dir: &Path) -> Result<()> {
        self.get_archive_to_directory("/app", dir).await
    }

    /// Archive `dir` and upload it as the app. Paths in `ignore` (relative to
    /// `dir`) are left out.
    pub async fn put_app_from_directory(&self, dir: &Path, ignore: &[&str]) -> Result<()> {
        let archive = create_from(dir, ignore).await?;
        self.put_app(archive).await
    }

    // =========================================================================
    // Cache
    // =========================================================================

    /// Download the build cache archive.
    pub async fn get_cache(&self) -> Result<Bytes> {
        self.get_bytes("/cache").await
    }

    /// Upload a build cache archive.
    pub async fn put_cache(&self, archive: impl Into<reqwest::Body>) -> Result<()> {
        self.put_bytes("/cache", archive).await
    }

    /// Download the cache and extract it into `dir`. Returns false, without
    /// touching `dir`, when no cache has been uploaded.
    pub async fn get_cache_to_directory(&self, dir: &Path) -> Result<bool> {
        match self.get_archive_to_directory("/cache", dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Archive `dir` and upload it as the cache.
    pub async fn put_cache_from_directory(&self, dir: &Path) -> Result<()> {
        let archive = create_from(dir, &[]).await?;
        self.put_cache(archive).await
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Download the output.
    pub async fn get_output(&self) -> Result<Bytes> {
        self.get_bytes("/output").await
    }

    /// Upload the output.
    pub async fn put_output(&self, output: impl Into<reqwest::Body>) -> Result<()> {
        self.put_bytes("/output", output).await
    }

    /// Upload the contents of `path` as the output. Returns false when the
    /// file does not exist, in which case nothing is uploaded.
    pub async fn put_output_from_file(&self, path: &Path) -> Result<bool> {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No output file to upload");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        self.put_output(file).await?;
        Ok(true)
    }

    /// Download the output into `path`.
    pub async fn get_output_to_file(&self, path: &Path) -> Result<()> {
        let output = self.get_output().await?;
        tokio::fs::write(path, &output).await?;
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the run.
    #[instrument(skip_all, fields(run_id = %self.run.id))]
    pub async fn start(&self, options: &StartRunOptions) -> Result<()> {
        self.client
            .send(self.timed(Method::POST, "/start").json(options))
            .await?;
        Ok(())
    }

    /// Exit codes and usage committed so far.
    pub async fn get_exit_data(&self) -> Result<ExitData> {
        let response = self
            .client
            .send(self.timed(Method::GET, "/exit-data"))
            .await?;
        Ok(response.json().await?)
    }

    /// Tear the run down.
    #[instrument(skip_all, fields(run_id = %self.run.id))]
    pub async fn delete(&self) -> Result<()> {
        self.client.send(self.timed(Method::DELETE, "")).await?;
        Ok(())
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Stream events after `last_id` (empty for all) until `last`.
    pub async fn get_events(
        &self,
        last_id: &str,
    ) -> Result<impl Stream<Item = Result<Event>> + Send + 'static> {
        let request = self
            .request(Method::GET, "/events")
            .query(&[("last_id", last_id)]);
        let response = self.client.send(request).await?;
        Ok(event_lines(response.bytes_stream()))
    }

    /// Append an event. Returns the number of body bytes sent.
    pub async fn create_event(&self, event: &Event) -> Result<u64> {
        let body = serde_json::to_vec(event)?;
        let sent = body.len() as u64;
        self.client
            .send(
                self.timed(Method::POST, "/events")
                    .header(CONTENT_TYPE, "application/json")
                    .body(body),
            )
            .await?;
        Ok(sent)
    }

    /// Append a `first` event.
    pub async fn create_first_event(&self) -> Result<u64> {
        self.create_event(&Event::first(self.id(), Utc::now()))
            .await
    }

    /// Append a `start` event for `stage`.
    pub async fn create_start_event(&self, stage: Stage) -> Result<u64> {
        self.create_event(&Event::start(self.id(), Utc::now(), stage))
            .await
    }

    /// Append a `finish` event for `stage`.
    pub async fn create_finish_event(&self, stage: Stage, exit_data: ExitDataStage) -> Result<u64> {
        self.create_event(&Event::finish(self.id(), Utc::now(), stage, exit_data))
            .await
    }

    /// Append a `log` event.
    pub async fn create_log_event(
        &self,
        stage: Option<Stage>,
        stream: LogStream,
        text: &str,
    ) -> Result<u64> {
        self.create_event(&Event::log(self.id(), Utc::now(), stage, stream, text))
            .await
    }

    /// Append the `last` event.
    pub async fn create_last_event(&self) -> Result<u64> {
        self.create_event(&Event::last(self.id(), Utc::now()))
            .await
    }
}

/// Split a newline-delimited JSON body into events, ending after `last`.
fn event_lines<S>(body: S) -> impl Stream<Item = Result<Event>> + Send + 'static
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut buffer: Vec<u8> = Vec::new();
        let mut done = false;
        while !done {
            let Some(chunk) = body.next().await else {
                break;
            };
            buffer.extend_from_slice(&chunk?);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = &line[..line.len() - 1];
                if line.is_empty() {
                    continue;
                }
                let event: Event = serde_json::from_slice(line)?;
                done = event.is_last();
                yield event;
                if done {
                    break;
                }
            }
        }
        if !done && !buffer.iter().all(u8::is_ascii_whitespace) {
            let event: Event = serde_json::from_slice(&buffer)?;
            yield event;
        }
    }
}

/// Extract a gzip-tar body into `dir` without buffering the whole archive.
async fn extract_stream_to<S>(body: S, dir: &Path) -> Result<()>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    let reader = SyncIoBridge::new(StreamReader::new(body));
    let dir: PathBuf = dir.to_path_buf();
    tokio::task::spawn_blocking(move || scrapeyard_archive::extract(reader, &dir))
        .await
        .map_err(io::Error::other)??;
    Ok(())
}

async fn create_from(dir: &Path, ignore: &[&str]) -> Result<Vec<u8>> {
    let dir: PathBuf = dir.to_path_buf();
    let ignore: Vec<String> = ignore.iter().map(|s| s.to_string()).collect();
    let archive =
        tokio::task::spawn_blocking(move || scrapeyard_archive::create(&dir, &ignore))
            .await
            .map_err(io::Error::other)??;
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks(parts: &[&str]) -> impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static {
        let parts: Vec<reqwest::Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::from(p.to_string())))
            .collect();
        futures::stream::iter(parts)
    }

    #[tokio::test]
    async fn test_event_lines_across_chunks() {
        let start = r#"{"id":"1-0","run_id":"r","time":"2025-01-01T00:00:00Z","type":"start","data":{"stage":"build"}}"#;
        let last = r#"{"id":"2-0","run_id":"r","time":"2025-01-01T00:00:01Z","type":"last","data":{}}"#;
        let body = format!("{}\n{}\n", start, last);
        let (a, b) = body.split_at(40);

        let events: Vec<Event> = event_lines(chunks(&[a, b])).try_collect().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id.as_deref(), Some("1-0"));
        assert!(events[1].is_last());
    }

    #[tokio::test]
    async fn test_extract_stream_across_small_chunks() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir(src.path().join("deps")).unwrap();
        std::fs::write(src.path().join("deps/lib.txt"), "cached ".repeat(1000)).unwrap();
        let archive = scrapeyard_archive::create::<&str>(src.path(), &[]).unwrap();

        let parts: Vec<io::Result<Bytes>> = archive
            .chunks(13)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let dest = tempfile::tempdir().unwrap();
        extract_stream_to(futures::stream::iter(parts), dest.path())
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dest.path().join("deps/lib.txt")).unwrap(),
            "cached ".repeat(1000)
        );
    }

    #[tokio::test]
    async fn test_extract_stream_rejects_garbage() {
        let parts: Vec<io::Result<Bytes>> = vec![Ok(Bytes::from_static(b"not a tarball"))];
        let dest = tempfile::tempdir().unwrap();
        let result = extract_stream_to(futures::stream::iter(parts), dest.path()).await;
        assert!(matches!(result, Err(ClientError::Archive(_))));
    }

    #[tokio::test]
    async fn test_event_lines_rejects_garbage() {
        let result: Result<Vec<Event>> = event_lines(chunks(&["not json\n"])).try_collect().await;
        assert!(matches!(result, Err(ClientError::Json(_))));
    }
}
