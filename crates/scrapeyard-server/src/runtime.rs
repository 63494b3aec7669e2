// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for scrapeyard-server.
//!
//! [`ServerRuntime`] serves the HTTP API from a background task so the server
//! can run inside an existing tokio application or a test.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use scrapeyard_server::blobstore::MemoryBlobStore;
//! use scrapeyard_server::jobdispatcher::MockJobDispatcher;
//! use scrapeyard_server::kvstore::MemoryKvStore;
//! use scrapeyard_server::runtime::ServerRuntime;
//! use scrapeyard_server::stream::MemoryEventStream;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = ServerRuntime::builder()
//!         .blob_store(Arc::new(MemoryBlobStore::new()))
//!         .kv_store(Arc::new(MemoryKvStore::new()))
//!         .event_stream(Arc::new(MemoryEventStream::new()))
//!         .job_dispatcher(Arc::new(MockJobDispatcher::new()))
//!         .bind_addr("127.0.0.1:0".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     println!("listening on {}", runtime.local_addr());
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::api::{self, ApiState};
use crate::blobstore::BlobStore;
use crate::commands::{CallbackClient, Orchestrator, RunSettings};
use crate::config::{DEFAULT_MAX_RUN_TIME, DEFAULT_RUN_IMAGE};
use crate::jobdispatcher::JobDispatcher;
use crate::kvstore::KvStore;
use crate::stream::EventStream;

/// Default HTTP listen address.
pub const DEFAULT_BIND_ADDR: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), 8080);

/// How long [`ServerRuntime::shutdown`] waits for in-flight requests.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for a [`ServerRuntime`].
pub struct ServerRuntimeBuilder {
    blob_store: Option<Arc<dyn BlobStore>>,
    kv_store: Option<Arc<dyn KvStore>>,
    event_stream: Option<Arc<dyn EventStream>>,
    job_dispatcher: Option<Arc<dyn JobDispatcher>>,
    callback_client: Option<CallbackClient>,
    bind_addr: SocketAddr,
    shutdown_timeout: Duration,
    settings: RunSettings,
}

impl Default for ServerRuntimeBuilder {
    fn default() -> Self {
        Self {
            blob_store: None,
            kv_store: None,
            event_stream: None,
            job_dispatcher: None,
            callback_client: None,
            bind_addr: DEFAULT_BIND_ADDR,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            settings: RunSettings::default(),
        }
    }
}

impl ServerRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the blob store (required).
    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    /// Set the key-value store (required).
    pub fn kv_store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.kv_store = Some(store);
        self
    }

    /// Set the event stream (required).
    pub fn event_stream(mut self, stream: Arc<dyn EventStream>) -> Self {
        self.event_stream = Some(stream);
        self
    }

    /// Set the job dispatcher (required).
    pub fn job_dispatcher(mut self, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        self.job_dispatcher = Some(dispatcher);
        self
    }

    /// Replace the callback client.
    pub fn callback_client(mut self, client: CallbackClient) -> Self {
        self.callback_client = Some(client);
        self
    }

    /// Set the HTTP listen address. Port 0 picks a free port.
    ///
    /// Default: `0.0.0.0:8080`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set how long shutdown waits for open responses before dropping them.
    /// Event streams stay open until their run finishes.
    ///
    /// Default: 10 seconds
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Set the image every job runs.
    ///
    /// Default: `scrapeyard/runner:latest`
    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.settings.image = image.into();
        self
    }

    /// Set the global `max_run_time` ceiling in seconds.
    ///
    /// Default: 86400
    pub fn max_run_time(mut self, seconds: u64) -> Self {
        self.settings.max_run_time = seconds;
        self
    }

    /// Set the memory given to runs that ask for none.
    ///
    /// Default: 1 GiB
    pub fn default_memory(mut self, bytes: u64) -> Self {
        self.settings.default_memory = bytes;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<ServerRuntimeConfig> {
        let blob_store = self
            .blob_store
            .ok_or_else(|| anyhow::anyhow!("blob_store is required"))?;
        let kv_store = self
            .kv_store
            .ok_or_else(|| anyhow::anyhow!("kv_store is required"))?;
        let event_stream = self
            .event_stream
            .ok_or_else(|| anyhow::anyhow!("event_stream is required"))?;
        let job_dispatcher = self
            .job_dispatcher
            .ok_or_else(|| anyhow::anyhow!("job_dispatcher is required"))?;

        if self.settings.max_run_time == 0 {
            anyhow::bail!("max_run_time must be greater than zero");
        }
        if self.settings.image.is_empty() {
            anyhow::bail!("image must not be empty");
        }

        let mut orchestrator = Orchestrator::new(
            blob_store,
            kv_store,
            event_stream,
            job_dispatcher,
            self.settings,
        );
        if let Some(client) = self.callback_client {
            orchestrator = orchestrator.with_callback_client(client);
        }

        Ok(ServerRuntimeConfig {
            orchestrator: Arc::new(orchestrator),
            bind_addr: self.bind_addr,
            shutdown_timeout: self.shutdown_timeout,
        })
    }
}

/// Validated configuration for a [`ServerRuntime`].
pub struct ServerRuntimeConfig {
    orchestrator: Arc<Orchestrator>,
    bind_addr: SocketAddr,
    shutdown_timeout: Duration,
}

impl ServerRuntimeConfig {
    /// Orchestrator the runtime will serve.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Bind the listener and start serving in a background task.
    pub async fn start(self) -> Result<ServerRuntime> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let router = api::router(ApiState::new(self.orchestrator.clone()));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let server_handle = tokio::spawn(async move {
            axum::serve(
                listener,
                router.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|stop| *stop).await;
            })
            .await?;
            Ok(())
        });

        let settings = self.orchestrator.settings();
        info!(
            addr = %local_addr,
            image = %settings.image,
            max_run_time = settings.max_run_time,
            "ServerRuntime started"
        );

        Ok(ServerRuntime {
            server_handle,
            shutdown_tx,
            shutdown_timeout: self.shutdown_timeout,
            orchestrator: self.orchestrator,
            local_addr,
        })
    }
}

/// A running scrapeyard HTTP server.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination. Open event
/// streams keep the server alive until their runs finish, the clients go away
/// or the shutdown timeout elapses.
pub struct ServerRuntime {
    server_handle: JoinHandle<Result<()>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_timeout: Duration,
    orchestrator: Arc<Orchestrator>,
    local_addr: SocketAddr,
}

impl ServerRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> ServerRuntimeBuilder {
        ServerRuntimeBuilder::new()
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Orchestrator behind the API.
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Check if the server task is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
    }

    /// Stop accepting connections and wait for in-flight requests.
    ///
    /// Connections still open after the shutdown timeout are dropped.
    pub async fn shutdown(mut self) -> Result<()> {
        info!("ServerRuntime shutting down...");

        let _ = self.shutdown_tx.send(true);

        let joined =
            match tokio::time::timeout(self.shutdown_timeout, &mut self.server_handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(
                        timeout_ms = self.shutdown_timeout.as_millis() as u64,
                        "ServerRuntime shutdown timed out, dropping open connections"
                    );
                    self.server_handle.abort();
                    return Ok(());
                }
            };

        match joined {
            Ok(Ok(())) => {
                info!("ServerRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("ServerRuntime server error during shutdown: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("ServerRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }
}
