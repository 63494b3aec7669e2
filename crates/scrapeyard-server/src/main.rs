// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scrapeyard Server
//!
//! Serves the run API on top of:
//! - An S3-compatible blob store (app, cache, output)
//! - Redis (key-value state and event streams)
//! - Kubernetes (one job per run)

use std::sync::Arc;
use tracing::{info, warn};

use scrapeyard_server::blobstore::S3BlobStore;
use scrapeyard_server::config::{Config, LogFormat};
use scrapeyard_server::jobdispatcher::{JobDispatcher, KubernetesJobDispatcher};
use scrapeyard_server::kvstore::RedisKvStore;
use scrapeyard_server::runtime::ServerRuntime;
use scrapeyard_server::stream::RedisEventStream;

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scrapeyard_server=info,tower_http=info".into());
    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present, before anything reads the environment
    let dotenv = dotenvy::dotenv();

    // Load configuration
    let config = Config::from_env()?;

    init_tracing(config.log_format);
    if let Err(e) = dotenv {
        warn!("No .env file loaded: {}", e);
    }

    info!(
        listen_addr = %config.listen_addr,
        store_host = %config.store.host,
        bucket = %config.store.bucket,
        redis = %config.redis.address,
        namespace = %config.job_namespace,
        "Starting Scrapeyard server"
    );

    let blob_store = Arc::new(S3BlobStore::connect(&config.store).await);
    let kv_store = Arc::new(RedisKvStore::connect(&config.redis).await?);
    let event_stream = Arc::new(RedisEventStream::connect(&config.redis).await?);
    info!("Connected to Redis");

    let job_dispatcher = Arc::new(KubernetesJobDispatcher::connect(&config.job_namespace).await?);
    info!(
        dispatcher_type = job_dispatcher.dispatcher_type(),
        "Job dispatcher initialized"
    );

    // Start the runtime
    let runtime = ServerRuntime::builder()
        .blob_store(blob_store)
        .kv_store(kv_store)
        .event_stream(event_stream)
        .job_dispatcher(job_dispatcher)
        .bind_addr(config.listen_addr)
        .image(&config.run_image)
        .max_run_time(config.max_run_time)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Scrapeyard server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Scrapeyard server shut down");

    Ok(())
}
