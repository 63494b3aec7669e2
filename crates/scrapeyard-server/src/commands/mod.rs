// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run lifecycle operations.
//!
//! The [`Orchestrator`] holds no run state of its own. Everything lives in the
//! blob store, the key-value store and the event stream, so any number of
//! server replicas can share the same backends.
//!
//! # Storage layout
//!
//! | Backend | Key | Value |
//! |---------|-----|-------|
//! | Blob store | `{id}/app.tgz`, `{id}/cache.tgz`, `{id}/output` | Uploaded bytes |
//! | Key-value | `{id}/created`, `{id}/token` | Run registration |
//! | Key-value | `{id}/url`, `{id}/memory`, `{id}/first_time` | Start options and bookkeeping |
//! | Key-value | `{id}/exit_data/{build,execute,finished}` | Committed exit data |
//! | Key-value | `{id}/exit_data/api/{network_in,network_out}` | Traffic counters |
//! | Stream | `{id}` | Events |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use scrapeyard_protocol::{
    ApiUsage, Event, EventData, ExitData, ExitDataStage, Run, Stage, StartRunOptions,
};
use tracing::{debug, info, instrument, warn};

use crate::blobstore::{BlobSource, BlobStore, BlobStream};
use crate::error::{Error, Result};
use crate::jobdispatcher::{JobDispatcher, JobSpec};
use crate::kvstore::KvStore;
use crate::stream::EventStream;

mod callbacks;
mod events;
mod keys;
mod spool;

pub use callbacks::{CallbackClient, RetryPolicy};
pub use events::EventIterator;
pub use spool::BodyStream;

use keys::Key;

const APP_FILE: &str = "app.tgz";
const CACHE_FILE: &str = "cache.tgz";
const OUTPUT_FILE: &str = "output";

/// Length of generated run tokens.
pub const TOKEN_LENGTH: usize = 32;

/// Entrypoint of the run image.
pub const WRAPPER_PATH: &str = "/bin/wrapper";

/// Container variable carrying the run token to the wrapper.
pub const RUN_TOKEN_ENV: &str = "SCRAPEYARD_RUN_TOKEN";

/// Memory given to runs that do not ask for any (1 GiB).
pub const DEFAULT_MEMORY: u64 = 1 << 30;

/// Server-wide parameters applied to every run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Image every job runs.
    pub image: String,
    /// Ceiling and default for `max_run_time`, in seconds.
    pub max_run_time: u64,
    /// Memory used when a run asks for zero.
    pub default_memory: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            image: crate::config::DEFAULT_RUN_IMAGE.to_string(),
            max_run_time: crate::config::DEFAULT_MAX_RUN_TIME,
            default_memory: DEFAULT_MEMORY,
        }
    }
}

/// Implements every run operation on top of the four backends.
pub struct Orchestrator {
    blob_store: Arc<dyn BlobStore>,
    kv: Arc<dyn KvStore>,
    stream: Arc<dyn EventStream>,
    jobs: Arc<dyn JobDispatcher>,
    callbacks: CallbackClient,
    settings: RunSettings,
}

fn blob_path(run_id: &str, file: &str) -> String {
    format!("{}/{}", run_id, file)
}

impl Orchestrator {
    /// Create an orchestrator over the given backends.
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        kv: Arc<dyn KvStore>,
        stream: Arc<dyn EventStream>,
        jobs: Arc<dyn JobDispatcher>,
        settings: RunSettings,
    ) -> Self {
        Self {
            blob_store,
            kv,
            stream,
            jobs,
            callbacks: CallbackClient::default(),
            settings,
        }
    }

    /// Replace the callback client, e.g. to shorten retry delays.
    pub fn with_callback_client(mut self, callbacks: CallbackClient) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Server-wide run parameters.
    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    fn key(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    // ========================================================================
    // Runs
    // ========================================================================

    /// Register a new run and issue its token.
    pub async fn create_run(&self) -> Result<Run> {
        let id = uuid::Uuid::new_v4().to_string();
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();

        Key::created(self.key(), &id).set(&true).await?;
        Key::token(self.key(), &id).set(&token).await?;

        info!(run_id = %id, "Run created");
        Ok(Run { id, token })
    }

    /// True iff the run was created and not yet deleted.
    pub async fn is_run_created(&self, run_id: &str) -> Result<bool> {
        Ok(Key::created(self.key(), run_id)
            .get_opt::<bool>()
            .await?
            .unwrap_or(false))
    }

    /// The run's bearer token. [`Error::NotFound`] for unknown runs.
    pub async fn get_token(&self, run_id: &str) -> Result<String> {
        Key::token(self.key(), run_id).get().await
    }

    /// Validate start options, record them and dispatch the run's job.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn start_run(&self, run_id: &str, options: StartRunOptions) -> Result<()> {
        let max_run_time = match options.max_run_time {
            0 => self.settings.max_run_time,
            t if t > self.settings.max_run_time => {
                return Err(Error::MaxRunTimeTooLarge(self.settings.max_run_time));
            }
            t => t,
        };
        let memory = match options.memory {
            0 => self.settings.default_memory,
            m => m,
        };

        match self.get_app(run_id).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Err(Error::AppNotAvailable),
            Err(e) => return Err(e),
        }

        Key::callback_url(self.key(), run_id)
            .set(&options.callback.url)
            .await?;
        Key::memory(self.key(), run_id).set(&memory).await?;

        let token = self.get_token(run_id).await?;

        let mut command = vec![
            WRAPPER_PATH.to_string(),
            run_id.to_string(),
            "--output".to_string(),
            options.output.clone(),
        ];
        if let Some(env) = scrapeyard_protocol::env::encode(&options.env)? {
            command.push("--env".to_string());
            command.push(env);
        }

        let spec = JobSpec {
            run_id: run_id.to_string(),
            image: self.settings.image.clone(),
            command,
            max_run_time,
            memory,
            env: vec![(RUN_TOKEN_ENV.to_string(), token)],
        };
        self.jobs.create(&spec).await?;

        info!(
            max_run_time,
            memory,
            env_vars = options.env.len(),
            callback = !options.callback.url.is_empty(),
            dispatcher = self.jobs.dispatcher_type(),
            "Run started"
        );
        Ok(())
    }

    /// Tear down everything the run owns.
    ///
    /// Every step is attempted; the first failure is returned afterwards.
    #[instrument(skip_all, fields(run_id = %run_id))]
    pub async fn delete_run(&self, run_id: &str) -> Result<()> {
        let mut first_error: Option<Error> = None;
        let mut note = |step: &str, result: Result<()>| {
            if let Err(e) = result {
                warn!(step, error = %e, "Run teardown step failed");
                first_error.get_or_insert(e);
            }
        };

        note("job", self.jobs.delete(run_id).await.map_err(Error::from));
        for file in [APP_FILE, CACHE_FILE, OUTPUT_FILE] {
            note(
                file,
                self.blob_store
                    .delete(&blob_path(run_id, file))
                    .await
                    .map_err(Error::from),
            );
        }
        note("stream", self.stream.delete(run_id).await.map_err(Error::from));
        for key in Key::all(self.key(), run_id) {
            let result = key.delete().await;
            note(key.path(), result);
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!("Run deleted");
                Ok(())
            }
        }
    }

    // ========================================================================
    // Blobs
    // ========================================================================

    /// Stream the run's app archive.
    pub async fn get_app(&self, run_id: &str) -> Result<BlobStream> {
        self.get_blob(run_id, APP_FILE).await
    }

    /// Validate and store the run's app archive.
    pub async fn put_app(&self, run_id: &str, body: BodyStream) -> Result<()> {
        self.put_archive(run_id, APP_FILE, body).await
    }

    /// Stream the run's build cache archive.
    pub async fn get_cache(&self, run_id: &str) -> Result<BlobStream> {
        self.get_blob(run_id, CACHE_FILE).await
    }

    /// Validate and store the run's build cache archive.
    pub async fn put_cache(&self, run_id: &str, body: BodyStream) -> Result<()> {
        self.put_archive(run_id, CACHE_FILE, body).await
    }

    /// Stream the run's output file.
    pub async fn get_output(&self, run_id: &str) -> Result<BlobStream> {
        self.get_blob(run_id, OUTPUT_FILE).await
    }

    /// Store the run's output file.
    pub async fn put_output(&self, run_id: &str, body: BodyStream) -> Result<()> {
        let spooled = spool::spool(body).await?;
        self.blob_store
            .put(
                &blob_path(run_id, OUTPUT_FILE),
                BlobSource::File(spooled.path().to_path_buf()),
                spooled.size(),
            )
            .await?;
        debug!(run_id, size = spooled.size(), "Output stored");
        Ok(())
    }

    async fn get_blob(&self, run_id: &str, file: &str) -> Result<BlobStream> {
        Ok(self.blob_store.get(&blob_path(run_id, file)).await?)
    }

    async fn put_archive(&self, run_id: &str, file: &str, body: BodyStream) -> Result<()> {
        let spooled = spool::spool_archive(body).await?;
        self.blob_store
            .put(
                &blob_path(run_id, file),
                BlobSource::File(spooled.path().to_path_buf()),
                spooled.size(),
            )
            .await?;
        debug!(run_id, file, size = spooled.size(), "Archive stored");
        Ok(())
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Append an event, commit its side effects and deliver it to the callback.
    ///
    /// The event is durable before the callback is attempted, so a callback
    /// failure never undoes the append.
    #[instrument(skip_all, fields(run_id = %run_id, kind = event.kind()))]
    pub async fn create_event(&self, run_id: &str, mut event: Event) -> Result<Event> {
        event.id = None;
        event.run_id = run_id.to_string();
        let event = self.stream.add(run_id, event).await?;

        match &event.data {
            EventData::First => {
                Key::first_time(self.key(), run_id).set(&event.time).await?;
            }
            EventData::Finish { stage, exit_data } => {
                Key::exit_data_stage(self.key(), run_id, *stage)
                    .set(exit_data)
                    .await?;
                debug!(?stage, exit_code = exit_data.exit_code, "Stage finished");
            }
            EventData::Last => {
                Key::exit_data_finished(self.key(), run_id).set(&true).await?;
                debug!("Run finished");
            }
            EventData::Start { .. } | EventData::Log { .. } => {}
        }

        self.post_callback(run_id, &event).await?;
        Ok(event)
    }

    async fn post_callback(&self, run_id: &str, event: &Event) -> Result<()> {
        let url: Option<String> = Key::callback_url(self.key(), run_id).get_opt().await?;
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return Ok(());
        };

        let mut body = serde_json::to_vec(event)?;
        body.push(b'\n');
        let sent = self.callbacks.post(&url, body).await?;
        self.record_traffic(run_id, true, 0, sent).await
    }

    /// Iterate the run's events after `last_id` (`"0"` for all).
    pub fn get_events(&self, run_id: &str, last_id: &str) -> EventIterator {
        EventIterator::new(self.stream.clone(), run_id, last_id)
    }

    // ========================================================================
    // Exit data and accounting
    // ========================================================================

    /// Assemble exit data from whatever has been committed so far.
    pub async fn get_exit_data(&self, run_id: &str) -> Result<ExitData> {
        let build: Option<ExitDataStage> = Key::exit_data_stage(self.key(), run_id, Stage::Build)
            .get_opt()
            .await?;
        let execute: Option<ExitDataStage> =
            Key::exit_data_stage(self.key(), run_id, Stage::Execute)
                .get_opt()
                .await?;
        let finished: bool = Key::exit_data_finished(self.key(), run_id)
            .get_opt()
            .await?
            .unwrap_or(false);
        let network_in: u64 = Key::api_network_in(self.key(), run_id)
            .get_opt()
            .await?
            .unwrap_or(0);
        let network_out: u64 = Key::api_network_out(self.key(), run_id)
            .get_opt()
            .await?
            .unwrap_or(0);

        Ok(ExitData {
            build,
            execute,
            api: ApiUsage {
                network_in,
                network_out,
            },
            finished,
        })
    }

    /// Add API traffic to the run's counters. Internal traffic is ignored.
    pub async fn record_traffic(
        &self,
        run_id: &str,
        external: bool,
        network_in: u64,
        network_out: u64,
    ) -> Result<()> {
        if !external {
            return Ok(());
        }
        if network_in > 0 {
            Key::api_network_in(self.key(), run_id)
                .increment(network_in)
                .await?;
        }
        if network_out > 0 {
            Key::api_network_out(self.key(), run_id)
                .increment(network_out)
                .await?;
        }
        Ok(())
    }

    /// Time of the run's `first` event, if one was recorded.
    pub async fn first_time(&self, run_id: &str) -> Result<Option<DateTime<Utc>>> {
        Key::first_time(self.key(), run_id).get_opt().await
    }

    /// Memory recorded when the run was started.
    pub async fn memory(&self, run_id: &str) -> Result<Option<u64>> {
        Key::memory(self.key(), run_id).get_opt().await
    }
}
