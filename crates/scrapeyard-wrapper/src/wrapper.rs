// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The run state machine.
//!
//! ```text
//! ACQUIRE -> BUILD -> UPLOAD_CACHE -> EXECUTE -> UPLOAD_OUTPUT -> FINALIZE
//!                          |                                        ^
//!                          +------------ build failed --------------+
//! ```

use std::path::Path;

use scrapeyard_client::RunClient;
use scrapeyard_protocol::{ExitDataStage, LogStream, Stage};
use tokio::fs;
use tracing::{info, instrument, warn};

use crate::args::WrapperOptions;
use crate::error::Result;
use crate::stage::run_stage;

/// Procfile written over whatever the app ships.
pub const PROCFILE: &str = "scraper: /bin/start.sh";

/// Text of the `interr` log event sent before giving up.
pub const INTERNAL_ERROR_TEXT: &str = "Internal error. The run will be automatically restarted.";

/// Exit data of the stages that ran.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Build stage.
    pub build: ExitDataStage,
    /// Execute stage, absent when the build failed.
    pub execute: Option<ExitDataStage>,
}

/// Drives one run from app download to the `last` event.
pub struct Wrapper {
    api: RunClient,
    options: WrapperOptions,
}

impl Wrapper {
    /// Create a wrapper for the run behind `api`.
    pub fn new(api: RunClient, options: WrapperOptions) -> Self {
        Self { api, options }
    }

    /// Run every step. An error means the run could not be completed and
    /// should be restarted; see [`report_internal_error`].
    #[instrument(skip(self), fields(run_id = %self.api.id()))]
    pub async fn run(&self) -> Result<RunOutcome> {
        self.acquire().await?;

        let env = self.stage_env();
        let build = run_stage(&self.api, Stage::Build, &self.options.build_command, &env).await?;

        self.api
            .put_cache_from_directory(&self.options.cache_path)
            .await?;
        info!("Cache uploaded");

        let execute = if build.exit_code == 0 {
            let execute =
                run_stage(&self.api, Stage::Execute, &self.options.run_command, &env).await?;
            self.upload_output().await?;
            Some(execute)
        } else {
            info!(exit_code = build.exit_code, "Build failed, skipping execute");
            None
        };

        self.api.create_last_event().await?;
        info!("Run finished");

        Ok(RunOutcome { build, execute })
    }

    async fn acquire(&self) -> Result<()> {
        let options = &self.options;
        for dir in [&options.import_path, &options.cache_path, &options.env_path] {
            create_private_dir(dir).await?;
        }

        for var in &options.environment {
            if !is_file_name(&var.name) {
                warn!(name = %var.name, "Skipping environment variable with unusable name");
                continue;
            }
            fs::write(options.env_path.join(&var.name), &var.value).await?;
        }

        self.api.get_app_to_directory(&options.import_path).await?;
        fs::write(options.import_path.join("Procfile"), PROCFILE).await?;

        let cached = self
            .api
            .get_cache_to_directory(&options.cache_path)
            .await?;
        info!(cached, "App acquired");
        Ok(())
    }

    async fn upload_output(&self) -> Result<()> {
        if self.options.output.is_empty() {
            return Ok(());
        }
        let path = self.options.app_path.join(&self.options.output);
        if self.api.put_output_from_file(&path).await? {
            info!(path = %path.display(), "Output uploaded");
        } else {
            info!(path = %path.display(), "No output file to upload");
        }
        Ok(())
    }

    /// Variables added to the wrapper's own environment for both stages.
    fn stage_env(&self) -> Vec<(String, String)> {
        let paths = [
            ("APP_PATH", &self.options.app_path),
            ("CACHE_PATH", &self.options.cache_path),
            ("IMPORT_PATH", &self.options.import_path),
        ];
        paths
            .into_iter()
            .map(|(name, path)| (name.to_string(), path.display().to_string()))
            .chain(
                self.options
                    .environment
                    .iter()
                    .map(|var| (var.name.clone(), var.value.clone())),
            )
            .collect()
    }
}

/// Tell the run's watchers that the wrapper gave up. Failures to send are
/// only logged; there is nobody left to tell.
pub async fn report_internal_error(api: &RunClient) {
    if let Err(e) = api
        .create_log_event(None, LogStream::Interr, INTERNAL_ERROR_TEXT)
        .await
    {
        warn!(run_id = %api.id(), error = %e, "Failed to report internal error");
    }
}

async fn create_private_dir(path: &Path) -> std::io::Result<()> {
    fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .await
}

fn is_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}
