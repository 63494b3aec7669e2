// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Command-line configuration.
//!
//! The job dispatcher starts the wrapper as
//! `scrapeyard-wrapper <run_id> --output <name> [--env <csv>]` and injects the
//! run's bearer token as `SCRAPEYARD_RUN_TOKEN`. Every other flag has a
//! default matching the runner image and can be overridden from the
//! environment.

use std::path::PathBuf;

use clap::Parser;
use scrapeyard_client::ClientConfig;
use scrapeyard_protocol::{EnvVariable, Run};

use crate::error::Result;

/// Server address inside the cluster.
pub const DEFAULT_SERVER: &str = "http://scrapeyard-server.scrapeyard-system:8080";

/// Builds and runs a scraper, streaming its output to the scrapeyard API.
#[derive(Debug, Clone, Parser)]
#[command(name = "scrapeyard-wrapper", version, about)]
pub struct Args {
    /// Run to drive.
    pub run_id: String,

    /// Bearer token for the run.
    #[arg(long, env = "SCRAPEYARD_RUN_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Directory where the build places the compiled app.
    #[arg(long, env = "SCRAPEYARD_APP_PATH", default_value = "/app")]
    pub apppath: PathBuf,

    /// Directory the app source is extracted into.
    #[arg(long, env = "SCRAPEYARD_IMPORT_PATH", default_value = "/tmp/app")]
    pub importpath: PathBuf,

    /// Directory for the build cache.
    #[arg(long, env = "SCRAPEYARD_CACHE_PATH", default_value = "/tmp/cache")]
    pub cachepath: PathBuf,

    /// Directory of one-file-per-variable environment for the buildpack.
    #[arg(long, env = "SCRAPEYARD_ENV_PATH", default_value = "/tmp/env")]
    pub envpath: PathBuf,

    /// Output file, relative to the app path. Empty for none.
    #[arg(long, env = "SCRAPEYARD_OUTPUT", default_value = "")]
    pub output: String,

    /// Scrapeyard server URL.
    #[arg(long, env = "SCRAPEYARD_SERVER_URL", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Command that compiles the app.
    #[arg(
        long,
        env = "SCRAPEYARD_BUILD_COMMAND",
        default_value = "/bin/herokuish buildpack build"
    )]
    pub buildcommand: String,

    /// Command that runs the compiled app.
    #[arg(
        long,
        env = "SCRAPEYARD_RUN_COMMAND",
        default_value = "/bin/herokuish procfile start scraper"
    )]
    pub runcommand: String,

    /// Environment for the scraper as one CSV record of NAME=VALUE fields.
    #[arg(long, env = "SCRAPEYARD_ENV", default_value = "")]
    pub env: String,
}

impl Args {
    /// The run these arguments identify.
    pub fn run(&self) -> Run {
        Run {
            id: self.run_id.clone(),
            token: self.token.clone(),
        }
    }

    /// API client configuration.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new().with_server_url(&self.server)
    }

    /// Decode the remaining flags into wrapper options.
    pub fn options(&self) -> Result<WrapperOptions> {
        Ok(WrapperOptions {
            app_path: self.apppath.clone(),
            import_path: self.importpath.clone(),
            cache_path: self.cachepath.clone(),
            env_path: self.envpath.clone(),
            output: self.output.clone(),
            build_command: self.buildcommand.clone(),
            run_command: self.runcommand.clone(),
            environment: scrapeyard_protocol::env::decode(&self.env)?,
        })
    }
}

/// What the wrapper does for one run.
#[derive(Debug, Clone)]
pub struct WrapperOptions {
    /// Where the compiled app lives; the output path is relative to it.
    pub app_path: PathBuf,
    /// Where the app source is extracted.
    pub import_path: PathBuf,
    /// Where the build cache is extracted and collected from.
    pub cache_path: PathBuf,
    /// Where environment files are written.
    pub env_path: PathBuf,
    /// Output file relative to `app_path`. Empty for none.
    pub output: String,
    /// Build stage command line.
    pub build_command: String,
    /// Execute stage command line.
    pub run_command: String,
    /// Variables passed to both stages.
    pub environment: Vec<EnvVariable>,
}
