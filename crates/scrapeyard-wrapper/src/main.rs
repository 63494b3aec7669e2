// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scrapeyard Wrapper
//!
//! Usage: `scrapeyard-wrapper <run_id> --output <file> [--env <csv>]` with
//! `SCRAPEYARD_RUN_TOKEN` set.

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use scrapeyard_client::Client;
use scrapeyard_wrapper::{Args, RunOutcome, Wrapper, report_internal_error};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scrapeyard_wrapper=info".into()),
        )
        .init();

    let args = Args::parse();
    info!(run_id = %args.run_id, server = %args.server, "Starting Scrapeyard wrapper");

    let client = Client::new(args.client_config()).context("failed to create API client")?;
    let api = client.run(args.run());

    let result: scrapeyard_wrapper::Result<RunOutcome> = async {
        let options = args.options()?;
        Wrapper::new(api.clone(), options).run().await
    }
    .await;

    match result {
        Ok(outcome) => {
            info!(
                build_exit_code = outcome.build.exit_code,
                execute_exit_code = ?outcome.execute.map(|e| e.exit_code),
                "Wrapper finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            report_internal_error(&api).await;
            Err(e.into())
        }
    }
}
