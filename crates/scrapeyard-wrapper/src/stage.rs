// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One stage: run a command and turn its output into log events.
//!
//! Three tasks cooperate per stage. Two scanners read stdout and stderr line
//! by line and push `log` events into a bounded queue; a single sender drains
//! the queue and posts the events in order. When the sender falls behind the
//! scanners block, and the child blocks on its full pipes.
//!
//! The queue is fully drained before `finish` is sent, so no log event of a
//! stage can follow its `finish`.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use chrono::Utc;
use scrapeyard_client::RunClient;
use scrapeyard_protocol::{Event, ExitDataStage, LogStream, Stage};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{Result, WrapperError};
use crate::usage::StageMeter;

/// Capacity of the queue between the scanners and the sender.
pub const EVENT_QUEUE_CAPACITY: usize = 1000;

/// Run `command` as `stage`, bracketed by `start` and `finish` events.
///
/// `env` is added on top of the wrapper's own environment. A non-zero exit is
/// not an error; it is reported in the returned exit data.
pub async fn run_stage(
    api: &RunClient,
    stage: Stage,
    command: &str,
    env: &[(String, String)],
) -> Result<ExitDataStage> {
    api.create_start_event(stage).await?;

    let argv = split_command(command)?;
    let meter = StageMeter::start();

    let mut child = Command::new(&argv[0])
        .args(&argv[1..])
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| command_error(command, e.to_string()))?;

    info!(run_id = %api.id(), stage = ?stage, pid = ?child.id(), "Stage started");

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| command_error(command, "stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| command_error(command, "stderr not captured"))?;

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let sender = tokio::spawn(send_events(api.clone(), rx));
    let stdout_scanner = tokio::spawn(scan_lines(
        stdout,
        api.id().to_string(),
        stage,
        LogStream::Stdout,
        tx.clone(),
    ));
    let stderr_scanner = tokio::spawn(scan_lines(
        stderr,
        api.id().to_string(),
        stage,
        LogStream::Stderr,
        tx,
    ));

    let (stdout_result, stderr_result) = tokio::join!(stdout_scanner, stderr_scanner);
    stdout_result??;
    stderr_result??;

    let status = child.wait().await?;
    // Both senders are gone once the scanners return, so this drains the queue
    let own_bytes = sender.await?;

    let exit_data = ExitDataStage {
        exit_code: exit_code(status),
        usage: meter.finish(own_bytes),
    };
    info!(
        run_id = %api.id(),
        stage = ?stage,
        exit_code = exit_data.exit_code,
        "Stage finished"
    );

    api.create_finish_event(stage, exit_data.clone()).await?;
    Ok(exit_data)
}

/// Tokenize a command line with shell quoting rules.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let argv = shlex::split(command)
        .ok_or_else(|| command_error(command, "unbalanced quotes or trailing escape"))?;
    if argv.is_empty() {
        return Err(command_error(command, "empty command"));
    }
    Ok(argv)
}

/// Exit code of a finished process. A process killed by a signal reports
/// `128 + signal`, as a shell would.
pub fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

fn command_error(command: &str, reason: impl Into<String>) -> WrapperError {
    WrapperError::Command {
        command: command.to_string(),
        reason: reason.into(),
    }
}

async fn scan_lines<R>(
    reader: R,
    run_id: String,
    stage: Stage,
    stream: LogStream,
    tx: mpsc::Sender<Event>,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        let text = String::from_utf8_lossy(trim_line_ending(&buf));
        let event = Event::log(&run_id, Utc::now(), Some(stage), stream, text);
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!(run_id = %run_id, stream = %stream, "Stream closed");
    Ok(())
}

async fn send_events(api: RunClient, mut rx: mpsc::Receiver<Event>) -> u64 {
    let mut sent = 0;
    while let Some(event) = rx.recv().await {
        match api.create_event(&event).await {
            Ok(bytes) => sent += bytes,
            // A lost log line is not worth failing the run
            Err(e) => warn!(run_id = %api.id(), error = %e, "Failed to send log event"),
        }
    }
    sent
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
