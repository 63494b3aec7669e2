// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Run events.
//!
//! An [`Event`] is decoded through an intermediate wire struct so that the
//! `type` discriminator and the `data` payload are validated together. An
//! unknown `type` or a payload that does not fit its type is a decode error.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::types::ExitDataStage;

// ============================================================================
// Stage and stream
// ============================================================================

/// The two phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// The buildpack compiles the app.
    Build,
    /// The compiled app runs.
    Execute,
}

impl Stage {
    /// Name used on the wire and in storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Build => "build",
            Stage::Execute => "execute",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "build" => Ok(Stage::Build),
            "execute" => Ok(Stage::Execute),
            other => Err(EventError::UnknownStage(other.to_string())),
        }
    }
}

/// Where a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    /// Standard output of the stage's process.
    Stdout,
    /// Standard error of the stage's process.
    Stderr,
    /// Internal error reported by the wrapper itself.
    Interr,
}

impl LogStream {
    /// Name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStream::Stdout => "stdout",
            LogStream::Stderr => "stderr",
            LogStream::Interr => "interr",
        }
    }
}

impl fmt::Display for LogStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors decoding an event from its wire form.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EventError {
    /// The `type` field named no known event kind.
    #[error("unknown event type: {0}")]
    UnknownType(String),

    /// A stage name was not `build` or `execute`.
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// The `data` payload did not match the event kind.
    #[error("invalid data for {kind} event: {source}")]
    InvalidData {
        /// Event kind whose payload failed to decode.
        kind: &'static str,
        /// Underlying decode error.
        source: serde_json::Error,
    },
}

// ============================================================================
// Event
// ============================================================================

/// A typed record of something that happened during a run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "WireEvent")]
pub struct Event {
    /// Stream-assigned identifier. Absent until the event has been appended.
    pub id: Option<String>,
    /// Run the event belongs to.
    pub run_id: String,
    /// When the event happened.
    pub time: DateTime<Utc>,
    /// Kind-specific payload.
    pub data: EventData,
}

/// Payload of an [`Event`], one variant per event `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// Optional opening marker of a run.
    First,
    /// A stage started.
    Start {
        /// Stage that started.
        stage: Stage,
    },
    /// A stage finished.
    Finish {
        /// Stage that finished.
        stage: Stage,
        /// Exit code and resource usage of the stage.
        exit_data: ExitDataStage,
    },
    /// One line of output.
    Log {
        /// Stage producing the line. `None` for wrapper errors outside any stage.
        stage: Option<Stage>,
        /// Stream the line was read from.
        stream: LogStream,
        /// The line without its trailing newline.
        text: String,
    },
    /// Terminal marker; nothing follows it.
    Last,
}

impl EventData {
    /// Wire name of this payload's event `type`.
    pub fn kind(&self) -> &'static str {
        match self {
            EventData::First => "first",
            EventData::Start { .. } => "start",
            EventData::Finish { .. } => "finish",
            EventData::Log { .. } => "log",
            EventData::Last => "last",
        }
    }
}

impl Event {
    /// Create an event without an id.
    pub fn new(run_id: impl Into<String>, time: DateTime<Utc>, data: EventData) -> Self {
        Self {
            id: None,
            run_id: run_id.into(),
            time,
            data,
        }
    }

    /// A `first` event.
    pub fn first(run_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self::new(run_id, time, EventData::First)
    }

    /// A `start` event for `stage`.
    pub fn start(run_id: impl Into<String>, time: DateTime<Utc>, stage: Stage) -> Self {
        Self::new(run_id, time, EventData::Start { stage })
    }

    /// A `finish` event for `stage`.
    pub fn finish(
        run_id: impl Into<String>,
        time: DateTime<Utc>,
        stage: Stage,
        exit_data: ExitDataStage,
    ) -> Self {
        Self::new(run_id, time, EventData::Finish { stage, exit_data })
    }

    /// A `log` event.
    pub fn log(
        run_id: impl Into<String>,
        time: DateTime<Utc>,
        stage: Option<Stage>,
        stream: LogStream,
        text: impl Into<String>,
    ) -> Self {
        Self::new(
            run_id,
            time,
            EventData::Log {
                stage,
                stream,
                text: text.into(),
            },
        )
    }

    /// A `last` event.
    pub fn last(run_id: impl Into<String>, time: DateTime<Utc>) -> Self {
        Self::new(run_id, time, EventData::Last)
    }

    /// Return the event with its id replaced.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Wire name of the event `type`.
    pub fn kind(&self) -> &'static str {
        self.data.kind()
    }

    /// True for the terminal `last` event.
    pub fn is_last(&self) -> bool {
        matches!(self.data, EventData::Last)
    }
}

// ============================================================================
// Wire representation
// ============================================================================

#[derive(Deserialize)]
struct WireEvent {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    run_id: String,
    time: DateTime<Utc>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Deserialize)]
struct StageData {
    stage: Stage,
}

#[derive(Deserialize)]
struct FinishData {
    stage: Stage,
    exit_data: ExitDataStage,
}

#[derive(Deserialize)]
struct LogData {
    #[serde(default, with = "optional_stage")]
    stage: Option<Stage>,
    stream: LogStream,
    #[serde(default)]
    text: String,
}

fn decode<T: for<'de> Deserialize<'de>>(kind: &'static str, data: Value) -> Result<T, EventError> {
    serde_json::from_value(data).map_err(|source| EventError::InvalidData { kind, source })
}

impl TryFrom<WireEvent> for Event {
    type Error = EventError;

    fn try_from(wire: WireEvent) -> Result<Self, Self::Error> {
        let data = match wire.kind.as_str() {
            "first" => EventData::First,
            "last" => EventData::Last,
            "start" => {
                let d: StageData = decode("start", wire.data)?;
                EventData::Start { stage: d.stage }
            }
            "finish" => {
                let d: FinishData = decode("finish", wire.data)?;
                EventData::Finish {
                    stage: d.stage,
                    exit_data: d.exit_data,
                }
            }
            "log" => {
                let d: LogData = decode("log", wire.data)?;
                EventData::Log {
                    stage: d.stage,
                    stream: d.stream,
                    text: d.text,
                }
            }
            other => return Err(EventError::UnknownType(other.to_string())),
        };

        Ok(Event {
            id: wire.id.filter(|id| !id.is_empty()),
            run_id: wire.run_id,
            time: wire.time,
            data,
        })
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        #[serde(untagged)]
        enum Data<'a> {
            Empty {},
            Stage {
                stage: Stage,
            },
            Finish {
                stage: Stage,
                exit_data: &'a ExitDataStage,
            },
            Log {
                #[serde(with = "optional_stage")]
                stage: Option<Stage>,
                stream: LogStream,
                text: &'a str,
            },
        }

        #[derive(Serialize)]
        struct Wire<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            id: Option<&'a str>,
            run_id: &'a str,
            time: &'a DateTime<Utc>,
            #[serde(rename = "type")]
            kind: &'static str,
            data: Data<'a>,
        }

        let data = match &self.data {
            EventData::First | EventData::Last => Data::Empty {},
            EventData::Start { stage } => Data::Stage { stage: *stage },
            EventData::Finish { stage, exit_data } => Data::Finish {
                stage: *stage,
                exit_data,
            },
            EventData::Log {
                stage,
                stream,
                text,
            } => Data::Log {
                stage: *stage,
                stream: *stream,
                text,
            },
        };

        Wire {
            id: self.id.as_deref().filter(|id| !id.is_empty()),
            run_id: &self.run_id,
            time: &self.time,
            kind: self.kind(),
            data,
        }
        .serialize(serializer)
    }
}

/// Log events outside any stage carry an empty stage string.
mod optional_stage {
    use super::Stage;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(stage: &Option<Stage>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(stage.map(|st| st.as_str()).unwrap_or(""))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Stage>, D::Error> {
        let raw = String::deserialize(d)?;
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse().map(Some).map_err(serde::de::Error::custom)
    }
}
