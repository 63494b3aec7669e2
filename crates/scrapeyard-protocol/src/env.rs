// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Environment variables travel to the wrapper as a single argv value: one
//! RFC 4180 CSV record whose fields are `NAME=VALUE`.

use thiserror::Error;

use crate::types::EnvVariable;

/// Errors encoding or decoding the environment record.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EnvCsvError {
    /// The CSV layer failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// A field had no `=` separator.
    #[error("environment entry without '=': {0}")]
    MissingSeparator(String),
}

/// Encode variables as one CSV line. Returns `None` when there is nothing to pass.
pub fn encode(env: &[EnvVariable]) -> Result<Option<String>, EnvCsvError> {
    if env.is_empty() {
        return Ok(None);
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(env.iter().map(|v| format!("{}={}", v.name, v.value)))?;
    let bytes = writer
        .into_inner()
        .map_err(|e| EnvCsvError::Csv(csv::Error::from(e.into_error())))?;

    // Strip only the record terminator; trailing spaces belong to the last value
    let line = String::from_utf8_lossy(&bytes);
    let line = line.strip_suffix('\n').unwrap_or(&line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    Ok(Some(line.to_string()))
}

/// Decode a line produced by [`encode`]. An empty line yields no variables.
pub fn decode(line: &str) -> Result<Vec<EnvVariable>, EnvCsvError> {
    if line.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(line.as_bytes());

    let mut env = Vec::new();
    for record in reader.records() {
        for field in record?.iter() {
            let (name, value) = field
                .split_once('=')
                .ok_or_else(|| EnvCsvError::MissingSeparator(field.to_string()))?;
            env.push(EnvVariable::new(name, value));
        }
    }
    Ok(env)
}
