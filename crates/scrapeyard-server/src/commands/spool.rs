// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Spooling of request bodies to temporary files.
//!
//! Blob backends need a known size, and archives must be fully validated
//! before anything is stored, so uploads land in a temporary file first.

use std::io::{self, Read, Write};
use std::path::Path;

use bytes::Bytes;
use futures::Stream;
use tempfile::NamedTempFile;
use tokio_util::io::{StreamReader, SyncIoBridge};

use crate::error::{Error, Result};

/// Boxed body stream accepted by the upload operations.
pub type BodyStream = futures::stream::BoxStream<'static, io::Result<Bytes>>;

/// A temporary file holding an upload. Removed when dropped.
#[derive(Debug)]
pub(crate) struct SpooledFile {
    file: NamedTempFile,
    size: u64,
}

impl SpooledFile {
    pub(crate) fn path(&self) -> &Path {
        self.file.path()
    }

    pub(crate) fn size(&self) -> u64 {
        self.size
    }
}

/// Copies everything read from `reader` into `writer`.
struct TeeReader<R, W> {
    reader: R,
    writer: W,
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.writer.write_all(&buf[..n])?;
        Ok(n)
    }
}

/// Spool `body` while validating it as an archive.
///
/// On validation failure the temporary file is removed and
/// [`Error::ArchiveFormat`] is returned.
pub(crate) async fn spool_archive<S>(body: S) -> Result<SpooledFile>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    let bridge = SyncIoBridge::new(StreamReader::new(body));
    tokio::task::spawn_blocking(move || -> Result<SpooledFile> {
        let file = NamedTempFile::new()?;
        let mut tee = TeeReader {
            reader: bridge,
            writer: io::BufWriter::new(file.as_file()),
        };
        scrapeyard_archive::validate(&mut tee)?;
        tee.writer.flush()?;
        drop(tee);
        let size = file.as_file().metadata()?.len();
        Ok(SpooledFile { file, size })
    })
    .await
    .map_err(|e| Error::Other(format!("spool task failed: {}", e)))?
}

/// Spool `body` as opaque bytes.
pub(crate) async fn spool<S>(body: S) -> Result<SpooledFile>
where
    S: Stream<Item = io::Result<Bytes>> + Send + Unpin + 'static,
{
    let file = NamedTempFile::new()?;
    let mut reader = StreamReader::new(body);
    let mut writer = tokio::fs::File::from_std(file.reopen()?);
    let size = tokio::io::copy(&mut reader, &mut writer).await?;
    tokio::io::AsyncWriteExt::flush(&mut writer).await?;
    Ok(SpooledFile { file, size })
}
