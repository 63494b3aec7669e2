// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! S3-compatible blob store.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tokio_util::io::ReaderStream;
use tracing::debug;

use super::{BlobSource, BlobStore, BlobStoreError, BlobStream, Result};
use crate::config::StoreConfig;

/// Blob store backed by a single bucket of an S3-compatible service.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Connect using static credentials and a path-style endpoint.
    pub async fn connect(config: &StoreConfig) -> Self {
        let credentials = Credentials::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            None,
            None,
            "scrapeyard",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .endpoint_url(config.endpoint_url())
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
        }
    }

    /// Wrap an already configured client.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

fn is_404<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .map(|r| r.status().as_u16() == 404)
        .unwrap_or(false)
}

fn backend<E>(err: SdkError<E>) -> BlobStoreError
where
    E: std::error::Error + Send + Sync + 'static,
{
    BlobStoreError::Backend(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, path: &str, source: BlobSource, size: u64) -> Result<()> {
        let body = match source {
            BlobSource::File(file) => ByteStream::from_path(&file)
                .await
                .map_err(|e| BlobStoreError::Backend(e.to_string()))?,
            BlobSource::Bytes(bytes) => ByteStream::from(bytes),
        };
        debug!(bucket = %self.bucket, path, size, "Uploading blob");
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .content_length(size as i64)
            .body(body)
            .send()
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<BlobStream> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                if missing || is_404(&err) {
                    return Err(BlobStoreError::NotFound(path.to_string()));
                }
                return Err(backend(err));
            }
        };

        let reader = output.body.into_async_read();
        Ok(Box::pin(ReaderStream::new(reader)))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(path)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_404(&err) => Ok(()),
            Err(err) => Err(backend(err)),
        }
    }
}
