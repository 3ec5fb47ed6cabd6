// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! S3 bucket backend.
//!
//! | Operation | S3 call |
//! |-----------|---------|
//! | `get` | `GetObject` |
//! | `put` | `PutObject` |
//! | `put_if_absent` | `PutObject` with `If-None-Match: *` |
//! | `list` | `ListObjectsV2` with the prefix, following continuation tokens |
//! | `health_check` | `HeadBucket` |
//!
//! Credentials come from the default AWS provider chain (environment,
//! profile, container or instance role).

use std::io;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

use super::object_store::{key_segments, ObjectStore, StorageError, StorageResult};

const NO_SUCH_KEY: &str = "NoSuchKey";
const NO_SUCH_BUCKET: &str = "NoSuchBucket";
const PRECONDITION_FAILED: &str = "PreconditionFailed";
const CONDITIONAL_REQUEST_CONFLICT: &str = "ConditionalRequestConflict";
const SLOW_DOWN: &str = "SlowDown";

/// Credential bucket on S3 or an S3-compatible service.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Client from the default provider chain. `endpoint` selects an
    /// S3-compatible service and switches to path-style addressing.
    pub async fn connect(bucket: impl Into<String>, region: &str, endpoint: Option<&str>) -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let mut config = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = endpoint {
            config = config.endpoint_url(endpoint).force_path_style(true);
        }
        Self::new(Client::from_conf(config.build()), bucket)
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(&self, key: &str, data: &[u8], only_if_absent: bool) -> StorageResult<()> {
        key_segments(key, false)?;
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data.to_vec()));
        if only_if_absent {
            request = request.if_none_match("*");
        }
        request.send().await.map_err(|e| classify(e, key))?;
        Ok(())
    }
}

/// Map an SDK failure onto the storage taxonomy.
///
/// Timeouts, dispatch failures, throttling and 5xx answers are I/O errors
/// (transient); other service refusals are [`StorageError::Backend`].
fn classify<E>(err: SdkError<E, HttpResponse>, key: &str) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|r| r.status().as_u16());
    let code = err.as_service_error().and_then(|e| e.code()).map(str::to_owned);
    let detail = format!("{key}: {}", DisplayErrorContext(&err));

    match (code.as_deref(), status) {
        (Some(NO_SUCH_BUCKET), _) => StorageError::Backend(detail),
        (Some(NO_SUCH_KEY), _) | (None, Some(404)) => StorageError::NotFound(key.to_string()),
        (Some(PRECONDITION_FAILED | CONDITIONAL_REQUEST_CONFLICT), _) | (_, Some(409 | 412)) => {
            StorageError::AlreadyExists(key.to_string())
        }
        (Some(SLOW_DOWN), _) => StorageError::Io(io::Error::other(detail)),
        (_, Some(status)) if status >= 500 => StorageError::Io(io::Error::other(detail)),
        _ if matches!(
            err,
            SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
        ) =>
        {
            StorageError::Io(io::Error::other(detail))
        }
        _ => StorageError::Backend(detail),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        key_segments(key, false)?;
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| classify(e, key))?;

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Io(io::Error::other(e)))?;
        Ok(body.into_bytes().to_vec())
    }

    async fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.upload(key, data, false).await
    }

    async fn put_if_absent(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.upload(key, data, true).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        key_segments(prefix, true)?;

        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| classify(e, prefix))?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_owned),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated().unwrap_or(false) => {
                    continuation = Some(next.to_owned());
                }
                _ => break,
            }
        }

        keys.sort();
        Ok(keys)
    }

    async fn health_check(&self) -> StorageResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| classify(e, &self.bucket))?;
        Ok(())
    }
}
