//! Amazon S3 implementation of [`ObjectStore`].
//!
//! The AWS SDK is async; the rest of the engine is blocking, so each call is
//! driven to completion on a runtime owned by the store.

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::collections::HashMap;
use std::path::Path;
use tokio::runtime::Runtime;
use tracing::debug;

use super::object_store::{ObjectMeta, ObjectStore};
use crate::config::CloudTarget;
use crate::error::Error;

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
    runtime: Runtime,
}

fn cloud_error<E>(context: &str, err: E) -> Error
where
    E: std::error::Error,
{
    Error::Cloud(format!("{}: {}", context, DisplayErrorContext(err)))
}

impl S3ObjectStore {
    /// Build a client for `target`, with operation timeouts and standard
    /// retry on transient failures.
    pub fn connect(target: &CloudTarget) -> Result<Self, Error> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()?;

        let sdk_config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(target.region.clone()))
                .profile_name(&target.profile)
                .retry_config(RetryConfig::standard().with_max_attempts(target.max_attempts))
                .timeout_config(
                    TimeoutConfig::builder()
                        .operation_timeout(target.timeout)
                        .build(),
                )
                .load(),
        );
        debug!(
            "S3 client ready for bucket {} in {}",
            target.bucket, target.region
        );

        Ok(Self {
            client: Client::new(&sdk_config),
            bucket: target.bucket.clone(),
            runtime,
        })
    }
}

impl ObjectStore for S3ObjectStore {
    fn list_keys(&self) -> Result<Vec<String>, Error> {
        self.runtime.block_on(async {
            let mut keys = Vec::new();
            let mut pages = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .into_paginator()
                .send();
            while let Some(page) = pages.next().await {
                let page = page.map_err(|e| cloud_error("list objects", e))?;
                keys.extend(
                    page.contents()
                        .iter()
                        .filter_map(|object| object.key().map(str::to_string)),
                );
            }
            Ok::<_, Error>(keys)
        })
    }

    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, Error> {
        self.runtime.block_on(async {
            match self
                .client
                .head_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
            {
                Ok(output) => Ok(Some(ObjectMeta {
                    size: output.content_length().unwrap_or(0).max(0) as u64,
                    last_modified: output.last_modified().map(|t| t.secs()),
                    metadata: output.metadata().cloned().unwrap_or_default(),
                })),
                Err(err)
                    if err
                        .as_service_error()
                        .map(|e| e.is_not_found())
                        .unwrap_or(false) =>
                {
                    Ok(None)
                }
                Err(err) => Err(cloud_error(&format!("head {}", key), err)),
            }
        })
    }

    fn put_file(
        &self,
        key: &str,
        path: &Path,
        metadata: HashMap<String, String>,
    ) -> Result<(), Error> {
        self.runtime.block_on(async {
            let body = ByteStream::from_path(path)
                .await
                .map_err(|e| cloud_error(&format!("read {}", path.display()), e))?;
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(key)
                .set_metadata(Some(metadata))
                .body(body)
                .send()
                .await
                .map_err(|e| cloud_error(&format!("put {}", key), e))?;
            Ok::<_, Error>(())
        })
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        self.runtime.block_on(async {
            let output = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| cloud_error(&format!("get {}", key), e))?;
            let bytes = output
                .body
                .collect()
                .await
                .map_err(|e| cloud_error(&format!("read body of {}", key), e))?;
            Ok::<_, Error>(bytes.into_bytes().to_vec())
        })
    }

    fn delete(&self, key: &str) -> Result<(), Error> {
        self.runtime.block_on(async {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| cloud_error(&format!("delete {}", key), e))?;
            Ok::<_, Error>(())
        })
    }
}
