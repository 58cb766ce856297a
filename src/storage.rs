#![allow(dead_code)]
//! S3-compatible object storage used to stage uploads.
//!
//! Objects staged here live only for the duration of one parse request; the
//! pipeline removes them in its teardown step.

use crate::config::Settings;
use crate::error::AppError;
use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Key-addressed blob store.
///
/// `delete` and `exists` are deliberately infallible: cleanup paths need to
/// log-and-continue, never raise.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `data` under `key`, overwriting any existing object.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError>;

    /// Fetch the full object under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError>;

    /// Time-limited GET URL for `key`.
    async fn presigned_url(&self, key: &str, expires_in_hours: u64) -> Result<String, AppError>;

    /// Remove `key`. Returns whether the backend accepted the delete.
    async fn delete(&self, key: &str) -> bool;

    /// Whether `key` currently exists. Backend errors read as `false`.
    async fn exists(&self, key: &str) -> bool;
}

pub struct S3ObjectStore {
    client: Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Connect to the backend and make sure the bucket exists. Failure here
    /// is fatal: no request can be served without storage.
    pub async fn connect(settings: &Settings) -> Result<Self, AppError> {
        info!(
            "connecting to object storage at {} (bucket: {})",
            settings.minio_endpoint, settings.minio_bucket_name
        );

        let aws_config = aws_config::from_env()
            .endpoint_url(&settings.minio_endpoint)
            .region(Region::new("us-east-1"))
            .credentials_provider(Credentials::new(
                &settings.minio_access_key,
                &settings.minio_secret_key,
                None,
                None,
                "static",
            ))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(true)
            .build();

        let store = Self {
            client: Client::from_conf(s3_config),
            bucket: settings.minio_bucket_name.clone(),
        };
        store.ensure_bucket().await?;
        Ok(store)
    }

    async fn ensure_bucket(&self) -> Result<(), AppError> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => {
                debug!("bucket '{}' already exists", self.bucket);
                Ok(())
            }
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    return Err(AppError::StorageConnection(format!(
                        "cannot reach object storage: {}",
                        service_error
                    )));
                }

                info!("bucket '{}' not found, creating it", self.bucket);
                self.client
                    .create_bucket()
                    .bucket(&self.bucket)
                    .send()
                    .await
                    .map_err(|e| {
                        AppError::StorageConnection(format!(
                            "failed to create bucket '{}': {}",
                            self.bucket,
                            e.into_service_error()
                        ))
                    })?;
                info!("created bucket: {}", self.bucket);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                AppError::FileUpload(format!(
                    "failed to store '{}': {}",
                    key,
                    e.into_service_error()
                ))
            })?;

        debug!("stored object '{}' ({} bytes)", key, size);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::FileNotFound(format!(
                    "failed to retrieve '{}': {}",
                    key,
                    e.into_service_error()
                ))
            })?;

        let data = res
            .body
            .collect()
            .await
            .map_err(|e| AppError::FileNotFound(format!("failed to read '{}': {}", key, e)))?
            .to_vec();

        debug!("retrieved object '{}' ({} bytes)", key, data.len());
        Ok(data)
    }

    async fn presigned_url(&self, key: &str, expires_in_hours: u64) -> Result<String, AppError> {
        let config = PresigningConfig::expires_in(Duration::from_secs(expires_in_hours * 3600))
            .map_err(|e| AppError::FileNotFound(format!("invalid presign expiry: {}", e)))?;

        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|e| {
                AppError::FileNotFound(format!(
                    "failed to presign '{}': {}",
                    key,
                    e.into_service_error()
                ))
            })?;

        Ok(presigned.uri().to_string())
    }

    async fn delete(&self, key: &str) -> bool {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => {
                info!("deleted staged object: {}", key);
                true
            }
            Err(e) => {
                error!("failed to delete '{}': {}", key, e.into_service_error());
                false
            }
        }
    }

    async fn exists(&self, key: &str) -> bool {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                let service_error = e.into_service_error();
                if !service_error.is_not_found() {
                    warn!("existence check for '{}' failed: {}", key, service_error);
                }
                false
            }
        }
    }
}
