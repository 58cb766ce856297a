//! Environment-sourced runtime settings.

use anyhow::{Context, Result};
use std::env;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    /// API key for the Mistral OCR provider. Mandatory.
    pub mistral_api_key: String,
    /// S3-compatible endpoint, scheme included.
    pub minio_endpoint: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_bucket_name: String,
}

impl Settings {
    /// Read settings from the environment. `MISTRAL_API_KEY` must be present
    /// and non-empty; the storage values fall back to a local MinIO.
    pub fn from_env() -> Result<Self> {
        let mistral_api_key = env::var("MISTRAL_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .context("MISTRAL_API_KEY environment variable not set")?;

        Ok(Self {
            mistral_api_key,
            minio_endpoint: env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".to_string()),
            minio_access_key: env::var("MINIO_ACCESS_KEY")
                .unwrap_or_else(|_| "minioadmin".to_string()),
            minio_secret_key: env::var("MINIO_SECRET_KEY")
                .unwrap_or_else(|_| "minioadmin".to_string()),
            minio_bucket_name: env::var("MINIO_BUCKET_NAME")
                .unwrap_or_else(|_| "documents".to_string()),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
