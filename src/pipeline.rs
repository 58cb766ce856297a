//! Parse request lifecycle: validate, stage, extract, respond, with
//! unconditional cleanup of the staged object.

use crate::error::AppError;
use crate::ocr::OcrClient;
use crate::storage::ObjectStore;
use crate::validation;
use anyhow::anyhow;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// One uploaded document, fully read out of the multipart request.
#[derive(Debug)]
pub struct UploadedDocument {
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, Serialize)]
pub struct ParseData {
    pub markdown: String,
    #[serde(rename = "rawText")]
    pub raw_text: String,
}

#[derive(Debug, Serialize)]
pub struct ParseMetadata {
    pub storage_key: String,
    pub model: String,
    pub processing_time_ms: u64,
    pub request_id: String,
    pub file_size_kb: f64,
}

/// Body of a successful parse.
#[derive(Debug, Serialize)]
pub struct ParseResult {
    pub success: bool,
    pub data: ParseData,
    pub metadata: ParseMetadata,
}

/// Orchestrates one parse request end to end.
#[derive(Clone)]
pub struct ParsePipeline {
    store: Arc<dyn ObjectStore>,
    ocr: Arc<dyn OcrClient>,
}

impl ParsePipeline {
    pub fn new(store: Arc<dyn ObjectStore>, ocr: Arc<dyn OcrClient>) -> Self {
        Self { store, ocr }
    }

    /// Run the full lifecycle. Once a storage key has been assigned, the
    /// staged object is deleted on every exit path, success or failure,
    /// even when the caller stops waiting for the answer.
    pub async fn handle(
        &self,
        upload: UploadedDocument,
        prompt_id: &str,
    ) -> Result<ParseResult, AppError> {
        let filename = match upload.filename.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                return Err(AppError::Validation(
                    "a filename is required but was not provided".to_string(),
                ))
            }
        };

        validation::validate_file_type(&filename)?;

        let storage_key = generate_storage_key(&filename);
        info!("staging '{}' as '{}'", filename, storage_key);

        // Staging, extraction and teardown run on a detached task: hyper drops
        // the request future when the client disconnects, and the staged object
        // must still be removed once a key has been assigned.
        let worker = self.clone();
        let prompt_id = prompt_id.to_string();
        let task = tokio::spawn(async move {
            let result = worker
                .stage_and_process(&storage_key, &filename, upload, &prompt_id)
                .await;

            if !worker.store.delete(&storage_key).await {
                warn!("failed to clean up staged object: {}", storage_key);
            }

            result
        });

        task.await
            .unwrap_or_else(|e| Err(AppError::Internal(anyhow!("parse task aborted: {}", e))))
    }

    async fn stage_and_process(
        &self,
        storage_key: &str,
        filename: &str,
        upload: UploadedDocument,
        prompt_id: &str,
    ) -> Result<ParseResult, AppError> {
        let content_type = upload
            .content_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        let staged_bytes = upload.data.len();

        self.store
            .put(storage_key, upload.data, &content_type)
            .await?;

        let outcome = self.ocr.process(storage_key, prompt_id, filename).await?;

        Ok(ParseResult {
            success: true,
            data: ParseData {
                markdown: outcome.markdown,
                raw_text: outcome.raw_text,
            },
            metadata: ParseMetadata {
                storage_key: storage_key.to_string(),
                model: outcome.model,
                processing_time_ms: outcome.processing_time_ms,
                request_id: outcome.request_id,
                file_size_kb: validation::file_size_kb(staged_bytes),
            },
        })
    }
}

/// Compose a collision-free storage key from the upload time, a random
/// disambiguator and the sanitized original filename.
fn generate_storage_key(filename: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
    let unique = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        timestamp,
        &unique[..8],
        validation::sanitize_filename(filename)
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingStore {
        fail_put: bool,
        puts: Mutex<Vec<String>>,
        deletes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put(&self, key: &str, _data: Vec<u8>, _ct: &str) -> Result<(), AppError> {
            if self.fail_put {
                return Err(AppError::FileUpload("backend rejected the write".to_string()));
            }
            self.puts.lock().unwrap().push(key.to_string());
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, AppError> {
            Err(AppError::FileNotFound(format!("no such key: {}", key)))
        }

        async fn presigned_url(&self, key: &str, _hours: u64) -> Result<String, AppError> {
            Ok(format!("http://localhost:9000/documents/{}", key))
        }

        async fn delete(&self, key: &str) -> bool {
            self.deletes.lock().unwrap().push(key.to_string());
            true
        }

        async fn exists(&self, _key: &str) -> bool {
            true
        }
    }

    enum FakeOcr {
        Succeed,
        Fail,
        /// Holds the extraction open long enough for the caller to give up.
        Stall,
    }

    fn sample_outcome() -> OcrOutcome {
        OcrOutcome {
            markdown: "# Title".to_string(),
            raw_text: "Title".to_string(),
            model: "mistral-ocr-latest".to_string(),
            request_id: "ocr_deadbeef".to_string(),
            processing_time_ms: 12,
        }
    }

    #[async_trait]
    impl OcrClient for FakeOcr {
        async fn process(
            &self,
            _storage_key: &str,
            _prompt_id: &str,
            _filename: &str,
        ) -> Result<OcrOutcome, AppError> {
            match self {
                FakeOcr::Succeed => Ok(sample_outcome()),
                FakeOcr::Fail => Err(AppError::OcrProcessing(
                    "OCR API failed: engine unavailable".to_string(),
                )),
                FakeOcr::Stall => {
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    Ok(sample_outcome())
                }
            }
        }
    }

    fn upload(filename: Option<&str>) -> UploadedDocument {
        UploadedDocument {
            filename: filename.map(String::from),
            content_type: Some("application/pdf".to_string()),
            data: vec![0u8; 10 * 1024],
        }
    }

    #[tokio::test]
    async fn test_success_stages_then_deletes_exactly_once() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = ParsePipeline::new(store.clone(), Arc::new(FakeOcr::Succeed));

        let result = pipeline
            .handle(upload(Some("report.pdf")), "invoice-extraction")
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.data.markdown, "# Title");
        assert_eq!(result.data.raw_text, "Title");
        assert!((result.metadata.file_size_kb - 10.0).abs() < f64::EPSILON);

        let puts = store.puts.lock().unwrap().clone();
        let deletes = store.deletes.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert_eq!(deletes, puts);
        assert_eq!(result.metadata.storage_key, puts[0]);
    }

    #[tokio::test]
    async fn test_ocr_failure_still_deletes_staged_object() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = ParsePipeline::new(store.clone(), Arc::new(FakeOcr::Fail));

        let err = pipeline
            .handle(upload(Some("report.pdf")), "invoice-extraction")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::OcrProcessing(_)));
        let puts = store.puts.lock().unwrap().clone();
        let deletes = store.deletes.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert_eq!(deletes, puts);
    }

    #[tokio::test]
    async fn test_cleanup_survives_client_disconnect() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = ParsePipeline::new(store.clone(), Arc::new(FakeOcr::Stall));

        // Dropping the timed-out future is exactly what hyper does to the
        // handler when the client goes away mid-request.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(50),
            pipeline.handle(upload(Some("report.pdf")), "invoice-extraction"),
        )
        .await;
        assert!(abandoned.is_err(), "extraction should still be in flight");

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while store.deletes.lock().unwrap().is_empty() {
            assert!(
                std::time::Instant::now() < deadline,
                "staged object was never cleaned up after the disconnect"
            );
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        let puts = store.puts.lock().unwrap().clone();
        let deletes = store.deletes.lock().unwrap().clone();
        assert_eq!(puts.len(), 1);
        assert_eq!(deletes, puts);
    }

    #[tokio::test]
    async fn test_put_failure_maps_to_file_upload_and_still_cleans_up() {
        let store = Arc::new(RecordingStore {
            fail_put: true,
            ..Default::default()
        });
        let pipeline = ParsePipeline::new(store.clone(), Arc::new(FakeOcr::Succeed));

        let err = pipeline
            .handle(upload(Some("report.pdf")), "invoice-extraction")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::FileUpload(_)));
        // The key existed by then, so teardown still runs.
        assert_eq!(store.deletes.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_extension_never_touches_storage() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = ParsePipeline::new(store.clone(), Arc::new(FakeOcr::Succeed));

        let err = pipeline
            .handle(upload(Some("malware.exe")), "invoice-extraction")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.puts.lock().unwrap().is_empty());
        assert!(store.deletes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_filename_is_a_validation_error() {
        let store = Arc::new(RecordingStore::default());
        let pipeline = ParsePipeline::new(store.clone(), Arc::new(FakeOcr::Succeed));

        let err = pipeline
            .handle(upload(None), "invoice-extraction")
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.deletes.lock().unwrap().is_empty());
    }

    #[test]
    fn test_storage_keys_are_unique_for_identical_uploads() {
        let a = generate_storage_key("report.pdf");
        let b = generate_storage_key("report.pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("_report.pdf"));
        assert!(b.ends_with("_report.pdf"));
    }

    #[test]
    fn test_storage_key_sanitizes_the_filename() {
        let key = generate_storage_key("inv#oice (final)!.pdf");
        assert!(key.ends_with("_invoice final.pdf"));
        assert!(!key.contains('#'));
        assert!(!key.contains('('));
    }
}
