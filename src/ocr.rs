#![allow(dead_code)]
//! Mistral OCR integration.
//!
//! Uses the direct-upload strategy: staged bytes are pushed to Mistral's
//! Files API, processed through a provider-signed URL, and the provider-side
//! copy is deleted before `process` returns, on success and on failure alike.

use crate::error::AppError;
use crate::prompts::PromptCatalog;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

const MISTRAL_API_URL: &str = "https://api.mistral.ai";
const OCR_MODEL: &str = "mistral-ocr-latest";

/// Extracted content plus the per-request metadata reported to the client.
#[derive(Debug, Clone)]
pub struct OcrOutcome {
    pub markdown: String,
    pub raw_text: String,
    pub model: String,
    pub request_id: String,
    pub processing_time_ms: u64,
}

/// Boundary to the OCR provider.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Run OCR over a staged object. `prompt_id` must name a catalog entry;
    /// unknown ids fail before any storage or network work happens.
    async fn process(
        &self,
        storage_key: &str,
        prompt_id: &str,
        original_filename: &str,
    ) -> Result<OcrOutcome, AppError>;
}

// ── Mistral API request/response types ──────────────────────────────────────

#[derive(Serialize)]
struct OcrRequest {
    model: String,
    document: DocumentSource,
    include_image_base64: bool,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum DocumentSource {
    #[serde(rename = "document_url")]
    Url { document_url: String },
}

#[derive(Deserialize)]
struct OcrResponse {
    pages: Vec<MistralPage>,
}

#[derive(Deserialize)]
struct MistralPage {
    markdown: String,
}

#[derive(Deserialize)]
struct FileUploadResponse {
    id: String,
}

#[derive(Deserialize)]
struct SignedUrlResponse {
    url: String,
}

// ── Client implementation ───────────────────────────────────────────────────

pub struct MistralOcr {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<PromptCatalog>,
}

impl MistralOcr {
    pub fn new(
        client: reqwest::Client,
        api_key: String,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<PromptCatalog>,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: MISTRAL_API_URL.to_string(),
            store,
            catalog,
        }
    }

    /// Point the client at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl OcrClient for MistralOcr {
    async fn process(
        &self,
        storage_key: &str,
        prompt_id: &str,
        original_filename: &str,
    ) -> Result<OcrOutcome, AppError> {
        let start = Instant::now();
        let request_id = format!("ocr_{}", &Uuid::new_v4().simple().to_string()[..8]);

        if !self.catalog.exists(prompt_id) {
            return Err(AppError::PromptNotFound(format!(
                "prompt '{}' not found",
                prompt_id
            )));
        }

        info!(
            "[{}] processing '{}' with prompt '{}'",
            request_id, original_filename, prompt_id
        );

        let mut provider_file: Option<String> = None;
        let result = self
            .run_extraction(storage_key, original_filename, &mut provider_file)
            .await;

        // The provider-side copy never outlives this call.
        if let Some(file_id) = provider_file {
            if let Err(e) = self.delete_provider_file(&file_id).await {
                warn!(
                    "[{}] failed to delete provider file {}: {}",
                    request_id, file_id, e
                );
            }
        }

        let content = result?;
        let markdown = content.trim().to_string();
        let raw_text = strip_markdown(&content);
        let processing_time_ms = start.elapsed().as_millis() as u64;

        info!(
            "[{}] extracted {} chars in {} ms",
            request_id,
            markdown.len(),
            processing_time_ms
        );

        Ok(OcrOutcome {
            markdown,
            raw_text,
            model: OCR_MODEL.to_string(),
            request_id,
            processing_time_ms,
        })
    }
}

impl MistralOcr {
    /// Stage → upload → sign → extract. Writes the provider file id into
    /// `provider_file` as soon as it exists so the caller can tear it down
    /// whatever happens after.
    async fn run_extraction(
        &self,
        storage_key: &str,
        original_filename: &str,
        provider_file: &mut Option<String>,
    ) -> Result<String, AppError> {
        let data = self.store.get(storage_key).await?;

        let file_id = self.upload_provider_file(original_filename, data).await?;
        *provider_file = Some(file_id.clone());

        let document_url = self.signed_url(&file_id).await?;
        let response = self.submit_ocr(&document_url).await?;

        Ok(join_pages(&response.pages))
    }

    /// Upload raw bytes to the Files API, return the provider file id.
    async fn upload_provider_file(
        &self,
        filename: &str,
        data: Vec<u8>,
    ) -> Result<String, AppError> {
        use reqwest::multipart::{Form, Part};

        debug!("uploading {} ({} bytes) to Files API", filename, data.len());

        let part = Part::bytes(data).file_name(filename.to_string());
        let form = Form::new().part("file", part).text("purpose", "ocr");

        let resp = self
            .client
            .post(format!("{}/v1/files", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::OcrProcessing(format!("OCR API failed: {}", e)))?;

        let resp = check_provider_status(resp, "file upload").await?;
        let upload: FileUploadResponse = resp
            .json()
            .await
            .map_err(|e| AppError::OcrProcessing(format!("invalid file upload response: {}", e)))?;

        debug!("uploaded provider file id={}", upload.id);
        Ok(upload.id)
    }

    /// Short-lived download URL the OCR endpoint can read the upload from.
    async fn signed_url(&self, file_id: &str) -> Result<String, AppError> {
        let resp = self
            .client
            .get(format!("{}/v1/files/{}/url", self.base_url, file_id))
            .query(&[("expiry", "1")])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::OcrProcessing(format!("OCR API failed: {}", e)))?;

        let resp = check_provider_status(resp, "signed url").await?;
        let signed: SignedUrlResponse = resp
            .json()
            .await
            .map_err(|e| AppError::OcrProcessing(format!("invalid signed url response: {}", e)))?;

        Ok(signed.url)
    }

    async fn submit_ocr(&self, document_url: &str) -> Result<OcrResponse, AppError> {
        let body = OcrRequest {
            model: OCR_MODEL.to_string(),
            document: DocumentSource::Url {
                document_url: document_url.to_string(),
            },
            include_image_base64: false,
        };

        info!("calling Mistral OCR API");

        let resp = self
            .client
            .post(format!("{}/v1/ocr", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::OcrProcessing(format!("OCR API failed: {}", e)))?;

        let resp = check_provider_status(resp, "processing").await?;
        resp.json::<OcrResponse>()
            .await
            .map_err(|e| AppError::OcrProcessing(format!("invalid OCR response: {}", e)))
    }

    async fn delete_provider_file(&self, file_id: &str) -> Result<(), AppError> {
        let resp = self
            .client
            .delete(format!("{}/v1/files/{}", self.base_url, file_id))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::OcrProcessing(format!("{}", e)))?;

        check_provider_status(resp, "file delete").await?;
        debug!("deleted provider file {}", file_id);
        Ok(())
    }
}

async fn check_provider_status(
    resp: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, AppError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    Err(AppError::OcrProcessing(format!(
        "OCR API failed: {} error ({}): {}",
        what, status, text
    )))
}

// ── Content shaping ─────────────────────────────────────────────────────────

/// Join per-page markdown with a visible separator; sentinel when the
/// provider returned no pages.
fn join_pages(pages: &[MistralPage]) -> String {
    match pages.len() {
        0 => "No content extracted".to_string(),
        1 => pages[0].markdown.clone(),
        _ => pages
            .iter()
            .map(|p| p.markdown.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"),
    }
}

static RE_MARKDOWN_GLYPHS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[#*`-]\s*").unwrap());
static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Best-effort plain-text rendering of OCR markdown: drop heading, emphasis,
/// code and list glyphs, collapse blank lines, trim. Lossy on hyphenated
/// words; identical input always yields identical output.
pub fn strip_markdown(content: &str) -> String {
    let cleaned = RE_MARKDOWN_GLYPHS.replace_all(content, "");
    let cleaned = RE_BLANK_LINES.replace_all(&cleaned, "\n");
    cleaned.trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================
