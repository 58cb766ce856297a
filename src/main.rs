//! docgate - document intake gateway: upload, Mistral OCR, guaranteed cleanup.

mod config;
mod error;
mod ocr;
mod pipeline;
mod prompts;
mod storage;
mod validation;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    response::Json,
    routing::{get, post},
    Router,
};
use config::Settings;
use error::AppError;
use ocr::MistralOcr;
use pipeline::{ParsePipeline, ParseResult, UploadedDocument};
use prompts::{PromptCatalog, PromptDescriptor};
use serde_json::{json, Value};
use std::sync::Arc;
use storage::S3ObjectStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    catalog: Arc<PromptCatalog>,
    pipeline: Arc<ParsePipeline>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "docgate=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;

    // Storage and catalog are hard prerequisites: refuse to start without them
    let store = Arc::new(S3ObjectStore::connect(&settings).await?);
    info!("object storage ready");

    let catalog_path = std::path::Path::new("prompts/definitions.json");
    let catalog = Arc::new(PromptCatalog::load(catalog_path)?);

    let ocr = MistralOcr::new(
        reqwest::Client::new(),
        settings.mistral_api_key.clone(),
        store.clone(),
        catalog.clone(),
    );

    // Build application state
    let state = AppState {
        catalog: catalog.clone(),
        pipeline: Arc::new(ParsePipeline::new(store, Arc::new(ocr))),
    };

    let app = app(state);

    // Run server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server listening on http://0.0.0.0:3000");
    axum::serve(listener, app).await?;

    Ok(())
}

/// Assemble the route tree and middleware stack around the shared state.
fn app(state: AppState) -> Router {
    let api = Router::new()
        .route("/prompts", get(list_prompts))
        .route("/parse", post(parse_document));

    Router::new()
        .route("/", get(health))
        .nest("/api/v1", api)
        .layer(DefaultBodyLimit::max(50 * 1024 * 1024)) // 50MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Welcome to the docgate API" }))
}

#[derive(serde::Serialize)]
struct PromptListResponse {
    prompts: Vec<PromptDescriptor>,
}

/// List the prompts a client may select for parsing.
async fn list_prompts(State(state): State<AppState>) -> Json<PromptListResponse> {
    Json(PromptListResponse {
        prompts: state.catalog.list().to_vec(),
    })
}

/// Upload a document, run it through OCR, and return the extracted content.
async fn parse_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ParseResult>, AppError> {
    let mut upload: Option<UploadedDocument> = None;
    let mut prompt_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart request: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("failed to read file field: {}", e)))?
                .to_vec();

            upload = Some(UploadedDocument {
                filename,
                content_type,
                data,
            });
        } else if field.name() == Some("promptId") {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("failed to read promptId field: {}", e)))?;
            prompt_id = Some(value);
        }
    }

    let upload = upload
        .ok_or_else(|| AppError::Validation("multipart field 'file' is required".to_string()))?;
    let prompt_id = prompt_id
        .ok_or_else(|| AppError::Validation("multipart field 'promptId' is required".to_string()))?;

    let result = state.pipeline.handle(upload, &prompt_id).await?;
    Ok(Json(result))
}

// ============================================================================
// Tests
// ============================================================================
