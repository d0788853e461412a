//! ocr-bridge - upload store and OCR gateway server.
//!
//! Persists uploaded PDFs/images on a local volume, serves them back over
//! HTTP, and forwards document/image references to the Mistral OCR API.

mod config;
mod ocr;
mod store;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
    Router,
};
use config::Config;
use ocr::{mistral::MistralOcr, OcrError, OcrGateway};
use serde_json::Value;
use std::sync::Arc;
use store::{LocalStore, IMAGE_CONTENT_TYPES, MAX_UPLOAD_BYTES, PDF_CONTENT_TYPES};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    store: LocalStore,
    ocr: Arc<OcrGateway>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ocr_bridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    tokio::fs::create_dir_all(&config.upload_dir).await?;
    info!("Upload root: {}", config.upload_dir.display());
    if config.ocr_api_key.is_none() {
        info!("No OCR credential configured; OCR calls will be rejected");
    }

    let store = LocalStore::new(config.upload_dir.clone());
    let gateway = OcrGateway::new(
        config.ocr_api_key.clone(),
        store.clone(),
        Arc::new(MistralOcr::new()),
    );

    let state = AppState {
        store,
        ocr: Arc::new(gateway),
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("Server listening on http://{}", config.bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Build the router. Split from `main` so tests can drive it in-process.
fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/files/pdf", post(upload_pdf))
        .route("/files/image", post(upload_image))
        .route("/files", get(list_files))
        .route("/files/{*path}", delete(delete_file))
        // `/uploads/...` is the public alias the hosting layer rewrites to
        // the internal `/api/files/...` route; both hit the same handler.
        .route("/api/files/{*path}", get(serve_file))
        .route("/uploads/{*path}", get(serve_file))
        .route("/ocr/document", post(ocr_document))
        .route("/ocr/image", post(ocr_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Deserialize)]
struct UploadQuery {
    folder: Option<String>,
    filename: Option<String>,
}

/// Upload result: exactly one of `url`/`error` is populated.
#[derive(serde::Serialize)]
struct UploadResponse {
    url: Option<String>,
    error: Option<String>,
}

/// Upload a PDF document (stored under `pdfs/` by default).
async fn upload_pdf(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Json<UploadResponse> {
    upload(state, query, multipart, "pdfs", PDF_CONTENT_TYPES).await
}

/// Upload an image (JPEG/PNG, stored under `images/` by default).
async fn upload_image(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    multipart: Multipart,
) -> Json<UploadResponse> {
    upload(state, query, multipart, "images", IMAGE_CONTENT_TYPES).await
}

async fn upload(
    state: AppState,
    query: UploadQuery,
    multipart: Multipart,
    default_folder: &str,
    allowed_types: &[&str],
) -> Json<UploadResponse> {
    let (filename, content_type, data) = match read_file_field(multipart).await {
        Ok(field) => field,
        Err(message) => {
            error!("Upload rejected: {}", message);
            return Json(UploadResponse {
                url: None,
                error: Some(message),
            });
        }
    };

    let folder = query.folder.as_deref().unwrap_or(default_folder);
    info!(
        "Received file: {} ({} bytes) for folder: {}",
        filename,
        data.len(),
        folder
    );

    let result = state
        .store
        .put(
            &data,
            &content_type,
            &filename,
            folder,
            query.filename.as_deref(),
            allowed_types,
            MAX_UPLOAD_BYTES,
        )
        .await;

    match result {
        Ok(url) => Json(UploadResponse {
            url: Some(url),
            error: None,
        }),
        Err(e) => {
            error!("Upload failed: {}", e);
            Json(UploadResponse {
                url: None,
                error: Some(e.to_string()),
            })
        }
    }
}

/// Pull the `file` field out of a multipart request.
async fn read_file_field(mut multipart: Multipart) -> Result<(String, String, Bytes), String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Multipart error: {}", e))?
    {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or("upload").to_string();
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| format!("Failed to read file: {}", e))?;
            return Ok((filename, content_type, data));
        }
    }
    Err("No file uploaded".to_string())
}

#[derive(serde::Deserialize)]
struct ListQuery {
    prefix: Option<String>,
}

#[derive(serde::Serialize)]
struct ListResponse {
    files: Vec<String>,
    error: Option<String>,
}

/// List stored files under a folder prefix.
async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<ListResponse> {
    match state.store.list(query.prefix.as_deref().unwrap_or("")).await {
        Ok(files) => Json(ListResponse { files, error: None }),
        Err(e) => {
            error!("File listing failed: {}", e);
            Json(ListResponse {
                files: Vec::new(),
                error: Some(e.to_string()),
            })
        }
    }
}

#[derive(serde::Serialize)]
struct DeleteResponse {
    success: bool,
    error: Option<String>,
}

/// Delete a stored file.
async fn delete_file(
    State(state): State<AppState>,
    Path(path): Path<String>,
) -> Json<DeleteResponse> {
    match state.store.delete(&path).await {
        Ok(()) => Json(DeleteResponse {
            success: true,
            error: None,
        }),
        Err(e) => {
            error!("File deletion failed: {}", e);
            Json(DeleteResponse {
                success: false,
                error: Some(e.to_string()),
            })
        }
    }
}

/// Serve a stored file with long-lived caching headers.
///
/// The whole file is buffered per request; files are assumed small enough
/// that range requests are not needed.
async fn serve_file(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    let full_path = match state.store.resolve(&path) {
        Ok(p) => p,
        Err(_) => return (StatusCode::FORBIDDEN, "Forbidden").into_response(),
    };

    let meta = match tokio::fs::metadata(&full_path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (StatusCode::NOT_FOUND, "File not found").into_response();
        }
        Err(e) => {
            error!("File serving error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }
    };

    if !meta.is_file() {
        return (StatusCode::BAD_REQUEST, "Not a file").into_response();
    }

    let body = match tokio::fs::read(&full_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("File serving error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response();
        }
    };

    let mime_type = mime_guess::from_path(&full_path).first_or_octet_stream();

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime_type.to_string()),
            (header::CONTENT_LENGTH, meta.len().to_string()),
            (header::CACHE_CONTROL, "public, max-age=31536000".to_string()),
        ],
        body,
    )
        .into_response()
}

fn default_include_image_base64() -> bool {
    true
}

#[derive(serde::Deserialize)]
struct DocumentOcrRequest {
    document: String,
    #[serde(default = "default_include_image_base64")]
    include_image_base64: bool,
}

#[derive(serde::Deserialize)]
struct ImageOcrRequest {
    image: String,
    #[serde(default = "default_include_image_base64")]
    include_image_base64: bool,
}

/// Run OCR on a document URL or local store key.
async fn ocr_document(
    State(state): State<AppState>,
    Json(req): Json<DocumentOcrRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .ocr
        .process_document(&req.document, req.include_image_base64)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Document OCR failed: {}", e);
            (ocr_status(&e), e.to_string())
        })
}

/// Run OCR on an image URL or local store key.
async fn ocr_image(
    State(state): State<AppState>,
    Json(req): Json<ImageOcrRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    state
        .ocr
        .process_image(&req.image, req.include_image_base64)
        .await
        .map(Json)
        .map_err(|e| {
            error!("Image OCR failed: {}", e);
            (ocr_status(&e), e.to_string())
        })
}

fn ocr_status(e: &OcrError) -> StatusCode {
    match e {
        OcrError::MissingInput => StatusCode::BAD_REQUEST,
        OcrError::MissingCredential => StatusCode::INTERNAL_SERVER_ERROR,
        OcrError::LocalFileUnreadable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        OcrError::Vendor { .. } | OcrError::Http(_) => StatusCode::BAD_GATEWAY,
    }
}

// ============================================================================
// Tests
// ============================================================================
