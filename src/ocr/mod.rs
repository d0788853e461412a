//! OCR gateway.
//!
//! Forwards a document or image reference to the external OCR vendor and
//! returns the vendor's structured result untouched. A reference is either an
//! internet-accessible `https://` URL (passed through verbatim) or a local
//! store key, whose bytes are inlined as a base64 `data:` URI so the vendor
//! can reach them.

pub mod mistral;

use crate::store::{LocalStore, StoreError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Vendor model identifier used for every OCR call.
pub const OCR_MODEL: &str = "mistral-ocr-latest";

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("no document or image source was provided")]
    MissingInput,
    #[error("OCR_API_KEY is not set in environment variables")]
    MissingCredential,
    #[error("failed to read local file '{key}': {source}")]
    LocalFileUnreadable { key: String, source: StoreError },
    #[error("OCR vendor error ({status}): {message}")]
    Vendor { status: u16, message: String },
    #[error("OCR request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Source payload of a vendor OCR call, tagged the way the vendor API
/// expects (`document_url` for documents, `image_url` for standalone images).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum DocumentSource {
    #[serde(rename = "document_url")]
    Document { document_url: String },
    #[serde(rename = "image_url")]
    Image { image_url: String },
}

/// A fully resolved vendor OCR request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrJob {
    pub model: String,
    pub document: DocumentSource,
    pub include_image_base64: bool,
}

/// Narrow seam in front of the vendor API so tests can substitute a
/// deterministic stub for the real network call.
#[async_trait::async_trait]
pub trait OcrBackend: Send + Sync {
    async fn process(&self, api_key: &str, request: &OcrJob) -> Result<Value, OcrError>;
}

enum SourceKind {
    Document,
    Image,
}

impl SourceKind {
    fn wrap(&self, url: String) -> DocumentSource {
        match self {
            SourceKind::Document => DocumentSource::Document { document_url: url },
            SourceKind::Image => DocumentSource::Image { image_url: url },
        }
    }
}

/// Gateway owning the credential, the local store (for inlining), and the
/// vendor backend. One linear request/response exchange per call; no retries.
pub struct OcrGateway {
    api_key: Option<String>,
    store: LocalStore,
    backend: Arc<dyn OcrBackend>,
}

impl OcrGateway {
    pub fn new(api_key: Option<String>, store: LocalStore, backend: Arc<dyn OcrBackend>) -> Self {
        Self {
            api_key,
            store,
            backend,
        }
    }

    /// Run OCR on a document reference (PDF or similar).
    pub async fn process_document(
        &self,
        source: &str,
        include_image_base64: bool,
    ) -> Result<Value, OcrError> {
        self.process(source, SourceKind::Document, include_image_base64)
            .await
    }

    /// Run OCR on a standalone image reference.
    pub async fn process_image(
        &self,
        source: &str,
        include_image_base64: bool,
    ) -> Result<Value, OcrError> {
        self.process(source, SourceKind::Image, include_image_base64)
            .await
    }

    async fn process(
        &self,
        source: &str,
        kind: SourceKind,
        include_image_base64: bool,
    ) -> Result<Value, OcrError> {
        if source.is_empty() {
            return Err(OcrError::MissingInput);
        }

        // Credential is checked before any vendor work happens.
        let api_key = self.api_key.as_deref().ok_or(OcrError::MissingCredential)?;

        let url = if source.starts_with("https://") {
            source.to_string()
        } else {
            self.inline_as_data_uri(source).await?
        };

        let job = OcrJob {
            model: OCR_MODEL.to_string(),
            document: kind.wrap(url),
            include_image_base64,
        };

        self.backend.process(api_key, &job).await
    }

    /// Read a local store key and re-encode it as a `data:` URI the vendor
    /// can consume directly.
    async fn inline_as_data_uri(&self, key: &str) -> Result<String, OcrError> {
        debug!(key = %key, "inlining local file as base64 data URI");

        let bytes = self
            .store
            .get(key)
            .await
            .map_err(|source| OcrError::LocalFileUnreadable {
                key: key.to_string(),
                source,
            })?;

        let mime = mime_for_extension(key);
        Ok(format!("data:{};base64,{}", mime, BASE64.encode(bytes)))
    }
}

/// MIME type for a data URI, chosen by file extension.
fn mime_for_extension(key: &str) -> &'static str {
    let ext = Path::new(key)
        .extension()
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.to_str() {
        Some("pdf") => "application/pdf",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
