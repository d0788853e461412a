//! Mistral OCR backend (the vendor's REST API over reqwest).

use super::{OcrBackend, OcrError, OcrJob};
use serde_json::Value;
use tracing::{debug, info};

const MISTRAL_OCR_URL: &str = "https://api.mistral.ai/v1/ocr";

/// Real vendor client. The response body is returned as untyped JSON; this
/// service neither validates nor reshapes the vendor's result.
#[derive(Clone, Default)]
pub struct MistralOcr {
    client: reqwest::Client,
}

impl MistralOcr {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OcrBackend for MistralOcr {
    async fn process(&self, api_key: &str, request: &OcrJob) -> Result<Value, OcrError> {
        info!(model = %request.model, "calling Mistral OCR API");

        let resp = self
            .client
            .post(MISTRAL_OCR_URL)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OcrError::Vendor {
                status: status.as_u16(),
                message,
            });
        }

        let result: Value = resp.json().await?;
        debug!("Mistral OCR response received");
        Ok(result)
    }
}
