//! Environment-derived service configuration.
//!
//! Read once at startup and injected into components, so tests can construct
//! stores and gateways against throwaway roots instead of ambient globals.

use std::env;
use std::path::PathBuf;

/// Default store root inside the container (Docker volume mount point).
pub const DEFAULT_UPLOAD_DIR: &str = "/app/uploads";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory of the local object store.
    pub upload_dir: PathBuf,
    /// OCR vendor credential. Absent is not a startup error; OCR calls fail
    /// individually with a missing-credential error.
    pub ocr_api_key: Option<String>,
    /// Listen address for the HTTP server.
    pub bind_addr: String,
}

impl Config {
    /// Build the configuration from the process environment.
    ///
    /// `OCR_API_KEY` is preferred; `MISTRAL_API_KEY` is accepted as a
    /// fallback for deployments configured against the vendor's own name.
    pub fn from_env() -> Self {
        let upload_dir = env::var("UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR));

        let ocr_api_key = env::var("OCR_API_KEY")
            .or_else(|_| env::var("MISTRAL_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());

        Self {
            upload_dir,
            ocr_api_key,
            bind_addr,
        }
    }
}
