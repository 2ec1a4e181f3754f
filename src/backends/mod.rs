//! Backends module - Inference backend integration
//!
//! Provides:
//! - CaptionBackend: the seam between the pipeline and a captioning service
//! - ollama: HTTP client for an Ollama-compatible server
//! - doctor: backend health reporting

pub mod doctor;
pub mod ollama;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::core::config::LARGE_IMAGE_BYTES;
use crate::core::error::CaptionError;
use crate::core::util::format_mb;

/// Result of a backend health check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub ready: bool,
    pub message: String,
}

impl HealthStatus {
    pub fn ready(message: impl Into<String>) -> Self {
        Self {
            ready: true,
            message: message.into(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self {
            ready: false,
            message: message.into(),
        }
    }

    /// Convert into an error when the backend cannot be used
    pub fn ensure_ready(&self) -> Result<(), CaptionError> {
        if self.ready {
            Ok(())
        } else {
            Err(CaptionError::BackendUnavailable(self.message.clone()))
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.ready { "✓" } else { "✗" };
        write!(f, "{} {}", mark, self.message)
    }
}

/// A service that turns an image plus a prompt into raw model text
pub trait CaptionBackend: Send + Sync {
    /// Check that the service is reachable and the model is available
    fn check_health(&self) -> HealthStatus;

    /// Run one generation request over in-memory image bytes
    fn generate(&self, image: &[u8], prompt: &str, timeout: Duration)
        -> Result<String, CaptionError>;

    /// Read an image from disk and caption it
    fn caption(
        &self,
        image_path: &Path,
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, CaptionError> {
        let image = read_image(image_path)?;
        self.generate(&image, prompt, timeout)
    }
}

/// Read image bytes, warning (but continuing) on oversized files
pub fn read_image(path: &Path) -> Result<Vec<u8>, CaptionError> {
    let bytes = std::fs::read(path).map_err(|source| CaptionError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.len() as u64 > LARGE_IMAGE_BYTES {
        warn!(
            "Image {} is large ({})",
            path.display(),
            format_mb(bytes.len() as u64)
        );
    }

    Ok(bytes)
}
