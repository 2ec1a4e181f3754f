//! Captioning error taxonomy

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while captioning a single image or checking the backend.
///
/// Cache failures are not represented here: the cache logs them and degrades
/// to a miss or a dropped write.
#[derive(Debug, Error)]
pub enum CaptionError {
    /// Health check failed; the whole run is aborted
    #[error("{0}")]
    BackendUnavailable(String),

    /// Source image could not be read
    #[error("could not read image {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generation exceeded its wall-clock budget
    #[error("caption generation exceeded {}s", .0.as_secs())]
    Timeout(Duration),

    /// Connection failure, bad status, or an error reported inside the stream
    #[error("backend request failed: {0}")]
    Request(String),

    /// Model output was not a JSON object after de-fencing
    #[error("model output is not a JSON object: {message}")]
    Parse { message: String, raw: String },
}

impl CaptionError {
    /// Whether the per-image retry policy should try again after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            CaptionError::Read { .. } | CaptionError::BackendUnavailable(_)
        )
    }
}

impl From<reqwest::Error> for CaptionError {
    fn from(err: reqwest::Error) -> Self {
        CaptionError::Request(err.to_string())
    }
}
