//! Runtime settings and policy constants

use anyhow::{Context, Result};
use std::path::Path;
use std::time::Duration;

/// Default backend base URL
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Default vision-language model
pub const DEFAULT_MODEL: &str = "qwen2.5vl:7b";

/// Default per-request generation budget in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default worker pool width for parallel runs
pub const DEFAULT_WORKERS: usize = 4;

/// Timeout for the backend health check
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Sampling temperature sent with every generation request
pub const TEMPERATURE: f32 = 0.7;

/// Output token cap sent with every generation request
pub const MAX_OUTPUT_TOKENS: u32 = 512;

/// Images larger than this are still sent, with a warning
pub const LARGE_IMAGE_BYTES: u64 = 10 * 1024 * 1024;

/// Built-in structured-output prompt
pub const DEFAULT_PROMPT: &str = r#"Describe this image and answer with a single JSON object only, no prose.
Use these keys:
- "caption": one sentence describing the image
- "objects": list of the main objects visible
- "scene": the setting or environment
- "colors": list of dominant colors
- "mood": the overall mood or atmosphere
- "text": any readable text in the image, or an empty string"#;

/// Backend and prompt settings shared by every request in a run
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub model: String,
    pub prompt: String,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt: DEFAULT_PROMPT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Build settings, reading the prompt from `prompt_file` when given
    pub fn new(
        host: &str,
        model: &str,
        prompt_file: Option<&Path>,
        timeout_secs: u64,
    ) -> Result<Self> {
        let prompt = match prompt_file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read prompt file: {}", path.display()))?,
            None => DEFAULT_PROMPT.to_string(),
        };

        Ok(Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.to_string(),
            prompt,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
