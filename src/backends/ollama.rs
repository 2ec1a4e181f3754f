//! Ollama backend - Streaming caption generation over HTTP
//!
//! Talks to an Ollama-compatible server:
//! - `GET /api/tags` lists the installed models (health check)
//! - `POST /api/generate` streams newline-delimited JSON chunks

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::backends::{CaptionBackend, HealthStatus};
use crate::core::config::{Settings, HEALTH_TIMEOUT, MAX_OUTPUT_TOKENS, TEMPERATURE};
use crate::core::error::CaptionError;

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Blocking client for one Ollama server and model
pub struct OllamaClient {
    http: Client,
    host: String,
    model: String,
}

impl OllamaClient {
    pub fn new(settings: &Settings) -> Result<Self, CaptionError> {
        let http = Client::builder().build()?;
        Ok(Self {
            http,
            host: settings.host.clone(),
            model: settings.model.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }
}

fn request_error(err: reqwest::Error, timeout: Duration) -> CaptionError {
    if err.is_timeout() {
        CaptionError::Timeout(timeout)
    } else {
        CaptionError::Request(err.to_string())
    }
}

impl CaptionBackend for OllamaClient {
    fn check_health(&self) -> HealthStatus {
        let response = match self
            .http
            .get(self.url("/api/tags"))
            .timeout(HEALTH_TIMEOUT)
            .send()
        {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return HealthStatus::not_ready("Cannot connect to Ollama. Start with: ollama serve");
            }
            Err(e) => return HealthStatus::not_ready(format!("Error checking Ollama: {}", e)),
        };

        if !response.status().is_success() {
            return HealthStatus::not_ready("Ollama is not running. Start with: ollama serve");
        }

        let tags: TagsResponse = match response.json() {
            Ok(tags) => tags,
            Err(e) => return HealthStatus::not_ready(format!("Error checking Ollama: {}", e)),
        };

        if !tags.models.iter().any(|m| m.name.contains(&self.model)) {
            return HealthStatus::not_ready(format!(
                "Model {} not found. Pull with: ollama pull {}",
                self.model, self.model
            ));
        }

        HealthStatus::ready("Ollama ready")
    }

    fn generate(
        &self,
        image: &[u8],
        prompt: &str,
        timeout: Duration,
    ) -> Result<String, CaptionError> {
        let start = Instant::now();
        let payload = GenerateRequest {
            model: &self.model,
            prompt,
            images: vec![BASE64.encode(image)],
            stream: true,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                num_predict: MAX_OUTPUT_TOKENS,
            },
        };

        let response = self
            .http
            .post(self.url("/api/generate"))
            .json(&payload)
            .timeout(timeout)
            .send()
            .map_err(|e| request_error(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(CaptionError::Request(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        let mut text = String::new();
        for line in BufReader::new(response).lines() {
            if start.elapsed() > timeout {
                return Err(CaptionError::Timeout(timeout));
            }

            let line = line.map_err(|e| {
                if e.kind() == std::io::ErrorKind::TimedOut || start.elapsed() >= timeout {
                    CaptionError::Timeout(timeout)
                } else {
                    CaptionError::Request(e.to_string())
                }
            })?;
            if line.trim().is_empty() {
                continue;
            }

            let chunk: GenerateChunk = serde_json::from_str(&line)
                .map_err(|e| CaptionError::Request(format!("malformed stream chunk: {}", e)))?;
            if let Some(error) = chunk.error {
                return Err(CaptionError::Request(error));
            }

            text.push_str(&chunk.response);
            if chunk.done {
                break;
            }
        }

        debug!(
            "Generated {} chars in {}ms",
            text.len(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }
}
