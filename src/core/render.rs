//! Renderer module
//!
//! Renders reports (batch summaries, cache stats, health) as text or JSON

use serde::Serialize;
use std::fmt::Display;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}", s)),
        }
    }
}

/// Render configuration combining format and options
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderConfig {
    pub format: OutputFormat,
    pub pretty: bool,
}

impl RenderConfig {
    pub fn with_pretty(format: OutputFormat, pretty: bool) -> Self {
        Self { format, pretty }
    }

    /// Render a report in the configured format
    pub fn render<T: Serialize + Display>(&self, report: &T) -> String {
        match self.format {
            OutputFormat::Text => report.to_string(),
            OutputFormat::Json if self.pretty => {
                serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Json => {
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            }
        }
    }

    pub fn is_text(&self) -> bool {
        self.format == OutputFormat::Text
    }
}
