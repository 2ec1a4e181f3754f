//! Caption and batch result model

use serde::{Deserialize, Serialize};
use std::fmt;

/// The model's structured output: an open-schema JSON object.
///
/// The pipeline only checks that the model produced an object; field names
/// are a prompt-level contract.
pub type StructuredCaption = serde_json::Map<String, serde_json::Value>;

/// Aggregate outcome of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Images dispatched in this run
    pub total: usize,

    /// Images whose caption was written (including cache hits)
    pub successful: usize,

    /// Of the successful images, how many were served from the cache
    pub cached: usize,

    /// Failed image names, in completion order
    pub failed: Vec<String>,
}

impl BatchResult {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, from_cache: bool) {
        self.successful += 1;
        if from_cache {
            self.cached += 1;
        }
    }

    pub fn record_failure(&mut self, image: impl Into<String>) {
        self.failed.push(image.into());
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

impl fmt::Display for BatchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Successfully processed: {}/{}", self.successful, self.total)?;
        if self.cached > 0 {
            write!(f, " ({} from cache)", self.cached)?;
        }
        if !self.failed.is_empty() {
            write!(
                f,
                "\nFailed: {} images: {}",
                self.failed.len(),
                self.failed.join(", ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_result_counts() {
        let mut result = BatchResult::new(3);
        result.record_success(false);
        result.record_success(true);
        result.record_failure("b.jpg");

        assert_eq!(result.successful, 2);
        assert_eq!(result.cached, 1);
        assert_eq!(result.failed, vec!["b.jpg"]);
        assert!(!result.is_complete_success());
    }

    #[test]
    fn test_batch_result_display() {
        let mut result = BatchResult::new(2);
        result.record_success(false);
        assert_eq!(result.to_string(), "Successfully processed: 1/2");

        result.record_failure("x.png");
        assert_eq!(
            result.to_string(),
            "Successfully processed: 1/2\nFailed: 1 images: x.png"
        );
    }

    #[test]
    fn test_batch_result_serializes() {
        let mut result = BatchResult::new(1);
        result.record_failure("a.jpg");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["failed"][0], "a.jpg");
        assert_eq!(json["successful"], 0);
    }
}
