//! Per-image worker
//!
//! Captions one image with a bounded retry policy. Every outcome, including
//! unreadable files and exhausted retries, comes back as a value so the
//! batch runner can aggregate without special-casing errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backends::CaptionBackend;
use crate::core::config::Settings;
use crate::core::error::CaptionError;
use crate::core::model::StructuredCaption;
use crate::flows::parse::parse_caption;

/// Attempts per image, including the first
pub const MAX_ATTEMPTS: u32 = 3;

/// Fixed pause between attempts
pub const RETRY_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            backoff: RETRY_BACKOFF,
        }
    }
}

/// Terminal failure for one image
#[derive(Debug)]
pub struct ImageFailure {
    pub image_path: PathBuf,
    pub attempts: u32,
    pub error: CaptionError,
}

/// Captions single images against a shared backend
pub struct CaptionWorker {
    backend: Arc<dyn CaptionBackend>,
    prompt: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl CaptionWorker {
    pub fn new(backend: Arc<dyn CaptionBackend>, settings: &Settings) -> Self {
        Self {
            backend,
            prompt: settings.prompt.clone(),
            timeout: settings.timeout,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Caption one image, retrying transient and parse failures
    pub fn process(&self, image_path: &Path) -> Result<StructuredCaption, ImageFailure> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = self
                .backend
                .caption(image_path, &self.prompt, self.timeout)
                .and_then(|raw| parse_caption(&raw));

            match outcome {
                Ok(caption) => return Ok(caption),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    debug!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        max_attempts,
                        image_path.display(),
                        error
                    );
                    thread::sleep(self.policy.backoff);
                }
                Err(error) => {
                    warn!(
                        "Error processing {} after {} attempt(s): {}",
                        image_path.display(),
                        attempt,
                        error
                    );
                    return Err(ImageFailure {
                        image_path: image_path.to_path_buf(),
                        attempts: attempt,
                        error,
                    });
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-process backend shared by the flow tests

    use super::*;
    use crate::backends::{read_image, HealthStatus};
    use std::collections::HashMap;
    use std::sync::Mutex;

    type Script = dyn Fn(&str, usize) -> Result<String, CaptionError> + Send + Sync;

    /// Backend whose output is a function of (file name, attempt number)
    pub struct ScriptedBackend {
        script: Box<Script>,
        calls: Mutex<HashMap<String, usize>>,
    }

    impl ScriptedBackend {
        pub fn new(
            script: impl Fn(&str, usize) -> Result<String, CaptionError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Box::new(script),
                calls: Mutex::new(HashMap::new()),
            })
        }

        /// Valid JSON for every image except `bad`, which always returns prose
        pub fn failing_on(bad: &'static str) -> Arc<Self> {
            Self::new(move |name, _| {
                if name == bad {
                    Ok("I think this image shows a cat.".to_string())
                } else {
                    Ok(r#"{"caption":"x"}"#.to_string())
                }
            })
        }

        pub fn calls_for(&self, name: &str) -> usize {
            self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
        }

        pub fn total_calls(&self) -> usize {
            self.calls.lock().unwrap().values().sum()
        }
    }

    impl CaptionBackend for ScriptedBackend {
        fn check_health(&self) -> HealthStatus {
            HealthStatus::ready("scripted")
        }

        fn generate(&self, _: &[u8], _: &str, _: Duration) -> Result<String, CaptionError> {
            Err(CaptionError::Request("use caption()".into()))
        }

        fn caption(
            &self,
            image_path: &Path,
            _prompt: &str,
            _timeout: Duration,
        ) -> Result<String, CaptionError> {
            read_image(image_path)?;
            let name = image_path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(name.clone()).or_insert(0);
                *count += 1;
                *count
            };
            (self.script)(&name, attempt)
        }
    }

    pub fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: MAX_ATTEMPTS,
            backoff: Duration::from_millis(1),
        }
    }
}
