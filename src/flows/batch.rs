//! Batch runner
//!
//! Fans a set of images out to [`CaptionWorker`]s, either one at a time in
//! input order or over a fixed-size rayon pool, and writes each caption to
//! `<caption_dir>/<stem>.json` as soon as it is available. One image failing
//! never stops the rest; failures are collected into the [`BatchResult`].
//!
//! In parallel mode workers only produce results. Writing caption files and
//! updating the cache happens on the calling thread as results arrive, so the
//! cache keeps a single writer.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backends::HealthStatus;
use crate::cache::store::CaptionCache;
use crate::core::model::{BatchResult, StructuredCaption};
use crate::core::paths::{caption_path, image_stem};
use crate::flows::worker::{CaptionWorker, ImageFailure};

/// How images are scheduled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One image at a time, in input order
    #[default]
    Sequential,
    /// Bounded worker pool; completion order is unspecified
    Parallel { workers: usize },
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub mode: ExecutionMode,
    pub caption_dir: PathBuf,
    pub show_progress: bool,
}

/// Images that do not have a caption file yet
pub fn pending_images(images: &[String], caption_dir: &Path) -> Vec<String> {
    let pending: Vec<String> = images
        .iter()
        .filter(|name| !caption_path(caption_dir, name).exists())
        .cloned()
        .collect();

    for (stem, names) in shared_stems(&pending) {
        warn!(
            "Images {} share the caption file {}.json; the last one written wins",
            names.join(", "),
            stem
        );
    }
    pending
}

/// Groups of images that map to the same caption file, keyed by stem
pub fn shared_stems(images: &[String]) -> Vec<(String, Vec<String>)> {
    let mut by_stem: HashMap<String, Vec<String>> = HashMap::new();
    for name in images {
        by_stem.entry(image_stem(name)).or_default().push(name.clone());
    }

    let mut shared: Vec<(String, Vec<String>)> = by_stem
        .into_iter()
        .filter(|(_, names)| names.len() > 1)
        .collect();
    shared.sort();
    shared
}

/// Write a caption document with four-space indentation
pub fn write_caption(path: &Path, caption: &StructuredCaption) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    caption.serialize(&mut serializer)?;
    fs::write(path, buf).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

pub struct BatchRunner {
    worker: Arc<CaptionWorker>,
    options: BatchOptions,
    cache: Option<CaptionCache>,
}

impl BatchRunner {
    pub fn new(worker: CaptionWorker, options: BatchOptions) -> Self {
        Self {
            worker: Arc::new(worker),
            options,
            cache: None,
        }
    }

    /// Serve fresh cache hits without inference and cache new captions
    pub fn with_cache(mut self, cache: CaptionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[allow(dead_code)]
    pub fn cache(&self) -> Option<&CaptionCache> {
        self.cache.as_ref()
    }

    /// Caption `images` (names relative to `root`).
    ///
    /// Fails only when `health` says the backend is unusable; per-image
    /// problems end up in [`BatchResult::failed`].
    pub fn run(
        &mut self,
        images: &[String],
        root: &Path,
        health: &HealthStatus,
    ) -> Result<BatchResult> {
        health.ensure_ready()?;
        fs::create_dir_all(&self.options.caption_dir).with_context(|| {
            format!(
                "Failed to create caption directory: {}",
                self.options.caption_dir.display()
            )
        })?;

        info!("Captioning {} images ({:?})", images.len(), self.options.mode);
        let mut result = BatchResult::new(images.len());
        let progress = self.progress_bar(images.len());

        match self.options.mode {
            ExecutionMode::Sequential => {
                for name in images {
                    let path = root.join(name);
                    if !self.serve_from_cache(name, &path, &mut result) {
                        let outcome = self.worker.process(&path);
                        self.record(name, &path, outcome, &mut result);
                    }
                    progress.inc(1);
                }
            }
            ExecutionMode::Parallel { workers } => {
                let mut pending = Vec::new();
                for name in images {
                    let path = root.join(name);
                    if self.serve_from_cache(name, &path, &mut result) {
                        progress.inc(1);
                    } else {
                        pending.push(name.clone());
                    }
                }
                self.run_parallel(pending, root, workers, &mut result, &progress);
            }
        }

        progress.finish_and_clear();
        info!(
            "Batch finished: {} succeeded, {} failed",
            result.successful,
            result.failed.len()
        );
        Ok(result)
    }

    fn run_parallel(
        &mut self,
        images: Vec<String>,
        root: &Path,
        workers: usize,
        result: &mut BatchResult,
        progress: &ProgressBar,
    ) {
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("capmap-worker-{}", i))
            .panic_handler(|_| warn!("Caption worker panicked; its image is marked failed"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Worker pool unavailable ({}), running sequentially", e);
                for name in &images {
                    let path = root.join(name);
                    let outcome = self.worker.process(&path);
                    self.record(name, &path, outcome, result);
                    progress.inc(1);
                }
                return;
            }
        };

        let mut outstanding: HashSet<String> = images.iter().cloned().collect();
        let (tx, rx) = mpsc::channel();
        for name in images {
            let tx = tx.clone();
            let worker = Arc::clone(&self.worker);
            let path = root.join(&name);
            pool.spawn(move || {
                let outcome = worker.process(&path);
                let _ = tx.send((name, path, outcome));
            });
        }
        drop(tx);

        // Receiving ends once every task has dropped its sender, including
        // tasks that unwound before sending
        for (name, path, outcome) in rx {
            outstanding.remove(&name);
            self.record(&name, &path, outcome, result);
            progress.inc(1);
        }

        let mut lost: Vec<String> = outstanding.into_iter().collect();
        lost.sort();
        for name in lost {
            warn!("No result received for {}", name);
            result.record_failure(name);
        }
    }

    fn serve_from_cache(&self, name: &str, path: &Path, result: &mut BatchResult) -> bool {
        let Some(caption) = self.cache.as_ref().and_then(|cache| cache.get(path)) else {
            return false;
        };

        let target = caption_path(&self.options.caption_dir, name);
        match write_caption(&target, &caption) {
            Ok(()) => {
                result.record_success(true);
                true
            }
            Err(e) => {
                warn!("Cached caption for {} not written: {:#}", name, e);
                false
            }
        }
    }

    fn record(
        &mut self,
        name: &str,
        path: &Path,
        outcome: Result<StructuredCaption, ImageFailure>,
        result: &mut BatchResult,
    ) {
        let caption = match outcome {
            Ok(caption) => caption,
            Err(failure) => {
                debug!(
                    "{} failed after {} attempt(s): {}",
                    failure.image_path.display(),
                    failure.attempts,
                    failure.error
                );
                result.record_failure(name);
                return;
            }
        };

        let target = caption_path(&self.options.caption_dir, name);
        if let Err(e) = write_caption(&target, &caption) {
            warn!("Caption for {} not saved: {:#}", name, e);
            result.record_failure(name);
            return;
        }

        if let Some(cache) = self.cache.as_mut() {
            cache.set(path, &caption);
        }
        result.record_success(false);
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let bar = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::with_template("{msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_message("Captioning");
        bar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Settings;
    use crate::core::error::CaptionError;
    use crate::flows::worker::testing::{fast_policy, ScriptedBackend};
    use tempfile::{tempdir, TempDir};

    fn setup(names: &[&str]) -> (TempDir, PathBuf, PathBuf, Vec<String>) {
        let temp = tempdir().unwrap();
        let source = temp.path().join("source");
        let captions = temp.path().join("captions");
        fs::create_dir_all(&source).unwrap();
        for name in names {
            fs::write(source.join(name), name.as_bytes()).unwrap();
        }
        let images = names.iter().map(|n| n.to_string()).collect();
        (temp, source, captions, images)
    }

    fn runner(backend: Arc<ScriptedBackend>, captions: &Path, mode: ExecutionMode) -> BatchRunner {
        let worker = CaptionWorker::new(backend, &Settings::default()).with_policy(fast_policy());
        BatchRunner::new(
            worker,
            BatchOptions {
                mode,
                caption_dir: captions.to_path_buf(),
                show_progress: false,
            },
        )
    }

    fn ready() -> HealthStatus {
        HealthStatus::ready("ok")
    }

    fn assert_abc_scenario(mode: ExecutionMode) {
        let (_temp, source, captions, images) = setup(&["a.jpg", "b.jpg", "c.jpg"]);
        let backend = ScriptedBackend::failing_on("b.jpg");

        let result = runner(backend.clone(), &captions, mode)
            .run(&images, &source, &ready())
            .unwrap();

        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, vec!["b.jpg"]);
        assert!(captions.join("a.json").exists());
        assert!(captions.join("c.json").exists());
        assert!(!captions.join("b.json").exists());
        assert_eq!(backend.calls_for("b.jpg"), 3);
        assert_eq!(backend.calls_for("a.jpg"), 1);
    }

    #[test]
    fn test_scenario_sequential() {
        assert_abc_scenario(ExecutionMode::Sequential);
    }

    #[test]
    fn test_scenario_parallel() {
        assert_abc_scenario(ExecutionMode::Parallel { workers: 4 });
    }

    #[test]
    fn test_partial_failure_isolation() {
        let names = ["1.jpg", "2.jpg", "3.jpg", "4.png", "5.jpeg", "6.jpg", "7.jpg"];
        let (_temp, source, captions, images) = setup(&names);
        let backend = ScriptedBackend::failing_on("5.jpeg");

        let result = runner(backend, &captions, ExecutionMode::Parallel { workers: 3 })
            .run(&images, &source, &ready())
            .unwrap();

        assert_eq!(result.total, 7);
        assert_eq!(result.successful, 6);
        assert_eq!(result.failed, vec!["5.jpeg"]);
        assert!(!captions.join("5.json").exists());
    }

    #[test]
    fn test_sequential_failures_keep_input_order() {
        let (_temp, source, captions, images) = setup(&["z.jpg", "a.jpg", "m.jpg"]);
        let backend = ScriptedBackend::new(|_, _| Ok("nope".to_string()));

        let result = runner(backend, &captions, ExecutionMode::Sequential)
            .run(&images, &source, &ready())
            .unwrap();

        assert_eq!(result.successful, 0);
        assert_eq!(result.failed, vec!["z.jpg", "a.jpg", "m.jpg"]);
    }

    #[test]
    fn test_missing_image_fails_without_calls() {
        let (_temp, source, captions, mut images) = setup(&["a.jpg"]);
        images.push("ghost.jpg".to_string());
        let backend = ScriptedBackend::failing_on("none");

        let result = runner(backend.clone(), &captions, ExecutionMode::Sequential)
            .run(&images, &source, &ready())
            .unwrap();

        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, vec!["ghost.jpg"]);
        assert_eq!(backend.total_calls(), 1);
    }

    #[test]
    fn test_persisted_caption_content() {
        let (_temp, source, captions, images) = setup(&["cat.png"]);
        let backend = ScriptedBackend::new(|_, _| {
            Ok("```json\n{\"caption\":\"a cat\",\"objects\":[\"cat\"]}\n```".to_string())
        });

        runner(backend, &captions, ExecutionMode::Sequential)
            .run(&images, &source, &ready())
            .unwrap();

        let written = fs::read_to_string(captions.join("cat.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["caption"], "a cat");
        assert!(written.contains("\n    \"caption\""));
    }

    #[test]
    fn test_backend_unavailable_aborts_before_work() {
        let (_temp, source, captions, images) = setup(&["a.jpg"]);
        let backend = ScriptedBackend::failing_on("none");

        let err = runner(backend.clone(), &captions, ExecutionMode::Sequential)
            .run(&images, &source, &HealthStatus::not_ready("Cannot connect"))
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<CaptionError>(),
            Some(CaptionError::BackendUnavailable(_))
        ));
        assert_eq!(backend.total_calls(), 0);
        assert!(!captions.exists());
    }

    #[test]
    fn test_rerun_skips_existing_outputs() {
        let (_temp, source, captions, images) = setup(&["a.jpg", "b.jpg", "c.jpg"]);
        let backend = ScriptedBackend::failing_on("none");

        let first = runner(backend.clone(), &captions, ExecutionMode::Parallel { workers: 2 })
            .run(&pending_images(&images, &captions), &source, &ready())
            .unwrap();
        assert_eq!(first.successful, 3);
        assert_eq!(backend.total_calls(), 3);

        let pending = pending_images(&images, &captions);
        assert!(pending.is_empty());

        let second = runner(backend.clone(), &captions, ExecutionMode::Parallel { workers: 2 })
            .run(&pending, &source, &ready())
            .unwrap();
        assert_eq!(second, BatchResult::new(0));
        assert_eq!(backend.total_calls(), 3);
    }

    #[test]
    fn test_rerun_retries_only_failed() {
        let (_temp, source, captions, images) = setup(&["a.jpg", "b.jpg"]);
        let backend = ScriptedBackend::failing_on("b.jpg");

        runner(backend.clone(), &captions, ExecutionMode::Sequential)
            .run(&images, &source, &ready())
            .unwrap();

        assert_eq!(pending_images(&images, &captions), vec!["b.jpg"]);
    }

    #[test]
    fn test_cache_serves_hits_without_inference() {
        let (temp, source, captions, images) = setup(&["a.jpg", "b.jpg"]);
        let backend = ScriptedBackend::failing_on("none");
        let cache_dir = temp.path().join("cache");

        let mut first = runner(backend.clone(), &captions, ExecutionMode::Parallel { workers: 2 })
            .with_cache(CaptionCache::open(&cache_dir).unwrap());
        first.run(&images, &source, &ready()).unwrap();
        assert_eq!(first.cache().unwrap().stats().entries, 2);
        assert_eq!(backend.total_calls(), 2);

        fs::remove_dir_all(&captions).unwrap();

        let mut second = runner(backend.clone(), &captions, ExecutionMode::Sequential)
            .with_cache(CaptionCache::open(&cache_dir).unwrap());
        let result = second.run(&images, &source, &ready()).unwrap();

        assert_eq!(result.successful, 2);
        assert_eq!(result.cached, 2);
        assert_eq!(backend.total_calls(), 2);
        assert!(captions.join("a.json").exists());
    }

    #[test]
    fn test_without_cache_nothing_is_cached() {
        let (temp, source, captions, images) = setup(&["a.jpg"]);
        let backend = ScriptedBackend::failing_on("none");

        let mut plain = runner(backend, &captions, ExecutionMode::Sequential);
        plain.run(&images, &source, &ready()).unwrap();
        assert!(plain.cache().is_none());
        assert!(!temp.path().join("cache").exists());
    }

    #[test]
    fn test_default_mode_is_sequential() {
        assert_eq!(ExecutionMode::default(), ExecutionMode::Sequential);
    }

    #[test]
    fn test_panicking_worker_marks_image_failed() {
        let (_temp, source, captions, images) = setup(&["a.jpg", "b.jpg", "c.jpg"]);
        let backend = ScriptedBackend::new(|name, _| {
            if name == "b.jpg" {
                panic!("decoder blew up");
            }
            Ok(r#"{"caption":"x"}"#.to_string())
        });

        let result = runner(backend, &captions, ExecutionMode::Parallel { workers: 2 })
            .run(&images, &source, &ready())
            .unwrap();

        assert_eq!(result.successful, 2);
        assert_eq!(result.failed, vec!["b.jpg"]);
        assert!(captions.join("a.json").exists());
        assert!(captions.join("c.json").exists());
    }

    #[test]
    fn test_shared_stems() {
        let images: Vec<String> = ["a.jpg", "a.png", "b.jpg", "c.JPEG", "c.png"]
            .iter()
            .map(|n| n.to_string())
            .collect();

        assert_eq!(
            shared_stems(&images),
            vec![
                ("a".to_string(), vec!["a.jpg".to_string(), "a.png".to_string()]),
                ("c".to_string(), vec!["c.JPEG".to_string(), "c.png".to_string()]),
            ]
        );
        assert!(shared_stems(&images[2..3]).is_empty());
    }

    #[test]
    fn test_shared_stem_images_stay_pending() {
        let (_temp, _source, captions, _) = setup(&[]);
        let images = vec!["a.jpg".to_string(), "a.png".to_string()];
        assert_eq!(pending_images(&images, &captions), images);
    }

    #[test]
    fn test_empty_batch() {
        let (_temp, source, captions, _) = setup(&[]);
        let backend = ScriptedBackend::failing_on("none");

        let result = runner(backend, &captions, ExecutionMode::default())
            .run(&[], &source, &ready())
            .unwrap();
        assert_eq!(result, BatchResult::new(0));
    }
}
