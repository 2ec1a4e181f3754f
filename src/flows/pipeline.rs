//! Full captioning pipeline behind `capmap run`
//!
//! health check -> optional cache clear -> enumerate images -> skip existing
//! captions -> batch run -> summary -> demos -> cache stats

use anyhow::Result;
use colored::Colorize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::backends::doctor::check_backend;
use crate::backends::CaptionBackend;
use crate::cache::store::CaptionCache;
use crate::core::config::Settings;
use crate::core::model::BatchResult;
use crate::core::paths::{list_images, DataLayout};
use crate::core::render::RenderConfig;
use crate::flows::batch::{pending_images, BatchOptions, BatchRunner, ExecutionMode};
use crate::flows::demo::make_demos;
use crate::flows::worker::CaptionWorker;

/// Options for one pipeline run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Only consider the first N images (before skipping existing captions); 0 means all
    pub limit: Option<usize>,
    pub mode: ExecutionMode,
    pub use_cache: bool,
    pub clear_cache: bool,
    pub num_demos: usize,
    pub show_progress: bool,
}

/// Run the pipeline; returns the batch result when any images were processed
pub fn run_pipeline(
    backend: Arc<dyn CaptionBackend>,
    settings: &Settings,
    layout: &DataLayout,
    options: &RunOptions,
    render: RenderConfig,
) -> Result<Option<BatchResult>> {
    let health = check_backend(backend.as_ref(), render);
    health.ensure_ready()?;

    if options.clear_cache {
        CaptionCache::open(&layout.cache)?.clear();
    }

    let mut all_images = if layout.source.is_dir() {
        list_images(&layout.source)?
    } else {
        Vec::new()
    };
    if all_images.is_empty() {
        eprintln!(
            "No images found. Place .png/.jpg/.jpeg files in {}",
            layout.source.display()
        );
        return Ok(None);
    }
    if let Some(limit) = options.limit.filter(|&n| n > 0) {
        all_images.truncate(limit);
    }
    info!("Found {} images to process", all_images.len());

    let images = pending_images(&all_images, &layout.captions);
    let existing = all_images.len() - images.len();
    if existing > 0 {
        info!(
            "Found {} existing captions, {} new to process",
            existing,
            images.len()
        );
    }

    let mut outcome = None;
    if images.is_empty() {
        if render.is_text() {
            println!("{}", "All images already have captions!".green());
        } else {
            println!("{}", render.render(&BatchResult::new(0)));
        }
    } else {
        let worker = CaptionWorker::new(backend, settings);
        let mut runner = BatchRunner::new(
            worker,
            BatchOptions {
                mode: options.mode,
                caption_dir: layout.captions.clone(),
                show_progress: options.show_progress,
            },
        );
        if options.use_cache {
            runner = runner.with_cache(CaptionCache::open(&layout.cache)?);
        }

        let result = runner.run(&images, &layout.source, &health)?;
        print_summary(&result, render);
        outcome = Some(result);
    }

    if options.num_demos > 0 {
        match make_demos(
            &layout.source,
            &layout.captions,
            &layout.demo,
            options.num_demos,
        ) {
            Ok(pages) => {
                for page in pages {
                    info!("Demo saved to {}", page.display());
                }
            }
            Err(e) => warn!("Failed to generate demos: {:#}", e),
        }
    }

    if options.use_cache {
        let stats = CaptionCache::open(&layout.cache)?.stats();
        println!("{}", render.render(&stats));
    }

    Ok(outcome)
}

fn print_summary(result: &BatchResult, render: RenderConfig) {
    let output = render.render(result);
    if !render.is_text() {
        println!("{}", output);
    } else if result.is_complete_success() {
        println!("{}", output.green());
    } else {
        println!("{}", output.yellow());
    }
}
