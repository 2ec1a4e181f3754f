//! Flows module - The captioning pipeline
//!
//! Provides:
//! - parse: structured caption extraction from model text
//! - worker: per-image captioning with bounded retries
//! - batch: sequential / pooled fan-out with immediate persistence
//! - demo: image + caption demo pages
//! - pipeline: the end-to-end `run` command

pub mod batch;
pub mod demo;
pub mod parse;
pub mod pipeline;
pub mod worker;
