//! Core module - Shared types and utilities
//!
//! This module provides:
//! - Settings and policy constants
//! - The captioning error taxonomy
//! - Caption and batch result model
//! - Data directory layout and image discovery
//! - Report rendering
//! - Common utilities

pub mod config;
pub mod error;
pub mod model;
pub mod paths;
pub mod render;
pub mod util;
