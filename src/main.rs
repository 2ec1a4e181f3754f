//! capmap - Batch image captioning against a local vision-language model
//!
//! capmap provides:
//! - Backend health checks against an Ollama-compatible server
//! - Sequential or pooled captioning with bounded retries
//! - Structured JSON caption extraction and idempotent persistence
//! - A content-addressed caption cache and HTML demo pages

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod backends;
mod cache;
mod cli;
mod core;
mod flows;

fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = cli::Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    cli::run(cli)
}
