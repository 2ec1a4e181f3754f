//! CLI module - Command-line interface definitions and handlers

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use crate::backends::ollama::OllamaClient;
use crate::core::config::{Settings, DEFAULT_HOST, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use crate::core::paths::DataLayout;
use crate::core::render::{OutputFormat, RenderConfig};
use crate::flows::batch::ExecutionMode;
use crate::flows::pipeline::RunOptions;

/// capmap - batch-caption a directory of images with a local vision-language model.
#[derive(Parser, Debug)]
#[command(name = "capmap")]
#[command(
    author,
    version,
    about,
    long_about = r#"capmap sends every image in DATA_DIR/source to an Ollama-compatible
vision-language model and writes one structured JSON caption per image to
DATA_DIR/captions.

Runs are idempotent: images that already have a caption file are skipped, so
re-running after failures only retries what is missing.

Examples:
    capmap doctor
    capmap run --parallel --workers 8
    capmap run --limit 20 --use-cache --num-demos 3
    capmap cache stats
    capmap demo --count 5
"#
)]
pub struct Cli {
    /// Data directory holding source/, captions/, cache/ and demo/.
    #[arg(
        long,
        global = true,
        default_value = "data",
        value_name = "DIR",
        env = "CAPMAP_DATA_DIR"
    )]
    pub data_dir: PathBuf,

    /// Backend base URL.
    #[arg(
        long,
        global = true,
        default_value = DEFAULT_HOST,
        value_name = "URL",
        env = "OLLAMA_HOST"
    )]
    pub host: String,

    /// Vision-language model name.
    #[arg(
        long,
        global = true,
        default_value = DEFAULT_MODEL,
        value_name = "MODEL",
        env = "CAPMAP_MODEL",
        long_help = "Model used for captioning. The health check passes when any model\n\
listed by the backend contains this name."
    )]
    pub model: String,

    /// Replace the built-in prompt with the contents of a file.
    #[arg(long, global = true, value_name = "FILE", env = "CAPMAP_PROMPT_FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Per-request generation timeout in seconds.
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS, value_name = "SECS")]
    pub timeout: u64,

    /// Report format (text/json).
    #[arg(
        long,
        global = true,
        default_value = "text",
        value_name = "FORMAT",
        long_help = "Select the format for summaries and reports.\n\n\
Supported values:\n\
- text (default)\n\
- json"
    )]
    pub format: String,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (warnings and errors only, no progress bar).
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug logging).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Caption all pending images.
    #[command(
        long_about = "Check the backend, caption every image in DATA_DIR/source that has no\n\
caption yet, print a summary and render demo pages.\n\n\
The run exits non-zero only when the backend health check fails. Individual\n\
image failures are listed in the summary; run again to retry them.\n\n\
Examples:\n\
  capmap run\n\
  capmap run --parallel --workers 8\n\
  capmap run --limit 10 --use-cache\n"
    )]
    Run {
        /// Only consider the first N images (0 means all).
        #[arg(long, visible_alias = "process-amount", value_name = "N")]
        limit: Option<usize>,

        /// Process images on a worker pool instead of one at a time.
        #[arg(long)]
        parallel: bool,

        /// Worker pool width for --parallel.
        #[arg(long, default_value_t = crate::core::config::DEFAULT_WORKERS, value_name = "N")]
        workers: usize,

        /// Serve unchanged images from the caption cache and cache new captions.
        #[arg(
            long,
            long_help = "Consult the content cache before calling the model. An image is a hit\n\
when its path, size and modification time match a cached entry younger than\n\
30 days. New captions are added to the cache."
        )]
        use_cache: bool,

        /// Clear the caption cache before processing.
        #[arg(long)]
        clear_cache: bool,

        /// Number of demo pages to render afterwards (0 disables).
        #[arg(long, default_value_t = 1, value_name = "N")]
        num_demos: usize,
    },

    /// Check that the backend is reachable and the model is installed.
    Doctor,

    /// Inspect or clear the caption cache.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },

    /// Render demo pages from existing captions.
    Demo {
        /// Number of demo pages.
        #[arg(long, default_value_t = 1, value_name = "N")]
        count: usize,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// Show entry count and size.
    Stats,

    /// Delete every cache entry.
    Clear,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    let format: OutputFormat = cli.format.parse().unwrap_or_default();
    let render = RenderConfig::with_pretty(format, cli.pretty);
    let layout = DataLayout::new(&cli.data_dir);

    match cli.command {
        Commands::Run {
            limit,
            parallel,
            workers,
            use_cache,
            clear_cache,
            num_demos,
        } => {
            let settings = Settings::new(
                &cli.host,
                &cli.model,
                cli.prompt_file.as_deref(),
                cli.timeout,
            )?;
            let backend = Arc::new(OllamaClient::new(&settings)?);
            let options = RunOptions {
                limit,
                mode: if parallel {
                    ExecutionMode::Parallel { workers }
                } else {
                    ExecutionMode::Sequential
                },
                use_cache,
                clear_cache,
                num_demos,
                show_progress: !cli.quiet && std::io::stderr().is_terminal(),
            };
            crate::flows::pipeline::run_pipeline(backend, &settings, &layout, &options, render)?;
            Ok(())
        }

        Commands::Doctor => {
            let settings = Settings::new(
                &cli.host,
                &cli.model,
                cli.prompt_file.as_deref(),
                cli.timeout,
            )?;
            let backend = OllamaClient::new(&settings)?;
            crate::backends::doctor::run_doctor(&backend, render)
        }

        Commands::Cache { action } => match action {
            CacheCommands::Stats => crate::cache::store::run_stats(&layout.cache, render),
            CacheCommands::Clear => crate::cache::store::run_clear(&layout.cache),
        },

        Commands::Demo { count } => crate::flows::demo::run_demo(&layout, count),
    }
}
