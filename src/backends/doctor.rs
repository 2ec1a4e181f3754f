//! Doctor - Backend health reporting

use anyhow::Result;
use colored::Colorize;

use crate::backends::{CaptionBackend, HealthStatus};
use crate::core::render::RenderConfig;

/// Check the backend once and print the result.
///
/// The returned status is meant to be passed on to the batch runner, so a
/// run performs exactly one health check.
pub fn check_backend(backend: &dyn CaptionBackend, render: RenderConfig) -> HealthStatus {
    let health = backend.check_health();
    if render.is_text() {
        let line = render.render(&health);
        if health.ready {
            eprintln!("{}", line.green());
        } else {
            eprintln!("{}", line.red());
        }
    }
    health
}

/// Run the doctor command
pub fn run_doctor(backend: &dyn CaptionBackend, render: RenderConfig) -> Result<()> {
    let health = backend.check_health();
    println!("{}", render.render(&health));
    health.ensure_ready()?;
    Ok(())
}
