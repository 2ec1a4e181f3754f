//! Demo pages pairing an image with its caption
//!
//! Each demo is a self-contained HTML file: the image embedded as a data URI
//! on the left, the pretty-printed caption JSON on the right.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::paths::{find_image_for_stem, DataLayout};
use crate::core::util::escape_html;

/// Seed for demo selection, so repeated runs pick the same captions
pub const DEMO_SEED: u64 = 42;

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// Render one demo page
pub fn render_demo_html(name: &str, image: &[u8], mime: &str, caption: &serde_json::Value) -> String {
    let json = serde_json::to_string_pretty(caption).unwrap_or_else(|_| "{}".to_string());
    let name = escape_html(name);

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{name} - caption demo</title>
<style>
body {{ margin: 0; font-family: sans-serif; }}
main {{ display: flex; gap: 24px; padding: 24px; align-items: flex-start; }}
section {{ flex: 1; min-width: 0; }}
img {{ max-width: 100%; height: auto; }}
pre {{ background: #e6e6e6; border-radius: 8px; padding: 12px; font-size: 13px; white-space: pre-wrap; }}
</style>
</head>
<body>
<main>
<section>
<h2>Image: {name}</h2>
<img src="data:{mime};base64,{data}" alt="{name}">
</section>
<section>
<h2>JSON Caption</h2>
<pre>{caption}</pre>
</section>
</main>
</body>
</html>
"#,
        name = name,
        mime = mime,
        data = BASE64.encode(image),
        caption = escape_html(&json),
    )
}

fn caption_files(caption_dir: &Path) -> Result<Vec<PathBuf>> {
    if !caption_dir.exists() {
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(caption_dir)
        .with_context(|| format!("Failed to read {}", caption_dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    Ok(files)
}

fn write_demo(source_dir: &Path, caption_file: &Path, target: &Path) -> Result<bool> {
    let stem = caption_file
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    let Some(image_path) = find_image_for_stem(source_dir, &stem) else {
        warn!("No image found for caption {}", caption_file.display());
        return Ok(false);
    };

    let caption: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(caption_file)
            .with_context(|| format!("Failed to read {}", caption_file.display()))?,
    )
    .with_context(|| format!("Failed to parse {}", caption_file.display()))?;
    let image = fs::read(&image_path)
        .with_context(|| format!("Failed to read {}", image_path.display()))?;

    let html = render_demo_html(&stem, &image, mime_for(&image_path), &caption);
    fs::write(target, html).with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(true)
}

/// Render up to `count` demos from existing captions; returns the pages written
pub fn make_demos(
    source_dir: &Path,
    caption_dir: &Path,
    demo_dir: &Path,
    count: usize,
) -> Result<Vec<PathBuf>> {
    let files = caption_files(caption_dir)?;
    if files.is_empty() || count == 0 {
        info!("No caption files found for demo");
        return Ok(Vec::new());
    }

    fs::create_dir_all(demo_dir)
        .with_context(|| format!("Failed to create {}", demo_dir.display()))?;

    let mut rng = StdRng::seed_from_u64(DEMO_SEED);
    let selected: Vec<&PathBuf> = files.choose_multiple(&mut rng, count.min(files.len())).collect();

    let mut written = Vec::new();
    for (idx, caption_file) in selected.into_iter().enumerate() {
        let stem = caption_file
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let target = if count == 1 {
            demo_dir.join(format!("{}_demo.html", stem))
        } else {
            demo_dir.join(format!("{}_demo_{}.html", stem, idx + 1))
        };

        match write_demo(source_dir, caption_file, &target) {
            Ok(true) => written.push(target),
            Ok(false) => {}
            Err(e) => warn!("Error creating demo {}: {:#}", idx + 1, e),
        }
    }

    Ok(written)
}

/// Run the demo command
pub fn run_demo(layout: &DataLayout, count: usize) -> Result<()> {
    let pages = make_demos(&layout.source, &layout.captions, &layout.demo, count)?;
    if pages.is_empty() {
        eprintln!("No demos generated (no captions with matching images)");
    }
    for page in pages {
        println!("Demo saved to {}", page.display());
    }
    Ok(())
}
