//! Data directory layout and image file discovery
//!
//! Everything lives under a single data directory:
//! `source/` (input images), `captions/` (one JSON per image),
//! `cache/` (content cache) and `demo/` (rendered demos).

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Image extensions accepted as captioning input
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Resolved directories for one data root
#[derive(Debug, Clone)]
pub struct DataLayout {
    pub source: PathBuf,
    pub captions: PathBuf,
    pub cache: PathBuf,
    pub demo: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            source: data_dir.join("source"),
            captions: data_dir.join("captions"),
            cache: data_dir.join("cache"),
            demo: data_dir.join("demo"),
        }
    }
}

/// Check whether a path has an accepted image extension (case-insensitive)
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Base name of an image with its final extension stripped
pub fn image_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Caption output path for an image name
pub fn caption_path(caption_dir: &Path, image_name: &str) -> PathBuf {
    caption_dir.join(format!("{}.json", image_stem(image_name)))
}

/// List image file names directly inside `dir`, sorted for stability
pub fn list_images(dir: &Path) -> Result<Vec<String>> {
    let mut images = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry =
            entry.with_context(|| format!("Failed to read image directory: {}", dir.display()))?;
        if !entry.file_type().is_file() || !is_image_file(entry.path()) {
            continue;
        }
        images.push(entry.file_name().to_string_lossy().to_string());
    }

    images.sort();
    Ok(images)
}

/// Find the image in `dir` matching a caption stem (.jpg, .jpeg, .png in that order)
pub fn find_image_for_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    IMAGE_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{}.{}", stem, ext)))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout() {
        let layout = DataLayout::new(Path::new("/data"));
        assert_eq!(layout.source, PathBuf::from("/data/source"));
        assert_eq!(layout.captions, PathBuf::from("/data/captions"));
        assert_eq!(layout.cache, PathBuf::from("/data/cache"));
        assert_eq!(layout.demo, PathBuf::from("/data/demo"));
    }

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.jpg")));
        assert!(is_image_file(Path::new("a.JPEG")));
        assert!(is_image_file(Path::new("dir/b.png")));
        assert!(!is_image_file(Path::new("c.gif")));
        assert!(!is_image_file(Path::new("jpg")));
    }

    #[test]
    fn test_image_stem() {
        assert_eq!(image_stem("a.jpg"), "a");
        assert_eq!(image_stem("photo.final.png"), "photo.final");
        assert_eq!(image_stem("noext"), "noext");
    }

    #[test]
    fn test_caption_path() {
        let path = caption_path(Path::new("/out"), "cat.jpeg");
        assert_eq!(path, PathBuf::from("/out/cat.json"));
    }

    #[test]
    fn test_list_images_flat_and_sorted() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("b.png"), "b").unwrap();
        std::fs::write(temp.path().join("a.jpg"), "a").unwrap();
        std::fs::write(temp.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(temp.path().join("nested")).unwrap();
        std::fs::write(temp.path().join("nested/c.jpg"), "c").unwrap();

        let images = list_images(temp.path()).unwrap();
        assert_eq!(images, vec!["a.jpg", "b.png"]);
    }

    #[test]
    fn test_find_image_for_stem() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("dog.png"), "d").unwrap();

        assert_eq!(
            find_image_for_stem(temp.path(), "dog"),
            Some(temp.path().join("dog.png"))
        );
        assert_eq!(find_image_for_stem(temp.path(), "cat"), None);
    }
}
