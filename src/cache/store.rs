//! Caption cache store
//!
//! Entries are keyed by an image identity hash derived from path, size and
//! modification time, so any change to the file makes its old entry
//! undiscoverable. Entry files older than [`CACHE_TTL`] read as absent but
//! are not deleted.
//!
//! Every failure on the read or write path is logged and swallowed: a broken
//! cache degrades to misses and dropped writes, never to a failed batch.
//! Writes do a full read-modify-write of the index and are not safe across
//! threads or processes; callers funnel them through a single instance.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::cache::index::CacheIndex;
use crate::core::model::StructuredCaption;
use crate::core::render::RenderConfig;
use crate::core::util::{format_mb, get_file_size, get_mtime_ms, hash_bytes};

/// Entries older than this are treated as absent
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Index file name inside the cache directory
pub const INDEX_FILE: &str = "index.json";

/// On-disk cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cached_at: DateTime<Utc>,
    pub caption: StructuredCaption,
}

/// Cache size report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub cache_dir: String,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cache stats: {} items, {} ({})",
            self.entries,
            format_mb(self.total_bytes),
            self.cache_dir
        )
    }
}

/// Content-addressed caption cache rooted at one directory
#[derive(Debug)]
pub struct CaptionCache {
    dir: PathBuf,
    index_path: PathBuf,
    index: CacheIndex,
}

impl CaptionCache {
    /// Open (creating if needed) the cache directory and load its index
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;
        let index_path = dir.join(INDEX_FILE);
        let index = CacheIndex::load(&index_path);
        debug!("Cache index loaded with {} entries", index.len());

        Ok(Self {
            dir: dir.to_path_buf(),
            index_path,
            index,
        })
    }

    /// Identity hash of an image: path + size + mtime, without reading the bytes
    pub fn identity(image_path: &Path) -> std::io::Result<String> {
        let size = get_file_size(image_path)?;
        let mtime = get_mtime_ms(image_path)?;
        let key = format!("{}_{}_{}", image_path.to_string_lossy(), size, mtime);
        Ok(hash_bytes(key.as_bytes()))
    }

    /// Path of the entry file for an identity hash
    pub fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.json", hash))
    }

    #[allow(dead_code)]
    pub fn index(&self) -> &CacheIndex {
        &self.index
    }

    /// Look up a fresh cached caption
    pub fn get(&self, image_path: &Path) -> Option<StructuredCaption> {
        self.get_at(image_path, SystemTime::now())
    }

    /// Look up a cached caption as of `now`
    pub fn get_at(&self, image_path: &Path, now: SystemTime) -> Option<StructuredCaption> {
        match self.try_get(image_path, now) {
            Ok(found) => found,
            Err(e) => {
                warn!("Cache read error for {}: {:#}", image_path.display(), e);
                None
            }
        }
    }

    fn try_get(&self, image_path: &Path, now: SystemTime) -> Result<Option<StructuredCaption>> {
        let hash = Self::identity(image_path)
            .with_context(|| format!("Failed to stat {}", image_path.display()))?;
        let entry_path = self.entry_path(&hash);
        if !entry_path.exists() {
            return Ok(None);
        }

        let written = fs::metadata(&entry_path)?.modified()?;
        let age = now.duration_since(written).unwrap_or_default();
        if age >= CACHE_TTL {
            debug!("Cache entry {} expired", hash);
            return Ok(None);
        }

        let content = fs::read_to_string(&entry_path)
            .with_context(|| format!("Failed to read {}", entry_path.display()))?;
        let entry: CacheEntry = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", entry_path.display()))?;
        Ok(Some(entry.caption))
    }

    /// Store a caption; failures are logged and dropped
    pub fn set(&mut self, image_path: &Path, caption: &StructuredCaption) {
        if let Err(e) = self.try_set(image_path, caption) {
            warn!("Cache write error for {}: {:#}", image_path.display(), e);
        }
    }

    fn try_set(&mut self, image_path: &Path, caption: &StructuredCaption) -> Result<()> {
        let hash = Self::identity(image_path)
            .with_context(|| format!("Failed to stat {}", image_path.display()))?;
        let entry = CacheEntry {
            cached_at: Utc::now(),
            caption: caption.clone(),
        };

        let entry_path = self.entry_path(&hash);
        fs::write(&entry_path, serde_json::to_string_pretty(&entry)?)
            .with_context(|| format!("Failed to write {}", entry_path.display()))?;

        self.index.insert(image_path.to_string_lossy(), hash);
        self.index.save(&self.index_path)
    }

    /// Remove every entry and persist an empty index; returns entries removed
    pub fn clear(&mut self) -> usize {
        let mut removed = 0;
        for path in self.entry_files() {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to remove cache entry {}: {}", path.display(), e),
            }
        }

        self.index.clear();
        if let Err(e) = self.index.save(&self.index_path) {
            warn!("Cache write error: {:#}", e);
        }
        info!("Cache cleared ({} entries)", removed);
        removed
    }

    /// Count entries and their total size, excluding the index file
    pub fn stats(&self) -> CacheStats {
        let files = self.entry_files();
        let total_bytes = files.iter().filter_map(|p| get_file_size(p).ok()).sum();

        CacheStats {
            entries: files.len(),
            total_bytes,
            cache_dir: self.dir.to_string_lossy().to_string(),
        }
    }

    fn entry_files(&self) -> Vec<PathBuf> {
        let read_dir = match fs::read_dir(&self.dir) {
            Ok(rd) => rd,
            Err(e) => {
                warn!("Cache directory unreadable: {}", e);
                return Vec::new();
            }
        };

        read_dir
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| {
                p.is_file()
                    && p.extension().is_some_and(|ext| ext == "json")
                    && p.file_name().is_some_and(|name| name != INDEX_FILE)
            })
            .collect()
    }
}

/// Run the `cache stats` command
pub fn run_stats(dir: &Path, render: RenderConfig) -> Result<()> {
    let cache = CaptionCache::open(dir)?;
    println!("{}", render.render(&cache.stats()));
    Ok(())
}

/// Run the `cache clear` command
pub fn run_clear(dir: &Path) -> Result<()> {
    let removed = CaptionCache::open(dir)?.clear();
    println!("Cache cleared ({} entries removed)", removed);
    Ok(())
}
