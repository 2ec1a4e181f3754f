//! Cache index management

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Index record for one cached image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Identity hash naming the entry file
    pub hash: String,

    /// When the entry was written
    pub cached_at: DateTime<Utc>,
}

/// Mapping from original image path to its cache entry, stored in index.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheIndex {
    entries: BTreeMap<String, IndexEntry>,
}

impl CacheIndex {
    /// Load the index, treating a missing or unreadable file as empty
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::try_load(path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Cache index unreadable, starting empty: {:#}", e);
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let index = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(index)
    }

    /// Persist the index synchronously
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn insert(&mut self, image_path: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(
            image_path.into(),
            IndexEntry {
                hash: hash.into(),
                cached_at: Utc::now(),
            },
        );
    }

    #[allow(dead_code)]
    pub fn get(&self, image_path: &str) -> Option<&IndexEntry> {
        self.entries.get(image_path)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
