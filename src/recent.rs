//! Recently used workers - persisted at ~/.cellflow/workers.json
//!
//! Most-recent-first, deduplicated, capped at three entries. Reloaded at
//! startup so remembered workers reconnect eagerly.

use crate::core::normalize_url;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_RECENT_WORKERS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentWorkers {
    urls: Vec<String>,
}

impl RecentWorkers {
    /// Get the default list path
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cellflow")
            .join("workers.json")
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from a specific path; a missing file is an empty list
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let mut recent: Self = serde_json::from_str(&content)?;
        recent.urls.truncate(MAX_RECENT_WORKERS);
        Ok(recent)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Move `url` to the front, dropping duplicates and the oldest overflow
    pub fn add(&mut self, url: &str) {
        let url = normalize_url(url);
        self.urls.retain(|existing| *existing != url);
        self.urls.insert(0, url);
        self.urls.truncate(MAX_RECENT_WORKERS);
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }
}
