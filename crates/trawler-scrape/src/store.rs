//! Result persistence.
//!
//! Scraped page content is filed under `category/` (the job's
//! `type/name`) with a timestamped object name, and the store answers
//! with a location URL. Nothing downstream parses the content; the
//! store is write-only as far as the pipeline is concerned.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::debug;
use trawler_core::epoch_ms;
use uuid::Uuid;

use crate::error::{ScrapeError, ScrapeResult};

/// Where scraped content lands.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persist `content` under `category` and return the object's
    /// location URL.
    async fn store(&self, content: &str, category: &str) -> ScrapeResult<String>;
}

/// Filesystem-backed store rooted at one directory.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ResultStore for FsStore {
    async fn store(&self, content: &str, category: &str) -> ScrapeResult<String> {
        // uuid suffix keeps two results from the same millisecond apart
        let name = format!("{}-{}.html", epoch_ms(), Uuid::new_v4());
        let path = self.root.join(category).join(name);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ScrapeError::Store(format!("mkdir {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ScrapeError::Store(format!("write {}: {e}", path.display())))?;
        debug!(path = %path.display(), bytes = content.len(), "result stored");
        Ok(format!("file://{}", path.display()))
    }
}

/// In-process store for tests: keeps `(category, content)` pairs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<(String, String)> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn store(&self, content: &str, category: &str) -> ScrapeResult<String> {
        let mut entries = self.entries.lock().await;
        entries.push((category.to_string(), content.to_string()));
        Ok(format!("memory://{}/{}", category, entries.len() - 1))
    }
}
