//! Cached reference documents for the triage/architect system prompts.
//!
//! The product-objectives and sales-positioning documents live on disk and
//! change rarely; they are read once and reloaded only when the file's
//! mtime moves. A missing document degrades to an empty section with one
//! warning, the pipeline keeps running.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::sync::RwLock;
use tracing::warn;

#[derive(Debug, Clone)]
struct CachedDoc {
    mtime: SystemTime,
    text: String,
}

/// File-backed, mtime-validated document store.
#[derive(Debug, Default)]
pub struct RefDocStore {
    product_path: Option<PathBuf>,
    sales_path: Option<PathBuf>,
    cache: RwLock<HashMap<PathBuf, CachedDoc>>,
}

impl RefDocStore {
    pub fn new(product_path: Option<PathBuf>, sales_path: Option<PathBuf>) -> Self {
        Self {
            product_path,
            sales_path,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Paths from `REFDOC_PRODUCT_OBJECTIVES` / `REFDOC_SALES_POSITIONING`.
    pub fn from_env() -> Self {
        let path = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());
        Self::new(
            path("REFDOC_PRODUCT_OBJECTIVES").map(PathBuf::from),
            path("REFDOC_SALES_POSITIONING").map(PathBuf::from),
        )
    }

    /// Full text of the product-objectives document ("" when unconfigured).
    pub async fn product_objectives(&self) -> String {
        match &self.product_path {
            Some(p) => self.load(p).await,
            None => String::new(),
        }
    }

    /// Full text of the sales-positioning document ("" when unconfigured).
    pub async fn sales_positioning(&self) -> String {
        match &self.sales_path {
            Some(p) => self.load(p).await,
            None => String::new(),
        }
    }

    async fn load(&self, path: &Path) -> String {
        let mtime = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "reference document unavailable");
                return String::new();
            }
        };

        if let Some(doc) = self.cache.read().await.get(path) {
            if doc.mtime == mtime {
                return doc.text.clone();
            }
        }

        match tokio::fs::read_to_string(path).await {
            Ok(text) => {
                self.cache
                    .write()
                    .await
                    .insert(path.to_path_buf(), CachedDoc {
                        mtime,
                        text: text.clone(),
                    });
                text
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "reference document read failed");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reloads_on_mtime_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("objectives.md");
        std::fs::write(&path, "v1").unwrap();

        let store = RefDocStore::new(Some(path.clone()), None);
        assert_eq!(store.product_objectives().await, "v1");

        // Rewrite with a strictly newer mtime.
        std::thread::sleep(std::time::Duration::from_millis(20));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"v2").unwrap();
        f.sync_all().unwrap();
        drop(f);
        let newer = SystemTime::now() + std::time::Duration::from_secs(2);
        let _ = filetime_set(&path, newer);

        assert_eq!(store.product_objectives().await, "v2");
    }

    #[tokio::test]
    async fn missing_document_degrades_to_empty() {
        let store = RefDocStore::new(Some(PathBuf::from("/nonexistent/doc.md")), None);
        assert_eq!(store.product_objectives().await, "");
        assert_eq!(store.sales_positioning().await, "");
    }

    fn filetime_set(path: &Path, t: SystemTime) -> std::io::Result<()> {
        let f = std::fs::OpenOptions::new().write(true).open(path)?;
        f.set_modified(t)
    }
}
