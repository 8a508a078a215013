//! Repository map + file-content caches for the architect stage.
//!
//! Two process-wide, thread-safe, TTL-based caches:
//! - map cache, key `(owner, repo)`, TTL 15 min: deduplicated,
//!   directory-grouped listing of source files with estimated line counts,
//! - content cache, key `(owner, repo, path)`, TTL 30 min: file text.
//!
//! Content fetches run in parallel under a semaphore of 5 (the global
//! code-host throttle). `invalidate` drops both caches for a repository.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::{RwLock, Semaphore};
use tracing::{debug, warn};

use code_host_engine::{CodeHostClient, RepoRef, TreeEntry};

use crate::errors::PipelineResult;

/// Default TTL of the repository map cache.
pub const MAP_TTL: Duration = Duration::from_secs(15 * 60);
/// Default TTL of the file content cache.
pub const CONTENT_TTL: Duration = Duration::from_secs(30 * 60);
/// Global cap on in-flight file fetches.
pub const FETCH_CONCURRENCY: usize = 5;

/// Bytes-per-line heuristic for the map's estimated line counts.
const BYTES_PER_LINE: u64 = 40;

/// Source-file extensions that make it into the repository map.
const ALLOWED_EXTENSIONS: &[&str] = &[
    "rs", "cs", "ts", "tsx", "js", "jsx", "py", "go", "java", "kt", "rb", "php", "swift", "c",
    "h", "cpp", "hpp", "sql", "proto", "html", "css", "scss", "vue", "svelte", "md", "yml",
    "yaml", "toml", "json", "sh",
];

/// Path prefixes excluded from the map (build outputs, vendored code,
/// migrations, VCS internals).
const EXCLUDED_PREFIXES: &[&str] = &[
    ".git/",
    ".github/",
    "bin/",
    "obj/",
    "target/",
    "build/",
    "dist/",
    "out/",
    "node_modules/",
    "vendor/",
    "packages/",
    "migrations/",
    "Migrations/",
    "_temp-attachments/",
];

/// File names excluded regardless of extension (lockfiles, generated).
const EXCLUDED_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "composer.lock",
    "Gemfile.lock",
];

/// One file of the repository map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEntry {
    pub path: String,
    pub estimated_lines: u64,
}

/// Deduplicated, directory-grouped repository listing.
#[derive(Debug, Clone)]
pub struct RepoMap {
    pub entries: Vec<MapEntry>,
    /// Prompt-ready rendering, grouped by directory.
    pub rendered: String,
}

impl RepoMap {
    pub fn contains(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }
}

#[derive(Debug)]
struct TimedEntry<T> {
    value: T,
    stored_at: Instant,
}

/// Process-wide codebase cache. Share via `Arc`.
#[derive(Debug)]
pub struct CodebaseCache {
    map_ttl: Duration,
    content_ttl: Duration,
    maps: RwLock<HashMap<RepoRef, TimedEntry<Arc<RepoMap>>>>,
    contents: RwLock<HashMap<(RepoRef, String), TimedEntry<Option<String>>>>,
    fetch_limit: Arc<Semaphore>,
}

impl Default for CodebaseCache {
    fn default() -> Self {
        Self::with_ttls(MAP_TTL, CONTENT_TTL)
    }
}

impl CodebaseCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache with custom TTLs (tests pass zero to force refetches).
    pub fn with_ttls(map_ttl: Duration, content_ttl: Duration) -> Self {
        Self {
            map_ttl,
            content_ttl,
            maps: RwLock::new(HashMap::new()),
            contents: RwLock::new(HashMap::new()),
            fetch_limit: Arc::new(Semaphore::new(FETCH_CONCURRENCY)),
        }
    }

    /// Repository map for `repo` at `branch`, cached per `(owner, repo)`.
    pub async fn repo_map(
        &self,
        host: &CodeHostClient,
        repo: &RepoRef,
        branch: &str,
    ) -> PipelineResult<Arc<RepoMap>> {
        if let Some(entry) = self.maps.read().await.get(repo) {
            if entry.stored_at.elapsed() < self.map_ttl {
                debug!(%repo, "repo map cache hit");
                return Ok(entry.value.clone());
            }
        }

        debug!(%repo, %branch, "repo map cache miss, listing tree");
        let tree = host.list_tree(repo, branch).await?;
        let map = Arc::new(build_map(tree));
        self.maps.write().await.insert(repo.clone(), TimedEntry {
            value: map.clone(),
            stored_at: Instant::now(),
        });
        Ok(map)
    }

    /// Contents of `paths` at `branch`, each individually cached; fetches
    /// run in parallel under the global semaphore. Missing files yield
    /// `None` and are cached as missing.
    pub async fn file_contents(
        &self,
        host: &CodeHostClient,
        repo: &RepoRef,
        branch: &str,
        paths: &[String],
    ) -> Vec<(String, Option<String>)> {
        let fetches = paths.iter().map(|path| {
            let path = path.clone();
            async move {
                let content = self.file_content(host, repo, branch, &path).await;
                (path, content)
            }
        });
        join_all(fetches).await
    }

    async fn file_content(
        &self,
        host: &CodeHostClient,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> Option<String> {
        let key = (repo.clone(), path.to_string());
        if let Some(entry) = self.contents.read().await.get(&key) {
            if entry.stored_at.elapsed() < self.content_ttl {
                return entry.value.clone();
            }
        }

        let _permit = self
            .fetch_limit
            .acquire()
            .await
            .expect("fetch semaphore closed");

        let fetched = match host.file_content(repo, path, branch).await {
            Ok(v) => v,
            Err(e) => {
                warn!(%repo, path, error = %e, "file fetch failed");
                return None;
            }
        };

        self.contents.write().await.insert(key, TimedEntry {
            value: fetched.clone(),
            stored_at: Instant::now(),
        });
        fetched
    }

    /// Drops both caches for a repository.
    pub async fn invalidate(&self, repo: &RepoRef) {
        self.maps.write().await.remove(repo);
        self.contents
            .write()
            .await
            .retain(|(r, _), _| r != repo);
        debug!(%repo, "codebase caches invalidated");
    }
}

/// Filters, deduplicates and groups a raw tree listing.
fn build_map(tree: Vec<TreeEntry>) -> RepoMap {
    let mut seen = BTreeMap::new();
    for entry in tree {
        if !is_source_path(&entry.path) {
            continue;
        }
        seen.entry(entry.path.clone()).or_insert(MapEntry {
            estimated_lines: (entry.size / BYTES_PER_LINE).max(1),
            path: entry.path,
        });
    }
    let entries: Vec<MapEntry> = seen.into_values().collect();

    // Group by directory for the prompt rendering.
    let mut by_dir: BTreeMap<&str, Vec<&MapEntry>> = BTreeMap::new();
    for e in &entries {
        let dir = e.path.rsplit_once('/').map(|(d, _)| d).unwrap_or(".");
        by_dir.entry(dir).or_default().push(e);
    }

    let mut rendered = String::new();
    for (dir, files) in &by_dir {
        rendered.push_str(dir);
        rendered.push_str("/\n");
        for f in files {
            let name = f.path.rsplit_once('/').map(|(_, n)| n).unwrap_or(&f.path);
            rendered.push_str(&format!("  {} (~{} lines)\n", name, f.estimated_lines));
        }
    }

    RepoMap { entries, rendered }
}

fn is_source_path(path: &str) -> bool {
    if EXCLUDED_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return false;
    }
    let name = path.rsplit_once('/').map(|(_, n)| n).unwrap_or(path);
    if EXCLUDED_FILES.contains(&name) {
        return false;
    }
    match name.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_host_engine::InMemoryHost;

    fn entry(path: &str, size: u64) -> TreeEntry {
        TreeEntry {
            path: path.into(),
            size,
        }
    }

    #[test]
    fn map_filters_and_estimates() {
        let map = build_map(vec![
            entry("src/main.rs", 4000),
            entry("src/tiny.rs", 3),
            entry("node_modules/left-pad/index.js", 1000),
            entry("bin/Debug/app.dll", 9000),
            entry("package-lock.json", 90_000),
            entry("docs/readme.md", 800),
        ]);
        let paths: Vec<&str> = map.entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["docs/readme.md", "src/main.rs", "src/tiny.rs"]);
        assert_eq!(map.entries[1].estimated_lines, 100);
        // Floor of one line for tiny files.
        assert_eq!(map.entries[2].estimated_lines, 1);
        assert!(map.rendered.contains("src/\n"));
        assert!(map.rendered.contains("  main.rs (~100 lines)"));
    }

    #[tokio::test]
    async fn stale_map_served_within_ttl_and_invalidate_clears() {
        let host_state = Arc::new(InMemoryHost::new());
        host_state.script_tree(vec![entry("src/lib.rs", 400)]);
        host_state.script_file("src/lib.rs", "pub fn one() {}");
        let host = CodeHostClient::in_memory(host_state.clone());
        let repo = RepoRef::new("acme", "widgets");

        let cache = CodebaseCache::with_ttls(Duration::from_secs(600), Duration::from_secs(600));
        let first = cache.repo_map(&host, &repo, "main").await.unwrap();
        host_state.script_tree(vec![entry("src/lib.rs", 400), entry("src/new.rs", 400)]);
        // TTL not expired: stale map served.
        let second = cache.repo_map(&host, &repo, "main").await.unwrap();
        assert_eq!(first.entries.len(), second.entries.len());

        cache.invalidate(&repo).await;
        let third = cache.repo_map(&host, &repo, "main").await.unwrap();
        assert_eq!(third.entries.len(), 2);

        let contents = cache
            .file_contents(&host, &repo, "main", &["src/lib.rs".into(), "gone.rs".into()])
            .await;
        assert_eq!(contents[0].1.as_deref(), Some("pub fn one() {}"));
        assert_eq!(contents[1].1, None);
    }
}
