//! On-disk content store for remote repository files
//!
//! One directory per repository (name-sanitized), file entries under a
//! `files/` subtree mirroring the remote paths, plus `cache_metadata.json`
//! holding the last full-download time and file count. The store is a cache,
//! not a source of truth: it can be deleted at any time and is rebuilt from
//! the host on next access.
//!
//! Entries are immutable once written; a refresh replaces them. Metadata
//! absence or staleness invalidates every entry for that repository,
//! regardless of which entries are present on disk. Per-entry I/O errors are
//! logged and treated as "entry absent" / "write skipped"; they never abort
//! a bulk operation.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const METADATA_FILE: &str = "cache_metadata.json";
const FILES_DIR: &str = "files";

/// Default content time-to-live: one hour.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Per-repository cache metadata, written together with the entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Full repository name (`owner/repo`). The directory name is sanitized
    /// and lossy, so the real name lives here.
    pub repo: String,
    /// Unix seconds of the last full download.
    pub cached_at: u64,
    /// Number of entries written in that download.
    pub file_count: usize,
}

/// Aggregate statistics for one cached repository.
#[derive(Debug, Clone, Serialize)]
pub struct RepoStats {
    pub repo: String,
    pub file_count: usize,
    pub size_bytes: u64,
    pub valid: bool,
    /// Unix seconds, absent when metadata is missing or unreadable.
    pub cached_at: Option<u64>,
}

/// Aggregate statistics across the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub repository_count: usize,
    pub file_count: usize,
    pub total_size_bytes: u64,
    pub repositories: Vec<RepoStats>,
}

/// Persistent (repository, path) -> content mapping.
///
/// Safe for concurrent reads and for concurrent writes to distinct keys;
/// concurrent writes to the same key are last-write-wins.
pub struct Store {
    root: PathBuf,
    ttl: Duration,
}

impl Store {
    pub fn open(root: impl Into<PathBuf>, ttl: Duration) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root, ttl })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repo_dir(&self, repo: &str) -> PathBuf {
        self.root.join(sanitize_repo_name(repo))
    }

    fn entry_path(&self, repo: &str, path: &str) -> PathBuf {
        // Remote paths are relative; refuse anything that could escape the
        // repository directory.
        let mut out = self.repo_dir(repo).join(FILES_DIR);
        for part in path.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                continue;
            }
            out.push(part);
        }
        out
    }

    /// Pure local lookup, never performs network I/O.
    pub fn get(&self, repo: &str, path: &str) -> Option<String> {
        let entry = self.entry_path(repo, path);
        match std::fs::read_to_string(&entry) {
            Ok(content) => Some(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::warn!("failed to read cache entry {}: {e}", entry.display());
                None
            }
        }
    }

    /// Persist content for (repo, path), overwriting any prior value.
    /// A failed write is logged and skipped.
    pub fn put(&self, repo: &str, path: &str, content: &str) {
        let entry = self.entry_path(repo, path);
        if let Some(parent) = entry.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!("failed to create cache dir {}: {e}", parent.display());
                return;
            }
        }
        if let Err(e) = std::fs::write(&entry, content) {
            tracing::warn!("failed to write cache entry {}: {e}", entry.display());
        }
    }

    /// Read the metadata record, if present and parseable.
    pub fn metadata(&self, repo: &str) -> Option<CacheMetadata> {
        let path = self.repo_dir(repo).join(METADATA_FILE);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("failed to read cache metadata {}: {e}", path.display());
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!("malformed cache metadata {}: {e}", path.display());
                None
            }
        }
    }

    /// True iff metadata exists and the last download is younger than the TTL.
    pub fn is_valid(&self, repo: &str) -> bool {
        self.is_valid_at(repo, now_secs())
    }

    /// TTL check against an explicit clock value (unix seconds).
    pub fn is_valid_at(&self, repo: &str, now: u64) -> bool {
        match self.metadata(repo) {
            Some(meta) => now.saturating_sub(meta.cached_at) < self.ttl.as_secs(),
            None => false,
        }
    }

    /// Record a completed download: sets `cached_at` to now.
    pub fn write_metadata(&self, repo: &str, file_count: usize) -> Result<(), StoreError> {
        self.write_metadata_at(repo, file_count, now_secs())
    }

    fn write_metadata_at(&self, repo: &str, file_count: usize, now: u64) -> Result<(), StoreError> {
        let dir = self.repo_dir(repo);
        std::fs::create_dir_all(&dir)?;
        let meta = CacheMetadata {
            repo: repo.to_string(),
            cached_at: now,
            file_count,
        };
        let json = serde_json::to_string_pretty(&meta).map_err(std::io::Error::other)?;
        std::fs::write(dir.join(METADATA_FILE), json)?;
        Ok(())
    }

    /// Every entry currently on disk for the repository, regardless of
    /// validity. Callers check `is_valid` before trusting this data.
    pub fn load_all(&self, repo: &str) -> BTreeMap<String, String> {
        let files_root = self.repo_dir(repo).join(FILES_DIR);
        let mut entries = BTreeMap::new();
        if !files_root.is_dir() {
            return entries;
        }

        // Explicit worklist; individual unreadable directories must not
        // abort the load.
        let mut stack = vec![files_root.clone()];
        while let Some(dir) = stack.pop() {
            let read = match std::fs::read_dir(&dir) {
                Ok(r) => r,
                Err(e) => {
                    tracing::warn!("skipping unreadable cache dir {}: {e}", dir.display());
                    continue;
                }
            };
            for item in read {
                let path = match item {
                    Ok(i) => i.path(),
                    Err(e) => {
                        tracing::warn!("skipping unreadable entry in {}: {e}", dir.display());
                        continue;
                    }
                };
                if path.is_dir() {
                    stack.push(path);
                    continue;
                }
                let rel = match path.strip_prefix(&files_root) {
                    Ok(r) => r.to_string_lossy().replace('\\', "/"),
                    Err(_) => continue,
                };
                match std::fs::read_to_string(&path) {
                    Ok(content) => {
                        entries.insert(rel, content);
                    }
                    Err(e) => {
                        tracing::warn!("failed to read cache entry {}: {e}", path.display());
                    }
                }
            }
        }
        entries
    }

    /// Delete all entries and metadata for one repository, or for every
    /// repository when `repo` is `None`.
    pub fn clear(&self, repo: Option<&str>) -> Result<(), StoreError> {
        match repo {
            Some(repo) => {
                let dir = self.repo_dir(repo);
                if dir.is_dir() {
                    std::fs::remove_dir_all(&dir)?;
                }
            }
            None => {
                if self.root.is_dir() {
                    std::fs::remove_dir_all(&self.root)?;
                }
                std::fs::create_dir_all(&self.root)?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<CacheStats, StoreError> {
        let now = now_secs();
        let mut repositories = Vec::new();

        let read = match std::fs::read_dir(&self.root) {
            Ok(r) => r,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CacheStats {
                    repository_count: 0,
                    file_count: 0,
                    total_size_bytes: 0,
                    repositories,
                });
            }
            Err(e) => return Err(e.into()),
        };

        for item in read {
            let dir = item?.path();
            if !dir.is_dir() {
                continue;
            }
            let dir_name = dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let meta_path = dir.join(METADATA_FILE);
            let meta: Option<CacheMetadata> = std::fs::read_to_string(&meta_path)
                .ok()
                .and_then(|c| serde_json::from_str(&c).ok());
            // The directory name is lossily sanitized; prefer the real name
            // recorded in metadata.
            let repo = meta.as_ref().map(|m| m.repo.clone()).unwrap_or(dir_name);

            let (file_count, size_bytes) = measure_dir(&dir.join(FILES_DIR));
            let cached_at = meta.as_ref().map(|m| m.cached_at);
            let valid = cached_at
                .map(|t| now.saturating_sub(t) < self.ttl.as_secs())
                .unwrap_or(false);

            repositories.push(RepoStats {
                repo,
                file_count,
                size_bytes,
                valid,
                cached_at,
            });
        }

        repositories.sort_by(|a, b| a.repo.cmp(&b.repo));
        Ok(CacheStats {
            repository_count: repositories.len(),
            file_count: repositories.iter().map(|r| r.file_count).sum(),
            total_size_bytes: repositories.iter().map(|r| r.size_bytes).sum(),
            repositories,
        })
    }
}

/// `owner/repo` -> directory name. Lossy on purpose; the reverse mapping
/// comes from metadata, never from the directory name.
fn sanitize_repo_name(repo: &str) -> String {
    repo.replace('/', "_")
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn measure_dir(root: &Path) -> (usize, u64) {
    let mut count = 0usize;
    let mut bytes = 0u64;
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let read = match std::fs::read_dir(&dir) {
            Ok(r) => r,
            Err(_) => continue,
        };
        for item in read.flatten() {
            let path = item.path();
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(meta) = path.metadata() {
                count += 1;
                bytes += meta.len();
            }
        }
    }
    (count, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> Store {
        Store::open(dir.path().join("cache"), DEFAULT_TTL).unwrap()
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "src/main.py", "print('hi')");
        assert_eq!(
            store.get("acme/api", "src/main.py").as_deref(),
            Some("print('hi')")
        );
        assert!(store.get("acme/api", "src/other.py").is_none());
        assert!(store.get("acme/web", "src/main.py").is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "a.py", "v1");
        store.put("acme/api", "a.py", "v2");
        assert_eq!(store.get("acme/api", "a.py").as_deref(), Some("v2"));
    }

    #[test]
    fn test_valid_after_write_metadata() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        assert!(!store.is_valid("acme/api"));
        store.write_metadata("acme/api", 3).unwrap();
        assert!(store.is_valid("acme/api"));

        let meta = store.metadata("acme/api").unwrap();
        assert_eq!(meta.repo, "acme/api");
        assert_eq!(meta.file_count, 3);
    }

    #[test]
    fn test_invalid_after_ttl_elapses() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.write_metadata_at("acme/api", 1, 1000).unwrap();
        assert!(store.is_valid_at("acme/api", 1000 + 3599));
        assert!(!store.is_valid_at("acme/api", 1000 + 3600));
        assert!(!store.is_valid_at("acme/api", 1000 + 7200));
    }

    #[test]
    fn test_load_all_ignores_metadata_file() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "src/a.py", "a");
        store.put("acme/api", "src/deep/b.js", "b");
        store.write_metadata("acme/api", 2).unwrap();

        let all = store.load_all("acme/api");
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("src/a.py").map(String::as_str), Some("a"));
        assert_eq!(all.get("src/deep/b.js").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_clear_single_repo() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "a.py", "a");
        store.put("acme/web", "b.py", "b");
        store.clear(Some("acme/api")).unwrap();

        assert!(store.load_all("acme/api").is_empty());
        assert_eq!(store.load_all("acme/web").len(), 1);
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "a.py", "a");
        store.put("acme/web", "b.py", "b");
        store.write_metadata("acme/api", 1).unwrap();
        store.clear(None).unwrap();

        assert!(store.load_all("acme/api").is_empty());
        assert!(store.load_all("acme/web").is_empty());
        assert!(!store.is_valid("acme/api"));
        assert_eq!(store.stats().unwrap().repository_count, 0);
    }

    #[test]
    fn test_stats_prefers_metadata_repo_name() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "src/a.py", "content");
        store.write_metadata("acme/api", 1).unwrap();
        store.put("no_metadata/repo", "b.py", "b");

        let stats = store.stats().unwrap();
        assert_eq!(stats.repository_count, 2);
        assert_eq!(stats.file_count, 2);
        assert!(stats.total_size_bytes > 0);

        let api = stats
            .repositories
            .iter()
            .find(|r| r.repo == "acme/api")
            .unwrap();
        assert!(api.valid);
        assert_eq!(api.file_count, 1);

        // Repo without metadata falls back to the sanitized dir name and is
        // never valid.
        let other = stats
            .repositories
            .iter()
            .find(|r| r.repo == "no_metadata_repo")
            .unwrap();
        assert!(!other.valid);
    }

    #[test]
    fn test_entry_path_rejects_traversal() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "../../escape.txt", "nope");
        let all = store.load_all("acme/api");
        assert_eq!(all.len(), 1);
        assert!(all.contains_key("escape.txt"));
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[test]
    fn test_missing_metadata_invalidates_despite_entries() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        store.put("acme/api", "a.py", "a");
        assert!(!store.is_valid("acme/api"));
        assert_eq!(store.load_all("acme/api").len(), 1);
    }
}
