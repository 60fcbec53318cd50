//! Configuration file support for relens
//!
//! Config files are loaded in order (later overrides earlier):
//! 1. `~/.config/relens/config.toml` (user defaults)
//! 2. `.relens.toml` in the working directory (project overrides)
//!
//! CLI flags override all config file values. Credentials come from the
//! environment only, never from config files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

/// Options loaded from config files. Every field is optional; accessors
/// supply the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Cache TTL in seconds (default 3600)
    pub cache_ttl_secs: Option<u64>,
    /// Host API quota per rolling window (default 4000)
    pub max_calls_per_window: Option<u32>,
    /// Quota window length in seconds (default 3600)
    pub quota_window_secs: Option<u64>,
    /// Pacing delay between file downloads, milliseconds (default 100)
    pub file_delay_ms: Option<u64>,
    /// Pacing delay between download batches, milliseconds (default 1000)
    pub batch_delay_ms: Option<u64>,
    /// Files per download batch (default 10)
    pub download_batch_size: Option<usize>,
    /// Files per screening batch during a scan (default 20)
    pub scan_batch_size: Option<usize>,
    /// Simultaneous per-repository scan tasks (default 4)
    pub scan_workers: Option<usize>,
    /// Simultaneous per-repository cache tasks (default 2)
    pub cache_workers: Option<usize>,
    /// Per-repository scan timeout in seconds (default 120)
    pub repo_timeout_secs: Option<u64>,
    /// Per-repository cache timeout in seconds (default 300)
    pub cache_repo_timeout_secs: Option<u64>,
    /// Size ceiling for cached files in bytes; oversized files are skipped
    /// (default 1MB)
    pub cache_max_file_size: Option<u64>,
    /// Size ceiling for single-shot analysis in bytes; oversized files are
    /// truncated (default 500KB)
    pub scan_max_file_size: Option<u64>,
    /// Characters of file content handed to the assessor (default 2500)
    pub snippet_limit: Option<usize>,
    /// Soft cap on assessor calls per scan run (default unlimited)
    pub max_assessor_calls: Option<u64>,
    /// Cache directory (default: platform cache dir + relens/repositories)
    pub cache_dir: Option<PathBuf>,
    /// Assessor HTTP endpoint
    pub assessor_endpoint: Option<String>,
}

impl Config {
    pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
    pub const DEFAULT_CACHE_MAX_FILE_SIZE: u64 = 1_000_000;
    pub const DEFAULT_SCAN_MAX_FILE_SIZE: u64 = 500_000;
    pub const DEFAULT_ASSESSOR_ENDPOINT: &'static str =
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent";

    /// Load configuration from user and project config files.
    pub fn load(project_root: &Path) -> Self {
        let user_config = dirs::config_dir()
            .map(|d| d.join("relens/config.toml"))
            .and_then(|p| Self::load_file(&p))
            .unwrap_or_default();

        let project_config =
            Self::load_file(&project_root.join(".relens.toml")).unwrap_or_default();

        user_config.override_with(project_config)
    }

    fn load_file(path: &Path) -> Option<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("failed to read config {}: {e}", path.display());
                return None;
            }
        };

        match toml::from_str::<Self>(&content) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded config");
                Some(config)
            }
            Err(e) => {
                tracing::warn!("failed to parse config {}: {e}", path.display());
                None
            }
        }
    }

    /// Layer another config on top (other overrides self where present).
    fn override_with(self, other: Self) -> Self {
        Config {
            cache_ttl_secs: other.cache_ttl_secs.or(self.cache_ttl_secs),
            max_calls_per_window: other.max_calls_per_window.or(self.max_calls_per_window),
            quota_window_secs: other.quota_window_secs.or(self.quota_window_secs),
            file_delay_ms: other.file_delay_ms.or(self.file_delay_ms),
            batch_delay_ms: other.batch_delay_ms.or(self.batch_delay_ms),
            download_batch_size: other.download_batch_size.or(self.download_batch_size),
            scan_batch_size: other.scan_batch_size.or(self.scan_batch_size),
            scan_workers: other.scan_workers.or(self.scan_workers),
            cache_workers: other.cache_workers.or(self.cache_workers),
            repo_timeout_secs: other.repo_timeout_secs.or(self.repo_timeout_secs),
            cache_repo_timeout_secs: other
                .cache_repo_timeout_secs
                .or(self.cache_repo_timeout_secs),
            cache_max_file_size: other.cache_max_file_size.or(self.cache_max_file_size),
            scan_max_file_size: other.scan_max_file_size.or(self.scan_max_file_size),
            snippet_limit: other.snippet_limit.or(self.snippet_limit),
            max_assessor_calls: other.max_assessor_calls.or(self.max_assessor_calls),
            cache_dir: other.cache_dir.or(self.cache_dir),
            assessor_endpoint: other.assessor_endpoint.or(self.assessor_endpoint),
        }
    }

    // ===== Accessors with defaults =====

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs.unwrap_or(Self::DEFAULT_CACHE_TTL_SECS))
    }

    pub fn max_calls_per_window(&self) -> u32 {
        self.max_calls_per_window
            .unwrap_or(crate::fetcher::DEFAULT_MAX_CALLS_PER_WINDOW)
    }

    pub fn quota_window(&self) -> Duration {
        self.quota_window_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::fetcher::DEFAULT_QUOTA_WINDOW)
    }

    pub fn file_delay(&self) -> Duration {
        self.file_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::fetcher::DEFAULT_FILE_DELAY)
    }

    pub fn batch_delay(&self) -> Duration {
        self.batch_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(crate::fetcher::DEFAULT_BATCH_DELAY)
    }

    pub fn download_batch_size(&self) -> usize {
        self.download_batch_size
            .unwrap_or(crate::fetcher::DEFAULT_DOWNLOAD_BATCH_SIZE)
    }

    pub fn scan_batch_size(&self) -> usize {
        self.scan_batch_size
            .unwrap_or(crate::scan::DEFAULT_SCAN_BATCH_SIZE)
    }

    pub fn scan_workers(&self) -> usize {
        self.scan_workers.unwrap_or(crate::scan::DEFAULT_SCAN_WORKERS)
    }

    pub fn cache_workers(&self) -> usize {
        self.cache_workers
            .unwrap_or(crate::mirror::DEFAULT_CACHE_WORKERS)
    }

    pub fn repo_timeout(&self) -> Duration {
        self.repo_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::scan::DEFAULT_REPO_TIMEOUT)
    }

    pub fn cache_repo_timeout(&self) -> Duration {
        self.cache_repo_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(crate::mirror::DEFAULT_CACHE_REPO_TIMEOUT)
    }

    pub fn cache_max_file_size(&self) -> u64 {
        self.cache_max_file_size
            .unwrap_or(Self::DEFAULT_CACHE_MAX_FILE_SIZE)
    }

    pub fn scan_max_file_size(&self) -> u64 {
        self.scan_max_file_size
            .unwrap_or(Self::DEFAULT_SCAN_MAX_FILE_SIZE)
    }

    pub fn snippet_limit(&self) -> usize {
        self.snippet_limit
            .unwrap_or(crate::scan::DEFAULT_SNIPPET_LIMIT)
    }

    pub fn cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        dirs::cache_dir()
            .map(|d| d.join("relens/repositories"))
            .unwrap_or_else(|| PathBuf::from(".relens-cache"))
    }

    pub fn assessor_endpoint(&self) -> String {
        self.assessor_endpoint
            .clone()
            .unwrap_or_else(|| Self::DEFAULT_ASSESSOR_ENDPOINT.to_string())
    }
}

/// Host credential, from `RELENS_GITHUB_TOKEN` or `GITHUB_TOKEN`.
pub fn github_token() -> Option<String> {
    std::env::var("RELENS_GITHUB_TOKEN")
        .or_else(|_| std::env::var("GITHUB_TOKEN"))
        .ok()
        .filter(|t| !t.is_empty())
}

/// Assessor credential, from `RELENS_ASSESSOR_API_KEY` or `GEMINI_API_KEY`.
pub fn assessor_api_key() -> Option<String> {
    std::env::var("RELENS_ASSESSOR_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .ok()
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_valid_config() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".relens.toml");
        std::fs::write(&path, "cache_ttl_secs = 60\nscan_workers = 2\n").unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.scan_workers(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Config::load_file(&dir.path().join("nonexistent.toml")).is_none());
    }

    #[test]
    fn test_load_malformed_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".relens.toml");
        std::fs::write(&path, "not valid [[[").unwrap();
        assert!(Config::load_file(&path).is_none());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_ttl(), Duration::from_secs(3600));
        assert_eq!(config.max_calls_per_window(), 4000);
        assert_eq!(config.scan_batch_size(), 20);
        assert_eq!(config.scan_workers(), 4);
        assert_eq!(config.cache_workers(), 2);
        assert_eq!(config.repo_timeout(), Duration::from_secs(120));
        assert_eq!(config.cache_max_file_size(), 1_000_000);
        assert_eq!(config.scan_max_file_size(), 500_000);
        assert_eq!(config.snippet_limit(), 2500);
        assert!(config.max_assessor_calls.is_none());
    }

    #[test]
    fn test_merge_override() {
        let base = Config {
            cache_ttl_secs: Some(10),
            scan_workers: Some(8),
            ..Default::default()
        };
        let project = Config {
            cache_ttl_secs: Some(20),
            snippet_limit: Some(100),
            ..Default::default()
        };

        let merged = base.override_with(project);
        assert_eq!(merged.cache_ttl_secs, Some(20));
        assert_eq!(merged.scan_workers, Some(8));
        assert_eq!(merged.snippet_limit, Some(100));
    }
}
