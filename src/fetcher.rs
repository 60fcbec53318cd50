//! Rate-limited, paced access to the source host
//!
//! Every remote call routes through one shared [`RateLimiter`] — the quota
//! counter and window start are the single piece of state that needs strict
//! mutual exclusion across all scan tasks, so they live behind one async
//! mutex and no fetch path bypasses the gate. When the window is exhausted
//! the calling task suspends until the window resets; the process keeps
//! running.
//!
//! Pacing is separate from the quota: batch downloads sleep briefly between
//! individual files and longer between batches, to avoid bursty patterns
//! that upstream abuse-detection flags.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::host::{DirEntry, HostClient, HostError};

/// Default quota: 4000 calls per rolling hour.
pub const DEFAULT_MAX_CALLS_PER_WINDOW: u32 = 4000;
pub const DEFAULT_QUOTA_WINDOW: Duration = Duration::from_secs(3600);

/// Default pacing: ~100ms between files, ~1s between batches of 10.
pub const DEFAULT_FILE_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_DOWNLOAD_BATCH_SIZE: usize = 10;

/// What to do with a file above the size ceiling. The two call sites need
/// different tradeoffs: the long-lived cache skips oversized files (bulk
/// hygiene), the single-shot analysis path truncates them (recall).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversizePolicy {
    Skip,
    Truncate,
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// Worth retrying on a later run; never retried in a loop here.
    #[error("transient host failure: {0}")]
    Transient(#[source] HostError),
    /// Will not succeed on retry; callers skip the item.
    #[error("permanent host failure: {0}")]
    Permanent(#[source] HostError),
    #[error("binary or non-UTF8 content")]
    Binary,
    #[error("file too large ({size} bytes, ceiling {ceiling})")]
    Oversize { size: u64, ceiling: u64 },
}

impl From<HostError> for FetchError {
    fn from(e: HostError) -> Self {
        if e.is_transient() {
            FetchError::Transient(e)
        } else {
            FetchError::Permanent(e)
        }
    }
}

struct WindowState {
    count: u32,
    started: Instant,
}

/// Single-owner coordinator for the host call quota. All fetch paths call
/// [`RateLimiter::acquire`] before touching the network; no task holds its
/// own counter.
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            state: Mutex::new(WindowState {
                count: 0,
                started: Instant::now(),
            }),
        }
    }

    /// Take one quota slot, suspending until the window resets if the cap
    /// is reached. The lock is held across the sleep on purpose: once the
    /// quota is exhausted every caller has to wait out the same window.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        if now.duration_since(state.started) > self.window {
            state.count = 0;
            state.started = now;
        }

        if state.count >= self.max_calls {
            let wait = self.window.saturating_sub(now.duration_since(state.started));
            tracing::warn!(
                "host call quota reached ({} calls); suspending for {:.0}s",
                self.max_calls,
                wait.as_secs_f64()
            );
            tokio::time::sleep(wait).await;
            state.count = 0;
            state.started = Instant::now();
        }

        state.count += 1;
    }

    /// Calls used in the current window (diagnostics only).
    pub async fn calls_in_window(&self) -> u32 {
        self.state.lock().await.count
    }
}

/// Per-call-site fetch tuning.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub max_file_size: u64,
    pub oversize: OversizePolicy,
    pub file_delay: Duration,
    pub batch_delay: Duration,
    pub batch_size: usize,
}

impl FetchConfig {
    /// Long-lived cache profile: 1MB ceiling, oversized files skipped.
    pub fn for_cache(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            oversize: OversizePolicy::Skip,
            file_delay: DEFAULT_FILE_DELAY,
            batch_delay: DEFAULT_BATCH_DELAY,
            batch_size: DEFAULT_DOWNLOAD_BATCH_SIZE,
        }
    }

    /// Single-shot analysis profile: 500KB ceiling, oversized files
    /// truncated so they still get screened.
    pub fn for_analysis(max_file_size: u64) -> Self {
        Self {
            max_file_size,
            oversize: OversizePolicy::Truncate,
            ..Self::for_cache(max_file_size)
        }
    }
}

/// Gated, paced host access shared by discovery, the mirror, and the
/// orchestrator.
pub struct Fetcher {
    host: Arc<dyn HostClient>,
    limiter: Arc<RateLimiter>,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(host: Arc<dyn HostClient>, limiter: Arc<RateLimiter>, config: FetchConfig) -> Self {
        Self {
            host,
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Fetch one file and decode it to text, applying the size ceiling.
    pub async fn fetch_file(&self, repo: &str, path: &str) -> Result<String, FetchError> {
        self.limiter.acquire().await;
        let blob = self.host.get_file(repo, path).await?;

        let oversize = blob.size > self.config.max_file_size;
        if oversize && self.config.oversize == OversizePolicy::Skip {
            return Err(FetchError::Oversize {
                size: blob.size,
                ceiling: self.config.max_file_size,
            });
        }

        let mut content = String::from_utf8(blob.content).map_err(|_| FetchError::Binary)?;
        if oversize {
            truncate_to_boundary(&mut content, self.config.max_file_size as usize);
            tracing::debug!(
                "truncated oversized file {repo}/{path} ({} bytes)",
                blob.size
            );
        }
        Ok(content)
    }

    /// Download a set of files with pacing. Per-file failures are logged
    /// and skipped; the result holds only the files that decoded cleanly.
    pub async fn fetch_batch(&self, repo: &str, paths: &[String]) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let batches: Vec<&[String]> = paths.chunks(self.config.batch_size.max(1)).collect();
        let batch_count = batches.len();

        for (i, batch) in batches.into_iter().enumerate() {
            for (j, path) in batch.iter().enumerate() {
                match self.fetch_file(repo, path).await {
                    Ok(content) => {
                        out.insert(path.clone(), content);
                    }
                    Err(FetchError::Oversize { size, .. }) => {
                        tracing::info!("skipping large file {repo}/{path} ({size} bytes)");
                    }
                    Err(FetchError::Binary) => {
                        tracing::debug!("skipping binary file {repo}/{path}");
                    }
                    Err(e) => {
                        tracing::warn!("failed to download {repo}/{path}: {e}");
                    }
                }
                // Pace between files only; the batch delay covers the gap
                // after the last file of a batch.
                if j + 1 < batch.len() {
                    tokio::time::sleep(self.config.file_delay).await;
                }
            }
            if i + 1 < batch_count {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }
        out
    }

    pub async fn list_directory(&self, repo: &str, path: &str) -> Result<Vec<DirEntry>, FetchError> {
        self.limiter.acquire().await;
        Ok(self.host.list_directory(repo, path).await?)
    }

    pub async fn search_code(
        &self,
        repo: &str,
        extension: &str,
        limit: usize,
    ) -> Result<Vec<String>, FetchError> {
        self.limiter.acquire().await;
        Ok(self.host.search_code(repo, extension, limit).await?)
    }

    pub async fn branch_tree(&self, repo: &str) -> Result<Vec<String>, FetchError> {
        self.limiter.acquire().await;
        Ok(self.host.branch_tree(repo).await?)
    }
}

/// Truncate in place to at most `max` bytes, backing up to a char boundary.
fn truncate_to_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}
