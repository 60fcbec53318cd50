//! Repository mirroring into the content store
//!
//! Downloads every allow-listed file of a repository into the store so
//! later scans run from disk instead of the host API. Honors cache
//! validity unless forced, lists via search with a tree fallback, paces
//! downloads through the fetcher, and writes metadata only after the
//! download completes. A repository-level failure falls back to whatever
//! is already cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::discovery::Discovery;
use crate::fetcher::Fetcher;
use crate::store::Store;

pub const DEFAULT_CACHE_WORKERS: usize = 2;
pub const DEFAULT_CACHE_REPO_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct MirrorOptions {
    pub workers: usize,
    pub repo_timeout: Duration,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_CACHE_WORKERS,
            repo_timeout: DEFAULT_CACHE_REPO_TIMEOUT,
        }
    }
}

/// Per-repository outcome of a bulk download.
#[derive(Debug, Clone)]
pub enum MirrorOutcome {
    /// Cache was still valid; nothing downloaded.
    Fresh { files: usize },
    /// Downloaded and metadata written.
    Downloaded { files: usize },
    /// Task timed out or panicked; cache left as it was.
    Failed,
}

impl MirrorOutcome {
    pub fn files(&self) -> usize {
        match self {
            MirrorOutcome::Fresh { files } | MirrorOutcome::Downloaded { files } => *files,
            MirrorOutcome::Failed => 0,
        }
    }
}

pub struct Mirror {
    store: Arc<Store>,
    fetcher: Arc<Fetcher>,
    options: MirrorOptions,
}

impl Mirror {
    pub fn new(store: Arc<Store>, fetcher: Arc<Fetcher>, options: MirrorOptions) -> Self {
        Self {
            store,
            fetcher,
            options,
        }
    }

    /// Download one repository's files into the store, returning the cached
    /// contents. With a valid cache and no `force`, returns the cache as-is.
    pub async fn download_repository(
        &self,
        repo: &str,
        force: bool,
    ) -> BTreeMap<String, String> {
        if !force && self.store.is_valid(repo) {
            tracing::info!("using cached files for {repo}");
            return self.store.load_all(repo);
        }

        tracing::info!("downloading files from {repo}");
        let discovery = Discovery::for_cache(&self.fetcher);
        let files = discovery.list_files_for_cache(repo).await;

        if files.is_empty() {
            // Listing failed outright or the repository is empty; fall back
            // to whatever the cache already holds.
            tracing::warn!("no files listed for {repo}; falling back to existing cache");
            return self.store.load_all(repo);
        }

        tracing::info!("found {} files to cache in {repo}", files.len());
        let fetched = self.fetcher.fetch_batch(repo, &files).await;
        for (path, content) in &fetched {
            self.store.put(repo, path, content);
        }

        if let Err(e) = self.store.write_metadata(repo, fetched.len()) {
            tracing::warn!("failed to write cache metadata for {repo}: {e}");
        }
        tracing::info!("cached {} files from {repo}", fetched.len());
        fetched
    }

    /// Download several repositories under a bounded worker count with a
    /// per-repository timeout. Failures are isolated per repository.
    pub async fn download_many(
        self: &Arc<Self>,
        repos: &[String],
        force: bool,
    ) -> BTreeMap<String, MirrorOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.options.workers.max(1)));
        let mut tasks: JoinSet<(String, MirrorOutcome)> = JoinSet::new();
        // Task id -> repo, so a panicked task still gets attributed.
        let mut task_repos: HashMap<tokio::task::Id, String> = HashMap::new();

        for repo in repos {
            let mirror = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let name = repo.clone();
            let repo = repo.clone();
            let timeout = self.options.repo_timeout;

            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (repo, MirrorOutcome::Failed),
                };
                let fresh = !force && mirror.store.is_valid(&repo);
                match tokio::time::timeout(timeout, mirror.download_repository(&repo, force)).await
                {
                    Ok(files) if fresh => (repo, MirrorOutcome::Fresh { files: files.len() }),
                    Ok(files) => (
                        repo,
                        MirrorOutcome::Downloaded { files: files.len() },
                    ),
                    Err(_) => {
                        tracing::warn!("caching {repo} timed out after {:?}", timeout);
                        (repo, MirrorOutcome::Failed)
                    }
                }
            });
            task_repos.insert(handle.id(), name);
        }

        let mut outcomes = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((repo, outcome)) => {
                    outcomes.insert(repo, outcome);
                }
                Err(e) => {
                    tracing::error!("cache task failed: {e}");
                    if let Some(repo) = task_repos.remove(&e.id()) {
                        outcomes.insert(repo, MirrorOutcome::Failed);
                    }
                }
            }
        }
        outcomes
    }
}
