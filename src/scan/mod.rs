//! Cross-repository scan orchestration
//!
//! One task per target repository, run under a bounded worker count with a
//! per-repository timeout. Each task discovers files, pulls content through
//! the store (write-through on miss or invalid cache), screens for
//! candidate (file, dependency) pairs, and asks the assessor only about
//! candidates. A task that times out or panics is recorded as a failure
//! for that repository alone; its partial results are discarded and the
//! run continues.

mod format;
mod types;

pub use format::render_scan_text;
pub use types::{ImpactRecord, RepoImpactSummary, ScanResult};

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::assess::{AssessRequest, Assessor};
use crate::discovery::Discovery;
use crate::fetcher::Fetcher;
use crate::screen::{Dependency, ScreenSet};
use crate::store::Store;

pub const DEFAULT_SCAN_BATCH_SIZE: usize = 20;
pub const DEFAULT_SCAN_WORKERS: usize = 4;
pub const DEFAULT_REPO_TIMEOUT: Duration = Duration::from_secs(120);
/// Characters of target-file content handed to the assessor.
pub const DEFAULT_SNIPPET_LIMIT: usize = 2500;

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub batch_size: usize,
    pub max_workers: usize,
    pub repo_timeout: Duration,
    pub snippet_limit: usize,
    /// Soft cap on assessor calls across the whole run; `None` = unlimited.
    pub max_assessor_calls: Option<u64>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_SCAN_BATCH_SIZE,
            max_workers: DEFAULT_SCAN_WORKERS,
            repo_timeout: DEFAULT_REPO_TIMEOUT,
            snippet_limit: DEFAULT_SNIPPET_LIMIT,
            max_assessor_calls: None,
        }
    }
}

pub struct Scanner {
    store: Arc<Store>,
    fetcher: Arc<Fetcher>,
    assessor: Arc<dyn Assessor>,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(
        store: Arc<Store>,
        fetcher: Arc<Fetcher>,
        assessor: Arc<dyn Assessor>,
        options: ScanOptions,
    ) -> Self {
        Self {
            store,
            fetcher,
            assessor,
            options,
        }
    }

    /// Run the end-to-end scan across `targets`. Never fails as a whole:
    /// per-repository failures land in `failed_repositories`.
    pub async fn scan(
        &self,
        source_repo: &str,
        source_file: &str,
        dependencies: &[Dependency],
        targets: &[String],
    ) -> ScanResult {
        let screen_set = Arc::new(ScreenSet::new(dependencies));
        let semaphore = Arc::new(Semaphore::new(self.options.max_workers.max(1)));
        let assessor_calls = Arc::new(AtomicU64::new(0));

        let mut tasks: JoinSet<(String, Option<Vec<ImpactRecord>>)> = JoinSet::new();
        // Task id -> repo, so a panicked task still gets attributed.
        let mut task_repos: HashMap<tokio::task::Id, String> = HashMap::new();
        for target in targets {
            if target == source_repo {
                continue;
            }
            let ctx = RepoTaskContext {
                store: Arc::clone(&self.store),
                fetcher: Arc::clone(&self.fetcher),
                assessor: Arc::clone(&self.assessor),
                screen_set: Arc::clone(&screen_set),
                assessor_calls: Arc::clone(&assessor_calls),
                options: self.options.clone(),
                source_repo: source_repo.to_string(),
                source_file: source_file.to_string(),
            };
            let semaphore = Arc::clone(&semaphore);
            let repo = target.clone();
            let timeout = self.options.repo_timeout;

            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (repo, None),
                };
                match tokio::time::timeout(timeout, ctx.scan_repository(&repo)).await {
                    Ok(records) => (repo, Some(records)),
                    Err(_) => {
                        tracing::warn!("scan of {repo} timed out after {:?}", timeout);
                        (repo, None)
                    }
                }
            });
            task_repos.insert(handle.id(), target.clone());
        }

        let mut impacts = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Some(records))) => impacts.extend(records),
                Ok((repo, None)) => failed.push(repo),
                Err(e) => {
                    tracing::error!("scan task failed: {e}");
                    if let Some(repo) = task_repos.remove(&e.id()) {
                        failed.push(repo);
                    }
                }
            }
        }
        failed.sort();

        assemble(targets.to_vec(), impacts, failed)
    }
}

/// Everything one per-repository task needs, cloned per spawn.
struct RepoTaskContext {
    store: Arc<Store>,
    fetcher: Arc<Fetcher>,
    assessor: Arc<dyn Assessor>,
    screen_set: Arc<ScreenSet>,
    assessor_calls: Arc<AtomicU64>,
    options: ScanOptions,
    source_repo: String,
    source_file: String,
}

impl RepoTaskContext {
    /// Scan one target repository. Infallible by design: per-item errors
    /// are logged and skipped inside the fetch and assess layers.
    async fn scan_repository(&self, repo: &str) -> Vec<ImpactRecord> {
        if self.screen_set.is_empty() {
            return Vec::new();
        }

        let discovery = Discovery::new(&self.fetcher);
        let files = discovery.list_files(repo).await.into_ordered();
        tracing::info!("scanning {} files in {repo}", files.len());

        let cache_valid = self.store.is_valid(repo);
        let mut records = Vec::new();

        for batch in files.chunks(self.options.batch_size.max(1)) {
            let mut contents: BTreeMap<String, String> = BTreeMap::new();
            let mut misses: Vec<String> = Vec::new();

            for path in batch {
                match self.store.get(repo, path).filter(|_| cache_valid) {
                    Some(content) => {
                        contents.insert(path.clone(), content);
                    }
                    None => misses.push(path.clone()),
                }
            }

            // Write-through: downloaded content is cached for later runs.
            let fetched = self.fetcher.fetch_batch(repo, &misses).await;
            for (path, content) in fetched {
                self.store.put(repo, &path, &content);
                contents.insert(path, content);
            }

            for (path, content) in &contents {
                for dependency in self.screen_set.screen(content) {
                    if let Some(record) = self.assess_candidate(repo, path, content, dependency).await
                    {
                        records.push(record);
                    }
                }
            }
        }

        tracing::info!("found {} impacts in {repo}", records.len());
        records
    }

    async fn assess_candidate(
        &self,
        repo: &str,
        path: &str,
        content: &str,
        dependency: &Dependency,
    ) -> Option<ImpactRecord> {
        if let Some(cap) = self.options.max_assessor_calls {
            let used = self.assessor_calls.fetch_add(1, Ordering::SeqCst);
            if used >= cap {
                tracing::warn!("assessor call budget ({cap}) exhausted; skipping {repo}/{path}");
                return None;
            }
        }

        let snippet = truncate_chars(content, self.options.snippet_limit);
        let request = AssessRequest {
            source_repo: &self.source_repo,
            source_file: &self.source_file,
            dependency,
            target_repo: repo,
            target_file: path,
            content: snippet,
        };

        match self.assessor.assess(&request).await {
            Ok(assessment) if assessment.has_impact => Some(ImpactRecord {
                source_repo: self.source_repo.clone(),
                source_file: self.source_file.clone(),
                affected_repo: repo.to_string(),
                affected_file: path.to_string(),
                dependency: dependency.clone(),
                assessment,
            }),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("assessment failed for {repo}/{path}: {e}");
                None
            }
        }
    }
}

fn assemble(
    target_repositories: Vec<String>,
    impacts: Vec<ImpactRecord>,
    failed_repositories: Vec<String>,
) -> ScanResult {
    let mut by_repo: BTreeMap<String, Vec<ImpactRecord>> = BTreeMap::new();
    for impact in &impacts {
        by_repo
            .entry(impact.affected_repo.clone())
            .or_default()
            .push(impact.clone());
    }

    let affected_repositories: Vec<RepoImpactSummary> = by_repo
        .into_iter()
        .map(|(repo, impacts)| RepoImpactSummary {
            repo,
            impact_count: impacts.len(),
            impacts,
        })
        .collect();

    let text_summary = if impacts.is_empty() {
        "No cross-repository dependencies found.".to_string()
    } else {
        format!(
            "Found {} cross-repository impacts across {} repositories.",
            impacts.len(),
            affected_repositories.len()
        )
    };

    ScanResult {
        target_repositories,
        impacts,
        affected_repositories,
        failed_repositories,
        text_summary,
    }
}

/// First `limit` characters of `s` (the assessor budget is in characters,
/// not bytes).
fn truncate_chars(s: &str, limit: usize) -> &str {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }

    #[test]
    fn test_assemble_empty_summary_is_exact_literal() {
        let result = assemble(vec!["a/b".into()], vec![], vec![]);
        assert_eq!(result.text_summary, "No cross-repository dependencies found.");
        assert!(result.affected_repositories.is_empty());
    }

    #[test]
    fn test_assemble_groups_by_affected_repo() {
        let record = |repo: &str, file: &str| ImpactRecord {
            source_repo: "src/repo".into(),
            source_file: "main.py".into(),
            affected_repo: repo.into(),
            affected_file: file.into(),
            dependency: "Svc:class".parse().unwrap(),
            assessment: crate::assess::Assessment {
                has_impact: true,
                ..Default::default()
            },
        };
        let result = assemble(
            vec!["a/b".into(), "c/d".into()],
            vec![record("a/b", "x.py"), record("a/b", "y.py"), record("c/d", "z.py")],
            vec!["e/f".into()],
        );

        assert_eq!(result.impacts.len(), 3);
        assert_eq!(result.affected_repositories.len(), 2);
        let ab = &result.affected_repositories[0];
        assert_eq!(ab.repo, "a/b");
        assert_eq!(ab.impact_count, 2);
        assert_eq!(
            result.text_summary,
            "Found 3 cross-repository impacts across 2 repositories."
        );
        assert_eq!(result.failed_repositories, vec!["e/f"]);
    }
}
