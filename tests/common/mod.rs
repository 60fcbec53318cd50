//! Shared test doubles: an in-memory host and a scripted assessor.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use relens::assess::{AssessError, AssessRequest, Assessment, Assessor};
use relens::host::{DirEntry, FileBlob, HostClient, HostError};

/// In-memory host backed by a repo -> (path -> content) map.
#[derive(Default)]
pub struct MockHost {
    repos: BTreeMap<String, BTreeMap<String, String>>,
    /// Repositories whose every call hangs forever (timeout tests).
    hang: HashSet<String>,
    /// Repositories whose every call panics (worker crash tests).
    panic_repos: HashSet<String>,
    /// When set, code search always returns nothing, forcing traversal.
    empty_search: bool,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, repo: &str, path: &str, content: &str) -> Self {
        self.repos
            .entry(repo.to_string())
            .or_default()
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn with_hanging_repo(mut self, repo: &str) -> Self {
        self.hang.insert(repo.to_string());
        self
    }

    pub fn with_panicking_repo(mut self, repo: &str) -> Self {
        self.panic_repos.insert(repo.to_string());
        self
    }

    pub fn with_empty_search(mut self) -> Self {
        self.empty_search = true;
        self
    }

    async fn fault_if_scripted(&self, repo: &str) {
        if self.panic_repos.contains(repo) {
            panic!("scripted host crash for {repo}");
        }
        if self.hang.contains(repo) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl HostClient for MockHost {
    async fn get_file(&self, repo: &str, path: &str) -> Result<FileBlob, HostError> {
        self.fault_if_scripted(repo).await;
        let content = self
            .repos
            .get(repo)
            .and_then(|files| files.get(path))
            .ok_or_else(|| HostError::NotFound(format!("{repo}/{path}")))?;
        Ok(FileBlob {
            content: content.clone().into_bytes(),
            size: content.len() as u64,
        })
    }

    async fn list_directory(&self, repo: &str, path: &str) -> Result<Vec<DirEntry>, HostError> {
        self.fault_if_scripted(repo).await;
        let files = self
            .repos
            .get(repo)
            .ok_or_else(|| HostError::NotFound(repo.to_string()))?;

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut seen = HashSet::new();
        let mut entries = Vec::new();
        for full in files.keys() {
            let rest = match full.strip_prefix(&prefix) {
                Some(r) => r,
                None => continue,
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    let dir_path = format!("{prefix}{dir}");
                    if seen.insert(dir_path.clone()) {
                        entries.push(DirEntry {
                            path: dir_path,
                            is_dir: true,
                        });
                    }
                }
                None => {
                    entries.push(DirEntry {
                        path: full.clone(),
                        is_dir: false,
                    });
                }
            }
        }
        Ok(entries)
    }

    async fn search_code(
        &self,
        repo: &str,
        extension: &str,
        limit: usize,
    ) -> Result<Vec<String>, HostError> {
        self.fault_if_scripted(repo).await;
        if self.empty_search {
            return Ok(Vec::new());
        }
        let files = self
            .repos
            .get(repo)
            .ok_or_else(|| HostError::NotFound(repo.to_string()))?;
        Ok(files
            .keys()
            .filter(|p| p.rsplit('.').next() == Some(extension))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn branch_tree(&self, repo: &str) -> Result<Vec<String>, HostError> {
        self.fault_if_scripted(repo).await;
        let files = self
            .repos
            .get(repo)
            .ok_or_else(|| HostError::NotFound(repo.to_string()))?;
        Ok(files.keys().cloned().collect())
    }
}

/// Assessor that reports impact iff the snippet contains a marker string.
/// Counts calls so tests can assert how often the screen let content through.
pub struct MockAssessor {
    marker: String,
    calls: AtomicU64,
}

impl MockAssessor {
    pub fn new(marker: &str) -> Self {
        Self {
            marker: marker.to_string(),
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Assessor for MockAssessor {
    async fn assess(&self, request: &AssessRequest<'_>) -> Result<Assessment, AssessError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let has_impact = request.content.contains(&self.marker);
        Ok(Assessment {
            has_impact,
            summary: if has_impact {
                format!("{} is used here", request.dependency.name)
            } else {
                String::new()
            },
            ..Default::default()
        })
    }
}
