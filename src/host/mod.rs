//! Source-host client seam
//!
//! The core talks to the remote host through the [`HostClient`] trait:
//! fetch one file, list one directory, indexed code search, and the
//! recursive default-branch tree. Any host error is "no result" for that
//! call from the core's point of view; the error kinds exist so callers can
//! tell transient failures (worth coming back to) from permanent ones.

mod github;

pub use github::GithubClient;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HostError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("rate limited by host")]
    RateLimited,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("undecodable response: {0}")]
    Decode(String),
}

impl HostError {
    /// Transient failures may succeed on a later run; permanent ones will
    /// not, so callers skip the item instead of retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            HostError::Network(_) | HostError::RateLimited => true,
            HostError::Status { status, .. } => *status >= 500,
            HostError::NotFound(_) | HostError::Decode(_) => false,
        }
    }
}

/// Raw file content as returned by the host. May be binary; decoding to
/// text is the fetcher's problem.
#[derive(Debug, Clone)]
pub struct FileBlob {
    pub content: Vec<u8>,
    pub size: u64,
}

/// One entry of a directory listing.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Path relative to the repository root.
    pub path: String,
    pub is_dir: bool,
}

/// Opaque collaborator for all remote repository access.
#[async_trait]
pub trait HostClient: Send + Sync {
    /// Fetch one file's raw content by (repository, path).
    async fn get_file(&self, repo: &str, path: &str) -> Result<FileBlob, HostError>;

    /// List one directory (non-recursive). `path` is `""` for the root.
    async fn list_directory(&self, repo: &str, path: &str) -> Result<Vec<DirEntry>, HostError>;

    /// Indexed code search for files of one extension within a repository,
    /// bounded to at most `limit` paths. May legitimately return nothing
    /// when the repository is not indexed.
    async fn search_code(
        &self,
        repo: &str,
        extension: &str,
        limit: usize,
    ) -> Result<Vec<String>, HostError>;

    /// Recursive blob list of the default branch.
    async fn branch_tree(&self, repo: &str) -> Result<Vec<String>, HostError>;
}
