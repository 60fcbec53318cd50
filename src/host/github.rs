//! GitHub REST implementation of [`HostClient`]
//!
//! Contents API for files and directory listings, code-search API for the
//! indexed per-extension search, and the git trees API for the recursive
//! default-branch blob list.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use super::{DirEntry, FileBlob, HostClient, HostError};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("relens/", env!("CARGO_PKG_VERSION"));

pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl GithubClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    /// Point the client at a different API base URL (used by tests).
    pub fn with_api_base(token: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, HostError> {
        let response = self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        match status.as_u16() {
            200 => {}
            403 | 429 => return Err(HostError::RateLimited),
            404 => return Err(HostError::NotFound(url.to_string())),
            s => {
                return Err(HostError::Status {
                    status: s,
                    url: url.to_string(),
                })
            }
        }

        response
            .json::<T>()
            .await
            .map_err(|e| HostError::Decode(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ContentsItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    encoding: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Directory(Vec<ContentsItem>),
    File(Box<ContentsItem>),
}

#[derive(Deserialize)]
struct SearchItem {
    path: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct TreeResponse {
    #[serde(default)]
    tree: Vec<TreeItem>,
}

#[async_trait]
impl HostClient for GithubClient {
    async fn get_file(&self, repo: &str, path: &str) -> Result<FileBlob, HostError> {
        let url = format!("{}/repos/{}/contents/{}", self.api_base, repo, path);
        let response: ContentsResponse = self.get_json(&url).await?;

        let item = match response {
            ContentsResponse::File(item) => item,
            ContentsResponse::Directory(_) => {
                return Err(HostError::Decode(format!("{path} is a directory")))
            }
        };

        match item.encoding.as_deref() {
            Some("base64") => {
                let raw = item.content.unwrap_or_default();
                // The contents API wraps base64 at 60 columns.
                let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(compact)
                    .map_err(|e| HostError::Decode(format!("bad base64 for {path}: {e}")))?;
                Ok(FileBlob {
                    size: item.size.max(bytes.len() as u64),
                    content: bytes,
                })
            }
            Some(other) => Err(HostError::Decode(format!(
                "unsupported encoding {other} for {path}"
            ))),
            // "none" encoding means the blob was too large for the contents
            // API; report the size so oversize policy can kick in upstream.
            None => Ok(FileBlob {
                size: item.size,
                content: Vec::new(),
            }),
        }
    }

    async fn list_directory(&self, repo: &str, path: &str) -> Result<Vec<DirEntry>, HostError> {
        let url = format!("{}/repos/{}/contents/{}", self.api_base, repo, path);
        let response: ContentsResponse = self.get_json(&url).await?;

        let items = match response {
            ContentsResponse::Directory(items) => items,
            ContentsResponse::File(item) => vec![*item],
        };

        Ok(items
            .into_iter()
            .map(|item| DirEntry {
                is_dir: item.kind == "dir",
                path: item.path,
            })
            .collect())
    }

    async fn search_code(
        &self,
        repo: &str,
        extension: &str,
        limit: usize,
    ) -> Result<Vec<String>, HostError> {
        let query = format!("repo:{repo}+extension:{extension}");
        let url = format!(
            "{}/search/code?q={}&per_page={}",
            self.api_base,
            query,
            limit.min(100)
        );
        let response: SearchResponse = self.get_json(&url).await?;
        Ok(response
            .items
            .into_iter()
            .take(limit)
            .map(|i| i.path)
            .collect())
    }

    async fn branch_tree(&self, repo: &str) -> Result<Vec<String>, HostError> {
        let info: RepoInfo = self
            .get_json(&format!("{}/repos/{}", self.api_base, repo))
            .await?;
        let url = format!(
            "{}/repos/{}/git/trees/{}?recursive=1",
            self.api_base, repo, info.default_branch
        );
        let response: TreeResponse = self.get_json(&url).await?;
        Ok(response
            .tree
            .into_iter()
            .filter(|item| item.kind == "blob")
            .map(|item| item.path)
            .collect())
    }
}
