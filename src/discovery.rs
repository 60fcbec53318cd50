//! Candidate file discovery for a remote repository
//!
//! Indexed per-extension search first (cheap, bounded), full traversal as
//! the fallback when search comes back empty. Traversal is an explicit
//! worklist with a visited-set guard: remote directory listings have no
//! depth limit and cyclic symlinks exist in the wild.
//!
//! Discovered paths are partitioned into "priority" (entry points, config,
//! routing — disproportionately likely to carry cross-module usage) and
//! "regular", so priority files get screened first.

use std::collections::HashSet;
use std::path::Path;

use crate::fetcher::Fetcher;

/// Source extensions screened during a scan.
pub const CODE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "java", "cpp", "c", "h", "go", "rs", "rb", "php",
];

/// Extensions mirrored into the long-lived cache: source plus the config
/// and doc formats that carry cross-repository references.
pub const CACHE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "java", "cpp", "c", "h", "go", "rs", "rb", "php", "json", "yaml", "yml",
    "md",
];

/// Base-filename keywords that mark a file as priority.
const PRIORITY_KEYWORDS: &[&str] = &[
    "index",
    "main",
    "app",
    "server",
    "client",
    "api",
    "service",
    "controller",
    "config",
    "setup",
    "init",
    "routes",
    "middleware",
    "auth",
    "utils",
];

/// Bounded result count per extension for the indexed search.
const SEARCH_LIMIT_PER_EXTENSION: usize = 100;

/// When search-based listing for the cache finds fewer paths than this,
/// the recursive tree listing fills in the rest.
const TREE_FALLBACK_THRESHOLD: usize = 10;

/// Discovered paths, deduplicated, split by processing priority.
#[derive(Debug, Default)]
pub struct FileListing {
    pub priority: Vec<String>,
    pub regular: Vec<String>,
}

impl FileListing {
    pub fn len(&self) -> usize {
        self.priority.len() + self.regular.len()
    }

    pub fn is_empty(&self) -> bool {
        self.priority.is_empty() && self.regular.is_empty()
    }

    /// Priority files first, then regular — the screening order.
    pub fn into_ordered(self) -> Vec<String> {
        let mut all = self.priority;
        all.extend(self.regular);
        all
    }
}

pub struct Discovery<'a> {
    fetcher: &'a Fetcher,
    extensions: &'static [&'static str],
}

impl<'a> Discovery<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        Self {
            fetcher,
            extensions: CODE_EXTENSIONS,
        }
    }

    /// Discovery over the wider cache extension set.
    pub fn for_cache(fetcher: &'a Fetcher) -> Self {
        Self {
            fetcher,
            extensions: CACHE_EXTENSIONS,
        }
    }

    /// List candidate files, partitioned into (priority, regular).
    pub async fn list_files(&self, repo: &str) -> FileListing {
        let mut merged = self.search_all_extensions(repo).await;
        if merged.is_empty() {
            merged = self.traverse(repo).await;
        }

        let mut listing = FileListing::default();
        for path in merged {
            if is_priority_file(&path) {
                listing.priority.push(path);
            } else {
                listing.regular.push(path);
            }
        }
        tracing::debug!(
            "discovered {} files in {repo} ({} priority, {} regular)",
            listing.len(),
            listing.priority.len(),
            listing.regular.len()
        );
        listing
    }

    /// Flat listing for the mirror: search-first, topped up from the
    /// recursive branch tree when search finds too little (unindexed or
    /// sparsely indexed repositories).
    pub async fn list_files_for_cache(&self, repo: &str) -> Vec<String> {
        let mut files = self.search_all_extensions(repo).await;

        if files.len() < TREE_FALLBACK_THRESHOLD {
            match self.fetcher.branch_tree(repo).await {
                Ok(tree) => {
                    let mut seen: HashSet<String> = files.iter().cloned().collect();
                    for path in tree {
                        if has_allowed_extension(&path, self.extensions) && seen.insert(path.clone())
                        {
                            files.push(path);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("tree listing failed for {repo}: {e}");
                }
            }
        }
        files
    }

    async fn search_all_extensions(&self, repo: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();

        for ext in self.extensions {
            match self
                .fetcher
                .search_code(repo, ext, SEARCH_LIMIT_PER_EXTENSION)
                .await
            {
                Ok(paths) => {
                    for path in paths {
                        if seen.insert(path.clone()) {
                            merged.push(path);
                        }
                    }
                }
                Err(e) => {
                    tracing::debug!("search failed for {repo} extension {ext}: {e}");
                }
            }
        }
        merged
    }

    /// Full recursive traversal via directory listings. Unreadable
    /// subdirectories are skipped, never fatal.
    async fn traverse(&self, repo: &str) -> Vec<String> {
        let mut files = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![String::new()];

        while let Some(dir) = stack.pop() {
            if !visited.insert(dir.clone()) {
                continue;
            }
            let entries = match self.fetcher.list_directory(repo, &dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!("skipping unreadable directory {repo}/{dir}: {e}");
                    continue;
                }
            };
            for entry in entries {
                if entry.is_dir {
                    stack.push(entry.path);
                } else if has_allowed_extension(&entry.path, self.extensions) {
                    files.push(entry.path);
                }
            }
        }

        files.sort();
        files.dedup();
        files
    }
}

/// Case-insensitive keyword match on the base filename.
pub fn is_priority_file(path: &str) -> bool {
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    PRIORITY_KEYWORDS.iter().any(|kw| file_name.contains(kw))
}

pub fn has_allowed_extension(path: &str, extensions: &[&str]) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            extensions.iter().any(|allowed| *allowed == ext)
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_priority_file() {
        assert!(is_priority_file("src/main.py"));
        assert!(is_priority_file("lib/UserController.java"));
        assert!(is_priority_file("src/routes/AUTH.ts"));
        assert!(is_priority_file("deep/nested/app.config.js"));
        assert!(!is_priority_file("src/models/user.py"));
        assert!(!is_priority_file("docs/overview.md"));
    }

    #[test]
    fn test_priority_matches_basename_not_directory() {
        // "api" in the directory must not promote the file.
        assert!(!is_priority_file("api/helpers.py"));
        assert!(is_priority_file("helpers/api.py"));
    }

    #[test]
    fn test_has_allowed_extension() {
        assert!(has_allowed_extension("src/a.py", CODE_EXTENSIONS));
        assert!(has_allowed_extension("include/x.h", CODE_EXTENSIONS));
        assert!(has_allowed_extension("A.RS", CODE_EXTENSIONS));
        assert!(!has_allowed_extension("a.txt", CODE_EXTENSIONS));
        assert!(!has_allowed_extension("Makefile", CODE_EXTENSIONS));
        assert!(!has_allowed_extension("config.yaml", CODE_EXTENSIONS));
        assert!(has_allowed_extension("config.yaml", CACHE_EXTENSIONS));
    }

    #[test]
    fn test_listing_order_is_priority_first() {
        let listing = FileListing {
            priority: vec!["main.py".into()],
            regular: vec!["helper.py".into()],
        };
        assert_eq!(listing.into_ordered(), vec!["main.py", "helper.py"]);
    }
}
