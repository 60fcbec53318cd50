//! Data types for cross-repository scan results

use serde::Serialize;

use crate::assess::Assessment;
use crate::screen::Dependency;

/// One confirmed impact: the assessor said a file in another repository is
/// affected by a changed dependency. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct ImpactRecord {
    pub source_repo: String,
    pub source_file: String,
    pub affected_repo: String,
    pub affected_file: String,
    pub dependency: Dependency,
    pub assessment: Assessment,
}

/// Per-repository rollup of impacts.
#[derive(Debug, Clone, Serialize)]
pub struct RepoImpactSummary {
    pub repo: String,
    pub impact_count: usize,
    pub impacts: Vec<ImpactRecord>,
}

/// Result of one orchestration run. Immutable after assembly; `impacts`
/// carries no ordering guarantee across repositories or files.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub target_repositories: Vec<String>,
    pub impacts: Vec<ImpactRecord>,
    pub affected_repositories: Vec<RepoImpactSummary>,
    /// Repositories whose task timed out or failed; their partial results
    /// were discarded.
    pub failed_repositories: Vec<String>,
    pub text_summary: String,
}
