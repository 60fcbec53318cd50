//! relens - cross-repository impact analysis
//!
//! Given a changed file and the dependencies it exports, relens scans a set
//! of sibling repositories for code that uses those dependencies and asks an
//! external assessor how each usage is affected. Remote content is pulled
//! through a rate-limited fetcher and cached on disk so repeated scans stay
//! cheap.
//!
//! Pipeline: [`discovery`] lists candidate files per repository, [`fetcher`]
//! downloads them through the shared quota gate, [`store`] caches content
//! with a TTL, [`screen`] cheaply filters (file, dependency) pairs, and
//! [`scan`] orchestrates the whole run and hands surviving candidates to an
//! [`assess::Assessor`].

pub mod assess;
pub mod config;
pub mod discovery;
pub mod fetcher;
pub mod host;
pub mod mirror;
pub mod scan;
pub mod screen;
pub mod store;

pub use assess::{Assessment, Assessor, HttpAssessor};
pub use config::Config;
pub use fetcher::{FetchConfig, Fetcher, RateLimiter};
pub use host::{GithubClient, HostClient};
pub use mirror::{Mirror, MirrorOptions, MirrorOutcome};
pub use scan::{ScanOptions, ScanResult, Scanner};
pub use screen::{Dependency, DependencyAction, DependencyKind};
pub use store::{Store, StoreError};
