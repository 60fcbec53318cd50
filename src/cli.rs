//! CLI implementation for relens

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use relens::assess::HttpAssessor;
use relens::config::{self, Config};
use relens::fetcher::{FetchConfig, Fetcher, RateLimiter};
use relens::host::GithubClient;
use relens::mirror::{Mirror, MirrorOptions, MirrorOutcome};
use relens::scan::{render_scan_text, ScanOptions, Scanner};
use relens::screen::Dependency;
use relens::store::Store;

#[derive(Parser)]
#[command(name = "relens")]
#[command(about = "Cross-repository impact analysis for code changes")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan target repositories for impacts of changed dependencies
    Scan {
        /// Repository the change happened in (owner/repo)
        #[arg(long)]
        source_repo: String,
        /// File the change happened in
        #[arg(long)]
        source_file: String,
        /// Changed dependency as name:kind[:action], repeatable
        #[arg(long = "dep", required = true)]
        dependencies: Vec<Dependency>,
        /// Repositories to scan (owner/repo), repeatable
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
        /// Output the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Download repositories into the local cache
    Cache {
        /// Repositories to cache (owner/repo), repeatable
        #[arg(long = "repo", required = true)]
        repos: Vec<String>,
        /// Re-download even when the cache is still valid
        #[arg(long)]
        force: bool,
    },
    /// Show cache statistics
    Stats,
    /// Delete cached content
    Clear {
        /// Only clear this repository (owner/repo); default clears everything
        #[arg(long)]
        repo: Option<String>,
    },
    /// Force re-download repositories regardless of cache validity
    Refresh {
        /// Repositories to refresh (owner/repo), repeatable
        #[arg(long = "repo", required = true)]
        repos: Vec<String>,
    },
    /// Report which cached repositories are still valid
    Validate,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let config = Config::load(&cwd);

    match cli.command {
        Commands::Scan {
            source_repo,
            source_file,
            dependencies,
            targets,
            json,
        } => cmd_scan(&config, source_repo, source_file, dependencies, targets, json),
        Commands::Cache { repos, force } => cmd_cache(&config, repos, force),
        Commands::Stats => cmd_stats(&config),
        Commands::Clear { repo } => cmd_clear(&config, repo),
        Commands::Refresh { repos } => cmd_cache(&config, repos, true),
        Commands::Validate => cmd_validate(&config),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}

fn open_store(config: &Config) -> Result<Arc<Store>> {
    let store = Store::open(config.cache_dir(), config.cache_ttl())
        .with_context(|| format!("cannot open cache at {}", config.cache_dir().display()))?;
    Ok(Arc::new(store))
}

fn build_fetcher(config: &Config, fetch: FetchConfig) -> Result<Arc<Fetcher>> {
    let token = config::github_token()
        .context("no host token found; set RELENS_GITHUB_TOKEN or GITHUB_TOKEN")?;
    let host = Arc::new(GithubClient::new(token));
    let limiter = Arc::new(RateLimiter::new(
        config.max_calls_per_window(),
        config.quota_window(),
    ));
    Ok(Arc::new(Fetcher::new(host, limiter, fetch)))
}

fn analysis_fetch_config(config: &Config) -> FetchConfig {
    let mut fetch = FetchConfig::for_analysis(config.scan_max_file_size());
    fetch.file_delay = config.file_delay();
    fetch.batch_delay = config.batch_delay();
    fetch.batch_size = config.download_batch_size();
    fetch
}

fn cache_fetch_config(config: &Config) -> FetchConfig {
    let mut fetch = FetchConfig::for_cache(config.cache_max_file_size());
    fetch.file_delay = config.file_delay();
    fetch.batch_delay = config.batch_delay();
    fetch.batch_size = config.download_batch_size();
    fetch
}

fn cmd_scan(
    config: &Config,
    source_repo: String,
    source_file: String,
    dependencies: Vec<Dependency>,
    targets: Vec<String>,
    json: bool,
) -> Result<()> {
    let api_key = config::assessor_api_key()
        .context("no assessor key found; set RELENS_ASSESSOR_API_KEY or GEMINI_API_KEY")?;

    let store = open_store(config)?;
    let fetcher = build_fetcher(config, analysis_fetch_config(config))?;
    let assessor = Arc::new(HttpAssessor::new(config.assessor_endpoint(), api_key));
    let options = ScanOptions {
        batch_size: config.scan_batch_size(),
        max_workers: config.scan_workers(),
        repo_timeout: config.repo_timeout(),
        snippet_limit: config.snippet_limit(),
        max_assessor_calls: config.max_assessor_calls,
    };

    let scanner = Scanner::new(store, fetcher, assessor, options);
    let result = runtime()?.block_on(scanner.scan(
        &source_repo,
        &source_file,
        &dependencies,
        &targets,
    ));

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", render_scan_text(&result));
    }
    Ok(())
}

fn cmd_cache(config: &Config, repos: Vec<String>, force: bool) -> Result<()> {
    let store = open_store(config)?;
    let fetcher = build_fetcher(config, cache_fetch_config(config))?;
    let mirror = Arc::new(Mirror::new(
        store,
        fetcher,
        MirrorOptions {
            workers: config.cache_workers(),
            repo_timeout: config.cache_repo_timeout(),
        },
    ));

    let progress = ProgressBar::new(repos.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] caching repositories")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    progress.enable_steady_tick(std::time::Duration::from_millis(120));

    let outcomes = runtime()?.block_on(async {
        let outcomes = mirror.download_many(&repos, force).await;
        progress.finish_and_clear();
        outcomes
    });

    let mut failures = 0;
    for (repo, outcome) in &outcomes {
        match outcome {
            MirrorOutcome::Fresh { files } => {
                println!("{} {repo} ({files} files, cache valid)", "fresh".green());
            }
            MirrorOutcome::Downloaded { files } => {
                println!("{} {repo} ({files} files)", "cached".green());
            }
            MirrorOutcome::Failed => {
                failures += 1;
                println!("{} {repo}", "failed".red());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} repositories failed to cache", repos.len());
    }
    Ok(())
}

fn cmd_stats(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;

    println!(
        "{}: {} repositories, {} files, {}",
        "cache".bold(),
        stats.repository_count,
        stats.file_count,
        format_bytes(stats.total_size_bytes)
    );
    for repo in &stats.repositories {
        let status = if repo.valid {
            "valid".green()
        } else {
            "stale".yellow()
        };
        let cached = repo
            .cached_at
            .map(format_timestamp)
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {} {} ({} files, {}, cached {})",
            status,
            repo.repo.cyan(),
            repo.file_count,
            format_bytes(repo.size_bytes),
            cached
        );
    }
    Ok(())
}

fn cmd_clear(config: &Config, repo: Option<String>) -> Result<()> {
    let store = open_store(config)?;
    store.clear(repo.as_deref())?;
    match repo {
        Some(repo) => println!("cleared cache for {repo}"),
        None => println!("cleared entire cache"),
    }
    Ok(())
}

fn cmd_validate(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let stats = store.stats()?;

    if stats.repositories.is_empty() {
        println!("cache is empty");
        return Ok(());
    }
    for repo in &stats.repositories {
        let status = if repo.valid {
            "valid".green()
        } else {
            "stale".yellow()
        };
        println!("{} {}", status, repo.repo);
    }
    let stale = stats.repositories.iter().filter(|r| !r.valid).count();
    if stale > 0 {
        println!(
            "{stale} stale repositor{}; run `relens refresh` to re-download",
            if stale == 1 { "y" } else { "ies" }
        );
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

fn format_timestamp(unix_secs: u64) -> String {
    DateTime::<Utc>::from_timestamp(unix_secs as i64, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}
