//! File discovery against an in-memory host.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockHost;
use relens::discovery::Discovery;
use relens::fetcher::{FetchConfig, Fetcher, RateLimiter};

fn fetcher(host: MockHost) -> Fetcher {
    Fetcher::new(
        Arc::new(host),
        Arc::new(RateLimiter::new(4000, Duration::from_secs(3600))),
        FetchConfig::for_analysis(500_000),
    )
}

#[tokio::test(start_paused = true)]
async fn test_empty_search_falls_back_to_traversal_with_partition() {
    let host = MockHost::new()
        .with_file("acme/web", "src/main.py", "entry")
        .with_file("acme/web", "src/models/user.py", "model")
        .with_file("acme/web", "src/routes.js", "routing")
        .with_file("acme/web", "notes.txt", "not code")
        .with_empty_search();
    let fetcher = fetcher(host);

    let listing = Discovery::new(&fetcher).list_files("acme/web").await;

    // Every traversed file with an allowed extension lands in exactly one
    // partition; the txt file in neither. Traversal output is sorted.
    assert_eq!(listing.priority, vec!["src/main.py", "src/routes.js"]);
    assert_eq!(listing.regular, vec!["src/models/user.py"]);
    assert_eq!(
        listing.into_ordered(),
        vec!["src/main.py", "src/routes.js", "src/models/user.py"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_search_results_skip_traversal_and_keep_partition() {
    let host = MockHost::new()
        .with_file("acme/web", "lib/service.py", "service")
        .with_file("acme/web", "lib/helpers.py", "helpers");
    let fetcher = fetcher(host);

    let listing = Discovery::new(&fetcher).list_files("acme/web").await;

    assert_eq!(listing.priority, vec!["lib/service.py"]);
    assert_eq!(listing.regular, vec!["lib/helpers.py"]);
}
