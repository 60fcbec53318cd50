use anyhow::Result;

mod cli;

fn main() -> Result<()> {
    // Log to stderr to keep stdout clean for JSON output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relens=info".into()),
        )
        .init();
    cli::run()
}
