mod cli;
mod crawl;
mod report;

use std::io::Read;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// Use mimalloc to prevent memory bloat under sustained concurrent fetches.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use sitecrawl_core::types::ObtainRequest;
use sitecrawl_core::AppConfig;

use crate::cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Obtain) = &cli.command {
        // The hidden worker entrypoint is meant to be a short-lived,
        // isolated process, not a participant in the async scheduler.
        return run_obtain();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;

    if let Some(n) = cli.concurrency {
        config.crawl.concurrency = n;
    }
    if let Some(d) = cli.max_duration {
        config.crawl.max_response_duration_secs = d;
    }
    if let Some(ua) = cli.useragent {
        config.crawl.user_agent = ua;
    }
    config.crawl.sitemap = cli.sitemap;

    match cli.command {
        Some(Commands::Report { db, start_url }) => {
            report::run(&db, &start_url).await?;
        }
        Some(Commands::Obtain) => unreachable!("handled before the runtime was built"),
        None => {
            let Some(start_url) = cli.url else {
                eprintln!("error: missing required argument <URL>");
                std::process::exit(1);
            };
            if let Err(e) = crawl::run(config, start_url).await {
                eprintln!("fatal: {e}");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Worker entrypoint (spec §4.1/§4.2 expansion): read one `ObtainRequest` as
/// JSON from stdin, run the selected Obtainer, write the resulting
/// `FetchResult` as one JSON line to stdout. `sitecrawl-supervisor` re-execs
/// the current binary into this subcommand to get real process isolation
/// for the (single-threaded, non-reentrant) headless browser.
fn run_obtain() -> Result<()> {
    let mut input = String::new();
    std::io::stdin().read_to_string(&mut input)?;
    let request: ObtainRequest = serde_json::from_str(input.trim())?;

    let obtainer = sitecrawl_obtainer::build(request.obtainer);
    let result = obtainer.obtain(
        &request.url,
        &request.parent,
        &request.user_agent,
        request.max_response_duration_secs,
    );

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
