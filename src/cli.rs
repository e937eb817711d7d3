use clap::{Parser, Subcommand};

/// Single-site crawler (spec §6): crawl `url`, recording HTTP metadata and
/// the outbound-link graph of every page reachable under it.
#[derive(Parser)]
#[command(name = "sitecrawl", version, about = "Single-site crawler and link auditor")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Absolute http/https URL to crawl. Required unless a subcommand is
    /// given (exit code 1 if missing).
    pub url: Option<String>,

    /// Maximum number of obtainer invocations in flight at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Advisory slow-response bound, in seconds, used by obtainers (spec
    /// §4.1 step 3).
    #[arg(long)]
    pub max_duration: Option<f64>,

    /// User-Agent header sent by obtainers.
    #[arg(long)]
    pub useragent: Option<String>,

    /// Accepted for compatibility; sitemap writing is performed by the
    /// separate inspection service, not this crate.
    #[arg(long, default_value = "sitemap.xml")]
    pub sitemap: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hidden worker entrypoint: reads an `ObtainRequest` as one JSON line on
    /// stdin, runs the selected Obtainer, and writes the resulting
    /// `FetchResult` as one JSON line on stdout. The Worker Supervisor
    /// re-execs into this subcommand to get real process isolation; it is
    /// not meant to be invoked by hand.
    #[command(hide = true)]
    Obtain,
    /// Print page/link/dead-link counts for a previously crawled site.
    Report {
        /// Path to the sqlite database written by a prior crawl.
        #[arg(long, default_value = "crawl.sqlite")]
        db: String,

        /// Restrict the report to one crawl's start_url.
        #[arg(long)]
        start_url: String,
    },
}
