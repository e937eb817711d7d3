use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Sentinel `response_code` values for failures that never reach an HTTP
/// status line. Any other value in `FetchResult::response_code` is a real
/// HTTP status.
pub mod sentinel {
    pub const TOO_SLOW: i32 = 900;
    /// Plain GET failed (DNS/connection error) before any obtainer-specific
    /// step ran — neither a browser nor any other obtainer-specific path was
    /// ever reached. Not in spec.md's literal closed sentinel set; added to
    /// avoid mislabeling a pre-obtainer network failure as a browser
    /// exception (see DESIGN.md).
    pub const FETCH_FAILED: i32 = 901;
    pub const BROWSER_NETWORK: i32 = 902;
    pub const BROWSER_OTHER: i32 = 903;
    pub const NO_CONTENT_TYPE: i32 = 904;
}

/// Strip the fragment from a URL string. Two URLs are the same crawl target
/// iff their fragment-stripped form is byte-equal (spec: URL identity).
pub fn strip_fragment(url: &str) -> String {
    match url.split_once('#') {
        Some((before, _)) => before.to_string(),
        None => url.to_string(),
    }
}

/// What one obtainer invocation produces for a single URL.
///
/// This is the unit of work that crosses the process boundary between a
/// worker and the scheduler: the worker serializes it to stdout as JSON,
/// the supervisor reads it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResult {
    pub url: String,
    pub parent_url: String,
    pub duration: f64,
    pub response_code: i32,
    pub response_reason: String,
    pub response_size: u64,
    pub response_content_type: String,
    pub links: BTreeSet<String>,
    pub process_name: String,
}

/// What a worker reads from stdin to know what to fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObtainRequest {
    pub url: String,
    pub parent: String,
    pub user_agent: String,
    pub obtainer: ObtainerKind,
    pub max_response_duration_secs: f64,
}

/// Which Obtainer implementation a worker should run. The contract
/// (`Obtain(url, parent, user_agent) -> FetchResult`) is identical for both;
/// this only selects *how* links are discovered (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ObtainerKind {
    /// Headless-browser rendering: subresource interception + DOM query.
    Headless,
    /// Static HTML parse: anchor tags only, no JavaScript execution.
    Static,
}

impl std::fmt::Display for ObtainerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObtainerKind::Headless => write!(f, "headless"),
            ObtainerKind::Static => write!(f, "static"),
        }
    }
}

impl std::str::FromStr for ObtainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "headless" => Ok(ObtainerKind::Headless),
            "static" => Ok(ObtainerKind::Static),
            other => Err(format!("unknown obtainer kind: {other}")),
        }
    }
}

/// A persisted link row (spec §6 logical schema), mirroring `FetchResult`
/// plus the crawl-partitioning `start_url` and the `date` it was written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRow {
    pub start_url: String,
    pub url: String,
    pub parent: String,
    pub duration_ms: i64,
    pub size: i64,
    pub content_type: String,
    pub response_code: i32,
    pub response_reason: String,
    pub date: chrono::DateTime<chrono::Utc>,
}

impl LinkRow {
    pub fn from_result(result: &FetchResult, start_url: &str) -> Self {
        Self {
            start_url: start_url.to_string(),
            url: result.url.clone(),
            parent: result.parent_url.clone(),
            duration_ms: (result.duration * 1000.0).round() as i64,
            size: result.response_size as i64,
            content_type: result.response_content_type.clone(),
            response_code: result.response_code,
            response_reason: result.response_reason.clone(),
            date: chrono::Utc::now(),
        }
    }
}
