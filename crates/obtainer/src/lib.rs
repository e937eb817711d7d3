//! Obtainer implementations (spec §4.1): turn `(url, parent, user_agent)`
//! into a `FetchResult`. Both implementations here are synchronous and make
//! no assumption about the caller's address space — the contract requires
//! that they be safe to run inside a freshly spawned, isolated process,
//! which is exactly how `sitecrawl-supervisor` uses them (via the `obtain`
//! worker entrypoint in the root binary).

mod headless;
mod r#static;

use std::time::{Duration, Instant};

use sitecrawl_core::types::{sentinel, FetchResult, ObtainerKind};

pub use headless::HeadlessObtainer;
pub use r#static::StaticObtainer;

/// `Obtain(url, parent, user_agent) -> FetchResult` (spec §4.1 contract).
pub trait Obtainer: Send + Sync {
    fn obtain(&self, url: &str, parent: &str, user_agent: &str, max_response_duration_secs: f64)
        -> FetchResult;
}

/// Construct the Obtainer named by `kind` (spec §4.1's "pluggable" clause).
pub fn build(kind: ObtainerKind) -> Box<dyn Obtainer> {
    match kind {
        ObtainerKind::Headless => Box::new(HeadlessObtainer),
        ObtainerKind::Static => Box::new(StaticObtainer),
    }
}

/// Shared "plain GET" step (spec §4.1 step 1), common to every obtainer.
struct PlainGet {
    status: i32,
    reason: String,
    size: u64,
    content_type_header: Option<String>,
    body: Vec<u8>,
    duration: Duration,
}

fn plain_get(url: &str, user_agent: &str) -> Result<PlainGet, String> {
    let client = reqwest::blocking::Client::builder()
        .danger_accept_invalid_certs(true)
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(|e| e.to_string())?;

    let start = Instant::now();
    let resp = client
        .get(url)
        .header("User-Agent", user_agent)
        .send()
        .map_err(|e| e.to_string())?;

    let status = resp.status().as_u16() as i32;
    let reason = resp
        .status()
        .canonical_reason()
        .unwrap_or("")
        .to_string();
    let content_type_header = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = resp.bytes().map_err(|e| e.to_string())?.to_vec();
    let duration = start.elapsed();

    Ok(PlainGet {
        status,
        reason,
        size: body.len() as u64,
        content_type_header,
        body,
        duration,
    })
}

/// Apply the two response-code overrides that every obtainer implementation
/// shares, in spec §4.1's own order: too-slow (step 3, code 900, applied
/// uniformly regardless of content type per spec §9's Open Question
/// resolution) *then* missing Content-Type (step 4, code 904) last, so a
/// response that is both slow and missing a Content-Type header ends up
/// stamped 904 — the spec lists these as sequential overwrites, and the
/// later one must win.
fn finish(
    get: PlainGet,
    max_response_duration_secs: f64,
    mut response_code: i32,
    mut response_reason: String,
) -> (i32, String, String, f64) {
    let response_content_type = get
        .content_type_header
        .clone()
        .unwrap_or_else(|| "unknown".to_string());

    let duration_secs = get.duration.as_secs_f64();
    if duration_secs > max_response_duration_secs {
        response_code = sentinel::TOO_SLOW;
        response_reason = format!("too slow response ({duration_secs:.2}s)");
    }

    if get.content_type_header.is_none() {
        response_code = sentinel::NO_CONTENT_TYPE;
        response_reason = "missing content-type".to_string();
    }

    (response_code, response_reason, response_content_type, duration_secs)
}

fn process_name() -> String {
    format!("worker-{}", std::process::id())
}
