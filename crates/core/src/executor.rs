//! The seam between the Crawl Scheduler (spec §4.4) and the Worker
//! Supervisor (spec §4.2). Kept as a trait so the scheduler's dispatch,
//! dedup, and persistence logic can be exercised in tests against a fake
//! executor that returns canned `FetchResult`s with no process spawn — the
//! `sitecrawl-supervisor` crate is the only production implementor.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::CrawlError;
use crate::types::{FetchResult, ObtainRequest};

#[async_trait]
pub trait WorkExecutor: Send + Sync {
    /// `RunWithTimeout(obtainer, timeoutSeconds, args...) -> FetchResult |
    /// Error` (spec §4.2 contract).
    async fn run_with_timeout(
        &self,
        request: &ObtainRequest,
        timeout: Duration,
    ) -> Result<FetchResult, CrawlError>;
}
