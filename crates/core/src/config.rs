use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub crawl: CrawlConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrawlConfig {
    /// Pool bound: maximum in-flight obtainer invocations (spec §4.4, §6 `--concurrency`).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Wall-clock bound per obtainer invocation before the supervisor kills
    /// the worker (spec §4.2).
    #[serde(default = "default_obtainer_timeout")]
    pub obtainer_execution_timeout_secs: u64,
    /// Above this duration a completion is stamped with the "too slow"
    /// sentinel (spec §4.1 step 3, §6 `--max_duration`).
    #[serde(default = "default_max_response_duration")]
    pub max_response_duration_secs: f64,
    /// How long the supervisor waits after a polite termination signal
    /// before escalating to a forceful kill, and again after that before
    /// giving up (spec §4.2 kill protocol, parameter `T`).
    #[serde(default = "default_kill_grace")]
    pub kill_grace_secs: u64,
    /// Retries per obtainer call before the URL is abandoned (spec §4.2).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub obtainer: crate::types::ObtainerKind,
    /// Accepted for compatibility; sitemap writing is performed by the
    /// inspection service, not this crate (spec §6).
    #[serde(default = "default_sitemap")]
    pub sitemap: String,
}

impl Default for crate::types::ObtainerKind {
    fn default() -> Self {
        crate::types::ObtainerKind::Headless
    }
}

fn default_concurrency() -> usize {
    1
}
fn default_obtainer_timeout() -> u64 {
    30
}
fn default_max_response_duration() -> f64 {
    6.0
}
fn default_kill_grace() -> u64 {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "sitecrawl/0.1".to_string()
}
fn default_sitemap() -> String {
    "sitemap.xml".to_string()
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            obtainer_execution_timeout_secs: default_obtainer_timeout(),
            max_response_duration_secs: default_max_response_duration(),
            kill_grace_secs: default_kill_grace(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            obtainer: crate::types::ObtainerKind::Headless,
            sitemap: default_sitemap(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file.
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "crawl.sqlite".to_string(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            crawl: CrawlConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}
