use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use headless_chrome::browser::tab::{RequestPausedDecision, RequestInterceptor};
use headless_chrome::protocol::cdp::Fetch::events::RequestPausedEvent;
use headless_chrome::{Browser, LaunchOptions};
use sitecrawl_core::types::{sentinel, FetchResult};

use crate::{finish, plain_get, process_name, Obtainer};

/// Reference obtainer (spec §4.1): plain GET first, then — only if the
/// response claims `text/html` — a real Chrome tab renders the page so that
/// client-side-assembled links are visible too. Every subresource request
/// Chrome issues while rendering is folded into `links` alongside the
/// evaluated `<a href>` set, mirroring the original Python implementation's
/// pyppeteer request-interception obtainer.
pub struct HeadlessObtainer;

enum BrowserFailure {
    Network(String),
    Other(String),
}

impl Obtainer for HeadlessObtainer {
    fn obtain(
        &self,
        url: &str,
        parent: &str,
        user_agent: &str,
        max_response_duration_secs: f64,
    ) -> FetchResult {
        let get = match plain_get(url, user_agent) {
            Ok(get) => get,
            Err(e) => return network_failure(url, parent, &e),
        };

        let is_html = sitecrawl_parser::is_html_content_type(get.content_type_header.as_deref());
        let mut status = get.status;
        let mut reason = get.reason.clone();
        let mut links = BTreeSet::new();

        if is_html {
            match render(url, user_agent) {
                Ok(rendered) => links = rendered,
                Err(BrowserFailure::Network(msg)) => {
                    status = sentinel::BROWSER_NETWORK;
                    reason = msg;
                }
                Err(BrowserFailure::Other(msg)) => {
                    status = sentinel::BROWSER_OTHER;
                    reason = msg;
                }
            }
        }

        let size = get.size;
        let (response_code, response_reason, response_content_type, duration) =
            finish(get, max_response_duration_secs, status, reason);

        FetchResult {
            url: url.to_string(),
            parent_url: parent.to_string(),
            duration,
            response_code,
            response_reason,
            response_size: size,
            response_content_type,
            links,
            process_name: process_name(),
        }
    }
}

/// Render `url` in a fresh headless tab, capturing both the set of every
/// subresource request Chrome issues and the DOM-evaluated `<a href>` set.
/// The tab and browser handles are dropped on every exit path — there is no
/// early return that leaves either alive past this function.
fn render(url: &str, user_agent: &str) -> Result<BTreeSet<String>, BrowserFailure> {
    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(false)
        .build()
        .map_err(|e| BrowserFailure::Other(e.to_string()))?;

    let browser = Browser::new(options).map_err(|e| BrowserFailure::Other(e.to_string()))?;
    let tab = browser
        .new_tab()
        .map_err(|e| BrowserFailure::Other(e.to_string()))?;
    tab.set_user_agent(user_agent, None, None)
        .map_err(|e| BrowserFailure::Other(e.to_string()))?;

    let requested: Arc<Mutex<BTreeSet<String>>> = Arc::new(Mutex::new(BTreeSet::new()));
    let sink = requested.clone();
    let interceptor: RequestInterceptor = Arc::new(move |_transport, _session_id, event: RequestPausedEvent| {
        if let Ok(mut seen) = sink.lock() {
            seen.insert(event.params.request.url.clone());
        }
        RequestPausedDecision::Continue(None)
    });
    tab.enable_request_interception(interceptor)
        .map_err(|e| BrowserFailure::Other(e.to_string()))?;

    tab.navigate_to(url).map_err(|e| BrowserFailure::Network(e.to_string()))?;
    tab.wait_until_navigated()
        .map_err(|e| BrowserFailure::Network(e.to_string()))?;

    let anchors = tab
        .evaluate(
            "Array.from(document.querySelectorAll('a[href]')).map(a => a.href)",
            false,
        )
        .map_err(|e| BrowserFailure::Other(e.to_string()))?
        .value
        .and_then(|v| serde_json::from_value::<Vec<String>>(v).ok())
        .unwrap_or_default();

    let mut links = requested
        .lock()
        .map_err(|_| BrowserFailure::Other("request-interception lock poisoned".to_string()))?
        .clone();
    links.extend(
        anchors
            .into_iter()
            .filter(|href| sitecrawl_parser::is_absolute_url(href)),
    );

    Ok(links)
}

/// The plain GET failed before the browser was ever launched — not a
/// browser exception (code 902), which `render`'s own `BrowserFailure::Network`
/// mapping above is reserved for.
fn network_failure(url: &str, parent: &str, reason: &str) -> FetchResult {
    FetchResult {
        url: url.to_string(),
        parent_url: parent.to_string(),
        duration: 0.0,
        response_code: sentinel::FETCH_FAILED,
        response_reason: reason.to_string(),
        response_size: 0,
        response_content_type: "unknown".to_string(),
        links: BTreeSet::new(),
        process_name: process_name(),
    }
}
