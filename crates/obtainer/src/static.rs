use std::collections::BTreeSet;

use sitecrawl_core::types::FetchResult;
use url::Url;

use crate::{finish, plain_get, process_name, Obtainer};

/// Plain-HTTP obtainer: one GET, then (if the body is HTML) a `scraper`
/// parse for `<a href>`. No JavaScript is ever executed, so a page whose
/// links are assembled client-side will look link-less here — that's the
/// tradeoff against `HeadlessObtainer` (spec §4.1's "pluggable alternative").
pub struct StaticObtainer;

impl Obtainer for StaticObtainer {
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
        let links = if is_html {
            match Url::parse(url) {
                Ok(base) => {
                    let body = String::from_utf8_lossy(&get.body);
                    sitecrawl_parser::extract_links(&body, &base)
                }
                Err(_) => BTreeSet::new(),
            }
        } else {
            BTreeSet::new()
        };

        let status = get.status;
        let reason = get.reason.clone();
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

/// The plain GET failed before any obtainer-specific step — `StaticObtainer`
/// never touches a browser, so this is never a browser exception (code 902).
fn network_failure(url: &str, parent: &str, reason: &str) -> FetchResult {
    FetchResult {
        url: url.to_string(),
        parent_url: parent.to_string(),
        duration: 0.0,
        response_code: sitecrawl_core::types::sentinel::FETCH_FAILED,
        response_reason: reason.to_string(),
        response_size: 0,
        response_content_type: "unknown".to_string(),
        links: BTreeSet::new(),
        process_name: process_name(),
    }
}
