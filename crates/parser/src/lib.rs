//! Static HTML parsing: pulls the outbound link set and content metadata out
//! of a page body without executing any JavaScript. Used directly by the
//! static obtainer (spec §4.1's pluggable alternative) and by the headless
//! obtainer's own DOM-evaluated-href absoluteness check.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Matches spec §4.1's "absolute-URL pattern (scheme + host + optional
/// port + path)" requirement for filtering extracted `href`s.
static ABSOLUTE_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[a-z0-9.-]+(:\d+)?(/.*)?$").expect("static regex is valid")
});

/// True if `candidate` looks like an absolute http(s) URL (scheme, host,
/// optional port, optional path) rather than a relative path or a
/// javascript:/mailto:/data: pseudo-URL.
pub fn is_absolute_url(candidate: &str) -> bool {
    ABSOLUTE_URL_RE.is_match(candidate)
}

/// Extract every resolvable, absolute outbound link from an HTML document.
/// Anchors with non-crawlable schemes (`javascript:`, `mailto:`, `tel:`,
/// `data:`) or empty/fragment-only hrefs are skipped. Relative hrefs are
/// resolved against `base_url` before being tested for absoluteness.
pub fn extract_links(html: &str, base_url: &Url) -> BTreeSet<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return BTreeSet::new();
    };

    document
        .select(&selector)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.is_empty()
                || href.starts_with('#')
                || href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("data:")
            {
                return None;
            }
            let resolved = base_url.join(href).ok()?.to_string();
            is_absolute_url(&resolved).then_some(resolved)
        })
        .collect()
}

/// The page title, if present — used only for the `report` CLI summary.
pub fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// True if `content_type` (a raw `Content-Type` header value) names HTML.
/// A missing header is not HTML (spec §7 sentinel 904 applies instead).
pub fn is_html_content_type(content_type: Option<&str>) -> bool {
    content_type
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://example.test/dir/page.html").unwrap()
    }

    #[test]
    fn extracts_absolute_and_relative_links() {
        let html = r#"
            <a href="/a">a</a>
            <a href="http://example.test/b">b</a>
            <a href="http://other.test/c">c</a>
            <a href="javascript:void(0)">skip</a>
            <a href="#top">skip</a>
            <a href="mailto:x@example.test">skip</a>
        "#;
        let links = extract_links(html, &base());
        assert!(links.contains("http://example.test/a"));
        assert!(links.contains("http://example.test/b"));
        assert!(links.contains("http://other.test/c"));
        assert_eq!(links.len(), 3);
    }

    #[test]
    fn absolute_url_matcher_rejects_relative() {
        assert!(is_absolute_url("https://example.test/path"));
        assert!(is_absolute_url("http://example.test:8080/path"));
        assert!(!is_absolute_url("/relative/path"));
        assert!(!is_absolute_url("javascript:void(0)"));
    }

    #[test]
    fn content_type_sniffing() {
        assert!(is_html_content_type(Some("text/html; charset=utf-8")));
        assert!(!is_html_content_type(Some("application/json")));
        assert!(!is_html_content_type(None));
    }

    #[test]
    fn title_extraction() {
        assert_eq!(
            extract_title("<html><head><title> Hi </title></head></html>"),
            Some("Hi".to_string())
        );
        assert_eq!(extract_title("<html></html>"), None);
    }
}
