use once_cell::sync::Lazy;
use regex::Regex;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

static MESSAGES_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/v\d+/messages/?$").expect("valid messages-suffix regex"));

static VERSION_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/v\d+/?$").expect("valid version-suffix regex"));

/// Normalize a configured base URL (possibly an internal gateway) into the
/// full messages endpoint. Accepts a bare host, a host with `/v1`, or an
/// already-complete endpoint.
pub fn resolve_endpoint(base_url: &str) -> String {
    let trimmed = base_url.trim();
    let base = if trimmed.is_empty() {
        DEFAULT_BASE_URL
    } else {
        trimmed
    };
    let base = base.trim_end_matches('/');

    if MESSAGES_SUFFIX_RE.is_match(base) {
        base.to_string()
    } else if VERSION_SUFFIX_RE.is_match(base) {
        format!("{base}/messages")
    } else {
        format!("{base}/v1/messages")
    }
}
