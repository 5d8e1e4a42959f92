use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCED_JSON_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)```").expect("valid fenced-json regex"));

static FENCED_ANY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```\s*(.*?)```").expect("valid fenced-block regex"));

static TRAILING_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing-comma regex"));

static BARE_KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([{,]\s*)([A-Za-z_][A-Za-z0-9_]*)\s*:"#).expect("valid bare-key regex")
});

/// Pull the model's JSON object out of its reply text.
///
/// Candidates are tried in order: a ```json fenced block, any fenced block,
/// then the widest `{ ... }` span. Each candidate is parsed as-is first and,
/// failing that, after repair (trailing commas stripped, bare identifier
/// keys quoted). Only top-level objects count; a bare array or scalar is not
/// an agent artifact.
pub fn extract_json_object(text: &str) -> Option<Value> {
    for candidate in candidates(text) {
        if let Some(value) = parse_object(&candidate) {
            return Some(value);
        }
        let repaired = repair(&candidate);
        if repaired != candidate {
            if let Some(value) = parse_object(&repaired) {
                return Some(value);
            }
        }
    }
    None
}

fn candidates(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(caps) = FENCED_JSON_RE.captures(text) {
        out.push(caps[1].trim().to_string());
    }
    if let Some(caps) = FENCED_ANY_RE.captures(text) {
        let inner = caps[1].trim();
        // The generic fence may re-match the json fence body with the word
        // "json" still attached.
        let inner = inner.strip_prefix("json").unwrap_or(inner).trim();
        out.push(inner.to_string());
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            out.push(text[start..=end].to_string());
        }
    }
    out
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(value) if value.is_object() => Some(value),
        _ => None,
    }
}

fn repair(candidate: &str) -> String {
    let stripped = TRAILING_COMMA_RE.replace_all(candidate, "$1");
    BARE_KEY_RE
        .replace_all(&stripped, "$1\"$2\":")
        .into_owned()
}
