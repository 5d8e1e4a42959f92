//! Per-agent validation rules, applied by the call layer to the parsed
//! object inside the attempt loop.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::llm::{RuleEnv, RuleViolation};
use crate::logging::{LogLevel, LogRecord, LogSink};

pub const KEYWORD_COUNT: usize = 7;
pub const KEYWORD_MAX_CHARS: usize = 50;
pub const DESCRIPTION_MAX_CHARS: usize = 4000;
pub const SERIES_ARC_MIN_ENTRIES: usize = 3;

static BISAC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}\d{6}$").expect("valid BISAC regex"));

/// Exactly seven phrases; over-long phrases are trimmed and truncated in
/// place, a wrong count burns the attempt.
pub fn keywords(value: &mut Value, _env: &RuleEnv<'_>) -> Result<(), RuleViolation> {
    let Some(list) = value.get_mut("keywords").and_then(Value::as_array_mut) else {
        return Err(RuleViolation::Retryable(
            "`keywords` is not an array".to_string(),
        ));
    };

    for entry in list.iter_mut() {
        if let Some(text) = entry.as_str() {
            let trimmed = text.trim();
            let shortened: String = trimmed.chars().take(KEYWORD_MAX_CHARS).collect();
            *entry = Value::String(shortened);
        }
    }

    if list.len() != KEYWORD_COUNT {
        return Err(RuleViolation::Retryable(format!(
            "expected exactly {KEYWORD_COUNT} keywords, got {}",
            list.len()
        )));
    }
    Ok(())
}

/// BISAC codes that fail the pattern are logged, never rejected.
pub fn categories(value: &mut Value, env: &RuleEnv<'_>) -> Result<(), RuleViolation> {
    let check = |code: Option<&str>, slot: &str| {
        if let Some(code) = code {
            if !BISAC_RE.is_match(code) {
                env.sink.log(LogRecord::new(
                    LogLevel::Warn,
                    env.agent,
                    format!("{slot} code `{code}` does not look like a BISAC code"),
                ));
            }
        }
    };

    check(value.pointer("/primary/code").and_then(Value::as_str), "primary");
    check(
        value.pointer("/secondary/code").and_then(Value::as_str),
        "secondary",
    );
    if let Some(alternatives) = value.get("alternatives").and_then(Value::as_array) {
        for (index, alternative) in alternatives.iter().enumerate() {
            check(
                alternative.get("code").and_then(Value::as_str),
                &format!("alternative[{index}]"),
            );
        }
    }
    Ok(())
}

/// Retail pages cap the long form at 4000 characters; clip rather than
/// reject.
pub fn book_description(value: &mut Value, env: &RuleEnv<'_>) -> Result<(), RuleViolation> {
    if let Some(long) = value.get("long").and_then(Value::as_str) {
        if long.chars().count() > DESCRIPTION_MAX_CHARS {
            let mut clipped: String = long.chars().take(DESCRIPTION_MAX_CHARS - 3).collect();
            clipped.push_str("...");
            env.sink.log(LogRecord::new(
                LogLevel::Warn,
                env.agent,
                format!(
                    "long description exceeded {DESCRIPTION_MAX_CHARS} characters; truncated"
                ),
            ));
            value["long"] = Value::String(clipped);
        }
    }
    Ok(())
}

/// A series arc under three entries is useless to marketing; no retry will
/// conjure books that were never described.
pub fn series_description(value: &mut Value, _env: &RuleEnv<'_>) -> Result<(), RuleViolation> {
    let entries = value
        .get("bookByBookArc")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    if entries < SERIES_ARC_MIN_ENTRIES {
        return Err(RuleViolation::Terminal(format!(
            "bookByBookArc has {entries} entries, need at least {SERIES_ARC_MIN_ENTRIES}"
        )));
    }
    Ok(())
}
