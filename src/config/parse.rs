//! Value coercion shared by the config layers.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

static LIST_DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[,;\n]+").expect("static regex"));

static PROVIDER_LIST_DELIMITERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s,]+").expect("static regex"));

/// Parse `raw` as JSON only when it looks like an object or array.
pub fn parse_json_maybe(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        serde_json::from_str(trimmed).ok()
    } else {
        None
    }
}

/// Split on commas, semicolons or newlines, trimming and dropping blanks.
pub fn split_delimited(raw: &str) -> Vec<String> {
    LIST_DELIMITERS
        .split(raw)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Provider name list from `DEFAULT_PROVIDERS`: whitespace or comma separated, lower-cased.
pub fn split_provider_list(raw: &str) -> Vec<String> {
    PROVIDER_LIST_DELIMITERS
        .split(raw)
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Order-preserving dedup that also trims and drops empty entries.
pub fn dedup_trimmed<I>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .collect()
}

/// Credential pool from a JSON array or a delimiter-separated string.
///
/// Entries are trimmed, stripped of a leading `ui=` marker, deduplicated in
/// first-seen order, and blanks are discarded.
pub fn parse_cookies(raw: &str) -> Vec<String> {
    let text = raw.trim();
    if text.is_empty() {
        return Vec::new();
    }
    let entries = match parse_json_maybe(text) {
        Some(Value::Array(items)) => items.iter().filter_map(scalar_string).collect(),
        _ => split_delimited(text),
    };
    normalize_cookies(entries)
}

/// Cookie normalization for values that are already a list.
pub fn normalize_cookies<I>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    dedup_trimmed(entries.into_iter().map(|c| {
        let trimmed = c.trim();
        trimmed.strip_prefix("ui=").unwrap_or(trimmed).to_string()
    }))
}

/// Read a cookie pool from whatever shape a layer supplied.
pub fn cookies_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => normalize_cookies(items.iter().filter_map(scalar_string)),
        Value::String(s) => parse_cookies(s),
        _ => Vec::new(),
    }
}

/// Strings, numbers and booleans as text; everything else is skipped.
pub fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Non-empty string view of a value.
pub fn non_empty_string(value: Option<&Value>) -> Option<String> {
    value
        .and_then(scalar_string)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Coerce a layer value into a boolean.
///
/// Returns `None` when the value is present but not recognizably boolean.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
