//! Free-text sanitization.
//!
//! Strips characters and words commonly used to break out of SQL string
//! literals. This only narrows what malformed input can do; the persistence
//! layer must still use parameterized statements.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::security::validator::ValidationSchema;

/// Keywords removed as whole words, case-insensitively.
pub const SQL_KEYWORDS: [&str; 10] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "EXEC", "UNION", "SCRIPT",
];

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"--|/\*|\*/").expect("comment regex is valid"));

static KEYWORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", SQL_KEYWORDS.join("|"))).expect("keyword regex is valid")
});

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace regex is valid"));

/// Sanitize a single string.
pub fn sanitize_str(input: &str) -> String {
    let stripped: String = input
        .chars()
        .filter(|c| !matches!(c, '\'' | '"' | ';' | '\\'))
        .collect();
    let stripped = COMMENT_RE.replace_all(&stripped, " ");
    let stripped = KEYWORD_RE.replace_all(&stripped, " ");
    WHITESPACE_RE.replace_all(stripped.trim(), " ").into_owned()
}

/// Sanitize every string in `value`, recursing into arrays and objects.
pub fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_str(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Sanitize a payload, leaving fields the schema marks sensitive untouched.
pub fn sanitize_payload(payload: &Map<String, Value>, schema: &ValidationSchema) -> Map<String, Value> {
    payload
        .iter()
        .map(|(key, value)| {
            let value = if schema.is_sensitive(key) {
                value.clone()
            } else {
                sanitize_value(value)
            };
            (key.clone(), value)
        })
        .collect()
}
