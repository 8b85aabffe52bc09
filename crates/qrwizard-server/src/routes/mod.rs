use axum::http::HeaderMap;
use chrono::NaiveDateTime;

pub mod analytics;
pub mod bulk;
pub mod conversions;
pub mod export;
pub mod goals;
pub mod health;
pub mod links;
pub mod redirect;
pub mod retention;

/// Extract the client IP: the first `X-Forwarded-For` entry when present.
/// Callers treat `None` as "no usable address" — the hash and fingerprint
/// pipelines degrade gracefully.
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse an ISO-8601 timestamp, tolerating an optional `Z`/offset suffix and
/// a bare date. All stored times are naive UTC.
pub(crate) fn parse_iso_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt);
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

/// Trim a free-text field, collapse empties to None, cap at `max_len` chars.
pub(crate) fn pick_text(value: Option<&str>, max_len: usize) -> Option<String> {
    let trimmed = value?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_len).collect())
}

/// Lenient boolean coercion for JSON payloads: accepts booleans, numbers,
/// and truthy strings (`1`, `true`, `yes`, `on`).
pub(crate) fn to_bool(value: Option<&serde_json::Value>, default: bool) -> bool {
    match value {
        None | Some(serde_json::Value::Null) => default,
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_i64().map(|v| v != 0).unwrap_or(default),
        Some(serde_json::Value::String(s)) => to_bool_str(s, default),
        Some(_) => default,
    }
}

pub(crate) fn to_bool_str(raw: &str, default: bool) -> bool {
    let lowered = raw.trim().to_lowercase();
    if lowered.is_empty() {
        return default;
    }
    matches!(lowered.as_str(), "1" | "true" | "yes" | "on")
}

/// Keep only filename-safe characters of a link name:
/// alphanumerics, space, `-`, `_`; spaces become underscores.
pub(crate) fn safe_file_stem(name: Option<&str>) -> String {
    name.unwrap_or("")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim()
        .replace(' ', "_")
}
