//! Sanitization of execution output before it reaches a caller

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};

/// Default cap on serialized output size, in bytes
pub const DEFAULT_MAX_OUTPUT_LENGTH: usize = 10_000;

/// Field names that may carry credentials or other secrets
static SENSITIVE_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(password|passwd|secret|token|api[_-]?key|credential|authorization|auth|private[_-]?key|access[_-]?key|cookie|session[_-]?id)",
    )
    .unwrap()
});

/// Whether a field name matches a known sensitive pattern
pub fn is_sensitive_key(key: &str) -> bool {
    SENSITIVE_KEY_PATTERN.is_match(key)
}

/// Strip sensitive fields, then cap the serialized size at `max_length` bytes
pub fn sanitize_output(output: &Value, max_length: usize) -> Value {
    let stripped = strip_sensitive(output);
    let serialized = stripped.to_string();

    if serialized.len() <= max_length {
        return stripped;
    }

    let preview: String = serialized.chars().take(max_length).collect();
    let preview = truncate_to_bytes(preview, max_length);

    json!({
        "truncated": true,
        "originalLength": serialized.len(),
        "preview": preview,
    })
}

fn strip_sensitive(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !is_sensitive_key(key))
                .map(|(key, value)| (key.clone(), strip_sensitive(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_sensitive).collect()),
        other => other.clone(),
    }
}

fn truncate_to_bytes(mut text: String, max_bytes: usize) -> String {
    while text.len() > max_bytes {
        text.pop();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_key_patterns() {
        for key in [
            "password",
            "apiKey",
            "api_key",
            "X-API-KEY",
            "accessToken",
            "client_secret",
            "credentials",
            "Authorization",
            "privateKey",
            "sessionId",
        ] {
            assert!(is_sensitive_key(key), "{} should be sensitive", key);
        }

        for key in ["url", "status", "items", "name", "count"] {
            assert!(!is_sensitive_key(key), "{} should not be sensitive", key);
        }
    }

    #[test]
    fn test_strips_nested_sensitive_fields() {
        let output = json!({
            "status": 200,
            "token": "abc",
            "body": {
                "user": "ada",
                "password": "hunter2",
                "items": [{ "id": 1, "apiKey": "k" }, { "id": 2 }]
            }
        });

        let sanitized = sanitize_output(&output, DEFAULT_MAX_OUTPUT_LENGTH);

        assert_eq!(
            sanitized,
            json!({
                "status": 200,
                "body": {
                    "user": "ada",
                    "items": [{ "id": 1 }, { "id": 2 }]
                }
            })
        );
    }

    #[test]
    fn test_small_output_untouched() {
        let output = json!({ "ok": true, "values": [1, 2, 3] });
        assert_eq!(sanitize_output(&output, 100), output);
    }

    #[test]
    fn test_truncates_large_output() {
        let output = json!({ "data": "x".repeat(500) });
        let sanitized = sanitize_output(&output, 64);

        assert_eq!(sanitized["truncated"], true);
        assert_eq!(sanitized["originalLength"], output.to_string().len());
        assert!(sanitized["preview"].as_str().unwrap().len() <= 64);
    }

    #[test]
    fn test_truncation_is_char_safe() {
        let output = json!({ "data": "é".repeat(200) });
        let sanitized = sanitize_output(&output, 33);
        let preview = sanitized["preview"].as_str().unwrap();

        assert!(preview.len() <= 33);
        assert!(preview.starts_with("{\"data\":\""));
    }

    #[test]
    fn test_secrets_stripped_before_truncation() {
        let output = json!({ "secret": "s".repeat(1000), "ok": true });
        let sanitized = sanitize_output(&output, 100);
        assert_eq!(sanitized, json!({ "ok": true }));
    }
}
