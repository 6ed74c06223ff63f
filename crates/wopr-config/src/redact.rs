//! Redaction of sensitive configuration values.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const REDACTED: &str = "[redacted]";

fn sensitive_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new("(?i)(apiKey|secret|token|credential)").expect("pattern is valid")
    })
}

/// Whether a config key name is considered sensitive and should be
/// redacted on any read through the management surface.
#[must_use]
pub fn is_sensitive_key(key: &str) -> bool {
    sensitive_key_pattern().is_match(key)
}

/// Return a copy of `value` with every object key matching the sensitive
/// pattern replaced by a fixed redaction marker, recursively.
#[must_use]
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if is_sensitive_key(key) {
                    redacted.insert(key.clone(), Value::String(REDACTED.to_string()));
                } else {
                    redacted.insert(key.clone(), redact(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_matching_leaf_keys() {
        let value = json!({
            "providers": {
                "claude": {
                    "apiKey": "sk-live-123",
                    "model": "opus"
                }
            }
        });
        let redacted = redact(&value);
        assert_eq!(redacted["providers"]["claude"]["apiKey"], json!(REDACTED));
        assert_eq!(redacted["providers"]["claude"]["model"], json!("opus"));
    }

    #[test]
    fn matches_are_case_insensitive_and_substring() {
        assert!(is_sensitive_key("ApiKey"));
        assert!(is_sensitive_key("oauth_token"));
        assert!(is_sensitive_key("webhookSecret"));
        assert!(!is_sensitive_key("model"));
    }

    #[test]
    fn redacts_within_arrays() {
        let value = json!([{"credential": "x"}, {"model": "opus"}]);
        let redacted = redact(&value);
        assert_eq!(redacted[0]["credential"], json!(REDACTED));
        assert_eq!(redacted[1]["model"], json!("opus"));
    }
}
