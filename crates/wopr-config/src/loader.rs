//! Layered configuration loading.
//!
//! `load()` implements the order from compiled-in defaults through
//! `WOPR_HOME/config.json` to environment variable overrides:
//!
//! 1. Compiled-in defaults (embedded `defaults.json`).
//! 2. `{wopr_home}/config.json`, deep-merged over the defaults, if present.
//! 3. `WOPR_<DOT_PATH_UPPER_SNAKE>` environment variables, applied last.

use std::collections::BTreeSet;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::path::{env_var_name, set_nested};

const DEFAULTS_JSON: &str = include_str!("defaults.json");

/// Load the merged configuration tree for `wopr_home`.
///
/// # Errors
///
/// Returns an error if `config.json` exists but is not readable or is not
/// valid JSON.
pub fn load(wopr_home: &Path) -> ConfigResult<Value> {
    let mut merged: Value =
        serde_json::from_str(DEFAULTS_JSON).expect("embedded defaults.json is valid JSON");

    let config_path = wopr_home.join("config.json");
    if config_path.exists() {
        let raw = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.display().to_string(),
            source,
        })?;
        let overlay: Value =
            serde_json::from_str(&raw).map_err(|source| ConfigError::ParseError {
                path: config_path.display().to_string(),
                source,
            })?;
        deep_merge(&mut merged, &overlay);
        info!(path = %config_path.display(), "loaded config file");
    } else {
        debug!(path = %config_path.display(), "no config file found, using defaults");
    }

    apply_env_overrides(&mut merged)?;
    Ok(merged)
}

/// Recursively merge `overlay` into `base`, with `overlay` taking
/// precedence for any key present in both. Non-object values (including
/// arrays) are replaced wholesale rather than merged element-wise.
fn deep_merge(base: &mut Value, overlay: &Value) {
    let (Some(base_map), Value::Object(overlay_map)) = (base.as_object_mut(), overlay) else {
        *base = overlay.clone();
        return;
    };
    for (key, overlay_val) in overlay_map {
        match base_map.get_mut(key) {
            Some(base_val) => deep_merge(base_val, overlay_val),
            None => {
                base_map.insert(key.clone(), overlay_val.clone());
            }
        }
    }
}

/// The recognized dot paths env overrides are checked against. Kept as an
/// explicit list (rather than scanning `WOPR_*` blindly) so a stray
/// unrelated `WOPR_`-prefixed variable in the environment never silently
/// becomes config.
fn recognized_paths() -> &'static [&'static str] {
    &[
        "daemon.cronScriptsEnabled",
        "security.enforcement",
        "security.p2p.discoveryTrust",
        "security.p2p.autoAccept",
        "security.p2p.keyRotationGraceHours",
        "security.p2p.maxPayloadSize",
    ]
}

fn apply_env_overrides(merged: &mut Value) -> ConfigResult<()> {
    let mut applied = BTreeSet::new();
    for path in recognized_paths() {
        let var = env_var_name(path);
        if let Ok(raw) = std::env::var(&var) {
            let value = parse_env_value(&raw);
            set_nested(merged, path, value)?;
            applied.insert(var);
        }
    }
    if !applied.is_empty() {
        debug!(?applied, "applied environment variable config overrides");
    }
    Ok(())
}

fn parse_env_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Number(n.into());
    }
    Value::String(raw.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deep_merge_overlays_nested_objects() {
        let mut base = json!({"security": {"enforcement": "warn", "defaults": {}}});
        let overlay = json!({"security": {"enforcement": "enforce"}});
        deep_merge(&mut base, &overlay);
        assert_eq!(base["security"]["enforcement"], json!("enforce"));
        assert_eq!(base["security"]["defaults"], json!({}));
    }

    #[test]
    fn deep_merge_replaces_arrays_wholesale() {
        let mut base = json!({"webSearch": {"providerOrder": ["a", "b"]}});
        let overlay = json!({"webSearch": {"providerOrder": ["c"]}});
        deep_merge(&mut base, &overlay);
        assert_eq!(base["webSearch"]["providerOrder"], json!(["c"]));
    }

    #[test]
    fn load_without_config_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded["security"]["enforcement"], json!("warn"));
        assert_eq!(loaded["daemon"]["cronScriptsEnabled"], json!(false));
    }

    #[test]
    fn load_merges_config_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"security": {"enforcement": "enforce"}}"#,
        )
        .unwrap();
        let loaded = load(dir.path()).unwrap();
        assert_eq!(loaded["security"]["enforcement"], json!("enforce"));
        assert_eq!(loaded["daemon"]["cronScriptsEnabled"], json!(false));
    }

    #[test]
    fn parse_env_value_recognizes_bool_and_int() {
        assert_eq!(parse_env_value("true"), json!(true));
        assert_eq!(parse_env_value("42"), json!(42));
        assert_eq!(parse_env_value("enforce"), json!("enforce"));
    }
}
