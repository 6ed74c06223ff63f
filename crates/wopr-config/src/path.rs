//! Dot-path navigation over a `serde_json::Value` tree.

use serde_json::Value;

use crate::error::{ConfigError, ConfigResult};

fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

/// Read the value at a dot path, e.g. `"security.enforcement"`.
#[must_use]
pub fn get_nested<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let segments = split(path);
    let mut current = root;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set the value at a dot path, creating intermediate objects as needed.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidPath`] if an intermediate segment already
/// holds a non-object value, or the path is empty.
pub fn set_nested(root: &mut Value, path: &str, new_value: Value) -> ConfigResult<()> {
    let segments = split(path);
    let Some((leaf, parents)) = segments.split_last() else {
        return Err(ConfigError::InvalidPath(path.to_string()));
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            return Err(ConfigError::InvalidPath(path.to_string()));
        }
        let map = current.as_object_mut().expect("checked above");
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }

    if !current.is_object() {
        return Err(ConfigError::InvalidPath(path.to_string()));
    }
    current
        .as_object_mut()
        .expect("checked above")
        .insert((*leaf).to_string(), new_value);
    Ok(())
}

/// Convert a dot path into its environment variable override name, e.g.
/// `"security.enforcement"` → `"WOPR_SECURITY_ENFORCEMENT"`.
#[must_use]
pub fn env_var_name(path: &str) -> String {
    let upper = path.replace('.', "_").to_uppercase();
    format!("WOPR_{upper}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_nested_walks_dotted_path() {
        let root = json!({"security": {"enforcement": "warn"}});
        assert_eq!(
            get_nested(&root, "security.enforcement"),
            Some(&json!("warn"))
        );
    }

    #[test]
    fn get_nested_missing_path_is_none() {
        let root = json!({"security": {}});
        assert_eq!(get_nested(&root, "security.missing.deep"), None);
    }

    #[test]
    fn set_nested_creates_intermediate_objects() {
        let mut root = json!({});
        set_nested(&mut root, "providers.claude.model", json!("opus")).unwrap();
        assert_eq!(
            get_nested(&root, "providers.claude.model"),
            Some(&json!("opus"))
        );
    }

    #[test]
    fn set_nested_overwrites_existing_leaf() {
        let mut root = json!({"daemon": {"cronScriptsEnabled": false}});
        set_nested(&mut root, "daemon.cronScriptsEnabled", json!(true)).unwrap();
        assert_eq!(
            get_nested(&root, "daemon.cronScriptsEnabled"),
            Some(&json!(true))
        );
    }

    #[test]
    fn set_nested_rejects_path_through_scalar() {
        let mut root = json!({"security": "warn"});
        let result = set_nested(&mut root, "security.enforcement", json!("enforce"));
        assert!(matches!(result, Err(ConfigError::InvalidPath(_))));
    }

    #[test]
    fn env_var_name_upper_snakes_the_path() {
        assert_eq!(
            env_var_name("security.enforcement"),
            "WOPR_SECURITY_ENFORCEMENT"
        );
        assert_eq!(
            env_var_name("daemon.cronScriptsEnabled"),
            "WOPR_DAEMON_CRONSCRIPTSENABLED"
        );
    }
}
