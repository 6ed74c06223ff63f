//! Dot-pathed configuration for WOPR.
//!
//! [`Config`] wraps a merged `serde_json::Value` tree assembled from
//! compiled-in defaults, an optional `WOPR_HOME/config.json`, and
//! `WOPR_<DOT_PATH_UPPER_SNAKE>` environment overrides (see [`loader::load`]).
//! Values are addressed by dot path (`"security.enforcement"`); reads
//! through [`Config::get_redacted`] mask any key matching
//! `apiKey|secret|token|credential`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod loader;
pub mod path;
pub mod prelude;
pub mod redact;

use std::path::{Path, PathBuf};

use serde_json::Value;

pub use error::{ConfigError, ConfigResult};

/// The default `WOPR_HOME` directory name, relative to the user's home
/// directory, when `WOPR_HOME` is not set.
const DEFAULT_HOME_DIRNAME: &str = "wopr";

/// Resolve `WOPR_HOME`: the `WOPR_HOME` environment variable if set, else
/// `$HOME/wopr`.
///
/// # Errors
///
/// Returns an error if neither `WOPR_HOME` is set nor a home directory can
/// be determined for the current user.
pub fn resolve_home() -> ConfigResult<PathBuf> {
    if let Ok(home) = std::env::var("WOPR_HOME") {
        return Ok(PathBuf::from(home));
    }
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_HOME_DIRNAME))
        .ok_or_else(|| ConfigError::InvalidPath("could not determine home directory".into()))
}

/// The merged, dot-addressable configuration tree.
#[derive(Debug, Clone)]
pub struct Config {
    tree: Value,
    home: PathBuf,
}

impl Config {
    /// Load configuration for `wopr_home`, merging defaults, config file,
    /// and environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if `config.json` exists but can't be read or
    /// parsed.
    pub fn load(wopr_home: impl Into<PathBuf>) -> ConfigResult<Self> {
        let home = wopr_home.into();
        let tree = loader::load(&home)?;
        Ok(Self { tree, home })
    }

    /// Load configuration using the resolved `WOPR_HOME`.
    ///
    /// # Errors
    ///
    /// Returns an error if `WOPR_HOME` cannot be resolved, or the config
    /// file at that location can't be read or parsed.
    pub fn load_default() -> ConfigResult<Self> {
        Self::load(resolve_home()?)
    }

    /// The directory this configuration was loaded for.
    #[must_use]
    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Read a raw value by dot path, with no redaction. Intended for
    /// internal callers that need the real value (e.g. the provider
    /// registry reading a credential), never for surfaces exposed to
    /// untrusted callers.
    #[must_use]
    pub fn get(&self, dot_path: &str) -> Option<&Value> {
        path::get_nested(&self.tree, dot_path)
    }

    /// Read a value by dot path with sensitive leaf keys redacted. This is
    /// the variant the management surface must use for any config-read
    /// operation.
    #[must_use]
    pub fn get_redacted(&self, dot_path: &str) -> Option<Value> {
        path::get_nested(&self.tree, dot_path).map(redact::redact)
    }

    /// The whole tree, redacted, for a management-surface config dump.
    #[must_use]
    pub fn to_redacted_json(&self) -> Value {
        redact::redact(&self.tree)
    }

    /// Set a value by dot path in the in-memory tree, creating
    /// intermediate objects as needed. Does not persist to disk; call
    /// [`Config::save`] to do so.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPath`] if the path walks through a
    /// non-object value.
    pub fn set(&mut self, dot_path: &str, value: Value) -> ConfigResult<()> {
        path::set_nested(&mut self.tree, dot_path, value)
    }

    /// Persist the current in-memory tree to `{home}/config.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file can't be written.
    pub fn save(&self) -> ConfigResult<()> {
        let path = self.home.join("config.json");
        let json = serde_json::to_string_pretty(&self.tree)
            .expect("in-memory config tree is always serializable");
        std::fs::write(&path, json).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Whether cron script execution is enabled, the value gating the
    /// dual-checked `scripts_disabled` failure path.
    #[must_use]
    pub fn cron_scripts_enabled(&self) -> bool {
        self.get("daemon.cronScriptsEnabled")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// The configured security enforcement mode (`"off"`, `"warn"`, or
    /// `"enforce"`), defaulting to `"warn"` if unset or malformed.
    #[must_use]
    pub fn enforcement_mode(&self) -> String {
        self.get("security.enforcement")
            .and_then(Value::as_str)
            .unwrap_or("warn")
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_expose_documented_keys() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(!config.cron_scripts_enabled());
        assert_eq!(config.enforcement_mode(), "warn");
    }

    #[test]
    fn set_then_get_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(dir.path()).unwrap();
        config
            .set("providers.claude.model", json!("claude-opus"))
            .unwrap();
        assert_eq!(
            config.get("providers.claude.model"),
            Some(&json!("claude-opus"))
        );
    }

    #[test]
    fn get_redacted_masks_sensitive_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(dir.path()).unwrap();
        config
            .set("providers.claude.apiKey", json!("sk-live-secret"))
            .unwrap();
        let redacted = config.get_redacted("providers.claude").unwrap();
        assert_eq!(redacted["apiKey"], json!("[redacted]"));
    }

    #[test]
    fn save_then_load_persists_changes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::load(dir.path()).unwrap();
        config.set("security.enforcement", json!("enforce")).unwrap();
        config.save().unwrap();

        let reloaded = Config::load(dir.path()).unwrap();
        assert_eq!(reloaded.enforcement_mode(), "enforce");
    }
}
