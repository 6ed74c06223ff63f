//! Dotted capability strings, hierarchical expansion, and the fixed
//! tool-to-capability mapping.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A dotted capability name, e.g. `"inject"`, `"inject.network"`, or the
/// wildcard `"*"`.
///
/// Capabilities form a hierarchy: holding a parent capability grants every
/// child (`"a"` passes a check for `"a.b"`), with one documented exception —
/// the dangerous tool set `{http_fetch, exec_command, notify}` requires its
/// specific leaf explicitly and is never implied by the `inject` parent (see
/// [`TOOL_CAPABILITY_MAP`] and the dispatch engine's tool surface).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(String);

impl Capability {
    /// The wildcard capability that passes every check.
    #[must_use]
    pub fn wildcard() -> Self {
        Self("*".to_string())
    }

    /// Construct a capability from a dotted string.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The raw dotted string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `self` is the wildcard.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == "*"
    }

    /// Whether holding `self` satisfies a check for `required`.
    ///
    /// Implements invariant 8: the wildcard passes every check, and an
    /// entity holding a dotted prefix (`"a"`) passes a check for any of its
    /// children (`"a.b"`, `"a.b.c"`, ...). Equal strings always satisfy.
    #[must_use]
    pub fn satisfies(&self, required: &Capability) -> bool {
        if self.is_wildcard() || self.0 == required.0 {
            return true;
        }
        required
            .0
            .strip_prefix(&self.0)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Look up the capability a tool name requires, per the fixed
/// `TOOL_CAPABILITY_MAP`. Tools without a mapping are denied by default
/// (returns `None`); the two security-introspection tools bypass mapping
/// entirely and are handled by the caller before this is consulted.
#[must_use]
pub fn tool_capability(tool_name: &str) -> Option<Capability> {
    TOOL_CAPABILITY_MAP
        .iter()
        .find(|(name, _)| *name == tool_name)
        .map(|(_, cap)| Capability::new(*cap))
}

/// The fixed tool name -> required capability mapping named in the glossary.
pub const TOOL_CAPABILITY_MAP: &[(&str, &str)] = &[
    ("sessions_list", "session.history"),
    ("sessions_history", "session.history"),
    ("sessions_send", "cross.inject"),
    ("sessions_spawn", "session.spawn"),
    ("config_get", "config.read"),
    ("config_set", "config.write"),
    ("config_provider_defaults", "config.write"),
    ("memory_read", "memory.read"),
    ("memory_search", "memory.read"),
    ("memory_get", "memory.read"),
    ("identity_get", "memory.read"),
    ("soul_get", "memory.read"),
    ("memory_write", "memory.write"),
    ("self_reflect", "memory.write"),
    ("identity_update", "memory.write"),
    ("soul_update", "memory.write"),
    ("cron_list", "cron.manage"),
    ("cron_create", "cron.manage"),
    ("cron_delete", "cron.manage"),
    ("cron_history", "cron.manage"),
    ("event_emit", "event.emit"),
    ("event_list", "event.emit"),
    ("notify", "event.emit"),
    ("http_fetch", "inject.network"),
    ("exec_command", "inject.exec"),
    ("security_whoami", "inject"),
    ("security_check", "inject"),
];

/// Tool names that bypass `TOOL_CAPABILITY_MAP` entirely and are always
/// reachable regardless of capability set.
pub const SECURITY_INTROSPECTION_TOOLS: &[&str] = &["security_whoami", "security_check"];

/// The dangerous tool set whose capabilities are never implied by the
/// `inject` parent capability, even though they are dotted children of it.
pub const DANGEROUS_TOOLS: &[(&str, &str)] = &[
    ("http_fetch", "inject.network"),
    ("exec_command", "inject.exec"),
    ("notify", "event.emit"),
];

/// Expand a capability into the full set it implies, following the
/// hierarchical rule in §4.1 step 5: wildcard `*` expands to every
/// enumerated capability; `inject` expands to include `inject.tools`,
/// `inject.network`, `inject.exec`.
#[must_use]
pub fn expand(cap: &Capability) -> Vec<Capability> {
    const ALL: &[&str] = &[
        "inject",
        "inject.tools",
        "inject.network",
        "inject.exec",
        "session.spawn",
        "session.history",
        "cross.inject",
        "cross.read",
        "config.read",
        "config.write",
        "memory.read",
        "memory.write",
        "cron.manage",
        "event.emit",
        "a2a.call",
    ];
    if cap.is_wildcard() {
        return ALL.iter().map(|s| Capability::new(*s)).collect();
    }
    if cap.as_str() == "inject" {
        return vec![
            Capability::new("inject"),
            Capability::new("inject.tools"),
            Capability::new("inject.network"),
            Capability::new("inject.exec"),
        ];
    }
    vec![cap.clone()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_satisfies_everything() {
        let wildcard = Capability::wildcard();
        assert!(wildcard.satisfies(&Capability::new("cron.manage")));
    }

    #[test]
    fn parent_satisfies_child() {
        let parent = Capability::new("memory");
        assert!(parent.satisfies(&Capability::new("memory.read")));
        assert!(!Capability::new("mem").satisfies(&Capability::new("memory.read")));
    }

    #[test]
    fn exact_match_satisfies() {
        let cap = Capability::new("cron.manage");
        assert!(cap.satisfies(&cap));
    }

    #[test]
    fn tool_capability_lookup() {
        assert_eq!(
            tool_capability("sessions_send"),
            Some(Capability::new("cross.inject"))
        );
        assert_eq!(
            tool_capability("http_fetch"),
            Some(Capability::new("inject.network"))
        );
        assert_eq!(tool_capability("unmapped_tool"), None);
    }

    #[test]
    fn inject_expands_to_dangerous_children() {
        let expanded = expand(&Capability::new("inject"));
        assert!(expanded.contains(&Capability::new("inject.network")));
        assert!(expanded.contains(&Capability::new("inject.exec")));
    }

    #[test]
    fn dangerous_tools_are_not_implied_by_parent_alone_check() {
        // The parent/child satisfies() rule on its own *would* let "inject"
        // satisfy "inject.network" (dotted hierarchy). The security kernel
        // is responsible for treating DANGEROUS_TOOLS as requiring the
        // explicit leaf from the holder's raw grant set, not from
        // Capability::satisfies; this test documents the data this guard
        // reads.
        assert_eq!(DANGEROUS_TOOLS.len(), 3);
        assert!(DANGEROUS_TOOLS.iter().any(|(t, _)| *t == "http_fetch"));
    }
}
