//! The request-bound context table.
//!
//! `evaluateInjection` stores the `SecurityContext` it produces here, keyed
//! by target session name, so a tool handler invoked mid-dispatch (on a
//! different task from the one that ran the pipeline) can retrieve the
//! context in force for its session without the context being threaded
//! through every call site by hand.

use std::collections::HashMap;
use std::sync::RwLock;

use wopr_core::SecurityContext;

/// A concurrent table of in-flight security contexts, one slot per session
/// name. Storing a new context for a session that already has one replaces
/// it — only one injection is ever active per session at a time (see the
/// session queue's single-active-item invariant), so this never needs
/// reference counting or a stack.
#[derive(Debug, Default)]
pub struct ContextStore {
    contexts: RwLock<HashMap<String, SecurityContext>>,
}

impl ContextStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or replace) the context for `context.target_session`.
    pub fn store(&self, context: SecurityContext) {
        let mut guard = self.contexts.write().expect("context store lock poisoned");
        guard.insert(context.target_session.clone(), context);
    }

    /// Retrieve a clone of the context currently active for `session_name`,
    /// if any.
    #[must_use]
    pub fn retrieve(&self, session_name: &str) -> Option<SecurityContext> {
        let guard = self.contexts.read().expect("context store lock poisoned");
        guard.get(session_name).cloned()
    }

    /// Drop the context for `session_name`, e.g. once dispatch completes.
    pub fn clear(&self, session_name: &str) {
        let mut guard = self.contexts.write().expect("context store lock poisoned");
        guard.remove(session_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use wopr_core::{InjectionSource, InjectionType, TrustLevel};

    fn context(session: &str) -> SecurityContext {
        SecurityContext {
            request_id: "r1".into(),
            source: InjectionSource::new(InjectionType::Cli, Utc::now()),
            target_session: session.into(),
            trust_level: TrustLevel::Owner,
            granted_capabilities: vec![],
            created_at: Utc::now(),
            inject_id: None,
        }
    }

    #[test]
    fn store_then_retrieve_roundtrips() {
        let store = ContextStore::new();
        store.store(context("alice"));
        assert_eq!(store.retrieve("alice").unwrap().target_session, "alice");
        assert!(store.retrieve("bob").is_none());
    }

    #[test]
    fn storing_again_replaces_the_previous_context() {
        let store = ContextStore::new();
        store.store(context("alice"));
        let mut second = context("alice");
        second.request_id = "r2".into();
        store.store(second);
        assert_eq!(store.retrieve("alice").unwrap().request_id, "r2");
    }

    #[test]
    fn clear_removes_the_entry() {
        let store = ContextStore::new();
        store.store(context("alice"));
        store.clear("alice");
        assert!(store.retrieve("alice").is_none());
    }
}
