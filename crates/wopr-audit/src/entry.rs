//! Audit entry types and actions.
//!
//! Every security-relevant decision and tool invocation is recorded as an
//! [`AuditEntry`]. Entries are chain-linked: each one's `hash` covers its
//! own contents plus the previous entry's hash, so truncating or editing
//! history breaks the chain at the tamper point.

use serde::{Deserialize, Serialize};
use wopr_core::{InjectionSource, Timestamp};
use wopr_crypto::ContentHash;

/// The action being audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditAction {
    /// An injection was evaluated by the security kernel.
    InjectionEvaluated,
    /// A tool was invoked.
    ToolInvoked {
        /// The tool name.
        tool: String,
        /// The session the tool ran in.
        session: String,
        /// Wall-clock duration of the call.
        duration_ms: u64,
    },
    /// A session was created.
    SessionCreated,
    /// A session was destroyed.
    SessionDestroyed {
        /// Why the session was destroyed.
        reason: String,
    },
    /// A cron job fired.
    CronFired {
        /// The job's name.
        job: String,
    },
    /// The daemon identity was rotated.
    IdentityRotated,
    /// Configuration was reloaded.
    ConfigReloaded,
    /// Trust was insufficient for the requested capability.
    TrustInsufficient,
    /// No access pattern in the target's effective list matched the source.
    AccessDenied,
    /// The capability was not held (or not held explicitly, for a
    /// dangerous tool).
    CapabilityDenied {
        /// The capability that was required.
        capability: String,
    },
    /// A non-gateway session attempted to forward on behalf of another
    /// identity.
    GatewayRequired,
    /// A rate limit bucket was exceeded.
    RateLimited,
    /// An access grant had expired at evaluation time.
    GrantExpired,
    /// An access pattern string failed to parse.
    InvalidPattern,
    /// Cron scripts are disabled, globally or for the job.
    ScriptsDisabled,
}

/// Outcome of an audited action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action was allowed / succeeded.
    Success {
        /// Optional free-form details.
        details: Option<String>,
    },
    /// The action was denied / failed.
    Failure {
        /// A human-readable error.
        error: String,
    },
}

impl AuditOutcome {
    /// A bare success outcome.
    #[must_use]
    pub fn success() -> Self {
        Self::Success { details: None }
    }

    /// A success outcome carrying details.
    #[must_use]
    pub fn success_with(details: impl Into<String>) -> Self {
        Self::Success {
            details: Some(details.into()),
        }
    }

    /// A failure outcome.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Whether this outcome represents success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// A single, chain-linked audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id.
    pub id: uuid::Uuid,
    /// When this entry was recorded.
    pub ts: Timestamp,
    /// The action being audited.
    pub action: AuditAction,
    /// The outcome of the action.
    pub outcome: AuditOutcome,
    /// A summary of the injection source that triggered this entry.
    pub source: InjectionSource,
    /// The target session, when the action is session-scoped.
    pub target_session: Option<String>,
    /// A human-readable reason, typically set on denial.
    pub reason: Option<String>,
    /// The hash of the entry immediately preceding this one in its chain,
    /// or [`ContentHash::zero`] for the first entry.
    pub prev_hash: ContentHash,
    /// This entry's own content hash, covering every field above.
    pub hash: ContentHash,
}

impl AuditEntry {
    /// Build and hash a new entry following `prev_hash`.
    #[must_use]
    pub fn new(
        ts: Timestamp,
        action: AuditAction,
        outcome: AuditOutcome,
        source: InjectionSource,
        target_session: Option<String>,
        reason: Option<String>,
        prev_hash: ContentHash,
    ) -> Self {
        let id = uuid::Uuid::new_v4();
        let hash = Self::compute_hash(id, ts, &action, &outcome, &source, &target_session, &reason, prev_hash);
        Self {
            id,
            ts,
            action,
            outcome,
            source,
            target_session,
            reason,
            prev_hash,
            hash,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compute_hash(
        id: uuid::Uuid,
        ts: Timestamp,
        action: &AuditAction,
        outcome: &AuditOutcome,
        source: &InjectionSource,
        target_session: &Option<String>,
        reason: &Option<String>,
        prev_hash: ContentHash,
    ) -> ContentHash {
        let mut buf = Vec::new();
        buf.extend_from_slice(id.as_bytes());
        buf.extend_from_slice(&ts.timestamp_millis().to_le_bytes());
        if let Ok(json) = serde_json::to_vec(action) {
            buf.extend_from_slice(&json);
        }
        if let Ok(json) = serde_json::to_vec(outcome) {
            buf.extend_from_slice(&json);
        }
        if let Ok(json) = serde_json::to_vec(source) {
            buf.extend_from_slice(&json);
        }
        if let Some(t) = target_session {
            buf.extend_from_slice(t.as_bytes());
        }
        if let Some(r) = reason {
            buf.extend_from_slice(r.as_bytes());
        }
        buf.extend_from_slice(prev_hash.as_bytes());
        ContentHash::hash_with_domain("wopr-audit-entry", &buf)
    }

    /// Recompute this entry's hash from its fields and compare against the
    /// stored `hash`, detecting in-place tampering.
    #[must_use]
    pub fn verify_integrity(&self) -> bool {
        let recomputed = Self::compute_hash(
            self.id,
            self.ts,
            &self.action,
            &self.outcome,
            &self.source,
            &self.target_session,
            &self.reason,
            self.prev_hash,
        );
        recomputed == self.hash
    }

    /// Whether this entry's `prev_hash` matches `previous`'s own hash.
    #[must_use]
    pub fn follows(&self, previous: &AuditEntry) -> bool {
        self.prev_hash == previous.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wopr_core::{InjectionSource, InjectionType};

    fn source() -> InjectionSource {
        InjectionSource::new(InjectionType::Api, chrono::Utc::now())
    }

    #[test]
    fn new_entry_hashes_its_own_contents() {
        let entry = AuditEntry::new(
            chrono::Utc::now(),
            AuditAction::SessionCreated,
            AuditOutcome::success(),
            source(),
            Some("alice".into()),
            None,
            ContentHash::zero(),
        );
        assert!(entry.verify_integrity());
    }

    #[test]
    fn tampering_breaks_integrity() {
        let mut entry = AuditEntry::new(
            chrono::Utc::now(),
            AuditAction::SessionCreated,
            AuditOutcome::success(),
            source(),
            Some("alice".into()),
            None,
            ContentHash::zero(),
        );
        assert!(entry.verify_integrity());
        entry.reason = Some("tampered".into());
        assert!(!entry.verify_integrity());
    }

    #[test]
    fn chain_linking() {
        let e1 = AuditEntry::new(
            chrono::Utc::now(),
            AuditAction::SessionCreated,
            AuditOutcome::success(),
            source(),
            Some("alice".into()),
            None,
            ContentHash::zero(),
        );
        let e2 = AuditEntry::new(
            chrono::Utc::now(),
            AuditAction::ToolInvoked {
                tool: "http_fetch".into(),
                session: "alice".into(),
                duration_ms: 12,
            },
            AuditOutcome::success(),
            source(),
            Some("alice".into()),
            None,
            e1.hash,
        );
        assert!(e2.follows(&e1));
        assert!(!e1.follows(&e2));
    }
}
