//! The persisted data model: sessions, conversation entries, cron jobs and
//! history, identities, peers, access grants, and API keys.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::Timestamp;

/// A channel reference attached to a conversation entry or session, naming
/// the external surface (e.g. a chat channel) a message arrived through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    /// The channel's external id.
    pub id: String,
    /// The channel's kind (e.g. `"telegram"`, `"discord"`, `"http"`).
    #[serde(rename = "type")]
    pub kind: String,
    /// A human-readable channel name, when known.
    pub name: Option<String>,
}

/// A session's resolved provider binding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderBinding {
    /// The provider id to use.
    pub name: String,
    /// An explicit model override, if set.
    pub model: Option<String>,
    /// The fallback chain, tried in order if `name` is unavailable.
    #[serde(default)]
    pub fallback: Vec<String>,
    /// Free-form per-provider options.
    #[serde(default)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// `{name, id, created, context?, providerBinding?, channel?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session name; the primary handle used by every external
    /// collaborator.
    pub name: String,
    /// Internal unique id, stable for the session's lifetime.
    pub id: Uuid,
    /// When the session was first created. Preserved across later
    /// idempotent `createSession` calls for the same name.
    pub created: Timestamp,
    /// An optional system-prompt-like free text context.
    pub context: Option<String>,
    /// The session's resolved provider binding, if set.
    pub provider_binding: Option<ProviderBinding>,
    /// The external channel this session is bound to, if any.
    pub channel: Option<ChannelRef>,
}

impl Session {
    /// Create a fresh session record with no binding or channel.
    #[must_use]
    pub fn new(name: impl Into<String>, created: Timestamp) -> Self {
        Self {
            name: name.into(),
            id: Uuid::new_v4(),
            created,
            context: None,
            provider_binding: None,
            channel: None,
        }
    }
}

/// The kind of a conversation log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationEntryType {
    /// A system/context entry (e.g. injected context, not a turn).
    Context,
    /// An inbound message from a source.
    Message,
    /// A provider response.
    Response,
    /// A record of middleware having rewritten or prevented a turn.
    Middleware,
}

/// `{ts, from, senderId?, content, type, channel?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// When the entry was appended.
    pub ts: Timestamp,
    /// The display name of the entry's author (e.g. a session name, `"assistant"`).
    pub from: String,
    /// An opaque sender id, when distinguishable from `from`.
    pub sender_id: Option<String>,
    /// The entry's text content.
    pub content: String,
    /// The entry's kind.
    #[serde(rename = "type")]
    pub kind: ConversationEntryType,
    /// The channel this entry is associated with, if any.
    pub channel: Option<ChannelRef>,
}

/// One script attached to a cron job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronScript {
    /// The `{{name}}` placeholder this script's output fills.
    pub name: String,
    /// The shell command to execute.
    pub command: String,
    /// Working directory override.
    pub cwd: Option<String>,
    /// Per-script timeout override, in seconds.
    pub timeout: Option<u64>,
}

/// `{name, schedule, session, message, scripts?, once?, runAt?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    /// Unique job name.
    pub name: String,
    /// A 5-field cron expression, or the literal `"once"` for one-shots.
    pub schedule: String,
    /// The target session this job injects into.
    pub session: String,
    /// The message template, possibly containing `{{scriptName}}` placeholders.
    pub message: String,
    /// Scripts to run serially before message templating.
    #[serde(default)]
    pub scripts: Vec<CronScript>,
    /// Whether this job fires exactly once then is removed.
    #[serde(default)]
    pub once: bool,
    /// The absolute fire time for a one-shot job.
    pub run_at: Option<Timestamp>,
}

/// `{ts, name, session, message, success, durationMs, error?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronHistoryEntry {
    /// When the job fired.
    pub ts: Timestamp,
    /// The job's name at fire time.
    pub name: String,
    /// The target session.
    pub session: String,
    /// The templated message that was injected.
    pub message: String,
    /// Whether the fire succeeded: dispatch resolved without error AND no
    /// script had an error.
    pub success: bool,
    /// Total wall-clock duration of the fire, including script execution.
    pub duration_ms: u64,
    /// A human-readable failure reason, when `success` is false.
    pub error: Option<String>,
}

/// `{signPub, signPriv, encryptPub, encryptPriv, created, rotatedFrom?, rotatedAt?}`
///
/// Single per daemon; lifecycle is init-once, rotate-on-demand, never
/// deleted. Key bytes are not modeled as plain `Vec<u8>` here — see
/// `wopr_crypto::identity` for the secure, zeroizing representation; this
/// type is the serializable envelope persisted to `identity.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// Hex-encoded Ed25519 signing public key.
    pub sign_pub: String,
    /// Hex-encoded Ed25519 signing private key.
    pub sign_priv: String,
    /// Hex-encoded X25519 encryption public key.
    pub encrypt_pub: String,
    /// Hex-encoded X25519 encryption private key.
    pub encrypt_priv: String,
    /// When this identity was created (or last rotated into).
    pub created: Timestamp,
    /// The signing public key this identity was rotated from, if any.
    pub rotated_from: Option<String>,
    /// When the rotation occurred, if any.
    pub rotated_at: Option<Timestamp>,
}

/// A known peer's identity and trust configuration, owned by the daemon's
/// own [`Identity`] and referenced by the security kernel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Peer {
    /// Hex-encoded Ed25519 public key.
    pub public_key: String,
    /// A human-assigned display name.
    pub name: Option<String>,
    /// The trust level configured for this peer.
    pub trust_level: crate::trust::TrustLevel,
    /// When this peer was added.
    pub added_at: Timestamp,
}

/// An access grant: a peer- or session-scoped set of capabilities with an
/// optional expiry, resolved by `grantId` during injection evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessGrant {
    /// Unique grant id.
    pub id: String,
    /// The public key or identifier this grant applies to.
    pub subject: String,
    /// The capabilities this grant confers.
    pub capabilities: Vec<crate::capability::Capability>,
    /// The trust level this grant confers, overriding the source-type default.
    pub trust_level: crate::trust::TrustLevel,
    /// When the grant was created.
    pub created_at: Timestamp,
    /// When the grant expires, if ever.
    pub expires_at: Option<Timestamp>,
}

/// An API key's scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApiKeyScope {
    /// Unrestricted access.
    Full,
    /// Read-only access.
    ReadOnly,
    /// Scoped to a single named instance/session.
    Instance(String),
}

/// `{id, name, scope, prefix, hashedSecret, salt, createdAt, lastUsedAt?}`
///
/// The raw secret is shown once at creation time and never persisted;
/// subsequent validation uses a constant-time comparison against
/// `hashed_secret` (see `wopr_security::api_key`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    /// Unique key id.
    pub id: String,
    /// A human-assigned display name.
    pub name: String,
    /// The key's scope.
    pub scope: ApiKeyScope,
    /// The non-secret prefix shown in listings (e.g. `"wopr_ab12"`).
    pub prefix: String,
    /// The hex-encoded hash of the full secret.
    pub hashed_secret: String,
    /// The salt used when hashing.
    pub salt: String,
    /// When the key was created.
    pub created_at: Timestamp,
    /// The last time this key was used to authenticate, if ever.
    pub last_used_at: Option<Timestamp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn session_new_assigns_fresh_id() {
        let now = Utc::now();
        let a = Session::new("alpha", now);
        let b = Session::new("alpha", now);
        assert_eq!(a.name, b.name);
        assert_ne!(a.id, b.id);
        assert_eq!(a.created, now);
    }

    #[test]
    fn entries_serialize_with_snake_case_type() {
        let entry = ConversationEntry {
            ts: Utc::now(),
            from: "alpha".into(),
            sender_id: None,
            content: "hi".into(),
            kind: ConversationEntryType::Message,
            channel: None,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "message");
    }
}
