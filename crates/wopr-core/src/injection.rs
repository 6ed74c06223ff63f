//! The injection source, access-pattern matching, and the ephemeral
//! per-injection security context.

use serde::{Deserialize, Serialize};

use crate::capability::Capability;
use crate::ids::{InjectId, Timestamp};
use crate::trust::TrustLevel;

/// The kind of collaborator that originated an injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjectionType {
    /// The local CLI frontend.
    Cli,
    /// The daemon itself (internal scheduling, self-dispatch).
    Daemon,
    /// A signed peer-to-peer message.
    P2p,
    /// A P2P discovery-phase message, pre-handshake.
    P2pDiscovery,
    /// A plugin adapter.
    Plugin,
    /// The cron scheduler.
    Cron,
    /// An authenticated HTTP API caller.
    Api,
    /// Traffic forwarded through a gateway session.
    Gateway,
    /// An internal re-entrant call (e.g. a tool handler re-injecting).
    Internal,
}

impl InjectionType {
    /// The default trust level derived from the source type alone, before
    /// any access-grant override is applied (§3: "Default trust level is
    /// derived from `type`").
    #[must_use]
    pub fn default_trust(self) -> TrustLevel {
        match self {
            Self::Cli | Self::Daemon | Self::Cron | Self::Internal => TrustLevel::Owner,
            Self::Plugin => TrustLevel::Trusted,
            Self::Api | Self::Gateway => TrustLevel::SemiTrusted,
            Self::P2p | Self::P2pDiscovery => TrustLevel::Untrusted,
        }
    }

    /// The `type:<srcType>` string used in access patterns.
    #[must_use]
    pub fn as_pattern_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Daemon => "daemon",
            Self::P2p => "p2p",
            Self::P2pDiscovery => "p2p.discovery",
            Self::Plugin => "plugin",
            Self::Cron => "cron",
            Self::Api => "api",
            Self::Gateway => "gateway",
            Self::Internal => "internal",
        }
    }
}

/// Identity details attached to an injection source, populated depending on
/// the source type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityRef {
    /// Hex-encoded public key, for P2P sources.
    pub public_key: Option<String>,
    /// Plugin name, for plugin sources.
    pub plugin_name: Option<String>,
    /// API key id, for API sources.
    pub api_key_id: Option<String>,
    /// The gateway session name that forwarded this injection.
    pub gateway_session: Option<String>,
    /// An opaque end-user identifier, where known.
    pub user_id: Option<String>,
}

/// `{type, trustLevel, identity?, grantedCapabilities?, grantId?, timestamp, targetSession?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionSource {
    /// The kind of collaborator.
    #[serde(rename = "type")]
    pub kind: InjectionType,
    /// The trust level in effect for this injection (post grant resolution).
    pub trust_level: TrustLevel,
    /// Identity details, when the source type carries any.
    pub identity: Option<IdentityRef>,
    /// Capabilities explicitly granted to this source, if any (overrides
    /// the default derivation from trust level).
    pub granted_capabilities: Option<Vec<Capability>>,
    /// The access grant this injection resolved through, if any.
    pub grant_id: Option<String>,
    /// When the injection was received.
    pub timestamp: Timestamp,
    /// The session this injection targets, when known ahead of dispatch.
    pub target_session: Option<String>,
}

impl InjectionSource {
    /// Build a source with the default trust level for `kind` and no grant.
    #[must_use]
    pub fn new(kind: InjectionType, timestamp: Timestamp) -> Self {
        Self {
            trust_level: kind.default_trust(),
            kind,
            identity: None,
            granted_capabilities: None,
            grant_id: None,
            timestamp,
            target_session: None,
        }
    }

    /// Builder-style: set the target session.
    #[must_use]
    pub fn with_target(mut self, session: impl Into<String>) -> Self {
        self.target_session = Some(session.into());
        self
    }

    /// Builder-style: override the trust level (e.g. from a resolved grant).
    #[must_use]
    pub fn with_trust_level(mut self, level: TrustLevel) -> Self {
        self.trust_level = level;
        self
    }

    /// Builder-style: attach identity details.
    #[must_use]
    pub fn with_identity(mut self, identity: IdentityRef) -> Self {
        self.identity = Some(identity);
        self
    }
}

/// One disjunctive access-pattern entry from a session's effective access
/// list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessPattern {
    /// Matches every source.
    Any,
    /// Matches sources whose trust level meets or exceeds the given level.
    Trust(TrustLevel),
    /// Matches sources whose `identity.gatewaySession` equals the given name.
    Session(String),
    /// Matches P2P sources with the exact given hex public key.
    P2p(String),
    /// Matches sources of the given injection type.
    Type(InjectionType),
}

impl AccessPattern {
    /// Parse one of the pattern strings named in the glossary:
    /// `"*"`, `"trust:<level>"`, `"session:<name>"`, `"p2p:<pubkey>"`,
    /// `"type:<srcType>"`.
    pub fn parse(s: &str) -> Result<Self, crate::error::ErrorKind> {
        if s == "*" {
            return Ok(Self::Any);
        }
        if let Some(level) = s.strip_prefix("trust:") {
            return TrustLevel::parse(level)
                .map(Self::Trust)
                .ok_or(crate::error::ErrorKind::InvalidPattern);
        }
        if let Some(name) = s.strip_prefix("session:") {
            return Ok(Self::Session(name.to_string()));
        }
        if let Some(key) = s.strip_prefix("p2p:") {
            return Ok(Self::P2p(key.to_string()));
        }
        if let Some(ty) = s.strip_prefix("type:") {
            let kind = match ty {
                "cli" => InjectionType::Cli,
                "daemon" => InjectionType::Daemon,
                "p2p" => InjectionType::P2p,
                "p2p.discovery" => InjectionType::P2pDiscovery,
                "plugin" => InjectionType::Plugin,
                "cron" => InjectionType::Cron,
                "api" => InjectionType::Api,
                "gateway" => InjectionType::Gateway,
                "internal" => InjectionType::Internal,
                _ => return Err(crate::error::ErrorKind::InvalidPattern),
            };
            return Ok(Self::Type(kind));
        }
        Err(crate::error::ErrorKind::InvalidPattern)
    }

    /// Whether this pattern matches the given source.
    #[must_use]
    pub fn matches(&self, source: &InjectionSource) -> bool {
        match self {
            Self::Any => true,
            Self::Trust(level) => source.trust_level.meets(*level),
            Self::Session(name) => source
                .identity
                .as_ref()
                .and_then(|id| id.gateway_session.as_deref())
                == Some(name.as_str()),
            Self::P2p(key) => {
                source.kind == InjectionType::P2p
                    && source.identity.as_ref().and_then(|id| id.public_key.as_deref())
                        == Some(key.as_str())
            }
            Self::Type(kind) => source.kind == *kind,
        }
    }
}

/// The ephemeral, one-per-injection context produced by
/// `evaluateInjection` and consulted by tool handlers mid-query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    /// A unique id for this evaluation, independent of the eventual inject-id.
    pub request_id: String,
    /// The source that was evaluated.
    pub source: InjectionSource,
    /// The session this context is scoped to.
    pub target_session: String,
    /// The resolved trust level (post grant resolution).
    pub trust_level: TrustLevel,
    /// The effective capability set granted to this injection.
    pub granted_capabilities: Vec<Capability>,
    /// When this context was created.
    pub created_at: Timestamp,
    /// The inject-id this context is bound to once dispatch assigns one.
    pub inject_id: Option<InjectId>,
}

impl SecurityContext {
    /// Whether the held capability set satisfies a check for `required`.
    #[must_use]
    pub fn has_capability(&self, required: &Capability) -> bool {
        self.granted_capabilities
            .iter()
            .any(|held| held.satisfies(required))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn default_trust_matches_spec_table() {
        assert_eq!(InjectionType::Cli.default_trust(), TrustLevel::Owner);
        assert_eq!(InjectionType::Plugin.default_trust(), TrustLevel::Trusted);
        assert_eq!(InjectionType::Api.default_trust(), TrustLevel::SemiTrusted);
        assert_eq!(InjectionType::P2p.default_trust(), TrustLevel::Untrusted);
    }

    #[test]
    fn access_pattern_parse_and_match() {
        let now = Utc::now();
        let source = InjectionSource::new(InjectionType::Api, now);

        assert!(AccessPattern::parse("*").unwrap().matches(&source));
        assert!(
            AccessPattern::parse("trust:semi-trusted")
                .unwrap()
                .matches(&source)
        );
        assert!(!AccessPattern::parse("trust:owner").unwrap().matches(&source));
        assert!(AccessPattern::parse("type:api").unwrap().matches(&source));
        assert!(!AccessPattern::parse("type:cli").unwrap().matches(&source));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        assert!(AccessPattern::parse("bogus:1").is_err());
        assert!(AccessPattern::parse("trust:nope").is_err());
    }

    #[test]
    fn security_context_capability_check() {
        let ctx = SecurityContext {
            request_id: "r1".into(),
            source: InjectionSource::new(InjectionType::Cli, Utc::now()),
            target_session: "main".into(),
            trust_level: TrustLevel::Owner,
            granted_capabilities: vec![Capability::new("inject")],
            created_at: Utc::now(),
            inject_id: None,
        };
        assert!(ctx.has_capability(&Capability::new("inject.network")));
        assert!(!ctx.has_capability(&Capability::new("cron.manage")));
    }
}
