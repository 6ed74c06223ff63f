//! The ordered trust-level enum: `owner(100) > trusted(75) > semi-trusted(50) > untrusted(0)`.

use serde::{Deserialize, Serialize};

/// A source's trust level, used both for access-pattern matching
/// (`trust:<level>`, meets-or-exceeds semantics) and as the default
/// derivation target for an [`crate::InjectionSource`]'s type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustLevel {
    /// No standing trust; e.g. an unverified P2P peer.
    Untrusted = 0,
    /// Authenticated via an API key or gateway forward.
    SemiTrusted = 50,
    /// A plugin adapter or a peer with an accepted access grant.
    Trusted = 75,
    /// The daemon operator: CLI, daemon-internal, or cron.
    Owner = 100,
}

impl TrustLevel {
    /// The numeric ordering value, matching the levels named in the spec
    /// (`owner=100 > trusted=75 > semi-trusted=50 > untrusted=0`).
    #[must_use]
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// Parse the `<level>` portion of a `"trust:<level>"` access pattern.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(Self::Owner),
            "trusted" => Some(Self::Trusted),
            "semi-trusted" => Some(Self::SemiTrusted),
            "untrusted" => Some(Self::Untrusted),
            _ => None,
        }
    }

    /// Whether `self` meets or exceeds `required`, per the access-pattern
    /// "meets-or-exceeds" semantics.
    #[must_use]
    pub fn meets(self, required: Self) -> bool {
        self.rank() >= required.rank()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_spec() {
        assert!(TrustLevel::Owner > TrustLevel::Trusted);
        assert!(TrustLevel::Trusted > TrustLevel::SemiTrusted);
        assert!(TrustLevel::SemiTrusted > TrustLevel::Untrusted);
    }

    #[test]
    fn meets_is_meets_or_exceeds() {
        assert!(TrustLevel::Owner.meets(TrustLevel::Trusted));
        assert!(TrustLevel::Trusted.meets(TrustLevel::Trusted));
        assert!(!TrustLevel::SemiTrusted.meets(TrustLevel::Trusted));
    }

    #[test]
    fn parse_roundtrips() {
        for lvl in [
            TrustLevel::Owner,
            TrustLevel::Trusted,
            TrustLevel::SemiTrusted,
            TrustLevel::Untrusted,
        ] {
            let s = serde_json::to_string(&lvl).unwrap();
            let parsed: TrustLevel = serde_json::from_str(&s).unwrap();
            assert_eq!(lvl, parsed);
        }
        assert_eq!(TrustLevel::parse("owner"), Some(TrustLevel::Owner));
        assert_eq!(TrustLevel::parse("bogus"), None);
    }
}
