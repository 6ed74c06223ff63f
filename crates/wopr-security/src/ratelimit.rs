//! The in-memory rate limiter consulted as a pipeline step before the audit
//! step.
//!
//! Buckets are per-minute and per-hour token counters keyed by
//! [`RateLimiter::key_for`]'s scoping rule: the bare source identity for a
//! direct injection, or `(gatewaySession, target)` for traffic forwarded
//! through a gateway.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use wopr_core::{InjectionSource, InjectionType};

/// One source or (gateway, target) pair's rolling counters.
#[derive(Debug, Clone)]
struct Bucket {
    window_start: DateTime<Utc>,
    minute_count: u32,
    hour_window_start: DateTime<Utc>,
    hour_count: u32,
}

impl Bucket {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            window_start: now,
            minute_count: 0,
            hour_window_start: now,
            hour_count: 0,
        }
    }
}

/// A fixed per-key rate limit.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    /// Maximum injections per rolling minute.
    pub per_minute: u32,
    /// Maximum injections per rolling hour.
    pub per_hour: u32,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            per_minute: 60,
            per_hour: 1000,
        }
    }
}

/// The kernel's rate limiter. One instance is shared across the daemon's
/// lifetime; buckets are never persisted (restart clears all counters).
#[derive(Debug)]
pub struct RateLimiter {
    limit: RateLimit,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    /// A limiter with the given per-minute/per-hour caps.
    #[must_use]
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// The bucket key for `source` injecting into `target`: `(gatewaySession,
    /// target)` when the source carries a `gatewaySession` identity (it
    /// arrived via a gateway forward), else the bare source identity.
    #[must_use]
    pub fn key_for(source: &InjectionSource, target: &str) -> String {
        if let Some(gateway_session) = source
            .identity
            .as_ref()
            .and_then(|id| id.gateway_session.as_deref())
        {
            return format!("gateway:{gateway_session}->{target}");
        }
        match source.kind {
            InjectionType::P2p | InjectionType::P2pDiscovery => {
                let pubkey = source
                    .identity
                    .as_ref()
                    .and_then(|id| id.public_key.as_deref())
                    .unwrap_or("unknown");
                format!("p2p:{pubkey}")
            }
            InjectionType::Api => {
                let key_id = source
                    .identity
                    .as_ref()
                    .and_then(|id| id.api_key_id.as_deref())
                    .unwrap_or("unknown");
                format!("api:{key_id}")
            }
            other => format!("type:{}", other.as_pattern_str()),
        }
    }

    /// Record one attempt under `key`, rolling over expired windows.
    /// Returns `true` if the attempt is within both the per-minute and
    /// per-hour caps, `false` if either is exceeded (the attempt still
    /// counts against the bucket it exceeded).
    pub fn check(&self, key: &str) -> bool {
        let now = Utc::now();
        let mut guard = self.buckets.lock().expect("rate limiter lock poisoned");
        let bucket = guard.entry(key.to_string()).or_insert_with(|| Bucket::fresh(now));

        if now - bucket.window_start >= Duration::minutes(1) {
            bucket.window_start = now;
            bucket.minute_count = 0;
        }
        if now - bucket.hour_window_start >= Duration::hours(1) {
            bucket.hour_window_start = now;
            bucket.hour_count = 0;
        }

        bucket.minute_count += 1;
        bucket.hour_count += 1;

        bucket.minute_count <= self.limit.per_minute && bucket.hour_count <= self.limit.per_hour
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wopr_core::IdentityRef;

    fn source(kind: InjectionType) -> InjectionSource {
        InjectionSource::new(kind, Utc::now())
    }

    #[test]
    fn key_for_direct_injection_uses_source_identity() {
        let mut src = source(InjectionType::Api);
        src.identity = Some(IdentityRef {
            api_key_id: Some("key-1".into()),
            ..Default::default()
        });
        assert_eq!(RateLimiter::key_for(&src, "main"), "api:key-1");
    }

    #[test]
    fn key_for_gateway_forward_scopes_by_gateway_and_target() {
        let mut src = source(InjectionType::Gateway);
        src.identity = Some(IdentityRef {
            gateway_session: Some("lobby".into()),
            ..Default::default()
        });
        assert_eq!(RateLimiter::key_for(&src, "inner"), "gateway:lobby->inner");
    }

    #[test]
    fn check_allows_within_limit_and_blocks_over() {
        let limiter = RateLimiter::new(RateLimit {
            per_minute: 2,
            per_hour: 100,
        });
        assert!(limiter.check("k"));
        assert!(limiter.check("k"));
        assert!(!limiter.check("k"));
    }

    #[test]
    fn distinct_keys_have_independent_buckets() {
        let limiter = RateLimiter::new(RateLimit {
            per_minute: 1,
            per_hour: 100,
        });
        assert!(limiter.check("a"));
        assert!(limiter.check("b"));
    }
}
