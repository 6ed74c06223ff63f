//! Time and identifier primitives used throughout the dispatch core.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point in time, serialized as RFC 3339.
pub type Timestamp = DateTime<Utc>;

/// A monotonically increasing per-process counter feeding inject-id assignment.
static INJECT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a single injection, of the shape
/// `inject-<base36-timestamp>-<counter>`.
///
/// Unique within one daemon run: the timestamp component narrows collisions
/// across restarts, the counter component guarantees uniqueness within a
/// run even when two injections land in the same millisecond.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InjectId(String);

impl InjectId {
    /// Mint a new inject-id from the given timestamp.
    #[must_use]
    pub fn new(now: Timestamp) -> Self {
        let millis = u64::try_from(now.timestamp_millis().max(0)).unwrap_or(0);
        let counter = INJECT_COUNTER.fetch_add(1, Ordering::Relaxed);
        Self(format!(
            "inject-{}-{}",
            to_base36(millis),
            to_base36(counter)
        ))
    }

    /// The raw string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        let digit = usize::try_from(value % 36).unwrap_or(0);
        out.push(DIGITS[digit]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inject_ids_are_unique_and_well_shaped() {
        let now = Utc::now();
        let a = InjectId::new(now);
        let b = InjectId::new(now);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("inject-"));
        assert_eq!(a.as_str().split('-').count(), 3);
    }

    #[test]
    fn base36_roundtrip_sanity() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
