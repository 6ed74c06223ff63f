//! Content hashing using BLAKE3.
//!
//! Used by the audit chain (each entry hashes the previous) and by P2P
//! envelopes to bind a signature to the exact payload bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A BLAKE3 content hash (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Hash arbitrary data.
    #[must_use]
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Hash multiple chunks as if concatenated.
    #[must_use]
    pub fn hash_multi(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// The genesis hash used as `prevHash` for the first audit entry.
    #[must_use]
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Whether this is the genesis hash.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// The raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Create from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Try to create from a slice.
    #[must_use]
    pub fn try_from_slice(slice: &[u8]) -> Option<Self> {
        if slice.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Some(Self(bytes))
    }

    /// Encode as hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode from hex.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        Self::try_from_slice(&bytes).ok_or(hex::FromHexError::InvalidStringLength)
    }

    /// Hash with a domain-separation tag, so the same bytes hashed for two
    /// different purposes never collide.
    #[must_use]
    pub fn hash_with_domain(domain: &str, data: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(domain);
        hasher.update(data);
        Self(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl Default for ContentHash {
    fn default() -> Self {
        Self::zero()
    }
}

impl AsRef<[u8]> for ContentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for ContentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl From<ContentHash> for [u8; 32] {
    fn from(hash: ContentHash) -> Self {
        hash.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_data_same_hash() {
        let data = b"hello wopr";
        assert_eq!(ContentHash::hash(data), ContentHash::hash(data));
        assert_ne!(ContentHash::hash(data), ContentHash::hash(b"different"));
    }

    #[test]
    fn multi_matches_concatenated() {
        let parts: &[&[u8]] = &[b"hello", b" ", b"wopr"];
        assert_eq!(ContentHash::hash_multi(parts), ContentHash::hash(b"hello wopr"));
    }

    #[test]
    fn zero_hash_is_genesis() {
        assert!(ContentHash::zero().is_zero());
        assert!(!ContentHash::hash(b"data").is_zero());
    }

    #[test]
    fn hex_roundtrip() {
        let hash = ContentHash::hash(b"test");
        assert_eq!(ContentHash::from_hex(&hash.to_hex()).unwrap(), hash);
    }

    #[test]
    fn domain_separation_changes_hash() {
        let data = b"same data";
        let a = ContentHash::hash_with_domain("wopr-audit", data);
        let b = ContentHash::hash_with_domain("wopr-p2p", data);
        assert_ne!(a, b);
    }

    #[test]
    fn serde_roundtrip() {
        let hash = ContentHash::hash(b"test");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(serde_json::from_str::<ContentHash>(&json).unwrap(), hash);
    }
}
