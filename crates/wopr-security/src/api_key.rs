//! API key minting and verification.
//!
//! Raw secrets are shown to the caller exactly once, at creation, then
//! discarded; everything persisted (`ApiKey::hashed_secret`) is a salted
//! BLAKE3 hash under a key-specific domain tag, so two keys with the same
//! underlying randomness still hash differently.

use rand::RngCore;
use wopr_crypto::hash::ContentHash;

const HASH_DOMAIN: &str = "wopr-api-key";
const SECRET_BYTES: usize = 24;
const PREFIX_LEN: usize = 8;

/// A freshly minted secret, before it is wrapped into a persisted `ApiKey`.
pub struct MintedSecret {
    /// The raw secret, returned to the caller exactly once.
    pub raw: String,
    /// The non-secret prefix shown in listings.
    pub prefix: String,
    /// Random salt mixed into the hash.
    pub salt: String,
    /// The hash to persist as `ApiKey::hashed_secret`.
    pub hashed_secret: String,
}

/// Generate a new random secret of the form `wopr_<hex>`, its listing
/// prefix, and its salted hash.
#[must_use]
pub fn mint() -> MintedSecret {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    let raw = format!("wopr_{}", hex::encode(bytes));
    let prefix = raw.chars().take(PREFIX_LEN).collect();

    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = hex::encode(salt_bytes);

    let hashed_secret = hash_secret(&raw, &salt);
    MintedSecret { raw, prefix, salt, hashed_secret }
}

/// Hash `secret` salted the same way [`mint`] does, for verification
/// against a persisted `ApiKey`.
#[must_use]
pub fn hash_secret(secret: &str, salt: &str) -> String {
    ContentHash::hash_with_domain(HASH_DOMAIN, format!("{salt}:{secret}").as_bytes()).to_hex()
}

/// Constant-time comparison of a presented secret against a stored hash.
#[must_use]
pub fn verify(secret: &str, salt: &str, expected_hash: &str) -> bool {
    let candidate = hash_secret(secret, salt);
    candidate.len() == expected_hash.len()
        && candidate.bytes().zip(expected_hash.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_the_minted_secret() {
        let minted = mint();
        assert!(verify(&minted.raw, &minted.salt, &minted.hashed_secret));
    }

    #[test]
    fn verify_rejects_a_wrong_secret() {
        let minted = mint();
        assert!(!verify("wopr_wrong", &minted.salt, &minted.hashed_secret));
    }

    #[test]
    fn two_mints_never_collide() {
        let a = mint();
        let b = mint();
        assert_ne!(a.raw, b.raw);
        assert_ne!(a.hashed_secret, b.hashed_secret);
    }

    #[test]
    fn prefix_is_a_visible_slice_of_the_raw_secret() {
        let minted = mint();
        assert!(minted.raw.starts_with(&minted.prefix));
    }
}
