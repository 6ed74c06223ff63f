//! Cryptographic primitives for the WOPR daemon: Ed25519 signing identity,
//! X25519 key agreement for P2P payload encryption, content hashing, and
//! secure key persistence.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod hash;
pub mod identity;
pub mod keypair;
pub mod prelude;

pub use error::{CryptoError, CryptoResult};
pub use hash::ContentHash;
pub use identity::DaemonIdentity;
pub use keypair::{KeyPair, PublicKey, Signature};
