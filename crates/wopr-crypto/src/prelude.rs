//! Prelude module - commonly used types for convenient import.
//!
//! Use `use wopr_crypto::prelude::*;` to import the signing, hashing, and
//! identity types most crates need.

pub use crate::{CryptoError, CryptoResult};

pub use crate::ContentHash;

pub use crate::DaemonIdentity;

pub use crate::{KeyPair, PublicKey, Signature};
