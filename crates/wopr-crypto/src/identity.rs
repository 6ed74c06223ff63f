//! The daemon's own cryptographic identity: an Ed25519 signing key pair for
//! audit entries and peer authentication, plus an X25519 key pair for P2P
//! payload encryption.

use std::path::{Path, PathBuf};

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::keypair::KeyPair;

const SIGN_KEY_FILE: &str = "sign.key";
const ENCRYPT_KEY_FILE: &str = "encrypt.key";

/// The daemon's signing and encryption identity, held in memory only.
///
/// Secret material is zeroized on drop via [`KeyPair`] and the wrapped
/// [`StaticSecret`]; `DaemonIdentity` never implements `Clone`.
pub struct DaemonIdentity {
    signing: KeyPair,
    encryption: StaticSecret,
}

impl DaemonIdentity {
    /// Generate a fresh identity without touching disk.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing: KeyPair::generate(),
            encryption: StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Load the identity from `dir`, generating and persisting one if the
    /// directory is empty.
    ///
    /// Stores `sign.key` and `encrypt.key` side by side using the same
    /// `O_CREAT | O_EXCL` + `0o600` discipline as [`KeyPair::load_or_generate`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::IoError`] on any filesystem failure.
    pub fn load_or_generate(dir: impl AsRef<Path>) -> CryptoResult<Self> {
        let dir = dir.as_ref();
        let signing = KeyPair::load_or_generate(dir.join(SIGN_KEY_FILE))?;
        let encryption = load_or_generate_x25519(dir.join(ENCRYPT_KEY_FILE))?;
        Ok(Self { signing, encryption })
    }

    /// The signing key pair.
    #[must_use]
    pub fn signing(&self) -> &KeyPair {
        &self.signing
    }

    /// The X25519 public key used for P2P key agreement.
    #[must_use]
    pub fn encryption_public(&self) -> X25519PublicKey {
        X25519PublicKey::from(&self.encryption)
    }

    /// Derive a shared secret with a peer's X25519 public key.
    ///
    /// Used to encrypt P2P payloads addressed to that peer.
    #[must_use]
    pub fn diffie_hellman(&self, peer_public: &X25519PublicKey) -> [u8; 32] {
        *self.encryption.diffie_hellman(peer_public).as_bytes()
    }

    /// Export this identity as a [`wopr_core::Identity`] record, suitable
    /// for persistence by `wopr-storage`.
    #[must_use]
    pub fn to_record(&self, created: wopr_core::Timestamp) -> wopr_core::Identity {
        wopr_core::Identity {
            sign_pub: self.signing.export_public_key().to_hex(),
            sign_priv: hex::encode(self.signing.secret_key_bytes()),
            encrypt_pub: hex::encode(self.encryption_public().as_bytes()),
            encrypt_priv: hex::encode(self.encryption.to_bytes()),
            created,
            rotated_from: None,
            rotated_at: None,
        }
    }

    /// Reconstruct an identity from a persisted record.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidHexEncoding`] or
    /// [`CryptoError::InvalidKeyLength`] if the record is malformed.
    pub fn from_record(record: &wopr_core::Identity) -> CryptoResult<Self> {
        let sign_priv =
            hex::decode(&record.sign_priv).map_err(|_| CryptoError::InvalidHexEncoding)?;
        let signing = KeyPair::from_secret_key(&sign_priv)?;

        let encrypt_priv =
            hex::decode(&record.encrypt_priv).map_err(|_| CryptoError::InvalidHexEncoding)?;
        let encrypt_priv: [u8; 32] =
            encrypt_priv
                .try_into()
                .map_err(|v: Vec<u8>| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: v.len(),
                })?;

        Ok(Self {
            signing,
            encryption: StaticSecret::from(encrypt_priv),
        })
    }

    /// Rotate to a fresh identity, recording the prior signing public key
    /// as provenance.
    #[must_use]
    pub fn rotate(&self, rotated_at: wopr_core::Timestamp) -> (Self, wopr_core::Identity) {
        let next = Self::generate();
        let mut record = next.to_record(rotated_at);
        record.rotated_from = Some(self.signing.export_public_key().to_hex());
        record.rotated_at = Some(rotated_at);
        (next, record)
    }
}

impl std::fmt::Debug for DaemonIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonIdentity")
            .field("sign_pub", &self.signing.export_public_key().to_hex())
            .field(
                "encrypt_pub",
                &hex::encode(self.encryption_public().as_bytes()),
            )
            .finish()
    }
}

fn load_or_generate_x25519(path: PathBuf) -> CryptoResult<StaticSecret> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CryptoError::IoError(e.to_string()))?;
    }

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(&path)
        {
            Ok(mut file) => {
                let secret = StaticSecret::random_from_rng(OsRng);
                file.write_all(&secret.to_bytes())
                    .map_err(|e| CryptoError::IoError(e.to_string()))?;
                return Ok(secret);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(CryptoError::IoError(e.to_string())),
        }
    }

    #[cfg(not(unix))]
    if !path.exists() {
        let secret = StaticSecret::random_from_rng(OsRng);
        std::fs::write(&path, secret.to_bytes()).map_err(|e| CryptoError::IoError(e.to_string()))?;
        return Ok(secret);
    }

    let meta = std::fs::symlink_metadata(&path).map_err(|e| CryptoError::IoError(e.to_string()))?;
    if meta.file_type().is_symlink() {
        return Err(CryptoError::IoError(
            "refusing to read key file: path is a symlink".into(),
        ));
    }

    let bytes =
        Zeroizing::new(std::fs::read(&path).map_err(|e| CryptoError::IoError(e.to_string()))?);
    let array: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            actual: bytes.len(),
        })?;
    Ok(StaticSecret::from(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_distinct_identities() {
        let a = DaemonIdentity::generate();
        let b = DaemonIdentity::generate();
        assert_ne!(
            a.signing().export_public_key().to_hex(),
            b.signing().export_public_key().to_hex()
        );
    }

    #[test]
    fn diffie_hellman_agrees() {
        let a = DaemonIdentity::generate();
        let b = DaemonIdentity::generate();
        let shared_ab = a.diffie_hellman(&b.encryption_public());
        let shared_ba = b.diffie_hellman(&a.encryption_public());
        assert_eq!(shared_ab, shared_ba);
    }

    #[test]
    fn record_roundtrip_preserves_keys() {
        let identity = DaemonIdentity::generate();
        let record = identity.to_record(chrono::Utc::now());
        let restored = DaemonIdentity::from_record(&record).unwrap();
        assert_eq!(
            identity.signing().export_public_key().to_hex(),
            restored.signing().export_public_key().to_hex()
        );
        assert_eq!(
            identity.encryption_public().as_bytes(),
            restored.encryption_public().as_bytes()
        );
    }

    #[test]
    fn load_or_generate_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let first = DaemonIdentity::load_or_generate(dir.path()).unwrap();
        let second = DaemonIdentity::load_or_generate(dir.path()).unwrap();
        assert_eq!(
            first.signing().export_public_key().to_hex(),
            second.signing().export_public_key().to_hex()
        );
    }

    #[test]
    fn rotate_records_provenance() {
        let identity = DaemonIdentity::generate();
        let old_pub = identity.signing().export_public_key().to_hex();
        let rotated_at = chrono::Utc::now();
        let (_next, record) = identity.rotate(rotated_at);
        assert_eq!(record.rotated_from.as_deref(), Some(old_pub.as_str()));
        assert_eq!(record.rotated_at, Some(rotated_at));
    }
}
