use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use notar_types::{Address, TxSignature};
use tracing::info;

use crate::error::{KeyLoadError, SignerError};
use crate::signer::{Signer, SigningKey};

/// Number of bytes in a keypair file: 32-byte seed + 32-byte public key.
pub const KEYPAIR_LEN: usize = 64;

/// Holds the anchoring wallet's key material for the life of the process.
///
/// Key material is loaded once, typically at startup, from a JSON array of
/// 64 decimal integers (seed followed by public key). The identity is never
/// reloaded or mutated afterwards; share it behind an `Arc`.
pub struct WalletKeyStore {
    key: SigningKey,
    address: Address,
    source: Option<PathBuf>,
}

impl WalletKeyStore {
    /// Load a keypair file.
    pub fn load(path: &Path) -> Result<Self, KeyLoadError> {
        let text = fs::read_to_string(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                KeyLoadError::Missing(path.to_path_buf())
            } else {
                KeyLoadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let elements: Vec<i64> =
            serde_json::from_str(&text).map_err(|e| KeyLoadError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        let bytes = elements
            .iter()
            .enumerate()
            .map(|(index, &value)| {
                u8::try_from(value).map_err(|_| KeyLoadError::ByteOutOfRange { index, value })
            })
            .collect::<Result<Vec<u8>, _>>()?;

        let mut store = Self::from_keypair_bytes(&bytes)?;
        store.source = Some(path.to_path_buf());
        info!(address = %store.address, path = %path.display(), "wallet key loaded");
        Ok(store)
    }

    /// Build from raw keypair bytes (seed followed by public key).
    pub fn from_keypair_bytes(bytes: &[u8]) -> Result<Self, KeyLoadError> {
        if bytes.len() != KEYPAIR_LEN {
            return Err(KeyLoadError::WrongLength {
                expected: KEYPAIR_LEN,
                actual: bytes.len(),
            });
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes[..32]);
        let key = SigningKey::from_bytes(seed);
        if key.address().as_bytes()[..] != bytes[32..] {
            return Err(KeyLoadError::PublicKeyMismatch);
        }
        Ok(Self::from_signing_key(key))
    }

    /// Wrap an existing signing key.
    pub fn from_signing_key(key: SigningKey) -> Self {
        let address = key.address();
        Self {
            key,
            address,
            source: None,
        }
    }

    /// Generate a fresh random wallet.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate())
    }

    /// Public address of the wallet.
    pub fn address(&self) -> Address {
        self.address
    }

    /// File the key was loaded from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Sign an arbitrary payload.
    pub fn sign(&self, message: &[u8]) -> TxSignature {
        self.key.sign(message)
    }

    /// Write the keypair in the format [`WalletKeyStore::load`] reads.
    ///
    /// Refuses to overwrite an existing file. On Unix the file is created
    /// with mode `0600`.
    pub fn write_keypair_file(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = self.key.to_keypair_bytes();
        let json = serde_json::to_string(&bytes.to_vec()).map_err(io::Error::other)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()
    }
}

impl Signer for WalletKeyStore {
    fn address(&self) -> Address {
        self.address
    }

    fn try_sign(&self, message: &[u8]) -> Result<TxSignature, SignerError> {
        Ok(self.sign(message))
    }
}

impl std::fmt::Debug for WalletKeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKeyStore")
            .field("address", &self.address)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::verify_signature;

    fn keypair_json(bytes: &[u8]) -> String {
        serde_json::to_string(&bytes.to_vec()).unwrap()
    }

    #[test]
    fn load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        let original = WalletKeyStore::generate();
        original.write_keypair_file(&path).unwrap();

        let loaded = WalletKeyStore::load(&path).unwrap();
        assert_eq!(loaded.address(), original.address());
        assert_eq!(loaded.source(), Some(path.as_path()));

        let sig = loaded.sign(b"payload");
        assert!(verify_signature(&original.address(), b"payload", &sig).is_ok());
    }

    #[test]
    fn write_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        WalletKeyStore::generate().write_keypair_file(&path).unwrap();
        let err = WalletKeyStore::generate()
            .write_keypair_file(&path)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = WalletKeyStore::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, KeyLoadError::Missing(_)));
    }

    #[test]
    fn malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            WalletKeyStore::load(&path).unwrap_err(),
            KeyLoadError::Malformed { .. }
        ));
    }

    #[test]
    fn non_array_json_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        fs::write(&path, r#"{"secret": [1, 2, 3]}"#).unwrap();
        assert!(matches!(
            WalletKeyStore::load(&path).unwrap_err(),
            KeyLoadError::Malformed { .. }
        ));
    }

    #[test]
    fn wrong_element_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        fs::write(&path, keypair_json(&[1u8; 32])).unwrap();
        match WalletKeyStore::load(&path).unwrap_err() {
            KeyLoadError::WrongLength { expected, actual } => {
                assert_eq!(expected, 64);
                assert_eq!(actual, 32);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn element_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("id.json");
        let mut elements = vec![0i64; 64];
        elements[5] = 256;
        fs::write(&path, serde_json::to_string(&elements).unwrap()).unwrap();
        match WalletKeyStore::load(&path).unwrap_err() {
            KeyLoadError::ByteOutOfRange { index, value } => {
                assert_eq!(index, 5);
                assert_eq!(value, 256);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mismatched_public_key() {
        let mut bytes = SigningKey::from_bytes([3u8; 32]).to_keypair_bytes();
        bytes[40] ^= 0xff;
        assert!(matches!(
            WalletKeyStore::from_keypair_bytes(&bytes).unwrap_err(),
            KeyLoadError::PublicKeyMismatch
        ));
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let store = WalletKeyStore::from_signing_key(SigningKey::from_bytes([0xee; 32]));
        let debug = format!("{store:?}");
        assert!(!debug.contains("eeeeeeee"));
        assert!(debug.contains("address"));
    }
}
