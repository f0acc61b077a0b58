use notar_types::{Address, TxSignature};

use crate::error::SignerError;

/// Signing capability over arbitrary byte payloads.
///
/// The anchoring workflow signs through this trait rather than a concrete key
/// so that remote or hardware-backed signers can stand in for the local
/// wallet. Implementations must be deterministic for a given payload.
pub trait Signer: Send + Sync {
    /// Address of the account this signer signs for.
    fn address(&self) -> Address;

    /// Sign a message, or report why no signature could be produced.
    fn try_sign(&self, message: &[u8]) -> Result<TxSignature, SignerError>;
}

/// Ed25519 signing key (private).
pub struct SigningKey(ed25519_dalek::SigningKey);

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::thread_rng();
        Self(ed25519_dalek::SigningKey::generate(&mut csprng))
    }

    /// Create from a raw 32-byte secret seed.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }

    /// The public address derived from this key.
    pub fn address(&self) -> Address {
        Address::from_bytes(self.0.verifying_key().to_bytes())
    }

    /// Sign a message. Ed25519 signatures are deterministic.
    pub fn sign(&self, message: &[u8]) -> TxSignature {
        use ed25519_dalek::Signer as _;
        TxSignature::from_bytes(self.0.sign(message).to_bytes())
    }

    /// Raw secret seed bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    /// Secret seed followed by the public key, the conventional keypair layout.
    pub fn to_keypair_bytes(&self) -> [u8; 64] {
        self.0.to_keypair_bytes()
    }
}

impl Signer for SigningKey {
    fn address(&self) -> Address {
        SigningKey::address(self)
    }

    fn try_sign(&self, message: &[u8]) -> Result<TxSignature, SignerError> {
        Ok(self.sign(message))
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey(<redacted>)")
    }
}

/// Verify that `signature` over `message` was produced by `address`.
pub fn verify_signature(
    address: &Address,
    message: &[u8],
    signature: &TxSignature,
) -> Result<(), SignerError> {
    use ed25519_dalek::Verifier as _;
    let key = ed25519_dalek::VerifyingKey::from_bytes(address.as_bytes())
        .map_err(|_| SignerError::InvalidKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    key.verify(message, &sig)
        .map_err(|_| SignerError::InvalidSignature)
}
