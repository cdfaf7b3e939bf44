//! Ed25519 signing and verification (RFC 8032).
//!
//! Ed25519 is the only signature algorithm the ledger accepts. It is used for:
//! - Operator exit attestations (unstake and claim)
//! - Single-use transfer permits and token-level permits
//!
//! An identity on the ledger is the 32-byte verifying key itself, so
//! "recovering" a signer means verifying a [`SignerProof`] under the key it
//! carries and handing that key back to the caller for comparison.

use ed25519_dalek::Signer;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{CryptoError, Result};

/// An Ed25519 signing key (private key).
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&self.inner.to_bytes()),
        }
    }
}

impl Drop for SigningKey {
    fn drop(&mut self) {
        let mut bytes = self.inner.to_bytes();
        bytes.zeroize();
    }
}

/// An Ed25519 verification key (public key).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

/// An Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

/// An Ed25519 keypair.
pub struct KeyPair {
    pub signing_key: SigningKey,
    pub verifying_key: VerifyingKey,
}

/// A signature bundled with the key that claims to have produced it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerProof {
    /// The claimed signer.
    pub signer: VerifyingKey,
    /// Signature over the digest.
    pub signature: Signature,
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a signing key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Get the raw bytes of this signing key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Get the corresponding verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(message),
        }
    }

    /// Sign a message and bundle the signature with this key's public half.
    pub fn sign_with_proof(&self, message: &[u8]) -> SignerProof {
        SignerProof {
            signer: self.verifying_key(),
            signature: self.sign(message),
        }
    }
}

impl VerifyingKey {
    /// Create a verifying key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse a verifying key from a hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let raw = hex::decode(s.trim_start_matches("0x"))
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: raw.len(),
            })?;
        Self::from_bytes(&bytes)
    }

    /// Get the raw bytes of this verifying key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Get the raw bytes as a slice.
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.inner.as_bytes()
    }

    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.inner
            .verify_strict(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    /// Get the raw bytes of this signature.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}

impl SignerProof {
    /// Return the signer's 32-byte identity if the signature over `message`
    /// verifies under the carried key.
    pub fn recover(&self, message: &[u8]) -> Result<[u8; 32]> {
        self.signer.verify(message, &self.signature)?;
        Ok(self.signer.to_bytes())
    }
}

impl KeyPair {
    /// Generate a new random Ed25519 keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate();
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Create a keypair from a signing key's raw bytes.
    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(secret);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// The ledger identity of this keypair (its verifying key bytes).
    pub fn address(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp = KeyPair::generate();
        let msg = b"tea staking test";
        let sig = kp.signing_key.sign(msg);
        assert!(kp.verifying_key.verify(msg, &sig).is_ok());
    }

    #[test]
    fn test_wrong_message_fails() {
        let kp = KeyPair::generate();
        let sig = kp.signing_key.sign(b"correct message");
        assert!(kp.verifying_key.verify(b"wrong message", &sig).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        let sig = kp1.signing_key.sign(b"test");
        assert!(kp2.verifying_key.verify(b"test", &sig).is_err());
    }

    #[test]
    fn test_recover_returns_signer_identity() {
        let kp = KeyPair::generate();
        let proof = kp.signing_key.sign_with_proof(b"digest");
        let signer = proof.recover(b"digest").expect("valid proof");
        assert_eq!(signer, kp.address());
    }

    #[test]
    fn test_recover_rejects_swapped_signer() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let mut proof = kp.signing_key.sign_with_proof(b"digest");
        proof.signer = other.verifying_key.clone();
        assert!(proof.recover(b"digest").is_err());
    }

    #[test]
    fn test_deterministic_key_derivation() {
        let seed = [42u8; 32];
        let kp1 = KeyPair::from_bytes(&seed);
        let kp2 = KeyPair::from_bytes(&seed);
        assert_eq!(kp1.address(), kp2.address());

        let kp3 = KeyPair::from_bytes(&[43u8; 32]);
        assert_ne!(kp1.address(), kp3.address());
    }

    #[test]
    fn test_verifying_key_from_hex() {
        let kp = KeyPair::generate();
        let encoded = format!("0x{}", hex::encode(kp.address()));
        let parsed = VerifyingKey::from_hex(&encoded).expect("valid hex key");
        assert_eq!(parsed, kp.verifying_key);
        assert!(VerifyingKey::from_hex("abcd").is_err());
    }

    #[test]
    fn test_signer_proof_serde() {
        let kp = KeyPair::generate();
        let proof = kp.signing_key.sign_with_proof(b"msg");
        let json = serde_json::to_string(&proof).expect("serialize");
        let restored: SignerProof = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(proof, restored);
    }
}
