//! # tea-crypto
//!
//! Cryptographic primitives for the Tea staking ledger.
//!
//! The suite is fixed: Ed25519 for operator attestations and signed
//! delegations, domain-separated BLAKE3 for every digest that gets signed.
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 hashing and canonical field encoding
//! - [`ed25519`]: Ed25519 signing, verification and signer recovery

pub mod blake3;
pub mod ed25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
